//! # Ingest Crate
//!
//! The two ingress paths of the engine, plus its scoring RPC surface:
//!
//! - **grpc**: the `RecommendationService` implementation — a unary
//!   scoring endpoint and the long-lived bidirectional event channel
//! - **consumer**: the Kafka watch-topic consumer group
//!
//! Both paths hold a handle to the same `PreferenceAggregator` and share
//! nothing else; they interleave freely at the store.

// Include the generated protobuf code
pub mod proto {
    tonic::include_proto!("recommendation");
}

pub mod consumer;
pub mod grpc;

// Re-export main types
pub use consumer::{ConsumerError, WatchConsumerConfig, WatchEventConsumer};
pub use grpc::RecommendationGrpc;
