//! CineWise recommendation engine entry point.
//!
//! Wires the shared preference store into both ingestion paths and the
//! scoring RPC, then serves until interrupted: ctrl-c drains the gRPC
//! server and stops the Kafka consumer at a message boundary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use aggregator::PreferenceAggregator;
use catalog_client::{CatalogClient, HttpCatalogClient};
use ingest::proto::recommendation_service_server::RecommendationServiceServer;
use ingest::{RecommendationGrpc, WatchConsumerConfig, WatchEventConsumer};
use preference_store::MemoryPreferenceStore;
use scorer::RecommendationScorer;

/// CineWise - preference aggregation and recommendation scoring engine
#[derive(Parser, Debug)]
#[command(name = "cinewise-recs")]
#[command(about = "Serves personalized movie recommendations from behavioral signals", long_about = None)]
struct Args {
    /// Address for the gRPC listener
    #[arg(long, env = "GRPC_ADDR", default_value = "0.0.0.0:50052")]
    grpc_addr: SocketAddr,

    /// Base URL of the movie catalog service
    #[arg(long, env = "MOVIE_SERVICE_URL", default_value = "http://localhost:3001")]
    catalog_url: String,

    /// Kafka bootstrap servers
    #[arg(long, env = "KAFKA_BROKER", default_value = "localhost:9092")]
    kafka_brokers: String,

    /// Topic carrying watch events
    #[arg(long, env = "KAFKA_WATCH_TOPIC", default_value = "movie-watches")]
    kafka_topic: String,

    /// Consumer group for this deployment
    #[arg(long, env = "KAFKA_GROUP_ID", default_value = "recommendation-service-group")]
    kafka_group: String,

    /// Run without the Kafka consumer (streaming ingestion only)
    #[arg(long)]
    no_consumer: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("Starting cinewise-recs");

    // The store is the only shared mutable resource; everything else holds
    // a handle to it.
    let store = Arc::new(MemoryPreferenceStore::new());
    let catalog: Arc<dyn CatalogClient> = Arc::new(
        HttpCatalogClient::new(&args.catalog_url).context("Failed to build catalog client")?,
    );
    let aggregator = Arc::new(PreferenceAggregator::new(store.clone()));
    let scorer = Arc::new(RecommendationScorer::new(store, catalog));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let consumer_handle = if args.no_consumer {
        info!("Kafka consumer disabled");
        None
    } else {
        let config = WatchConsumerConfig {
            brokers: args.kafka_brokers.clone(),
            group_id: args.kafka_group.clone(),
            topic: args.kafka_topic.clone(),
            ..WatchConsumerConfig::default()
        };
        let consumer = WatchEventConsumer::new(aggregator.clone(), config);
        Some(tokio::spawn(async move {
            let result = consumer.run(shutdown_rx).await;
            if let Err(err) = &result {
                error!("Kafka consumer terminated: {err}");
            }
            result
        }))
    };

    let service = RecommendationGrpc::new(aggregator, scorer);
    info!("gRPC server listening on {}", args.grpc_addr);
    tonic::transport::Server::builder()
        .add_service(RecommendationServiceServer::new(service))
        .serve_with_shutdown(args.grpc_addr, async {
            let _ = signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("gRPC server failed")?;

    // Stop the consumer at a message boundary, then wait for it.
    let _ = shutdown_tx.send(true);
    if let Some(handle) = consumer_handle {
        match handle.await {
            Ok(Ok(())) => info!("Kafka consumer stopped"),
            Ok(Err(_)) => {} // already logged inside the task
            Err(err) => error!("Kafka consumer task panicked: {err}"),
        }
    }

    info!("Shutdown complete");
    Ok(())
}
