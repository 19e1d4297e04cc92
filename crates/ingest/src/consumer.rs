//! Kafka consumer for the watch-event topic.
//!
//! Runs as a named consumer group with manual offset commits: a message's
//! offset is committed only after the aggregator call completes, so an
//! unreachable store leads to broker redelivery (at-least-once). Malformed
//! or invalid messages are logged, skipped and committed so a poison
//! message never blocks its partition.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use aggregator::{AggregationError, PreferenceAggregator};
use preference_store::IngestionEvent;

/// Kafka wiring for one deployment of the engine.
#[derive(Debug, Clone)]
pub struct WatchConsumerConfig {
    pub brokers: String,
    pub group_id: String,
    pub topic: String,
    /// Connect attempts before startup is declared failed.
    pub startup_attempts: u32,
    /// Fixed delay between connect attempts.
    pub startup_delay: Duration,
}

impl Default for WatchConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: "recommendation-service-group".to_string(),
            topic: "movie-watches".to_string(),
            startup_attempts: 5,
            startup_delay: Duration::from_secs(3),
        }
    }
}

/// Errors from the consumer lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),

    #[error("could not reach kafka at {brokers} after {attempts} attempts")]
    StartupExhausted { brokers: String, attempts: u32 },
}

/// JSON payload published on each watch.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WatchMessage {
    user_id: String,
    movie_id: String,
    #[serde(default)]
    genres: Option<Vec<String>>,
}

/// What to do with the delivered message's offset.
#[derive(Debug, PartialEq, Eq)]
enum MessageOutcome {
    /// Applied to the store; commit.
    Processed,
    /// Malformed or invalid; commit so the partition moves on.
    Skipped,
    /// Store unreachable; leave uncommitted for redelivery.
    Retry,
}

/// Long-running subscriber that feeds the aggregator from the watch topic.
pub struct WatchEventConsumer {
    aggregator: Arc<PreferenceAggregator>,
    config: WatchConsumerConfig,
}

impl WatchEventConsumer {
    pub fn new(aggregator: Arc<PreferenceAggregator>, config: WatchConsumerConfig) -> Self {
        Self { aggregator, config }
    }

    /// Consume until the shutdown signal flips.
    ///
    /// The signal is honored at message boundaries only: a message already
    /// handed to the aggregator finishes (and commits) before the loop
    /// exits, and nothing is committed without a completed aggregator call.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), ConsumerError> {
        let consumer = self.connect().await?;
        info!(
            "Watch-event consumer subscribed (topic: {}, group: {})",
            self.config.topic, self.config.group_id
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Watch-event consumer stopping");
                    break;
                }
                delivery = consumer.recv() => {
                    match delivery {
                        Ok(message) => {
                            let outcome = match message.payload() {
                                Some(payload) => self.handle_payload(payload).await,
                                None => {
                                    warn!("Skipping watch message with empty payload");
                                    MessageOutcome::Skipped
                                }
                            };
                            match outcome {
                                MessageOutcome::Processed | MessageOutcome::Skipped => {
                                    if let Err(err) = consumer.commit_message(&message, CommitMode::Async) {
                                        warn!("Failed to commit offset: {err}");
                                    }
                                }
                                MessageOutcome::Retry => {
                                    // Offset stays uncommitted; the broker
                                    // redelivers after rebalance or restart.
                                }
                            }
                        }
                        Err(err) => {
                            error!("Kafka receive error: {err}");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Connect and subscribe, retrying on a fixed schedule before giving up.
    async fn connect(&self) -> Result<StreamConsumer, ConsumerError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_connect() {
                Ok(consumer) => return Ok(consumer),
                Err(err) if attempt < self.config.startup_attempts => {
                    warn!(
                        "Kafka connect attempt {attempt}/{} failed: {err}; retrying in {:?}",
                        self.config.startup_attempts, self.config.startup_delay
                    );
                    tokio::time::sleep(self.config.startup_delay).await;
                }
                Err(err) => {
                    error!(
                        "Giving up on kafka at {} after {attempt} attempts: {err}",
                        self.config.brokers
                    );
                    return Err(ConsumerError::StartupExhausted {
                        brokers: self.config.brokers.clone(),
                        attempts: attempt,
                    });
                }
            }
        }
    }

    fn try_connect(&self) -> Result<StreamConsumer, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("group.id", &self.config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "latest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "45000")
            .create()?;

        consumer.subscribe(&[self.config.topic.as_str()])?;

        // Metadata fetch proves the brokers are actually reachable;
        // consumer creation alone connects lazily.
        consumer.fetch_metadata(Some(&self.config.topic), Duration::from_secs(5))?;

        Ok(consumer)
    }

    /// Decode and apply one delivered payload.
    async fn handle_payload(&self, payload: &[u8]) -> MessageOutcome {
        let message: WatchMessage = match serde_json::from_slice(payload) {
            Ok(message) => message,
            Err(err) => {
                warn!("Skipping malformed watch message: {err}");
                return MessageOutcome::Skipped;
            }
        };

        let event = IngestionEvent::Watched {
            user_id: message.user_id,
            movie_id: message.movie_id,
            occurred_at: Utc::now(),
            watch_duration_secs: None,
            genres: message.genres,
        };

        match self.aggregator.apply(event).await {
            Ok(()) => {
                debug!("Processed watch message");
                MessageOutcome::Processed
            }
            Err(AggregationError::InvalidEvent(reason)) => {
                warn!("Skipping invalid watch message: {reason}");
                MessageOutcome::Skipped
            }
            Err(err @ AggregationError::StoreUnavailable(_)) => {
                error!("Watch message left uncommitted for redelivery: {err}");
                MessageOutcome::Retry
            }
        }
    }
}
