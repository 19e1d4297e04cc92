//! gRPC surface: unary recommendation scoring and the bidirectional
//! event channel.
//!
//! The event channel is a read loop per connection with fire-and-forget
//! acks: every inbound event gets exactly one `EventAck` on the same
//! stream, success or failure, and the channel stays open until the peer
//! closes it or the transport drops.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, error, info, warn};

use aggregator::{AggregationError, PreferenceAggregator};
use preference_store::IngestionEvent;
use scorer::{RecommendationScorer, ScoringError, DEFAULT_LIMIT};

use crate::proto::recommendation_service_server::RecommendationService;
use crate::proto::{
    EventAck, EventType, GetRecommendationsRequest, GetRecommendationsResponse, RecommendedMovie,
    UserEvent,
};

const ALGORITHM: &str = "content-weighted";

/// Acks queued per connection before the sender has to wait.
const ACK_BUFFER: usize = 16;

pub struct RecommendationGrpc {
    aggregator: Arc<PreferenceAggregator>,
    scorer: Arc<RecommendationScorer>,
}

impl RecommendationGrpc {
    pub fn new(aggregator: Arc<PreferenceAggregator>, scorer: Arc<RecommendationScorer>) -> Self {
        Self { aggregator, scorer }
    }
}

#[tonic::async_trait]
impl RecommendationService for RecommendationGrpc {
    async fn get_recommendations(
        &self,
        request: Request<GetRecommendationsRequest>,
    ) -> Result<Response<GetRecommendationsResponse>, Status> {
        let req = request.into_inner();
        if req.user_id.is_empty() {
            return Err(Status::invalid_argument("user_id is required"));
        }
        let limit = if req.limit == 0 {
            DEFAULT_LIMIT
        } else {
            req.limit as usize
        };

        let ranked = self
            .scorer
            .recommend(&req.user_id, limit)
            .await
            .map_err(|err| match err {
                ScoringError::InvalidLimit => Status::invalid_argument(err.to_string()),
                ScoringError::Store(_) | ScoringError::Catalog(_) => {
                    error!("Recommendation failed for user {}: {err}", req.user_id);
                    Status::internal("failed to generate recommendations")
                }
            })?;

        debug!("Returning {} recommendations for user {}", ranked.len(), req.user_id);
        Ok(Response::new(GetRecommendationsResponse {
            user_id: req.user_id,
            movies: ranked
                .into_iter()
                .map(|movie| RecommendedMovie {
                    movie_id: movie.movie_id,
                    score: movie.score,
                })
                .collect(),
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            algorithm: ALGORITHM.to_string(),
        }))
    }

    type ProcessUserEventStream = ReceiverStream<Result<EventAck, Status>>;

    async fn process_user_event(
        &self,
        request: Request<Streaming<UserEvent>>,
    ) -> Result<Response<Self::ProcessUserEventStream>, Status> {
        let mut inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(ACK_BUFFER);
        let aggregator = self.aggregator.clone();

        tokio::spawn(async move {
            info!("Event channel opened");
            while let Some(next) = inbound.next().await {
                let event = match next {
                    Ok(event) => event,
                    Err(status) => {
                        // Transport error: abandon the in-flight event,
                        // close this channel only.
                        warn!("Event channel terminated: {status}");
                        break;
                    }
                };

                let arrival = Utc::now();
                let message_id = format!(
                    "{}-{}-{}",
                    event.user_id,
                    event.movie_id,
                    arrival.timestamp_millis()
                );

                let success = match decode_event(event, arrival) {
                    Ok(decoded) => match aggregator.apply(decoded).await {
                        Ok(()) => true,
                        Err(err @ AggregationError::InvalidEvent(_)) => {
                            warn!("Rejected event {message_id}: {err}");
                            false
                        }
                        Err(err @ AggregationError::StoreUnavailable(_)) => {
                            error!("Failed to apply event {message_id}: {err}");
                            false
                        }
                    },
                    Err(reason) => {
                        warn!("Rejected event {message_id}: {reason}");
                        false
                    }
                };

                if tx.send(Ok(EventAck { success, message_id })).await.is_err() {
                    // Peer stopped reading acks; nothing left to do.
                    break;
                }
            }
            debug!("Event channel closed");
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// Decode a wire event into the aggregator's tagged union.
///
/// A missing or unparseable timestamp falls back to arrival time; an
/// unknown event type or a RATED event without a rating is rejected here,
/// before the aggregator is involved.
fn decode_event(event: UserEvent, arrival: DateTime<Utc>) -> Result<IngestionEvent, String> {
    let kind = event.event_type();
    let occurred_at = DateTime::parse_from_rfc3339(&event.timestamp)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(arrival);

    let UserEvent {
        user_id,
        movie_id,
        rating,
        watch_duration_secs,
        genres,
        ..
    } = event;
    let genres = if genres.is_empty() { None } else { Some(genres) };

    match kind {
        EventType::Watched => Ok(IngestionEvent::Watched {
            user_id,
            movie_id,
            occurred_at,
            watch_duration_secs,
            genres,
        }),
        EventType::Rated => {
            let rating = rating.ok_or("RATED event is missing a rating")?;
            Ok(IngestionEvent::Rated {
                user_id,
                movie_id,
                occurred_at,
                rating,
                genres,
            })
        }
        EventType::Unspecified => Err("event_type is unspecified".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::recommendation_service_client::RecommendationServiceClient;
    use crate::proto::recommendation_service_server::RecommendationServiceServer;
    use async_trait::async_trait;
    use catalog_client::{CatalogClient, CatalogError, CatalogMovie};
    use preference_store::{MemoryPreferenceStore, PreferenceStore};
    use std::cmp::Ordering;
    use tokio::net::TcpListener;
    use tokio_stream::wrappers::TcpListenerStream;
    use tonic::transport::Server;

    // ============================================================================
    // Test Fixtures
    // ============================================================================

    fn movie(id: &str, genres: &[&str], rating: f32) -> CatalogMovie {
        CatalogMovie {
            id: id.to_string(),
            title: format!("Movie {id}"),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            rating,
            release_year: Some(1999),
        }
    }

    struct FakeCatalog {
        movies: Vec<CatalogMovie>,
    }

    #[async_trait]
    impl CatalogClient for FakeCatalog {
        async fn fetch_all(&self) -> Result<Vec<CatalogMovie>, CatalogError> {
            Ok(self.movies.clone())
        }

        async fn fetch_popular(&self, limit: usize) -> Result<Vec<CatalogMovie>, CatalogError> {
            let mut movies = self.movies.clone();
            movies.sort_by(|a, b| b.rating.partial_cmp(&a.rating).unwrap_or(Ordering::Equal));
            movies.truncate(limit);
            Ok(movies)
        }
    }

    /// Serve the engine on a random local port and hand back a connected
    /// client address.
    async fn start_test_server(
        store: Arc<MemoryPreferenceStore>,
        movies: Vec<CatalogMovie>,
    ) -> (String, tokio::task::JoinHandle<()>) {
        let aggregator = Arc::new(PreferenceAggregator::new(store.clone()));
        let catalog: Arc<dyn CatalogClient> = Arc::new(FakeCatalog { movies });
        let scorer = Arc::new(RecommendationScorer::new(store, catalog));
        let service = RecommendationGrpc::new(aggregator, scorer);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to get local address");

        let handle = tokio::spawn(async move {
            Server::builder()
                .add_service(RecommendationServiceServer::new(service))
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
                .expect("Test server failed");
        });

        (format!("http://{}", addr), handle)
    }

    fn rated_event(user: &str, movie: &str, rating: f32) -> UserEvent {
        UserEvent {
            event_type: EventType::Rated as i32,
            user_id: user.to_string(),
            movie_id: movie.to_string(),
            timestamp: String::new(),
            rating: Some(rating),
            watch_duration_secs: None,
            genres: vec![],
        }
    }

    // ============================================================================
    // Event Channel
    // ============================================================================

    #[tokio::test]
    async fn rated_event_over_the_channel_creates_a_record() {
        let store = Arc::new(MemoryPreferenceStore::new());
        let (addr, handle) = start_test_server(store.clone(), vec![]).await;
        let mut client = RecommendationServiceClient::connect(addr)
            .await
            .expect("Failed to connect");

        let (tx, rx) = mpsc::channel(4);
        let mut acks = client
            .process_user_event(ReceiverStream::new(rx))
            .await
            .expect("Failed to open event channel")
            .into_inner();

        tx.send(rated_event("u1", "m9", 4.0)).await.unwrap();

        let ack = acks.message().await.unwrap().expect("Expected an ack");
        assert!(ack.success);
        assert!(ack.message_id.starts_with("u1-m9-"));

        let records = store.records_for_user("u1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].movie_id, "m9");
        assert_eq!(records[0].rating, 4.0);
        assert_eq!(records[0].watch_count, 1);

        handle.abort();
    }

    #[tokio::test]
    async fn failed_event_acks_failure_and_keeps_the_channel_open() {
        let store = Arc::new(MemoryPreferenceStore::new());
        let (addr, handle) = start_test_server(store.clone(), vec![]).await;
        let mut client = RecommendationServiceClient::connect(addr)
            .await
            .expect("Failed to connect");

        let (tx, rx) = mpsc::channel(4);
        let mut acks = client
            .process_user_event(ReceiverStream::new(rx))
            .await
            .expect("Failed to open event channel")
            .into_inner();

        // Rating out of range: rejected, no record written.
        tx.send(rated_event("u1", "m1", 42.0)).await.unwrap();
        let ack = acks.message().await.unwrap().expect("Expected an ack");
        assert!(!ack.success);
        assert!(store.records_for_user("u1").await.unwrap().is_empty());

        // The same channel still processes the next event.
        tx.send(rated_event("u1", "m1", 8.0)).await.unwrap();
        let ack = acks.message().await.unwrap().expect("Expected an ack");
        assert!(ack.success);
        assert_eq!(store.records_for_user("u1").await.unwrap().len(), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn watched_events_carry_duration_and_no_rating() {
        let store = Arc::new(MemoryPreferenceStore::new());
        let (addr, handle) = start_test_server(store.clone(), vec![]).await;
        let mut client = RecommendationServiceClient::connect(addr)
            .await
            .expect("Failed to connect");

        let (tx, rx) = mpsc::channel(4);
        let mut acks = client
            .process_user_event(ReceiverStream::new(rx))
            .await
            .expect("Failed to open event channel")
            .into_inner();

        tx.send(UserEvent {
            event_type: EventType::Watched as i32,
            user_id: "u1".to_string(),
            movie_id: "m5".to_string(),
            timestamp: "2024-03-01T20:15:00Z".to_string(),
            rating: None,
            watch_duration_secs: Some(7100),
            genres: vec![],
        })
        .await
        .unwrap();

        let ack = acks.message().await.unwrap().expect("Expected an ack");
        assert!(ack.success);

        let records = store.records_for_user("u1").await.unwrap();
        assert_eq!(records[0].rating, 0.0);
        assert_eq!(records[0].watch_count, 1);
        assert_eq!(
            records[0].last_watched,
            "2024-03-01T20:15:00Z".parse::<DateTime<Utc>>().unwrap()
        );

        handle.abort();
    }

    // ============================================================================
    // Scoring RPC
    // ============================================================================

    #[tokio::test]
    async fn unknown_user_gets_popular_movies() {
        let store = Arc::new(MemoryPreferenceStore::new());
        let movies: Vec<CatalogMovie> = (1..=6)
            .map(|i| movie(&format!("m{i}"), &["Drama"], i as f32))
            .collect();
        let (addr, handle) = start_test_server(store, movies).await;
        let mut client = RecommendationServiceClient::connect(addr)
            .await
            .expect("Failed to connect");

        let response = client
            .get_recommendations(GetRecommendationsRequest {
                user_id: "unknown-user".to_string(),
                limit: 5,
            })
            .await
            .expect("RPC failed")
            .into_inner();

        assert_eq!(response.user_id, "unknown-user");
        assert_eq!(response.algorithm, "content-weighted");
        assert_eq!(response.movies.len(), 5);
        assert_eq!(response.movies[0].movie_id, "m6");
        assert!(!response.generated_at.is_empty());

        handle.abort();
    }

    #[tokio::test]
    async fn empty_user_id_is_invalid_argument() {
        let store = Arc::new(MemoryPreferenceStore::new());
        let (addr, handle) = start_test_server(store, vec![]).await;
        let mut client = RecommendationServiceClient::connect(addr)
            .await
            .expect("Failed to connect");

        let status = client
            .get_recommendations(GetRecommendationsRequest {
                user_id: String::new(),
                limit: 5,
            })
            .await
            .expect_err("Expected an error status");

        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        handle.abort();
    }

    #[tokio::test]
    async fn unset_limit_defaults_to_ten() {
        let store = Arc::new(MemoryPreferenceStore::new());
        let movies: Vec<CatalogMovie> = (1..=15)
            .map(|i| movie(&format!("m{i}"), &["Drama"], (i % 9) as f32))
            .collect();
        let (addr, handle) = start_test_server(store, movies).await;
        let mut client = RecommendationServiceClient::connect(addr)
            .await
            .expect("Failed to connect");

        let response = client
            .get_recommendations(GetRecommendationsRequest {
                user_id: "u1".to_string(),
                limit: 0,
            })
            .await
            .expect("RPC failed")
            .into_inner();

        assert_eq!(response.movies.len(), 10);
        handle.abort();
    }

    // ============================================================================
    // Decoding
    // ============================================================================

    #[test]
    fn unknown_event_type_is_rejected() {
        let event = UserEvent {
            event_type: 0,
            user_id: "u1".to_string(),
            movie_id: "m1".to_string(),
            timestamp: String::new(),
            rating: None,
            watch_duration_secs: None,
            genres: vec![],
        };
        assert!(decode_event(event, Utc::now()).is_err());
    }

    #[test]
    fn rated_without_rating_is_rejected() {
        let mut event = rated_event("u1", "m1", 5.0);
        event.rating = None;
        assert!(decode_event(event, Utc::now()).is_err());
    }

    #[test]
    fn missing_timestamp_falls_back_to_arrival() {
        let arrival = Utc::now();
        let decoded = decode_event(rated_event("u1", "m1", 5.0), arrival).unwrap();
        match decoded {
            IngestionEvent::Rated { occurred_at, .. } => assert_eq!(occurred_at, arrival),
            other => panic!("Unexpected variant: {other:?}"),
        }
    }
}
