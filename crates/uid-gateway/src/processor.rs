//! Turns completed accounting batches into User-ID submissions

use crate::batch::{BatchAssembler, BatchMessage, Entry};
use crate::event::AccountingEvent;
use crate::observability::{Counter, ObservabilitySink};
use crate::queue::BatchHandler;
use crate::uid::{UidApiClient, UidApiError};
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct BatchProcessor {
    assembler: BatchAssembler,
    client: UidApiClient,
    sink: Arc<dyn ObservabilitySink>,
}

impl BatchProcessor {
    pub fn new(assembler: BatchAssembler, client: UidApiClient, sink: Arc<dyn ObservabilitySink>) -> Self {
        BatchProcessor {
            assembler,
            client,
            sink,
        }
    }

    fn count_sent(&self, message: &BatchMessage) {
        self.sink.add(Counter::Sent, message.len() as u64);
        self.sink.add(Counter::SentLogin, message.login().len() as u64);
        self.sink.add(Counter::SentLogout, message.logout().len() as u64);
    }

    fn usernames(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.username.as_str()).collect()
    }
}

impl BatchHandler for BatchProcessor {
    async fn handle_batch(&self, batch: Vec<AccountingEvent>) {
        let message = self.assembler.assemble(&batch);
        if message.is_empty() {
            debug!(discarded = batch.len(), "Nothing to send in batch");
            return;
        }

        debug!(
            entries = message.len(),
            logins = ?Self::usernames(message.login()),
            logouts = ?Self::usernames(message.logout()),
            "Sending User-ID batch"
        );

        match self.client.submit(&message).await {
            Ok(()) => {
                self.count_sent(&message);
                info!(
                    logins = message.login().len(),
                    logouts = message.logout().len(),
                    "User-ID mapping succeeded"
                );
            }
            Err(e) if e.is_mapping_failure() => {
                self.count_sent(&message);
                let failures = e.mapping_failures();
                self.sink.add(Counter::FailedMapping, failures.len() as u64);
                for failure in failures {
                    error!(
                        username = %failure.username,
                        ip = %failure.ip,
                        message = %failure.message,
                        "User-ID mapping failed"
                    );
                }
                error!(
                    failed = failures.len(),
                    sent = message.len(),
                    "User-ID batch completed with mapping failures"
                );
            }
            Err(UidApiError::ApiFailure { message: reason, body }) => {
                error!(reason = %reason, body = %body, "The User-ID API call failed");
            }
            Err(e) => {
                error!(error = %e, "An error occurred while submitting the User-ID update");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::GatewayMetrics;
    use crate::uid::{Endpoint, EndpointSet};
    use axum::routing::post;
    use axum::Router;
    use radius_proto::{AcctStatusType, Attribute, AttributeType};
    use std::net::{Ipv4Addr, SocketAddr};
    use std::time::Duration;

    async fn serve(body: &'static str) -> SocketAddr {
        let app = Router::new().route("/api/", post(move || async move { body }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn processor(addr: Option<SocketAddr>, metrics: Arc<GatewayMetrics>) -> BatchProcessor {
        let endpoints = addr
            .map(|addr| vec![Endpoint::new(&format!("http://{}/api/", addr), "k", false).unwrap()])
            .unwrap_or_default();
        let client =
            UidApiClient::new(EndpointSet::new(endpoints), Duration::from_secs(5), false, false).unwrap();
        let assembler = BatchAssembler::new(vec![], None, None, metrics.clone());
        BatchProcessor::new(assembler, client, metrics)
    }

    fn event(status: AcctStatusType, username: &str, ip: [u8; 4]) -> AccountingEvent {
        AccountingEvent::new(
            "10.255.0.1".parse().unwrap(),
            vec![
                Attribute::integer(AttributeType::AcctStatusType.as_u8(), status.as_u32()).unwrap(),
                Attribute::string(AttributeType::UserName.as_u8(), username).unwrap(),
                Attribute::ipv4(AttributeType::FramedIpAddress.as_u8(), Ipv4Addr::from(ip)).unwrap(),
            ],
        )
    }

    fn batch() -> Vec<AccountingEvent> {
        vec![
            event(AcctStatusType::Start, "alice", [10, 0, 0, 1]),
            event(AcctStatusType::Stop, "bob", [10, 0, 0, 2]),
        ]
    }

    #[tokio::test]
    async fn test_success_counts_sent() {
        let addr = serve(r#"<response status="success"/>"#).await;
        let metrics = Arc::new(GatewayMetrics::new());

        processor(Some(addr), metrics.clone()).handle_batch(batch()).await;

        assert_eq!(metrics.get(Counter::Sent), 2);
        assert_eq!(metrics.get(Counter::SentLogin), 1);
        assert_eq!(metrics.get(Counter::SentLogout), 1);
        assert_eq!(metrics.get(Counter::FailedMapping), 0);
    }

    #[tokio::test]
    async fn test_mapping_failures_still_count_as_sent() {
        let addr = serve(
            r#"<response status="error"><msg><line><uid-response><payload><login><entry name="alice" ip="10.0.0.1" message="bad"/></login><logout><entry name="bob" ip="10.0.0.2" message="worse"/></logout></payload></uid-response></line></msg></response>"#,
        )
        .await;
        let metrics = Arc::new(GatewayMetrics::new());

        processor(Some(addr), metrics.clone()).handle_batch(batch()).await;

        assert_eq!(metrics.get(Counter::Sent), 2);
        assert_eq!(metrics.get(Counter::FailedMapping), 2);
    }

    #[tokio::test]
    async fn test_api_failure_counts_nothing() {
        let addr = serve(r#"<response status="unauthorized"/>"#).await;
        let metrics = Arc::new(GatewayMetrics::new());

        processor(Some(addr), metrics.clone()).handle_batch(batch()).await;

        assert_eq!(metrics.get(Counter::Sent), 0);
    }

    #[tokio::test]
    async fn test_no_endpoints_drains_batch() {
        let metrics = Arc::new(GatewayMetrics::new());

        processor(None, metrics.clone()).handle_batch(batch()).await;

        assert_eq!(metrics.get(Counter::Sent), 0);
        assert_eq!(metrics.get(Counter::Ignored), 0);
    }

    #[tokio::test]
    async fn test_empty_message_is_not_submitted() {
        let metrics = Arc::new(GatewayMetrics::new());
        // No endpoint is configured, so a submission would be logged as an error
        let events = vec![AccountingEvent::new("10.255.0.1".parse().unwrap(), vec![])];

        processor(None, metrics.clone()).handle_batch(events).await;

        assert_eq!(metrics.get(Counter::Ignored), 1);
        assert_eq!(metrics.get(Counter::Sent), 0);
    }
}
