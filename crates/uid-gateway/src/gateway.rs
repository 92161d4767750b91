//! Gateway assembly and lifecycle
//!
//! Wires the accounting listener, the batch consumer and the optional metrics
//! endpoint together, sharing one cancellation token between them.

use crate::batch::BatchAssembler;
use crate::config::{Config, ConfigError};
use crate::metrics::serve_metrics;
use crate::observability::{GatewayMetrics, ObservabilitySink};
use crate::processor::BatchProcessor;
use crate::queue::RequestQueue;
use crate::secrets::{ConfigSecretResolver, SecretResolver};
use crate::server::{AccountingServer, ServerError};
use crate::translate::{NameTranslator, StaticNameTranslator};
use crate::uid::{UidApiClient, UidApiError};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often host-name RADIUS clients are looked up again
const HOST_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("User-ID API client error: {0}")]
    Api(#[from] UidApiError),
    #[error("Accounting listener error: {0}")]
    Server(#[from] ServerError),
    #[error("Metrics endpoint error: {0}")]
    Metrics(#[source] std::io::Error),
    #[error("Accounting listener task failed: {0}")]
    Task(#[from] JoinError),
}

/// A running gateway
pub struct Gateway {
    local_addr: SocketAddr,
    metrics_addr: Option<SocketAddr>,
    metrics: Arc<GatewayMetrics>,
    cancel: CancellationToken,
    listener: JoinHandle<Result<(), ServerError>>,
    consumer: JoinHandle<()>,
    metrics_server: Option<JoinHandle<()>>,
    host_refresh: Option<JoinHandle<()>>,
    shutdown_grace: Duration,
}

impl Gateway {
    /// Start with the configured static domain table for name translation
    pub async fn start(config: &Config) -> Result<Self, GatewayError> {
        let translator = Arc::new(StaticNameTranslator::new(&config.name_translation.domains));
        Self::start_with(config, translator).await
    }

    pub async fn start_with(
        config: &Config,
        translator: Arc<dyn NameTranslator>,
    ) -> Result<Self, GatewayError> {
        config.validate()?;

        let metrics = Arc::new(GatewayMetrics::new());
        let sink: Arc<dyn ObservabilitySink> = metrics.clone();
        let resolver = Arc::new(ConfigSecretResolver::new(config.radius_clients.clone()));
        resolver.resolve_host_names().await;
        let secrets: Arc<dyn SecretResolver> = resolver.clone();

        if config.radius_clients.is_empty() {
            warn!("No RADIUS clients configured, every accounting request will be discarded");
        }

        let assembler = BatchAssembler::from_config(config, translator, Arc::clone(&sink))?;
        let client = UidApiClient::from_config(&config.uid_api, config.debug_enabled)?;
        if client.endpoints().is_empty() {
            warn!("No User-ID API endpoints configured, batches will be dropped");
        }

        let (queue, scheduler) = RequestQueue::new(
            config.max_queue_depth,
            config.uid_api.batch_size,
            config.uid_api.batch_wait(),
            Arc::clone(&sink),
        );

        let server =
            AccountingServer::bind(config.socket_addr()?, secrets, queue, Arc::clone(&sink)).await?;
        let local_addr = server.local_addr()?;

        let metrics_listener = match config.metrics_socket_addr()? {
            Some(addr) => Some(TcpListener::bind(addr).await.map_err(GatewayError::Metrics)?),
            None => None,
        };
        let metrics_addr = metrics_listener
            .as_ref()
            .map(TcpListener::local_addr)
            .transpose()
            .map_err(GatewayError::Metrics)?;

        let cancel = CancellationToken::new();

        let processor = BatchProcessor::new(assembler, client, sink);
        let consumer = tokio::spawn(scheduler.run(processor, cancel.clone()));

        let listener = tokio::spawn({
            let cancel = cancel.clone();
            async move { server.run(cancel).await }
        });

        let host_refresh = resolver.has_host_names().then(|| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                resolver
                    .refresh_host_names(HOST_REFRESH_INTERVAL, cancel)
                    .await
            })
        });

        let metrics_server = metrics_listener.map(|tcp| {
            let metrics = Arc::clone(&metrics);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_metrics(tcp, metrics, cancel).await {
                    warn!(error = %e, "Metrics endpoint stopped");
                }
            })
        });

        info!(
            accounting = %local_addr,
            endpoints = config.uid_api.endpoints.len(),
            batch_size = config.uid_api.batch_size,
            "Gateway started"
        );

        Ok(Gateway {
            local_addr,
            metrics_addr,
            metrics,
            cancel,
            listener,
            consumer,
            metrics_server,
            host_refresh,
            shutdown_grace: config.shutdown_grace(),
        })
    }

    /// Address the accounting listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run until `signal` completes or the listener stops on its own.
    ///
    /// Returns the listener's error if it stopped first.
    pub async fn run_until<F>(mut self, signal: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = signal => {
                info!("Shutdown requested");
                self.shutdown().await
            }
            finished = &mut self.listener => {
                self.stop_background().await;
                finished?.map_err(GatewayError::from)
            }
        }
    }

    /// Stop listening, flush the in-flight batch and wait for the consumer
    pub async fn shutdown(mut self) -> Result<(), GatewayError> {
        self.cancel.cancel();
        let finished = (&mut self.listener).await;
        self.stop_background().await;
        finished?.map_err(GatewayError::from)
    }

    async fn stop_background(self) {
        self.cancel.cancel();

        let mut consumer = self.consumer;
        match tokio::time::timeout(self.shutdown_grace, &mut consumer).await {
            Ok(_) => debug!("Batch consumer finished"),
            Err(_) => {
                warn!(
                    grace_secs = self.shutdown_grace.as_secs(),
                    "Batch consumer did not finish in time, aborting"
                );
                consumer.abort();
            }
        }

        if let Some(refresh) = self.host_refresh {
            refresh.abort();
        }

        if let Some(mut server) = self.metrics_server {
            if tokio::time::timeout(self.shutdown_grace, &mut server).await.is_err() {
                server.abort();
            }
        }

        info!("Gateway stopped");
    }
}
