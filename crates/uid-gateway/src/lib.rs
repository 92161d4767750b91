//! RADIUS Accounting to User-ID Gateway
//!
//! This crate listens for RADIUS Accounting-Requests, acknowledges them, and
//! republishes session starts and stops as batched login/logout updates to a
//! firewall's User-ID XML API. It is built on top of the `radius-proto`
//! protocol implementation.
//!
//! # Features
//!
//! - Async I/O with Tokio
//! - Per-client shared secrets by address, network or host name
//! - Username rewriting, filtering and UPN/NT4 translation
//! - Batched submissions with endpoint failover
//! - JSON configuration
//! - Prometheus metrics
//!
//! # Example
//!
//! ```rust,no_run
//! use uid_gateway::{Config, Gateway};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.json")?;
//!
//!     let gateway = Gateway::start(&config).await?;
//!     gateway
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod event;
pub mod gateway;
pub mod metrics;
pub mod observability;
pub mod processor;
pub mod queue;
pub mod secrets;
pub mod server;
pub mod translate;
pub mod uid;

pub use batch::{BatchAssembler, BatchMessage, Disposition, Entry};
pub use config::{Config, ConfigError, ConfigLoad, RadiusClient};
pub use event::{AccountingEvent, EventError};
pub use gateway::{Gateway, GatewayError};
pub use observability::{Counter, GatewayMetrics, ObservabilitySink};
pub use processor::BatchProcessor;
pub use queue::{BatchHandler, BatchScheduler, RequestQueue};
pub use secrets::{ConfigSecretResolver, SecretResolver};
pub use server::{AccountingServer, Discard, ServerError};
pub use translate::{NameFormat, NameTranslator, StaticNameTranslator, TranslateError};
pub use uid::{UidApiClient, UidApiError};
