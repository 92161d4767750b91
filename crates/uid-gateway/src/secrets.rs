//! Shared secret lookup by source address
//!
//! A secret found for an address is cached for the life of the process; a
//! restart picks up configuration changes. Host-name clients are resolved
//! with the async resolver at startup and on a refresh interval, never on the
//! receive path. Sources that match no client are remembered for a short
//! time so repeated strangers cost a single map lookup.

use crate::config::RadiusClient;
use dashmap::DashMap;
use ipnetwork::IpNetwork;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long a source that matched no client is rejected without a lookup
pub const UNKNOWN_SOURCE_TTL: Duration = Duration::from_secs(30);

/// Expired unknown-source entries are pruned once the map grows past this
const UNKNOWN_SOURCE_PRUNE_AT: usize = 4096;

/// Resolves the RADIUS shared secret for a datagram's source address
pub trait SecretResolver: Send + Sync {
    /// `None` means the source is not a known client
    fn secret_for(&self, source_ip: IpAddr) -> Option<Arc<[u8]>>;
}

struct ClientEntry {
    client: RadiusClient,
    network: Option<IpNetwork>,
    secret: Arc<[u8]>,
}

/// Secret resolver backed by the configured RADIUS client list
///
/// Clients are tried in configuration order and the first match wins. A
/// host-name client matches only the addresses its name resolved to at the
/// last [`resolve_host_names`](Self::resolve_host_names).
pub struct ConfigSecretResolver {
    clients: Vec<ClientEntry>,
    resolved: DashMap<usize, Vec<IpAddr>>,
    cache: DashMap<IpAddr, Arc<[u8]>>,
    unknown: DashMap<IpAddr, Instant>,
    unknown_ttl: Duration,
}

impl ConfigSecretResolver {
    pub fn new(clients: Vec<RadiusClient>) -> Self {
        let clients = clients
            .into_iter()
            .map(|client| ClientEntry {
                network: client.parse_network(),
                secret: Arc::from(client.secret.as_bytes()),
                client,
            })
            .collect();

        ConfigSecretResolver {
            clients,
            resolved: DashMap::new(),
            cache: DashMap::new(),
            unknown: DashMap::new(),
            unknown_ttl: UNKNOWN_SOURCE_TTL,
        }
    }

    pub fn with_unknown_ttl(mut self, ttl: Duration) -> Self {
        self.unknown_ttl = ttl;
        self
    }

    /// Whether any client is configured by host name
    pub fn has_host_names(&self) -> bool {
        self.clients.iter().any(|entry| entry.network.is_none())
    }

    /// Number of addresses with a cached secret
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Number of sources currently remembered as unknown
    pub fn unknown_len(&self) -> usize {
        self.unknown.len()
    }

    /// Look up every host-name client.
    ///
    /// A name that fails to resolve keeps the addresses from its previous
    /// lookup. Remembered unknown sources are forgotten afterwards so new
    /// addresses match immediately.
    pub async fn resolve_host_names(&self) {
        for (index, entry) in self.clients.iter().enumerate() {
            if entry.network.is_some() {
                continue;
            }

            let host = entry.client.host.as_str();
            match tokio::net::lookup_host((host, 0)).await {
                Ok(addrs) => {
                    let addrs: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
                    debug!(host, addresses = addrs.len(), "Resolved RADIUS client host name");
                    self.resolved.insert(index, addrs);
                }
                Err(e) => warn!(
                    host,
                    error = %e,
                    "Could not resolve RADIUS client host name, keeping previous addresses"
                ),
            }
        }

        self.unknown.clear();
    }

    /// Re-resolve host names every `every` until cancelled
    pub async fn refresh_host_names(&self, every: Duration, cancel: CancellationToken) {
        let mut ticks = tokio::time::interval(every);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticks.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticks.tick() => self.resolve_host_names().await,
            }
        }
    }

    fn find_client(&self, source_ip: IpAddr) -> Option<&ClientEntry> {
        self.clients
            .iter()
            .enumerate()
            .find(|(index, entry)| match entry.network {
                Some(network) => network.contains(source_ip),
                None => self
                    .resolved
                    .get(index)
                    .is_some_and(|addrs| addrs.contains(&source_ip)),
            })
            .map(|(_, entry)| entry)
    }

    fn remember_unknown(&self, source_ip: IpAddr) {
        if self.unknown.len() >= UNKNOWN_SOURCE_PRUNE_AT {
            let ttl = self.unknown_ttl;
            self.unknown.retain(|_, seen| seen.elapsed() < ttl);
        }
        self.unknown.insert(source_ip, Instant::now());
    }
}

impl SecretResolver for ConfigSecretResolver {
    fn secret_for(&self, source_ip: IpAddr) -> Option<Arc<[u8]>> {
        if let Some(secret) = self.cache.get(&source_ip) {
            return Some(Arc::clone(secret.value()));
        }

        let recently_unknown = self
            .unknown
            .get(&source_ip)
            .is_some_and(|seen| seen.elapsed() < self.unknown_ttl);
        if recently_unknown {
            return None;
        }

        let Some(entry) = self.find_client(source_ip) else {
            self.remember_unknown(source_ip);
            return None;
        };
        debug!(
            client_ip = %source_ip,
            client = %entry.client.display_name(),
            "Resolved shared secret for new source"
        );

        self.unknown.remove(&source_ip);
        self.cache.insert(source_ip, Arc::clone(&entry.secret));
        Some(Arc::clone(&entry.secret))
    }
}
