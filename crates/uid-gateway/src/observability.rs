//! Gateway counters and the sink they are reported through

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Datagrams received on the accounting socket
    Received,
    AccountingStart,
    AccountingStop,
    /// Accounting requests with any other Acct-Status-Type
    AccountingOther,
    /// Datagrams or events dropped before reaching a batch
    Discarded,
    /// Events included in a submitted batch
    Sent,
    SentLogin,
    SentLogout,
    /// Events dropped by validation, filtering or classification
    Ignored,
    /// Individual mappings the firewall rejected
    FailedMapping,
}

impl Counter {
    pub const ALL: [Counter; 10] = [
        Counter::Received,
        Counter::AccountingStart,
        Counter::AccountingStop,
        Counter::AccountingOther,
        Counter::Discarded,
        Counter::Sent,
        Counter::SentLogin,
        Counter::SentLogout,
        Counter::Ignored,
        Counter::FailedMapping,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Counter::Received => "received",
            Counter::AccountingStart => "accounting-start",
            Counter::AccountingStop => "accounting-stop",
            Counter::AccountingOther => "accounting-other",
            Counter::Discarded => "discarded",
            Counter::Sent => "sent",
            Counter::SentLogin => "sent-login",
            Counter::SentLogout => "sent-logout",
            Counter::Ignored => "ignored",
            Counter::FailedMapping => "failed-mapping",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Counter::Received => "RADIUS datagrams received",
            Counter::AccountingStart => "Accounting-Start requests accepted",
            Counter::AccountingStop => "Accounting-Stop requests accepted",
            Counter::AccountingOther => "Other accounting requests accepted",
            Counter::Discarded => "Datagrams or events discarded",
            Counter::Sent => "Events submitted to the User-ID API",
            Counter::SentLogin => "Login entries submitted",
            Counter::SentLogout => "Logout entries submitted",
            Counter::Ignored => "Events ignored by validation or filtering",
            Counter::FailedMapping => "Mappings rejected by the User-ID API",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Port for reporting gateway activity
pub trait ObservabilitySink: Send + Sync {
    fn add(&self, counter: Counter, value: u64);

    fn set_queue_depth(&self, depth: u64);

    fn increment(&self, counter: Counter) {
        self.add(counter, 1);
    }
}

/// In-process counters, exported by the metrics endpoint
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    counters: [AtomicU64; Counter::ALL.len()],
    queue_depth: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    pub fn queue_depth(&self) -> u64 {
        self.queue_depth.load(Ordering::Relaxed)
    }
}

impl ObservabilitySink for GatewayMetrics {
    fn add(&self, counter: Counter, value: u64) {
        self.counters[counter.index()].fetch_add(value, Ordering::Relaxed);
    }

    fn set_queue_depth(&self, depth: u64) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }
}
