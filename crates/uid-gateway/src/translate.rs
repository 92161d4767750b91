//! Account name translation between `DOMAIN\user` and `user@domain`

use crate::config::DomainMapping;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// How long a domain that failed to resolve is skipped
pub const FAILED_DOMAIN_TTL: Duration = Duration::from_secs(8 * 60 * 60);

/// Target account name format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameFormat {
    /// `user@dns.domain`
    Upn,
    /// `NETBIOS\user`
    Nt4,
}

impl NameFormat {
    /// Whether `name` already looks like this format
    pub fn is_in_format(self, name: &str) -> bool {
        match self {
            NameFormat::Upn => name.contains('@'),
            NameFormat::Nt4 => name.contains('\\'),
        }
    }

    /// The format names are translated from when this one is the target
    pub fn other(self) -> Self {
        match self {
            NameFormat::Upn => NameFormat::Nt4,
            NameFormat::Nt4 => NameFormat::Upn,
        }
    }

    /// Domain part of a name in the *other* format, used as the failure cache key
    pub fn source_domain(self, name: &str) -> &str {
        match self {
            NameFormat::Upn => name.split('\\').next().unwrap_or(name),
            NameFormat::Nt4 => name.rsplit('@').next().unwrap_or(name),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error("account {0} was not found in the directory")]
    NotFound(String),
    #[error("domain {0} is unknown")]
    DomainNotFound(String),
    #[error("name translation failed: {0}")]
    Other(String),
}

/// Directory lookup that rewrites an account name into another format
pub trait NameTranslator: Send + Sync {
    /// Translate `name`, written in `from`, into `to`
    fn translate(&self, name: &str, from: NameFormat, to: NameFormat)
        -> Result<String, TranslateError>;
}

/// Translator backed by a fixed NetBIOS to DNS domain table
#[derive(Debug, Default)]
pub struct StaticNameTranslator {
    by_netbios: HashMap<String, String>,
    by_dns: HashMap<String, String>,
}

impl StaticNameTranslator {
    pub fn new(domains: &[DomainMapping]) -> Self {
        let mut translator = StaticNameTranslator::default();
        for domain in domains {
            translator
                .by_netbios
                .insert(domain.netbios.to_lowercase(), domain.dns.clone());
            translator
                .by_dns
                .insert(domain.dns.to_lowercase(), domain.netbios.clone());
        }
        translator
    }
}

impl NameTranslator for StaticNameTranslator {
    fn translate(
        &self,
        name: &str,
        from: NameFormat,
        to: NameFormat,
    ) -> Result<String, TranslateError> {
        match (from, to) {
            (NameFormat::Nt4, NameFormat::Upn) => {
                let (domain, user) = name
                    .split_once('\\')
                    .filter(|(d, u)| !d.is_empty() && !u.is_empty())
                    .ok_or_else(|| TranslateError::NotFound(name.to_string()))?;
                let dns = self
                    .by_netbios
                    .get(&domain.to_lowercase())
                    .ok_or_else(|| TranslateError::DomainNotFound(domain.to_string()))?;
                Ok(format!("{}@{}", user, dns))
            }
            (NameFormat::Upn, NameFormat::Nt4) => {
                let (user, domain) = name
                    .rsplit_once('@')
                    .filter(|(u, d)| !u.is_empty() && !d.is_empty())
                    .ok_or_else(|| TranslateError::NotFound(name.to_string()))?;
                let netbios = self
                    .by_dns
                    .get(&domain.to_lowercase())
                    .ok_or_else(|| TranslateError::DomainNotFound(domain.to_string()))?;
                Ok(format!("{}\\{}", netbios, user))
            }
            _ => Ok(name.to_string()),
        }
    }
}

/// Domains whose lookups recently failed, keyed case-insensitively
pub struct FailedDomainCache {
    entries: DashMap<String, Instant>,
    ttl: Duration,
}

impl FailedDomainCache {
    pub fn new(ttl: Duration) -> Self {
        FailedDomainCache {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn insert(&self, domain: &str) {
        self.entries.insert(domain.to_lowercase(), Instant::now());
    }

    /// Whether the domain failed within the TTL. Expired entries are removed.
    pub fn contains(&self, domain: &str) -> bool {
        let key = domain.to_lowercase();
        let fresh = match self.entries.get(&key) {
            Some(failed_at) => failed_at.elapsed() < self.ttl,
            None => return false,
        };
        if !fresh {
            self.entries.remove(&key);
        }
        fresh
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for FailedDomainCache {
    fn default() -> Self {
        Self::new(FAILED_DOMAIN_TTL)
    }
}

/// Optional translation step applied to every username
pub struct UsernameTranslation {
    format: NameFormat,
    translator: Arc<dyn NameTranslator>,
    failed_domains: FailedDomainCache,
}

impl UsernameTranslation {
    pub fn new(format: NameFormat, translator: Arc<dyn NameTranslator>) -> Self {
        UsernameTranslation {
            format,
            translator,
            failed_domains: FailedDomainCache::default(),
        }
    }

    pub fn with_failed_domains(mut self, cache: FailedDomainCache) -> Self {
        self.failed_domains = cache;
        self
    }

    pub fn failed_domains(&self) -> &FailedDomainCache {
        &self.failed_domains
    }

    /// Translate `name`, keeping it unchanged on any failure
    pub fn apply(&self, name: &str) -> String {
        if self.format.is_in_format(name) {
            return name.to_string();
        }

        let domain = self.format.source_domain(name);
        if !domain.trim().is_empty() && self.failed_domains.contains(domain) {
            debug!(
                username = %name,
                domain = %domain,
                "Skipping translation for domain in failed domain cache"
            );
            return name.to_string();
        }

        match self
            .translator
            .translate(name, self.format.other(), self.format)
        {
            Ok(translated) => translated,
            Err(TranslateError::NotFound(_)) => {
                warn!(
                    username = %name,
                    "Could not translate name as it was not found in the directory"
                );
                name.to_string()
            }
            Err(TranslateError::DomainNotFound(_)) => {
                if !domain.trim().is_empty() {
                    self.failed_domains.insert(domain);
                }
                warn!(
                    username = %name,
                    domain = %domain,
                    "Could not translate name as the domain was unknown; further names from this domain will not be translated"
                );
                name.to_string()
            }
            Err(e) => {
                warn!(username = %name, error = %e, "Could not translate name");
                name.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn table() -> StaticNameTranslator {
        StaticNameTranslator::new(&[DomainMapping {
            netbios: "CORP".to_string(),
            dns: "corp.example.com".to_string(),
        }])
    }

    /// Counts lookups and delegates to the static table
    struct CountingTranslator {
        calls: AtomicUsize,
        formats: Mutex<Vec<(NameFormat, NameFormat)>>,
        inner: StaticNameTranslator,
    }

    impl NameTranslator for CountingTranslator {
        fn translate(
            &self,
            name: &str,
            from: NameFormat,
            to: NameFormat,
        ) -> Result<String, TranslateError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.formats.lock().unwrap().push((from, to));
            self.inner.translate(name, from, to)
        }
    }

    fn counting() -> Arc<CountingTranslator> {
        Arc::new(CountingTranslator {
            calls: AtomicUsize::new(0),
            formats: Mutex::new(Vec::new()),
            inner: table(),
        })
    }

    #[test]
    fn test_static_translation() {
        let t = table();
        assert_eq!(
            t.translate(r"corp\alice", NameFormat::Nt4, NameFormat::Upn).unwrap(),
            "alice@corp.example.com"
        );
        assert_eq!(
            t.translate("bob@CORP.example.com", NameFormat::Upn, NameFormat::Nt4)
                .unwrap(),
            r"CORP\bob"
        );
        assert_eq!(
            t.translate(r"OTHER\carol", NameFormat::Nt4, NameFormat::Upn),
            Err(TranslateError::DomainNotFound("OTHER".to_string()))
        );
        assert_eq!(
            t.translate("dave", NameFormat::Nt4, NameFormat::Upn),
            Err(TranslateError::NotFound("dave".to_string()))
        );
    }

    #[test]
    fn test_same_format_is_returned_unchanged() {
        let t = table();
        assert_eq!(
            t.translate("erin@elsewhere.org", NameFormat::Upn, NameFormat::Upn)
                .unwrap(),
            "erin@elsewhere.org"
        );
        assert_eq!(
            t.translate(r"NOWHERE\erin", NameFormat::Nt4, NameFormat::Nt4).unwrap(),
            r"NOWHERE\erin"
        );
    }

    #[test]
    fn test_apply_translates_from_the_other_format() {
        let translator = counting();
        UsernameTranslation::new(NameFormat::Upn, translator.clone()).apply(r"CORP\alice");
        UsernameTranslation::new(NameFormat::Nt4, translator.clone()).apply("bob@corp.example.com");

        assert_eq!(
            *translator.formats.lock().unwrap(),
            vec![
                (NameFormat::Nt4, NameFormat::Upn),
                (NameFormat::Upn, NameFormat::Nt4)
            ]
        );
        assert_eq!(NameFormat::Upn.other(), NameFormat::Nt4);
        assert_eq!(NameFormat::Nt4.other(), NameFormat::Upn);
    }

    #[test]
    fn test_source_domain() {
        assert_eq!(NameFormat::Upn.source_domain(r"CORP\alice"), "CORP");
        assert_eq!(NameFormat::Upn.source_domain("alice"), "alice");
        assert_eq!(NameFormat::Nt4.source_domain("a@b@corp.com"), "corp.com");
    }

    #[test]
    fn test_already_in_target_format_is_untouched() {
        let translator = counting();
        let step = UsernameTranslation::new(NameFormat::Upn, translator.clone());
        assert_eq!(step.apply("alice@corp.example.com"), "alice@corp.example.com");
        assert_eq!(translator.calls.load(Ordering::Relaxed), 0);

        let step = UsernameTranslation::new(NameFormat::Nt4, translator.clone());
        assert_eq!(step.apply(r"CORP\alice"), r"CORP\alice");
        assert_eq!(translator.calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_unknown_domain_is_cached() {
        let translator = counting();
        let step = UsernameTranslation::new(NameFormat::Upn, translator.clone());

        assert_eq!(step.apply(r"OTHER\carol"), r"OTHER\carol");
        assert_eq!(step.apply(r"other\erin"), r"other\erin");
        assert_eq!(translator.calls.load(Ordering::Relaxed), 1);
        assert!(step.failed_domains().contains("Other"));

        assert_eq!(step.apply(r"CORP\alice"), "alice@corp.example.com");
    }

    #[test]
    fn test_not_found_is_not_cached() {
        let translator = counting();
        let step = UsernameTranslation::new(NameFormat::Upn, translator.clone());

        assert_eq!(step.apply("dave"), "dave");
        assert_eq!(step.apply("dave"), "dave");
        assert_eq!(translator.calls.load(Ordering::Relaxed), 2);
        assert!(step.failed_domains().is_empty());
    }

    #[test]
    fn test_failed_domain_cache_expires() {
        let cache = FailedDomainCache::new(Duration::ZERO);
        cache.insert("CORP");
        assert!(!cache.contains("corp"));
        assert!(cache.is_empty());
    }
}
