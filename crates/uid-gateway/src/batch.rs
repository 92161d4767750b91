//! Turns a window of accounting events into one User-ID update

use crate::config::{compile_case_insensitive, Config, ConfigError};
use crate::event::{AccountingEvent, EventError};
use crate::observability::{Counter, ObservabilitySink};
use crate::translate::{NameTranslator, UsernameTranslation};
use radius_proto::AcctStatusType;
use regex::Regex;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// One user to address mapping
///
/// Two entries are equal when username and address match; the timeout is
/// not part of the identity.
#[derive(Debug, Clone, Eq)]
pub struct Entry {
    pub username: String,
    pub ip: IpAddr,
    /// Mapping lifetime in minutes, if the firewall default should be overridden
    pub timeout: Option<u32>,
}

impl Entry {
    pub fn new(username: impl Into<String>, ip: IpAddr) -> Self {
        Entry {
            username: username.into(),
            ip,
            timeout: None,
        }
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.username == other.username && self.ip == other.ip
    }
}

impl Hash for Entry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.username.hash(state);
        self.ip.hash(state);
    }
}

/// Login and logout sets for one submission, in insertion order
///
/// An entry is never in both sets: adding it to one removes it from the
/// other, so the later event wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchMessage {
    login: Vec<Entry>,
    logout: Vec<Entry>,
}

impl BatchMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_login(&mut self, entry: Entry) {
        if self.logout.contains(&entry) {
            debug!(
                username = %entry.username,
                ip = %entry.ip,
                "Removed logout entry superseded by login"
            );
            self.logout.retain(|e| e != &entry);
        }
        if !self.login.contains(&entry) {
            self.login.push(entry);
        }
    }

    pub fn add_logout(&mut self, entry: Entry) {
        if self.login.contains(&entry) {
            debug!(
                username = %entry.username,
                ip = %entry.ip,
                "Removed login entry superseded by logout"
            );
            self.login.retain(|e| e != &entry);
        }
        if !self.logout.contains(&entry) {
            self.logout.push(entry);
        }
    }

    pub fn login(&self) -> &[Entry] {
        &self.login
    }

    pub fn logout(&self) -> &[Entry] {
        &self.logout
    }

    pub fn len(&self) -> usize {
        self.login.len() + self.logout.len()
    }

    pub fn is_empty(&self) -> bool {
        self.login.is_empty() && self.logout.is_empty()
    }
}

/// What happened to one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Added this many login entries
    Login(usize),
    /// Added this many logout entries
    Logout(usize),
    Invalid(EventError),
    /// Username matched the drop filter
    Filtered,
    /// No Framed-IP-Address or Framed-IPv6-Address
    NoAddress,
    UnsupportedStatus(u32),
}

impl Disposition {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Disposition::Login(_) | Disposition::Logout(_))
    }
}

/// Username rewrite, translation, filtering and login/logout classification
pub struct BatchAssembler {
    rewrites: Vec<(Regex, String)>,
    translation: Option<UsernameTranslation>,
    filter: Option<Regex>,
    sink: Arc<dyn ObservabilitySink>,
}

impl BatchAssembler {
    pub fn new(
        rewrites: Vec<(Regex, String)>,
        translation: Option<UsernameTranslation>,
        filter: Option<Regex>,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Self {
        BatchAssembler {
            rewrites,
            translation,
            filter,
            sink,
        }
    }

    pub fn from_config(
        config: &Config,
        translator: Arc<dyn NameTranslator>,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Result<Self, ConfigError> {
        let rewrites = config
            .username_rewrites
            .rules
            .iter()
            .map(|rule| Ok((compile_case_insensitive(&rule.pattern)?, rule.replace.clone())))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let translation = config
            .username_rewrites
            .output_format
            .map(|format| UsernameTranslation::new(format, translator));

        Ok(Self::new(
            rewrites,
            translation,
            config.username_filter_regex()?,
            sink,
        ))
    }

    /// Apply every rewrite rule in order, each replacing all of its matches
    pub fn rewrite(&self, username: &str) -> String {
        self.rewrites
            .iter()
            .fold(username.to_string(), |name, (pattern, replacement)| {
                pattern.replace_all(&name, replacement.as_str()).into_owned()
            })
    }

    /// Rewritten and, if configured, translated username
    pub fn resolve_username(&self, username: &str) -> String {
        let rewritten = self.rewrite(username);
        match &self.translation {
            Some(translation) => translation.apply(&rewritten),
            None => rewritten,
        }
    }

    fn is_filtered(&self, username: &str) -> bool {
        self.filter
            .as_ref()
            .is_some_and(|filter| filter.is_match(username))
    }

    /// Fold one event into `message`
    pub fn add_event(&self, message: &mut BatchMessage, event: &AccountingEvent) -> Disposition {
        let disposition = self.classify(message, event);

        match &disposition {
            Disposition::Login(_) | Disposition::Logout(_) => {}
            Disposition::Invalid(e) => debug!(
                source = %event.source(),
                error = %e,
                "Accounting event had incomplete information, ignoring"
            ),
            Disposition::Filtered => debug!(
                source = %event.source(),
                "Accounting event username matched the filter, ignoring"
            ),
            Disposition::NoAddress => debug!(
                source = %event.source(),
                "Accounting event had no framed address, ignoring"
            ),
            Disposition::UnsupportedStatus(status) => debug!(
                source = %event.source(),
                status_type = status,
                event = %event,
                "Accounting event had an unsupported status type, ignoring"
            ),
        }
        if !disposition.is_accepted() {
            self.sink.increment(Counter::Ignored);
        }

        disposition
    }

    fn classify(&self, message: &mut BatchMessage, event: &AccountingEvent) -> Disposition {
        let (status, raw_username) = match event.validate() {
            Ok(valid) => valid,
            Err(e) => return Disposition::Invalid(e),
        };

        let username = self.resolve_username(raw_username);
        if self.is_filtered(&username) {
            return Disposition::Filtered;
        }

        let addresses = event.framed_addresses();
        if addresses.is_empty() {
            return Disposition::NoAddress;
        }
        let count = addresses.len();
        let entries = addresses
            .into_iter()
            .map(|ip| Entry::new(username.clone(), ip));

        match AcctStatusType::from_u32(status) {
            Some(s) if s.is_session_active() => {
                entries.for_each(|e| message.add_login(e));
                Disposition::Login(count)
            }
            Some(AcctStatusType::Stop) => {
                entries.for_each(|e| message.add_logout(e));
                Disposition::Logout(count)
            }
            _ => Disposition::UnsupportedStatus(status),
        }
    }

    /// Build the update for a window of events
    pub fn assemble(&self, events: &[AccountingEvent]) -> BatchMessage {
        let mut message = BatchMessage::new();
        for event in events {
            self.add_event(&mut message, event);
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DomainMapping, RewriteRule};
    use crate::observability::GatewayMetrics;
    use crate::translate::{NameFormat, StaticNameTranslator};
    use radius_proto::{Attribute, AttributeType};
    use std::net::Ipv4Addr;

    fn event(status: u32, username: &str, ips: &[&str]) -> AccountingEvent {
        let mut attributes = vec![
            Attribute::integer(AttributeType::AcctStatusType.as_u8(), status).unwrap(),
            Attribute::string(AttributeType::UserName.as_u8(), username).unwrap(),
        ];
        for ip in ips {
            let attr = match ip.parse::<IpAddr>().unwrap() {
                IpAddr::V4(v4) => Attribute::ipv4(AttributeType::FramedIpAddress.as_u8(), v4),
                IpAddr::V6(v6) => Attribute::ipv6(AttributeType::FramedIpv6Address.as_u8(), v6),
            };
            attributes.push(attr.unwrap());
        }
        AccountingEvent::new("10.255.0.1".parse().unwrap(), attributes)
    }

    fn assembler(config: &Config) -> (BatchAssembler, Arc<GatewayMetrics>) {
        let metrics = Arc::new(GatewayMetrics::new());
        let translator = Arc::new(StaticNameTranslator::new(&config.name_translation.domains));
        let assembler = BatchAssembler::from_config(config, translator, metrics.clone()).unwrap();
        (assembler, metrics)
    }

    fn names(entries: &[Entry]) -> Vec<(&str, String)> {
        entries
            .iter()
            .map(|e| (e.username.as_str(), e.ip.to_string()))
            .collect()
    }

    #[test]
    fn test_entry_identity_ignores_timeout() {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let mut a = Entry::new("alice", ip);
        let b = Entry::new("alice", ip);
        a.timeout = Some(60);
        assert_eq!(a, b);
        assert_ne!(a, Entry::new("bob", ip));
    }

    #[test]
    fn test_start_then_stop_keeps_only_logout() {
        let (assembler, _) = assembler(&Config::default());
        let message = assembler.assemble(&[
            event(1, "alice", &["10.0.0.1"]),
            event(2, "alice", &["10.0.0.1"]),
        ]);

        assert!(message.login().is_empty());
        assert_eq!(names(message.logout()), vec![("alice", "10.0.0.1".to_string())]);
    }

    #[test]
    fn test_stop_then_start_keeps_only_login() {
        let (assembler, _) = assembler(&Config::default());
        let message = assembler.assemble(&[
            event(2, "alice", &["10.0.0.1"]),
            event(3, "alice", &["10.0.0.1"]),
        ]);

        assert_eq!(names(message.login()), vec![("alice", "10.0.0.1".to_string())]);
        assert!(message.logout().is_empty());
    }

    #[test]
    fn test_one_entry_per_address_in_order() {
        let (assembler, _) = assembler(&Config::default());
        let message = assembler.assemble(&[
            event(1, "bob", &["fd00::2", "10.0.0.2"]),
            event(1, "carol", &["10.0.0.3"]),
            event(1, "bob", &["10.0.0.2"]),
        ]);

        assert_eq!(
            names(message.login()),
            vec![
                ("bob", "10.0.0.2".to_string()),
                ("bob", "fd00::2".to_string()),
                ("carol", "10.0.0.3".to_string()),
            ]
        );
        assert_eq!(message.len(), 3);
    }

    #[test]
    fn test_ignored_events_are_counted() {
        let mut config = Config::default();
        config.username_filter = Some("^host/".to_string());
        let (assembler, metrics) = assembler(&config);

        let mut message = BatchMessage::new();
        let no_user = AccountingEvent::new(
            "10.255.0.1".parse().unwrap(),
            vec![Attribute::integer(AttributeType::AcctStatusType.as_u8(), 1).unwrap()],
        );

        assert!(matches!(
            assembler.add_event(&mut message, &no_user),
            Disposition::Invalid(EventError::MissingAttribute("User-Name"))
        ));
        assert_eq!(
            assembler.add_event(&mut message, &event(1, "HOST/laptop", &["10.0.0.1"])),
            Disposition::Filtered
        );
        assert_eq!(
            assembler.add_event(&mut message, &event(1, "alice", &[])),
            Disposition::NoAddress
        );
        assert_eq!(
            assembler.add_event(&mut message, &event(7, "alice", &["10.0.0.1"])),
            Disposition::UnsupportedStatus(7)
        );
        assert_eq!(
            assembler.add_event(&mut message, &event(1, "alice", &["10.0.0.1"])),
            Disposition::Login(1)
        );

        assert_eq!(metrics.get(Counter::Ignored), 4);
        assert_eq!(message.len(), 1);
    }

    #[test]
    fn test_rewrite_rules_are_cumulative_and_case_insensitive() {
        let mut config = Config::default();
        config.username_rewrites.rules = vec![
            RewriteRule {
                pattern: r"^legacy\\".to_string(),
                replace: r"CORP\".to_string(),
            },
            RewriteRule {
                pattern: r"^corp\\(\w+)\.admin$".to_string(),
                replace: r"CORP\$1".to_string(),
            },
        ];
        let (assembler, _) = assembler(&config);

        assert_eq!(assembler.rewrite(r"LEGACY\alice.admin"), r"CORP\alice");
        assert_eq!(assembler.rewrite("bob"), "bob");
    }

    #[test]
    fn test_rewrite_replaces_every_match() {
        let mut config = Config::default();
        config.username_rewrites.rules = vec![RewriteRule {
            pattern: r"\.".to_string(),
            replace: "_".to_string(),
        }];
        let (dots, _) = assembler(&config);
        assert_eq!(dots.rewrite("john.q.public"), "john_q_public");

        config.username_rewrites.rules = vec![RewriteRule {
            pattern: "A".to_string(),
            replace: "x".to_string(),
        }];
        let (letters, _) = assembler(&config);
        assert_eq!(letters.rewrite("banana"), "bxnxnx");
    }

    #[test]
    fn test_rewrite_is_idempotent_when_output_no_longer_matches() {
        let mut config = Config::default();
        config.username_rewrites.rules = vec![RewriteRule {
            pattern: "@old\\.example\\.com$".to_string(),
            replace: "@corp.example.com".to_string(),
        }];
        let (assembler, _) = assembler(&config);

        let once = assembler.rewrite("alice@OLD.example.com");
        assert_eq!(once, "alice@corp.example.com");
        assert_eq!(assembler.rewrite(&once), once);
    }

    #[test]
    fn test_translation_then_filter() {
        let mut config = Config::default();
        config.username_rewrites.output_format = Some(NameFormat::Upn);
        config.name_translation.domains = vec![DomainMapping {
            netbios: "CORP".to_string(),
            dns: "corp.example.com".to_string(),
        }];
        config.username_filter = Some("^svc_".to_string());
        let (assembler, _) = assembler(&config);

        let message = assembler.assemble(&[
            event(1, r"CORP\alice", &["10.0.0.1"]),
            event(1, r"CORP\svc_backup", &["10.0.0.2"]),
            event(1, r"UNKNOWN\bob", &["10.0.0.3"]),
        ]);

        assert_eq!(
            names(message.login()),
            vec![
                ("alice@corp.example.com", "10.0.0.1".to_string()),
                (r"UNKNOWN\bob", "10.0.0.3".to_string()),
            ]
        );
    }
}
