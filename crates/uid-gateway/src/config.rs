use crate::translate::NameFormat;
use ipnetwork::IpNetwork;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid regular expression {pattern:?}: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A RADIUS client (NAS or upstream RADIUS server) allowed to send accounting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadiusClient {
    /// IP address, CIDR network, or DNS host name
    pub host: String,
    /// Shared secret for this client
    pub secret: String,
    /// Optional client name/description
    #[serde(default)]
    pub name: Option<String>,
}

impl RadiusClient {
    /// Parse the host as an IP network, if it is one
    pub fn parse_network(&self) -> Option<IpNetwork> {
        // Try to parse as CIDR notation first
        if let Ok(network) = self.host.parse::<IpNetwork>() {
            return Some(network);
        }

        self.host.parse::<IpAddr>().ok().map(IpNetwork::from)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.host)
    }
}

/// One username rewrite: case-insensitive regex, every match replaced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteRule {
    #[serde(rename = "match")]
    pub pattern: String,
    #[serde(default)]
    pub replace: String,
}

impl RewriteRule {
    pub fn compile(&self) -> Result<Regex, ConfigError> {
        compile_case_insensitive(&self.pattern)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsernameRewrites {
    /// Translate names to this format after rewriting
    #[serde(default)]
    pub output_format: Option<NameFormat>,
    #[serde(default)]
    pub rules: Vec<RewriteRule>,
}

/// NetBIOS domain name and its DNS equivalent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainMapping {
    pub netbios: String,
    pub dns: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NameTranslationConfig {
    #[serde(default)]
    pub domains: Vec<DomainMapping>,
}

/// A firewall management endpoint accepting User-ID updates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEndpointConfig {
    /// Base API URL, e.g. `https://fw1.example.com/api/`
    pub url: String,
    pub api_key: String,
    /// URL-encode the key before it is added to the query string
    #[serde(default)]
    pub url_encode_key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UidApiConfig {
    /// Endpoints in failover order
    #[serde(default)]
    pub endpoints: Vec<ApiEndpointConfig>,

    #[serde(default)]
    pub disable_certificate_validation: bool,

    /// Maximum accounting events per submission (default: 200)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// How long to wait for each further event before flushing (default: 50)
    #[serde(default = "default_batch_wait_ms")]
    pub batch_wait_ms: u64,

    /// HTTP request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_batch_size() -> usize {
    200
}

fn default_batch_wait_ms() -> u64 {
    50
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for UidApiConfig {
    fn default() -> Self {
        UidApiConfig {
            endpoints: vec![],
            disable_certificate_validation: false,
            batch_size: default_batch_size(),
            batch_wait_ms: default_batch_wait_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl UidApiConfig {
    pub fn batch_wait(&self) -> Duration {
        Duration::from_millis(self.batch_wait_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Accounting listen address
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Accounting listen port (0 picks an ephemeral port)
    #[serde(default = "default_accounting_port")]
    pub accounting_port: u16,

    /// Log level: "trace", "debug", "info", "warn", "error" (default: "info")
    #[serde(default)]
    pub log_level: Option<String>,

    /// Verbose diagnostics: debug logging and reporting of every mapping failure
    #[serde(default)]
    pub debug_enabled: bool,

    /// Usernames matching this case-insensitive regex are never submitted
    #[serde(default)]
    pub username_filter: Option<String>,

    #[serde(default)]
    pub username_rewrites: UsernameRewrites,

    #[serde(default)]
    pub name_translation: NameTranslationConfig,

    /// Clients allowed to send accounting requests
    #[serde(default)]
    pub radius_clients: Vec<RadiusClient>,

    #[serde(default)]
    pub uid_api: UidApiConfig,

    /// Drop events once this many are waiting to be batched (default: unbounded)
    #[serde(default)]
    pub max_queue_depth: Option<usize>,

    /// Seconds the batch consumer gets to flush on shutdown (default: 10)
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Prometheus exporter bind address, e.g. "127.0.0.1:9090"
    #[serde(default)]
    pub metrics_address: Option<String>,
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_accounting_port() -> u16 {
    1813 // Standard RADIUS accounting port
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_address: default_listen_address(),
            accounting_port: default_accounting_port(),
            log_level: None,
            debug_enabled: false,
            username_filter: None,
            username_rewrites: UsernameRewrites::default(),
            name_translation: NameTranslationConfig::default(),
            radius_clients: vec![],
            uid_api: UidApiConfig::default(),
            max_queue_depth: None,
            shutdown_grace_secs: default_shutdown_grace_secs(),
            metrics_address: None,
        }
    }
}

pub(crate) fn compile_case_insensitive(pattern: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| ConfigError::Regex {
            pattern: pattern.to_string(),
            source,
        })
}

/// Result of [`Config::load_or_create`]
#[derive(Debug)]
pub enum ConfigLoad {
    Loaded(Config),
    /// No file existed and an example was written in its place
    Created,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, writing [`Config::example`] if the file is missing.
    ///
    /// Only a missing file is replaced. A file that exists but cannot be
    /// read, parsed or validated is left untouched and the error returned.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<ConfigLoad, ConfigError> {
        let path = path.as_ref();
        match Self::from_file(path) {
            Ok(config) => Ok(ConfigLoad::Loaded(config)),
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                let contents = serde_json::to_string_pretty(&Self::example())?;
                let mut file = fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(path)?;
                file.write_all(contents.as_bytes())?;
                Ok(ConfigLoad::Created)
            }
            Err(e) => Err(e),
        }
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get socket address for binding
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr: IpAddr = self.listen_address.parse().map_err(|_| {
            ConfigError::Invalid(format!("Invalid IP address: {}", self.listen_address))
        })?;
        Ok(SocketAddr::new(addr, self.accounting_port))
    }

    pub fn metrics_socket_addr(&self) -> Result<Option<SocketAddr>, ConfigError> {
        self.metrics_address
            .as_deref()
            .map(|addr| {
                addr.parse().map_err(|_| {
                    ConfigError::Invalid(format!("Invalid metrics address: {}", addr))
                })
            })
            .transpose()
    }

    pub fn username_filter_regex(&self) -> Result<Option<Regex>, ConfigError> {
        self.username_filter
            .as_deref()
            .filter(|pattern| !pattern.is_empty())
            .map(compile_case_insensitive)
            .transpose()
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Effective tracing filter when RUST_LOG is not set
    pub fn log_filter(&self) -> &str {
        if self.debug_enabled {
            "debug"
        } else {
            self.log_level.as_deref().unwrap_or("info")
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        self.metrics_socket_addr()?;
        self.username_filter_regex()?;

        for rule in &self.username_rewrites.rules {
            rule.compile()?;
        }

        for client in &self.radius_clients {
            if client.host.is_empty() {
                return Err(ConfigError::Invalid("RADIUS client has empty host".to_string()));
            }
            if client.secret.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "RADIUS client {} has empty secret",
                    client.host
                )));
            }
        }

        for domain in &self.name_translation.domains {
            if domain.netbios.is_empty() || domain.dns.is_empty() {
                return Err(ConfigError::Invalid(
                    "Domain mapping needs both netbios and dns names".to_string(),
                ));
            }
        }

        if self.uid_api.batch_size == 0 {
            return Err(ConfigError::Invalid("Batch size cannot be 0".to_string()));
        }

        for endpoint in &self.uid_api.endpoints {
            let url = Url::parse(&endpoint.url).map_err(|e| {
                ConfigError::Invalid(format!("Invalid endpoint URL {}: {}", endpoint.url, e))
            })?;
            if url.cannot_be_a_base() {
                return Err(ConfigError::Invalid(format!(
                    "Endpoint URL {} is not a base URL",
                    endpoint.url
                )));
            }
            if endpoint.api_key.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Endpoint {} has empty API key",
                    endpoint.url
                )));
            }
        }

        if self.max_queue_depth == Some(0) {
            return Err(ConfigError::Invalid("max_queue_depth cannot be 0".to_string()));
        }

        Ok(())
    }

    /// Create an example configuration file
    pub fn example() -> Self {
        Config {
            listen_address: "0.0.0.0".to_string(),
            accounting_port: 1813,
            log_level: Some("info".to_string()),
            debug_enabled: false,
            username_filter: Some(r"^host/".to_string()),
            username_rewrites: UsernameRewrites {
                output_format: Some(NameFormat::Upn),
                rules: vec![RewriteRule {
                    pattern: r"^LEGACY\\".to_string(),
                    replace: r"CORP\".to_string(),
                }],
            },
            name_translation: NameTranslationConfig {
                domains: vec![DomainMapping {
                    netbios: "CORP".to_string(),
                    dns: "corp.example.com".to_string(),
                }],
            },
            radius_clients: vec![
                RadiusClient {
                    host: "192.168.1.0/24".to_string(),
                    secret: "client_secret_1".to_string(),
                    name: Some("Wireless controllers".to_string()),
                },
                RadiusClient {
                    host: "vpn.example.com".to_string(),
                    secret: "client_secret_2".to_string(),
                    name: Some("VPN Gateway".to_string()),
                },
            ],
            uid_api: UidApiConfig {
                endpoints: vec![
                    ApiEndpointConfig {
                        url: "https://fw1.example.com/api/".to_string(),
                        api_key: "changeme".to_string(),
                        url_encode_key: false,
                    },
                    ApiEndpointConfig {
                        url: "https://fw2.example.com/api/".to_string(),
                        api_key: "changeme".to_string(),
                        url_encode_key: false,
                    },
                ],
                ..UidApiConfig::default()
            },
            max_queue_depth: Some(100_000),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            metrics_address: Some("127.0.0.1:9090".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(host: &str) -> RadiusClient {
        RadiusClient {
            host: host.to_string(),
            secret: "secret".to_string(),
            name: None,
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.accounting_port, 1813);
        assert_eq!(config.uid_api.batch_size, 200);
        assert_eq!(config.uid_api.batch_wait(), Duration::from_millis(50));
        assert_eq!(config.uid_api.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_example_config_is_valid() {
        assert!(Config::example().validate().is_ok());
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "radius_clients": [{"host": "10.0.0.1", "secret": "s"}],
                "uid_api": {"endpoints": [{"url": "https://fw/api/", "api_key": "k"}]},
                "username_rewrites": {"output_format": "nt4", "rules": [{"match": "a", "replace": "b"}]}
            }"#,
        )
        .unwrap();

        assert_eq!(config.listen_address, "0.0.0.0");
        assert_eq!(config.uid_api.batch_size, 200);
        assert!(!config.uid_api.endpoints[0].url_encode_key);
        assert_eq!(config.username_rewrites.output_format, Some(NameFormat::Nt4));
        assert_eq!(config.username_rewrites.rules[0].pattern, "a");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.uid_api.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.username_filter = Some("(unclosed".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Regex { .. })));

        let mut config = Config::default();
        config.radius_clients = vec![RadiusClient {
            secret: String::new(),
            ..client("10.0.0.1")
        }];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.uid_api.endpoints = vec![ApiEndpointConfig {
            url: "not a url".to_string(),
            api_key: "k".to_string(),
            url_encode_key: false,
        }];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.listen_address = "nope".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_socket_addr() {
        let config = Config::default();
        let addr = config.socket_addr().unwrap();
        assert_eq!(addr.port(), 1813);
        assert_eq!(config.metrics_socket_addr().unwrap(), None);
    }

    #[test]
    fn test_client_networks() {
        let exact = client("192.168.1.1").parse_network().unwrap();
        assert!(exact.contains("192.168.1.1".parse().unwrap()));
        assert!(!exact.contains("192.168.1.2".parse().unwrap()));

        let net = client("10.0.0.0/8").parse_network().unwrap();
        assert!(net.contains("10.255.255.255".parse().unwrap()));
        assert!(!net.contains("11.0.0.1".parse().unwrap()));

        assert!(client("vpn.example.com").parse_network().is_none());
    }

    #[test]
    fn test_log_filter() {
        let mut config = Config::default();
        assert_eq!(config.log_filter(), "info");
        config.log_level = Some("warn".to_string());
        assert_eq!(config.log_filter(), "warn");
        config.debug_enabled = true;
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.json");

        Config::example().to_file(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.uid_api.endpoints.len(), 2);
        assert_eq!(loaded.radius_clients[1].host, "vpn.example.com");
    }

    #[test]
    fn test_load_or_create_writes_example_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.json");

        assert!(matches!(Config::load_or_create(&path).unwrap(), ConfigLoad::Created));
        match Config::load_or_create(&path).unwrap() {
            ConfigLoad::Loaded(config) => assert_eq!(config.uid_api.endpoints.len(), 2),
            ConfigLoad::Created => panic!("example was written twice"),
        }
    }

    #[test]
    fn test_load_or_create_keeps_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.json");
        let contents = r#"{
            "radius_clients": [{"host": "10.0.0.1", "secret": "keep-me"}],
            "username_filter": "(unclosed"
        }"#;
        std::fs::write(&path, contents).unwrap();

        assert!(matches!(
            Config::load_or_create(&path),
            Err(ConfigError::Regex { .. })
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), contents);
    }

    #[test]
    fn test_load_or_create_keeps_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.json");
        std::fs::write(&path, "{ \"radius_clients\": [").unwrap();

        assert!(matches!(
            Config::load_or_create(&path),
            Err(ConfigError::Parse(_))
        ));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{ \"radius_clients\": ["
        );
    }
}
