//! Server configuration and CLI argument parsing
//!
//! This module handles all server configuration through:
//! - Positional `host` and `port` arguments
//! - Command-line flags
//! - Environment variables (with VORTEXBOX_ prefix)
//!
//! # Configuration Priority
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Default values (lowest priority)
//!
//! # Example Usage
//!
//! ```bash
//! # Plaintext on all interfaces
//! vortexbox-server 0.0.0.0 8080
//!
//! # TLS terminated
//! vortexbox-server 0.0.0.0 8443 --ssl-public-key cert.pem --ssl-private-key key.pem
//!
//! # Using environment variables
//! export VORTEXBOX_RATE_LIMIT=120
//! export VORTEXBOX_STORE_FAILURE_POLICY=closed
//! vortexbox-server 127.0.0.1 8080
//! ```

use crate::error::ConfigError;
use crate::transport::{self, TransportConfig};
use anyhow::{Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the server
///
/// Built once from CLI arguments and environment variables; immutable
/// afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address and optional TLS material
    pub transport: TransportConfig,
    /// Rate limiting parameters
    pub admission: AdmissionConfig,
    /// Counter and account store configuration
    pub store: StoreConfig,
    /// Upload handling
    pub upload: UploadConfig,
    /// Account and session handling
    pub accounts: AccountConfig,
    /// How long in-flight requests may run after a shutdown signal
    pub shutdown_grace: Duration,
    /// Channel buffer size for the in-process counter actor
    pub buffer_size: usize,
    /// Logging level (error, warn, info, debug, trace)
    pub log_level: String,
}

/// Admission control configuration
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Requests allowed per window
    pub limit: u64,
    /// Window length
    pub period: Duration,
    /// What to do when the store cannot be reached
    pub failure_policy: FailurePolicy,
    /// How clients are told apart
    pub key_granularity: KeyGranularity,
    /// Take the client address from `X-Forwarded-For` when present
    pub trust_forwarded_for: bool,
}

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Which backend holds counters, accounts and sessions
    pub backend: StoreBackend,
    /// Redis connection URL
    pub redis_url: String,
    /// Upper bound on a single store round trip
    pub timeout: Duration,
    /// Prefix for every key written to the store
    pub key_prefix: String,
    /// Initial capacity of the in-memory window table
    pub capacity: usize,
    /// Sweep interval of the in-memory window table
    pub cleanup_interval: Duration,
}

/// Upload configuration
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Directory artifacts are written to
    pub dir: PathBuf,
    /// Largest accepted artifact, in bytes
    pub max_bytes: u64,
    /// Require a valid session for upload and download
    pub require_session: bool,
}

/// Account configuration
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// Lifetime of a login session
    pub session_ttl: Duration,
}

/// Behavior when the shared store is unreachable
///
/// The policy is fixed for the lifetime of the process; every request in a
/// degraded period is treated the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Admit every request and log the degradation
    Open,
    /// Reject every request with 503 Service Unavailable
    Closed,
}

impl std::str::FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "open" => Ok(FailurePolicy::Open),
            "closed" => Ok(FailurePolicy::Closed),
            _ => Err(anyhow!(
                "Invalid failure policy: {}. Valid options are: open, closed",
                s
            )),
        }
    }
}

/// Granularity of the rate limit key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyGranularity {
    /// One window per client IP address
    Ip,
    /// One window per logged-in account, falling back to the IP address
    /// for requests without a valid session
    Session,
}

impl std::str::FromStr for KeyGranularity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ip" => Ok(KeyGranularity::Ip),
            "session" => Ok(KeyGranularity::Session),
            _ => Err(anyhow!(
                "Invalid rate limit key: {}. Valid options are: ip, session",
                s
            )),
        }
    }
}

/// Available store backends
///
/// - **Redis**: shared between server processes; the production setting
/// - **Memory**: process-local; for development and single-instance use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(anyhow!(
                "Invalid store backend: {}. Valid options are: redis, memory",
                s
            )),
        }
    }
}

/// Command-line arguments for the server
///
/// All arguments can also be set via environment variables with the
/// VORTEXBOX_ prefix. CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(
    name = "vortexbox-server",
    about = "VortexBox companion server",
    long_about = "Serves VortexBox configuration and file payloads over HTTP(S) with shared rate limiting.\n\nWithout --ssl-public-key/--ssl-private-key the server listens in plaintext.\n\nEnvironment variables with VORTEXBOX_ prefix are supported. CLI arguments take precedence over environment variables."
)]
pub struct Args {
    #[arg(
        value_name = "HOST",
        help = "Address to bind to",
        required_unless_present = "list_env_vars",
        env = "VORTEXBOX_HOST"
    )]
    pub host: Option<String>,
    #[arg(
        value_name = "PORT",
        help = "Port to listen on (1-65535)",
        required_unless_present = "list_env_vars",
        value_parser = clap::value_parser!(u16).range(1..),
        env = "VORTEXBOX_PORT"
    )]
    pub port: Option<u16>,

    // TLS
    #[arg(
        long,
        value_name = "PATH",
        help = "PEM certificate chain; enables TLS together with --ssl-private-key",
        env = "VORTEXBOX_SSL_PUBLIC_KEY"
    )]
    pub ssl_public_key: Option<PathBuf>,
    #[arg(
        long,
        value_name = "PATH",
        help = "PEM private key; enables TLS together with --ssl-public-key",
        env = "VORTEXBOX_SSL_PRIVATE_KEY"
    )]
    pub ssl_private_key: Option<PathBuf>,

    // Rate limiting
    #[arg(
        long,
        value_name = "N",
        help = "Requests allowed per client per window",
        default_value_t = 60,
        env = "VORTEXBOX_RATE_LIMIT"
    )]
    pub rate_limit: u64,
    #[arg(
        long,
        value_name = "SECS",
        help = "Rate limit window length (seconds)",
        default_value_t = 60,
        env = "VORTEXBOX_RATE_PERIOD"
    )]
    pub rate_period: u64,
    #[arg(
        long,
        value_name = "KEY",
        help = "Rate limit key: ip, session",
        default_value = "ip",
        env = "VORTEXBOX_RATE_KEY"
    )]
    pub rate_key: KeyGranularity,
    #[arg(
        long,
        help = "Identify clients by the X-Forwarded-For header (only behind a trusted proxy)",
        env = "VORTEXBOX_TRUST_FORWARDED_FOR"
    )]
    pub trust_forwarded_for: bool,

    // Store
    #[arg(
        long,
        value_name = "TYPE",
        help = "Store backend: redis, memory",
        default_value = "redis",
        env = "VORTEXBOX_STORE"
    )]
    pub store: StoreBackend,
    #[arg(
        long,
        value_name = "URL",
        help = "Redis connection URL",
        default_value = "redis://127.0.0.1:6379/",
        env = "VORTEXBOX_REDIS_URL"
    )]
    pub redis_url: String,
    #[arg(
        long,
        value_name = "MS",
        help = "Timeout for a single store operation (milliseconds)",
        default_value_t = 250,
        env = "VORTEXBOX_STORE_TIMEOUT_MS"
    )]
    pub store_timeout_ms: u64,
    #[arg(
        long,
        value_name = "POLICY",
        help = "Behavior when the store is unreachable: open, closed",
        default_value = "open",
        env = "VORTEXBOX_STORE_FAILURE_POLICY"
    )]
    pub store_failure_policy: FailurePolicy,
    #[arg(
        long,
        value_name = "PREFIX",
        help = "Prefix for all store keys",
        default_value = "vortexbox",
        env = "VORTEXBOX_KEY_PREFIX"
    )]
    pub key_prefix: String,
    #[arg(
        long,
        value_name = "SIZE",
        help = "Initial capacity of the in-memory store",
        default_value_t = 100_000,
        env = "VORTEXBOX_STORE_CAPACITY"
    )]
    pub store_capacity: usize,
    #[arg(
        long,
        value_name = "SECS",
        help = "Sweep interval of the in-memory store (seconds)",
        default_value_t = 300,
        env = "VORTEXBOX_STORE_CLEANUP_INTERVAL"
    )]
    pub store_cleanup_interval: u64,

    // Uploads
    #[arg(
        long,
        value_name = "DIR",
        help = "Directory uploaded files are stored in",
        default_value = "./uploads",
        env = "VORTEXBOX_UPLOAD_DIR"
    )]
    pub upload_dir: PathBuf,
    #[arg(
        long,
        value_name = "BYTES",
        help = "Maximum size of an uploaded file",
        default_value_t = 10 * 1024 * 1024,
        env = "VORTEXBOX_MAX_UPLOAD_BYTES"
    )]
    pub max_upload_bytes: u64,
    #[arg(
        long,
        help = "Require a valid X-Session-Id for upload and download",
        env = "VORTEXBOX_REQUIRE_SESSION"
    )]
    pub require_session: bool,

    // Accounts
    #[arg(
        long,
        value_name = "SECS",
        help = "Lifetime of a login session (seconds)",
        default_value_t = 1800,
        env = "VORTEXBOX_SESSION_TTL"
    )]
    pub session_ttl: u64,

    // General options
    #[arg(
        long,
        value_name = "SECS",
        help = "Grace period for in-flight requests on shutdown (seconds)",
        default_value_t = 10,
        env = "VORTEXBOX_SHUTDOWN_GRACE"
    )]
    pub shutdown_grace: u64,
    #[arg(
        long,
        value_name = "SIZE",
        help = "Channel buffer size of the in-memory store",
        default_value_t = 10_000,
        env = "VORTEXBOX_BUFFER_SIZE"
    )]
    pub buffer_size: usize,
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "VORTEXBOX_LOG_LEVEL"
    )]
    pub log_level: String,

    // Utility options
    #[arg(
        long,
        help = "List all environment variables and exit",
        action = clap::ArgAction::SetTrue
    )]
    pub list_env_vars: bool,
}

/// Longest accepted period, lifetime or interval: one year
const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

impl Config {
    /// Build configuration from environment variables and CLI arguments
    ///
    /// Malformed arguments (non-numeric or out-of-range port, unknown flags)
    /// make clap print a message and exit with a non-zero status before
    /// anything else happens.
    ///
    /// # Errors
    ///
    /// Returns an error if TLS paths are half-specified or unreadable, or if
    /// a numeric option is out of range.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        if args.list_env_vars {
            Self::print_env_vars();
            std::process::exit(0);
        }

        Self::from_args(args)
    }

    /// Build and validate configuration from already-parsed arguments
    pub fn from_args(args: Args) -> Result<Self> {
        let host = args
            .host
            .ok_or_else(|| ConfigError::InvalidValue("missing HOST argument".to_string()))?;
        let port = args
            .port
            .ok_or_else(|| ConfigError::InvalidValue("missing PORT argument".to_string()))?;

        let transport = transport::configure(
            &host,
            port,
            args.ssl_public_key.as_deref(),
            args.ssl_private_key.as_deref(),
        )?;

        let config = Config {
            transport,
            admission: AdmissionConfig {
                limit: args.rate_limit,
                period: Duration::from_secs(args.rate_period),
                failure_policy: args.store_failure_policy,
                key_granularity: args.rate_key,
                trust_forwarded_for: args.trust_forwarded_for,
            },
            store: StoreConfig {
                backend: args.store,
                redis_url: args.redis_url,
                timeout: Duration::from_millis(args.store_timeout_ms),
                key_prefix: args.key_prefix,
                capacity: args.store_capacity,
                cleanup_interval: Duration::from_secs(args.store_cleanup_interval),
            },
            upload: UploadConfig {
                dir: args.upload_dir,
                max_bytes: args.max_upload_bytes,
                require_session: args.require_session,
            },
            accounts: AccountConfig {
                session_ttl: Duration::from_secs(args.session_ttl),
            },
            shutdown_grace: Duration::from_secs(args.shutdown_grace),
            buffer_size: args.buffer_size,
            log_level: args.log_level,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending option.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.admission.limit == 0 {
            return Err(ConfigError::InvalidValue(
                "--rate-limit must be greater than 0".to_string(),
            ));
        }
        if self.admission.period.is_zero() {
            return Err(ConfigError::InvalidValue(
                "--rate-period must be greater than 0".to_string(),
            ));
        }
        if self.store.timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "--store-timeout-ms must be greater than 0".to_string(),
            ));
        }
        if self.store.key_prefix.is_empty() {
            return Err(ConfigError::InvalidValue(
                "--key-prefix must not be empty".to_string(),
            ));
        }
        if self.upload.max_bytes == 0 {
            return Err(ConfigError::InvalidValue(
                "--max-upload-bytes must be greater than 0".to_string(),
            ));
        }
        if self.accounts.session_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "--session-ttl must be greater than 0".to_string(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::InvalidValue(
                "--buffer-size must be greater than 0".to_string(),
            ));
        }

        for (flag, value) in [
            ("--rate-period", self.admission.period),
            ("--session-ttl", self.accounts.session_ttl),
            ("--store-cleanup-interval", self.store.cleanup_interval),
            ("--shutdown-grace", self.shutdown_grace),
        ] {
            if value > MAX_DURATION {
                return Err(ConfigError::InvalidValue(format!(
                    "{flag} must be at most {} seconds",
                    MAX_DURATION.as_secs()
                )));
            }
        }

        Ok(())
    }

    /// Print all available environment variables and their descriptions
    fn print_env_vars() {
        println!("VortexBox Environment Variables");
        println!("===============================");
        println!();
        println!("All environment variables use the VORTEXBOX_ prefix.");
        println!("CLI arguments take precedence over environment variables.");
        println!();

        println!("Listener:");
        println!("  VORTEXBOX_HOST=<host>                  Address to bind to");
        println!("  VORTEXBOX_PORT=<port>                  Port to listen on (1-65535)");
        println!("  VORTEXBOX_SSL_PUBLIC_KEY=<path>        PEM certificate chain");
        println!("  VORTEXBOX_SSL_PRIVATE_KEY=<path>       PEM private key");
        println!();

        println!("Rate Limiting:");
        println!("  VORTEXBOX_RATE_LIMIT=<n>               Requests per window [default: 60]");
        println!("  VORTEXBOX_RATE_PERIOD=<secs>           Window length [default: 60]");
        println!("  VORTEXBOX_RATE_KEY=ip|session          Rate limit key [default: ip]");
        println!("  VORTEXBOX_TRUST_FORWARDED_FOR=true     Use X-Forwarded-For [default: false]");
        println!();

        println!("Store:");
        println!("  VORTEXBOX_STORE=redis|memory           Store backend [default: redis]");
        println!(
            "  VORTEXBOX_REDIS_URL=<url>              Redis URL [default: redis://127.0.0.1:6379/]"
        );
        println!("  VORTEXBOX_STORE_TIMEOUT_MS=<ms>        Store operation timeout [default: 250]");
        println!(
            "  VORTEXBOX_STORE_FAILURE_POLICY=open|closed   Store outage behavior [default: open]"
        );
        println!("  VORTEXBOX_KEY_PREFIX=<prefix>          Store key prefix [default: vortexbox]");
        println!(
            "  VORTEXBOX_STORE_CAPACITY=<size>        In-memory store capacity [default: 100000]"
        );
        println!(
            "  VORTEXBOX_STORE_CLEANUP_INTERVAL=<secs> In-memory sweep interval [default: 300]"
        );
        println!();

        println!("Uploads and Accounts:");
        println!("  VORTEXBOX_UPLOAD_DIR=<dir>             Upload directory [default: ./uploads]");
        println!(
            "  VORTEXBOX_MAX_UPLOAD_BYTES=<bytes>     Maximum upload size [default: 10485760]"
        );
        println!("  VORTEXBOX_REQUIRE_SESSION=true         Require a session for files [default: false]");
        println!("  VORTEXBOX_SESSION_TTL=<secs>           Session lifetime [default: 1800]");
        println!();

        println!("General Configuration:");
        println!("  VORTEXBOX_SHUTDOWN_GRACE=<secs>        Shutdown grace period [default: 10]");
        println!("  VORTEXBOX_BUFFER_SIZE=<size>           In-memory store channel size [default: 10000]");
        println!(
            "  VORTEXBOX_LOG_LEVEL=<level>            Log level: error, warn, info, debug, trace [default: info]"
        );
        println!();

        println!("Examples:");
        println!("  # Tighter limits, fail closed when Redis is down");
        println!("  export VORTEXBOX_RATE_LIMIT=20");
        println!("  export VORTEXBOX_STORE_FAILURE_POLICY=closed");
        println!("  vortexbox-server 0.0.0.0 8080");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn parse(args: &[&str]) -> std::result::Result<Args, clap::Error> {
        let mut argv = vec!["vortexbox-server"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv)
    }

    #[test]
    fn test_enum_from_str() {
        assert_eq!(FailurePolicy::from_str("OPEN").unwrap(), FailurePolicy::Open);
        assert_eq!(
            FailurePolicy::from_str("closed").unwrap(),
            FailurePolicy::Closed
        );
        assert!(FailurePolicy::from_str("maybe").is_err());

        assert_eq!(KeyGranularity::from_str("ip").unwrap(), KeyGranularity::Ip);
        assert_eq!(
            KeyGranularity::from_str("Session").unwrap(),
            KeyGranularity::Session
        );
        assert!(KeyGranularity::from_str("user").is_err());

        assert_eq!(StoreBackend::from_str("redis").unwrap(), StoreBackend::Redis);
        assert_eq!(
            StoreBackend::from_str("MEMORY").unwrap(),
            StoreBackend::Memory
        );
        assert!(StoreBackend::from_str("sqlite").is_err());
    }

    #[test]
    fn test_positional_host_and_port() {
        let config = Config::from_args(parse(&["0.0.0.0", "8080"]).unwrap()).unwrap();

        assert_eq!(config.transport.host, "0.0.0.0");
        assert_eq!(config.transport.port, 8080);
        assert!(config.transport.tls.is_none());
        assert_eq!(config.admission.limit, 60);
        assert_eq!(config.admission.period, Duration::from_secs(60));
        assert_eq!(config.admission.failure_policy, FailurePolicy::Open);
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.upload.max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.accounts.session_ttl, Duration::from_secs(1800));
    }

    #[test]
    fn test_malformed_port_rejected() {
        assert!(parse(&["127.0.0.1", "http"]).is_err());
        assert!(parse(&["127.0.0.1", "0"]).is_err());
        assert!(parse(&["127.0.0.1", "65536"]).is_err());
        assert!(parse(&["127.0.0.1", "65535"]).is_ok());
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(parse(&["127.0.0.1", "8080", "--no-such-flag"]).is_err());
    }

    #[test]
    fn test_half_tls_pair_rejected() {
        let args = parse(&["127.0.0.1", "8443", "--ssl-public-key", "cert.pem"]).unwrap();
        let err = Config::from_args(args).unwrap_err();
        assert!(err.to_string().contains("--ssl-private-key"));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let args = parse(&["127.0.0.1", "8080", "--rate-limit", "0"]).unwrap();
        assert!(Config::from_args(args).is_err());

        let args = parse(&["127.0.0.1", "8080", "--rate-period", "0"]).unwrap();
        assert!(Config::from_args(args).is_err());

        let args = parse(&["127.0.0.1", "8080", "--max-upload-bytes", "0"]).unwrap();
        assert!(Config::from_args(args).is_err());
    }

    #[test]
    fn test_durations_capped_at_one_year() {
        let args = parse(&["127.0.0.1", "8080", "--rate-period", "18446744073709551615"]).unwrap();
        let err = Config::from_args(args).unwrap_err();
        assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::InvalidValue(_))));
        assert!(err.to_string().contains("--rate-period"));

        let args = parse(&["127.0.0.1", "8080", "--session-ttl", "31536001"]).unwrap();
        assert!(Config::from_args(args).is_err());

        let args = parse(&["127.0.0.1", "8080", "--store-cleanup-interval", "31536001"]).unwrap();
        assert!(Config::from_args(args).is_err());

        let args = parse(&["127.0.0.1", "8080", "--rate-period", "31536000"]).unwrap();
        assert!(Config::from_args(args).is_ok());
    }

    #[test]
    fn test_custom_options() {
        let args = parse(&[
            "::1",
            "9000",
            "--rate-limit",
            "5",
            "--rate-period",
            "10",
            "--rate-key",
            "session",
            "--store",
            "memory",
            "--store-failure-policy",
            "closed",
            "--require-session",
        ])
        .unwrap();
        let config = Config::from_args(args).unwrap();

        assert_eq!(config.admission.limit, 5);
        assert_eq!(config.admission.period, Duration::from_secs(10));
        assert_eq!(config.admission.key_granularity, KeyGranularity::Session);
        assert_eq!(config.admission.failure_policy, FailurePolicy::Closed);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.upload.require_session);
    }

    #[test]
    fn test_list_env_vars_needs_no_positionals() {
        let args = parse(&["--list-env-vars"]).unwrap();
        assert!(args.list_env_vars);
        assert!(args.host.is_none());
    }
}
