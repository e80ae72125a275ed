//! Server configuration for Keeper.
//!
//! Loads configuration from `KEEPER_*` environment variables with sensible
//! defaults. Values that fail to parse fall back to their default.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use keeper_core::AuthPolicy;
use keeper_core::crypto::HashCost;

use crate::rpc::Method;

const DEFAULT_ADDRESS: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
    3200,
);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// How long in-flight calls get to finish after a shutdown signal.
    pub shutdown_timeout: Duration,
    /// Lifetime of an issued bearer token.
    pub token_lifetime: Duration,
    /// Server-side deadline for every call. `None` disables it.
    pub call_timeout: Option<Duration>,
    /// Largest accepted request body.
    pub max_message_bytes: usize,
    pub auth_policy: AuthPolicy,
    pub hash_cost: HashCost,
    pub storage_backend: StorageBackendType,
    /// Methods that bypass token authentication.
    pub auth_skip: HashSet<Method>,
    /// Log level filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// `KEEPER_STORAGE` value that was not recognised, if any.
    pub unknown_storage: Option<String>,
}

/// Supported storage backend types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory (data lost on restart).
    Memory,
    /// S3-compatible object storage.
    S3(S3Settings),
}

/// Object storage connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    pub conditional_writes: bool,
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .field("conditional_writes", &self.conditional_writes)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `KEEPER_ADDRESS`: listen address (default: `0.0.0.0:3200`)
    /// - `KEEPER_SHUTDOWN_TIMEOUT_SECS`: graceful shutdown budget (default: `5`)
    /// - `KEEPER_TOKEN_LIFETIME_SECS`: token lifetime (default: `86400`)
    /// - `KEEPER_CALL_TIMEOUT_SECS`: per-call deadline, `0` disables (default: `30`)
    /// - `KEEPER_MAX_MESSAGE_BYTES`: request body limit (default: `16777216`)
    /// - `KEEPER_LOGIN_MIN_LEN` / `KEEPER_PASSWORD_MIN_LEN` (default: `3` / `8`)
    /// - `KEEPER_PASSWORD_HASH_ITERATIONS` / `KEEPER_PASSWORD_HASH_MEMORY_KIB`
    ///   (default: `2` / `19456`)
    /// - `KEEPER_STORAGE`: `memory` or `s3` (alias `cloud`, default: `memory`)
    /// - `KEEPER_S3_BUCKET`, `KEEPER_S3_REGION`, `KEEPER_S3_ENDPOINT`,
    ///   `KEEPER_S3_ACCESS_KEY`, `KEEPER_S3_SECRET_KEY`,
    ///   `KEEPER_S3_CONDITIONAL_WRITES`
    /// - `KEEPER_LOG_LEVEL`: log filter (default: `info`)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let flag = |key: &str, default: bool| {
            lookup(key).map_or(default, |v| {
                !matches!(v.trim().to_lowercase().as_str(), "false" | "0" | "no")
            })
        };

        let bind_addr = lookup("KEEPER_ADDRESS")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_ADDRESS);

        let shutdown_timeout =
            Duration::from_secs(parsed("KEEPER_SHUTDOWN_TIMEOUT_SECS").unwrap_or(5));
        let token_lifetime =
            Duration::from_secs(parsed("KEEPER_TOKEN_LIFETIME_SECS").unwrap_or(86_400));
        let call_timeout = match parsed("KEEPER_CALL_TIMEOUT_SECS").unwrap_or(30) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let max_message_bytes = parsed("KEEPER_MAX_MESSAGE_BYTES")
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(16 * 1024 * 1024);

        let defaults = AuthPolicy::default();
        let auth_policy = AuthPolicy {
            login_min_len: parsed("KEEPER_LOGIN_MIN_LEN")
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(defaults.login_min_len),
            password_min_len: parsed("KEEPER_PASSWORD_MIN_LEN")
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(defaults.password_min_len),
        };

        let cost = HashCost::default();
        let hash_cost = HashCost {
            memory_kib: parsed("KEEPER_PASSWORD_HASH_MEMORY_KIB")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(cost.memory_kib),
            iterations: parsed("KEEPER_PASSWORD_HASH_ITERATIONS")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(cost.iterations),
        };

        let storage = lookup("KEEPER_STORAGE")
            .unwrap_or_else(|| "memory".to_owned())
            .trim()
            .to_lowercase();
        let mut unknown_storage = None;
        let storage_backend = match storage.as_str() {
            "s3" | "cloud" => StorageBackendType::S3(S3Settings {
                bucket: lookup("KEEPER_S3_BUCKET").unwrap_or_else(|| "keeper".to_owned()),
                region: lookup("KEEPER_S3_REGION").unwrap_or_else(|| "us-east-1".to_owned()),
                endpoint: lookup("KEEPER_S3_ENDPOINT").filter(|v| !v.trim().is_empty()),
                access_key: lookup("KEEPER_S3_ACCESS_KEY").unwrap_or_else(|| "key".to_owned()),
                secret_key: lookup("KEEPER_S3_SECRET_KEY")
                    .unwrap_or_else(|| "secret".to_owned()),
                conditional_writes: flag("KEEPER_S3_CONDITIONAL_WRITES", true),
            }),
            "memory" => StorageBackendType::Memory,
            _ => {
                unknown_storage = Some(storage.clone());
                StorageBackendType::Memory
            }
        };

        let log_level = lookup("KEEPER_LOG_LEVEL").unwrap_or_else(|| "info".to_owned());

        Self {
            bind_addr,
            shutdown_timeout,
            token_lifetime,
            call_timeout,
            max_message_bytes,
            auth_policy,
            hash_cost,
            storage_backend,
            auth_skip: Method::public().collect(),
            log_level,
            unknown_storage,
        }
    }
}
