//! Engine configuration.
//!
//! Defaults suit tests and demos; deployments override them through
//! environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::crypto::{AesKeySize, RsaKeySize};
use crate::messaging::DEFAULT_PREVIEW_LEN;

/// Default key generation budget
pub const DEFAULT_KEYGEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on CPU-bound crypto tasks running at once.
    pub max_concurrent_ops: usize,
    /// How long an RSA key generation may run before failing `TimedOut`.
    pub keygen_timeout: Duration,
    /// Key size used when a request does not name one.
    pub default_rsa_key_size: RsaKeySize,
    /// AES key size used when a request does not name one.
    pub default_aes_key_size: AesKeySize,
    /// Ciphertext characters shown in mailbox previews.
    pub preview_len: usize,
    /// SQLite file. `None` keeps everything in memory.
    pub database_path: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);

        Self {
            max_concurrent_ops: cpus.max(2),
            keygen_timeout: DEFAULT_KEYGEN_TIMEOUT,
            default_rsa_key_size: RsaKeySize::default(),
            default_aes_key_size: AesKeySize::default(),
            preview_len: DEFAULT_PREVIEW_LEN,
            database_path: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `CIPHERLAB_MAX_CONCURRENT_OPS` | `max_concurrent_ops` |
    /// | `CIPHERLAB_KEYGEN_TIMEOUT_SECS` | `keygen_timeout` |
    /// | `CIPHERLAB_DEFAULT_RSA_BITS` | `default_rsa_key_size` |
    /// | `CIPHERLAB_DEFAULT_AES_BITS` | `default_aes_key_size` |
    /// | `CIPHERLAB_PREVIEW_LEN` | `preview_len` |
    /// | `CIPHERLAB_DATABASE_PATH` | `database_path` |
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from any variable source. Unset variables keep
    /// their default; invalid ones are logged and keep their default too.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_concurrent_ops = parse_var(&lookup, "CIPHERLAB_MAX_CONCURRENT_OPS", |n: usize| n > 0)
            .unwrap_or(defaults.max_concurrent_ops);

        let keygen_timeout = parse_var(&lookup, "CIPHERLAB_KEYGEN_TIMEOUT_SECS", |s: u64| s > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.keygen_timeout);

        let default_rsa_key_size = parse_var(&lookup, "CIPHERLAB_DEFAULT_RSA_BITS", |_: u32| true)
            .and_then(|bits| key_size_or_warn("CIPHERLAB_DEFAULT_RSA_BITS", RsaKeySize::try_from(bits)))
            .unwrap_or(defaults.default_rsa_key_size);

        let default_aes_key_size = parse_var(&lookup, "CIPHERLAB_DEFAULT_AES_BITS", |_: u32| true)
            .and_then(|bits| key_size_or_warn("CIPHERLAB_DEFAULT_AES_BITS", AesKeySize::try_from(bits)))
            .unwrap_or(defaults.default_aes_key_size);

        let preview_len = parse_var(&lookup, "CIPHERLAB_PREVIEW_LEN", |n: usize| n > 0)
            .unwrap_or(defaults.preview_len);

        let database_path = lookup("CIPHERLAB_DATABASE_PATH").filter(|p| !p.trim().is_empty());

        Self {
            max_concurrent_ops,
            keygen_timeout,
            default_rsa_key_size,
            default_aes_key_size,
            preview_len,
            database_path,
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, valid: impl Fn(T) -> bool) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy,
{
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) if valid(value) => Some(value),
        _ => {
            tracing::warn!("Ignoring invalid {}={:?}, using default", name, raw);
            None
        }
    }
}

fn key_size_or_warn<T>(name: &str, parsed: crate::error::Result<T>) -> Option<T> {
    match parsed {
        Ok(size) => Some(size),
        Err(e) => {
            tracing::warn!("Ignoring {}: {}", name, e);
            None
        }
    }
}
