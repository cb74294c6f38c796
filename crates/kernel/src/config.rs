//! Configuration loaded from environment variables.

use std::env;
use std::str::FromStr;

use anyhow::{Context, Result, bail};

use crate::query::DEFAULT_LIMIT;

/// How document numbers are issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequenceStrategy {
    /// Scan the latest stored number and add one.
    #[default]
    Scan,
    /// Atomic per-type, per-year counter.
    Counter,
}

impl FromStr for SequenceStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scan" => Ok(Self::Scan),
            "counter" => Ok(Self::Counter),
            other => bail!("unknown sequence strategy: {other}"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// PostgreSQL connection URL. When unset, records live in memory.
    pub database_url: Option<String>,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Page size used when a list request omits `limit` (default: 10).
    pub default_page_limit: u64,

    /// Document-number generator (default: scan).
    pub sequence_strategy: SequenceStrategy,

    /// CORS allowed origins (comma-separated, default: "*").
    pub cors_allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: None,
            database_max_connections: 10,
            default_page_limit: DEFAULT_LIMIT,
            sequence_strategy: SequenceStrategy::Scan,
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let default_page_limit: u64 = env::var("DEFAULT_PAGE_LIMIT")
            .unwrap_or_else(|_| DEFAULT_LIMIT.to_string())
            .parse()
            .context("DEFAULT_PAGE_LIMIT must be a valid u64")?;
        if default_page_limit == 0 {
            bail!("DEFAULT_PAGE_LIMIT must be greater than zero");
        }

        let sequence_strategy: SequenceStrategy = env::var("SEQUENCE_STRATEGY")
            .unwrap_or_else(|_| "scan".to_string())
            .parse()
            .context("SEQUENCE_STRATEGY must be \"scan\" or \"counter\"")?;

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["*".to_string()]);

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            default_page_limit,
            sequence_strategy,
            cors_allowed_origins,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parsing() {
        assert_eq!("scan".parse::<SequenceStrategy>().unwrap(), SequenceStrategy::Scan);
        assert_eq!(
            " Counter ".parse::<SequenceStrategy>().unwrap(),
            SequenceStrategy::Counter
        );
        assert!("random".parse::<SequenceStrategy>().is_err());
    }

    #[test]
    fn defaults_use_memory_store() {
        let config = Config::default();
        assert!(config.database_url.is_none());
        assert_eq!(config.default_page_limit, 10);
        assert_eq!(config.sequence_strategy, SequenceStrategy::Scan);
    }
}
