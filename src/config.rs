//! Store configuration: backend selection, connection parameters and pool sizing.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_USER: &str = "postgres";
pub const DEFAULT_DB_NAME: &str = "mexc_bot_db";

/// Which storage adapter `store::open` builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Postgres,
    Memory,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            "memory" | "in-memory" => Ok(Backend::Memory),
            other => Err(format!("unknown backend {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Full connection URL; when set it wins over the individual parts.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub sslmode: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            password: DEFAULT_USER.to_string(),
            dbname: DEFAULT_DB_NAME.to_string(),
            sslmode: "disable".to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!(
                "postgres://{}:{}@{}:{}/{}?sslmode={}",
                self.user, self.password, self.host, self.port, self.dbname, self.sslmode
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_conns: u32,
    pub min_conns: u32,
    pub max_conn_lifetime: Duration,
    pub max_conn_idle_time: Duration,
    /// Non-zero enables a liveness check each time a connection is handed out.
    pub health_check_period: Duration,
    /// Bounds both the initial connect and each pool acquire.
    pub connect_timeout: Duration,
    /// Server-side cap on a single statement.
    pub statement_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_conns: 20,
            min_conns: 5,
            max_conn_lifetime: Duration::from_secs(60 * 60),
            max_conn_idle_time: Duration::from_secs(30 * 60),
            health_check_period: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            statement_timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreConfig {
    pub backend: Backend,
    pub database: DatabaseConfig,
    pub pool: PoolConfig,
}

impl StoreConfig {
    /// Defaults overlaid with environment variables (after loading `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` but reading from an arbitrary source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = StoreConfig::default();

        if let Some(v) = lookup("STORE_BACKEND") {
            cfg.backend = v.parse().map_err(|reason| ConfigError::Invalid {
                key: "STORE_BACKEND",
                value: v.clone(),
                reason,
            })?;
        }

        let db = &mut cfg.database;
        db.url = lookup("DATABASE_URL").filter(|s| !s.is_empty());
        if let Some(v) = lookup("DB_HOST") {
            db.host = v;
        }
        if let Some(v) = lookup("DB_PORT") {
            db.port = parse_num("DB_PORT", &v)?;
        }
        if let Some(v) = lookup("DB_USER") {
            db.user = v;
        }
        if let Some(v) = lookup("DB_PASSWORD") {
            db.password = v;
        }
        if let Some(v) = lookup("DB_NAME") {
            db.dbname = v;
        }
        if let Some(v) = lookup("DB_SSLMODE") {
            db.sslmode = v;
        }

        let pool = &mut cfg.pool;
        if let Some(v) = lookup("DB_MAX_CONNS") {
            pool.max_conns = parse_num("DB_MAX_CONNS", &v)?;
        }
        if let Some(v) = lookup("DB_MIN_CONNS") {
            pool.min_conns = parse_num("DB_MIN_CONNS", &v)?;
        }
        if let Some(v) = lookup("DB_STATEMENT_TIMEOUT_MS") {
            let ms: u64 = parse_num("DB_STATEMENT_TIMEOUT_MS", &v)?;
            pool.statement_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if pool.min_conns > pool.max_conns {
            return Err(ConfigError::Invalid {
                key: "DB_MIN_CONNS",
                value: pool.min_conns.to_string(),
                reason: format!("exceeds DB_MAX_CONNS ({})", pool.max_conns),
            });
        }

        Ok(cfg)
    }
}

fn parse_num<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
