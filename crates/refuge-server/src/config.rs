use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

const PLACEHOLDER_SECRETS: &[&str] = &["", "dev-secret-change-me", "changeme", "secret"];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub token_days: i64,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let allow_dev_secret = get("REFUGE_ALLOW_DEV_SECRET").is_some_and(|v| v == "1");
        let jwt_secret = get("REFUGE_JWT_SECRET").unwrap_or_else(|| "dev-secret-change-me".into());
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) && !allow_dev_secret {
            bail!(
                "REFUGE_JWT_SECRET is unset or a placeholder; \
                 set it, or REFUGE_ALLOW_DEV_SECRET=1 for local use"
            );
        }

        let db_path = PathBuf::from(get("REFUGE_DB_PATH").unwrap_or_else(|| "refuge.db".into()));
        let host = get("REFUGE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("REFUGE_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("REFUGE_PORT must be a port number")?;
        let token_days: i64 = get("REFUGE_TOKEN_DAYS")
            .unwrap_or_else(|| "30".into())
            .parse()
            .context("REFUGE_TOKEN_DAYS must be a whole number of days")?;
        if token_days < 1 {
            bail!("REFUGE_TOKEN_DAYS must be at least 1");
        }

        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .context("REFUGE_HOST/REFUGE_PORT do not form a socket address")?;

        Ok(Self {
            jwt_secret,
            db_path,
            addr,
            token_days,
        })
    }
}
