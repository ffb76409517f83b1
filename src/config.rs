// Configuration loaded from the environment (and `.env` in development)

use anyhow::{bail, Context};
use axum::http::{HeaderValue, Method};
use rand::{thread_rng, Rng};
use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use tower_http::cors::CorsLayer;

const DEV_ORIGIN: &str = "http://localhost:5173";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub allowed_origin: Option<String>,
    pub event_buffer: usize,
    pub body_limit: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let jwt_secret = match optional("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                log::warn!("JWT_SECRET not set, generating one; tokens will not survive a restart");
                generate_secret()
            }
        };

        let config = Self {
            bind_address: optional("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or("PORT", 5000)?,
            database_url: optional("DATABASE_URL"),
            jwt_secret,
            token_ttl_days: parse_or("TOKEN_TTL_DAYS", 7)?,
            allowed_origin: optional("ALLOWED_ORIGIN"),
            event_buffer: parse_or("EVENT_BUFFER", 64)?,
            body_limit: parse_or("BODY_LIMIT_BYTES", 64 * 1024)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.token_ttl_days <= 0 {
            bail!("TOKEN_TTL_DAYS must be positive, got {}", self.token_ttl_days);
        }
        if self.event_buffer == 0 {
            bail!("EVENT_BUFFER must be at least 1");
        }
        if self.body_limit == 0 {
            bail!("BODY_LIMIT_BYTES must be at least 1");
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .with_context(|| format!("invalid BIND_ADDRESS `{}`", self.bind_address))
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.token_ttl_days)
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins = vec![DEV_ORIGIN.to_string()];
        if let Some(origin) = &self.allowed_origin {
            if origin != DEV_ORIGIN {
                origins.push(origin.clone());
            }
        }
        origins
    }

    pub fn cors_layer(&self) -> anyhow::Result<CorsLayer> {
        let origins = self
            .allowed_origins()
            .iter()
            .map(|o| HeaderValue::from_str(o).with_context(|| format!("invalid origin `{}`", o)))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
            ])
            .allow_credentials(true))
    }
}

fn optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match optional(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {} value `{}`: {}", key, raw, e)),
        None => Ok(default),
    }
}

fn generate_secret() -> String {
    let bytes: [u8; 32] = thread_rng().gen();
    hex::encode(bytes)
}
