//! ============================================================================
//! Service Configuration
//! ============================================================================
//! All settings come from the environment, read once at startup into an
//! owned struct that is injected wherever it is needed. No component reads
//! the environment after boot.
//! ============================================================================

use anyhow::{bail, Context, Result};
use std::env;

/// Listen port when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 3002;

/// Spoken version string when `VERSION_TAG` is unset.
pub const DEFAULT_VERSION_TAG: &str = "development";

/// `ENV_MODE` value that turns on the signature-validation bypass.
const DEV_ENV_MODE: &str = "development";

#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port.
    pub port: u16,
    /// Base URL of the actuator service.
    pub actuator_base_url: String,
    /// Shared secret sent with every actuator call.
    pub api_secret: String,
    /// Shared secret for webhook signature validation.
    pub auth_token: String,
    /// Externally-visible base URL, used to reconstruct signed request URLs.
    pub public_url: String,
    /// Spoken on the version step.
    pub version_tag: String,
    /// Skip signature validation. Only set through `ENV_MODE=development`.
    pub auth_bypass: bool,
}

impl Config {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        let auth_bypass = env::var("ENV_MODE")
            .map(|mode| is_dev_mode(&mode))
            .unwrap_or(false);

        let auth_token = env::var("AUTH_TOKEN").unwrap_or_default();
        let public_url = env::var("PUBLIC_URL").unwrap_or_default();
        if !auth_bypass && (auth_token.is_empty() || public_url.is_empty()) {
            bail!("AUTH_TOKEN and PUBLIC_URL are required unless ENV_MODE=development");
        }

        Ok(Self {
            port: parse_port(env::var("PORT").ok().as_deref())?,
            actuator_base_url: env::var("ACTUATOR_BASE_URL")
                .context("ACTUATOR_BASE_URL is required")?,
            api_secret: env::var("API_SECRET").context("API_SECRET is required")?,
            auth_token,
            public_url,
            version_tag: env::var("VERSION_TAG")
                .unwrap_or_else(|_| DEFAULT_VERSION_TAG.to_string()),
            auth_bypass,
        })
    }
}

fn parse_port(raw: Option<&str>) -> Result<u16> {
    match raw {
        None | Some("") => Ok(DEFAULT_PORT),
        Some(value) => value
            .parse::<u16>()
            .with_context(|| format!("invalid PORT value '{}'", value)),
    }
}

fn is_dev_mode(mode: &str) -> bool {
    mode.eq_ignore_ascii_case(DEV_ENV_MODE)
}
