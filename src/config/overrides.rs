use super::loader::parse_listen_addr;
use super::schema::{Config, LoginConfig};
use crate::error::Result;

/// Command-line values that take precedence over files and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub app_key: Option<String>,
    pub hmac_key: Option<String>,
    /// Listen address in `host:port` form; an empty host means all interfaces.
    pub addr: Option<String>,
    pub login_id: Option<String>,
    pub login_password: Option<String>,
}

/// Apply overrides to base configuration
pub fn apply_overrides(config: &mut Config, overrides: &Overrides) -> Result<()> {
    if let Some(base_url) = &overrides.base_url {
        tracing::debug!(base_url = %base_url, "Overriding upstream base URL");
        config.upstream.base_url = base_url.clone();
    }
    if let Some(app_key) = &overrides.app_key {
        config.upstream.app_key = app_key.clone();
    }
    if let Some(hmac_key) = &overrides.hmac_key {
        config.upstream.hmac_key = hmac_key.clone();
    }

    if let Some(addr) = &overrides.addr {
        let (host, port) = parse_listen_addr(addr)?;
        tracing::debug!(%host, port, "Overriding listen address");
        config.proxy.host = host;
        config.proxy.port = port;
    }

    if overrides.login_id.is_some() || overrides.login_password.is_some() {
        let login = config.login.get_or_insert_with(|| LoginConfig {
            id: String::new(),
            password: String::new(),
        });
        if let Some(id) = &overrides.login_id {
            login.id = id.clone();
        }
        if let Some(password) = &overrides.login_password {
            login.password = password.clone();
        }
        if login.id.is_empty() || login.password.is_empty() {
            tracing::warn!("Login needs both an id and a password, running anonymously");
            config.login = None;
        }
    }

    Ok(())
}
