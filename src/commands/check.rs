use tracing::{error, info, warn};

use crate::api::ApiClient;
use crate::config::{self, Config};
use crate::error::{ApiError, ProxyError, Result};

/// Validate the configuration and, with `test_auth`, log in once against the
/// upstream API.
pub async fn run_config_check(config: Config, test_auth: bool) -> Result<()> {
    info!("Running configuration check...");

    config::validate(&config)?;
    info!("✓ Configuration is valid");

    let upstream = &config.upstream;
    info!("Upstream API: {}", upstream.base_url);
    info!("  Max retries: {}", upstream.max_retries);
    info!("  Request timeout: {} ms", upstream.request_timeout_ms);
    info!("  Session max age: {} seconds", upstream.session_max_age_secs);
    info!("  Max redispatch: {}", upstream.max_redispatch);
    info!("  Edge servers: {:?}", upstream.edge_servers);
    info!("Proxy will listen on {}", config.proxy.listen_addr());

    let (user, pass) = match &config.login {
        Some(login) => {
            info!("Login: {}", login.id);
            (login.id.as_str(), login.password.as_str())
        }
        None => {
            info!("Login: anonymous");
            ("", "")
        }
    };

    if !test_auth {
        return Ok(());
    }

    info!("Testing authentication...");
    let client = ApiClient::new(upstream)?;
    match client.authenticate(user, pass).await {
        Ok(()) => {
            info!("✓ Authentication: PASSED");
            Ok(())
        }
        Err(e) => {
            error!("✗ Authentication: FAILED - {}", e);
            if matches!(e, crate::error::AuthError::KeyLength) {
                warn!("The upstream rejected the app key length; check upstream.app_key");
            }
            Err(ProxyError::Api(ApiError::Auth(e)))
        }
    }
}
