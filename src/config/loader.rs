use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use http::HeaderValue;
use std::path::Path;

use super::schema::Config;
use crate::error::{ConfigError, Result};

pub const ENV_PREFIX: &str = "DAT_PROXY_";

/// Longest session lifetime accepted from configuration (one year).
const MAX_SESSION_AGE_SECS: u64 = 365 * 24 * 60 * 60;

/// Layer defaults, the `dat-proxy.*` files in the working directory, and
/// `DAT_PROXY_*` environment variables.
pub fn load_from_env_or_file() -> Result<Config> {
    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file("dat-proxy.toml"))
        .merge(Json::file("dat-proxy.json"))
        .merge(Yaml::file("dat-proxy.yaml"))
        .merge(Yaml::file("dat-proxy.yml"))
        .merge(env_provider());

    extract(figment)
}

pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::Parse(format!(
            "Configuration file not found: {}",
            path.display()
        ))
        .into());
    }
    let base = Figment::from(Serialized::defaults(Config::default()));

    let figment = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => base.merge(Toml::file(path)),
        Some("json") => base.merge(Json::file(path)),
        Some("yaml") | Some("yml") => base.merge(Yaml::file(path)),
        _ => {
            return Err(ConfigError::Parse(
                "Unsupported config file format. Use .toml, .json, .yaml, or .yml".into(),
            )
            .into())
        }
    };
    extract(figment.merge(env_provider()))
}

fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).split("__")
}

fn extract(figment: Figment) -> Result<Config> {
    let config: Config = figment
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;
    apply_env_substitutions(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let upstream = &config.upstream;

    if upstream.app_key.chars().count() != 30 || upstream.hmac_key.chars().count() != 30 {
        return Err(ConfigError::Validation("invalid length api key".into()).into());
    }

    match url::Url::parse(&upstream.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => {
            return Err(ConfigError::Validation(format!(
                "Upstream base URL '{}' must be an http(s) URL",
                upstream.base_url
            ))
            .into())
        }
    }

    if upstream.request_timeout_ms == 0 {
        return Err(
            ConfigError::Validation("Request timeout must be greater than 0".into()).into(),
        );
    }

    if upstream.session_max_age_secs == 0 || upstream.session_max_age_secs > MAX_SESSION_AGE_SECS
    {
        return Err(ConfigError::Validation(format!(
            "Session max age must be between 1 and {MAX_SESSION_AGE_SECS} seconds"
        ))
        .into());
    }

    if let Some(login) = &config.login {
        if login.id.is_empty() {
            return Err(ConfigError::Validation("Login id must not be empty".into()).into());
        }
        if login.password.is_empty() {
            return Err(
                ConfigError::Validation("Login password must not be empty".into()).into(),
            );
        }
    }

    if config.proxy.host.is_empty() {
        return Err(ConfigError::Validation("Proxy host must not be empty".into()).into());
    }

    if HeaderValue::from_str(&config.proxy.user_agent).is_err() {
        return Err(ConfigError::Validation(
            "Proxy user agent is not a valid header value".into(),
        )
        .into());
    }

    Ok(())
}

/// Parse a listen address such as `:8080`, `127.0.0.1:8080` or `[::1]:8080`.
/// An empty host means all interfaces.
pub fn parse_listen_addr(addr: &str) -> Result<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::Validation(format!("Invalid listen address '{addr}'")))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| ConfigError::Validation(format!("Invalid port in listen address '{addr}'")))?;
    let host = if host.is_empty() { "0.0.0.0" } else { host };
    Ok((host.to_string(), port))
}

fn apply_env_substitutions(mut config: Config) -> Result<Config> {
    config.upstream.base_url = substitute_env_vars(&config.upstream.base_url)?;
    config.upstream.app_key = substitute_env_vars(&config.upstream.app_key)?;
    config.upstream.hmac_key = substitute_env_vars(&config.upstream.hmac_key)?;

    if let Some(login) = &mut config.login {
        login.id = substitute_env_vars(&login.id)?;
        login.password = substitute_env_vars(&login.password)?;
    }

    Ok(config)
}

/// Expand `${VAR}` and `${VAR:-default}` references.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Parse(e.to_string()))?;
    let mut result = input.to_string();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let value = match std::env::var(var_name) {
            Ok(value) => value,
            Err(_) => match var_name.split_once(":-") {
                Some((name, default)) => {
                    std::env::var(name).unwrap_or_else(|_| default.to_string())
                }
                None => {
                    return Err(ConfigError::EnvVar(format!(
                        "Environment variable '{var_name}' not found"
                    ))
                    .into())
                }
            },
        };
        result = result.replace(&cap[0], &value);
    }

    Ok(result)
}
