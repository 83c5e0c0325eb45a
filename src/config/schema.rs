use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<LoginConfig>,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub hmac_key: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_session_max_age")]
    pub session_max_age_secs: u64,
    #[serde(default = "default_max_redispatch")]
    pub max_redispatch: u32,
    /// `Server` header prefixes whose 400/500/502 replies are retried.
    #[serde(default = "default_edge_servers")]
    pub edge_servers: Vec<String>,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct LoginConfig {
    pub id: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_host")]
    pub host: String,
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    /// User-Agent sent on pass-through requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl ProxyConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            app_key: String::new(),
            hmac_key: String::new(),
            max_retries: default_max_retries(),
            request_timeout_ms: default_request_timeout(),
            session_max_age_secs: default_session_max_age(),
            max_redispatch: default_max_redispatch(),
            edge_servers: default_edge_servers(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: default_proxy_host(),
            port: default_proxy_port(),
            user_agent: default_user_agent(),
        }
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("app_key", &"<redacted>")
            .field("hmac_key", &"<redacted>")
            .field("max_retries", &self.max_retries)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("session_max_age_secs", &self.session_max_age_secs)
            .field("max_redispatch", &self.max_redispatch)
            .field("edge_servers", &self.edge_servers)
            .finish()
    }
}

impl fmt::Debug for LoginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginConfig")
            .field("id", &self.id)
            .field("password", &"<redacted>")
            .finish()
    }
}

// Default value functions
fn default_base_url() -> String {
    "https://api.2ch.net".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_session_max_age() -> u64 {
    6 * 60 * 60
}

fn default_max_redispatch() -> u32 {
    3
}

fn default_edge_servers() -> Vec<String> {
    vec!["cloudflare".to_string()]
}

fn default_proxy_host() -> String {
    "0.0.0.0".to_string()
}

fn default_proxy_port() -> u16 {
    8080
}

fn default_user_agent() -> String {
    "Monazilla/1.00 (JaneStyle/3.84)".to_string()
}
