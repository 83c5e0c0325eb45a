mod loader;
mod overrides;
mod schema;

pub use loader::{load_from_env_or_file, load_from_path, parse_listen_addr, validate, ENV_PREFIX};
pub use overrides::{apply_overrides, Overrides};
pub use schema::{Config, LoginConfig, ProxyConfig, UpstreamConfig};
