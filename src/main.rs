use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use dat_proxy::api::ApiClient;
use dat_proxy::commands;
use dat_proxy::config::{self, Overrides};
use dat_proxy::error::Result;
use dat_proxy::logging;
use dat_proxy::proxy::{Dispatcher, Forwarder, ProxyServer};

#[derive(Parser, Debug)]
#[command(name = "dat-proxy")]
#[command(about = "Reverse proxy serving thread dat files through the signed 2ch API", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (YAML/JSON/TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// API base URL
    #[arg(long, value_name = "URL", global = true)]
    base: Option<String>,

    /// API app key (30 characters)
    #[arg(long, value_name = "KEY", global = true)]
    appkey: Option<String>,

    /// API HMAC key (30 characters)
    #[arg(long, value_name = "KEY", global = true)]
    hmkey: Option<String>,

    /// Listening address, e.g. `:8080`
    #[arg(long, value_name = "ADDR", global = true)]
    addr: Option<String>,

    /// Login ID
    #[arg(long, global = true)]
    id: Option<String>,

    /// Login password
    #[arg(long, global = true)]
    pw: Option<String>,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Run the proxy server (default)
    Run,
    /// Validate configuration and optionally test authentication
    Check {
        /// Log in once against the upstream API
        #[arg(long)]
        auth: bool,
    },
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.base.clone(),
            app_key: self.appkey.clone(),
            hmac_key: self.hmkey.clone(),
            addr: self.addr.clone(),
            login_id: self.id.clone(),
            login_password: self.pw.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(args.debug, args.json_logs);

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            config::load_from_path(path).inspect_err(|e| {
                error!("Failed to load configuration from {}: {}", path.display(), e)
            })?
        }
        None => config::load_from_env_or_file()
            .inspect_err(|e| error!("Failed to load configuration: {}", e))?,
    };
    config::apply_overrides(&mut config, &args.overrides())?;

    if let Some(Command::Check { auth }) = args.command {
        return commands::run_config_check(config, auth).await;
    }

    if let Err(e) = config::validate(&config) {
        error!("{}", e);
        return Err(e);
    }

    info!("Starting dat proxy");
    info!("Upstream API: {}", config.upstream.base_url);

    let client = Arc::new(ApiClient::new(&config.upstream)?);
    if let Some(login) = &config.login {
        match client.authenticate(&login.id, &login.password).await {
            Ok(()) => info!(user = %login.id, "Logged in"),
            Err(e) => warn!(
                user = %login.id,
                error = %e,
                "Initial login failed, will retry on the first thread request"
            ),
        }
    }

    let forwarder = Forwarder::new(&config.proxy.user_agent)?;
    let dispatcher = Arc::new(Dispatcher::new(client, forwarder)?);
    let server = ProxyServer::bind(&config.proxy.listen_addr(), dispatcher).await?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(());
    });

    server.run(shutdown_rx).await?;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
