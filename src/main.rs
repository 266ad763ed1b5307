use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use kubetap_k8s::KubeBackend;
use kubetap_server::{LogServer, ServerConfig};

/// Kubetap - Stream Kubernetes container logs to browsers over Server-Sent Events
#[derive(Parser, Debug)]
#[command(name = "kubetap")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, short, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the config file)
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Default kubeconfig context (overrides the config file)
    #[arg(long, value_name = "CONTEXT")]
    context: Option<String>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&args.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = run(args).await;

    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }

    result
}

fn load_config(args: &Args) -> Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            ServerConfig::from_toml_str(&text)
                .with_context(|| format!("failed to load config file {}", path.display()))?
        }
        None => ServerConfig::default(),
    };

    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(context) = &args.context {
        config.default_context = Some(context.clone());
    }

    Ok(config)
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;

    let backend = KubeBackend::new(config.default_context.clone())
        .context("failed to load Kubernetes configuration")?;
    info!(
        contexts = backend.contexts().len(),
        default_context = backend.default_context().unwrap_or("none"),
        "Kubernetes backend ready"
    );

    let server = LogServer::new(config, backend);
    server
        .serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("log server failed")?;

    Ok(())
}
