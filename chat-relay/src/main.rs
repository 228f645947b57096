use anyhow::Result;
use clap::Parser;
use tracing::{debug, info, warn};

use chat_relay::{cli::Cli, message, server::Server};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let server = Server::bind(cli.listen).await?;
    let registry = server.registry();
    debug!(started_at = %message::timestamp(registry.started_at()), "registry ready");
    info!("chat relay listening on {}", server.local_addr());

    if let Err(err) = server.run_until_ctrl_c().await {
        warn!("chat relay exited with error: {err:?}");
        return Err(err);
    }

    Ok(())
}
