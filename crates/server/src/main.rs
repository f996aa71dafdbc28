use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use salescoach_server::config::Config;
use salescoach_server::context::AppContext;
use salescoach_server::http;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Address to bind the service to
    #[arg(long, default_value = "0.0.0.0:8000")]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("salescoach_server=info,salescoach=info,tower_http=info")
    });
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let args = Args::parse();
    let config = Config::from_env();

    info!(
        addr = %args.addr,
        persistence = config.database_url.is_some(),
        retrieval = config.vector_url.is_some(),
        llm = config.llm_url.is_some(),
        "starting salescoach server"
    );

    let ctx = AppContext::initialize(config).await?;
    let app = http::router(ctx);

    let listener = tokio::net::TcpListener::bind(&args.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
