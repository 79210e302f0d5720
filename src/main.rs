use clap::Parser;

use timezone_api::{config, server};

/// Timezone bookkeeping REST API server.
#[derive(Parser, Debug)]
#[command(name = "timezone-api", version, about)]
struct Args {
    /// Bind address
    #[arg(long)]
    host: Option<String>,

    /// Bind port
    #[arg(long)]
    port: Option<u16>,

    /// Database URL, e.g. sqlite://db.sqlite
    #[arg(long)]
    database_url: Option<String>,

    /// Serve web client static files from this directory under /client
    #[arg(long)]
    client: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    // Flags override the environment; the config singleton reads the
    // environment once, so overrides land before the first access.
    let args = Args::parse();
    if let Some(host) = args.host {
        std::env::set_var("SERVER_HOST", host);
    }
    if let Some(port) = args.port {
        std::env::set_var("SERVER_PORT", port.to_string());
    }
    if let Some(url) = args.database_url {
        std::env::set_var("DATABASE_URL", url);
    }
    if let Some(client) = args.client {
        std::env::set_var("CLIENT_DIR", client);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timezone_api=debug,info".into()),
        )
        .init();

    let config = config::config();
    tracing::info!("starting timezone-api in {:?} mode", config.environment);

    server::serve(config).await
}
