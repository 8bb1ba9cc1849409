//! vidchat binary entry point

use color_eyre::Result;
use tracing_subscriber::EnvFilter;
use vidchat_rs::{
    cli::{repl, Cli, Commands},
    config::Config,
    server,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Install error handler
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("vidchat_rs=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load_with(cli.config.as_deref())?;

    // Handle commands
    match cli.resolved_command() {
        Commands::Serve { bind } => {
            if let Some(addr) = bind {
                config.server.bind_addr = addr;
            }
            server::serve(config.server).await?;
        }
        Commands::Chat { relay } => {
            if let Some(url) = relay {
                config.client.relay_url = url;
            }
            repl::run(config.client).await?;
        }
        Commands::Version => {
            println!("vidchat version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
