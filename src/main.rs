//! Mock Handler - CLI Entry Point

use anyhow::Result;
use clap::Parser;
use mock_handler_builder::{MockConfig, MockServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "mock-handler",
    about = "Serve an ordered list of mock rules over HTTP and report which ones fired",
    version
)]
struct Args {
    /// Path to rules file
    #[arg(short, long, default_value = "mock-rules.yaml")]
    config: PathBuf,

    /// Listen address, overriding the file's settings
    #[arg(short = 'l', long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Exit with an error on shutdown if a request went unmatched or a rule never fired
    #[arg(long)]
    verify_on_exit: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        println!("{}", include_str!("../demos/default-config.yaml"));
        return Ok(());
    }

    let mut config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no rules)");
        MockConfig::default()
    };

    if args.validate {
        config.validate()?;
        println!("Configuration is valid ({} rules defined)", config.rules.len());
        return Ok(());
    }

    if let Some(listen) = args.listen {
        config.settings.listen = listen;
    }

    let builder = config.into_builder()?;
    let server = MockServer::bind(builder.build(), &config.settings).await?;
    info!(addr = %server.addr(), "Serving rules, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    drop(server);

    for rule in builder.rules() {
        info!(rule = %rule.name(), calls = builder.call_count(rule.name()), "Rule summary");
    }
    if builder.failed() {
        warn!(unmatched = builder.ledger().unmatched(), "Some requests matched no rule");
    }

    if args.verify_on_exit {
        builder.verify()?;
    }

    Ok(())
}
