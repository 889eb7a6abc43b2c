use anyhow::Result;
use clap::Parser;
use klar_core::{Config, ProcessEnv};

mod commands;

#[derive(Parser)]
#[command(name = "klar")]
#[command(about = "Scan a container image for known vulnerabilities", long_about = None)]
struct Cli {
    /// Image to scan (e.g., "nginx", "quay.io/org/app:1.2")
    image: String,

    /// POST the JSON report to this URL after the scan
    #[arg(long)]
    forward_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::resolve(&ProcessEnv, &cli.image)?.with_forwarding_target(cli.forward_url);

    if let Err(e) = klar_core::init_observability(config.trace) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    config.log_warnings();

    let status = commands::scan(&config).await?;
    if status.exit_code() != 0 {
        std::process::exit(status.exit_code());
    }

    Ok(())
}
