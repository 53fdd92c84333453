//! sheetsync CLI.

mod serve;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sheetsync")]
#[command(about = "Collaborative spreadsheet server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the spreadsheet server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "1100")]
        port: u16,

        /// Directory sheets are loaded from and persisted to
        #[arg(long, default_value = "./spreadsheets")]
        sheets_dir: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { host, port, sheets_dir } => {
            serve::execute(host, port, sheets_dir).await?;
        }
    }

    Ok(())
}
