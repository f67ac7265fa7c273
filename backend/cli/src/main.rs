mod serve_cmd;
mod status_cmd;
mod terminal_output;
mod tools_cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sonicdesk")]
#[command(about = "SonicDesk: real-time voice session gateway")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
        port: Option<u16>,
        /// Config file (defaults to $SONICDESK_CONFIG or ~/.sonicdesk/config.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Query a running gateway's health endpoint
    Status {
        /// Base URL of the gateway
        #[arg(long, default_value = "http://localhost:8000")]
        url: String,
    },
    /// List the built-in tools
    Tools {
        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, config } => serve_cmd::run(port, config).await?,
        Commands::Status { url } => status_cmd::run(&url).await?,
        Commands::Tools { json } => tools_cmd::run(json)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_flags() {
        let cli = Cli::try_parse_from(["sonicdesk", "serve", "--port", "9000", "-c", "x.yaml"]).unwrap();
        match cli.command {
            Commands::Serve { port, config } => {
                assert_eq!(port, Some(9000));
                assert_eq!(config, Some(PathBuf::from("x.yaml")));
            }
            _ => panic!("expected serve"),
        }
        assert!(Cli::try_parse_from(["sonicdesk", "serve", "--port", "0"]).is_err());
    }

    #[test]
    fn status_has_default_url() {
        let cli = Cli::try_parse_from(["sonicdesk", "status"]).unwrap();
        match cli.command {
            Commands::Status { url } => assert_eq!(url, "http://localhost:8000"),
            _ => panic!("expected status"),
        }
    }
}
