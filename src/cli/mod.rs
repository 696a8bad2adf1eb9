use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "caption-relay",
    about = "Caption Relay - time-windowed caption text for YouTube videos",
    version,
    long_about = "Fetches YouTube captions through an ordered chain of fallback strategies and returns only the text spoken inside a requested time window. Runs as an HTTP service or as a one-shot command."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./config.yaml, then the user config dir)
    #[arg(short, long, global = true, value_name = "FILE", env = "CAPTION_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "CAPTION_RELAY_LOG_JSON")]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to listen on (overrides server.bind)
        #[arg(short, long, value_name = "ADDR", env = "CAPTION_RELAY_BIND")]
        bind: Option<String>,
    },

    /// Fetch the caption text of one video window and print it
    Fetch {
        /// Video id or YouTube URL (watch, youtu.be, shorts, embed)
        #[arg(value_name = "VIDEO")]
        video: String,

        /// Window start in seconds
        #[arg(short, long, value_name = "SECONDS", allow_negative_numbers = true)]
        start: f64,

        /// Window end in seconds
        #[arg(short, long, value_name = "SECONDS", allow_negative_numbers = true)]
        end: f64,

        /// Print the diagnostic JSON report instead of plain text
        #[arg(long)]
        debug: bool,
    },

    /// Show or initialize the configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Write the default configuration file if none exists
        #[arg(long)]
        init: bool,
    },

    /// List the configured strategy order and client identities
    Strategies,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_fetch() {
        let cli = Cli::try_parse_from([
            "caption-relay",
            "fetch",
            "https://youtu.be/dQw4w9WgXcQ",
            "--start",
            "10",
            "--end",
            "20.5",
            "--debug",
        ])
        .unwrap();

        match cli.command {
            Commands::Fetch {
                video,
                start,
                end,
                debug,
            } => {
                assert_eq!(video, "https://youtu.be/dQw4w9WgXcQ");
                assert_eq!(start, 10.0);
                assert_eq!(end, 20.5);
                assert!(debug);
            }
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn test_fetch_requires_window() {
        assert!(Cli::try_parse_from(["caption-relay", "fetch", "dQw4w9WgXcQ", "--start", "1"]).is_err());
    }
}
