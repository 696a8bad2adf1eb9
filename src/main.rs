use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use caption_relay::{output, server, utils};
use caption_relay::{Cli, Commands, Config, TranscriptPipeline, TranscriptRequest};

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "caption_relay=debug,tower_http=debug"
    } else {
        "caption_relay=info,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    // logs go to stderr so `fetch` output stays clean
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let mut config = match (&cli.command, cli.config.as_deref()) {
        // `config --init` may name a file that does not exist yet
        (Commands::Config { init: true, .. }, Some(path)) if !path.exists() => Config::default(),
        (_, explicit) => Config::load(explicit)?,
    };

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            server::serve(&config).await?;
        }
        Commands::Fetch {
            video,
            start,
            end,
            debug,
        } => {
            let Some(video_id) = utils::extract_video_id(&video) else {
                bail!("Not a YouTube video id or URL: {}", video);
            };

            let pipeline = TranscriptPipeline::new(&config)?;
            let request = TranscriptRequest::new(video_id, start, end).with_debug(debug);
            let outcome = pipeline.run(&request).await?;

            output::print_to_console(&request, &outcome)?;
        }
        Commands::Config { show, init } => {
            if init {
                let path = cli
                    .config
                    .clone()
                    .or_else(Config::config_path)
                    .context("Could not determine a configuration path")?;
                if path.exists() {
                    println!("Configuration already exists at: {}", path.display());
                } else {
                    config.save_to(&path)?;
                    println!("Configuration written to: {}", path.display());
                }
            }
            if show || !init {
                config.display();
            }
        }
        Commands::Strategies => {
            println!("Strategy order:");
            for (i, name) in config.pipeline.strategies.iter().enumerate() {
                println!("  {}. {}", i + 1, name);
            }
            println!("Internal API clients:");
            for client in &config.innertube.clients {
                println!("  • {} {}", client.name, client.version);
            }
        }
    }

    Ok(())
}
