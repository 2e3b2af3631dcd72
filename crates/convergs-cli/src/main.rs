use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod repl;

use convergs_core::{load_config, PlaygroundConfig};
use convergs_provider::{create_backend, AgentBackend};
use convergs_schema::{qualification_label, PERSONA_PRESETS};
use repl::CallOptions;

const CONFIG_FILE: &str = "config.yaml";

#[derive(Parser)]
#[command(name = "convergs", version, about = "ConvergsAI voice agent playground")]
struct Cli {
    #[arg(
        long,
        default_value = "~/.convergs",
        help = "Config root directory (contains config.yaml and logs/)"
    )]
    config_root: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Place a simulated call with the agent (interactive)")]
    Call {
        #[arg(long, help = "Persona preset id or name")]
        preset: Option<String>,
        #[arg(long, help = "Custom persona prompt, overrides --preset")]
        prompt: Option<String>,
        #[arg(long, help = "Use the scripted offline backend")]
        offline: bool,
    },
    #[command(about = "List persona presets")]
    Presets,
    #[command(about = "Validate config file")]
    Validate,
    #[command(about = "Check that the agent backend is reachable")]
    Health,
}

fn expand_home(path: PathBuf) -> PathBuf {
    if !path.starts_with("~") {
        return path;
    }
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(path.strip_prefix("~").unwrap_or(&path)),
        None => path,
    }
}

fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();
    cli.config_root = expand_home(cli.config_root);

    let log_dir = cli.config_root.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("creating {}", log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "convergs.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Call {
            preset,
            prompt,
            offline,
        } => {
            let config = load_config(&config_path(&cli.config_root))?;
            repl::run(
                config,
                CallOptions {
                    preset,
                    prompt,
                    offline,
                },
            )
            .await?;
        }
        Commands::Presets => print_presets(),
        Commands::Validate => {
            let config = load_config(&config_path(&cli.config_root))?;
            print_config_summary(&config);
        }
        Commands::Health => {
            let config = load_config(&config_path(&cli.config_root))?;
            let backend = create_backend(&config.backend);
            backend
                .health()
                .await
                .with_context(|| format!("agent backend at {}", config.backend.base_url))?;
            println!("Agent backend OK ({})", config.backend.base_url);
        }
    }

    Ok(())
}

fn print_presets() {
    let default = convergs_schema::default_preset().id;
    for preset in PERSONA_PRESETS {
        let marker = if preset.id == default { "*" } else { " " };
        println!("{marker} {:<20} {}", preset.id, preset.name);
        println!("    {}", preset.prompt);
    }
}

fn print_config_summary(config: &PlaygroundConfig) {
    let keys: Vec<String> = config
        .qualification_keys
        .iter()
        .map(|k| qualification_label(k))
        .collect();
    println!(
        "Config valid. Backend {:?} at {}, ring {}ms, hang-up {}ms, default preset '{}'.",
        config.backend.kind,
        config.backend.base_url,
        config.call.ring_ms,
        config.call.hangup_ms,
        config.default_preset
    );
    println!("Qualification: {}", keys.join(", "));
}
