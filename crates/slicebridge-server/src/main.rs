use clap::Parser;
use slicebridge_core::{default_config_path, Slicer, SlicerConfig, ENGINE_ENV, ENGINE_TARGET, LOG_ENV};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "slicebridge-server", about = "HTTP front-end for slicebridge")]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 8322)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Configuration file (default: $XDG_CONFIG_HOME/slicebridge/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Engine executable, overriding the configuration.
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Directory of stored profiles, overriding the configuration.
    #[arg(long)]
    profiles_dir: Option<PathBuf>,
}

fn init_tracing(debug_engine: bool) {
    let mut filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    if debug_engine {
        if let Ok(directive) = format!("{ENGINE_TARGET}=debug").parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: &Cli) -> Result<SlicerConfig, String> {
    let path = match &cli.config {
        Some(p) => p.clone(),
        None => default_config_path().map_err(|e| e.to_string())?,
    };
    let mut config = SlicerConfig::load(&path)
        .map_err(|e| e.to_string())?
        .with_engine_override(std::env::var(ENGINE_ENV).ok());
    if let Some(engine) = &cli.engine {
        config.engine = Some(engine.clone());
    }
    if let Some(dir) = &cli.profiles_dir {
        config.profiles_dir = Some(dir.clone());
    }
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(3);
        }
    };
    init_tracing(config.debug_logging);

    let addr = format!("{}:{}", cli.bind, cli.port);
    let slicer = Arc::new(Slicer::new(config));
    info!("starting slicebridge-server on {addr}");
    if !slicer.is_engine_configured() {
        info!("no slicing engine configured; import and profile routes only");
    }

    match slicebridge_server::run_server(&slicer, &addr) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("failed to bind HTTP server on {addr}: {e}");
            ExitCode::FAILURE
        }
    }
}
