mod commands;

use clap::{Parser, Subcommand};
use commands::{parse_assignment, Failure, PrinterArgs, EXIT_CONFIG_ERROR};
use slicebridge_core::{
    default_config_path, Slicer, SlicerConfig, ENGINE_ENV, ENGINE_TARGET, LOG_ENV,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(
    name = "slicebridge",
    version,
    about = "Translate Slic3r profiles and run slicing jobs"
)]
struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/slicebridge/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Engine executable, overriding the configuration and SLICEBRIDGE_ENGINE.
    #[arg(long, global = true)]
    engine: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Slice a model with the configured engine.
    Slice {
        /// Model file (STL, OBJ, AMF).
        model: PathBuf,
        /// G-code output path (default: the model path with a .gco extension).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Profile file (default: the configured default profile).
        #[arg(short, long)]
        profile: Option<PathBuf>,
        #[command(flatten)]
        printer: PrinterArgs,
        /// Override a profile parameter for this job.
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_assignment)]
        overrides: Vec<(String, String)>,
    },
    /// Import a Slic3r profile into the profile library.
    Import {
        /// Profile file to import.
        file: PathBuf,
        /// Stored name (default: the file name without extension).
        #[arg(long)]
        name: Option<String>,
        /// Human-readable name (default: the file's `# Name:` header).
        #[arg(long)]
        display_name: Option<String>,
        /// Description (default: the file's `# Description:` header).
        #[arg(long)]
        description: Option<String>,
        /// Replace an existing profile of the same name.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Show the resolved parameters of a profile.
    Show {
        /// Stored profile name or profile file (default: the default profile).
        profile: Option<String>,
        /// Keep every entry of the file, typed without the default table.
        #[arg(long, default_value_t = false)]
        raw: bool,
    },
    /// Write a profile as an engine-readable file.
    Export {
        /// Destination file.
        destination: PathBuf,
        /// Stored profile name or profile file (default: the default profile).
        #[arg(short, long)]
        profile: Option<String>,
        /// Override a profile parameter in the written file.
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_assignment)]
        overrides: Vec<(String, String)>,
        /// Replace the destination if it exists.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Print the engine arguments a profile resolves to.
    EngineArgs {
        /// Stored profile name or profile file (default: the default profile).
        profile: Option<String>,
        #[command(flatten)]
        printer: PrinterArgs,
        /// Override a profile parameter.
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_assignment)]
        overrides: Vec<(String, String)>,
    },
    /// Check the engine and profile setup.
    Doctor,
}

fn init_tracing(cli: &Cli, debug_engine: bool) {
    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    let mut filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    if debug_engine {
        if let Ok(directive) = format!("{ENGINE_TARGET}=debug").parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn config_path(cli: &Cli) -> Result<PathBuf, Failure> {
    match &cli.config {
        Some(p) => Ok(p.clone()),
        None => Ok(default_config_path()?),
    }
}

fn load_config(cli: &Cli, path: &Path) -> Result<SlicerConfig, Failure> {
    let mut config =
        SlicerConfig::load(path)?.with_engine_override(std::env::var(ENGINE_ENV).ok());
    if let Some(engine) = &cli.engine {
        config.engine = Some(engine.clone());
    }
    Ok(config)
}

fn run(cli: &Cli, slicer: &Arc<Slicer>, config_path: &Path) -> commands::CommandResult {
    let json = cli.json;
    match &cli.command {
        Commands::Slice {
            model,
            output,
            profile,
            printer,
            overrides,
        } => commands::slice::run(
            slicer,
            &commands::slice::SliceArgs {
                model,
                output: output.as_deref(),
                profile: profile.as_deref(),
                printer,
                overrides,
            },
            json,
        ),
        Commands::Import {
            file,
            name,
            display_name,
            description,
            force,
        } => commands::import::run(
            slicer,
            &commands::import::ImportArgs {
                file,
                name: name.as_deref(),
                display_name: display_name.as_deref(),
                description: description.as_deref(),
                force: *force,
            },
            json,
        ),
        Commands::Show { profile, raw } => {
            commands::show::run(slicer, profile.as_deref(), *raw, json)
        }
        Commands::Export {
            destination,
            profile,
            overrides,
            force,
        } => commands::export::run(slicer, profile.as_deref(), destination, overrides, *force),
        Commands::EngineArgs {
            profile,
            printer,
            overrides,
        } => commands::engine_args::run(slicer, profile.as_deref(), printer, overrides, json),
        Commands::Doctor => commands::doctor::run(slicer, config_path, json),
    }
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let config = config_path(&cli).and_then(|path| {
        let config = load_config(&cli, &path)?;
        Ok((path, config))
    });
    init_tracing(&cli, config.as_ref().is_ok_and(|(_, c)| c.debug_logging));
    let (path, config) = match config {
        Ok(c) => c,
        Err(failure) => {
            eprintln!("error: {}", failure.message);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    debug!("configuration: {}", path.display());

    let slicer = Arc::new(Slicer::new(config));
    match run(&cli, &slicer, &path) {
        Ok(code) => ExitCode::from(code),
        Err(failure) => {
            eprintln!("error: {}", failure.message);
            ExitCode::from(failure.code)
        }
    }
}
