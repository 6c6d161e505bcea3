//! Plugbridge - module host CLI
//!
//! Loads modules and dispatches call strings from the command line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plugbridge::config::CONFIG_FILE_NAME;
use plugbridge::{Bridge, BridgeConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "plugbridge")]
#[command(version)]
#[command(about = "Load modules at runtime and call into them by name", long_about = None)]
struct Cli {
    /// Config file (default: search upward for plugbridge.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a plugbridge.toml config file
    InitConfig {
        /// Output path (default: ./plugbridge.toml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// List loaded modules with their types and member signatures
    Inspect {
        /// Module to load (repeatable)
        #[arg(short, long = "module", value_name = "PATH")]
        modules: Vec<PathBuf>,
    },

    /// Load modules and dispatch a static call
    Run {
        /// Module to load (repeatable)
        #[arg(short, long = "module", value_name = "PATH")]
        modules: Vec<PathBuf>,

        /// Call string, e.g. "Calc.Math.Add(1, 2)"
        call: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::InitConfig { path, force } => cmd_init_config(path.as_deref(), force),
        Commands::Inspect { modules } => {
            let bridge = open_bridge(cli.config.as_deref(), &modules)?;
            cmd_inspect(&bridge);
            Ok(())
        }
        Commands::Run { modules, call } => {
            let bridge = open_bridge(cli.config.as_deref(), &modules)?;
            cmd_run(&bridge, &call)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => BridgeConfig::load_from_cwd().context("Failed to load plugbridge.toml"),
    }
}

fn open_bridge(config: Option<&Path>, modules: &[PathBuf]) -> Result<Arc<Bridge>> {
    let mut config = load_config(config)?;
    // Command-line module paths are relative to the working directory.
    if config.module_dir.is_none() {
        config.module_dir = Some(std::env::current_dir().context("No working directory")?);
    }

    let bridge = Bridge::builder().config(config).build_shared();
    for module in modules {
        bridge
            .load_module(module)
            .with_context(|| format!("Failed to load module {}", module.display()))?;
    }
    Ok(bridge)
}

fn cmd_run(bridge: &Bridge, call: &str) -> Result<()> {
    let value = bridge
        .call(call)
        .with_context(|| format!("Call failed: {}", call))?;
    println!("{}", plugbridge::ResultValue::from(value));
    Ok(())
}

fn cmd_inspect(bridge: &Bridge) {
    bridge.with_registry(|registry| {
        let modules = registry.modules();
        if modules.is_empty() {
            println!("No modules loaded");
        }
        for module in modules.iter().chain(std::iter::once(registry.ambient())) {
            match module.key() {
                Some(key) => println!("{} [{}]", module.path().display(), key),
                None => {
                    if module.definition().type_count() == 0 {
                        continue;
                    }
                    println!("<ambient>");
                }
            }
            for type_def in module.definition().types() {
                let ctor = if type_def.has_constructor() { " (constructible)" } else { "" };
                println!("  {}{}", type_def.name(), ctor);
                for method in type_def.static_methods() {
                    println!("    static {}", method);
                }
                for method in type_def.methods() {
                    println!("    {}", method);
                }
            }
        }
    });
}

fn cmd_init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(|| Path::new(CONFIG_FILE_NAME));
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        );
    }

    BridgeConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    Ok(())
}
