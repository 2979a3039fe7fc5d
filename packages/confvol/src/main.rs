use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use confvol_driver::{Configuration, CreateOptions, VolumeRegistry};
use confvol_store::{EtcdAuth, EtcdStore};

/// confvol - config volumes materialized from etcd
#[derive(Parser, Debug)]
#[command(name = "confvol")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and exit
    Check,

    /// Create a volume, sync it from the store and print its mountpoint
    Mount {
        name: String,

        /// Render values as templates
        #[arg(long)]
        tmpl: bool,

        /// Octal file mode for a single-file volume
        #[arg(long)]
        mode: Option<String>,
    },

    /// Delete a volume's materialized files
    Remove { name: String },
}

fn main() {
    let args = Args::parse();
    init_logging();

    let config = match load_config(args.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };
    if let Err(errors) = config.check_integrity() {
        for e in errors {
            log::error!("{}", e);
        }
        std::process::exit(1);
    }

    if let Err(e) = run(args.command, &config) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn init_logging() {
    let debug = std::env::var("DEBUG").is_ok_and(|v| parse_bool(&v));
    let level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "t" | "T" | "true" | "TRUE" | "True")
}

fn load_config(path: Option<&PathBuf>) -> Result<Configuration, confvol_driver::ConfigError> {
    match path {
        Some(path) => Configuration::load_from_file(path),
        None => Ok(Configuration::new()),
    }
}

fn run(command: Command, config: &Configuration) -> Result<(), confvol_store::Error> {
    if let Command::Check = command {
        println!("configuration ok");
        return Ok(());
    }

    let mut store = EtcdStore::new(&config.backend_endpoint_list(), config.backend_timeout())?;
    if let Some(auth) = &config.backend.auth {
        store = store.with_auth(EtcdAuth {
            user: auth.user.clone(),
            password: auth.password.clone(),
        });
    }
    let registry = VolumeRegistry::new(config, Arc::new(store));

    match command {
        Command::Check => {}
        Command::Mount { name, tmpl, mode } => {
            let mut options = HashMap::new();
            if tmpl {
                options.insert(CreateOptions::TEMPLATE.to_string(), "true".to_string());
            }
            if let Some(mode) = mode {
                options.insert(CreateOptions::MODE.to_string(), mode);
            }
            registry.create(&name, &CreateOptions::from_options(&options));
            if let Some(mountpoint) = registry.mount(&name) {
                println!("{}", mountpoint.display());
            }
        }
        Command::Remove { name } => {
            registry.create(&name, &CreateOptions::default());
            registry.remove(&name);
        }
    }
    Ok(())
}
