//! ohapc - Open Home Automation Protocol client
//!
//! Connects to a central unit, mirrors its item tree and prints every change
//! as NDJSON on stdout. Commands such as `set 5 on` are read from stdin.

mod headless;

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::eyre;

use ohap_app::config::{self, Settings};

/// ohapc - Open Home Automation Protocol client
#[derive(Parser, Debug)]
#[command(name = "ohapc")]
#[command(about = "Headless client for an OHAP central unit", long_about = None)]
struct Args {
    /// Central unit URL, e.g. http://192.168.1.10:18000/
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// Config file to use instead of ~/.config/ohap-client/config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, short)]
    username: Option<String>,

    #[arg(long, short)]
    password: Option<String>,

    /// Listen to every container the central unit announces
    #[arg(long)]
    listen_all: bool,

    /// Do not listen to the root container on start
    #[arg(long)]
    no_auto_connect: bool,

    /// Write a commented default config file and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    ohap_core::logging::init()?;

    if args.init_config {
        let dir = config::default_config_dir().ok_or_else(|| eyre!("No config directory"))?;
        config::init_config_file(&dir)?;
        eprintln!("Config file: {}", dir.join(config::CONFIG_FILENAME).display());
        return Ok(());
    }

    let settings = resolve_settings(&args);
    headless::runner::run_headless(settings).await?;
    Ok(())
}

/// Config file settings with command-line overrides applied
fn resolve_settings(args: &Args) -> Settings {
    let mut settings = match (&args.config, config::default_config_dir()) {
        (Some(path), _) => config::load_settings_file(path),
        (None, Some(dir)) => config::load_settings(&dir),
        (None, None) => Settings::default(),
    };

    if let Some(url) = &args.url {
        settings.server.url = url.clone();
    }
    if let Some(username) = &args.username {
        settings.login.username = username.clone();
    }
    if let Some(password) = &args.password {
        settings.login.password = password.clone();
    }
    if args.listen_all {
        settings.behavior.listen_all = true;
    }
    if args.no_auto_connect {
        settings.server.auto_connect = false;
    }
    settings
}
