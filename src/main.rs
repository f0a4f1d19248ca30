#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release

use std::path::PathBuf;

use bim_ar_viewer::app::{App, Platform};
use bim_ar_viewer::config::AppConfig;
use clap::Parser;
use eframe::egui;
use eyre::{Result, WrapErr, eyre};
use log::info;

/// Map of building locations with an AR view of their 3D models.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file. Defaults apply without one.
    #[arg(short, long, env = "BIM_AR_CONFIG")]
    config: Option<PathBuf>,

    /// Route to open first, `#` for the map or `#/ar/<id>` for a building.
    #[arg(default_value = "#")]
    hash: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { config, hash } = Cli::parse();
    let config = AppConfig::load_or_default(config.as_deref())
        .wrap_err("Unable to start without a valid configuration")?;
    info!("Reading building catalog from {}", config.catalog_source);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1024.0, 768.0]),
        ..Default::default()
    };

    eframe::run_native(
        "BIM AR Viewer",
        options,
        Box::new(move |_cc| {
            let platform = Platform::from_config(&config);
            Ok(Box::new(App::new(config, platform, hash)))
        }),
    )
    .map_err(|e| eyre!("Failed to run the application: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_flag_and_hash() {
        let cli = Cli::try_parse_from(["bim-ar-viewer", "--config", "site.json", "#/ar/7"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("site.json")));
        assert_eq!(cli.hash, "#/ar/7");
    }

    #[test]
    fn hash_defaults_to_map() {
        let cli = Cli::try_parse_from(["bim-ar-viewer", "-c", "site.json"]).unwrap();
        assert_eq!(cli.hash, "#");
    }

    #[test]
    fn config_from_environment() {
        // SAFETY: no other test in this binary reads the process environment.
        unsafe { std::env::set_var("BIM_AR_CONFIG", "from-env.json") };
        let cli = Cli::try_parse_from(["bim-ar-viewer"]);
        unsafe { std::env::remove_var("BIM_AR_CONFIG") };

        assert_eq!(cli.unwrap().config, Some(PathBuf::from("from-env.json")));
    }

    #[test]
    fn config_flag_needs_a_path() {
        assert!(Cli::try_parse_from(["bim-ar-viewer", "--config"]).is_err());
    }
}
