use anyhow::{Context, Result};
use tvision_runtime_config::{
    ClientConfig, SERVER_URL_ENV, apply_compat_fallbacks, apply_env_overrides, config_path,
    load_config, save_config, state_path,
};

/// Effective configuration: file, then `TVISION_SERVER_URL`, then `--server`.
pub fn resolve(server_flag: Option<&str>) -> Result<ClientConfig> {
    let path = config_path().context("Could not determine config directory")?;
    let mut config = load_config(&path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    apply_server_flag(&mut config, server_flag);
    Ok(config)
}

fn apply_server_flag(config: &mut ClientConfig, server_flag: Option<&str>) {
    if let Some(url) = server_flag.filter(|u| !u.trim().is_empty()) {
        config.server.url = url.to_string();
        apply_compat_fallbacks(config);
    }
}

/// Print current config.
pub fn show_config(server_flag: Option<&str>) -> Result<()> {
    let path = config_path()?;
    let config = resolve(server_flag)?;
    println!("Config file: {}", path.display());
    println!();
    println!("[server]");
    println!("  url          = {}", config.server.url);
    println!("  timeout_secs = {}", config.server.timeout_secs);
    if std::env::var(SERVER_URL_ENV).is_ok() {
        println!("  (url overridden by {SERVER_URL_ENV})");
    }
    println!();
    println!("[ui]");
    println!("  default_theme = {}", config.ui.default_theme);
    println!("  download_name = {}", config.ui.download_name);
    println!();
    println!("[storage]");
    println!("  state_file = {}", state_path(&config)?.display());
    Ok(())
}

/// Persist a new server URL to `tvision.toml`.
pub fn set_server(url: &str) -> Result<()> {
    let path = config_path()?;
    let mut config = load_config(&path)?;
    config.server.url = url.to_string();
    apply_compat_fallbacks(&mut config);
    save_config(&path, &config)?;
    println!("Configuration updated.");
    show_config(None)
}
