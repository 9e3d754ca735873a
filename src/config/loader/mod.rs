use crate::config::Config;
use crate::utils::{ensure_dir, get_chatgate_home};
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[allow(unused_imports)]
use tracing::warn;

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_chatgate_home()?.join("config.json"))
}

pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let data: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON from {}", path.display()))?;

        let mut config: Config =
            serde_json::from_value(data).with_context(|| "Failed to deserialize config")?;

        crate::config::credentials::apply_env_overrides(&mut config);

        check_file_permissions(path);

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        return Ok(config);
    }

    let mut default_config = Config::default();
    crate::config::credentials::apply_env_overrides(&mut default_config);
    default_config
        .validate()
        .with_context(|| "Default configuration validation failed")?;
    Ok(default_config)
}

/// Warn once per process if the config file is readable by others.
#[cfg(unix)]
fn check_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Once;

    static WARNED: Once = Once::new();
    WARNED.call_once(|| {
        if let Ok(meta) = std::fs::metadata(path) {
            let mode = meta.permissions().mode();
            if mode & 0o077 != 0 {
                warn!(
                    "config file {} has permissions {:o}, recommend 0600",
                    path.display(),
                    mode & 0o777
                );
            }
        }
    });
}

#[cfg(not(unix))]
fn check_file_permissions(_path: &Path) {}

pub fn save_config(config: &Config, config_path: Option<&Path>) -> Result<()> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    ensure_dir(path.parent().context("Config path has no parent")?)?;

    let content = serde_json::to_string_pretty(config)?;
    crate::utils::atomic_write(path, &content)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }

    Ok(())
}

#[cfg(test)]
mod tests;
