//! Layered configuration for the command-line client
//!
//! Later layers win: built-in defaults, then the TOML file, then
//! environment and command-line overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use avatar_rtc_client_core::SessionConfig;

/// Values that override the file configuration when present
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub signaling_url: Option<String>,
    pub base_url: Option<String>,
    pub ice_gathering_timeout_ms: Option<u64>,
    pub signaling_timeout_ms: Option<u64>,
    pub require_session_id: bool,
    pub capture_local_media: bool,
    pub disable_audio_enhancement: bool,
}

/// `~/.config/avatar-rtc/config.toml` on Linux
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("avatar-rtc").join("config.toml"))
}

/// Resolve the session configuration
///
/// An explicit `path` must exist; the default path is optional.
pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<SessionConfig> {
    let mut config = match path {
        Some(path) => from_file(path)?,
        None => match default_config_path() {
            Some(path) if path.exists() => from_file(&path)?,
            _ => {
                debug!("No config file, using defaults");
                SessionConfig::default()
            }
        },
    };

    apply_overrides(&mut config, overrides);
    config.validate().context("invalid session configuration")?;
    Ok(config)
}

fn from_file(path: &Path) -> Result<SessionConfig> {
    if !path.exists() {
        bail!("config file {} does not exist", path.display());
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let config = parse(&content).with_context(|| format!("failed to parse {}", path.display()))?;
    info!(path = %path.display(), "Loaded config file");
    Ok(config)
}

/// Parse a TOML document; missing keys take their defaults
pub fn parse(content: &str) -> Result<SessionConfig> {
    Ok(toml::from_str(content)?)
}

pub fn apply_overrides(config: &mut SessionConfig, overrides: &Overrides) {
    if let Some(base) = &overrides.base_url {
        *config = std::mem::take(config).with_base_url(base);
    }
    // A full URL beats a base URL
    if let Some(url) = &overrides.signaling_url {
        config.signaling_url = url.clone();
    }
    if let Some(ms) = overrides.ice_gathering_timeout_ms {
        config.ice_gathering_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = overrides.signaling_timeout_ms {
        config.signaling_timeout = Duration::from_millis(ms);
    }
    if overrides.require_session_id {
        config.require_session_id = true;
    }
    if overrides.capture_local_media {
        config.media.capture_local_media = true;
    }
    if overrides.disable_audio_enhancement {
        config.audio.enabled = false;
    }
}

pub fn to_toml(config: &SessionConfig) -> Result<String> {
    toml::to_string_pretty(config).context("failed to render config as TOML")
}
