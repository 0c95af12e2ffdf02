use gbcart_core::{Settings, hardware::ModeOverride, serial::LinkDeviceKind};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EmulationMode {
    #[default]
    Auto,
    ForceDmg,
    ForceCgb,
    ForceSgb,
}

impl From<EmulationMode> for ModeOverride {
    fn from(mode: EmulationMode) -> Self {
        match mode {
            EmulationMode::Auto => ModeOverride::Auto,
            EmulationMode::ForceDmg => ModeOverride::Dmg,
            EmulationMode::ForceCgb => ModeOverride::Cgb,
            EmulationMode::ForceSgb => ModeOverride::Sgb,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum LinkDevice {
    #[default]
    None,
    Printer,
}

impl From<LinkDevice> for LinkDeviceKind {
    fn from(device: LinkDevice) -> Self {
        match device {
            LinkDevice::None => LinkDeviceKind::None,
            LinkDevice::Printer => LinkDeviceKind::Printer,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub boot_rom_dir: Option<PathBuf>,
    pub save_dir: Option<PathBuf>,
    pub print_dir: Option<PathBuf>,
    pub emulation_mode: EmulationMode,
    pub link_device: LinkDevice,
    /// Fixed seed for the RAM fill; leave unset for a fresh one per run.
    pub ram_seed: Option<u32>,
    /// Still image fed to the camera sensor.
    pub camera_image: Option<PathBuf>,
}

impl Config {
    pub fn settings(&self) -> Settings {
        Settings {
            mode_override: self.emulation_mode.into(),
            boot_rom_dir: self.boot_rom_dir.clone(),
            save_dir: self.save_dir.clone(),
            print_dir: self.print_dir.clone(),
            ram_seed: self.ram_seed,
            link_device: self.link_device.into(),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("gbcart").join("config.toml");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("gbcart").join("config.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("gbcart")
            .join("config.toml");
    }

    PathBuf::from("config.toml")
}

/// Missing or unreadable files fall back to defaults.
pub fn load_from_file(path: &Path) -> Config {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return Config::default(),
    };

    match toml::from_str::<Config>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse config {}: {e}; using defaults",
                path.display()
            );
            Config::default()
        }
    }
}

pub fn save_to_file(path: &Path, cfg: &Config) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let text = toml::to_string_pretty(cfg).map_err(std::io::Error::other)?;
    std::fs::write(path, text)
}
