use std::path::PathBuf;

use crate::{hardware::ModeOverride, serial::LinkDeviceKind};

/// Host configuration consumed by the loader and the peripherals.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub mode_override: ModeOverride,
    /// Directory searched for `dmg_boot.bin` / `cgb_boot.bin` / `sgb_boot.bin`.
    pub boot_rom_dir: Option<PathBuf>,
    /// Where `.sav`/`.rtc` files live. Defaults to the ROM's directory.
    pub save_dir: Option<PathBuf>,
    /// Where printed images are exported. Defaults to the working directory.
    pub print_dir: Option<PathBuf>,
    /// Seed for the uninitialised-RAM fill. `None` draws one from the clock.
    pub ram_seed: Option<u32>,
    /// What is plugged into the link port.
    pub link_device: LinkDeviceKind,
}

impl Settings {
    pub fn print_dir(&self) -> PathBuf {
        self.print_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn create_link_device(&self) -> Box<dyn crate::serial::LinkDevice> {
        self.link_device.create(self.print_dir())
    }
}
