#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Console hardware family a cartridge runs on.
pub enum HardwareMode {
    Dmg,
    Cgb,
    Sgb,
}

impl HardwareMode {
    /// File name of the boot ROM image for this mode.
    pub const fn boot_rom_name(self) -> &'static str {
        match self {
            HardwareMode::Dmg => "dmg_boot.bin",
            HardwareMode::Cgb => "cgb_boot.bin",
            HardwareMode::Sgb => "sgb_boot.bin",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
/// Operator choice of hardware mode.
pub enum ModeOverride {
    #[default]
    Auto,
    Dmg,
    Cgb,
    Sgb,
}

impl ModeOverride {
    const fn forced(self) -> Option<HardwareMode> {
        match self {
            ModeOverride::Auto => None,
            ModeOverride::Dmg => Some(HardwareMode::Dmg),
            ModeOverride::Cgb => Some(HardwareMode::Cgb),
            ModeOverride::Sgb => Some(HardwareMode::Sgb),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
/// Set of hardware modes a cartridge declares support for.
pub struct ModeSupport {
    pub dmg: bool,
    pub cgb: bool,
    pub sgb: bool,
}

impl ModeSupport {
    #[inline]
    pub const fn supports(self, mode: HardwareMode) -> bool {
        match mode {
            HardwareMode::Dmg => self.dmg,
            HardwareMode::Cgb => self.cgb,
            HardwareMode::Sgb => self.sgb,
        }
    }

    /// Mode picked when the operator leaves the choice to the cartridge.
    pub const fn preferred(self) -> HardwareMode {
        if self.cgb {
            HardwareMode::Cgb
        } else if self.sgb {
            HardwareMode::Sgb
        } else {
            HardwareMode::Dmg
        }
    }

    /// Intersects the operator override with what the cartridge supports.
    ///
    /// Returns the active mode and whether the override could be honored.
    pub const fn resolve(self, wanted: ModeOverride) -> (HardwareMode, bool) {
        match wanted.forced() {
            None => (self.preferred(), true),
            Some(mode) if self.supports(mode) => (mode, true),
            Some(_) => (self.preferred(), false),
        }
    }
}
