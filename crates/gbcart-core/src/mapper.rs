use std::fmt;

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;
/// MBC2 has 512x4-bit internal RAM regardless of the header RAM size.
pub const MBC2_RAM_SIZE: usize = 0x200;
/// The camera always carries 128KB of RAM.
pub const CAMERA_RAM_BANKS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperKind {
    None,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
    Mbc6,
    Mbc7,
    Mmm01,
    Camera,
    HuC1,
    HuC3,
    Tama5,
    /// MBC5 variant with a rumble motor on a RAM bank line.
    Rumble,
}

impl MapperKind {
    pub const fn name(self) -> &'static str {
        match self {
            MapperKind::None => "ROM",
            MapperKind::Mbc1 => "MBC1",
            MapperKind::Mbc2 => "MBC2",
            MapperKind::Mbc3 => "MBC3",
            MapperKind::Mbc5 => "MBC5",
            MapperKind::Mbc6 => "MBC6",
            MapperKind::Mbc7 => "MBC7",
            MapperKind::Mmm01 => "MMM01",
            MapperKind::Camera => "POCKET CAMERA",
            MapperKind::HuC1 => "HuC1",
            MapperKind::HuC3 => "HuC3",
            MapperKind::Tama5 => "TAMA5",
            MapperKind::Rumble => "MBC5+RUMBLE",
        }
    }
}

/// Mapper identity and capabilities decoded from the cartridge type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapperInfo {
    pub kind: MapperKind,
    pub ram: bool,
    pub battery: bool,
    pub timer: bool,
    pub rumble: bool,
    /// The 0x0000-0x3FFF window can be remapped away from bank 0.
    pub bank0_switchable: bool,
}

const fn info(kind: MapperKind, ram: bool, battery: bool, timer: bool, rumble: bool) -> MapperInfo {
    MapperInfo {
        kind,
        ram,
        battery,
        timer,
        rumble,
        bank0_switchable: matches!(kind, MapperKind::Mbc1 | MapperKind::Mmm01),
    }
}

impl MapperInfo {
    /// Decodes the cartridge type byte at 0x0147. `None` means the byte does
    /// not name any supported mapper.
    pub const fn from_cartridge_type(byte: u8) -> Option<Self> {
        use MapperKind::*;
        let decoded = match byte {
            0x00 => info(None, false, false, false, false),
            0x01 => info(Mbc1, false, false, false, false),
            0x02 => info(Mbc1, true, false, false, false),
            0x03 => info(Mbc1, true, true, false, false),
            0x05 => info(Mbc2, true, false, false, false),
            0x06 => info(Mbc2, true, true, false, false),
            0x08 => info(None, true, false, false, false),
            0x09 => info(None, true, true, false, false),
            0x0B => info(Mmm01, false, false, false, false),
            0x0C => info(Mmm01, true, false, false, false),
            0x0D => info(Mmm01, true, true, false, false),
            0x0F => info(Mbc3, false, true, true, false),
            0x10 => info(Mbc3, true, true, true, false),
            0x11 => info(Mbc3, false, false, false, false),
            0x12 => info(Mbc3, true, false, false, false),
            0x13 => info(Mbc3, true, true, false, false),
            0x19 => info(Mbc5, false, false, false, false),
            0x1A => info(Mbc5, true, false, false, false),
            0x1B => info(Mbc5, true, true, false, false),
            0x1C => info(Rumble, false, false, false, true),
            0x1D => info(Rumble, true, false, false, true),
            0x1E => info(Rumble, true, true, false, true),
            0x20 => info(Mbc6, true, true, false, false),
            0x22 => info(Mbc7, true, true, false, true),
            0xFC => info(Camera, true, true, false, false),
            0xFD => info(Tama5, true, true, false, false),
            0xFE => info(HuC3, true, true, false, false),
            // HuC1 carries the infra-red port.
            0xFF => info(HuC1, true, true, false, false),
            _ => return Option::None,
        };
        Some(decoded)
    }
}

impl fmt::Display for MapperInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.name())?;
        if self.timer {
            f.write_str("+TIMER")?;
        }
        if self.rumble && self.kind != MapperKind::Rumble {
            f.write_str("+RUMBLE")?;
        }
        if self.ram {
            f.write_str("+RAM")?;
        }
        if self.battery {
            f.write_str("+BATTERY")?;
        }
        Ok(())
    }
}

/// Number of 8KB RAM banks declared by the RAM size code at 0x0149.
pub const fn ram_bank_count(code: u8) -> Option<usize> {
    match code {
        0x00 => Some(0),
        // 2KB chip, still occupies one bank slot.
        0x01 => Some(1),
        0x02 => Some(1),
        0x03 => Some(4),
        0x04 => Some(16),
        0x05 => Some(8),
        _ => None,
    }
}

/// Number of 16KB ROM banks declared by the ROM size code at 0x0148.
pub const fn rom_bank_count(code: u8) -> Option<usize> {
    match code {
        0x00..=0x08 => Some(2 << code),
        0x52 => Some(72),
        0x53 => Some(80),
        0x54 => Some(96),
        _ => None,
    }
}
