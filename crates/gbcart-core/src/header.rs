//! Read-only view over the cartridge header at 0x0100-0x014F.

use crate::hardware::ModeSupport;

/// First byte past the header; anything shorter cannot be a ROM.
pub const HEADER_END: usize = 0x0150;

// https://gbdev.io/pandocs/The_Cartridge_Header.html#0104-0133---nintendo-logo
pub const NINTENDO_LOGO: [u8; 48] = [
    0xCE, 0xED, 0x66, 0x66, 0xCC, 0x0D, 0x00, 0x0B, 0x03, 0x73, 0x00, 0x83, 0x00, 0x0C, 0x00, 0x0D,
    0x00, 0x08, 0x11, 0x1F, 0x88, 0x89, 0x00, 0x0E, 0xDC, 0xCC, 0x6E, 0xE6, 0xDD, 0xDD, 0xD9, 0x99,
    0xBB, 0xBB, 0x67, 0x63, 0x6E, 0x0E, 0xEC, 0xCC, 0xDD, 0xDC, 0x99, 0x9F, 0xBB, 0xB9, 0x33, 0x3E,
];

const LOGO: std::ops::Range<usize> = 0x0104..0x0134;
const TITLE_START: usize = 0x0134;
const MANUFACTURER: std::ops::Range<usize> = 0x013F..0x0143;
const CGB_FLAG: usize = 0x0143;
const NEW_LICENSEE: std::ops::Range<usize> = 0x0144..0x0146;
const SGB_FLAG: usize = 0x0146;
const CART_TYPE: usize = 0x0147;
const ROM_SIZE: usize = 0x0148;
const RAM_SIZE: usize = 0x0149;
const DESTINATION: usize = 0x014A;
const OLD_LICENSEE: usize = 0x014B;
const VERSION: usize = 0x014C;
const HEADER_CHECKSUM: usize = 0x014D;
const GLOBAL_CHECKSUM: usize = 0x014E;

/// Old licensee value meaning "see the new licensee code"; required for SGB.
const USE_NEW_LICENSEE: u8 = 0x33;

/// Interpretation of the CGB flag byte at 0x0143.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CgbFlag {
    /// Bit 7 clear: monochrome-only cartridge.
    DmgOnly,
    /// 0x80: runs on both DMG and CGB.
    Compatible,
    /// 0xC0: CGB only.
    CgbOnly,
    /// Bit 7 set with an undocumented value; treated as compatible.
    Unrecognized(u8),
}

#[derive(Clone, Copy, Debug)]
pub struct Header<'a> {
    data: &'a [u8],
}

impl<'a> Header<'a> {
    /// Returns `None` when the buffer is too short to hold a header.
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        (data.len() >= HEADER_END).then_some(Self { data })
    }

    pub fn title(&self) -> String {
        // CGB-aware cartridges reuse the tail of the title area for the
        // manufacturer code and the CGB flag.
        let end = if self.cgb_flag() & 0x80 != 0 {
            MANUFACTURER.start
        } else {
            CGB_FLAG + 1
        };
        let mut slice = &self.data[TITLE_START..end];
        if let Some(pos) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..pos];
        }
        String::from_utf8_lossy(slice).trim().to_string()
    }

    pub fn manufacturer_code(&self) -> Option<String> {
        let code = &self.data[MANUFACTURER];
        code.iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
            .then(|| String::from_utf8_lossy(code).into_owned())
    }

    pub fn cgb_flag(&self) -> u8 {
        self.data[CGB_FLAG]
    }

    pub fn cgb_support(&self) -> CgbFlag {
        match self.cgb_flag() {
            v if v & 0x80 == 0 => CgbFlag::DmgOnly,
            0x80 => CgbFlag::Compatible,
            0xC0 => CgbFlag::CgbOnly,
            v => CgbFlag::Unrecognized(v),
        }
    }

    pub fn new_licensee_code(&self) -> [u8; 2] {
        [self.data[NEW_LICENSEE.start], self.data[NEW_LICENSEE.start + 1]]
    }

    pub fn sgb_flag(&self) -> u8 {
        self.data[SGB_FLAG]
    }

    pub fn cartridge_type(&self) -> u8 {
        self.data[CART_TYPE]
    }

    pub fn rom_size_code(&self) -> u8 {
        self.data[ROM_SIZE]
    }

    pub fn ram_size_code(&self) -> u8 {
        self.data[RAM_SIZE]
    }

    pub fn destination_code(&self) -> u8 {
        self.data[DESTINATION]
    }

    pub fn old_licensee_code(&self) -> u8 {
        self.data[OLD_LICENSEE]
    }

    pub fn version(&self) -> u8 {
        self.data[VERSION]
    }

    pub fn header_checksum(&self) -> u8 {
        self.data[HEADER_CHECKSUM]
    }

    pub fn global_checksum(&self) -> u16 {
        u16::from_be_bytes([self.data[GLOBAL_CHECKSUM], self.data[GLOBAL_CHECKSUM + 1]])
    }

    pub fn logo(&self) -> &'a [u8] {
        &self.data[LOGO]
    }

    pub fn logo_matches(&self) -> bool {
        self.logo() == NINTENDO_LOGO
    }

    pub fn header_checksum_matches(&self) -> bool {
        header_checksum(self.data) == self.header_checksum()
    }

    pub fn global_checksum_matches(&self) -> bool {
        global_checksum(self.data) == self.global_checksum()
    }

    pub fn mode_support(&self) -> ModeSupport {
        let (dmg, cgb) = match self.cgb_support() {
            CgbFlag::DmgOnly => (true, false),
            CgbFlag::CgbOnly => (false, true),
            CgbFlag::Compatible | CgbFlag::Unrecognized(_) => (true, true),
        };
        let sgb = dmg && self.sgb_flag() == 0x03 && self.old_licensee_code() == USE_NEW_LICENSEE;
        ModeSupport { dmg, cgb, sgb }
    }
}

/// Header checksum over 0x0134..=0x014C, as verified by the boot ROM.
pub fn header_checksum(rom: &[u8]) -> u8 {
    rom[TITLE_START..HEADER_CHECKSUM]
        .iter()
        .fold(0u8, |x, &b| x.wrapping_sub(b).wrapping_sub(1))
}

/// Sum of every ROM byte except the two global checksum bytes themselves.
pub fn global_checksum(rom: &[u8]) -> u16 {
    rom.iter()
        .enumerate()
        .filter(|&(i, _)| i != GLOBAL_CHECKSUM && i != GLOBAL_CHECKSUM + 1)
        .fold(0u16, |sum, (_, &b)| sum.wrapping_add(b as u16))
}
