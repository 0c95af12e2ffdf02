use std::{
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{
    camera::Camera,
    diagnostics::{self, Diagnostics, Level},
    hardware::{HardwareMode, ModeSupport},
    header::{CgbFlag, Header},
    mapper::{
        self, CAMERA_RAM_BANKS, MBC2_RAM_SIZE, MapperInfo, MapperKind, RAM_BANK_SIZE,
        ROM_BANK_SIZE,
    },
    persist,
    prng::Prng,
    rtc::{Rtc, SystemClock, WallClock},
    settings::Settings,
};

const TARGET: &str = "cartridge";

/// Camera register file is mapped when this RAM bank bit is set.
pub const CAMERA_REGISTER_BANK: u8 = 0x10;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("ROM is {0} bytes, too short to contain a cartridge header")]
    HeaderTruncated(usize),
    #[error("unsupported cartridge type byte {0:#04x}")]
    UnsupportedMapper(u8),
    #[error("unrecognized ROM size code {0:#04x}")]
    UnknownRomSize(u8),
    #[error("unrecognized RAM size code {0:#04x}")]
    UnknownRamSize(u8),
    #[error("ROM is {actual} bytes but the header declares {declared}")]
    RomTooSmall { declared: usize, actual: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A successfully loaded cartridge together with everything reported while
/// loading it.
#[derive(Debug)]
pub struct LoadOutcome {
    pub cartridge: Cartridge,
    pub report: Diagnostics,
}

#[derive(Debug)]
pub struct Cartridge {
    rom: Box<[u8]>,
    rom_banks: usize,
    ram: Vec<Box<[u8]>>,
    info: MapperInfo,
    cart_type: u8,
    mode: HardwareMode,
    support: ModeSupport,
    title: String,
    boot_rom: Option<Vec<u8>>,
    save_dir: PathBuf,
    save_name: String,
    ram_enabled: bool,
    ram_bank: u8,
    rtc: Option<Rtc>,
    camera: Option<Camera>,
}

impl Cartridge {
    /// Reads a ROM file, resolves it, and restores any battery/RTC state
    /// found next to it (or in `settings.save_dir`).
    pub fn from_file<P: AsRef<Path>>(path: P, settings: &Settings) -> Result<LoadOutcome, LoadError> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cartridge".to_string());

        let mut settings = settings.clone();
        if settings.save_dir.is_none() {
            settings.save_dir = path.parent().map(Path::to_path_buf);
        }

        let mut outcome = Self::load(data, name, &settings)?;
        let restored = persist::load(&mut outcome.cartridge, &SystemClock);
        outcome.report.extend(restored.diagnostics);
        Ok(outcome)
    }

    /// Resolves a raw ROM image into an emulated cartridge.
    ///
    /// Fatal problems return an error and leave nothing behind; everything
    /// else is reported in the outcome's diagnostics.
    pub fn load(
        data: Vec<u8>,
        save_name: impl Into<String>,
        settings: &Settings,
    ) -> Result<LoadOutcome, LoadError> {
        Self::resolve(data, save_name.into(), settings).inspect_err(|e| {
            diagnostics::emit(Level::Error, TARGET, format_args!("load failed: {e}"));
        })
    }

    fn resolve(data: Vec<u8>, save_name: String, settings: &Settings) -> Result<LoadOutcome, LoadError> {
        let header = Header::parse(&data).ok_or(LoadError::HeaderTruncated(data.len()))?;
        let mut report = Diagnostics::new();

        let title = header.title();
        report.info(TARGET, format_args!("title: {title:?}"));

        if !header.logo_matches() {
            report.bad_dump = true;
            report.warn(
                TARGET,
                format_args!("Nintendo logo mismatch, {title:?} is probably a bad dump"),
            );
        }
        if !header.header_checksum_matches() {
            report.warn(
                TARGET,
                format_args!(
                    "header checksum mismatch: stored {:#04x}, computed {:#04x}",
                    header.header_checksum(),
                    crate::header::header_checksum(&data)
                ),
            );
        }
        if !header.global_checksum_matches() {
            report.warn(
                TARGET,
                format_args!(
                    "global checksum mismatch: stored {:#06x}, computed {:#06x}",
                    header.global_checksum(),
                    crate::header::global_checksum(&data)
                ),
            );
        }

        if let CgbFlag::Unrecognized(flag) = header.cgb_support() {
            report.warn(
                TARGET,
                format_args!("unrecognized CGB flag {flag:#04x}, enabling DMG and CGB modes"),
            );
        }
        let support = header.mode_support();
        let (mode, honored) = support.resolve(settings.mode_override);
        if !honored {
            report.warn(
                TARGET,
                format_args!(
                    "{:?} mode requested but not supported by the cartridge, using {mode:?}",
                    settings.mode_override
                ),
            );
        }

        let cart_type = header.cartridge_type();
        let info = MapperInfo::from_cartridge_type(cart_type)
            .ok_or(LoadError::UnsupportedMapper(cart_type))?;
        report.info(TARGET, format_args!("mapper: {info} ({cart_type:#04x})"));

        let rom_code = header.rom_size_code();
        let rom_banks = mapper::rom_bank_count(rom_code).ok_or(LoadError::UnknownRomSize(rom_code))?;
        let ram_code = header.ram_size_code();
        let declared_ram_banks =
            mapper::ram_bank_count(ram_code).ok_or(LoadError::UnknownRamSize(ram_code))?;

        let declared = rom_banks * ROM_BANK_SIZE;
        if data.len() < declared {
            return Err(LoadError::RomTooSmall {
                declared,
                actual: data.len(),
            });
        }
        if data.len() > declared {
            report.warn(
                TARGET,
                format_args!(
                    "ROM is {} bytes, larger than the declared {declared}; extra data ignored",
                    data.len()
                ),
            );
        }

        let ram_banks = match info.kind {
            MapperKind::Mbc2 => 1,
            MapperKind::Camera => declared_ram_banks.max(CAMERA_RAM_BANKS),
            MapperKind::Mbc7 => declared_ram_banks.max(1),
            _ if !info.ram => {
                if declared_ram_banks > 0 {
                    report.warn(
                        TARGET,
                        format_args!("header declares RAM but {} has none", info.kind.name()),
                    );
                }
                0
            }
            _ => declared_ram_banks,
        };

        let mut prng = settings.ram_seed.map(Prng::new).unwrap_or_else(Prng::from_time);
        let ram = (0..ram_banks)
            .map(|_| {
                let mut bank = vec![0u8; RAM_BANK_SIZE].into_boxed_slice();
                prng.fill(&mut bank);
                bank
            })
            .collect::<Vec<_>>();

        let boot_rom = settings
            .boot_rom_dir
            .as_deref()
            .and_then(|dir| load_boot_rom(dir, mode, &mut report));

        let rtc = info.timer.then(|| Rtc::new(SystemClock.now()));
        let camera = (info.kind == MapperKind::Camera).then(Camera::new);

        report.info(
            TARGET,
            format_args!(
                "{rom_banks} ROM banks, {ram_banks} RAM banks, mode {mode:?}, battery: {}",
                if info.battery { "yes" } else { "no" }
            ),
        );

        Ok(LoadOutcome {
            cartridge: Self {
                rom: data.into_boxed_slice(),
                rom_banks,
                ram,
                info,
                cart_type,
                mode,
                support,
                title,
                boot_rom,
                save_dir: settings.save_dir.clone().unwrap_or_else(|| PathBuf::from(".")),
                save_name,
                ram_enabled: false,
                ram_bank: 0,
                rtc,
                camera,
            },
            report,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn info(&self) -> MapperInfo {
        self.info
    }

    pub fn kind(&self) -> MapperKind {
        self.info.kind
    }

    pub fn cartridge_type(&self) -> u8 {
        self.cart_type
    }

    pub fn mode(&self) -> HardwareMode {
        self.mode
    }

    pub fn mode_support(&self) -> ModeSupport {
        self.support
    }

    pub fn has_battery(&self) -> bool {
        self.info.battery
    }

    pub fn has_rtc(&self) -> bool {
        self.info.timer
    }

    pub fn has_rumble(&self) -> bool {
        self.info.rumble
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    pub fn header(&self) -> Option<Header<'_>> {
        Header::parse(&self.rom)
    }

    pub fn rom_bank_count(&self) -> usize {
        self.rom_banks
    }

    /// Borrowed view of one 16KB ROM bank.
    pub fn rom_bank(&self, index: usize) -> Option<&[u8]> {
        self.rom_banks().nth(index)
    }

    pub fn rom_banks(&self) -> impl Iterator<Item = &[u8]> {
        self.rom.chunks_exact(ROM_BANK_SIZE).take(self.rom_banks)
    }

    pub fn ram_bank_count(&self) -> usize {
        self.ram.len()
    }

    pub fn ram_bank(&self, index: usize) -> Option<&[u8]> {
        self.ram.get(index).map(|b| &b[..])
    }

    pub fn ram_bank_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        self.ram.get_mut(index).map(|b| &mut b[..])
    }

    /// Number of RAM bytes that are real storage (and therefore persisted).
    pub fn ram_capacity(&self) -> usize {
        match self.info.kind {
            MapperKind::Mbc2 => MBC2_RAM_SIZE,
            _ => self.ram.len() * RAM_BANK_SIZE,
        }
    }

    pub fn boot_rom(&self) -> Option<&[u8]> {
        self.boot_rom.as_deref()
    }

    pub fn save_name(&self) -> &str {
        &self.save_name
    }

    pub fn save_path(&self) -> PathBuf {
        self.save_dir.join(format!("{}.sav", self.save_name))
    }

    pub fn rtc_path(&self) -> PathBuf {
        self.save_dir.join(format!("{}.rtc", self.save_name))
    }

    pub fn rtc(&self) -> Option<&Rtc> {
        self.rtc.as_ref()
    }

    pub fn rtc_mut(&mut self) -> Option<&mut Rtc> {
        self.rtc.as_mut()
    }

    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    pub fn camera_mut(&mut self) -> Option<&mut Camera> {
        self.camera.as_mut()
    }

    /// RAMG write from the address decoder.
    pub fn set_ram_enabled(&mut self, enabled: bool) {
        self.ram_enabled = enabled;
    }

    /// RAM bank register write from the address decoder. On MBC3 the values
    /// 0x08-0x0C select RTC registers; on the camera bit 4 selects the
    /// sensor register file.
    pub fn select_ram_bank(&mut self, bank: u8) {
        self.ram_bank = bank;
    }

    /// MBC3 latch register (0x6000-0x7FFF).
    pub fn latch_rtc(&mut self, value: u8) {
        if let Some(rtc) = self.rtc.as_mut() {
            rtc.write_latch(value);
        }
    }

    pub fn read_ram(&mut self, addr: u16) -> u8 {
        if !(0xA000..=0xBFFF).contains(&addr) {
            return 0xFF;
        }
        let offset = addr as usize - 0xA000;

        if self.ram_bank & CAMERA_REGISTER_BANK != 0 {
            if let Some(camera) = self.camera.as_ref() {
                return camera.read_register(offset);
            }
        }
        if !self.ram_enabled {
            return 0xFF;
        }
        if (0x08..=0x0C).contains(&self.ram_bank) {
            if let Some(rtc) = self.rtc.as_ref() {
                return rtc.read(self.ram_bank);
            }
        }
        match self.info.kind {
            MapperKind::Mbc2 => {
                let nibble = self.ram.first().map(|b| b[offset & 0x01FF]).unwrap_or(0x0F);
                0xF0 | (nibble & 0x0F)
            }
            _ => self
                .selected_ram_bank()
                .map(|bank| self.ram[bank][offset])
                .unwrap_or(0xFF),
        }
    }

    pub fn write_ram(&mut self, addr: u16, val: u8) {
        if !(0xA000..=0xBFFF).contains(&addr) {
            return;
        }
        let offset = addr as usize - 0xA000;

        if self.ram_bank & CAMERA_REGISTER_BANK != 0 {
            if let (Some(camera), Some(bank0)) = (self.camera.as_mut(), self.ram.first_mut()) {
                camera.write_register(offset, val, bank0);
                return;
            }
        }
        if !self.ram_enabled {
            return;
        }
        if (0x08..=0x0C).contains(&self.ram_bank) {
            if let Some(rtc) = self.rtc.as_mut() {
                rtc.write(self.ram_bank, val);
                return;
            }
        }
        match self.info.kind {
            MapperKind::Mbc2 => {
                if let Some(bank) = self.ram.first_mut() {
                    bank[offset & 0x01FF] = val & 0x0F;
                }
            }
            _ => {
                if let Some(bank) = self.selected_ram_bank() {
                    self.ram[bank][offset] = val;
                }
            }
        }
    }

    fn selected_ram_bank(&self) -> Option<usize> {
        if self.ram.is_empty() {
            return None;
        }
        let bank = match self.info.kind {
            MapperKind::Camera => self.ram_bank & 0x0F,
            _ => self.ram_bank,
        };
        Some(bank as usize % self.ram.len())
    }

    /// Advances a running RTC by CPU cycles.
    pub fn step_rtc(&mut self, cpu_cycles: u32) {
        if let Some(rtc) = self.rtc.as_mut() {
            rtc.step(cpu_cycles as u64);
        }
    }

    /// Ages the camera's capture countdown. Returns the cycles left until
    /// the sensor is ready (0 when there is no camera).
    pub fn step_camera(&mut self, cycles: u32) -> u32 {
        self.camera.as_mut().map_or(0, |c| c.step(cycles))
    }

    /// Writes battery RAM and RTC state to disk.
    pub fn save_ram(&mut self) -> io::Result<persist::SaveReport> {
        persist::save(self, &SystemClock)
    }
}

fn load_boot_rom(dir: &Path, mode: HardwareMode, report: &mut Diagnostics) -> Option<Vec<u8>> {
    let path = dir.join(mode.boot_rom_name());
    match fs::read(&path) {
        Ok(bytes) => {
            report.info(
                TARGET,
                format_args!("boot ROM {} ({} bytes)", path.display(), bytes.len()),
            );
            Some(bytes)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            report.warn(
                TARGET,
                format_args!("failed to read boot ROM {}: {e}", path.display()),
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::NINTENDO_LOGO;

    fn rom(cart_type: u8, rom_code: u8, ram_code: u8) -> Vec<u8> {
        let banks = mapper::rom_bank_count(rom_code).unwrap_or(2);
        let mut rom = vec![0u8; banks * ROM_BANK_SIZE];
        rom[0x0104..0x0134].copy_from_slice(&NINTENDO_LOGO);
        rom[0x0134..0x0138].copy_from_slice(b"TEST");
        rom[0x0147] = cart_type;
        rom[0x0148] = rom_code;
        rom[0x0149] = ram_code;
        rom[0x014D] = crate::header::header_checksum(&rom);
        let global = crate::header::global_checksum(&rom).to_be_bytes();
        rom[0x014E..0x0150].copy_from_slice(&global);
        rom
    }

    fn settings() -> Settings {
        Settings {
            ram_seed: Some(7),
            ..Settings::default()
        }
    }

    #[test]
    fn clean_rom_reports_no_warnings() {
        let outcome = Cartridge::load(rom(0x03, 0x01, 0x03), "clean", &settings()).unwrap();
        assert!(!outcome.report.needs_attention(), "{}", outcome.report);
        let cart = outcome.cartridge;
        assert_eq!(cart.kind(), MapperKind::Mbc1);
        assert_eq!(cart.rom_bank_count(), 4);
        assert_eq!(cart.ram_bank_count(), 4);
        assert_eq!(cart.title(), "TEST");
    }

    #[test]
    fn rom_bank_views_slice_the_image() {
        let mut data = rom(0x00, 0x00, 0x00);
        data[ROM_BANK_SIZE] = 0x42;
        let cart = Cartridge::load(data, "views", &settings()).unwrap().cartridge;
        assert_eq!(cart.rom_bank(1).map(|b| b[0]), Some(0x42));
        assert_eq!(cart.rom_bank(1).map(<[u8]>::len), Some(ROM_BANK_SIZE));
        assert!(cart.rom_bank(2).is_none());
    }

    #[test]
    fn ram_fill_is_seeded() {
        let a = Cartridge::load(rom(0x03, 0x00, 0x02), "a", &settings()).unwrap().cartridge;
        let b = Cartridge::load(rom(0x03, 0x00, 0x02), "b", &settings()).unwrap().cartridge;
        assert_eq!(a.ram_bank(0), b.ram_bank(0));
        assert!(a.ram_bank(0).unwrap().iter().any(|&x| x != 0));
    }

    #[test]
    fn mbc2_window_is_nibble_wide_and_mirrored() {
        let mut cart = Cartridge::load(rom(0x06, 0x00, 0x00), "mbc2", &settings())
            .unwrap()
            .cartridge;
        assert_eq!(cart.ram_capacity(), MBC2_RAM_SIZE);
        cart.set_ram_enabled(true);
        cart.write_ram(0xA005, 0xAB);
        assert_eq!(cart.read_ram(0xA005), 0xFB);
        assert_eq!(cart.read_ram(0xA205), 0xFB);
    }

    #[test]
    fn disabled_ram_reads_open_bus() {
        let mut cart = Cartridge::load(rom(0x03, 0x00, 0x02), "off", &settings())
            .unwrap()
            .cartridge;
        cart.write_ram(0xA000, 0x12);
        assert_eq!(cart.read_ram(0xA000), 0xFF);
        cart.set_ram_enabled(true);
        cart.write_ram(0xA000, 0x12);
        assert_eq!(cart.read_ram(0xA000), 0x12);
    }

    #[test]
    fn mbc3_rtc_registers_through_ram_window() {
        let mut cart = Cartridge::load(rom(0x10, 0x00, 0x03), "rtc", &settings())
            .unwrap()
            .cartridge;
        cart.set_ram_enabled(true);
        cart.select_ram_bank(0x09);
        cart.write_ram(0xA000, 42);
        cart.latch_rtc(0);
        cart.latch_rtc(1);
        assert_eq!(cart.read_ram(0xA000), 42);
        cart.select_ram_bank(0x00);
        cart.write_ram(0xA000, 7);
        assert_eq!(cart.read_ram(0xA000), 7);
    }
}
