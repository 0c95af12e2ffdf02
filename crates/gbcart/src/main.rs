mod config;

use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use gbcart_core::{
    Cartridge,
    camera::{PngSource, SENSOR_HEIGHT, SENSOR_WIDTH},
    cartridge::CAMERA_REGISTER_BANK,
    mapper::MapperKind,
    printer::Printer,
    serial::{BIT_CYCLES, SerialLink},
    settings::Settings,
};
use log::info;

use crate::config::{Config, EmulationMode, LinkDevice};

const CAMERA_GREYS: [u8; 4] = [0xFF, 0xAA, 0x55, 0x00];

#[derive(Parser)]
#[command(name = "gbcart", version, about = "Game Boy cartridge hardware tools")]
struct Args {
    /// Config file (defaults to $XDG_CONFIG_HOME/gbcart/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Force DMG mode
    #[arg(long, global = true, conflicts_with_all = ["cgb", "sgb"])]
    dmg: bool,

    /// Force CGB mode
    #[arg(long, global = true, conflicts_with_all = ["dmg", "sgb"])]
    cgb: bool,

    /// Force SGB mode
    #[arg(long, global = true, conflicts_with_all = ["dmg", "cgb"])]
    sgb: bool,

    /// Directory holding dmg_boot.bin / cgb_boot.bin / sgb_boot.bin
    #[arg(long, global = true)]
    boot_rom_dir: Option<PathBuf>,

    /// Directory for .sav and .rtc files
    #[arg(long, global = true)]
    save_dir: Option<PathBuf>,

    /// Directory printed pages are written to
    #[arg(long, global = true)]
    print_dir: Option<PathBuf>,

    /// Seed for the uninitialised RAM fill
    #[arg(long, global = true)]
    seed: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show header fields and load diagnostics
    Info {
        /// Path to ROM file
        rom: PathBuf,
    },
    /// Take a picture with a camera cartridge and write it as PNG
    Capture {
        /// Path to a camera ROM
        rom: PathBuf,
        /// Still image to photograph; static when omitted
        #[arg(long)]
        image: Option<PathBuf>,
        /// Exposure time in sensor steps
        #[arg(long, default_value_t = 0x0800)]
        exposure: u16,
        /// Contrast register value (0x80 = flat, 0x92 = maximum)
        #[arg(long, default_value_t = 0x89)]
        contrast: u8,
        /// Use ordered dithering
        #[arg(long)]
        dither: bool,
        /// Output PNG
        #[arg(short, long, default_value = "capture.png")]
        output: PathBuf,
    },
    /// Replay bytes captured from a link cable into a printer
    Print {
        /// Capture file: raw bytes, or whitespace separated hex with --hex
        capture: PathBuf,
        #[arg(long)]
        hex: bool,
    },
    /// Clock a capture through the serial port into the configured link
    /// device and show what it answered
    Link {
        /// Capture file: raw bytes, or whitespace separated hex with --hex
        capture: PathBuf,
        #[arg(long)]
        hex: bool,
        /// Device on the other end of the cable
        #[arg(long, value_enum)]
        device: Option<LinkDevice>,
    },
    /// Write the effective configuration to the config file
    InitConfig,
}

impl Args {
    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(config::default_config_path)
    }

    /// Command-line flags win over the config file.
    fn apply_overrides(&self, cfg: &mut Config) {
        if self.dmg {
            cfg.emulation_mode = EmulationMode::ForceDmg;
        } else if self.cgb {
            cfg.emulation_mode = EmulationMode::ForceCgb;
        } else if self.sgb {
            cfg.emulation_mode = EmulationMode::ForceSgb;
        }
        if let Some(dir) = &self.boot_rom_dir {
            cfg.boot_rom_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.save_dir {
            cfg.save_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.print_dir {
            cfg.print_dir = Some(dir.clone());
        }
        if let Some(seed) = self.seed {
            cfg.ram_seed = Some(seed);
        }
        if let Command::Capture {
            image: Some(image), ..
        } = &self.command
        {
            cfg.camera_image = Some(image.clone());
        }
        if let Command::Link {
            device: Some(device),
            ..
        } = &self.command
        {
            cfg.link_device = *device;
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let path = args.config_path();
    let mut cfg = config::load_from_file(&path);
    args.apply_overrides(&mut cfg);

    let result = match &args.command {
        Command::Info { rom } => info_command(rom, &cfg),
        Command::Capture {
            rom,
            exposure,
            contrast,
            dither,
            output,
            ..
        } => capture_command(rom, &cfg, *exposure, *contrast, *dither, output),
        Command::Print { capture, hex } => print_command(capture, *hex, &cfg),
        Command::Link { capture, hex, .. } => link_command(capture, *hex, &cfg),
        Command::InitConfig => config::save_to_file(&path, &cfg)
            .map(|()| println!("Wrote {}", path.display()))
            .map_err(|e| format!("Failed to write {}: {e}", path.display())),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn info_command(rom: &Path, cfg: &Config) -> Result<(), String> {
    let outcome = Cartridge::from_file(rom, &cfg.settings())
        .map_err(|e| format!("Failed to load ROM: {e}"))?;
    let cart = &outcome.cartridge;

    println!("Title:       {}", cart.title());
    println!("Mapper:      {} ({:#04x})", cart.info(), cart.cartridge_type());
    println!("ROM banks:   {}", cart.rom_bank_count());
    println!("RAM banks:   {}", cart.ram_bank_count());
    println!("Mode:        {:?}", cart.mode());
    if let Some(header) = cart.header() {
        if let Some(code) = header.manufacturer_code() {
            println!("Maker code:  {code}");
        }
        println!("Version:     {}", header.version());
        println!(
            "Checksums:   header {:#04x}, global {:#06x}",
            header.header_checksum(),
            header.global_checksum()
        );
    }
    if cart.has_battery() {
        println!("Save file:   {}", cart.save_path().display());
    }
    if outcome.report.needs_attention() {
        println!();
        println!("Attention:");
        for entry in outcome.report.warnings() {
            println!("  {entry}");
        }
    }
    Ok(())
}

fn capture_command(
    rom: &Path,
    cfg: &Config,
    exposure: u16,
    contrast: u8,
    dither: bool,
    output: &Path,
) -> Result<(), String> {
    let mut cart = Cartridge::from_file(rom, &cfg.settings())
        .map_err(|e| format!("Failed to load ROM: {e}"))?
        .cartridge;
    if cart.kind() != MapperKind::Camera {
        return Err(format!("{} is not a camera cartridge", rom.display()));
    }
    if let (Some(camera), Some(image)) = (cart.camera_mut(), &cfg.camera_image) {
        camera.set_source(Box::new(PngSource::new(image)));
    }

    // Program the sensor the way the camera ROM does.
    cart.select_ram_bank(CAMERA_REGISTER_BANK);
    let [hi, lo] = exposure.to_be_bytes();
    cart.write_ram(0xA002, hi);
    cart.write_ram(0xA003, lo);
    for (i, addr) in (0xA006u16..0xA036).step_by(3).enumerate() {
        cart.write_ram(addr, contrast);
        let spread = if dither { (i as u8) * 4 } else { 0 };
        cart.write_ram(addr + 1, contrast.wrapping_add(0x10).wrapping_add(spread));
        cart.write_ram(addr + 2, contrast.wrapping_add(0x20));
    }
    cart.write_ram(0xA000, 0x01);

    let mut cycles = 0u64;
    while cart.step_camera(4096) > 0 {
        cycles += 4096;
    }
    info!("sensor busy for ~{cycles} cycles");

    let shades = match cart.camera() {
        Some(camera) => camera.processed().clone(),
        None => return Err("camera vanished".to_string()),
    };
    let greys: Vec<u8> = shades
        .samples()
        .iter()
        .map(|&s| CAMERA_GREYS[(s & 3) as usize])
        .collect();
    write_grey_png(output, SENSOR_WIDTH as u32, SENSOR_HEIGHT as u32, &greys)
        .map_err(|e| format!("Failed to write {}: {e}", output.display()))?;
    println!("Wrote {}", output.display());

    match cart.save_ram() {
        Ok(report) if report.sram_bytes > 0 => {
            println!("Saved {} bytes to {}", report.sram_bytes, cart.save_path().display());
        }
        Ok(_) => {}
        Err(e) => eprintln!("Failed to save RAM: {e}"),
    }
    Ok(())
}

fn print_command(capture: &Path, hex: bool, cfg: &Config) -> Result<(), String> {
    let bytes = read_capture(capture, hex)?;
    let mut printer = Printer::new(cfg.settings().print_dir());
    for byte in bytes {
        printer.exchange(byte);
    }

    if printer.checksum_errors > 0 {
        eprintln!("{} packet(s) had bad checksums", printer.checksum_errors);
    }
    if printer.dropped_packets > 0 {
        eprintln!("{} data packet(s) dropped", printer.dropped_packets);
    }
    if printer.exported().is_empty() {
        println!("Nothing printed");
    }
    for path in printer.exported() {
        println!("Printed {}", path.display());
    }
    Ok(())
}

fn link_command(capture: &Path, hex: bool, cfg: &Config) -> Result<(), String> {
    let bytes = read_capture(capture, hex)?;
    let settings = cfg.settings();
    info!("replaying {} bytes into {}", bytes.len(), settings.link_device);

    let replies = replay_link(&bytes, &settings);
    for line in replies.chunks(16) {
        let text: Vec<String> = line.iter().map(|b| format!("{b:02X}")).collect();
        println!("{}", text.join(" "));
    }
    Ok(())
}

/// Sends each byte as an internal-clock transfer and collects what was
/// shifted back into SB.
fn replay_link(bytes: &[u8], settings: &Settings) -> Vec<u8> {
    let mut serial = SerialLink::new(false);
    serial.connect(settings.create_link_device());
    let mut if_reg = 0u8;
    bytes
        .iter()
        .map(|&byte| {
            serial.write(0xFF01, byte);
            serial.write(0xFF02, 0x81);
            serial.step(8 * BIT_CYCLES, &mut if_reg);
            serial.read(0xFF01)
        })
        .collect()
}

fn read_capture(capture: &Path, hex: bool) -> Result<Vec<u8>, String> {
    let read_err = |e: std::io::Error| format!("Failed to read {}: {e}", capture.display());
    if hex {
        let text = std::fs::read_to_string(capture).map_err(read_err)?;
        parse_hex(&text)
    } else {
        std::fs::read(capture).map_err(read_err)
    }
}

fn parse_hex(text: &str) -> Result<Vec<u8>, String> {
    text.split_whitespace()
        .map(|tok| {
            let tok = tok.trim_start_matches("0x").trim_start_matches("0X");
            u8::from_str_radix(tok, 16).map_err(|e| format!("bad byte {tok:?}: {e}"))
        })
        .collect()
}

fn write_grey_png(path: &Path, width: u32, height: u32, pixels: &[u8]) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Grayscale);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().map_err(std::io::Error::other)?;
    writer
        .write_image_data(pixels)
        .map_err(std::io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_values() {
        let args = Args::parse_from([
            "gbcart",
            "--cgb",
            "--save-dir",
            "/saves",
            "--seed",
            "9",
            "info",
            "game.gb",
        ]);
        let mut cfg = Config {
            save_dir: Some(PathBuf::from("/from-file")),
            print_dir: Some(PathBuf::from("/prints")),
            emulation_mode: EmulationMode::ForceDmg,
            ..Config::default()
        };
        args.apply_overrides(&mut cfg);
        assert_eq!(cfg.emulation_mode, EmulationMode::ForceCgb);
        assert_eq!(cfg.save_dir, Some(PathBuf::from("/saves")));
        assert_eq!(cfg.print_dir, Some(PathBuf::from("/prints")));
        assert_eq!(cfg.ram_seed, Some(9));
    }

    #[test]
    fn conflicting_modes_are_rejected() {
        assert!(Args::try_parse_from(["gbcart", "--dmg", "--sgb", "info", "x.gb"]).is_err());
    }

    #[test]
    fn link_device_flag_overrides_config() {
        let args = Args::parse_from(["gbcart", "link", "--device", "printer", "log.txt"]);
        let mut cfg = Config::default();
        args.apply_overrides(&mut cfg);
        assert_eq!(cfg.link_device, LinkDevice::Printer);

        let args = Args::parse_from(["gbcart", "link", "log.txt"]);
        let mut cfg = Config {
            link_device: LinkDevice::Printer,
            ..Config::default()
        };
        args.apply_overrides(&mut cfg);
        assert_eq!(cfg.link_device, LinkDevice::Printer);
    }

    #[test]
    fn replay_reaches_the_configured_device() {
        use gbcart_core::printer::{CMD_DATA, CMD_PRINT, CMD_STATUS, STATUS_OK, encode_packet};

        let dir = tempfile::tempdir().unwrap();
        let status = encode_packet(CMD_STATUS, false, &[]);

        let unplugged = Config::default().settings();
        assert!(replay_link(&status, &unplugged).iter().all(|&b| b == 0xFF));

        let cfg = Config {
            link_device: LinkDevice::Printer,
            print_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        let replies = replay_link(&status, &cfg.settings());
        assert_eq!(&replies[8..], &[STATUS_OK, STATUS_OK]);

        let mut page = encode_packet(CMD_DATA, false, &[0xFF; 16]);
        page.extend(encode_packet(CMD_PRINT, false, &[1, 0, 0xE4, 0x40]));
        replay_link(&page, &cfg.settings());
        assert!(dir.path().join("print_0000.png").exists());
    }

    #[test]
    fn hex_capture_parsing() {
        assert_eq!(parse_hex("88 33 0x0F\n00"), Ok(vec![0x88, 0x33, 0x0F, 0x00]));
        assert!(parse_hex("88 zz").is_err());
    }

    #[test]
    fn print_command_writes_pages() {
        use gbcart_core::printer::{CMD_DATA, CMD_PRINT, encode_packet};

        let dir = tempfile::tempdir().unwrap();
        let mut bytes = encode_packet(CMD_DATA, false, &[0xFF; 32]);
        bytes.extend(encode_packet(CMD_PRINT, false, &[1, 0, 0xE4, 0x40]));
        let capture = dir.path().join("capture.bin");
        std::fs::write(&capture, bytes).unwrap();

        let cfg = Config {
            print_dir: Some(dir.path().join("out")),
            ..Config::default()
        };
        print_command(&capture, false, &cfg).unwrap();
        assert!(dir.path().join("out").join("print_0000.png").exists());
    }
}
