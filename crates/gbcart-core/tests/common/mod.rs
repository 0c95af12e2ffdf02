#![allow(dead_code)]

use gbcart_core::{
    Settings,
    header::{NINTENDO_LOGO, global_checksum, header_checksum},
    mapper,
};

/// A ROM with a valid logo and both checksums fixed up.
pub fn build_rom(cart_type: u8, rom_code: u8, ram_code: u8) -> Vec<u8> {
    let banks = mapper::rom_bank_count(rom_code).unwrap_or(2);
    let mut rom = vec![0u8; banks * mapper::ROM_BANK_SIZE];
    rom[0x0104..0x0134].copy_from_slice(&NINTENDO_LOGO);
    rom[0x0134..0x013F].copy_from_slice(b"GBCARTTEST\0");
    rom[0x0147] = cart_type;
    rom[0x0148] = rom_code;
    rom[0x0149] = ram_code;
    fix_checksums(&mut rom);
    rom
}

pub fn fix_checksums(rom: &mut [u8]) {
    rom[0x014D] = header_checksum(rom);
    let global = global_checksum(rom).to_be_bytes();
    rom[0x014E..0x0150].copy_from_slice(&global);
}

pub fn settings() -> Settings {
    Settings {
        ram_seed: Some(0x1234_5678),
        ..Settings::default()
    }
}

pub fn settings_in(dir: &std::path::Path) -> Settings {
    Settings {
        save_dir: Some(dir.to_path_buf()),
        print_dir: Some(dir.join("prints")),
        ..settings()
    }
}

/// Decodes an 8-bit greyscale PNG into (width, height, pixels).
pub fn read_grey_png(path: &std::path::Path) -> (u32, u32, Vec<u8>) {
    let file = std::fs::File::open(path).expect("failed to open png");
    let decoder = png::Decoder::new(std::io::BufReader::new(file));
    let mut reader = decoder.read_info().expect("failed to read png info");
    let size = reader
        .output_buffer_size()
        .expect("failed to get png output buffer size");
    let mut buf = vec![0; size];
    let info = reader.next_frame(&mut buf).expect("failed to decode png frame");
    assert_eq!(info.color_type, png::ColorType::Grayscale);
    buf.truncate(info.buffer_size());
    (info.width, info.height, buf)
}
