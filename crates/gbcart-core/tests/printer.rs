mod common;

use std::fs;

use common::read_grey_png;
use gbcart_core::printer::{
    CMD_DATA, CMD_PRINT, PRINT_HEIGHT, PRINT_WIDTH, PrintImage, Printer, encode_packet,
};
use tempfile::tempdir;

fn feed(printer: &mut Printer, bytes: &[u8]) {
    for &b in bytes {
        printer.exchange(b);
    }
}

#[test]
fn export_skips_existing_files() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("print_0000.png"), b"taken").unwrap();
    fs::write(dir.path().join("print_0001.png"), b"taken").unwrap();

    let mut printer = Printer::new(dir.path().to_path_buf());
    feed(&mut printer, &encode_packet(CMD_DATA, false, &[0xFF; 16]));
    feed(&mut printer, &encode_packet(CMD_PRINT, false, &[1, 0, 0, 0x40]));
    feed(&mut printer, &encode_packet(CMD_PRINT, false, &[1, 0, 0, 0x40]));

    let names: Vec<_> = printer
        .exported()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["print_0002.png", "print_0003.png"]);
    assert_eq!(fs::read(dir.path().join("print_0000.png")).unwrap(), b"taken");
}

#[test]
fn export_creates_missing_directory() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("nested").join("prints");
    let image = PrintImage::compose(&[], 0xE4);
    let (path, index) = image.export(&target, 7).unwrap();
    assert_eq!(index, 7);
    assert_eq!(path, target.join("print_0007.png"));

    let (width, height, pixels) = read_grey_png(&path);
    assert_eq!(width as usize, PRINT_WIDTH);
    assert_eq!(height as usize, PRINT_HEIGHT);
    assert!(pixels.iter().all(|&p| p == 0xFF));
}

#[test]
fn export_failure_is_not_fatal() {
    let dir = tempdir().unwrap();
    // A file where the print directory should be.
    let blocked = dir.path().join("blocked");
    fs::write(&blocked, b"").unwrap();

    let mut printer = Printer::new(blocked);
    feed(&mut printer, &encode_packet(CMD_DATA, false, &[0xFF; 16]));
    feed(&mut printer, &encode_packet(CMD_PRINT, false, &[1, 0, 0, 0x40]));
    assert!(printer.exported().is_empty());
    assert!(printer.last_print().is_some());
    assert_eq!(printer.retained().len(), 1);
}

#[test]
fn print_palette_defaults_when_zero() {
    let dir = tempdir().unwrap();
    let mut printer = Printer::new(dir.path().to_path_buf());
    // Shade 2 across the first tile row.
    feed(&mut printer, &encode_packet(CMD_DATA, false, &[0x00, 0xFF]));

    feed(&mut printer, &encode_packet(CMD_PRINT, false, &[1, 0, 0x00, 0x40]));
    assert_eq!(printer.last_print().unwrap().get(0, 0), 0x55);

    // 0x93 = 10 01 00 11: shade 2 maps to colour 1.
    feed(&mut printer, &encode_packet(CMD_PRINT, false, &[1, 0, 0x93, 0x40]));
    assert_eq!(printer.last_print().unwrap().get(0, 0), 0xAA);
}
