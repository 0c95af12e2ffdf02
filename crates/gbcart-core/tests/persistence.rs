mod common;

use std::fs;

use common::{build_rom, settings_in};
use gbcart_core::{
    Cartridge,
    mapper::{MBC2_RAM_SIZE, RAM_BANK_SIZE},
    persist,
    rtc::{self, FixedClock, RTC_FILE_LEN, RtcRegisters},
};
use tempfile::tempdir;

const T0: u64 = 1_700_000_000;

fn load(rom: Vec<u8>, dir: &std::path::Path) -> Cartridge {
    Cartridge::load(rom, "game", &settings_in(dir)).unwrap().cartridge
}

#[test]
fn sram_round_trip_is_byte_identical() {
    let dir = tempdir().unwrap();
    let mut cart = load(build_rom(0x1B, 0x00, 0x03), dir.path());
    for bank in 0..4 {
        let data = cart.ram_bank_mut(bank).unwrap();
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(7).wrapping_add(bank as u8);
        }
    }
    let before = persist::sram_image(&cart);

    let report = persist::save(&mut cart, &FixedClock(T0)).unwrap();
    assert_eq!(report.sram_bytes, 4 * RAM_BANK_SIZE);
    assert_eq!(fs::read(dir.path().join("game.sav")).unwrap(), before);

    let mut fresh = load(build_rom(0x1B, 0x00, 0x03), dir.path());
    assert_ne!(persist::sram_image(&fresh), before);
    let report = persist::load(&mut fresh, &FixedClock(T0));
    assert_eq!(report.sram_bytes, 4 * RAM_BANK_SIZE);
    assert!(!report.diagnostics.needs_attention());
    assert_eq!(persist::sram_image(&fresh), before);
}

#[test]
fn mbc2_saves_exactly_512_bytes() {
    let dir = tempdir().unwrap();
    let mut cart = load(build_rom(0x06, 0x00, 0x00), dir.path());
    cart.set_ram_enabled(true);
    for i in 0..MBC2_RAM_SIZE as u16 {
        cart.write_ram(0xA000 + i, i as u8);
    }
    persist::save(&mut cart, &FixedClock(T0)).unwrap();
    let data = fs::read(dir.path().join("game.sav")).unwrap();
    assert_eq!(data.len(), MBC2_RAM_SIZE);
    assert_eq!(data[0x1FF], 0x0F);

    let mut fresh = load(build_rom(0x06, 0x00, 0x00), dir.path());
    persist::load(&mut fresh, &FixedClock(T0));
    fresh.set_ram_enabled(true);
    assert_eq!(fresh.read_ram(0xA1FF), 0xFF);
    assert_eq!(fresh.read_ram(0xA011), 0xF1);
}

#[test]
fn short_save_file_is_reported_and_partially_applied() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("game.sav"), vec![0x77u8; 100]).unwrap();

    let mut cart = load(build_rom(0x03, 0x00, 0x03), dir.path());
    let report = persist::load(&mut cart, &FixedClock(T0));
    assert_eq!(report.sram_bytes, 100);
    assert!(report.diagnostics.contains("read 100 of 32768 bytes"));
    assert_eq!(cart.ram_bank(0).unwrap()[99], 0x77);
}

#[test]
fn missing_files_mean_no_prior_state() {
    let dir = tempdir().unwrap();
    let mut cart = load(build_rom(0x10, 0x00, 0x03), dir.path());
    let before = persist::sram_image(&cart);
    let report = persist::load(&mut cart, &FixedClock(T0));
    assert!(!report.diagnostics.needs_attention());
    assert!(report.diagnostics.contains("no save file"));
    assert!(report.diagnostics.contains("no clock file"));
    assert_eq!(persist::sram_image(&cart), before);
    assert!(!report.rtc);
}

#[test]
fn without_battery_nothing_is_written() {
    let dir = tempdir().unwrap();
    let mut cart = load(build_rom(0x02, 0x00, 0x02), dir.path());
    let report = persist::save(&mut cart, &FixedClock(T0)).unwrap();
    assert_eq!(report.sram_bytes, 0);
    assert!(!dir.path().join("game.sav").exists());
    assert!(!dir.path().join("game.rtc").exists());
}

#[test]
fn rtc_file_layout() {
    let dir = tempdir().unwrap();
    let mut cart = load(build_rom(0x10, 0x00, 0x03), dir.path());
    cart.set_ram_enabled(true);
    for (reg, value) in [(0x08, 5), (0x09, 6), (0x0A, 7), (0x0B, 0x34), (0x0C, 0x81)] {
        cart.select_ram_bank(reg);
        cart.write_ram(0xA000, value);
    }
    persist::save(&mut cart, &FixedClock(T0)).unwrap();

    let data = fs::read(dir.path().join("game.rtc")).unwrap();
    assert_eq!(data.len(), RTC_FILE_LEN);
    assert_eq!(&data[..5], &[5, 6, 7, 0x34, 0x81]);
    assert_eq!(u64::from_le_bytes(data[5..13].try_into().unwrap()), T0);
}

#[test]
fn rtc_restore_applies_wall_clock_drift() {
    let dir = tempdir().unwrap();
    let regs = RtcRegisters {
        seconds: 50,
        minutes: 59,
        hours: 23,
        days: 10,
        ..Default::default()
    };
    fs::write(dir.path().join("game.rtc"), rtc::encode(&regs, T0)).unwrap();

    let mut cart = load(build_rom(0x0F, 0x00, 0x00), dir.path());
    let report = persist::load(&mut cart, &FixedClock(T0 + 15));
    assert!(report.rtc);
    let now = cart.rtc().unwrap().registers();
    assert_eq!((now.seconds, now.minutes, now.hours, now.days), (5, 0, 0, 11));
    assert_eq!(now, rtc::reconcile(regs, T0, T0 + 15));
}

#[test]
fn halted_clock_does_not_drift() {
    let dir = tempdir().unwrap();
    let regs = RtcRegisters {
        seconds: 12,
        halt: true,
        ..Default::default()
    };
    fs::write(dir.path().join("game.rtc"), rtc::encode(&regs, T0)).unwrap();

    let mut cart = load(build_rom(0x10, 0x00, 0x03), dir.path());
    persist::load(&mut cart, &FixedClock(T0 + 86_400));
    assert_eq!(cart.rtc().unwrap().registers(), regs);
}

#[test]
fn day_overflow_sets_sticky_carry() {
    let dir = tempdir().unwrap();
    let regs = RtcRegisters {
        days: 511,
        hours: 23,
        ..Default::default()
    };
    fs::write(dir.path().join("game.rtc"), rtc::encode(&regs, T0)).unwrap();

    let mut cart = load(build_rom(0x10, 0x00, 0x03), dir.path());
    persist::load(&mut cart, &FixedClock(T0 + 3600));
    let now = cart.rtc().unwrap().registers();
    assert_eq!(now.days, 0);
    assert!(now.carry);

    cart.set_ram_enabled(true);
    cart.select_ram_bank(0x0C);
    assert_eq!(cart.read_ram(0xA000) & 0x80, 0x80);
}

#[test]
fn short_rtc_file_is_ignored() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("game.rtc"), [1u8, 2, 3, 4, 5, 6]).unwrap();

    let mut cart = load(build_rom(0x10, 0x00, 0x03), dir.path());
    let report = persist::load(&mut cart, &FixedClock(T0));
    assert!(!report.rtc);
    assert!(report.diagnostics.contains("read 6 of 13 bytes"));
    assert_eq!(cart.rtc().unwrap().registers(), RtcRegisters::default());
}

#[test]
fn rtc_save_then_load_round_trips() {
    let dir = tempdir().unwrap();
    let mut cart = load(build_rom(0x10, 0x00, 0x03), dir.path());
    cart.set_ram_enabled(true);
    cart.select_ram_bank(0x0A);
    cart.write_ram(0xA000, 9);
    persist::save(&mut cart, &FixedClock(T0)).unwrap();
    assert_eq!(cart.rtc().unwrap().last_sync(), T0);

    let mut fresh = load(build_rom(0x10, 0x00, 0x03), dir.path());
    persist::load(&mut fresh, &FixedClock(T0 + 61));
    let regs = fresh.rtc().unwrap().registers();
    assert_eq!((regs.seconds, regs.minutes, regs.hours), (1, 1, 9));
}

#[test]
fn failed_sram_write_still_saves_the_clock() {
    let dir = tempdir().unwrap();
    // A directory where the .sav file should go.
    fs::create_dir(dir.path().join("game.sav")).unwrap();

    let mut cart = load(build_rom(0x10, 0x00, 0x03), dir.path());
    assert!(persist::save(&mut cart, &FixedClock(T0)).is_err());

    let data = fs::read(dir.path().join("game.rtc")).unwrap();
    assert_eq!(data.len(), RTC_FILE_LEN);
    let (_, stored) = rtc::decode(&data).unwrap();
    assert_eq!(stored, T0);
    assert_eq!(cart.rtc().unwrap().last_sync(), T0);
}
