//! Battery RAM (`.sav`) and clock (`.rtc`) persistence.

use std::{fs, io, path::Path};

use crate::{
    cartridge::Cartridge,
    diagnostics::Diagnostics,
    mapper::RAM_BANK_SIZE,
    rtc::{self, RTC_FILE_LEN, WallClock},
};

const TARGET: &str = "persist";

/// What happened during one save or load.
#[derive(Debug, Default)]
pub struct SaveReport {
    pub diagnostics: Diagnostics,
    /// Battery RAM bytes written or restored.
    pub sram_bytes: usize,
    /// Whether a clock record was written or restored.
    pub rtc: bool,
}

/// Writes battery RAM and clock state next to the cartridge's save base name.
///
/// Both files are attempted even if the first write fails; the first I/O
/// error is returned once both have been tried.
pub fn save(cart: &mut Cartridge, clock: &dyn WallClock) -> io::Result<SaveReport> {
    let mut report = SaveReport::default();
    let mut first_error = None;

    if cart.has_battery() && cart.ram_capacity() > 0 {
        let path = cart.save_path();
        let data = sram_image(cart);
        match write_file(&path, &data, &mut report.diagnostics) {
            Ok(()) => {
                report.sram_bytes = data.len();
                report.diagnostics.info(
                    TARGET,
                    format_args!("wrote {} bytes to {}", data.len(), path.display()),
                );
            }
            Err(e) => first_error = Some(e),
        }
    }

    if cart.has_rtc() {
        let path = cart.rtc_path();
        let now = clock.now();
        if let Some(rtc) = cart.rtc_mut() {
            let record = rtc::encode(&rtc.registers(), now);
            match write_file(&path, &record, &mut report.diagnostics) {
                Ok(()) => {
                    rtc.mark_persisted(now);
                    report.rtc = true;
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(report),
    }
}

/// Restores battery RAM and clock state. Missing files mean "no prior
/// state"; short or unreadable files are reported and skipped.
pub fn load(cart: &mut Cartridge, clock: &dyn WallClock) -> SaveReport {
    let mut report = SaveReport::default();

    if cart.has_battery() && cart.ram_capacity() > 0 {
        let path = cart.save_path();
        match fs::read(&path) {
            Ok(bytes) => {
                let expected = cart.ram_capacity();
                if bytes.len() < expected {
                    report.diagnostics.warn(
                        TARGET,
                        format_args!(
                            "short save file {}: read {} of {expected} bytes",
                            path.display(),
                            bytes.len()
                        ),
                    );
                }
                report.sram_bytes = restore_sram(cart, &bytes);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                report
                    .diagnostics
                    .info(TARGET, format_args!("no save file at {}", path.display()));
            }
            Err(e) => report
                .diagnostics
                .warn(TARGET, format_args!("failed to read {}: {e}", path.display())),
        }
    }

    if cart.has_rtc() {
        let path = cart.rtc_path();
        match fs::read(&path) {
            Ok(bytes) => match rtc::decode(&bytes) {
                Some((regs, stored)) => {
                    if let Some(rtc) = cart.rtc_mut() {
                        rtc.restore(regs, stored, clock.now());
                        report.rtc = true;
                    }
                }
                None => report.diagnostics.warn(
                    TARGET,
                    format_args!(
                        "short clock file {}: read {} of {RTC_FILE_LEN} bytes",
                        path.display(),
                        bytes.len()
                    ),
                ),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                report
                    .diagnostics
                    .info(TARGET, format_args!("no clock file at {}", path.display()));
            }
            Err(e) => report
                .diagnostics
                .warn(TARGET, format_args!("failed to read {}: {e}", path.display())),
        }
    }

    report
}

/// Battery RAM contents in file order: banks back-to-back, trimmed to the
/// chip's real capacity.
pub fn sram_image(cart: &Cartridge) -> Vec<u8> {
    let capacity = cart.ram_capacity();
    let mut out = Vec::with_capacity(capacity);
    for bank in 0..cart.ram_bank_count() {
        if let Some(data) = cart.ram_bank(bank) {
            out.extend_from_slice(data);
        }
    }
    out.truncate(capacity);
    out
}

fn restore_sram(cart: &mut Cartridge, bytes: &[u8]) -> usize {
    let capacity = cart.ram_capacity();
    let bytes = &bytes[..bytes.len().min(capacity)];
    for (bank, chunk) in bytes.chunks(RAM_BANK_SIZE).enumerate() {
        if let Some(dst) = cart.ram_bank_mut(bank) {
            dst[..chunk.len()].copy_from_slice(chunk);
        }
    }
    bytes.len()
}

fn write_file(path: &Path, data: &[u8], diagnostics: &mut Diagnostics) -> io::Result<()> {
    fs::write(path, data).inspect_err(|e| {
        diagnostics.warn(TARGET, format_args!("failed to write {}: {e}", path.display()));
    })
}
