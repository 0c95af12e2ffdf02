//! Game Boy cartridge-side hardware.
//!
//! This crate contains the platform-agnostic cartridge logic: header parsing
//! and mapper detection, battery/RTC persistence, the pocket camera sensor and
//! the printer on the serial link. The CPU, PPU and address decoder live
//! elsewhere and drive these components through the RAM window, the serial
//! registers and explicit clock steps.

/// Pocket camera sensor, capture sources and image pipeline.
pub mod camera;

/// ROM loading, mapper resolution and the cartridge RAM window.
pub mod cartridge;

/// Diagnostic sink and per-operation reports.
pub mod diagnostics;

/// Hardware modes and mode selection.
pub mod hardware;

/// Cartridge header view and checksums.
pub mod header;

/// Mapper identities and size codes.
pub mod mapper;

/// `.sav` / `.rtc` persistence.
pub mod persist;

/// Game Boy Printer protocol and page export.
pub mod printer;

/// Small deterministic PRNG for uninitialised RAM and sensor noise.
pub mod prng;

/// MBC3 real-time clock.
pub mod rtc;

/// Serial unit and link cable plumbing.
pub mod serial;

/// Host settings consumed by the loader and peripherals.
pub mod settings;

pub use cartridge::{Cartridge, LoadError, LoadOutcome};
pub use settings::Settings;
