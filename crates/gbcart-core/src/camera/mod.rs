//! Pocket camera sensor (M64282FP) as seen through the cartridge.
//!
//! Registers are mapped into 0xA000 when bit 4 of the RAM bank register is
//! set. Writing the command register with bit 0 set runs a capture, writes
//! the result into RAM bank 0 at [`IMAGE_OFFSET`] and keeps bit 0 set until
//! the exposure countdown has been clocked down to zero.

pub mod pipeline;
pub mod source;

use std::fmt;

use crate::diagnostics::diag;

use self::pipeline::IMAGE_BYTES;
pub use self::source::{
    CaptureError, CaptureSource, NoiseSource, PngSource, SENSOR_HEIGHT, SENSOR_WIDTH, SensorFrame,
    UnavailableSource,
};

const TARGET: &str = "camera";

pub const REGISTER_COUNT: usize = 0x36;
/// Where the packed picture lands in RAM bank 0.
pub const IMAGE_OFFSET: usize = 0x0100;

/// Cycles charged per exposure step.
pub const CYCLES_PER_EXPOSURE_STEP: u32 = 64;
/// Cycles charged for reading the pixel array out of the sensor.
pub const TRANSFER_CYCLES: u32 = (SENSOR_WIDTH * SENSOR_HEIGHT) as u32 * 9;

const REG_COMMAND: usize = 0x00;
const REG_EXPOSURE_HI: usize = 0x02;
const REG_EXPOSURE_LO: usize = 0x03;
const REG_OFFSET: usize = 0x05;
const REG_CONTRAST: usize = 0x06;
const DITHER_MATRIX: std::ops::Range<usize> = 0x06..REGISTER_COUNT;

const CMD_BUSY: u8 = 0x01;

pub struct Camera {
    regs: [u8; REGISTER_COUNT],
    countdown: u32,
    sensor: SensorFrame,
    processed: SensorFrame,
    source: Box<dyn CaptureSource>,
    fallback: NoiseSource,
}

impl fmt::Debug for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Camera")
            .field("command", &self.regs[REG_COMMAND])
            .field("countdown", &self.countdown)
            .finish_non_exhaustive()
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    /// A camera that photographs static.
    pub fn new() -> Self {
        Self::with_source(Box::new(NoiseSource::from_time()))
    }

    pub fn with_source(source: Box<dyn CaptureSource>) -> Self {
        Self {
            regs: [0; REGISTER_COUNT],
            countdown: 0,
            sensor: SensorFrame::default(),
            processed: SensorFrame::default(),
            source,
            fallback: NoiseSource::from_time(),
        }
    }

    pub fn set_source(&mut self, source: Box<dyn CaptureSource>) {
        self.source = source;
    }

    /// Seeds the noise used when the capture source fails.
    pub fn set_fallback_seed(&mut self, seed: u32) {
        self.fallback = NoiseSource::new(seed);
    }

    pub fn reset(&mut self) {
        self.regs = [0; REGISTER_COUNT];
        self.countdown = 0;
    }

    pub fn is_busy(&self) -> bool {
        self.countdown > 0
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    pub fn registers(&self) -> &[u8; REGISTER_COUNT] {
        &self.regs
    }

    /// Raw samples from the last capture.
    pub fn sensor(&self) -> &SensorFrame {
        &self.sensor
    }

    /// 2-bit shades from the last capture, 0 = white.
    pub fn processed(&self) -> &SensorFrame {
        &self.processed
    }

    /// Only the command register is readable.
    pub fn read_register(&self, offset: usize) -> u8 {
        match offset {
            REG_COMMAND => self.regs[REG_COMMAND],
            _ => 0x00,
        }
    }

    pub fn write_register(&mut self, offset: usize, value: u8, ram: &mut [u8]) {
        if offset >= REGISTER_COUNT {
            diag!(Trace, TARGET, "ignored write {value:#04x} to register {offset:#06x}");
            return;
        }
        if offset != REG_COMMAND {
            self.regs[offset] = value;
            return;
        }

        self.regs[REG_COMMAND] = value & 0x07;
        if value & CMD_BUSY == 0 {
            self.countdown = 0;
            return;
        }

        let exposure = self.exposure();
        let offset = self.offset();
        let dither = self.dither_requested();
        let contrast = self.contrast_percent();
        self.capture_and_process(exposure, offset, dither, contrast, ram);
        self.countdown = exposure as u32 * CYCLES_PER_EXPOSURE_STEP + TRANSFER_CYCLES;
        diag!(
            Trace,
            TARGET,
            "capture: exposure {exposure:#06x}, offset {offset}, dither {dither}, contrast {contrast}%"
        );
    }

    pub fn exposure(&self) -> u16 {
        u16::from_be_bytes([self.regs[REG_EXPOSURE_HI], self.regs[REG_EXPOSURE_LO]])
    }

    /// Bits 0-4 are the magnitude; bit 5 set means positive.
    pub fn offset(&self) -> i16 {
        let reg = self.regs[REG_OFFSET];
        let magnitude = (reg & 0x1F) as i16;
        if reg & 0x20 != 0 { magnitude } else { -magnitude }
    }

    /// The threshold matrix is 16 triples; identical triples mean a flat
    /// threshold, anything else asks for ordered dithering.
    pub fn dither_requested(&self) -> bool {
        let matrix = &self.regs[DITHER_MATRIX];
        let first = &matrix[..3];
        matrix.chunks_exact(3).any(|triple| triple != first)
    }

    pub fn contrast_percent(&self) -> u8 {
        ((self.regs[REG_CONTRAST] as i32 - 0x80) * 100 / 0x12).clamp(0, 100) as u8
    }

    /// Runs the whole sensor pipeline and writes the tiles to `ram` (bank 0).
    pub fn capture_and_process(
        &mut self,
        exposure: u16,
        offset: i16,
        dither: bool,
        contrast: u8,
        ram: &mut [u8],
    ) {
        if let Err(e) = self.source.capture(&mut self.sensor) {
            diag!(Warn, TARGET, "capture source failed ({e}), using noise");
            // Noise never fails.
            let _ = self.fallback.capture(&mut self.sensor);
        }

        let lut = pipeline::contrast_lut(contrast);
        let filtered = pipeline::edge_enhance(&self.sensor);
        for y in 0..SENSOR_HEIGHT {
            for x in 0..SENSOR_WIDTH {
                let v = pipeline::apply_exposure(filtered.get(x, y), exposure);
                let v = lut[pipeline::apply_offset(v, offset) as usize];
                self.processed.set(x, y, pipeline::quantize(v, x, y, dither));
            }
        }

        match ram.get_mut(IMAGE_OFFSET..IMAGE_OFFSET + IMAGE_BYTES) {
            Some(dst) => pipeline::pack_tiles(&self.processed, dst),
            None => diag!(Warn, TARGET, "RAM bank too small for the picture"),
        }
    }

    /// Counts the busy period down. Returns the cycles still outstanding.
    pub fn step(&mut self, cycles: u32) -> u32 {
        if cycles == 0 || self.countdown == 0 {
            return self.countdown;
        }
        self.countdown = self.countdown.saturating_sub(cycles);
        if self.countdown == 0 {
            self.regs[REG_COMMAND] &= !CMD_BUSY;
        }
        self.countdown
    }
}
