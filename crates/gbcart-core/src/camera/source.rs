use std::{
    fs::File,
    io::{self, BufRead, BufReader, Seek},
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::prng::Prng;

pub const SENSOR_WIDTH: usize = 128;
pub const SENSOR_HEIGHT: usize = 112;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode PNG: {0}")]
    Decode(#[from] png::DecodingError),
    #[error("PNG output buffer size overflows")]
    TooLarge,
    #[error("PNG has zero width or height")]
    Empty,
    #[error("capture device unavailable: {0}")]
    Unavailable(String),
}

/// One raw intensity sample per sensor cell, row-major, 0 = black.
#[derive(Clone, PartialEq, Eq)]
pub struct SensorFrame {
    samples: Box<[u8]>,
}

impl std::fmt::Debug for SensorFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorFrame")
            .field("width", &SENSOR_WIDTH)
            .field("height", &SENSOR_HEIGHT)
            .finish_non_exhaustive()
    }
}

impl Default for SensorFrame {
    fn default() -> Self {
        Self::filled(0)
    }
}

impl SensorFrame {
    pub fn filled(value: u8) -> Self {
        Self {
            samples: vec![value; SENSOR_WIDTH * SENSOR_HEIGHT].into_boxed_slice(),
        }
    }

    /// Builds a frame from exactly `SENSOR_WIDTH * SENSOR_HEIGHT` samples.
    pub fn from_samples(samples: Vec<u8>) -> Option<Self> {
        (samples.len() == SENSOR_WIDTH * SENSOR_HEIGHT).then(|| Self {
            samples: samples.into_boxed_slice(),
        })
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.samples[y * SENSOR_WIDTH + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        self.samples[y * SENSOR_WIDTH + x] = value;
    }

    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [u8] {
        &mut self.samples
    }
}

/// Anything that can fill the sensor with a picture.
pub trait CaptureSource: Send {
    fn capture(&mut self, frame: &mut SensorFrame) -> Result<(), CaptureError>;
}

/// Pseudo-random static. Always succeeds.
#[derive(Debug, Clone)]
pub struct NoiseSource {
    prng: Prng,
}

impl NoiseSource {
    pub fn new(seed: u32) -> Self {
        Self {
            prng: Prng::new(seed),
        }
    }

    pub fn from_time() -> Self {
        Self {
            prng: Prng::from_time(),
        }
    }
}

impl CaptureSource for NoiseSource {
    fn capture(&mut self, frame: &mut SensorFrame) -> Result<(), CaptureError> {
        self.prng.fill(frame.samples_mut());
        Ok(())
    }
}

/// A still image on disk, re-read on every capture so it can be swapped
/// while the emulator runs.
#[derive(Debug, Clone)]
pub struct PngSource {
    path: PathBuf,
}

impl PngSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CaptureSource for PngSource {
    fn capture(&mut self, frame: &mut SensorFrame) -> Result<(), CaptureError> {
        let file = File::open(&self.path).map_err(|source| CaptureError::Open {
            path: self.path.clone(),
            source,
        })?;
        *frame = decode_png(BufReader::new(file))?;
        Ok(())
    }
}

/// Always fails; stands in for a camera device that went away.
#[derive(Debug, Clone, Default)]
pub struct UnavailableSource;

impl CaptureSource for UnavailableSource {
    fn capture(&mut self, _frame: &mut SensorFrame) -> Result<(), CaptureError> {
        Err(CaptureError::Unavailable("no capture device".to_string()))
    }
}

/// Decodes a PNG into luminance and scales it (nearest neighbour) to the
/// sensor size.
pub fn decode_png<R: BufRead + Seek>(reader: R) -> Result<SensorFrame, CaptureError> {
    let mut decoder = png::Decoder::new(reader);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut png_reader = decoder.read_info()?;
    let buffer_size = png_reader
        .output_buffer_size()
        .ok_or(CaptureError::TooLarge)?;
    let mut buf = vec![0; buffer_size];
    let info = png_reader.next_frame(&mut buf)?;
    let (width, height) = (info.width as usize, info.height as usize);
    if width == 0 || height == 0 {
        return Err(CaptureError::Empty);
    }
    let data = &buf[..info.buffer_size()];
    let (color, _) = png_reader.output_color_type();
    let channels = color.samples();
    let line = info.line_size;

    let luma = |x: usize, y: usize| -> u8 {
        let px = &data[y * line + x * channels..][..channels];
        match color {
            png::ColorType::Rgb | png::ColorType::Rgba => {
                let (r, g, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
                ((r * 299 + g * 587 + b * 114) / 1000) as u8
            }
            _ => px[0],
        }
    };

    let mut frame = SensorFrame::default();
    for y in 0..SENSOR_HEIGHT {
        let sy = y * height / SENSOR_HEIGHT;
        for x in 0..SENSOR_WIDTH {
            let sx = x * width / SENSOR_WIDTH;
            frame.set(x, y, luma(sx, sy));
        }
    }
    Ok(frame)
}
