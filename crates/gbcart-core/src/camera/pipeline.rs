//! Sensor post-processing: edge filter, exposure, contrast curve,
//! quantisation and tile packing.

use super::source::{SENSOR_HEIGHT, SENSOR_WIDTH, SensorFrame};

pub const TILES_WIDE: usize = SENSOR_WIDTH / 8;
pub const TILES_HIGH: usize = SENSOR_HEIGHT / 8;
pub const TILE_BYTES: usize = 16;
/// Size of the packed picture in cartridge RAM.
pub const IMAGE_BYTES: usize = TILES_WIDE * TILES_HIGH * TILE_BYTES;

const BAYER_4X4: [[u8; 4]; 4] = [[0, 8, 2, 10], [12, 4, 14, 6], [3, 11, 1, 9], [15, 7, 13, 5]];

/// `3c - (N+S+E+W)/2`, with neighbours outside the grid clamped to the edge.
pub fn edge_enhance(frame: &SensorFrame) -> SensorFrame {
    let mut out = SensorFrame::default();
    for y in 0..SENSOR_HEIGHT {
        let up = y.saturating_sub(1);
        let down = (y + 1).min(SENSOR_HEIGHT - 1);
        for x in 0..SENSOR_WIDTH {
            let left = x.saturating_sub(1);
            let right = (x + 1).min(SENSOR_WIDTH - 1);
            let c = frame.get(x, y) as i32;
            let ring = frame.get(x, up) as i32
                + frame.get(x, down) as i32
                + frame.get(left, y) as i32
                + frame.get(right, y) as i32;
            out.set(x, y, (3 * c - ring / 2).clamp(0, 255) as u8);
        }
    }
    out
}

#[inline]
pub fn apply_exposure(value: u8, exposure: u16) -> u8 {
    let scaled = (value as u32 + (exposure >> 8) as u32) * exposure as u32 / 0x800;
    scaled.min(255) as u8
}

#[inline]
pub fn apply_offset(value: u8, offset: i16) -> u8 {
    (value as i32 + offset as i32).clamp(0, 255) as u8
}

/// 256-entry response curve for a contrast percentage. 50 is the identity;
/// higher values blend towards a quartic S-curve, lower values towards a
/// flattened quadratic.
pub fn contrast_lut(percent: u8) -> [u8; 256] {
    let k = (percent.min(100) as f32 - 50.0) / 50.0;
    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        let x = (i as f32 - 127.5) / 127.5;
        let t = x.abs();
        let curved = if k >= 0.0 {
            (1.0 - k) * t + k * (1.0 - (1.0 - t).powi(4))
        } else {
            (1.0 + k) * t + (-k) * t * t
        };
        let y = curved.copysign(x);
        *slot = (y * 127.5 + 127.5).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Reduces an intensity to a 2-bit shade, 0 being the brightest.
#[inline]
pub fn quantize(value: u8, x: usize, y: usize, dither: bool) -> u8 {
    let v = if dither {
        (value as i32 + BAYER_4X4[y & 3][x & 3] as i32 * 4 - 30).clamp(0, 255) as u8
    } else {
        value
    };
    3 - (v >> 6)
}

/// Packs a grid of shades (0..=3) into 8x8 2bpp tiles, row-major tile
/// order, low bit plane first, leftmost pixel in bit 7.
pub fn pack_tiles(shades: &SensorFrame, out: &mut [u8]) {
    for ty in 0..TILES_HIGH {
        for tx in 0..TILES_WIDE {
            let tile = (ty * TILES_WIDE + tx) * TILE_BYTES;
            for row in 0..8 {
                let (mut lo, mut hi) = (0u8, 0u8);
                for col in 0..8 {
                    let shade = shades.get(tx * 8 + col, ty * 8 + row);
                    let bit = 7 - col;
                    lo |= (shade & 1) << bit;
                    hi |= ((shade >> 1) & 1) << bit;
                }
                if let Some(dst) = out.get_mut(tile + row * 2..tile + row * 2 + 2) {
                    dst[0] = lo;
                    dst[1] = hi;
                }
            }
        }
    }
}
