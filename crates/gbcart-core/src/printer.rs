//! Game Boy Printer on the far end of the link cable.
//!
//! Packets are `88 33 | cmd | compression | len lo | len hi | data… |
//! checksum lo | checksum hi | 00 | 00`. The printer answers the last two
//! footer bytes; everything else is answered with 0x00.

use std::{
    fs::File,
    io::{self, BufWriter},
    path::{Path, PathBuf},
};

use crate::{diagnostics::diag, serial::LinkDevice};

const TARGET: &str = "printer";

pub const MAGIC: [u8; 2] = [0x88, 0x33];
pub const PACKET_CAPACITY: usize = 10;

pub const PRINT_WIDTH: usize = 160;
pub const PRINT_HEIGHT: usize = 144;
const TILES_WIDE: usize = PRINT_WIDTH / 8;
const PAGE_BYTES: usize = (PRINT_WIDTH / 8) * (PRINT_HEIGHT / 8) * 16;

pub const CMD_INIT: u8 = 0x01;
pub const CMD_PRINT: u8 = 0x02;
pub const CMD_DATA: u8 = 0x04;
pub const CMD_STATUS: u8 = 0x0F;

pub const STATUS_OK: u8 = 0x81;
pub const STATUS_CHECKSUM_ERROR: u8 = 0x00;

const DEFAULT_PALETTE: u8 = 0xE4;
const GREY_LEVELS: [u8; 4] = [0xFF, 0xAA, 0x55, 0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    WaitMagic1,
    WaitMagic2,
    Command,
    Compression,
    SizeLow,
    SizeHigh,
    Data,
    Footer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    pub command: u8,
    /// Compression byte as received; only bit 0 is meaningful.
    pub compression: u8,
    pub size: u16,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn compressed(&self) -> bool {
        self.compression & 0x01 != 0
    }

    pub fn checksum(&self) -> u16 {
        let [lo, hi] = self.size.to_le_bytes();
        [self.command, self.compression, lo, hi]
            .iter()
            .chain(&self.payload)
            .fold(0u16, |sum, &b| sum.wrapping_add(b as u16))
    }

    /// Payload with compression undone.
    pub fn decoded(&self) -> Rle {
        if self.compressed() {
            decode_rle(&self.payload)
        } else {
            Rle {
                bytes: self.payload.clone(),
                truncated: false,
            }
        }
    }
}

/// Output of [`decode_rle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rle {
    pub bytes: Vec<u8>,
    /// The stream ended inside a run.
    pub truncated: bool,
}

/// Control byte with bit 7 set: repeat the next byte `(c & 0x7F) + 2`
/// times. Clear: copy the next `c + 1` bytes.
pub fn decode_rle(input: &[u8]) -> Rle {
    let mut bytes = Vec::with_capacity(input.len() * 2);
    let mut truncated = false;
    let mut i = 0;
    while i < input.len() {
        let control = input[i];
        i += 1;
        if control & 0x80 != 0 {
            let Some(&value) = input.get(i) else {
                truncated = true;
                break;
            };
            i += 1;
            let count = (control & 0x7F) as usize + 2;
            bytes.resize(bytes.len() + count, value);
        } else {
            let count = control as usize + 1;
            let end = (i + count).min(input.len());
            bytes.extend_from_slice(&input[i..end]);
            if end - i < count {
                truncated = true;
            }
            i = end;
        }
    }
    Rle { bytes, truncated }
}

/// A composed page, one grey level per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintImage {
    pub pixels: Vec<u8>,
}

impl PrintImage {
    /// Lays out 2bpp tile data 20 tiles wide. Missing bytes print blank;
    /// extra bytes are ignored.
    pub fn compose(tile_data: &[u8], palette: u8) -> Self {
        let mut pixels = vec![0u8; PRINT_WIDTH * PRINT_HEIGHT];
        for (index, tile) in tile_data[..tile_data.len().min(PAGE_BYTES)]
            .chunks(16)
            .enumerate()
        {
            let tx = index % TILES_WIDE;
            let ty = index / TILES_WIDE;
            for row in 0..8 {
                let lo = tile.get(row * 2).copied().unwrap_or(0);
                let hi = tile.get(row * 2 + 1).copied().unwrap_or(0);
                for col in 0..8 {
                    let bit = 7 - col;
                    let shade = ((lo >> bit) & 1) | (((hi >> bit) & 1) << 1);
                    let (x, y) = (tx * 8 + col, ty * 8 + row);
                    pixels[y * PRINT_WIDTH + x] = shade;
                }
            }
        }
        for px in &mut pixels {
            let colour = (palette >> (*px * 2)) & 0x03;
            *px = GREY_LEVELS[colour as usize];
        }
        Self { pixels }
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.pixels[y * PRINT_WIDTH + x]
    }

    /// Writes an 8-bit greyscale PNG.
    pub fn write_png<W: io::Write>(&self, w: W) -> io::Result<()> {
        let mut encoder = png::Encoder::new(w, PRINT_WIDTH as u32, PRINT_HEIGHT as u32);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().map_err(io::Error::other)?;
        writer
            .write_image_data(&self.pixels)
            .map_err(io::Error::other)?;
        writer.finish().map_err(io::Error::other)
    }

    /// Saves as `print_NNNN.png` in `dir`, taking the first index at or
    /// after `start` whose file does not exist yet.
    pub fn export(&self, dir: &Path, start: u32) -> io::Result<(PathBuf, u32)> {
        std::fs::create_dir_all(dir)?;
        let mut index = start;
        loop {
            let path = dir.join(format!("print_{index:04}.png"));
            match File::create_new(&path) {
                Ok(file) => {
                    self.write_png(BufWriter::new(file))?;
                    return Ok((path, index));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    index = index
                        .checked_add(1)
                        .ok_or_else(|| io::Error::other("print index exhausted"))?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

pub struct Printer {
    state: ProtocolState,
    packet: Packet,
    footer: [u8; 4],
    footer_len: usize,
    retained: Vec<Packet>,
    status: u8,
    output: u8,
    print_dir: PathBuf,
    next_index: u32,
    last_print: Option<PrintImage>,
    exported: Vec<PathBuf>,
    pub checksum_errors: u32,
    pub dropped_packets: u32,
}

impl std::fmt::Debug for Printer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Printer")
            .field("state", &self.state)
            .field("retained", &self.retained.len())
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Printer {
    pub fn new(print_dir: PathBuf) -> Self {
        Self {
            state: ProtocolState::WaitMagic1,
            packet: Packet::default(),
            footer: [0; 4],
            footer_len: 0,
            retained: Vec::with_capacity(PACKET_CAPACITY),
            status: 0,
            output: 0,
            print_dir,
            next_index: 0,
            last_print: None,
            exported: Vec::new(),
            checksum_errors: 0,
            dropped_packets: 0,
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn retained(&self) -> &[Packet] {
        &self.retained
    }

    pub fn last_print(&self) -> Option<&PrintImage> {
        self.last_print.as_ref()
    }

    /// Files written so far, oldest first.
    pub fn exported(&self) -> &[PathBuf] {
        &self.exported
    }

    /// Feeds one byte from the Game Boy and returns the reply shifted back.
    pub fn exchange(&mut self, byte: u8) -> u8 {
        self.send(byte);
        self.receive()
    }

    fn process(&mut self, byte: u8) {
        self.output = 0x00;
        self.state = match self.state {
            ProtocolState::WaitMagic1 => {
                if byte == MAGIC[0] {
                    ProtocolState::WaitMagic2
                } else {
                    ProtocolState::WaitMagic1
                }
            }
            ProtocolState::WaitMagic2 => {
                if byte == MAGIC[1] {
                    self.packet = Packet::default();
                    self.footer_len = 0;
                    ProtocolState::Command
                } else {
                    ProtocolState::WaitMagic1
                }
            }
            ProtocolState::Command => {
                self.packet.command = byte;
                ProtocolState::Compression
            }
            ProtocolState::Compression => {
                self.packet.compression = byte;
                ProtocolState::SizeLow
            }
            ProtocolState::SizeLow => {
                self.packet.size = byte as u16;
                ProtocolState::SizeHigh
            }
            ProtocolState::SizeHigh => {
                self.packet.size |= (byte as u16) << 8;
                if self.packet.size > 0 {
                    self.packet.payload = Vec::with_capacity(self.packet.size as usize);
                    ProtocolState::Data
                } else {
                    ProtocolState::Footer
                }
            }
            ProtocolState::Data => {
                self.packet.payload.push(byte);
                if self.packet.payload.len() >= self.packet.size as usize {
                    ProtocolState::Footer
                } else {
                    ProtocolState::Data
                }
            }
            ProtocolState::Footer => {
                self.footer[self.footer_len] = byte;
                self.footer_len += 1;
                match self.footer_len {
                    3 => {
                        self.verify_checksum();
                        self.output = self.status;
                        ProtocolState::Footer
                    }
                    4 => {
                        self.execute();
                        self.output = self.status;
                        ProtocolState::WaitMagic1
                    }
                    _ => ProtocolState::Footer,
                }
            }
        };
    }

    fn verify_checksum(&mut self) {
        let expected = u16::from_le_bytes([self.footer[0], self.footer[1]]);
        let actual = self.packet.checksum();
        if expected == actual {
            self.status = STATUS_OK;
        } else {
            self.status = STATUS_CHECKSUM_ERROR;
            self.checksum_errors += 1;
            diag!(
                Warn,
                TARGET,
                "checksum mismatch on command {:#04x}: packet says {expected:#06x}, computed {actual:#06x}",
                self.packet.command
            );
        }
    }

    fn execute(&mut self) {
        let packet = std::mem::take(&mut self.packet);
        match packet.command {
            CMD_INIT => {
                self.retained.clear();
                diag!(Trace, TARGET, "init");
            }
            CMD_PRINT => self.print(&packet),
            CMD_DATA => {
                if packet.payload.is_empty() {
                    return;
                }
                if self.retained.len() >= PACKET_CAPACITY {
                    self.dropped_packets += 1;
                    diag!(
                        Warn,
                        TARGET,
                        "data packet dropped: all {PACKET_CAPACITY} slots are full"
                    );
                    return;
                }
                self.retained.push(packet);
            }
            CMD_STATUS => {}
            other => diag!(Warn, TARGET, "unknown command {other:#04x}"),
        }
    }

    fn print(&mut self, packet: &Packet) {
        let mut tile_data = Vec::with_capacity(PAGE_BYTES);
        for (slot, data) in self.retained.iter().enumerate() {
            let decoded = data.decoded();
            if decoded.truncated {
                diag!(Warn, TARGET, "packet {slot} ends inside a compressed run");
            }
            tile_data.extend_from_slice(&decoded.bytes);
        }

        let palette = match packet.payload.get(2) {
            Some(&p) if p != 0 => p,
            _ => DEFAULT_PALETTE,
        };
        let image = PrintImage::compose(&tile_data, palette);

        match image.export(&self.print_dir, self.next_index) {
            Ok((path, index)) => {
                diag!(Info, TARGET, "printed {}", path.display());
                self.next_index = index.saturating_add(1);
                self.exported.push(path);
            }
            Err(e) => diag!(
                Warn,
                TARGET,
                "failed to export print to {}: {e}",
                self.print_dir.display()
            ),
        }
        self.last_print = Some(image);
    }
}

impl LinkDevice for Printer {
    fn send(&mut self, byte: u8) {
        self.process(byte);
    }

    fn receive(&mut self) -> u8 {
        self.output
    }

    fn reset(&mut self) {
        self.state = ProtocolState::WaitMagic1;
        self.packet = Packet::default();
        self.footer = [0; 4];
        self.footer_len = 0;
        self.retained.clear();
        self.status = 0;
        self.output = 0;
        self.last_print = None;
    }
}

/// Frames a packet the way the Game Boy sends it.
pub fn encode_packet(command: u8, compressed: bool, payload: &[u8]) -> Vec<u8> {
    let packet = Packet {
        command,
        compression: compressed as u8,
        size: payload.len() as u16,
        payload: payload.to_vec(),
    };
    let mut out = Vec::with_capacity(payload.len() + 10);
    out.extend_from_slice(&MAGIC);
    out.push(command);
    out.push(packet.compression);
    out.extend_from_slice(&packet.size.to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&packet.checksum().to_le_bytes());
    out.extend_from_slice(&[0, 0]);
    out
}
