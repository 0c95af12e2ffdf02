use std::{fmt, path::PathBuf, str::FromStr};

use crate::{diagnostics::diag, printer::Printer};

const TARGET: &str = "serial";

/// Cycles per shifted bit with the normal internal clock (8192 Hz).
pub const BIT_CYCLES: u32 = 512;
/// Cycles per shifted bit with the CGB fast clock (SC bit 1).
pub const FAST_BIT_CYCLES: u32 = 16;

const SERIAL_IRQ: u8 = 0x08;

/// Something plugged into the link port.
pub trait LinkDevice: Send {
    /// Called once per completed transfer with the byte the Game Boy sent.
    fn send(&mut self, byte: u8);
    /// The byte shifted back into SB for the same transfer.
    fn receive(&mut self) -> u8;
    /// Return to power-on state.
    fn reset(&mut self);
}

/// No cable attached. Incoming bits are all 1, so every transfer receives
/// 0xFF.
#[derive(Debug, Default)]
pub struct NullDevice;

impl LinkDevice for NullDevice {
    fn send(&mut self, _byte: u8) {}

    fn receive(&mut self) -> u8 {
        0xFF
    }

    fn reset(&mut self) {}
}

/// Device selection as it appears in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkDeviceKind {
    #[default]
    None,
    Printer,
}

impl LinkDeviceKind {
    pub fn name(self) -> &'static str {
        match self {
            LinkDeviceKind::None => "none",
            LinkDeviceKind::Printer => "printer",
        }
    }

    pub fn create(self, print_dir: PathBuf) -> Box<dyn LinkDevice> {
        match self {
            LinkDeviceKind::None => Box::new(NullDevice::default()),
            LinkDeviceKind::Printer => Box::new(Printer::new(print_dir)),
        }
    }
}

impl fmt::Display for LinkDeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LinkDeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "null" => Ok(LinkDeviceKind::None),
            "printer" => Ok(LinkDeviceKind::Printer),
            other => Err(format!("unknown link device {other:?}")),
        }
    }
}

/// SB/SC registers and the shift clock. Raises the serial interrupt when a
/// transfer completes.
pub struct SerialLink {
    sb: u8,
    sc: u8,
    out_buf: Vec<u8>,
    device: Box<dyn LinkDevice>,
    transfer: Option<TransferState>,
    cgb_mode: bool,
}

struct TransferState {
    outgoing: u8,
    internal_clock: bool,
    fast_clock: bool,
    elapsed: u32,
    external_bits: u8,
}

impl TransferState {
    fn new(outgoing: u8, sc: u8) -> Self {
        Self {
            outgoing,
            internal_clock: sc & 0x01 != 0,
            fast_clock: sc & 0x02 != 0,
            elapsed: 0,
            external_bits: 0,
        }
    }
}

impl fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialLink")
            .field("sb", &self.sb)
            .field("sc", &self.sc)
            .field("active", &self.transfer.is_some())
            .finish_non_exhaustive()
    }
}

impl SerialLink {
    pub fn new(cgb: bool) -> Self {
        Self {
            sb: 0,
            sc: if cgb { 0x7F } else { 0x7E },
            out_buf: Vec::new(),
            device: Box::new(NullDevice::default()),
            transfer: None,
            cgb_mode: cgb,
        }
    }

    /// Plugs in a device, resetting it first. Any transfer in flight keeps
    /// running and completes against the new device.
    pub fn connect(&mut self, mut device: Box<dyn LinkDevice>) {
        device.reset();
        self.device = device;
    }

    pub fn disconnect(&mut self) {
        self.connect(Box::new(NullDevice::default()));
    }

    pub fn reset(&mut self) {
        self.sb = 0;
        self.sc = if self.cgb_mode { 0x7F } else { 0x7E };
        self.transfer = None;
        self.out_buf.clear();
        self.device.reset();
    }

    pub fn is_transferring(&self) -> bool {
        self.transfer.is_some()
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF01 => self.sb,
            0xFF02 => {
                if self.cgb_mode {
                    self.sc
                } else {
                    self.sc | 0x7E
                }
            }
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF01 => self.sb = val,
            0xFF02 => {
                self.sc = val;
                if val & 0x80 == 0 {
                    if self.transfer.take().is_some() {
                        diag!(Trace, TARGET, "transfer cancelled");
                    }
                    return;
                }
                // A write with bit 7 set (re)starts with the current SB.
                // External-clock transfers stay pending until a partner
                // supplies clock pulses.
                self.transfer = Some(TransferState::new(self.sb, val));
            }
            _ => {}
        }
    }

    fn bit_cycles(&self, fast_clock: bool) -> u32 {
        if self.cgb_mode && fast_clock {
            FAST_BIT_CYCLES
        } else {
            BIT_CYCLES
        }
    }

    /// Advances the internal shift clock by `cycles`.
    pub fn step(&mut self, cycles: u32, if_reg: &mut u8) {
        let Some(state) = self.transfer.as_ref() else {
            return;
        };
        if !state.internal_clock {
            return;
        }
        let threshold = 8 * self.bit_cycles(state.fast_clock);

        let complete = match self.transfer.as_mut() {
            Some(state) => {
                state.elapsed = state.elapsed.saturating_add(cycles);
                state.elapsed >= threshold
            }
            None => false,
        };
        if complete {
            self.complete(if_reg);
        }
    }

    /// Clock pulses supplied by a link partner. Each pulse shifts one bit of
    /// an external-clock transfer.
    pub fn external_clock_pulse(&mut self, count: u8, if_reg: &mut u8) {
        let complete = match self.transfer.as_mut() {
            Some(state) if !state.internal_clock => {
                state.external_bits = state.external_bits.saturating_add(count);
                state.external_bits >= 8
            }
            _ => false,
        };
        if complete {
            self.complete(if_reg);
        }
    }

    fn complete(&mut self, if_reg: &mut u8) {
        let Some(state) = self.transfer.take() else {
            return;
        };
        self.device.send(state.outgoing);
        self.sb = self.device.receive();
        self.out_buf.push(state.outgoing);
        self.sc &= 0x7F;
        *if_reg |= SERIAL_IRQ;
    }

    /// Bytes sent since the last call.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out_buf)
    }

    pub fn peek_output(&self) -> &[u8] {
        &self.out_buf
    }
}
