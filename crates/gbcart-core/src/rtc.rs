//! MBC3 real-time clock: register file, latching, cycle ticking and the
//! wall-clock drift applied when a saved clock is restored.

use std::time::{SystemTime, UNIX_EPOCH};

pub const RTC_CYCLES_PER_SECOND: u32 = 4_194_304;

/// Register record: seconds, minutes, hours, day low, control.
pub const RTC_RECORD_LEN: usize = 5;
/// Record followed by a little-endian u64 UNIX timestamp.
pub const RTC_FILE_LEN: usize = RTC_RECORD_LEN + 8;

const DAYS_PER_COUNTER: u64 = 512;

/// Source of wall-clock time in whole seconds since the UNIX epoch.
pub trait WallClock {
    fn now(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// A clock frozen at a given timestamp.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl WallClock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RtcRegisters {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    /// 9-bit day counter.
    pub days: u16,
    pub halt: bool,
    /// Sticky day-counter overflow.
    pub carry: bool,
}

impl RtcRegisters {
    pub fn control_byte(&self) -> u8 {
        let mut out = ((self.days >> 8) as u8) & 0x01;
        if self.halt {
            out |= 0x40;
        }
        if self.carry {
            out |= 0x80;
        }
        out
    }

    pub fn to_record(&self) -> [u8; RTC_RECORD_LEN] {
        [
            self.seconds & 0x3F,
            self.minutes & 0x3F,
            self.hours & 0x1F,
            (self.days & 0x00FF) as u8,
            self.control_byte(),
        ]
    }

    pub fn from_record(record: &[u8; RTC_RECORD_LEN]) -> Self {
        let control = record[4];
        Self {
            seconds: record[0] & 0x3F,
            minutes: record[1] & 0x3F,
            hours: record[2] & 0x1F,
            days: record[3] as u16 | (((control & 0x01) as u16) << 8),
            halt: control & 0x40 != 0,
            carry: control & 0x80 != 0,
        }
    }
}

/// Advances `regs` by the wall-clock time between `stored` and `now`.
///
/// Pure: the result depends only on the arguments. A halted clock does not
/// move, and a clock that went backwards counts as no time elapsed.
pub fn reconcile(regs: RtcRegisters, stored: u64, now: u64) -> RtcRegisters {
    if regs.halt {
        return regs;
    }
    advance(regs, now.saturating_sub(stored))
}

/// Adds whole seconds to a running clock. In-range fields carry at
/// 60/60/24/512. A field written out of range counts up to its bit-width
/// limit and wraps to zero without carrying.
fn advance(mut regs: RtcRegisters, seconds: u64) -> RtcRegisters {
    let minutes = roll(&mut regs.seconds, 60, 0x3F, seconds);
    let hours = roll(&mut regs.minutes, 60, 0x3F, minutes);
    let days = roll(&mut regs.hours, 24, 0x1F, hours);

    let days = regs.days as u64 + days;
    if days >= DAYS_PER_COUNTER {
        regs.carry = true;
    }
    regs.days = (days % DAYS_PER_COUNTER) as u16;
    regs
}

/// Adds `n` to a counter that rolls over at `modulus` and returns the
/// number of rollovers.
fn roll(value: &mut u8, modulus: u64, mask: u8, mut n: u64) -> u64 {
    let mut current = *value as u64;
    if current >= modulus {
        let to_wrap = mask as u64 + 1 - current;
        if n < to_wrap {
            *value = (current + n) as u8;
            return 0;
        }
        n -= to_wrap;
        current = 0;
    }
    let total = current + n;
    *value = (total % modulus) as u8;
    total / modulus
}

/// Serialises the register block followed by the timestamp.
pub fn encode(regs: &RtcRegisters, timestamp: u64) -> [u8; RTC_FILE_LEN] {
    let mut out = [0u8; RTC_FILE_LEN];
    out[..RTC_RECORD_LEN].copy_from_slice(&regs.to_record());
    out[RTC_RECORD_LEN..].copy_from_slice(&timestamp.to_le_bytes());
    out
}

/// Inverse of [`encode`]; `None` when the data is too short.
pub fn decode(data: &[u8]) -> Option<(RtcRegisters, u64)> {
    let record: &[u8; RTC_RECORD_LEN] = data.get(..RTC_RECORD_LEN)?.try_into().ok()?;
    let stamp: [u8; 8] = data.get(RTC_RECORD_LEN..RTC_FILE_LEN)?.try_into().ok()?;
    Some((RtcRegisters::from_record(record), u64::from_le_bytes(stamp)))
}

#[derive(Debug, Clone)]
pub struct Rtc {
    regs: RtcRegisters,
    latched: RtcRegisters,
    /// Wall-clock time the registers were last reconciled or persisted at.
    last_sync: u64,
    subsecond_cycles: u32,
    latch_pending: bool,
}

impl Rtc {
    pub fn new(now: u64) -> Self {
        let regs = RtcRegisters::default();
        Self {
            regs,
            latched: regs,
            last_sync: now,
            subsecond_cycles: 0,
            latch_pending: false,
        }
    }

    pub fn registers(&self) -> RtcRegisters {
        self.regs
    }

    pub fn latched(&self) -> RtcRegisters {
        self.latched
    }

    pub fn last_sync(&self) -> u64 {
        self.last_sync
    }

    /// Replaces the live registers with restored state and applies drift
    /// up to `now`.
    pub fn restore(&mut self, regs: RtcRegisters, stored: u64, now: u64) {
        self.regs = reconcile(regs, stored, now);
        self.last_sync = now;
        self.subsecond_cycles = 0;
        self.latched = self.regs;
    }

    pub fn mark_persisted(&mut self, now: u64) {
        self.last_sync = now;
    }

    /// Latch sequence: writing 0x00 then 0x01 copies the live registers.
    pub fn write_latch(&mut self, value: u8) {
        if value == 0 {
            self.latch_pending = true;
            return;
        }
        if value == 1 && self.latch_pending {
            self.latched = self.regs;
        }
        self.latch_pending = false;
    }

    pub fn read(&self, reg: u8) -> u8 {
        match reg {
            0x08 => self.latched.seconds & 0x3F,
            0x09 => self.latched.minutes & 0x3F,
            0x0A => self.latched.hours & 0x1F,
            0x0B => (self.latched.days & 0x00FF) as u8,
            0x0C => self.latched.control_byte(),
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, reg: u8, value: u8) {
        match reg {
            0x08 => {
                self.regs.seconds = value & 0x3F;
                self.subsecond_cycles = 0;
            }
            0x09 => self.regs.minutes = value & 0x3F,
            0x0A => self.regs.hours = value & 0x1F,
            0x0B => self.regs.days = (self.regs.days & 0x0100) | value as u16,
            0x0C => {
                self.regs.days = (self.regs.days & 0x00FF) | (((value & 0x01) as u16) << 8);
                self.regs.halt = value & 0x40 != 0;
                self.regs.carry = value & 0x80 != 0;
            }
            _ => return,
        }
        self.latched = self.regs;
    }

    /// Advances the clock by CPU cycles while emulation runs.
    pub fn step(&mut self, cpu_cycles: u64) {
        if self.regs.halt {
            return;
        }

        let mut seconds = cpu_cycles / RTC_CYCLES_PER_SECOND as u64;
        let rem = (cpu_cycles % RTC_CYCLES_PER_SECOND as u64) as u32;
        let mut sub = self.subsecond_cycles + rem;
        if sub >= RTC_CYCLES_PER_SECOND {
            sub -= RTC_CYCLES_PER_SECOND;
            seconds += 1;
        }
        self.subsecond_cycles = sub;

        if seconds > 0 {
            self.regs = advance(self.regs, seconds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_distributes_elapsed_seconds() {
        let t0 = 1_700_000_000;
        let out = reconcile(RtcRegisters::default(), t0, t0 + 3661);
        assert_eq!((out.seconds, out.minutes, out.hours, out.days), (1, 1, 1, 0));
        assert!(!out.carry);
    }

    #[test]
    fn reconcile_is_a_no_op_when_halted() {
        let regs = RtcRegisters {
            seconds: 5,
            halt: true,
            ..Default::default()
        };
        assert_eq!(reconcile(regs, 0, 1_000_000), regs);
    }

    #[test]
    fn reconcile_day_overflow_is_sticky() {
        let regs = RtcRegisters {
            hours: 23,
            minutes: 59,
            seconds: 59,
            days: 511,
            ..Default::default()
        };
        let out = reconcile(regs, 100, 101);
        assert_eq!(out.days, 0);
        assert_eq!(out.hours, 0);
        assert!(out.carry);

        // A later reconcile without overflow keeps the flag.
        let again = reconcile(out, 0, 10);
        assert!(again.carry);
    }

    #[test]
    fn reconcile_ignores_clock_going_backwards() {
        let regs = RtcRegisters {
            minutes: 3,
            ..Default::default()
        };
        assert_eq!(reconcile(regs, 500, 400), regs);
    }

    #[test]
    fn record_round_trip_keeps_day_high_bit() {
        let regs = RtcRegisters {
            seconds: 12,
            minutes: 34,
            hours: 5,
            days: 0x1A3,
            halt: true,
            carry: true,
        };
        let bytes = encode(&regs, 0x0102_0304_0506_0708);
        assert_eq!(bytes.len(), RTC_FILE_LEN);
        assert_eq!(bytes[4], 0xC1);
        assert_eq!(decode(&bytes), Some((regs, 0x0102_0304_0506_0708)));
        assert_eq!(decode(&bytes[..12]), None);
    }

    #[test]
    fn latch_requires_zero_then_one() {
        let mut rtc = Rtc::new(0);
        rtc.write(0x08, 10);
        rtc.step(RTC_CYCLES_PER_SECOND as u64 * 3);
        assert_eq!(rtc.read(0x08), 10);

        rtc.write_latch(1);
        assert_eq!(rtc.read(0x08), 10);
        rtc.write_latch(0);
        rtc.write_latch(1);
        assert_eq!(rtc.read(0x08), 13);
    }

    #[test]
    fn ticks_through_invalid_values() {
        let regs = RtcRegisters {
            seconds: 59,
            minutes: 60,
            ..Default::default()
        };
        let out = advance(regs, 1);
        assert_eq!((out.seconds, out.minutes), (0, 61));

        let regs = RtcRegisters {
            seconds: 63,
            minutes: 5,
            ..Default::default()
        };
        let out = advance(regs, 1);
        assert_eq!((out.seconds, out.minutes), (0, 5));

        // Hours run up to 31 before wrapping, and the wrap carries nothing.
        let regs = RtcRegisters {
            hours: 30,
            minutes: 59,
            seconds: 59,
            ..Default::default()
        };
        let out = advance(regs, 2 * 3600);
        assert_eq!((out.hours, out.days), (0, 0));
    }

    #[test]
    fn cycle_ticking_agrees_with_reconcile() {
        let start = RtcRegisters {
            seconds: 61,
            minutes: 58,
            hours: 23,
            days: 0x1FE,
            ..Default::default()
        };
        let mut rtc = Rtc::new(0);
        for (reg, value) in [(0x08, 61), (0x09, 58), (0x0A, 23), (0x0B, 0xFE), (0x0C, 0x01)] {
            rtc.write(reg, value);
        }
        assert_eq!(rtc.registers(), start);

        let elapsed = 2 * 86_400 + 125;
        rtc.step(RTC_CYCLES_PER_SECOND as u64 * elapsed);
        assert_eq!(rtc.registers(), reconcile(start, 0, elapsed));
        assert!(rtc.registers().carry);
    }

    #[test]
    fn halt_stops_cycle_ticking() {
        let mut rtc = Rtc::new(0);
        rtc.write(0x0C, 0x40);
        rtc.step(RTC_CYCLES_PER_SECOND as u64 * 2);
        assert_eq!(rtc.registers().seconds, 0);

        rtc.write(0x0C, 0x00);
        rtc.step(RTC_CYCLES_PER_SECOND as u64 - 1);
        assert_eq!(rtc.registers().seconds, 0);
        rtc.step(1);
        assert_eq!(rtc.registers().seconds, 1);
    }

    #[test]
    fn cycle_ticking_sets_carry_on_day_overflow() {
        let mut rtc = Rtc::new(0);
        for (reg, value) in [(0x08, 59), (0x09, 59), (0x0A, 23), (0x0B, 0xFF), (0x0C, 0x01)] {
            rtc.write(reg, value);
        }
        rtc.step(RTC_CYCLES_PER_SECOND as u64);
        assert_eq!(rtc.registers().days, 0);
        assert!(rtc.registers().carry);
    }
}
