//! In-memory chip model for host-side tests and bring-up without hardware.

use core::time::Duration;
use std::collections::VecDeque;

use crate::bus::{Bus, BusError};
use crate::regs;

/// A [`Bus`] backed by a register file instead of a wire.
///
/// Register writes land in `registers`; reads come from `registers` except
/// for the status and FIFO registers, which drain the scripted
/// `status_reads` / `fifo_reads` sequences first. Every frame sent over the
/// bus is journaled in `frames`.
pub struct MockBus {
    pub registers: [u16; regs::REGISTER_COUNT],
    /// Scripted replies for status-register reads, drained front to back.
    pub status_reads: VecDeque<u16>,
    /// Scripted replies for FIFO-register reads, drained front to back.
    pub fifo_reads: VecDeque<u16>,
    /// Every frame sent, as transmitted (before the reply overwrote it).
    pub frames: Vec<Vec<u8>>,
    /// Number of FIFO fills left to acknowledge with zeros instead of ones.
    pub bad_ack_fills: u32,
    /// Number of transfers left to fail outright.
    pub fail_transfers: u32,
    /// What registers 0/1 read back as after a reset.
    pub identity: (u16, u16),
    pub resets: u32,
    pub slept: Duration,
    now_ms: u64,
}

impl MockBus {
    pub fn new() -> Self {
        let mut registers = [0u16; regs::REGISTER_COUNT];
        registers[regs::RG_IDENTITY_0 as usize] = regs::IDENTITY_0;
        registers[regs::RG_IDENTITY_1 as usize] = regs::IDENTITY_1;

        Self {
            registers,
            status_reads: VecDeque::new(),
            fifo_reads: VecDeque::new(),
            frames: Vec::new(),
            bad_ack_fills: 0,
            fail_transfers: 0,
            identity: (regs::IDENTITY_0, regs::IDENTITY_1),
            resets: 0,
            slept: Duration::ZERO,
            now_ms: 0,
        }
    }

    /// Values written to one register, in write order.
    pub fn writes_to(&self, reg: u8) -> Vec<u16> {
        self.frames
            .iter()
            .filter(|frame| frame.len() == 3 && frame[0] == reg)
            .map(|frame| ((frame[1] as u16) << 8) | frame[2] as u16)
            .collect()
    }

    /// Advances the mock clock without a driver-issued delay.
    pub fn tick(&mut self, duration: Duration) {
        self.now_ms += duration.as_millis() as u64;
    }

    fn read_value(&mut self, reg: u8) -> u16 {
        match reg {
            regs::RG_STATUS => self
                .status_reads
                .pop_front()
                .unwrap_or(self.registers[reg as usize]),
            regs::RG_FIFO => self.fifo_reads.pop_front().unwrap_or(0),
            _ => self.registers[reg as usize],
        }
    }
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for MockBus {
    fn transfer(&mut self, frame: &mut [u8], _settle: Duration) -> Result<(), BusError> {
        if frame.is_empty() {
            return Err(BusError::CommunicationFailure);
        }

        if self.fail_transfers > 0 {
            self.fail_transfers -= 1;
            return Err(BusError::CommunicationFailure);
        }

        self.frames.push(frame.to_vec());

        if frame[0] & regs::RG_OP_READ != 0 {
            let reg = frame[0] & 0x7f;
            if reg as usize >= regs::REGISTER_COUNT || frame.len() != 3 {
                return Err(BusError::CommunicationFailure);
            }
            let value = self.read_value(reg);
            frame[0] = 1;
            frame[1] = (value >> 8) as u8;
            frame[2] = (value & 0xff) as u8;
            return Ok(());
        }

        let reg = frame[0];
        if reg as usize >= regs::REGISTER_COUNT {
            return Err(BusError::CommunicationFailure);
        }

        if frame.len() == 3 && reg != regs::RG_FIFO {
            self.registers[reg as usize] = ((frame[1] as u16) << 8) | frame[2] as u16;
            frame.fill(1);
            return Ok(());
        }

        // Writes addressed to the FIFO register stream into the FIFO
        let ack: u8 = if self.bad_ack_fills > 0 {
            self.bad_ack_fills -= 1;
            0
        } else {
            1
        };
        frame.fill(ack);

        Ok(())
    }

    fn delay(&mut self, duration: Duration) {
        self.slept += duration;
        self.now_ms += duration.as_millis() as u64;
    }

    fn current_time(&mut self) -> u64 {
        self.now_ms
    }

    fn hardware_reset(&mut self) -> Result<(), BusError> {
        self.resets += 1;
        self.registers = [0u16; regs::REGISTER_COUNT];
        self.registers[regs::RG_IDENTITY_0 as usize] = self.identity.0;
        self.registers[regs::RG_IDENTITY_1 as usize] = self.identity.1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_round_trips() {
        let mut bus = MockBus::new();

        let mut write = [7u8, 0x01, 0x4c];
        bus.transfer(&mut write, Duration::ZERO).expect("write");
        assert_eq!(write, [1, 1, 1]);

        let mut read = [7u8 | 0x80, 0, 0];
        bus.transfer(&mut read, Duration::ZERO).expect("read");
        assert_eq!(((read[1] as u16) << 8) | read[2] as u16, 0x014c);
    }

    #[test]
    fn test_scripted_fifo_reads_drain_in_order() {
        let mut bus = MockBus::new();
        bus.fifo_reads.extend([0x0102, 0x0304]);

        for expected in [0x0102u16, 0x0304, 0] {
            let mut read = [regs::RG_FIFO | 0x80, 0, 0];
            bus.transfer(&mut read, Duration::ZERO).expect("read");
            assert_eq!(((read[1] as u16) << 8) | read[2] as u16, expected);
        }
    }

    #[test]
    fn test_bad_ack_fill_replies_zeros_once() {
        let mut bus = MockBus::new();
        bus.bad_ack_fills = 1;

        let mut fill = vec![regs::RG_FIFO, 3, 0xaa, 0xbb, 0xcc];
        bus.transfer(&mut fill, Duration::ZERO).expect("fill");
        assert!(fill.iter().all(|&b| b == 0));

        let mut fill = vec![regs::RG_FIFO, 3, 0xaa, 0xbb, 0xcc];
        bus.transfer(&mut fill, Duration::ZERO).expect("fill");
        assert!(fill.iter().all(|&b| b == 1));
    }
}
