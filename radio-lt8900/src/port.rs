use core::time::Duration;

use crate::bus::Bus;
use crate::error::RadioError;
use crate::logger::LogPolicy;
use crate::regs::{self, RegisterAddress, RegisterValue};

/// Default settle time held after a register transfer.
pub(crate) const WRITE_SETTLE: Duration = Duration::from_micros(10);

/// A register, addressed by catalog index or by catalog name.
#[derive(Debug, Clone, Copy)]
pub enum RegisterId<'a> {
    Index(RegisterAddress),
    Name(&'a str),
}

impl From<RegisterAddress> for RegisterId<'_> {
    fn from(value: RegisterAddress) -> Self {
        Self::Index(value)
    }
}

impl<'a> From<&'a str> for RegisterId<'a> {
    fn from(value: &'a str) -> Self {
        Self::Name(value)
    }
}

/// Decoded field values of one register, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(&'static str, u16)>,
}

impl FieldMap {
    pub fn get(&self, name: &str) -> Option<u16> {
        self.entries
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| *value)
    }

    pub fn set(&mut self, name: &'static str, value: u16) {
        match self.entries.iter_mut().find(|(field, _)| *field == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn entries(&self) -> &[(&'static str, u16)] {
        &self.entries
    }
}

/// Encodes and decodes named bit fields against the register catalog and
/// moves raw frames over the injected bus.
pub struct RegisterPort<I: Bus> {
    bus: I,
    log: LogPolicy,
}

impl<I: Bus> RegisterPort<I> {
    pub fn new(bus: I, log: LogPolicy) -> Self {
        Self { bus, log }
    }

    pub fn bus_mut(&mut self) -> &mut I {
        &mut self.bus
    }

    pub fn resolve(&self, reg: RegisterId) -> Result<RegisterAddress, RadioError> {
        match reg {
            RegisterId::Index(index) if (index as usize) < regs::REGISTER_COUNT => Ok(index),
            RegisterId::Index(_) => Err(RadioError::UnknownRegister),
            RegisterId::Name(name) => {
                regs::register_by_name(name).ok_or(RadioError::UnknownRegister)
            }
        }
    }

    /// Raw frame transfer with transfer logging. The reply overwrites
    /// `frame` in place.
    pub(crate) fn transfer_frame(
        &mut self,
        frame: &mut [u8],
        settle: Duration,
    ) -> Result<(), RadioError> {
        self.bus.transfer(frame, settle)?;
        Ok(())
    }

    fn put_frame(
        &mut self,
        reg: RegisterAddress,
        high: u8,
        low: u8,
        settle: Duration,
    ) -> Result<[u8; 3], RadioError> {
        let mut frame = [reg, high, low];
        self.bus.transfer(&mut frame, settle)?;

        if reg & regs::RG_OP_READ != 0 {
            self.log
                .debug(&format!(" regRead[{:02X}] = {:02X?}", reg & 0x7f, frame));
        } else {
            self.log.debug(&format!(
                "regWrite[{:02X}:0x{:02X}{:02X}] = {:02X?}",
                reg, high, low, frame
            ));
        }

        Ok(frame)
    }

    /// Write a 16-bit register value. Returns the raw reply bytes.
    pub fn put<'a>(
        &mut self,
        reg: impl Into<RegisterId<'a>>,
        value: RegisterValue,
    ) -> Result<[u8; 3], RadioError> {
        self.put_with_settle(reg, value, WRITE_SETTLE)
    }

    pub fn put_with_settle<'a>(
        &mut self,
        reg: impl Into<RegisterId<'a>>,
        value: RegisterValue,
        settle: Duration,
    ) -> Result<[u8; 3], RadioError> {
        let reg = self.resolve(reg.into())?;
        self.put_frame(reg, (value >> 8) as u8, (value & 0xff) as u8, settle)
    }

    /// Encode named fields into a register value and write it. Fields not
    /// supplied are zero.
    pub fn put_bits<'a>(
        &mut self,
        reg: impl Into<RegisterId<'a>>,
        fields: &[(&str, u16)],
    ) -> Result<[u8; 3], RadioError> {
        self.put_bits_with_settle(reg, fields, WRITE_SETTLE)
    }

    pub fn put_bits_with_settle<'a>(
        &mut self,
        reg: impl Into<RegisterId<'a>>,
        fields: &[(&str, u16)],
        settle: Duration,
    ) -> Result<[u8; 3], RadioError> {
        let reg = self.resolve(reg.into())?;
        let descriptor = regs::descriptor(reg).ok_or(RadioError::UnknownRegister)?;

        let mut value: RegisterValue = 0;
        for (name, field_value) in fields {
            let field = descriptor.field(name).ok_or(RadioError::UnknownField)?;
            value |= field.inject(*field_value);
        }

        self.put_frame(reg, (value >> 8) as u8, (value & 0xff) as u8, settle)
    }

    /// Read a 16-bit register value.
    pub fn get<'a>(&mut self, reg: impl Into<RegisterId<'a>>) -> Result<RegisterValue, RadioError> {
        let reg = self.resolve(reg.into())?;
        let reply = self.put_frame(reg | regs::RG_OP_READ, 0, 0, WRITE_SETTLE)?;

        // The reply carries the value in the lower two bytes
        Ok(((reply[1] as u16) << 8) | reply[2] as u16)
    }

    /// Decode every declared field of a register. Reads the register unless
    /// a raw value is supplied.
    pub fn get_bits<'a>(
        &mut self,
        reg: impl Into<RegisterId<'a>>,
        value: Option<RegisterValue>,
    ) -> Result<FieldMap, RadioError> {
        let reg = self.resolve(reg.into())?;
        let value = match value {
            Some(value) => value,
            None => self.get(reg)?,
        };

        let descriptor = regs::descriptor(reg).ok_or(RadioError::UnknownRegister)?;

        let mut map = FieldMap::default();
        for field in descriptor.fields {
            map.set(field.name, field.extract(value));
        }

        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::LogPolicy;
    use crate::mock::MockBus;

    fn port() -> RegisterPort<MockBus> {
        RegisterPort::new(MockBus::new(), LogPolicy::default())
    }

    #[test]
    fn test_put_splits_value_into_bytes() {
        let mut port = port();
        port.put(7u8, 0x1234).expect("write");

        assert_eq!(port.bus_mut().frames.last().unwrap(), &vec![7, 0x12, 0x34]);
    }

    #[test]
    fn test_get_sets_read_bit_and_reassembles_reply() {
        let mut port = port();
        port.bus_mut().registers[7] = 0xbeef;

        let value = port.get("radio_state").expect("read");

        assert_eq!(value, 0xbeef);
        assert_eq!(port.bus_mut().frames.last().unwrap()[0], 7 | 0x80);
    }

    #[test]
    fn test_put_bits_masks_and_shifts() {
        let mut port = port();
        port.put_bits(
            "radio_state",
            &[("tx_enabled", 1), ("rx_enabled", 0), ("channel", 76)],
        )
        .expect("write");

        assert_eq!(port.bus_mut().writes_to(7), vec![(1 << 8) | 76]);
    }

    #[test]
    fn test_put_bits_truncates_oversized_field_value() {
        let mut port = port();
        // channel is 7 bits wide; 0x1ff must be masked to 0x7f
        port.put_bits("radio_state", &[("channel", 0x1ff)])
            .expect("write");

        assert_eq!(port.bus_mut().writes_to(7), vec![0x7f]);
    }

    #[test]
    fn test_get_bits_round_trips_put_bits() {
        let mut port = port();
        let fields: &[(&str, u16)] = &[
            ("fifo_empty_threshold", 8),
            ("fifo_full_threshold", 16),
            ("syncword_error_bits", 2),
        ];
        port.put_bits("thresholds", fields).expect("write");

        let raw = port.bus_mut().registers[40];
        let map = port.get_bits("thresholds", Some(raw)).expect("decode");

        for (name, value) in fields {
            assert_eq!(map.get(name), Some(*value), "{}", name);
        }
    }

    #[test]
    fn test_every_register_round_trips_all_fields() {
        let mut port = port();

        for (index, descriptor) in regs::REGISTER_MAP.iter().enumerate() {
            if descriptor.fields.is_empty() {
                continue;
            }

            let fields: Vec<(&str, u16)> = descriptor
                .fields
                .iter()
                .enumerate()
                .map(|(position, field)| {
                    let width = field.hi - field.lo + 1;
                    let max = ((1u32 << width) - 1) as u16;
                    (field.name, (position as u16 + 1) & max)
                })
                .collect();

            port.put_bits(index as u8, &fields).expect("write");
            let raw = port.bus_mut().registers[index];
            let decoded = port.get_bits(index as u8, Some(raw)).expect("decode");

            for (name, value) in &fields {
                assert_eq!(
                    decoded.get(name),
                    Some(*value),
                    "{}.{}",
                    descriptor.name,
                    name
                );
            }
        }
    }

    #[test]
    fn test_unknown_register_and_field_errors() {
        let mut port = port();

        assert_eq!(
            port.get("no_such_register").unwrap_err(),
            RadioError::UnknownRegister
        );
        assert_eq!(port.get(200u8).unwrap_err(), RadioError::UnknownRegister);
        assert_eq!(
            port.put_bits("radio_state", &[("no_such_field", 1)])
                .unwrap_err(),
            RadioError::UnknownField
        );
    }
}
