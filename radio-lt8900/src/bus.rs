use core::time::Duration;

use embedded_hal::spi::{self, SpiDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    CommunicationFailure,
    ControlFailure,
    Timeout,
}

pub trait BusReset {
    fn hardware_reset(&mut self) -> Result<(), BusError>;
}

pub trait BusClock {
    fn delay(&mut self, duration: Duration);

    fn current_time(&mut self) -> u64;
}

/// Reset capability for boards without a wired reset line.
pub struct NoReset;

impl BusReset for NoReset {
    fn hardware_reset(&mut self) -> Result<(), BusError> {
        Ok(())
    }
}

/// Byte-level transport to the LT8900.
///
/// Register traffic is 3-byte frames `[address, high, low]`; FIFO fills use
/// one longer frame. The transfer is full duplex and the reply overwrites
/// `frame` in place.
pub trait Bus {
    /// Transfer one bus frame, then hold `settle` before the next frame.
    fn transfer(&mut self, frame: &mut [u8], settle: Duration) -> Result<(), BusError>;

    /// Helper method to delay for a specific duration
    fn delay(&mut self, duration: Duration);

    /// Helper method to get current time in milliseconds
    fn current_time(&mut self) -> u64;

    /// Pulses the device reset line
    fn hardware_reset(&mut self) -> Result<(), BusError>;
}

pub struct SpiBus<S, C, R>
where
    S: SpiDevice,
    C: BusClock,
    R: BusReset,
{
    spi: S,
    clock: C,
    reset: R,
}

impl<S, C, R> SpiBus<S, C, R>
where
    S: SpiDevice,
    C: BusClock,
    R: BusReset,
{
    pub fn new(spi: S, clock: C, reset: R) -> Self {
        Self { spi, clock, reset }
    }
}

impl<S, C, R> Bus for SpiBus<S, C, R>
where
    S: SpiDevice,
    C: BusClock,
    R: BusReset,
{
    fn transfer(&mut self, frame: &mut [u8], settle: Duration) -> Result<(), BusError> {
        self.spi
            .transaction(&mut [
                spi::Operation::TransferInPlace(frame),
                spi::Operation::DelayNs(settle.as_nanos() as u32),
            ])
            .map_err(|_| BusError::CommunicationFailure)
    }

    fn delay(&mut self, duration: Duration) {
        self.clock.delay(duration);
    }

    fn current_time(&mut self) -> u64 {
        self.clock.current_time()
    }

    fn hardware_reset(&mut self) -> Result<(), BusError> {
        self.reset.hardware_reset()
    }
}
