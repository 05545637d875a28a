//! Linux wiring: a spidev-backed bus, a monotonic clock, and (optionally)
//! a gpio-driven reset line.

use std::time::Instant;

use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
use linux_embedded_hal::SpidevDevice;

use radio_lt8900::bus::{BusClock, BusError, BusReset, NoReset, SpiBus};
use radio_lt8900::error::RadioError;

use crate::config::{BusConfig, RadioConfig};
use crate::radio::Radio;

pub type LinuxSpi = SpidevDevice;

pub struct LinuxClock {
    start_time: Instant,
}

impl LinuxClock {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }
}

impl Default for LinuxClock {
    fn default() -> Self {
        Self::new()
    }
}

impl BusClock for LinuxClock {
    fn delay(&mut self, duration: std::time::Duration) {
        std::thread::sleep(duration);
    }

    fn current_time(&mut self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }
}

/// Opens and configures a spidev device from the bus settings.
pub fn open_spi(path: &str, config: &BusConfig) -> Result<SpidevDevice, RadioError> {
    let mut spi =
        SpidevDevice::open(path).map_err(|_| RadioError::Bus(BusError::ControlFailure))?;

    let mut mode = match config.bus_mode {
        0 => SpiModeFlags::SPI_MODE_0,
        1 => SpiModeFlags::SPI_MODE_1,
        2 => SpiModeFlags::SPI_MODE_2,
        _ => SpiModeFlags::SPI_MODE_3,
    };
    if config.clock_polarity_high {
        mode |= SpiModeFlags::SPI_CPOL;
    }
    if config.no_cs {
        mode |= SpiModeFlags::SPI_NO_CS;
    }
    if config.lsb_first {
        mode |= SpiModeFlags::SPI_LSB_FIRST;
    }
    if config.three_wire {
        mode |= SpiModeFlags::SPI_3WIRE;
    }

    let options = SpidevOptions::new()
        .bits_per_word(config.bits_per_word)
        .max_speed_hz(config.frequency)
        .mode(mode)
        .build();

    spi.0
        .configure(&options)
        .map_err(|_| RadioError::Bus(BusError::ControlFailure))?;

    Ok(spi)
}

/// A radio on a spidev bus with no wired reset line.
pub fn create_radio(
    path: &str,
    config: RadioConfig,
) -> Result<Radio<SpiBus<SpidevDevice, LinuxClock, NoReset>>, RadioError> {
    let spi = open_spi(path, &config.bus)?;
    let bus = SpiBus::new(spi, LinuxClock::new(), NoReset);

    Ok(Radio::new(bus, config))
}

#[cfg(feature = "gpio-reset")]
pub use gpio_reset::{create_radio_with_reset, LinuxGpioReset};

#[cfg(feature = "gpio-reset")]
mod gpio_reset {
    use super::*;

    use libgpiod::line::{Offset, Value};

    pub struct LinuxGpioReset {
        line: Offset,
        request: libgpiod::request::Request,
    }

    impl LinuxGpioReset {
        /// Claims the named gpio line as an output for the reset pin.
        pub fn new(line_name: &str, consumer: &str) -> Result<Self, RadioError> {
            let settings = {
                let mut settings = libgpiod::line::Settings::new()
                    .map_err(|_| RadioError::Bus(BusError::ControlFailure))?;
                settings
                    .set_direction(libgpiod::line::Direction::Output)
                    .map_err(|_| RadioError::Bus(BusError::ControlFailure))?;
                settings
                    .set_output_value(Value::InActive)
                    .map_err(|_| RadioError::Bus(BusError::ControlFailure))?;
                settings.set_active_low(true);
                settings
            };

            for chip in libgpiod::gpiochip_devices(&"/dev")
                .map_err(|_| RadioError::Bus(BusError::ControlFailure))?
            {
                let offset = match chip.line_offset_from_name(line_name) {
                    Ok(offset) => offset,
                    Err(_) => continue,
                };

                let mut line_config = libgpiod::line::Config::new()
                    .map_err(|_| RadioError::Bus(BusError::ControlFailure))?;
                line_config
                    .add_line_settings(&[offset], settings)
                    .map_err(|_| RadioError::Bus(BusError::ControlFailure))?;

                let mut req_config = libgpiod::request::Config::new()
                    .map_err(|_| RadioError::Bus(BusError::ControlFailure))?;
                let request = chip
                    .request_lines(
                        Some(
                            req_config
                                .set_consumer(consumer)
                                .map_err(|_| RadioError::Bus(BusError::ControlFailure))?,
                        ),
                        &line_config,
                    )
                    .map_err(|_| RadioError::Bus(BusError::ControlFailure))?;

                return Ok(Self {
                    line: offset,
                    request,
                });
            }

            log::error!("gpio line with name '{}' not found", line_name);

            Err(RadioError::Bus(BusError::ControlFailure))
        }
    }

    impl BusReset for LinuxGpioReset {
        fn hardware_reset(&mut self) -> Result<(), BusError> {
            self.request
                .set_value(self.line, Value::Active)
                .map_err(|_| BusError::ControlFailure)?;

            std::thread::sleep(std::time::Duration::from_millis(25));

            self.request
                .set_value(self.line, Value::InActive)
                .map_err(|_| BusError::ControlFailure)?;

            Ok(())
        }
    }

    /// A radio on a spidev bus with a gpio reset line.
    pub fn create_radio_with_reset(
        path: &str,
        reset_line: &str,
        config: RadioConfig,
    ) -> Result<Radio<SpiBus<SpidevDevice, LinuxClock, LinuxGpioReset>>, RadioError> {
        let spi = open_spi(path, &config.bus)?;
        let reset = LinuxGpioReset::new(reset_line, "lt8900-rst")?;
        let bus = SpiBus::new(spi, LinuxClock::new(), reset);

        Ok(Radio::new(bus, config))
    }
}
