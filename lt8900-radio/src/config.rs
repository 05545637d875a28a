use radio_lt8900::logger::LogConfig;

/// Settings applied to the SPI device when it is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Bus clock rate in Hz
    pub frequency: u32,
    pub bits_per_word: u8,
    pub clock_polarity_high: bool,
    pub no_cs: bool,
    pub lsb_first: bool,
    pub three_wire: bool,
    /// SPI mode 0-3
    pub bus_mode: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            frequency: 4_000_000,
            bits_per_word: 8,
            clock_polarity_high: false,
            no_cs: false,
            lsb_first: false,
            three_wire: false,
            bus_mode: 1,
        }
    }
}

/// Host-side radio configuration. Every field has a usable default.
#[derive(Clone, Default)]
pub struct RadioConfig {
    pub bus: BusConfig,
    /// Route transmissions through the software queue scheduler instead of
    /// driving the hardware from the caller's thread.
    pub use_software_tx_queue: bool,
    pub log: LogConfig,
}
