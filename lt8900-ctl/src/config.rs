use std::error::Error;
use std::fs;

use serde::Deserialize;

use lt8900_radio::config::{BusConfig, RadioConfig};

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct BusPartial {
    frequency: Option<u32>,
    bits_per_word: Option<u8>,
    clock_polarity_high: Option<bool>,
    no_cs: Option<bool>,
    lsb_first: Option<bool>,
    three_wire: Option<bool>,
    bus_mode: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RadioPartial {
    use_software_tx_queue: Option<bool>,
    syncword: Option<Vec<u8>>,
    channel: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CtlPartial {
    bus: BusPartial,
    radio: RadioPartial,
}

#[derive(Default)]
pub struct CtlConfig {
    pub radio: RadioConfig,
    pub syncword: Option<Vec<u8>>,
    pub channel: Option<u8>,
}

/// Loads configuration from the given TOML file path and merges it over
/// the defaults.
pub fn load_config(path: &str) -> Result<CtlConfig, Box<dyn Error>> {
    let text = fs::read_to_string(path)?;
    parse_config(&text)
}

fn parse_config(text: &str) -> Result<CtlConfig, Box<dyn Error>> {
    let partial: CtlPartial = toml::from_str(text)?;

    let mut bus = BusConfig::default();
    if let Some(frequency) = partial.bus.frequency {
        bus.frequency = frequency;
    }
    if let Some(bits_per_word) = partial.bus.bits_per_word {
        bus.bits_per_word = bits_per_word;
    }
    if let Some(clock_polarity_high) = partial.bus.clock_polarity_high {
        bus.clock_polarity_high = clock_polarity_high;
    }
    if let Some(no_cs) = partial.bus.no_cs {
        bus.no_cs = no_cs;
    }
    if let Some(lsb_first) = partial.bus.lsb_first {
        bus.lsb_first = lsb_first;
    }
    if let Some(three_wire) = partial.bus.three_wire {
        bus.three_wire = three_wire;
    }
    if let Some(bus_mode) = partial.bus.bus_mode {
        bus.bus_mode = bus_mode;
    }

    let mut radio = RadioConfig {
        bus,
        ..RadioConfig::default()
    };
    if let Some(use_queue) = partial.radio.use_software_tx_queue {
        radio.use_software_tx_queue = use_queue;
    }

    Ok(CtlConfig {
        radio,
        syncword: partial.radio.syncword,
        channel: partial.radio.channel,
    })
}
