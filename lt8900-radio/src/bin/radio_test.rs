use std::time::Duration;

use lt8900_radio::config::RadioConfig;
use lt8900_radio::platform;
use lt8900_radio::radio::{ReceiveOptions, TransmitOptions};

fn main() {
    simple_logger::SimpleLogger::new().env().init().unwrap();

    log::info!("Start LT8900 Radio Test");

    let tx_mode = std::env::args().any(|arg| arg == "--tx");
    let device = std::env::args()
        .skip(1)
        .find(|arg| !arg.starts_with("--"))
        .unwrap_or_else(|| "/dev/spidev0.0".to_string());

    let radio =
        platform::linux::create_radio(&device, RadioConfig::default()).expect("lt8900 radio");

    match radio.initialize() {
        Ok(true) => log::info!("radio initialized"),
        Ok(false) => log::warn!("radio did not identify as an LT8900, continuing anyway"),
        Err(err) => {
            log::error!("initialize failed: {}", err);
            return;
        }
    }

    radio.set_syncword(vec![0x25, 0x8b]).expect("syncword");

    let mut counter = 0u64;
    loop {
        if tx_mode {
            let message = format!("// TEST DATA {} //", counter);
            match radio.transmit(
                message.as_bytes(),
                TransmitOptions {
                    post_delay: Duration::from_millis(100),
                    ..TransmitOptions::default()
                },
            ) {
                Ok(true) => {
                    counter += 1;
                    log::trace!("TX[{:8}] {}", counter, message.len());
                }
                Ok(false) => {
                    log::warn!("TX framer went idle early");
                }
                Err(err) => {
                    log::error!("transmit error: {}", err);
                }
            }
        } else {
            match radio.receive(ReceiveOptions {
                wait: true,
                wait_time: Duration::from_millis(100),
                ..ReceiveOptions::default()
            }) {
                Ok(Some(message)) => {
                    counter += 1;
                    log::trace!("RX[{:8}] {:02X?}", counter, message);
                }
                Ok(None) => {}
                Err(err) => {
                    log::error!("receive error: {}", err);
                }
            }
        }
    }
}
