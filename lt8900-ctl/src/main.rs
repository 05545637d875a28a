mod config;

use std::time::Duration;

use clap::{Parser, Subcommand};

use lt8900_radio::platform;
use lt8900_radio::radio::{ReceiveOptions, TransmitOptions};
use radio_lt8900::error::RadioError;
use radio_lt8900::port::RegisterId;
use radio_lt8900::regs;

#[derive(Parser)]
#[command(name = "lt8900-ctl")]
#[command(about = "Exercise an LT8900 radio from the command line")]
struct Cli {
    /// spidev device path
    #[arg(long, default_value = "/dev/spidev0.0")]
    device: String,

    /// TOML configuration file
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transmit a message
    Tx {
        message: String,

        #[arg(long)]
        channel: Option<u8>,

        /// Repeat the transmission across these channels
        #[arg(long, value_delimiter = ',')]
        channels: Vec<u8>,

        #[arg(long, default_value_t = 3)]
        retries: u32,

        /// Delay between retry bursts in milliseconds
        #[arg(long, default_value_t = 100)]
        delay_ms: u64,
    },
    /// Listen for packets and print them
    Rx {
        #[arg(long)]
        channel: Option<u8>,

        /// Expected payload length for packets that are not length-encoded
        #[arg(long)]
        length: Option<usize>,
    },
    /// Dump every named register
    Regs,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::SimpleLogger::new().env().init().ok();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => config::CtlConfig::default(),
    };

    let radio = platform::linux::create_radio(&cli.device, config.radio)?;

    if !radio.initialize()? {
        return Err(Box::new(RadioError::IdentityMismatch));
    }

    if let Some(syncword) = config.syncword {
        radio.set_syncword(syncword)?;
    }
    if let Some(channel) = config.channel {
        radio.set_channel(channel)?;
    }

    match cli.command {
        Command::Tx {
            message,
            channel,
            channels,
            retries,
            delay_ms,
        } => {
            let sent = if channels.is_empty() {
                radio.transmit(
                    message.as_bytes(),
                    TransmitOptions {
                        channel,
                        ..TransmitOptions::default()
                    },
                )?
            } else {
                radio.multi_transmit(
                    message.as_bytes(),
                    &channels,
                    retries,
                    Duration::from_millis(delay_ms),
                    TransmitOptions::default(),
                )?
            };

            if sent {
                log::info!("sent {} bytes", message.len());
            } else {
                log::error!("transmit failed");
            }
        }
        Command::Rx { channel, length } => loop {
            if let Some(message) = radio.receive(ReceiveOptions {
                channel,
                length,
                wait: true,
                ..ReceiveOptions::default()
            })? {
                println!("{:02x?}", message);
            }
        },
        Command::Regs => {
            for (index, descriptor) in regs::REGISTER_MAP.iter().enumerate() {
                if descriptor.fields.is_empty() {
                    continue;
                }
                let bits = radio.get_register_bits(RegisterId::Index(index as u8))?;
                println!("{:2} {:<16} {:?}", index, descriptor.name, bits);
            }
        }
    }

    Ok(())
}
