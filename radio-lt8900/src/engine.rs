use core::time::Duration;

use crate::bus::Bus;
use crate::error::RadioError;
use crate::logger::LogPolicy;
use crate::port::{FieldMap, RegisterPort};
use crate::regs;

/// Settle time for a radio_state write that changes channel.
const CHANNEL_SETTLE: Duration = Duration::from_micros(130);
/// Settle time after rewriting format_config.
const FORMAT_SETTLE: Duration = Duration::from_micros(5000);
/// Settle time after enabling the transmitter.
const TX_ENABLE_SETTLE: Duration = Duration::from_micros(1000);
/// Poll interval while waiting for the framer to finish a packet.
const TX_POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Consecutive CRC errors tolerated before the device is reinitialized.
const CRC_ERROR_REINIT_THRESHOLD: u32 = 30;

/// Minimum spacing between transmitted frames.
pub const MIN_INTERFRAME_GAP: Duration = Duration::from_micros(350);

/// The full format_config register, as applied to hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatConfig {
    pub crc_enabled: bool,
    pub scramble_enabled: bool,
    pub packet_length_encoded: bool,
    pub auto_term_tx: bool,
    pub auto_ack: bool,
    pub pkt_fifo_polarity: bool,
    pub crc_initial_data: u8,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            crc_enabled: true,
            scramble_enabled: false,
            packet_length_encoded: true,
            auto_term_tx: true,
            auto_ack: false,
            pkt_fifo_polarity: false,
            crc_initial_data: 0,
        }
    }
}

impl FormatConfig {
    fn to_fields(self) -> [(&'static str, u16); 7] {
        [
            ("crc_enabled", self.crc_enabled as u16),
            ("scramble_enabled", self.scramble_enabled as u16),
            ("packet_length_encoded", self.packet_length_encoded as u16),
            ("auto_term_tx", self.auto_term_tx as u16),
            ("auto_ack", self.auto_ack as u16),
            ("pkt_fifo_polarity", self.pkt_fifo_polarity as u16),
            ("crc_initial_data", self.crc_initial_data as u16),
        ]
    }
}

/// A partial format_config, merged over the baseline defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatOverride {
    pub crc_enabled: Option<bool>,
    pub scramble_enabled: Option<bool>,
    pub packet_length_encoded: Option<bool>,
    pub auto_term_tx: Option<bool>,
    pub auto_ack: Option<bool>,
    pub pkt_fifo_polarity: Option<bool>,
    pub crc_initial_data: Option<u8>,
}

impl FormatOverride {
    pub fn merged_over(&self, base: &FormatConfig) -> FormatConfig {
        FormatConfig {
            crc_enabled: self.crc_enabled.unwrap_or(base.crc_enabled),
            scramble_enabled: self.scramble_enabled.unwrap_or(base.scramble_enabled),
            packet_length_encoded: self
                .packet_length_encoded
                .unwrap_or(base.packet_length_encoded),
            auto_term_tx: self.auto_term_tx.unwrap_or(base.auto_term_tx),
            auto_ack: self.auto_ack.unwrap_or(base.auto_ack),
            pkt_fifo_polarity: self.pkt_fifo_polarity.unwrap_or(base.pkt_fifo_polarity),
            crc_initial_data: self.crc_initial_data.unwrap_or(base.crc_initial_data),
        }
    }
}

/// Decoded view of the status register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Status {
    pub crc_error: bool,
    pub fec_error: bool,
    pub framer_status: u8,
    pub syncword_rx: bool,
    pub packet_flag: bool,
    pub fifo_flag: bool,
}

impl Status {
    pub fn from_value(value: u16) -> Self {
        Self {
            crc_error: value & (1 << 15) != 0,
            fec_error: value & (1 << 14) != 0,
            framer_status: ((value >> 8) & 0x3f) as u8,
            syncword_rx: value & (1 << 7) != 0,
            packet_flag: value & (1 << 6) != 0,
            fifo_flag: value & (1 << 5) != 0,
        }
    }
}

/// Packet-level engine: FIFO framing, transmit/receive state machines and
/// failure-triggered device reinitialization.
///
/// The engine caches the last syncword and format_config actually written
/// so redundant register traffic is elided; both caches are dropped back to
/// unknown whenever the device is reinitialized.
pub struct PacketEngine<I: Bus> {
    port: RegisterPort<I>,
    log: LogPolicy,
    last_syncword: Option<Vec<u8>>,
    last_format: Option<FormatConfig>,
}

impl<I: Bus> PacketEngine<I> {
    pub fn new(bus: I, log: LogPolicy) -> Self {
        Self {
            port: RegisterPort::new(bus, log.clone()),
            log,
            last_syncword: None,
            last_format: None,
        }
    }

    /// Raw register access for diagnostics and advanced use.
    pub fn port_mut(&mut self) -> &mut RegisterPort<I> {
        &mut self.port
    }

    pub fn last_syncword(&self) -> Option<&[u8]> {
        self.last_syncword.as_deref()
    }

    /// Resets the device and applies the default register values. Returns
    /// false when the identity registers do not read back as an LT8900.
    pub fn initialize(&mut self) -> Result<bool, RadioError> {
        self.log.info("Resetting radio");
        self.port.bus_mut().hardware_reset()?;

        self.apply_default_registers()?;

        self.check_identity()
    }

    fn check_identity(&mut self) -> Result<bool, RadioError> {
        let ident0 = self.port.get(regs::RG_IDENTITY_0)?;
        let ident1 = self.port.get(regs::RG_IDENTITY_1)?;

        Ok(ident0 == regs::IDENTITY_0 && ident1 == regs::IDENTITY_1)
    }

    fn apply_default_registers(&mut self) -> Result<(), RadioError> {
        self.last_format = None;
        self.apply_format_config(None)?;

        self.port.put_bits(
            regs::RG_RADIO_STATE,
            &[("tx_enabled", 0), ("rx_enabled", 0), ("channel", 76)],
        )?;
        self.port
            .put_bits(regs::RG_POWER, &[("current", 4), ("gain", 0)])?;
        self.port.put_bits(regs::RG_RSSI_POWER, &[("mode", 0)])?;
        self.port.put_bits(regs::RG_CRYSTAL, &[("trim_adjust", 0)])?;
        self.port.put_bits(
            regs::RG_PACKET_CONFIG,
            &[
                ("preamble_len", 2),
                ("syncword_len", 1),
                ("trailer_len", 0),
                ("packet_type", 0),
                ("fec_type", 0),
                ("br_clock_sel", 0),
            ],
        )?;
        self.port.put_bits(
            regs::RG_CHIP_POWER,
            &[
                ("power_down", 0),
                ("sleep_mode", 0),
                ("br_clock_on_sleep", 0),
                ("rexmit_times", 3),
                ("miso_tri_opt", 0),
                ("scramble_value", 0),
            ],
        )?;
        self.port.put_bits(
            regs::RG_THRESHOLDS,
            &[
                ("fifo_empty_threshold", 8),
                ("fifo_full_threshold", 16),
                ("syncword_error_bits", 2),
            ],
        )?;
        self.port
            .put_bits(regs::RG_SCAN_RSSI, &[("channel", 63), ("ack_time", 176)])?;
        self.port.put_bits(regs::RG_GAIN_BLOCK, &[("enabled", 1)])?;
        self.port.put_bits(regs::RG_VCO_CALIBRATE, &[("enabled", 1)])?;
        self.port.put_bits(
            regs::RG_SCAN_RSSI_STATE,
            &[("enabled", 0), ("channel_offset", 0), ("wait_time", 15)],
        )?;

        Ok(())
    }

    /// Full recovery path: reset, defaults, then the cached syncword and
    /// format_config reapplied exactly as they were before the failure.
    fn reinitialize(&mut self) -> Result<(), RadioError> {
        let syncword = self.last_syncword.take();
        let format = self.last_format.take();

        let healthy = self.initialize()?;
        if !healthy {
            self.log
                .error("Radio identity check failed after reinitialization");
        }

        if let Some(syncword) = syncword {
            self.set_syncword(&syncword, true)?;
        }
        if let Some(format) = format {
            if self.last_format != Some(format) {
                self.write_format(format)?;
                self.last_format = Some(format);
            }
        }

        Ok(())
    }

    pub fn set_channel(&mut self, channel: u8) -> Result<FieldMap, RadioError> {
        let mut state = self.port.get_bits(regs::RG_RADIO_STATE, None)?;
        state.set("channel", channel as u16);

        self.port
            .put_bits_with_settle(regs::RG_RADIO_STATE, state.entries(), CHANNEL_SETTLE)?;

        Ok(state)
    }

    fn current_channel(&mut self) -> Result<u8, RadioError> {
        let state = self.port.get_bits(regs::RG_RADIO_STATE, None)?;
        state
            .get("channel")
            .map(|channel| channel as u8)
            .ok_or(RadioError::UnknownField)
    }

    /// Applies a 1-4 byte syncword. The write is skipped when the value
    /// matches the cached last-applied syncword, unless `force` is set.
    pub fn set_syncword(&mut self, syncword: &[u8], force: bool) -> Result<(), RadioError> {
        if syncword.is_empty() || syncword.len() > 4 {
            return Err(RadioError::InvalidSyncwordLength);
        }

        if !force && self.last_syncword.as_deref() == Some(syncword) {
            return Ok(());
        }

        self.last_syncword = Some(syncword.to_vec());

        let mut packet_config = self.port.get_bits(regs::RG_PACKET_CONFIG, None)?;
        packet_config.set("syncword_len", syncword.len() as u16 - 1);
        self.port
            .put_bits(regs::RG_PACKET_CONFIG, packet_config.entries())?;

        // Byte placement across the four syncword registers depends on the
        // syncword length; see the slotting table in the datasheet.
        match syncword.len() {
            1 => {
                self.port.put(regs::RG_SYNCWORD_0, syncword[0] as u16)?;
            }
            2 => {
                self.port.put(regs::RG_SYNCWORD_0, syncword[1] as u16)?;
                self.port.put(regs::RG_SYNCWORD_3, syncword[0] as u16)?;
            }
            3 => {
                self.port.put(regs::RG_SYNCWORD_0, syncword[2] as u16)?;
                self.port.put(regs::RG_SYNCWORD_2, syncword[1] as u16)?;
                self.port.put(regs::RG_SYNCWORD_3, syncword[0] as u16)?;
            }
            _ => {
                self.port.put(regs::RG_SYNCWORD_0, syncword[3] as u16)?;
                self.port.put(regs::RG_SYNCWORD_1, syncword[2] as u16)?;
                self.port.put(regs::RG_SYNCWORD_2, syncword[1] as u16)?;
                self.port.put(regs::RG_SYNCWORD_3, syncword[0] as u16)?;
            }
        }

        Ok(())
    }

    fn write_format(&mut self, config: FormatConfig) -> Result<(), RadioError> {
        self.port
            .put_bits_with_settle(regs::RG_FORMAT_CONFIG, &config.to_fields(), FORMAT_SETTLE)?;

        let applied = self.port.get_bits(regs::RG_FORMAT_CONFIG, None)?;
        self.log
            .info(&format!("Updated format_config to be {:?}", applied));

        Ok(())
    }

    /// Merges a partial override over the baseline defaults and writes the
    /// result, unless it matches the cached last-applied format.
    pub fn apply_format_config(
        &mut self,
        format: Option<&FormatOverride>,
    ) -> Result<FormatConfig, RadioError> {
        let merged = match format {
            Some(format) => format.merged_over(&FormatConfig::default()),
            None => FormatConfig::default(),
        };

        if self.last_format == Some(merged) {
            return Ok(merged);
        }

        self.write_format(merged)?;
        self.last_format = Some(merged);

        Ok(merged)
    }

    pub fn status(&mut self) -> Result<Status, RadioError> {
        let value = self.port.get(regs::RG_STATUS)?;
        Ok(Status::from_value(value))
    }

    /// Raw RSSI reading (6 bits).
    pub fn read_rssi(&mut self) -> Result<u8, RadioError> {
        let bits = self.port.get_bits(regs::RG_RAW_RSSI, None)?;
        bits.get("raw_rssi")
            .map(|rssi| rssi as u8)
            .ok_or(RadioError::UnknownField)
    }

    pub fn synthesizer_locked(&mut self) -> Result<bool, RadioError> {
        let bits = self.port.get_bits(regs::RG_PHASE_LOCK, None)?;
        bits.get("rf_synth_lock")
            .map(|locked| locked != 0)
            .ok_or(RadioError::UnknownField)
    }

    /// Loads a message into the packet FIFO, prefixed with a length byte
    /// when the active format length-encodes packets.
    ///
    /// The chip acknowledges every byte of a healthy fill with `1`; any
    /// other reply means the device has wedged and is reinitialized before
    /// the error is reported through the in-flight transmit's status poll.
    pub fn fill_fifo(&mut self, message: &[u8], include_length: bool) -> Result<(), RadioError> {
        let mut frame = Vec::with_capacity(message.len() + 2);
        frame.push(regs::RG_FIFO);
        if include_length {
            frame.push(message.len() as u8);
        }
        frame.extend_from_slice(message);

        let sent = frame.clone();
        let settle = Duration::from_micros(10 * message.len() as u64);
        self.port.transfer_frame(&mut frame, settle)?;

        self.log
            .debug(&format!("Writing: {:02X?} = {:02X?}", sent, frame));

        if frame.iter().any(|&ack| ack != 1) {
            self.log
                .error("While transmitting we got an error, reinitializing everything");
            self.reinitialize()?;
        }

        Ok(())
    }

    /// Transmits one message. Returns false when the framer went idle
    /// before flagging the packet as sent.
    pub fn transmit(
        &mut self,
        message: &[u8],
        channel: Option<u8>,
        syncword: Option<&[u8]>,
        format: Option<&FormatOverride>,
        post_delay: Duration,
    ) -> Result<bool, RadioError> {
        if let Some(syncword) = syncword {
            self.set_syncword(syncword, false)?;
        }

        let format = self.apply_format_config(format)?;
        self.log.debug(&format!("Radio format_config = {:?}", format));

        let include_length = format.packet_length_encoded;
        let manual_terminate = !format.auto_term_tx;

        let channel = match channel {
            Some(channel) => channel,
            None => self.current_channel()?,
        };

        // Disarm both directions and clear the FIFO pointers
        self.port.put_bits(
            regs::RG_RADIO_STATE,
            &[("tx_enabled", 0), ("rx_enabled", 0), ("channel", 0)],
        )?;
        self.port
            .put_bits(regs::RG_FIFO_STATE, &[("clear_read", 1), ("clear_write", 1)])?;

        self.fill_fifo(message, include_length)?;

        // Transmit the FIFO contents on the target channel
        self.port.put_bits_with_settle(
            regs::RG_RADIO_STATE,
            &[
                ("tx_enabled", 1),
                ("rx_enabled", 0),
                ("channel", channel as u16),
            ],
            TX_ENABLE_SETTLE,
        )?;

        let mut sent_packet = true;

        while !manual_terminate {
            let status = self.status()?;
            self.log.debug(&format!("radio_status={:?}", status));

            if status.packet_flag {
                break;
            }

            if status.framer_status == 0 {
                sent_packet = false;
                break;
            }

            self.port.bus_mut().delay(TX_POLL_INTERVAL);
        }

        if manual_terminate {
            self.port.put_bits(
                regs::RG_RADIO_STATE,
                &[
                    ("tx_enabled", 0),
                    ("rx_enabled", 0),
                    ("channel", channel as u16),
                ],
            )?;
        }

        if !post_delay.is_zero() {
            self.port.bus_mut().delay(post_delay);
        }

        Ok(sent_packet)
    }

    pub fn start_listening(&mut self, channel: u8) -> Result<(), RadioError> {
        self.stop_listening()?;

        self.port.put_bits(
            regs::RG_RADIO_STATE,
            &[
                ("tx_enabled", 0),
                ("rx_enabled", 1),
                ("channel", channel as u16),
            ],
        )?;

        Ok(())
    }

    pub fn stop_listening(&mut self) -> Result<(), RadioError> {
        self.port.put_bits(
            regs::RG_RADIO_STATE,
            &[("tx_enabled", 0), ("rx_enabled", 0), ("channel", 0)],
        )?;
        self.port
            .put_bits(regs::RG_FIFO_STATE, &[("clear_read", 1), ("clear_write", 1)])?;

        Ok(())
    }

    /// Receives one packet.
    ///
    /// Returns `Ok(None)` when no packet is pending and `wait` is off —
    /// distinct from a received zero-length packet, which never surfaces:
    /// a declared length of zero re-arms listening instead.
    ///
    /// With `length` supplied the packet is assumed not to be
    /// length-encoded (overridable through `format`) and the first FIFO
    /// read's high byte is payload rather than a length prefix.
    pub fn receive(
        &mut self,
        channel: Option<u8>,
        wait: bool,
        length: Option<usize>,
        format: Option<&FormatOverride>,
        wait_time: Duration,
    ) -> Result<Option<Vec<u8>>, RadioError> {
        let format = match (length, format) {
            (Some(_), None) => Some(FormatOverride {
                packet_length_encoded: Some(false),
                ..FormatOverride::default()
            }),
            (Some(_), Some(format)) if format.packet_length_encoded.is_none() => {
                let mut format = *format;
                format.packet_length_encoded = Some(false);
                Some(format)
            }
            (_, format) => format.copied(),
        };

        self.apply_format_config(format.as_ref())?;

        let channel = match channel {
            Some(channel) => channel,
            None => self.current_channel()?,
        };

        if wait {
            self.start_listening(channel)?;
        }

        let mut crc_error_count: u32 = 0;

        loop {
            let status = self.status()?;
            self.log.debug(&format!("radio_status={:?}", status));

            if status.crc_error {
                crc_error_count += 1;
                if crc_error_count > CRC_ERROR_REINIT_THRESHOLD {
                    self.reinitialize()?;
                }

                self.start_listening(channel)?;
                continue;
            }

            crc_error_count = 0;

            if !status.packet_flag {
                if wait {
                    self.port.bus_mut().delay(wait_time);
                    continue;
                }
                return Ok(None);
            }

            // Data is pending: the first FIFO word carries the declared
            // length in its high byte unless the caller supplied one.
            let fifo_data = self.port.get(regs::RG_FIFO)?;

            let mut message = Vec::new();
            let declared_length = match length {
                Some(length) => {
                    message.push((fifo_data >> 8) as u8);
                    length
                }
                None => (fifo_data >> 8) as usize,
            };

            if declared_length == 0 {
                // Spurious empty packet: discard and listen again
                self.start_listening(channel)?;
                continue;
            }

            message.push((fifo_data & 0xff) as u8);

            // The FIFO reads out in 16-bit words, so the final read may
            // carry one byte past the declared length
            while message.len() < declared_length {
                let fifo_data = self.port.get(regs::RG_FIFO)?;
                message.push((fifo_data >> 8) as u8);
                message.push((fifo_data & 0xff) as u8);
            }

            message.truncate(declared_length);

            return Ok(Some(message));
        }
    }
}
