/// LT8900 Datasheet: Register Summary

pub type RegisterAddress = u8;
pub type RegisterValue = u16;

/// Bit 7 of the address byte selects a register read.
pub const RG_OP_READ: RegisterAddress = 0x80;

pub const RG_IDENTITY_0: RegisterAddress = 0;
pub const RG_IDENTITY_1: RegisterAddress = 1;
pub const RG_PHASE_LOCK: RegisterAddress = 3;
pub const RG_RAW_RSSI: RegisterAddress = 6;
pub const RG_RADIO_STATE: RegisterAddress = 7;
pub const RG_POWER: RegisterAddress = 9;
pub const RG_GAIN_BLOCK: RegisterAddress = 10;
pub const RG_RSSI_POWER: RegisterAddress = 11;
pub const RG_VCO_CALIBRATE: RegisterAddress = 23;
pub const RG_CRYSTAL: RegisterAddress = 27;
pub const RG_PACKET_CONFIG: RegisterAddress = 32;
pub const RG_CHIP_POWER: RegisterAddress = 35;
pub const RG_SYNCWORD_0: RegisterAddress = 36;
pub const RG_SYNCWORD_1: RegisterAddress = 37;
pub const RG_SYNCWORD_2: RegisterAddress = 38;
pub const RG_SYNCWORD_3: RegisterAddress = 39;
pub const RG_THRESHOLDS: RegisterAddress = 40;
pub const RG_FORMAT_CONFIG: RegisterAddress = 41;
pub const RG_SCAN_RSSI: RegisterAddress = 42;
pub const RG_SCAN_RSSI_STATE: RegisterAddress = 43;
pub const RG_STATUS: RegisterAddress = 48;
pub const RG_FIFO: RegisterAddress = 50;
pub const RG_FIFO_STATE: RegisterAddress = 52;

/// Values registers 0/1 report once the chip is out of reset.
pub const IDENTITY_0: RegisterValue = 0x6fe0;
pub const IDENTITY_1: RegisterValue = 0x5681;

pub const REGISTER_COUNT: usize = 53;

/// A named sub-range of a 16-bit register, bits `lo..=hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    pub name: &'static str,
    pub lo: u8,
    pub hi: u8,
}

impl BitField {
    pub const fn mask(&self) -> u16 {
        (((1u32 << (self.hi - self.lo + 1)) - 1) << self.lo) as u16
    }

    pub const fn extract(&self, value: u16) -> u16 {
        (value & self.mask()) >> self.lo
    }

    pub const fn inject(&self, field_value: u16) -> u16 {
        (field_value << self.lo) & self.mask()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDescriptor {
    pub name: &'static str,
    pub fields: &'static [BitField],
}

impl RegisterDescriptor {
    pub fn field(&self, name: &str) -> Option<&'static BitField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

const UNKNOWN: RegisterDescriptor = RegisterDescriptor {
    name: "Unknown",
    fields: &[],
};

pub static REGISTER_MAP: [RegisterDescriptor; REGISTER_COUNT] = [
    UNKNOWN, // 0
    UNKNOWN, // 1
    UNKNOWN, // 2
    RegisterDescriptor {
        // 3
        name: "phase_lock",
        fields: &[
            BitField { name: "reserved_1", lo: 13, hi: 15 },
            BitField { name: "rf_synth_lock", lo: 12, hi: 12 },
            BitField { name: "reserved_2", lo: 0, hi: 11 },
        ],
    },
    UNKNOWN, // 4
    UNKNOWN, // 5
    RegisterDescriptor {
        // 6
        name: "raw_rssi",
        fields: &[
            BitField { name: "raw_rssi", lo: 10, hi: 15 },
            BitField { name: "reserved_1", lo: 0, hi: 9 },
        ],
    },
    RegisterDescriptor {
        // 7
        name: "radio_state",
        fields: &[
            BitField { name: "reserved_1", lo: 9, hi: 15 },
            BitField { name: "tx_enabled", lo: 8, hi: 8 },
            BitField { name: "rx_enabled", lo: 7, hi: 7 },
            BitField { name: "channel", lo: 0, hi: 6 },
        ],
    },
    UNKNOWN, // 8
    RegisterDescriptor {
        // 9
        name: "power",
        fields: &[
            BitField { name: "current", lo: 12, hi: 15 },
            BitField { name: "reserved_1", lo: 11, hi: 11 },
            BitField { name: "gain", lo: 7, hi: 10 },
            BitField { name: "reserved_2", lo: 0, hi: 6 },
        ],
    },
    RegisterDescriptor {
        // 10
        name: "gain_block",
        fields: &[
            BitField { name: "reserved_1", lo: 1, hi: 15 },
            BitField { name: "enabled", lo: 0, hi: 0 },
        ],
    },
    RegisterDescriptor {
        // 11
        name: "rssi_power",
        fields: &[
            BitField { name: "reserved_1", lo: 9, hi: 15 },
            BitField { name: "mode", lo: 8, hi: 8 },
            BitField { name: "reserved_2", lo: 0, hi: 7 },
        ],
    },
    UNKNOWN, // 12
    UNKNOWN, // 13
    UNKNOWN, // 14
    UNKNOWN, // 15
    UNKNOWN, // 16
    UNKNOWN, // 17
    UNKNOWN, // 18
    UNKNOWN, // 19
    UNKNOWN, // 20
    UNKNOWN, // 21
    UNKNOWN, // 22
    RegisterDescriptor {
        // 23
        name: "vco_calibrate",
        fields: &[
            BitField { name: "reserved_1", lo: 3, hi: 15 },
            BitField { name: "enabled", lo: 2, hi: 2 },
            BitField { name: "reserved_2", lo: 0, hi: 1 },
        ],
    },
    UNKNOWN, // 24
    UNKNOWN, // 25
    UNKNOWN, // 26
    RegisterDescriptor {
        // 27
        name: "crystal",
        fields: &[
            BitField { name: "reserved_1", lo: 6, hi: 15 },
            BitField { name: "trim_adjust", lo: 0, hi: 5 },
        ],
    },
    UNKNOWN, // 28
    RegisterDescriptor {
        // 29
        name: "minor_version",
        fields: &[
            BitField { name: "reserved_1", lo: 8, hi: 15 },
            BitField { name: "rf", lo: 4, hi: 7 },
            BitField { name: "reserved_2", lo: 3, hi: 3 },
            BitField { name: "digital", lo: 0, hi: 2 },
        ],
    },
    RegisterDescriptor {
        // 30
        name: "manufacture_1",
        fields: &[BitField { name: "manuf_code_low", lo: 0, hi: 15 }],
    },
    RegisterDescriptor {
        // 31
        name: "manufacture_2",
        fields: &[
            BitField { name: "rf_code", lo: 12, hi: 15 },
            BitField { name: "manuf_code_high", lo: 0, hi: 11 },
        ],
    },
    RegisterDescriptor {
        // 32
        name: "packet_config",
        fields: &[
            BitField { name: "preamble_len", lo: 13, hi: 15 },
            BitField { name: "syncword_len", lo: 11, hi: 12 },
            BitField { name: "trailer_len", lo: 8, hi: 10 },
            BitField { name: "packet_type", lo: 6, hi: 7 },
            BitField { name: "fec_type", lo: 4, hi: 5 },
            BitField { name: "br_clock_sel", lo: 1, hi: 3 },
            BitField { name: "reserved_1", lo: 0, hi: 0 },
        ],
    },
    RegisterDescriptor {
        // 33
        name: "vco_pa_delays",
        fields: &[
            BitField { name: "vco_on_delay", lo: 8, hi: 15 },
            BitField { name: "pa_off_delay", lo: 6, hi: 7 },
            BitField { name: "pa_tx_delay", lo: 0, hi: 5 },
        ],
    },
    RegisterDescriptor {
        // 34
        name: "tx_packet_delays",
        fields: &[
            BitField { name: "packet_control_direct", lo: 15, hi: 15 },
            BitField { name: "tx_cw_delay", lo: 8, hi: 14 },
            BitField { name: "reserved_1", lo: 6, hi: 7 },
            BitField { name: "tx_sw_on_delay", lo: 0, hi: 5 },
        ],
    },
    RegisterDescriptor {
        // 35
        name: "chip_power",
        fields: &[
            BitField { name: "power_down", lo: 15, hi: 15 },
            BitField { name: "sleep_mode", lo: 14, hi: 14 },
            BitField { name: "reserved_1", lo: 13, hi: 13 },
            BitField { name: "br_clock_on_sleep", lo: 12, hi: 12 },
            BitField { name: "rexmit_times", lo: 8, hi: 11 },
            BitField { name: "miso_tri_opt", lo: 7, hi: 7 },
            BitField { name: "scramble_value", lo: 0, hi: 6 },
        ],
    },
    RegisterDescriptor {
        // 36
        name: "syncword_0",
        fields: &[BitField { name: "value", lo: 0, hi: 15 }],
    },
    RegisterDescriptor {
        // 37
        name: "syncword_1",
        fields: &[BitField { name: "value", lo: 0, hi: 15 }],
    },
    RegisterDescriptor {
        // 38
        name: "syncword_2",
        fields: &[BitField { name: "value", lo: 0, hi: 15 }],
    },
    RegisterDescriptor {
        // 39
        name: "syncword_3",
        fields: &[BitField { name: "value", lo: 0, hi: 15 }],
    },
    RegisterDescriptor {
        // 40
        name: "thresholds",
        fields: &[
            BitField { name: "fifo_empty_threshold", lo: 11, hi: 15 },
            BitField { name: "fifo_full_threshold", lo: 6, hi: 10 },
            BitField { name: "syncword_error_bits", lo: 0, hi: 5 },
        ],
    },
    RegisterDescriptor {
        // 41
        name: "format_config",
        fields: &[
            BitField { name: "crc_enabled", lo: 15, hi: 15 },
            BitField { name: "scramble_enabled", lo: 14, hi: 14 },
            BitField { name: "packet_length_encoded", lo: 13, hi: 13 },
            BitField { name: "auto_term_tx", lo: 12, hi: 12 },
            BitField { name: "auto_ack", lo: 11, hi: 11 },
            BitField { name: "pkt_fifo_polarity", lo: 10, hi: 10 },
            BitField { name: "reserved_1", lo: 8, hi: 9 },
            BitField { name: "crc_initial_data", lo: 0, hi: 7 },
        ],
    },
    RegisterDescriptor {
        // 42
        name: "scan_rssi",
        fields: &[
            BitField { name: "channel", lo: 10, hi: 15 },
            BitField { name: "reserved_1", lo: 8, hi: 9 },
            BitField { name: "ack_time", lo: 0, hi: 7 },
        ],
    },
    RegisterDescriptor {
        // 43
        name: "scan_rssi_state",
        fields: &[
            BitField { name: "enabled", lo: 15, hi: 15 },
            BitField { name: "channel_offset", lo: 8, hi: 14 },
            BitField { name: "wait_time", lo: 0, hi: 7 },
        ],
    },
    UNKNOWN, // 44
    UNKNOWN, // 45
    UNKNOWN, // 46
    UNKNOWN, // 47
    RegisterDescriptor {
        // 48
        name: "status",
        fields: &[
            BitField { name: "crc_error", lo: 15, hi: 15 },
            BitField { name: "fec_error", lo: 14, hi: 14 },
            BitField { name: "framer_status", lo: 8, hi: 13 },
            BitField { name: "syncword_rx", lo: 7, hi: 7 },
            BitField { name: "packet_flag", lo: 6, hi: 6 },
            BitField { name: "fifo_flag", lo: 5, hi: 5 },
            BitField { name: "reserved_1", lo: 0, hi: 4 },
        ],
    },
    UNKNOWN, // 49
    RegisterDescriptor {
        // 50
        name: "fifo",
        fields: &[BitField { name: "value", lo: 0, hi: 15 }],
    },
    UNKNOWN, // 51
    RegisterDescriptor {
        // 52
        name: "fifo_state",
        fields: &[
            BitField { name: "clear_write", lo: 15, hi: 15 },
            BitField { name: "reserved_1", lo: 14, hi: 14 },
            BitField { name: "write_ptr", lo: 8, hi: 13 },
            BitField { name: "clear_read", lo: 7, hi: 7 },
            BitField { name: "reserved_2", lo: 6, hi: 6 },
            BitField { name: "read_ptr", lo: 0, hi: 5 },
        ],
    },
];

pub fn descriptor(reg: RegisterAddress) -> Option<&'static RegisterDescriptor> {
    REGISTER_MAP.get(reg as usize)
}

pub fn register_by_name(name: &str) -> Option<RegisterAddress> {
    REGISTER_MAP
        .iter()
        .position(|desc| desc.name != UNKNOWN.name && desc.name == name)
        .map(|index| index as RegisterAddress)
}
