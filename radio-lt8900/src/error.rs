use core::fmt;

use crate::bus::BusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    UnknownRegister,
    UnknownField,
    InvalidSyncwordLength,
    IdentityMismatch,
    QueueDisabled,
    Bus(BusError),
}

impl From<BusError> for RadioError {
    fn from(value: BusError) -> Self {
        Self::Bus(value)
    }
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RadioError::UnknownRegister => write!(f, "unknown register name or index"),
            RadioError::UnknownField => write!(f, "unknown field for register"),
            RadioError::InvalidSyncwordLength => {
                write!(f, "syncword length must be between 1 and 4 bytes")
            }
            RadioError::IdentityMismatch => {
                write!(f, "identity registers do not match an LT8900")
            }
            RadioError::QueueDisabled => {
                write!(f, "software transmit queue is not enabled")
            }
            RadioError::Bus(err) => write!(f, "bus transfer failed: {:?}", err),
        }
    }
}

impl std::error::Error for RadioError {}
