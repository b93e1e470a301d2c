// lib.rs

mod core;
mod codec;
mod crc;
mod delimiter;
mod frame;
mod master;
mod modbus_rtu;
mod slave;
mod transport;
mod validate;

pub use crate::core::{Exception, FunctionCode, Query, QueryBuilder, read_coil, write_coil};
pub use crc::crc16;
pub use delimiter::{Delimit, FrameDelimiter, silence_interval};
pub use frame::{FrameBuffer, MAX_BUFFER};
pub use modbus_rtu::{ModbusRtu, ModbusRtuBuilder, State, DEFAULT_TIMEOUT_MS};
pub use transport::{Clock, DataBits, LineDirection, MonotonicClock, NoDirection, Parity, SerialConfig, StopBits, Transport};
pub use validate::{validate_answer, validate_request};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ModbusRtuError {
    #[error("No reply from slave")]
    NoReply,

    #[error("Frame exceeds {} bytes", MAX_BUFFER)]
    BufferOverflow,

    #[error("CRC mismatch: expected {expected:#06x}, received {received:#06x}")]
    BadCrc { expected: u16, received: u16 },

    #[error("Frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("Invalid response length")]
    InvalidResponseLength,

    #[error("Unexpected reply: expected slave {expected_id} fc {expected_fc:#x}, got slave {id} fc {fc:#x}")]
    UnexpectedReply { expected_id: u8, expected_fc: u8, id: u8, fc: u8 },

    #[error("Write answer echoed address {address} value {value:#06x}, not what was sent")]
    EchoMismatch { address: u16, value: u16 },

    #[error("Register slice too small: {required} words required, {available} available")]
    DestinationTooSmall { required: usize, available: usize },

    #[error("Modbus exception: {0}")]
    Exception(#[from] Exception),

    #[error("Remote exception: function code {function:#x}, exception code {code:#x}")]
    RemoteException { function: u8, code: u8 },

    #[error("Engine configured as slave cannot query")]
    NotMaster,

    #[error("Engine configured as master cannot serve requests")]
    NotSlave,

    #[error("A query is already waiting for its answer")]
    Busy,

    #[error("Invalid slave id: {0}")]
    InvalidSlaveId(u8),

    #[error("Function code {0:#x} is not supported")]
    UnsupportedFunction(u8),

    #[error("Invalid quantity {quantity} for function code {function:#x}")]
    InvalidQuantity { function: u8, quantity: u16 },

    #[error("Invalid range: {0} + {1} > 65536")]
    InvalidAddressRange(u16, u16),

    #[error("Write query needs {required} register words, got {available}")]
    MissingRegisters { required: usize, available: usize },

    #[error("Transport error: {0}")]
    Io(std::io::ErrorKind),
}

impl From<std::io::Error> for ModbusRtuError {
    fn from(err: std::io::Error) -> Self {
        ModbusRtuError::Io(err.kind())
    }
}
