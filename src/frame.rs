use crate::crc::crc16;
use crate::ModbusRtuError;

/// Largest RTU frame: id, PDU of up to 253 bytes and the CRC trailer.
pub const MAX_BUFFER: usize = 256;

pub(crate) const ID: usize = 0;
pub(crate) const FUNC: usize = 1;
pub(crate) const ADD_HI: usize = 2;
pub(crate) const NB_HI: usize = 4;
pub(crate) const BYTE_CNT: usize = 6;

/// Holds exactly one in-flight frame, outbound or inbound.
///
/// Every write is length-checked; a frame that would not fit yields
/// [`ModbusRtuError::BufferOverflow`] and leaves the stored bytes as they were.
pub struct FrameBuffer {
    bytes: [u8; MAX_BUFFER],
    len: usize,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        FrameBuffer {
            bytes: [0; MAX_BUFFER],
            len: 0,
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn push(&mut self, byte: u8) -> Result<(), ModbusRtuError> {
        if self.len >= MAX_BUFFER {
            return Err(ModbusRtuError::BufferOverflow);
        }
        self.bytes[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Appends a big-endian word.
    pub fn push_u16(&mut self, value: u16) -> Result<(), ModbusRtuError> {
        self.extend_from_slice(&value.to_be_bytes())
    }

    pub fn extend_from_slice(&mut self, data: &[u8]) -> Result<(), ModbusRtuError> {
        let end = self.len + data.len();
        if end > MAX_BUFFER {
            return Err(ModbusRtuError::BufferOverflow);
        }
        self.bytes[self.len..end].copy_from_slice(data);
        self.len = end;
        Ok(())
    }

    /// Shortens the frame, keeping the first `len` bytes.
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    pub fn byte(&self, index: usize) -> Result<u8, ModbusRtuError> {
        self.as_slice()
            .get(index)
            .copied()
            .ok_or(ModbusRtuError::FrameTooShort(self.len))
    }

    /// Big-endian word starting at `index`.
    pub fn word(&self, index: usize) -> Result<u16, ModbusRtuError> {
        Ok(u16::from_be_bytes([self.byte(index)?, self.byte(index + 1)?]))
    }

    pub fn slave_id(&self) -> Result<u8, ModbusRtuError> {
        self.byte(ID)
    }

    pub fn function(&self) -> Result<u8, ModbusRtuError> {
        self.byte(FUNC)
    }

    /// Appends the CRC of everything currently stored.
    pub fn append_crc(&mut self) -> Result<(), ModbusRtuError> {
        let crc = crc16(self.as_slice());
        self.push((crc >> 8) as u8)?;
        self.push(crc as u8)
    }

    /// Compares the two trailing bytes against the CRC of the bytes before them.
    pub fn check_crc(&self) -> Result<(), ModbusRtuError> {
        if self.len < 3 {
            return Err(ModbusRtuError::FrameTooShort(self.len));
        }
        let body = self.len - 2;
        let received = self.word(body)?;
        let expected = crc16(&self.bytes[..body]);
        if received != expected {
            return Err(ModbusRtuError::BadCrc { expected, received });
        }
        Ok(())
    }
}
