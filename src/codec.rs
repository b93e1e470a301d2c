//! Per-function-code encoding and decoding.
//!
//! Master side builds queries and decodes answers into the caller's slice; slave side
//! services a validated request against its register table and rewrites the frame
//! buffer into the response. Coils live 16 per register word, bit-indexed; on the wire
//! they are packed 8 per byte, lowest coil in bit 0.

use crate::core::{EXCEPTION_FLAG, Exception, FunctionCode, Query, read_coil, write_coil};
use crate::frame::{ADD_HI, BYTE_CNT, FUNC, FrameBuffer, NB_HI};
use crate::ModbusRtuError;

/// Value of an energised coil in a write-single-coil PDU.
const COIL_ON: u16 = 0xFF00;

/// Header echoed by write answers: id, function, address, value/quantity.
const ECHO_SIZE: usize = 6;

/// The address and value/quantity words a query puts on the wire.
///
/// Read answers are sized by `value`; write answers must echo both words back.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Header {
    pub(crate) address: u16,
    pub(crate) value: u16,
}

impl Header {
    pub(crate) fn of(query: &Query) -> Self {
        let value = match query.function() {
            FunctionCode::WriteSingleCoil if query.registers()[0] > 0 => COIL_ON,
            FunctionCode::WriteSingleCoil => 0x0000,
            FunctionCode::WriteSingleRegister => query.registers()[0],
            _ => query.quantity(),
        };
        Header {
            address: query.address(),
            value,
        }
    }
}

/// Fills `frame` with `query`, CRC excluded.
pub(crate) fn encode_query(frame: &mut FrameBuffer, query: &Query) -> Result<(), ModbusRtuError> {
    let registers = query.registers();

    frame.clear();
    frame.push(query.slave_id())?;
    frame.push(query.function().code())?;
    frame.push_u16(query.address())?;

    match query.function() {
        FunctionCode::ReadCoils
        | FunctionCode::ReadDiscreteInputs
        | FunctionCode::ReadHoldingRegisters
        | FunctionCode::ReadInputRegisters => {
            frame.push_u16(query.quantity())?;
        }
        FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister => {
            frame.push_u16(Header::of(query).value)?;
        }
        FunctionCode::WriteMultipleCoils => {
            let quantity = query.quantity() as usize;
            frame.push_u16(query.quantity())?;
            frame.push(quantity.div_ceil(8) as u8)?;
            pack_coils(frame, quantity, |i| read_coil(registers, i))?;
        }
        FunctionCode::WriteMultipleRegisters => {
            let quantity = query.quantity() as usize;
            frame.push_u16(query.quantity())?;
            frame.push((quantity * 2) as u8)?;
            for &value in &registers[..quantity] {
                frame.push_u16(value)?;
            }
        }
    }
    Ok(())
}

/// Decodes a validated answer to a `function` query sent with `header` into `registers`.
///
/// Write answers carry nothing to decode, but their echo must match what was sent.
pub(crate) fn decode_answer(
    frame: &FrameBuffer,
    function: FunctionCode,
    header: Header,
    registers: &mut [u16],
) -> Result<(), ModbusRtuError> {
    let quantity = header.value as usize;

    match function {
        FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
            let data = answer_payload(frame, quantity.div_ceil(8))?;
            reserve(registers, quantity.div_ceil(16))?;
            for coil in 0..quantity {
                let on = (data[coil / 8] >> (coil % 8)) & 0x01 != 0;
                write_coil(registers, coil, on);
            }
        }
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            let data = answer_payload(frame, quantity * 2)?;
            reserve(registers, quantity)?;
            for (slot, word) in registers.iter_mut().zip(data.chunks_exact(2)) {
                *slot = u16::from_be_bytes([word[0], word[1]]);
            }
        }
        FunctionCode::WriteSingleCoil
        | FunctionCode::WriteSingleRegister
        | FunctionCode::WriteMultipleCoils
        | FunctionCode::WriteMultipleRegisters => {
            if frame.len() != ECHO_SIZE + 2 {
                return Err(ModbusRtuError::InvalidResponseLength);
            }
            let address = frame.word(ADD_HI)?;
            let value = frame.word(NB_HI)?;
            if address != header.address || value != header.value {
                return Err(ModbusRtuError::EchoMismatch { address, value });
            }
        }
    }
    Ok(())
}

/// Data bytes of a read answer: `[id, fc, byte count, data.., crc, crc]`.
fn answer_payload(frame: &FrameBuffer, expected: usize) -> Result<&[u8], ModbusRtuError> {
    let byte_count = frame.byte(2)? as usize;
    if byte_count != expected || frame.len() != 3 + byte_count + 2 {
        return Err(ModbusRtuError::InvalidResponseLength);
    }
    Ok(&frame.as_slice()[3..3 + byte_count])
}

fn reserve(registers: &[u16], required: usize) -> Result<(), ModbusRtuError> {
    if registers.len() < required {
        return Err(ModbusRtuError::DestinationTooSmall {
            required,
            available: registers.len(),
        });
    }
    Ok(())
}

fn pack_coils(
    frame: &mut FrameBuffer,
    quantity: usize,
    coil: impl Fn(usize) -> bool,
) -> Result<(), ModbusRtuError> {
    for first in (0..quantity).step_by(8) {
        let mut byte = 0u8;
        for bit in 0..(quantity - first).min(8) {
            if coil(first + bit) {
                byte |= 1 << bit;
            }
        }
        frame.push(byte)?;
    }
    Ok(())
}

/// Services a request that passed `validate_request` and leaves the response in `frame`,
/// CRC excluded.
pub(crate) fn process_request(
    frame: &mut FrameBuffer,
    function: FunctionCode,
    table: &mut [u16],
) -> Result<(), ModbusRtuError> {
    let address = frame.word(ADD_HI)? as usize;
    let value = frame.word(NB_HI)?;

    match function {
        FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
            let quantity = value as usize;
            frame.truncate(ADD_HI);
            frame.push(quantity.div_ceil(8) as u8)?;
            let view: &[u16] = table;
            pack_coils(frame, quantity, |i| read_coil(view, address + i))?;
        }
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            let quantity = value as usize;
            frame.truncate(ADD_HI);
            frame.push((quantity * 2) as u8)?;
            for &word in &table[address..address + quantity] {
                frame.push_u16(word)?;
            }
        }
        FunctionCode::WriteSingleCoil => {
            write_coil(table, address, value == COIL_ON);
            frame.truncate(ECHO_SIZE);
        }
        FunctionCode::WriteSingleRegister => {
            table[address] = value;
            frame.truncate(ECHO_SIZE);
        }
        FunctionCode::WriteMultipleCoils => {
            let quantity = value as usize;
            let data = BYTE_CNT + 1;
            for coil in 0..quantity {
                let on = (frame.byte(data + coil / 8)? >> (coil % 8)) & 0x01 != 0;
                write_coil(table, address + coil, on);
            }
            frame.truncate(ECHO_SIZE);
        }
        FunctionCode::WriteMultipleRegisters => {
            let quantity = value as usize;
            let data = BYTE_CNT + 1;
            for i in 0..quantity {
                table[address + i] = frame.word(data + i * 2)?;
            }
            frame.truncate(ECHO_SIZE);
        }
    }
    Ok(())
}

/// Rewrites `frame` into an exception response from slave `id`, CRC excluded.
pub(crate) fn encode_exception(
    frame: &mut FrameBuffer,
    id: u8,
    exception: Exception,
) -> Result<(), ModbusRtuError> {
    let function = frame.byte(FUNC)?;
    frame.clear();
    frame.push(id)?;
    frame.push(function | EXCEPTION_FLAG)?;
    frame.push(exception.code())
}
