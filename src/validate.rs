use crate::core::{EXCEPTION_FLAG, Exception, FunctionCode};
use crate::frame::{ADD_HI, BYTE_CNT, FrameBuffer, NB_HI};
use crate::ModbusRtuError;

/// Checks a slave's answer held in `frame`: CRC, exception flag, supported function.
///
/// A remote exception is surfaced with the code byte exactly as received.
pub fn validate_answer(frame: &FrameBuffer) -> Result<FunctionCode, ModbusRtuError> {
    frame.check_crc()?;
    classify_answer(frame)
}

/// Exception flag and function support of an answer whose CRC already checked out.
pub(crate) fn classify_answer(frame: &FrameBuffer) -> Result<FunctionCode, ModbusRtuError> {
    let function = frame.function()?;
    if function & EXCEPTION_FLAG != 0 {
        return Err(ModbusRtuError::RemoteException {
            function: function & !EXCEPTION_FLAG,
            code: frame.byte(2)?,
        });
    }

    FunctionCode::try_from(function)
}

/// Checks a master's request held in `frame` against a register table of `table_len` words.
///
/// Coil codes address 16 coils per table word. CRC failures come back as
/// [`ModbusRtuError::BadCrc`] and must not be answered; everything else is an
/// [`Exception`] to send back.
pub fn validate_request(frame: &FrameBuffer, table_len: usize) -> Result<FunctionCode, ModbusRtuError> {
    frame.check_crc()?;

    let function = FunctionCode::try_from(frame.function()?)
        .map_err(|_| Exception::IllegalFunction)?;

    let address = frame.word(ADD_HI)? as u32;
    let words = table_len as u32;
    let coils = words * 16;

    match function {
        FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
            let quantity = check_quantity(frame, function)?;
            check_end(address + quantity, coils)?;
        }
        FunctionCode::WriteMultipleCoils => {
            let quantity = check_quantity(frame, function)?;
            check_byte_count(frame, quantity.div_ceil(8))?;
            check_end(address + quantity, coils)?;
        }
        FunctionCode::WriteSingleCoil => {
            if !matches!(frame.word(NB_HI)?, 0xFF00 | 0x0000) {
                return Err(Exception::IllegalDataValue.into());
            }
            check_end(address + 1, coils)?;
        }
        FunctionCode::WriteSingleRegister => {
            check_end(address + 1, words)?;
        }
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            let quantity = check_quantity(frame, function)?;
            check_end(address + quantity, words)?;
        }
        FunctionCode::WriteMultipleRegisters => {
            let quantity = check_quantity(frame, function)?;
            check_byte_count(frame, quantity * 2)?;
            check_end(address + quantity, words)?;
        }
    }

    Ok(function)
}

fn check_quantity(frame: &FrameBuffer, function: FunctionCode) -> Result<u32, ModbusRtuError> {
    let quantity = frame.word(NB_HI)?;
    if quantity == 0 || quantity > function.quantity_limit() {
        return Err(Exception::IllegalDataValue.into());
    }
    Ok(quantity as u32)
}

/// The byte-count field must match the quantity and the bytes actually received.
fn check_byte_count(frame: &FrameBuffer, expected: u32) -> Result<(), ModbusRtuError> {
    let byte_count = frame.byte(BYTE_CNT)? as u32;
    let payload = frame.len().saturating_sub(BYTE_CNT + 1 + 2) as u32;
    if byte_count != expected || payload != expected {
        return Err(Exception::IllegalDataValue.into());
    }
    Ok(())
}

fn check_end(end: u32, limit: u32) -> Result<(), ModbusRtuError> {
    if end > limit {
        return Err(Exception::IllegalDataAddress.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn frame(bytes: &[u8]) -> FrameBuffer {
        let mut frame = FrameBuffer::new();
        frame.extend_from_slice(bytes).unwrap();
        frame.append_crc().unwrap();
        frame
    }

    #[test]
    fn test_answer_ok() {
        let answer = frame(&[0x01, 0x03, 0x02, 0x00, 0x2A]);
        assert_eq!(validate_answer(&answer).unwrap(), FunctionCode::ReadHoldingRegisters);
    }

    #[test]
    fn test_answer_bad_crc() {
        let mut answer = frame(&[0x01, 0x03, 0x02, 0x00, 0x2A]);
        let len = answer.len();
        answer.truncate(len - 1);
        answer.push(0x00).unwrap();
        assert!(matches!(validate_answer(&answer), Err(ModbusRtuError::BadCrc { .. })));
    }

    #[test]
    fn test_answer_remote_exception() {
        let answer = frame(&[0x01, 0x83, 0x02]);
        assert!(matches!(
            validate_answer(&answer),
            Err(ModbusRtuError::RemoteException { function: 0x03, code: 0x02 })
        ));
    }

    #[test]
    fn test_answer_unsupported_function() {
        let answer = frame(&[0x01, 0x2B, 0x00]);
        assert!(matches!(
            validate_answer(&answer),
            Err(ModbusRtuError::UnsupportedFunction(0x2B))
        ));
    }

    #[test]
    fn test_request_unsupported_function() {
        let request = frame(&[0x01, 0x08, 0x00, 0x00, 0x00, 0x01]);
        assert!(matches!(
            validate_request(&request, 10),
            Err(ModbusRtuError::Exception(Exception::IllegalFunction))
        ));
    }

    #[test]
    fn test_request_bad_crc_is_not_an_exception() {
        let mut request = frame(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]);
        request.truncate(6);
        request.extend_from_slice(&[0xDE, 0xAD]).unwrap();
        assert!(matches!(validate_request(&request, 10), Err(ModbusRtuError::BadCrc { .. })));
    }

    #[rstest]
    // read registers: last word is index 9
    #[case(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A], Ok(FunctionCode::ReadHoldingRegisters))]
    #[case(&[0x01, 0x04, 0x00, 0x01, 0x00, 0x0A], Err(Exception::IllegalDataAddress))]
    #[case(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x00], Err(Exception::IllegalDataValue))]
    #[case(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x7E], Err(Exception::IllegalDataValue))]
    // 10 words hold 160 coils
    #[case(&[0x01, 0x01, 0x00, 0x00, 0x00, 0xA0], Ok(FunctionCode::ReadCoils))]
    #[case(&[0x01, 0x02, 0x00, 0x90, 0x00, 0x11], Err(Exception::IllegalDataAddress))]
    #[case(&[0x01, 0x05, 0x00, 0x9F, 0xFF, 0x00], Ok(FunctionCode::WriteSingleCoil))]
    #[case(&[0x01, 0x05, 0x00, 0xA0, 0xFF, 0x00], Err(Exception::IllegalDataAddress))]
    #[case(&[0x01, 0x05, 0x00, 0x00, 0x12, 0x34], Err(Exception::IllegalDataValue))]
    #[case(&[0x01, 0x06, 0x00, 0x09, 0x00, 0x01], Ok(FunctionCode::WriteSingleRegister))]
    #[case(&[0x01, 0x06, 0x00, 0x0A, 0x00, 0x01], Err(Exception::IllegalDataAddress))]
    #[case(&[0x01, 0x10, 0x00, 0x08, 0x00, 0x02, 0x04, 0x00, 0x01, 0x00, 0x02], Ok(FunctionCode::WriteMultipleRegisters))]
    #[case(&[0x01, 0x10, 0x00, 0x09, 0x00, 0x02, 0x04, 0x00, 0x01, 0x00, 0x02], Err(Exception::IllegalDataAddress))]
    #[case(&[0x01, 0x10, 0x00, 0x00, 0x00, 0x02, 0x02, 0x00, 0x01], Err(Exception::IllegalDataValue))]
    #[case(&[0x01, 0x0F, 0x00, 0x98, 0x00, 0x08, 0x01, 0xFF], Ok(FunctionCode::WriteMultipleCoils))]
    #[case(&[0x01, 0x0F, 0x00, 0x99, 0x00, 0x08, 0x01, 0xFF], Err(Exception::IllegalDataAddress))]
    #[case(&[0x01, 0x0F, 0x00, 0x00, 0x00, 0x09, 0x01, 0xFF], Err(Exception::IllegalDataValue))]
    fn test_request_ranges(#[case] bytes: &[u8], #[case] expected: Result<FunctionCode, Exception>) {
        let request = frame(bytes);
        let result = validate_request(&request, 10);
        match expected {
            Ok(function) => assert_eq!(result.unwrap(), function),
            Err(exception) => assert_eq!(result, Err(ModbusRtuError::Exception(exception))),
        }
    }
}
