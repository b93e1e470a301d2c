use crate::ModbusRtuError;

/// Highest address a slave may be given on the bus.
pub const MAX_SLAVE_ID: u8 = 247;

/// Set on the function code of an exception response.
pub const EXCEPTION_FLAG: u8 = 0x80;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FunctionCode {
    ReadCoils,
    ReadDiscreteInputs,
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteSingleCoil,
    WriteSingleRegister,
    WriteMultipleCoils,
    WriteMultipleRegisters,
}

impl FunctionCode {
    pub fn code(self) -> u8 {
        match self {
            FunctionCode::ReadCoils => 0x01,
            FunctionCode::ReadDiscreteInputs => 0x02,
            FunctionCode::ReadHoldingRegisters => 0x03,
            FunctionCode::ReadInputRegisters => 0x04,
            FunctionCode::WriteSingleCoil => 0x05,
            FunctionCode::WriteSingleRegister => 0x06,
            FunctionCode::WriteMultipleCoils => 0x0F,
            FunctionCode::WriteMultipleRegisters => 0x10,
        }
    }

    /// Coil-oriented codes address single bits, 16 per register word.
    pub fn is_coil(self) -> bool {
        matches!(
            self,
            FunctionCode::ReadCoils
                | FunctionCode::ReadDiscreteInputs
                | FunctionCode::WriteSingleCoil
                | FunctionCode::WriteMultipleCoils
        )
    }

    pub fn is_read(self) -> bool {
        matches!(
            self,
            FunctionCode::ReadCoils
                | FunctionCode::ReadDiscreteInputs
                | FunctionCode::ReadHoldingRegisters
                | FunctionCode::ReadInputRegisters
        )
    }

    /// Quantity limits accepted for this code, bounded by what fits in one frame.
    pub(crate) fn quantity_limit(self) -> u16 {
        match self {
            FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => 2000,
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => 125,
            FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister => 1,
            FunctionCode::WriteMultipleCoils => 1968,
            FunctionCode::WriteMultipleRegisters => 123,
        }
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = ModbusRtuError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x01 => Ok(FunctionCode::ReadCoils),
            0x02 => Ok(FunctionCode::ReadDiscreteInputs),
            0x03 => Ok(FunctionCode::ReadHoldingRegisters),
            0x04 => Ok(FunctionCode::ReadInputRegisters),
            0x05 => Ok(FunctionCode::WriteSingleCoil),
            0x06 => Ok(FunctionCode::WriteSingleRegister),
            0x0F => Ok(FunctionCode::WriteMultipleCoils),
            0x10 => Ok(FunctionCode::WriteMultipleRegisters),
            other => Err(ModbusRtuError::UnsupportedFunction(other)),
        }
    }
}

/// Exception codes a slave answers with. Codes received from remote slaves are kept
/// verbatim in [`ModbusRtuError::RemoteException`](crate::ModbusRtuError::RemoteException).
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Exception {
    #[error("illegal function")]
    IllegalFunction,

    #[error("illegal data address")]
    IllegalDataAddress,

    #[error("illegal data value")]
    IllegalDataValue,
}

impl Exception {
    pub fn code(self) -> u8 {
        match self {
            Exception::IllegalFunction => 0x01,
            Exception::IllegalDataAddress => 0x02,
            Exception::IllegalDataValue => 0x03,
        }
    }
}

/// One master transaction: target slave, function and the data window it covers.
///
/// `registers` holds the values to write for write codes (coils packed 16 per word,
/// bit-indexed from the start address). Read codes ignore it; their answer lands in the
/// slice handed to [`ModbusRtu::poll`](crate::ModbusRtu::poll).
#[derive(Clone, Debug)]
pub struct Query<'a> {
    slave_id: u8,
    function: FunctionCode,
    address: u16,
    quantity: u16,
    registers: &'a [u16],
}

pub struct QueryBuilder<'a> {
    slave_id: Option<u8>,
    function: Option<FunctionCode>,
    address: u16,
    quantity: Option<u16>,
    registers: &'a [u16],
}

impl<'a> QueryBuilder<'a> {
    pub fn slave_id(mut self, slave_id: u8) -> Self {
        self.slave_id = Some(slave_id);
        self
    }

    pub fn function(mut self, function: FunctionCode) -> Self {
        self.function = Some(function);
        self
    }

    pub fn address(mut self, address: u16) -> Self {
        self.address = address;
        self
    }

    pub fn quantity(mut self, quantity: u16) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn registers(mut self, registers: &'a [u16]) -> Self {
        self.registers = registers;
        self
    }

    pub fn build(self) -> Result<Query<'a>, ModbusRtuError> {
        // the id range is enforced by the engine when the query is issued
        let slave_id = self.slave_id.ok_or(ModbusRtuError::InvalidSlaveId(0))?;
        let function = self
            .function
            .ok_or(ModbusRtuError::UnsupportedFunction(0))?;

        let quantity = match function {
            FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister => 1,
            _ => self.quantity.unwrap_or(1),
        };
        if quantity == 0 || quantity > function.quantity_limit() {
            return Err(ModbusRtuError::InvalidQuantity {
                function: function.code(),
                quantity,
            });
        }
        if self.address as u32 + quantity as u32 > 0x1_0000 {
            return Err(ModbusRtuError::InvalidAddressRange(self.address, quantity));
        }

        let required = match function {
            FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister => 1,
            FunctionCode::WriteMultipleCoils => quantity.div_ceil(16) as usize,
            FunctionCode::WriteMultipleRegisters => quantity as usize,
            _ => 0,
        };
        if self.registers.len() < required {
            return Err(ModbusRtuError::MissingRegisters {
                required,
                available: self.registers.len(),
            });
        }

        Ok(Query {
            slave_id,
            function,
            address: self.address,
            quantity,
            registers: self.registers,
        })
    }
}

impl<'a> Query<'a> {
    pub fn builder() -> QueryBuilder<'a> {
        QueryBuilder {
            slave_id: None,
            function: None,
            address: 0,
            quantity: None,
            registers: &[],
        }
    }

    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    pub fn function(&self) -> FunctionCode {
        self.function
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn quantity(&self) -> u16 {
        self.quantity
    }

    pub fn registers(&self) -> &'a [u16] {
        self.registers
    }

    /// Register words the answer to this query occupies in the destination slice.
    pub fn answer_words(&self) -> usize {
        match self.function {
            FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
                self.quantity.div_ceil(16) as usize
            }
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
                self.quantity as usize
            }
            _ => 0,
        }
    }
}

/// Reads coil `coil` from a register table holding 16 coils per word.
///
/// # Panics
/// If `coil / 16` is outside `table`.
pub fn read_coil(table: &[u16], coil: usize) -> bool {
    (table[coil / 16] >> (coil % 16)) & 0x01 != 0
}

/// Writes coil `coil` into a register table holding 16 coils per word.
///
/// # Panics
/// If `coil / 16` is outside `table`.
pub fn write_coil(table: &mut [u16], coil: usize, on: bool) {
    let mask = 1u16 << (coil % 16);
    if on {
        table[coil / 16] |= mask;
    } else {
        table[coil / 16] &= !mask;
    }
}
