use log::debug;

use crate::codec::{Header, decode_answer, encode_query};
use crate::core::{EXCEPTION_FLAG, FunctionCode, MAX_SLAVE_ID, Query};
use crate::delimiter::Delimit;
use crate::modbus_rtu::{ModbusRtu, State};
use crate::transport::{Clock, LineDirection, Transport};
use crate::validate::classify_answer;
use crate::ModbusRtuError;

/// Smallest answer on the wire: an exception frame.
const MIN_ANSWER_SIZE: usize = 5;

/// What the outstanding query expects back.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Pending {
    slave_id: u8,
    function: FunctionCode,
    header: Header,
}

impl<T, D, C> ModbusRtu<T, D, C>
where
    T: Transport,
    D: LineDirection,
    C: Clock,
{
    /// Sends `query` and moves to [`State::Waiting`].
    ///
    /// Refused without touching the bus when this engine is a slave, a query is already
    /// outstanding, or the target id is outside 1..=247.
    pub fn query(&mut self, query: &Query) -> Result<(), ModbusRtuError> {
        if self.id != 0 {
            return Err(ModbusRtuError::NotMaster);
        }
        if self.state != State::Idle {
            return Err(ModbusRtuError::Busy);
        }
        let slave_id = query.slave_id();
        if slave_id == 0 || slave_id > MAX_SLAVE_ID {
            return Err(ModbusRtuError::InvalidSlaveId(slave_id));
        }

        if let Err(err) = self.transmit_query(query) {
            return Err(self.record_error(err));
        }

        self.pending = Some(Pending {
            slave_id,
            function: query.function(),
            header: Header::of(query),
        });
        self.state = State::Waiting;
        debug!(
            "query sent to slave {}: fc {:#04x} address {} quantity {}",
            slave_id,
            query.function().code(),
            query.address(),
            query.quantity()
        );
        Ok(())
    }

    fn transmit_query(&mut self, query: &Query) -> Result<(), ModbusRtuError> {
        self.discard_input()?;
        self.delimiter.reset();
        encode_query(&mut self.frame, query)?;
        self.send_frame()?;
        Ok(())
    }

    /// Advances the outstanding transaction; call repeatedly while [`State::Waiting`].
    ///
    /// Read answers are decoded into `registers`, which is only borrowed for this call.
    /// Returns `Ok(0)` while the answer is still due, or the size of the answer frame
    /// once it was processed. Either way the engine is back in [`State::Idle`] after a
    /// non-zero result or an error.
    pub fn poll(&mut self, registers: &mut [u16]) -> Result<usize, ModbusRtuError> {
        let pending = match (self.state, self.pending) {
            (State::Waiting, Some(pending)) => pending,
            _ => return Ok(0),
        };

        let delimit = match self.observe_line() {
            Ok(delimit) => delimit,
            Err(err) => return Err(self.abandon(err)),
        };

        match delimit {
            Delimit::Empty if self.elapsed_since_activity() > self.timeout => {
                Err(self.abandon(ModbusRtuError::NoReply))
            }
            Delimit::Empty | Delimit::Pending => Ok(0),
            Delimit::Complete(count) => match self.process_answer(count, pending, registers) {
                Ok(size) => {
                    self.state = State::Idle;
                    self.pending = None;
                    self.last_error = None;
                    debug!("answer from slave {} processed, {} bytes", pending.slave_id, size);
                    Ok(size)
                }
                Err(err) => Err(self.abandon(err)),
            },
        }
    }

    fn process_answer(
        &mut self,
        count: usize,
        pending: Pending,
        registers: &mut [u16],
    ) -> Result<usize, ModbusRtuError> {
        self.receive_frame(count)?;
        if self.frame.len() < MIN_ANSWER_SIZE {
            return Err(ModbusRtuError::FrameTooShort(self.frame.len()));
        }

        self.frame.check_crc()?;
        // exceptions from another slave or for another function are not ours to surface
        let id = self.frame.slave_id()?;
        let fc = self.frame.function()?;
        if id != pending.slave_id || fc & !EXCEPTION_FLAG != pending.function.code() {
            return Err(ModbusRtuError::UnexpectedReply {
                expected_id: pending.slave_id,
                expected_fc: pending.function.code(),
                id,
                fc,
            });
        }

        let function = classify_answer(&self.frame)?;
        decode_answer(&self.frame, function, pending.header, registers)?;
        Ok(self.frame.len())
    }

    /// Ends the outstanding transaction with `err`.
    fn abandon(&mut self, err: ModbusRtuError) -> ModbusRtuError {
        self.state = State::Idle;
        self.pending = None;
        self.frame.clear();
        self.record_error(err)
    }
}
