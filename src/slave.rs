use log::{debug, trace};

use crate::codec::{encode_exception, process_request};
use crate::delimiter::Delimit;
use crate::modbus_rtu::ModbusRtu;
use crate::transport::{Clock, LineDirection, Transport};
use crate::validate::validate_request;
use crate::ModbusRtuError;

/// id, function, address and quantity/value, then the CRC.
const MIN_REQUEST_SIZE: usize = 8;

impl<T, D, C> ModbusRtu<T, D, C>
where
    T: Transport,
    D: LineDirection,
    C: Clock,
{
    /// Services at most one request against `table`, borrowed for this call only.
    ///
    /// Returns `Ok(0)` when no complete frame addressed to this slave was waiting,
    /// otherwise the size of the response sent. Requests failing validation are
    /// answered with an exception; corrupted frames are dropped without an answer.
    pub fn poll_slave(&mut self, table: &mut [u16]) -> Result<usize, ModbusRtuError> {
        if self.id == 0 {
            return Err(ModbusRtuError::NotSlave);
        }

        let count = match self.observe_line().map_err(|err| self.record_error(err))? {
            Delimit::Complete(count) => count,
            Delimit::Empty | Delimit::Pending => return Ok(0),
        };

        if let Err(err) = self.receive_frame(count) {
            return Err(self.record_error(err));
        }

        let target = self.frame.slave_id()?;
        if target != self.id {
            trace!("slave {} ignoring frame for {}", self.id, target);
            self.frame.clear();
            return Ok(0);
        }
        if self.frame.len() < MIN_REQUEST_SIZE {
            let err = ModbusRtuError::FrameTooShort(self.frame.len());
            self.frame.clear();
            return Err(self.record_error(err));
        }

        let function = match validate_request(&self.frame, table.len()) {
            Ok(function) => function,
            Err(ModbusRtuError::Exception(exception)) => {
                // a failed answer is reported instead of the exception it carried
                let err = match encode_exception(&mut self.frame, self.id, exception)
                    .and_then(|_| self.send_frame())
                {
                    Ok(_) => ModbusRtuError::Exception(exception),
                    Err(err) => err,
                };
                return Err(self.record_error(err));
            }
            Err(err) => {
                self.frame.clear();
                return Err(self.record_error(err));
            }
        };

        self.last_activity = self.clock.now();
        self.last_error = None;

        let answered = process_request(&mut self.frame, function, table).and_then(|_| self.send_frame());
        match answered {
            Ok(size) => {
                debug!("slave {} answered fc {:#04x}, {} bytes", self.id, function.code(), size);
                Ok(size)
            }
            Err(err) => Err(self.record_error(err)),
        }
    }
}
