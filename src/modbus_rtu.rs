use std::time::Duration;

use log::{debug, trace, warn};

use crate::core::MAX_SLAVE_ID;
use crate::delimiter::{Delimit, FrameDelimiter, silence_interval};
use crate::frame::FrameBuffer;
use crate::master::Pending;
use crate::transport::{Clock, LineDirection, SerialConfig, Transport};
use crate::ModbusRtuError;

pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

const DEFAULT_BAUD_RATE: u32 = 9600;

/// Master transaction state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    Waiting,
}

pub struct ModbusRtuBuilder {
    id: Option<u8>,
    timeout_ms: Option<u64>,
}

impl ModbusRtuBuilder {
    /// 0 makes the engine a master, 1..=247 a slave answering to that address.
    pub fn id(mut self, id: u8) -> Self {
        self.id = Some(id);
        self
    }

    pub fn timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn build<T, D, C>(self, transport: T, direction: D, clock: C) -> Result<ModbusRtu<T, D, C>, ModbusRtuError>
    where
        T: Transport,
        D: LineDirection,
        C: Clock,
    {
        let id = self.id.unwrap_or(0);
        if id > MAX_SLAVE_ID {
            return Err(ModbusRtuError::InvalidSlaveId(id));
        }
        let timeout = Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));
        let now = clock.now();

        Ok(ModbusRtu {
            transport,
            direction,
            clock,
            id,
            timeout,
            state: State::Idle,
            frame: FrameBuffer::new(),
            delimiter: FrameDelimiter::new(silence_interval(DEFAULT_BAUD_RATE, SerialConfig::default())),
            pending: None,
            last_activity: now,
            in_count: 0,
            out_count: 0,
            err_count: 0,
            last_error: None,
        })
    }
}

/// Modbus RTU protocol engine, master (id 0) or slave (id 1..=247).
///
/// Nothing here blocks for the length of a frame: the host calls [`poll`](Self::poll)
/// (master) or [`poll_slave`](Self::poll_slave) from its own loop, and frame assembly
/// carries over between calls. Register tables are borrowed per call and never kept.
pub struct ModbusRtu<T, D, C> {
    pub(crate) transport: T,
    pub(crate) direction: D,
    pub(crate) clock: C,
    pub(crate) id: u8,
    pub(crate) timeout: Duration,
    pub(crate) state: State,
    pub(crate) frame: FrameBuffer,
    pub(crate) delimiter: FrameDelimiter,
    pub(crate) pending: Option<Pending>,
    pub(crate) last_activity: Duration,
    in_count: u16,
    out_count: u16,
    err_count: u16,
    pub(crate) last_error: Option<ModbusRtuError>,
}

impl ModbusRtu<(), (), ()> {
    pub fn builder() -> ModbusRtuBuilder {
        ModbusRtuBuilder {
            id: None,
            timeout_ms: None,
        }
    }
}

impl<T, D, C> ModbusRtu<T, D, C>
where
    T: Transport,
    D: LineDirection,
    C: Clock,
{
    /// Configures the port, puts the line in receive mode and starts from clean counters.
    pub fn begin(&mut self, baud_rate: u32, config: SerialConfig) -> Result<(), ModbusRtuError> {
        self.transport.configure(baud_rate, config)?;
        self.delimiter.set_silence(silence_interval(baud_rate, config));
        self.direction.set_receive();
        self.discard_input()?;

        self.frame.clear();
        self.delimiter.reset();
        self.state = State::Idle;
        self.pending = None;
        self.in_count = 0;
        self.out_count = 0;
        self.err_count = 0;
        self.last_error = None;
        self.last_activity = self.clock.now();
        debug!(
            "modbus rtu id {} started at {} baud, frame silence {:?}",
            self.id,
            baud_rate,
            self.delimiter.silence()
        );
        Ok(())
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    /// Changes the slave address; anything outside 1..=247 is ignored.
    pub fn set_id(&mut self, id: u8) {
        if (1..=MAX_SLAVE_ID).contains(&id) {
            self.id = id;
        }
    }

    pub fn timeout(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    pub fn set_timeout(&mut self, timeout_ms: u64) {
        self.timeout = Duration::from_millis(timeout_ms);
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn last_error(&self) -> Option<ModbusRtuError> {
        self.last_error
    }

    pub fn in_count(&self) -> u16 {
        self.in_count
    }

    pub fn out_count(&self) -> u16 {
        self.out_count
    }

    pub fn err_count(&self) -> u16 {
        self.err_count
    }

    /// Communication watchdog: true once `timeout` passed without a valid exchange.
    pub fn timeout_state(&self) -> bool {
        self.elapsed_since_activity() > self.timeout
    }

    pub(crate) fn elapsed_since_activity(&self) -> Duration {
        self.clock.now().saturating_sub(self.last_activity)
    }

    pub(crate) fn observe_line(&mut self) -> Result<Delimit, ModbusRtuError> {
        let available = self.transport.available()?;
        Ok(self.delimiter.observe(available, self.clock.now()))
    }

    /// Counts `err` and makes it the last error.
    pub(crate) fn record_error(&mut self, err: ModbusRtuError) -> ModbusRtuError {
        self.err_count = self.err_count.wrapping_add(1);
        self.last_error = Some(err);
        warn!("modbus rtu id {}: {}", self.id, err);
        err
    }

    pub(crate) fn discard_input(&mut self) -> Result<(), ModbusRtuError> {
        let mut scratch = [0u8; 64];
        while self.transport.available()? > 0 {
            if self.transport.read(&mut scratch)? == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Moves `count` waiting bytes into the frame buffer.
    ///
    /// A frame longer than the buffer is drained from the line and dropped whole.
    pub(crate) fn receive_frame(&mut self, count: usize) -> Result<(), ModbusRtuError> {
        self.direction.set_receive();
        self.frame.clear();

        let mut chunk = [0u8; 64];
        let mut remaining = count;
        let mut overflow = false;
        while remaining > 0 {
            let want = remaining.min(chunk.len());
            let read = self.transport.read(&mut chunk[..want])?;
            if read == 0 {
                break;
            }
            remaining -= read;
            if !overflow && self.frame.extend_from_slice(&chunk[..read]).is_err() {
                overflow = true;
            }
        }
        self.in_count = self.in_count.wrapping_add(1);

        if overflow {
            self.frame.clear();
            return Err(ModbusRtuError::BufferOverflow);
        }
        trace!("modbus rtu id {} rx {:02X?}", self.id, self.frame.as_slice());
        Ok(())
    }

    /// Appends the CRC and puts the frame on the wire.
    ///
    /// Returns the bytes sent. The line is back in receive mode afterwards, even when
    /// the transport failed.
    pub(crate) fn send_frame(&mut self) -> Result<usize, ModbusRtuError> {
        self.frame.append_crc()?;
        trace!("modbus rtu id {} tx {:02X?}", self.id, self.frame.as_slice());

        self.direction.set_transmit();
        let written = self
            .transport
            .write_all(self.frame.as_slice())
            .and_then(|_| self.transport.flush());
        self.direction.set_receive();
        written?;

        let sent = self.frame.len();
        self.frame.clear();
        self.last_activity = self.clock.now();
        self.out_count = self.out_count.wrapping_add(1);
        Ok(sent)
    }
}
