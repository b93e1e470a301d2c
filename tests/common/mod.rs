#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::time::Duration;

use modbus_rtu_engine::{Clock, LineDirection, ModbusRtu, SerialConfig, State, Transport};

pub type Engine = ModbusRtu<Endpoint, RecordingDirection, ManualClock>;

/// One side of an in-memory serial line; clones share the same queues.
#[derive(Clone)]
pub struct Endpoint {
    rx: Rc<RefCell<VecDeque<u8>>>,
    tx: Rc<RefCell<VecDeque<u8>>>,
    configured: Rc<Cell<Option<(u32, SerialConfig)>>>,
    broken: Rc<Cell<bool>>,
}

/// Two endpoints wired back to back.
pub fn bus() -> (Endpoint, Endpoint) {
    let a = Rc::new(RefCell::new(VecDeque::new()));
    let b = Rc::new(RefCell::new(VecDeque::new()));
    (
        Endpoint {
            rx: a.clone(),
            tx: b.clone(),
            configured: Rc::new(Cell::new(None)),
            broken: Rc::new(Cell::new(false)),
        },
        Endpoint {
            rx: b,
            tx: a,
            configured: Rc::new(Cell::new(None)),
            broken: Rc::new(Cell::new(false)),
        },
    )
}

impl Endpoint {
    /// Queues `bytes` as if they arrived from the line.
    pub fn inject(&self, bytes: &[u8]) {
        self.rx.borrow_mut().extend(bytes.iter().copied());
    }

    /// Removes and returns everything waiting to be read here.
    pub fn take_pending(&self) -> Vec<u8> {
        self.rx.borrow_mut().drain(..).collect()
    }

    pub fn pending(&self) -> usize {
        self.rx.borrow().len()
    }

    pub fn configured(&self) -> Option<(u32, SerialConfig)> {
        self.configured.get()
    }

    /// Makes every later write from this side fail with `BrokenPipe`.
    pub fn break_writes(&self) {
        self.broken.set(true);
    }
}

impl Read for Endpoint {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut rx = self.rx.borrow_mut();
        let n = buf.len().min(rx.len());
        for (slot, byte) in buf.iter_mut().zip(rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for Endpoint {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.broken.get() {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.tx.borrow_mut().extend(buf.iter().copied());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for Endpoint {
    fn configure(&mut self, baud_rate: u32, config: SerialConfig) -> io::Result<()> {
        self.configured.set(Some((baud_rate, config)));
        Ok(())
    }

    fn available(&mut self) -> io::Result<usize> {
        Ok(self.rx.borrow().len())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Line {
    Receive,
    Transmit,
}

#[derive(Clone, Default)]
pub struct RecordingDirection {
    log: Rc<RefCell<Vec<Line>>>,
}

impl RecordingDirection {
    pub fn transitions(&self) -> Vec<Line> {
        self.log.borrow().clone()
    }
}

impl LineDirection for RecordingDirection {
    fn set_receive(&mut self) {
        self.log.borrow_mut().push(Line::Receive);
    }

    fn set_transmit(&mut self) {
        self.log.borrow_mut().push(Line::Transmit);
    }
}

#[derive(Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn advance(&self, millis: u64) {
        self.now.set(self.now.get() + Duration::from_millis(millis));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

pub struct Harness {
    pub master: Engine,
    pub slave: Engine,
    pub master_line: Endpoint,
    pub slave_line: Endpoint,
    pub master_direction: RecordingDirection,
    pub clock: ManualClock,
}

pub const BAUD_RATE: u32 = 9600;

pub fn engine(id: u8, line: Endpoint, direction: RecordingDirection, clock: ManualClock) -> Engine {
    let mut engine = ModbusRtu::builder()
        .id(id)
        .timeout(1000)
        .build(line, direction, clock)
        .unwrap();
    engine.begin(BAUD_RATE, SerialConfig::default()).unwrap();
    engine
}

/// A master and a slave with address `slave_id` sharing one bus and one clock.
pub fn harness(slave_id: u8) -> Harness {
    let (master_line, slave_line) = bus();
    let clock = ManualClock::default();
    let master_direction = RecordingDirection::default();
    Harness {
        master: engine(0, master_line.clone(), master_direction.clone(), clock.clone()),
        slave: engine(slave_id, slave_line.clone(), RecordingDirection::default(), clock.clone()),
        master_line,
        slave_line,
        master_direction,
        clock,
    }
}

impl Harness {
    /// Drives both engines a millisecond at a time until the master is idle again.
    pub fn run(&mut self, registers: &mut [u16], table: &mut [u16]) -> Result<usize, modbus_rtu_engine::ModbusRtuError> {
        for _ in 0..5000 {
            self.clock.advance(1);
            let _ = self.slave.poll_slave(table);
            let result = self.master.poll(registers);
            if self.master.state() == State::Idle {
                return result;
            }
        }
        panic!("transaction never completed");
    }
}

/// Polls a lone slave until it has handled whatever is on its line.
pub fn serve(slave: &mut Engine, clock: &ManualClock, table: &mut [u16]) -> Result<usize, modbus_rtu_engine::ModbusRtuError> {
    for _ in 0..100 {
        clock.advance(1);
        match slave.poll_slave(table) {
            Ok(0) => continue,
            other => return other,
        }
    }
    Ok(0)
}

/// Polls a lone master until its outstanding query is settled one way or the other.
pub fn settle(master: &mut Engine, clock: &ManualClock, registers: &mut [u16]) -> Result<usize, modbus_rtu_engine::ModbusRtuError> {
    for _ in 0..100 {
        clock.advance(1);
        let result = master.poll(registers);
        if master.state() == State::Idle {
            return result;
        }
    }
    panic!("answer never settled");
}

/// Frame with its CRC appended, low byte first on the wire.
pub fn with_crc(bytes: &[u8]) -> Vec<u8> {
    let crc = modbus_rtu_engine::crc16(bytes);
    let mut frame = bytes.to_vec();
    frame.push((crc >> 8) as u8);
    frame.push(crc as u8);
    frame
}
