//! In-memory register bus for unit tests

use super::{BusInterface, RegisterBus, SelectLine};
use crate::error::{ImuError, Result};
use crate::registers::Register;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Mock bus with a register file and a FIFO byte stream
///
/// Clones share state, so a test can keep a handle after moving the bus
/// into a device.
#[derive(Clone)]
pub struct MockBus {
    inner: Arc<Mutex<MockBusInner>>,
}

struct MockBusInner {
    registers: [u8; 128],
    fifo: VecDeque<u8>,
    /// Overrides the FIFO_COUNT registers when set (byte count)
    reported_fifo_bytes: Option<u16>,
    writes: Vec<(Register, u8)>,
    single_reads: usize,
    bulk_reads: usize,
    bulk: bool,
    interface: BusInterface,
    fail: bool,
}

impl MockBus {
    pub fn new() -> Self {
        MockBus {
            inner: Arc::new(Mutex::new(MockBusInner {
                registers: [0; 128],
                fifo: VecDeque::new(),
                reported_fifo_bytes: None,
                writes: Vec::new(),
                single_reads: 0,
                bulk_reads: 0,
                bulk: true,
                interface: BusInterface::Spi,
                fail: false,
            })),
        }
    }

    /// Behave like a select-line I2C bus without burst reads
    pub fn without_bulk(self) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.bulk = false;
            inner.interface = BusInterface::I2c;
        }
        self
    }

    pub fn set_register(&self, register: Register, value: u8) {
        self.inner.lock().unwrap().registers[register.addr() as usize] = value;
    }

    pub fn register(&self, register: Register) -> u8 {
        self.inner.lock().unwrap().registers[register.addr() as usize]
    }

    /// Append bytes to the FIFO stream
    pub fn push_fifo(&self, bytes: &[u8]) {
        self.inner.lock().unwrap().fifo.extend(bytes);
    }

    /// Append big-endian 16-bit words to the FIFO stream
    pub fn push_fifo_words(&self, words: &[i16]) {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        self.push_fifo(&bytes);
    }

    /// Force the byte count the FIFO_COUNT registers report
    pub fn report_fifo_bytes(&self, bytes: u16) {
        self.inner.lock().unwrap().reported_fifo_bytes = Some(bytes);
    }

    pub fn fifo_len(&self) -> usize {
        self.inner.lock().unwrap().fifo.len()
    }

    pub fn writes(&self) -> Vec<(Register, u8)> {
        self.inner.lock().unwrap().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.inner.lock().unwrap().writes.clear();
    }

    pub fn single_reads(&self) -> usize {
        self.inner.lock().unwrap().single_reads
    }

    pub fn bulk_reads(&self) -> usize {
        self.inner.lock().unwrap().bulk_reads
    }

    /// Total bus transactions so far
    pub fn operations(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.single_reads + inner.bulk_reads + inner.writes.len()
    }

    /// Make every following transaction fail
    pub fn set_failing(&self, fail: bool) {
        self.inner.lock().unwrap().fail = fail;
    }
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBusInner {
    fn fifo_count_bytes(&self) -> u16 {
        self.reported_fifo_bytes.unwrap_or(self.fifo.len() as u16)
    }

    fn check(&self) -> Result<()> {
        if self.fail {
            Err(ImuError::Bus("mock bus failure".into()))
        } else {
            Ok(())
        }
    }
}

impl RegisterBus for MockBus {
    fn read(&mut self, register: Register) -> Result<u8> {
        let mut inner = self.inner.lock().unwrap();
        inner.check()?;
        inner.single_reads += 1;
        let value = match register {
            Register::FifoCountH => (inner.fifo_count_bytes() >> 8) as u8,
            Register::FifoCountL => (inner.fifo_count_bytes() & 0xFF) as u8,
            Register::FifoRw => inner.fifo.pop_front().unwrap_or(0),
            other => inner.registers[other.addr() as usize],
        };
        Ok(value)
    }

    fn write(&mut self, register: Register, value: u8) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.check()?;
        inner.writes.push((register, value));
        inner.registers[register.addr() as usize] = value;
        Ok(())
    }

    fn bulk_read(&mut self, register: Register, count: usize) -> Result<Vec<u8>> {
        if !self.inner.lock().unwrap().bulk {
            return (0..count).map(|_| self.read(register)).collect();
        }
        let mut inner = self.inner.lock().unwrap();
        inner.check()?;
        inner.bulk_reads += 1;
        let bytes = if register == Register::FifoRw {
            (0..count).map(|_| inner.fifo.pop_front().unwrap_or(0)).collect()
        } else {
            let start = register.addr() as usize;
            (0..count).map(|i| inner.registers[(start + i) % 128]).collect()
        };
        Ok(bytes)
    }

    fn interface(&self) -> BusInterface {
        self.inner.lock().unwrap().interface
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectEvent {
    Assert,
    Transfer,
    Deassert,
}

/// Select line that records its transitions
#[derive(Default)]
pub struct RecordingSelect {
    events: Arc<Mutex<Vec<SelectEvent>>>,
}

impl RecordingSelect {
    /// Shared event log, for interleaving transfer markers
    pub fn events(&self) -> Arc<Mutex<Vec<SelectEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn recorded(&self) -> Vec<SelectEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl SelectLine for RecordingSelect {
    fn assert_line(&mut self) -> Result<()> {
        self.events.lock().unwrap().push(SelectEvent::Assert);
        Ok(())
    }

    fn deassert_line(&mut self) -> Result<()> {
        self.events.lock().unwrap().push(SelectEvent::Deassert);
        Ok(())
    }
}
