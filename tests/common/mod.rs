//! Scripted register bus for driving the whole handle on the host.

#![allow(dead_code)]

use embedded_hal::delay::DelayNs;
use mpu6050_attitude::drivers::bus::RegisterBus;
use mpu6050_attitude::drivers::mpu6050::{RAW_SAMPLE_LEN, REG_ACCEL_XOUT_H, REG_WHO_AM_I};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

/// How the next asynchronous read finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Data is available on the first poll after the start
    Immediate,
    /// The transport reports an error
    Fail,
    /// Nothing ever comes back
    Hang,
    /// The transport delivers this many bytes
    Length(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Write { reg: u8, value: u8 },
    Read { reg: u8, len: usize },
    StartRead { reg: u8, len: usize },
    Cancel,
}

pub struct MockBus {
    pub who_am_i: u8,
    /// Served to blocking reads, which is what calibration sees
    pub at_rest: [u8; RAW_SAMPLE_LEN],
    /// When set, blocking read `n` uses `gyro_pattern[n % len]` as its gyro words
    pub gyro_pattern: Vec<[i16; 3]>,
    /// Served to asynchronous reads
    pub sample: [u8; RAW_SAMPLE_LEN],
    pub completion: Completion,
    pub fail_blocking_read_at: Option<usize>,
    pub refuse_start: bool,
    pub transactions: Vec<Transaction>,
    blocking_reads: usize,
    in_flight: bool,
}

impl MockBus {
    pub fn new(sample: [u8; RAW_SAMPLE_LEN]) -> Self {
        Self {
            who_am_i: 0x68,
            at_rest: sample,
            gyro_pattern: Vec::new(),
            sample,
            completion: Completion::Immediate,
            fail_blocking_read_at: None,
            refuse_start: false,
            transactions: Vec::new(),
            blocking_reads: 0,
            in_flight: false,
        }
    }

    pub fn writes(&self) -> Vec<(u8, u8)> {
        self.transactions
            .iter()
            .filter_map(|t| match t {
                Transaction::Write { reg, value } => Some((*reg, *value)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: fn(&Transaction) -> bool) -> usize {
        self.transactions.iter().filter(|t| wanted(t)).count()
    }

    pub fn starts(&self) -> usize {
        self.count(|t| matches!(t, Transaction::StartRead { .. }))
    }

    pub fn cancels(&self) -> usize {
        self.count(|t| matches!(t, Transaction::Cancel))
    }
}

impl RegisterBus for MockBus {
    type Error = MockError;

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), MockError> {
        self.transactions.push(Transaction::Write { reg, value });
        Ok(())
    }

    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), MockError> {
        self.transactions.push(Transaction::Read {
            reg,
            len: buf.len(),
        });
        if reg == REG_WHO_AM_I {
            buf[0] = self.who_am_i;
            return Ok(());
        }

        let n = self.blocking_reads;
        self.blocking_reads += 1;
        if self.fail_blocking_read_at == Some(n) {
            return Err(MockError);
        }

        let mut registers = self.at_rest;
        if !self.gyro_pattern.is_empty() {
            let gyro = self.gyro_pattern[n % self.gyro_pattern.len()];
            for (axis, value) in gyro.iter().enumerate() {
                registers[8 + 2 * axis..10 + 2 * axis].copy_from_slice(&value.to_be_bytes());
            }
        }
        let offset = (reg - REG_ACCEL_XOUT_H) as usize;
        buf.copy_from_slice(&registers[offset..offset + buf.len()]);
        Ok(())
    }

    fn start_read(&mut self, reg: u8, len: usize) -> Result<(), MockError> {
        self.transactions.push(Transaction::StartRead { reg, len });
        if self.refuse_start {
            return Err(MockError);
        }
        self.in_flight = true;
        Ok(())
    }

    fn poll_read(&mut self, buf: &mut [u8]) -> nb::Result<usize, MockError> {
        if !self.in_flight {
            return Err(nb::Error::WouldBlock);
        }
        match self.completion {
            Completion::Hang => Err(nb::Error::WouldBlock),
            Completion::Fail => {
                self.in_flight = false;
                Err(nb::Error::Other(MockError))
            }
            Completion::Immediate => {
                self.in_flight = false;
                buf[..RAW_SAMPLE_LEN].copy_from_slice(&self.sample);
                Ok(RAW_SAMPLE_LEN)
            }
            Completion::Length(len) => {
                self.in_flight = false;
                let n = len.min(RAW_SAMPLE_LEN);
                buf[..n].copy_from_slice(&self.sample[..n]);
                Ok(len)
            }
        }
    }

    fn cancel_read(&mut self) {
        self.transactions.push(Transaction::Cancel);
        self.in_flight = false;
    }
}

/// Adds up requested delays instead of sleeping.
#[derive(Default)]
pub struct RecordingDelay {
    pub total_ns: u64,
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += ns as u64;
    }
}

/// Builds a sample buffer from raw register words.
pub fn sample(accel: [i16; 3], temperature: i16, gyro: [i16; 3]) -> [u8; RAW_SAMPLE_LEN] {
    let mut buf = [0u8; RAW_SAMPLE_LEN];
    let words = [
        accel[0],
        accel[1],
        accel[2],
        temperature,
        gyro[0],
        gyro[1],
        gyro[2],
    ];
    for (i, word) in words.iter().enumerate() {
        buf[2 * i..2 * i + 2].copy_from_slice(&word.to_be_bytes());
    }
    buf
}

/// Level and still at +/-4 g: 1 g on Z.
pub fn level() -> [u8; RAW_SAMPLE_LEN] {
    sample([0, 0, 8192], 0, [0, 0, 0])
}
