//! Register bus transport.
//!
//! Configuration writes and calibration reads are synchronous. The periodic
//! sample read is started with [`RegisterBus::start_read`] and its completion
//! is reported through [`RegisterBus::poll_read`], which returns
//! `nb::Error::WouldBlock` while the transfer is still on the wire.

use core::fmt::Debug;

pub trait RegisterBus {
    type Error: Debug;

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Self::Error>;

    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Start a `len` byte read beginning at `reg`. Must not block.
    fn start_read(&mut self, reg: u8, len: usize) -> Result<(), Self::Error>;

    /// Copy the result of the transfer started by `start_read` into `buf`.
    fn poll_read(&mut self, buf: &mut [u8]) -> nb::Result<usize, Self::Error>;

    /// Forget about the transfer in flight; its result must not be delivered.
    fn cancel_read(&mut self) {}
}

/// Blocking transport over any `embedded_hal` I2C bus.
///
/// `start_read` performs the whole transfer at once and `poll_read` hands the
/// bytes over on the next call, so the state machine above still sees the
/// request/complete split.
pub struct I2cBus<I> {
    i2c: I,
    address: u8,
    buffer: [u8; 32],
    pending: Option<Result<usize, embedded_hal::i2c::ErrorKind>>,
}

impl<I: embedded_hal::i2c::I2c> I2cBus<I> {
    pub fn new(i2c: I, address: u8) -> Self {
        Self {
            i2c,
            address,
            buffer: [0; 32],
            pending: None,
        }
    }

    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I: embedded_hal::i2c::I2c> RegisterBus for I2cBus<I> {
    type Error = embedded_hal::i2c::ErrorKind;

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Self::Error> {
        use embedded_hal::i2c::Error;
        self.i2c
            .write(self.address, &[reg, value])
            .map_err(|e| e.kind())
    }

    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        use embedded_hal::i2c::Error;
        self.i2c
            .write_read(self.address, &[reg], buf)
            .map_err(|e| e.kind())
    }

    fn start_read(&mut self, reg: u8, len: usize) -> Result<(), Self::Error> {
        use embedded_hal::i2c::Error;
        if len > self.buffer.len() {
            return Err(embedded_hal::i2c::ErrorKind::Overrun);
        }
        let result = self
            .i2c
            .write_read(self.address, &[reg], &mut self.buffer[..len])
            .map(|_| len)
            .map_err(|e| e.kind());
        self.pending = Some(result);
        Ok(())
    }

    fn poll_read(&mut self, buf: &mut [u8]) -> nb::Result<usize, Self::Error> {
        match self.pending.take() {
            None => Err(nb::Error::WouldBlock),
            Some(Err(e)) => Err(nb::Error::Other(e)),
            Some(Ok(len)) => {
                let n = len.min(buf.len());
                buf[..n].copy_from_slice(&self.buffer[..n]);
                Ok(len)
            }
        }
    }

    fn cancel_read(&mut self) {
        self.pending = None;
    }
}
