use crate::SharedI2c;
use embassy_stm32::i2c;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use mpu6050_attitude::drivers::bus::RegisterBus;
use mpu6050_attitude::drivers::mpu6050::RAW_SAMPLE_LEN;

#[derive(Copy, Clone)]
struct ReadRequest {
    seq: u32,
    address: u8,
    reg: u8,
    len: usize,
}

struct ReadResult {
    seq: u32,
    result: Result<[u8; RAW_SAMPLE_LEN], i2c::Error>,
    len: usize,
}

static READ_REQUEST: Signal<CriticalSectionRawMutex, ReadRequest> = Signal::new();
static READ_RESULT: Signal<CriticalSectionRawMutex, ReadResult> = Signal::new();

#[derive(Copy, Clone, Debug, PartialEq, Eq, defmt::Format)]
pub enum BusError {
    /// The DMA task holds the peripheral
    Busy,
    /// Longer than the transfer buffer
    TooLong(usize),
    I2c(i2c::Error),
}

/// MPU-6050 register access over the shared I2C1 peripheral.
///
/// Register writes and calibration reads are blocking and only succeed while
/// no DMA transfer holds the bus. Sample reads are handed to
/// [`i2c_dma_task`] and collected with `poll_read`.
pub struct SharedI2cBus {
    i2c: &'static SharedI2c,
    address: u8,
    seq: u32,
    in_flight: bool,
}

impl SharedI2cBus {
    pub fn new(i2c: &'static SharedI2c, address: u8) -> Self {
        Self {
            i2c,
            address,
            seq: 0,
            in_flight: false,
        }
    }
}

impl RegisterBus for SharedI2cBus {
    type Error = BusError;

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), BusError> {
        let mut i2c = self.i2c.try_lock().map_err(|_| BusError::Busy)?;
        i2c.blocking_write(self.address, &[reg, value])
            .map_err(BusError::I2c)
    }

    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
        let mut i2c = self.i2c.try_lock().map_err(|_| BusError::Busy)?;
        i2c.blocking_write_read(self.address, &[reg], buf)
            .map_err(BusError::I2c)
    }

    fn start_read(&mut self, reg: u8, len: usize) -> Result<(), BusError> {
        if len > RAW_SAMPLE_LEN {
            return Err(BusError::TooLong(len));
        }
        self.seq = self.seq.wrapping_add(1);
        self.in_flight = true;
        READ_REQUEST.signal(ReadRequest {
            seq: self.seq,
            address: self.address,
            reg,
            len,
        });
        Ok(())
    }

    fn poll_read(&mut self, buf: &mut [u8]) -> nb::Result<usize, BusError> {
        if !self.in_flight {
            return Err(nb::Error::WouldBlock);
        }
        let Some(done) = READ_RESULT.try_take() else {
            return Err(nb::Error::WouldBlock);
        };
        if done.seq != self.seq {
            // left over from a transfer the watchdog gave up on
            return Err(nb::Error::WouldBlock);
        }

        self.in_flight = false;
        let data = done.result.map_err(|e| nb::Error::Other(BusError::I2c(e)))?;
        let n = done.len.min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(done.len)
    }

    fn cancel_read(&mut self) {
        self.in_flight = false;
        READ_REQUEST.reset();
    }
}

/// Runs the sample reads on DMA so the estimator never waits for the bus.
#[embassy_executor::task]
pub async fn i2c_dma_task(i2c: &'static SharedI2c) {
    loop {
        let request = READ_REQUEST.wait().await;
        let mut buffer = [0u8; RAW_SAMPLE_LEN];
        let result = {
            let mut i2c = i2c.lock().await;
            embedded_hal_async::i2c::I2c::write_read(
                &mut *i2c,
                request.address,
                &[request.reg],
                &mut buffer[..request.len],
            )
            .await
        };
        if let Err(e) = result {
            defmt::warn!("[dma] read of {:02x} failed: {}", request.reg, e);
        }
        READ_RESULT.signal(ReadResult {
            seq: request.seq,
            result: result.map(|()| buffer),
            len: request.len,
        });
    }
}
