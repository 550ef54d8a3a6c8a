#![no_main]
#![no_std]
//#![deny(warnings)]
#![deny(unsafe_code)]

mod tasks;

use defmt::unwrap;
use embassy_executor::Spawner;
use embassy_stm32::i2c::{self, I2c};
use embassy_stm32::mode::Async;
use embassy_stm32::time::Hertz;
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    I2C1_EV => i2c::EventInterruptHandler<peripherals::I2C1>;
    I2C1_ER => i2c::ErrorInterruptHandler<peripherals::I2C1>;
});

/// I2C1, shared between the blocking register accesses and the DMA task.
pub type SharedI2c = Mutex<CriticalSectionRawMutex, I2c<'static, Async>>;

static I2C1_BUS: StaticCell<SharedI2c> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_stm32::init(Default::default());
    defmt::info!("init");

    // MPU-6050 on PB8 (SCL) / PB9 (SDA)
    let i2c = I2c::new(
        p.I2C1,
        p.PB8,
        p.PB9,
        Irqs,
        p.DMA1_CH1,
        p.DMA1_CH2,
        Hertz(400_000),
        Default::default(),
    );
    let i2c: &'static SharedI2c = I2C1_BUS.init(Mutex::new(i2c));

    unwrap!(spawner.spawn(tasks::i2c_dma_task(i2c)));
    unwrap!(spawner.spawn(tasks::state_estimator_task(i2c)));
}
