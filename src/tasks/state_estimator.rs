use crate::tasks::i2c_dma::SharedI2cBus;
use crate::SharedI2c;
use embassy_time::{Delay, Instant, Ticker};
use mpu6050_attitude::drivers::mpu6050;
use mpu6050_attitude::{Imu, ImuConfig};

#[embassy_executor::task]
pub async fn state_estimator_task(i2c: &'static SharedI2c) {
    let config = ImuConfig::default();
    let bus = SharedI2cBus::new(i2c, mpu6050::DEFAULT_ADDRESS);
    let mut imu = Imu::new(bus, config);

    // Blocks the executor for about a second. Nothing else needs it yet.
    if let Err(e) = imu.initialize(&mut Delay) {
        defmt::error!("IMU initialization failed: {}", e);
        panic!("IMU initialization failed");
    }

    let mut ticker = Ticker::every(config.nominal_period);
    let mut counter: u32 = 0;

    loop {
        ticker.next().await;
        let Some(ahrs) = imu.poll(Instant::now()) else {
            continue;
        };

        counter += 1;
        if counter % 1000 == 0 {
            let stats = imu.stats();
            defmt::info!(
                "roll: {}, pitch: {}, yaw: {}",
                ahrs.angles.roll.to_degrees(),
                ahrs.angles.pitch.to_degrees(),
                ahrs.angles.yaw.to_degrees()
            );
            defmt::info!(
                "    reads ok: {}, failed: {}, timed out: {}",
                stats.completed,
                stats.failed,
                stats.timed_out
            );
            if ahrs.singular {
                defmt::warn!("pitch at the kinematic singularity");
            }
        }
    }
}
