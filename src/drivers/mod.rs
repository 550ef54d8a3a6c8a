pub mod bus;
pub mod mpu6050;
