use crate::calibration::GyroBias;
use crate::common::ImuData;
use crate::config::{AccelFullScale, GyroFullScale, ImuConfig};
use crate::drivers::bus::RegisterBus;
use crate::error::SequencerError;
use embedded_hal::delay::DelayNs;

pub const REG_SMPRT_DIV: u8 = 0x19;
pub const REG_CONFIG: u8 = 0x1A;
pub const REG_GYRO_CONFIG: u8 = 0x1B;
pub const REG_ACCEL_CONFIG: u8 = 0x1C;
pub const REG_INT_PIN_CFG: u8 = 0x37;
pub const REG_INT_ENABLE: u8 = 0x38;
pub const REG_ACCEL_XOUT_H: u8 = 0x3B;
pub const REG_TEMP_OUT_H: u8 = 0x41;
pub const REG_GYRO_XOUT_H: u8 = 0x43;
pub const REG_PWR_MGMT_1: u8 = 0x6B;
pub const REG_WHO_AM_I: u8 = 0x75;

/// 7-bit I2C address with AD0 low. The transport owns it.
pub const DEFAULT_ADDRESS: u8 = 0x68;
pub const ALTERNATE_ADDRESS: u8 = 0x69;

pub const WHO_AM_I_VALUE: u8 = 0x68;

/// Accel X/Y/Z, temperature and gyro X/Y/Z, high byte first, starting at
/// ACCEL_XOUT_H.
pub const RAW_SAMPLE_LEN: usize = 14;

/// One burst read of the data registers, unconverted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSample {
    pub accel: [i16; 3],
    pub temperature: i16,
    pub gyro: [i16; 3],
}

impl RawSample {
    pub fn from_be_bytes(buf: &[u8; RAW_SAMPLE_LEN]) -> Self {
        let word = |i: usize| i16::from_be_bytes([buf[i], buf[i + 1]]);
        Self {
            accel: [word(0), word(2), word(4)],
            temperature: word(6),
            gyro: [word(8), word(10), word(12)],
        }
    }

    /// Anything other than exactly 14 bytes is a protocol violation.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, SequencerError> {
        let buf: &[u8; RAW_SAMPLE_LEN] = buf
            .try_into()
            .map_err(|_| SequencerError::InvalidLength(buf.len()))?;
        Ok(Self::from_be_bytes(buf))
    }
}

/// Raw to physical conversion for one pair of configured ranges.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Scale {
    pub rad_per_lsb: f32,
    pub mps2_per_lsb: f32,
}

impl Scale {
    pub fn new(gyro: GyroFullScale, accel: AccelFullScale) -> Self {
        Self {
            rad_per_lsb: gyro.rad_per_lsb(),
            mps2_per_lsb: accel.mps2_per_lsb(),
        }
    }

    pub fn from_config(config: &ImuConfig) -> Self {
        Self::new(config.gyro_scale, config.accel_scale)
    }

    pub fn accel(&self, raw: [i16; 3]) -> [f32; 3] {
        raw.map(|v| v as f32 * self.mps2_per_lsb)
    }

    /// Gyro rates before bias removal.
    pub fn gyro(&self, raw: [i16; 3]) -> [f32; 3] {
        raw.map(|v| v as f32 * self.rad_per_lsb)
    }

    /// Pure function of its inputs: identical arguments give bit-identical output.
    pub fn to_physical(&self, raw: &RawSample, bias: &GyroBias) -> ImuData {
        let rates = self.gyro(raw.gyro);
        ImuData {
            acceleration: self.accel(raw.accel),
            rates: [
                rates[0] - bias.0[0],
                rates[1] - bias.0[1],
                rates[2] - bias.0[2],
            ],
            temperature: temperature_celsius(raw.temperature),
        }
    }
}

pub fn temperature_celsius(raw: i16) -> f32 {
    raw as f32 / 340.0 + 36.53
}

pub fn who_am_i<B: RegisterBus>(bus: &mut B) -> Result<u8, B::Error> {
    let mut buf = [0];
    bus.read_registers(REG_WHO_AM_I, &mut buf)?;
    Ok(buf[0])
}

/// Wake the device and write sample rate, filter, ranges and interrupt setup.
pub fn configure<B: RegisterBus>(
    bus: &mut B,
    delay: &mut impl DelayNs,
    config: &ImuConfig,
) -> Result<(), B::Error> {
    bus.write_register(REG_PWR_MGMT_1, 0x01)?; // wake up, clock from X gyro PLL
    delay.delay_ms(10);

    let writes = [
        (REG_SMPRT_DIV, config.sample_rate_divider),
        (REG_CONFIG, config.dlpf as u8),
        (REG_GYRO_CONFIG, config.gyro_scale.register_bits()),
        (REG_ACCEL_CONFIG, config.accel_scale.register_bits()),
        (REG_INT_PIN_CFG, 0x30), // latch interrupt, clear on any read
        (REG_INT_ENABLE, 0x01),  // data ready
    ];
    for (reg, value) in writes {
        bus.write_register(reg, value)?;
        delay.delay_ms(10);
    }

    delay.delay_ms(100);
    Ok(())
}
