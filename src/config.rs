//! Sensor and pipeline configuration.
//!
//! The full-scale ranges written to the device and the LSB scale used by the
//! converter come from the same enum value, so the two can not drift apart.

use core::f32::consts::PI;
use embassy_time::Duration;

/// Gravity used by the reference conversion (9.81 m/s^2 per g).
pub const GRAVITY: f32 = 9.81;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GyroFullScale {
    Deg250 = 0,
    Deg500 = 1,
    Deg1000 = 2,
    Deg2000 = 3,
}

impl GyroFullScale {
    /// LSB per degree/s
    pub const fn sensitivity(self) -> f32 {
        match self {
            Self::Deg250 => 131.0,
            Self::Deg500 => 65.5,
            Self::Deg1000 => 32.8,
            Self::Deg2000 => 16.4,
        }
    }

    /// rad/s per LSB. 0.00013323124061 for the +/-250 deg/s range.
    pub fn rad_per_lsb(self) -> f32 {
        PI / 180.0 / self.sensitivity()
    }

    pub const fn register_bits(self) -> u8 {
        (self as u8) << 3
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AccelFullScale {
    G2 = 0,
    G4 = 1,
    G8 = 2,
    G16 = 3,
}

impl AccelFullScale {
    /// LSB per g
    pub const fn sensitivity(self) -> f32 {
        match self {
            Self::G2 => 16384.0,
            Self::G4 => 8192.0,
            Self::G8 => 4096.0,
            Self::G16 => 2048.0,
        }
    }

    /// m/s^2 per LSB. 0.00119750976563 for the +/-4 g range.
    pub fn mps2_per_lsb(self) -> f32 {
        GRAVITY / self.sensitivity()
    }

    pub const fn register_bits(self) -> u8 {
        (self as u8) << 3
    }
}

/// Digital low pass filter setting (CONFIG register, DLPF_CFG).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DigitalLowPassFilter {
    Filter0 = 0,
    /// 184 Hz accel / 188 Hz gyro, 1 kHz internal rate
    Filter1 = 1,
    Filter2 = 2,
    Filter3 = 3,
    Filter4 = 4,
    Filter5 = 5,
    Filter6 = 6,
}

/// Complementary filter weights. `gyro + accel` must be 1.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FusionWeights {
    pub gyro: f32,
    pub accel: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            gyro: 0.96,
            accel: 0.04,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImuConfig {
    /// Output rate = 1 kHz / (1 + divider) with the DLPF enabled
    pub sample_rate_divider: u8,
    pub dlpf: DigitalLowPassFilter,
    pub gyro_scale: GyroFullScale,
    pub accel_scale: AccelFullScale,
    pub calibration_samples: u16,
    pub calibration_spacing: Duration,
    /// Reject the calibration when any gyro axis moves more than this (rad/s)
    /// between its lowest and highest sample. `None` trusts the caller.
    pub calibration_max_spread: Option<f32>,
    /// dt used for the first fused sample, before a measured one exists
    pub nominal_period: Duration,
    /// In-flight reads older than this are abandoned
    pub transfer_timeout: Duration,
    pub fusion: FusionWeights,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            sample_rate_divider: 0,
            dlpf: DigitalLowPassFilter::Filter1,
            gyro_scale: GyroFullScale::Deg250,
            accel_scale: AccelFullScale::G4,
            calibration_samples: 100,
            calibration_spacing: Duration::from_millis(10),
            calibration_max_spread: None,
            nominal_period: Duration::from_millis(1),
            transfer_timeout: Duration::from_millis(5),
            fusion: FusionWeights::default(),
        }
    }
}

impl ImuConfig {
    pub fn is_valid(&self) -> bool {
        let weights = self.fusion.gyro + self.fusion.accel;
        self.calibration_samples > 0
            && self.nominal_period.as_micros() > 0
            && self.transfer_timeout.as_micros() > 0
            && self.calibration_spacing.as_micros() <= u64::from(u32::MAX)
            && (0.0..=1.0).contains(&self.fusion.gyro)
            && (0.0..=1.0).contains(&self.fusion.accel)
            && libm::fabsf(weights - 1.0) < 1e-6
    }
}
