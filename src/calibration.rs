//! Gyro bias calibration.
//!
//! Samples the gyro while the device is at rest and averages the rates per
//! axis. Runs once at boot and blocks for `samples * spacing` (about one second
//! with the defaults). The device must be stationary for the whole run.

use crate::config::ImuConfig;
use crate::drivers::bus::RegisterBus;
use crate::drivers::mpu6050::{RawSample, Scale, RAW_SAMPLE_LEN, REG_ACCEL_XOUT_H};
use crate::error::Error;
use embedded_hal::delay::DelayNs;

/// Per-axis gyro offset at rest, rad/s.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GyroBias(pub [f32; 3]);

/// Running mean of gyro rates, plus the per-axis range seen so far.
#[derive(Copy, Clone, Debug)]
pub struct MeanAccumulator {
    sum: [f32; 3],
    min: [f32; 3],
    max: [f32; 3],
    count: u16,
}

impl Default for MeanAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl MeanAccumulator {
    pub fn new() -> Self {
        Self {
            sum: [0.0; 3],
            min: [f32::INFINITY; 3],
            max: [f32::NEG_INFINITY; 3],
            count: 0,
        }
    }

    pub fn add(&mut self, rates: [f32; 3]) {
        for (axis, rate) in rates.into_iter().enumerate() {
            self.sum[axis] += rate;
            self.min[axis] = self.min[axis].min(rate);
            self.max[axis] = self.max[axis].max(rate);
        }
        self.count += 1;
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    /// Largest (max - min) over the three axes. Zero before any sample.
    pub fn spread(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        (0..3)
            .map(|axis| self.max[axis] - self.min[axis])
            .fold(0.0, f32::max)
    }

    /// `None` if nothing was accumulated.
    pub fn mean(&self) -> Option<GyroBias> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f32;
        Some(GyroBias(self.sum.map(|s| s / n)))
    }
}

/// Average `config.calibration_samples` burst reads spaced by
/// `config.calibration_spacing`.
///
/// The first failed read aborts the run: averaging over corrupted samples
/// would skew every attitude estimate that follows.
pub fn calibrate<B: RegisterBus>(
    bus: &mut B,
    delay: &mut impl DelayNs,
    config: &ImuConfig,
) -> Result<GyroBias, Error<B::Error>> {
    let scale = Scale::from_config(config);
    let spacing_us = u32::try_from(config.calibration_spacing.as_micros())
        .map_err(|_| Error::InvalidConfig)?;
    let mut accumulator = MeanAccumulator::new();

    for sample in 0..config.calibration_samples {
        let mut buf = [0u8; RAW_SAMPLE_LEN];
        bus.read_registers(REG_ACCEL_XOUT_H, &mut buf)
            .map_err(|error| Error::CalibrationFailed { sample, error })?;
        let raw = RawSample::from_be_bytes(&buf);
        accumulator.add(scale.gyro(raw.gyro));
        delay.delay_us(spacing_us);
    }

    if let Some(limit) = config.calibration_max_spread {
        let spread = accumulator.spread();
        if spread > limit {
            warn!("gyro moved during calibration, spread {} rad/s", spread);
            return Err(Error::DeviceMoving { spread });
        }
    }

    let bias = accumulator.mean().ok_or(Error::InvalidConfig)?;
    debug!(
        "gyro bias from {} samples: {} {} {}",
        accumulator.count(),
        bias.0[0],
        bias.0[1],
        bias.0[2]
    );
    Ok(bias)
}
