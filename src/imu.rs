//! The device handle: one MPU-6050, its calibration and its attitude estimate.

use crate::acquisition::{Acquisition, AcquisitionStats};
use crate::calibration::{calibrate, GyroBias};
use crate::common::AhrsState;
use crate::config::ImuConfig;
use crate::drivers::bus::RegisterBus;
use crate::drivers::mpu6050::{
    self, Scale, RAW_SAMPLE_LEN, REG_ACCEL_XOUT_H, REG_GYRO_XOUT_H, REG_TEMP_OUT_H,
    WHO_AM_I_VALUE,
};
use crate::error::{Error, SequencerError};
use crate::vehicle::Ahrs;
use embassy_time::Instant;
use embedded_hal::delay::DelayNs;

pub struct Imu<B> {
    bus: B,
    config: ImuConfig,
    scale: Scale,
    bias: Option<GyroBias>,
    acquisition: Acquisition,
    ahrs: Ahrs,
    last_update: Option<Instant>,
}

impl<B: RegisterBus> Imu<B> {
    pub fn new(bus: B, config: ImuConfig) -> Self {
        Self {
            bus,
            scale: Scale::from_config(&config),
            bias: None,
            acquisition: Acquisition::new(config.transfer_timeout),
            ahrs: Ahrs::new(config.fusion),
            last_update: None,
            config,
        }
    }

    pub fn release(self) -> B {
        self.bus
    }

    pub fn config(&self) -> &ImuConfig {
        &self.config
    }

    /// `None` until `initialize` has succeeded.
    pub fn bias(&self) -> Option<GyroBias> {
        self.bias
    }

    pub fn stats(&self) -> AcquisitionStats {
        self.acquisition.stats()
    }

    pub fn attitude(&self) -> &AhrsState {
        self.ahrs.state()
    }

    pub fn acquisition(&self) -> &Acquisition {
        &self.acquisition
    }

    /// Check the device identity, configure it and measure the gyro bias.
    ///
    /// Blocks for the configuration settle times plus the whole calibration
    /// run. The device must be at rest. On any failure the handle stays
    /// uninitialised and `poll` does nothing.
    pub fn initialize(&mut self, delay: &mut impl DelayNs) -> Result<GyroBias, Error<B::Error>> {
        self.bias = None;
        if !self.config.is_valid() {
            error!("invalid imu configuration");
            return Err(Error::InvalidConfig);
        }

        let id = mpu6050::who_am_i(&mut self.bus).map_err(Error::Bus)?;
        if id != WHO_AM_I_VALUE {
            error!("unexpected WHO_AM_I: {:02x}", id);
            return Err(Error::WrongDevice(id));
        }
        info!("MPU-6050 detected");

        mpu6050::configure(&mut self.bus, delay, &self.config).map_err(Error::Bus)?;
        info!(
            "configured: divider {}, dlpf {}, gyro range {}, accel range {}",
            self.config.sample_rate_divider,
            self.config.dlpf as u8,
            self.config.gyro_scale as u8,
            self.config.accel_scale as u8
        );

        info!("calibrating gyro, keep the device still");
        let bias = calibrate(&mut self.bus, delay, &self.config)?;
        info!(
            "gyro bias: {} {} {} rad/s",
            bias.0[0], bias.0[1], bias.0[2]
        );

        self.bias = Some(bias);
        self.acquisition = Acquisition::new(self.config.transfer_timeout);
        self.reset_attitude();
        Ok(bias)
    }

    /// Advance the pipeline without blocking.
    ///
    /// Collects a finished transfer (or abandons a stale one), fuses a ready
    /// sample and starts the next read. Returns the new attitude only when a
    /// sample was fused during this call. Transfer failures are counted in
    /// [`Imu::stats`] and retried on the next call.
    pub fn poll(&mut self, now: Instant) -> Option<AhrsState> {
        let bias = self.bias?;

        if self.acquisition.pending().is_some() {
            self.collect(now);
        }

        let mut fused = None;
        if self.acquisition.is_ready() {
            fused = self.fuse(now, &bias);
        }

        if self.acquisition.is_idle() {
            match self.acquisition.begin_read(&mut self.bus, now) {
                Ok(_) => {}
                Err(Error::Bus(_)) => {
                    warn!("could not start imu read ({} failed)", self.stats().failed)
                }
                Err(_) => error!("imu read requested out of sequence"),
            }
        }

        fused
    }

    fn collect(&mut self, now: Instant) {
        let mut buf = [0u8; RAW_SAMPLE_LEN];
        let completion = match self.bus.poll_read(&mut buf) {
            Ok(len) => match buf.get(..len) {
                Some(data) => self.acquisition.on_transfer_complete(Some(data), now),
                None => self
                    .acquisition
                    .on_transfer_complete(None, now)
                    .and(Err(SequencerError::InvalidLength(len))),
            },
            Err(nb::Error::WouldBlock) => {
                if self.acquisition.check_watchdog(now) {
                    self.bus.cancel_read();
                    warn!(
                        "imu read timed out ({} so far)",
                        self.stats().timed_out
                    );
                }
                return;
            }
            Err(nb::Error::Other(_)) => {
                warn!("imu read failed ({} so far)", self.stats().failed + 1);
                self.acquisition.on_transfer_complete(None, now)
            }
        };

        if let Err(e) = completion {
            error!("bad imu completion: {}", e);
        }
    }

    fn fuse(&mut self, now: Instant, bias: &GyroBias) -> Option<AhrsState> {
        let raw = self.acquisition.consume().ok()?;
        let data = self.scale.to_physical(&raw, bias);

        let elapsed = match self.last_update {
            Some(previous) => now.saturating_duration_since(previous),
            None => self.config.nominal_period,
        };
        if elapsed.as_ticks() == 0 {
            trace!("zero dt, sample dropped");
            return None;
        }

        let dt = elapsed.as_micros() as f32 / 1_000_000.0;
        self.last_update = Some(now);
        Some(*self.ahrs.imu_update(&data, dt))
    }

    /// Zero the attitude estimate. The next fused sample uses the nominal period.
    pub fn reset_attitude(&mut self) {
        self.ahrs.reset();
        self.last_update = None;
    }

    /// Blocking accelerometer read, m/s^2.
    pub fn read_accel(&mut self) -> Result<[f32; 3], Error<B::Error>> {
        let raw = self.read_triplet(REG_ACCEL_XOUT_H)?;
        Ok(self.scale.accel(raw))
    }

    /// Blocking gyro read, rad/s with the bias removed once calibrated.
    pub fn read_gyro(&mut self) -> Result<[f32; 3], Error<B::Error>> {
        let raw = self.read_triplet(REG_GYRO_XOUT_H)?;
        let bias = self.bias.unwrap_or_default();
        let rates = self.scale.gyro(raw);
        Ok([
            rates[0] - bias.0[0],
            rates[1] - bias.0[1],
            rates[2] - bias.0[2],
        ])
    }

    /// Blocking die temperature read, degrees Celsius.
    pub fn read_temperature(&mut self) -> Result<f32, Error<B::Error>> {
        self.ensure_bus_free()?;
        let mut buf = [0u8; 2];
        self.bus
            .read_registers(REG_TEMP_OUT_H, &mut buf)
            .map_err(Error::Bus)?;
        Ok(mpu6050::temperature_celsius(i16::from_be_bytes(buf)))
    }

    fn read_triplet(&mut self, reg: u8) -> Result<[i16; 3], Error<B::Error>> {
        self.ensure_bus_free()?;
        let mut buf = [0u8; 6];
        self.bus.read_registers(reg, &mut buf).map_err(Error::Bus)?;
        Ok([
            i16::from_be_bytes([buf[0], buf[1]]),
            i16::from_be_bytes([buf[2], buf[3]]),
            i16::from_be_bytes([buf[4], buf[5]]),
        ])
    }

    fn ensure_bus_free(&self) -> Result<(), SequencerError> {
        match self.acquisition.pending() {
            Some(_) => Err(SequencerError::TransferInFlight),
            None => Ok(()),
        }
    }
}
