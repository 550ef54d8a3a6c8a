/// One converted IMU sample.
///
/// Acceleration in m/s^2 and bias-corrected rates in rad/s, both in the sensor
/// body frame. Temperature is only used for diagnostics.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImuData {
    pub acceleration: [f32; 3],
    pub rates: [f32; 3],
    pub temperature: f32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EulerAngles {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// Orientation estimate, all angles in radians.
///
/// `gyro` is the integrated body rate estimate before fusion, `tilt` the
/// accelerometer-only roll and pitch of the last sample, and `angles` the
/// fused output handed to the control loop.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AhrsState {
    pub gyro: EulerAngles,
    pub tilt: (f32, f32),
    pub angles: EulerAngles,
    /// Set while the pitch fed into the kinematic transform had to be clamped
    /// away from +/-90 degrees.
    pub singular: bool,
}
