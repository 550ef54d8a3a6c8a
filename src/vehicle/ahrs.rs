use crate::common::{AhrsState, EulerAngles, ImuData};
use crate::config::FusionWeights;
use core::f32::consts::FRAC_PI_2;
use libm::{atan2f, copysignf, cosf, fabsf, sinf, sqrtf, tanf};

/// Pitch at which `tan(pitch)` in the body-rate to Euler-rate transform
/// stops growing. `tan` diverges at +/-90 degrees.
pub const PITCH_LIMIT: f32 = FRAC_PI_2 - 0.01;

/// Complementary filter attitude estimator.
///
/// Each update integrates the body rates from the previous fused attitude
/// (with the roll/pitch cross-coupling of the roll-pitch-yaw sequence) and
/// pulls roll and pitch toward the tilt measured by the accelerometer. Yaw has
/// no absolute reference on a 6-axis sensor and drifts freely.
///
/// The tilt term assumes the only acceleration is gravity. Under sustained
/// linear acceleration it is biased.
pub struct Ahrs {
    state: AhrsState,
    weights: FusionWeights,
}

impl Default for Ahrs {
    fn default() -> Self {
        Self::new(FusionWeights::default())
    }
}

impl Ahrs {
    pub fn new(weights: FusionWeights) -> Self {
        Ahrs {
            state: AhrsState::default(),
            weights,
        }
    }

    pub fn state(&self) -> &AhrsState {
        &self.state
    }

    /// Fuse one sample taken `dt` seconds after the previous one.
    ///
    /// A `dt` that is not strictly positive and finite skips the update and
    /// leaves the state untouched, as does a sample containing NaN.
    pub fn imu_update(&mut self, imu_update: &ImuData, dt: f32) -> &AhrsState {
        if !(dt.is_finite() && dt > 0.0) {
            return &self.state;
        }
        if imu_update
            .rates
            .iter()
            .chain(imu_update.acceleration.iter())
            .any(|v| v.is_nan())
        {
            warn!("dropping imu sample containing NaN");
            return &self.state;
        }

        let previous = self.state.angles;
        let [rate_roll, rate_pitch, rate_yaw] = imu_update.rates;

        let (tan_pitch, singular) = kinematic_tan(previous.pitch);
        if singular && !self.state.singular {
            warn!("pitch near 90 deg at {}, limiting tan(pitch)", previous.pitch);
        }

        // roll first, then pitch from the updated roll
        let roll_dot = rate_roll
            + tan_pitch * (rate_pitch * sinf(previous.roll) + rate_yaw * cosf(previous.roll));
        let roll = previous.roll + roll_dot * dt;
        let pitch_dot = rate_pitch * cosf(roll) - rate_yaw * sinf(roll);

        let gyro = EulerAngles {
            roll,
            pitch: previous.pitch + pitch_dot * dt,
            yaw: self.state.gyro.yaw + rate_yaw * dt,
        };
        let tilt = tilt_from_accel(imu_update.acceleration);

        self.state = AhrsState {
            gyro,
            tilt,
            angles: EulerAngles {
                roll: self.weights.gyro * gyro.roll + self.weights.accel * tilt.0,
                pitch: self.weights.gyro * gyro.pitch + self.weights.accel * tilt.1,
                yaw: gyro.yaw,
            },
            singular,
        };
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = AhrsState::default();
    }
}

/// Roll and pitch of the measured gravity vector. Works in any unit since
/// only ratios enter `atan2`.
pub fn tilt_from_accel(acceleration: [f32; 3]) -> (f32, f32) {
    let [x, y, z] = acceleration;
    let roll = atan2f(y, sqrtf(x * x + z * z));
    let pitch = atan2f(-x, sqrtf(y * y + z * z));
    (roll, pitch)
}

/// `tan(pitch)` for the kinematic transform, limited in magnitude to
/// `tan(PITCH_LIMIT)` with its sign kept. The flag is set when the limit
/// applies. Pitch is not wrapped, so the test goes through `cos`.
fn kinematic_tan(pitch: f32) -> (f32, bool) {
    let tan = tanf(pitch);
    if fabsf(cosf(pitch)) < cosf(PITCH_LIMIT) {
        (copysignf(tanf(PITCH_LIMIT), tan), true)
    } else {
        (tan, false)
    }
}
