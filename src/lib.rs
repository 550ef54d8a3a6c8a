#![cfg_attr(not(test), no_std)]
//#![deny(warnings)]
#![deny(unsafe_code)]

// This must go first so the logging macros are visible to every module below.
#[macro_use]
mod fmt;

pub mod acquisition;
pub mod calibration;
pub mod common;
pub mod config;
pub mod drivers;
pub mod error;
pub mod imu;
pub mod vehicle;

pub use common::{AhrsState, ImuData};
pub use config::ImuConfig;
pub use error::{Error, SequencerError};
pub use imu::Imu;
