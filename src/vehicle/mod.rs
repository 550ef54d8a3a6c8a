pub mod ahrs;

pub use ahrs::Ahrs;
