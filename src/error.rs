//! Error types for the acquisition and fusion pipeline.

/// Misuse of the acquisition state machine, or a malformed completion.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequencerError {
    /// A read was requested while another one is still on the bus
    TransferInFlight,
    /// A read was requested while the previous sample has not been consumed
    DataNotConsumed,
    /// `consume` was called without a completed transfer
    NoDataReady,
    /// A completion arrived with nothing in flight (e.g. after a watchdog abort)
    NoTransferInFlight,
    /// The transport delivered a buffer that is not exactly one raw sample long
    InvalidLength(usize),
}

/// Errors surfaced by the device handle. `E` is the bus transport error.
#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Transient bus failure
    Bus(E),
    /// WHO_AM_I did not identify an MPU-6050
    WrongDevice(u8),
    /// A read failed while sampling the gyro bias. Fatal at boot.
    CalibrationFailed { sample: u16, error: E },
    /// Gyro spread during calibration exceeded the configured limit (rad/s)
    DeviceMoving { spread: f32 },
    Sequencer(SequencerError),
    InvalidConfig,
}

impl<E> From<SequencerError> for Error<E> {
    fn from(e: SequencerError) -> Self {
        Error::Sequencer(e)
    }
}
