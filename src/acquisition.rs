//! Non-blocking acquisition sequencer.
//!
//! ```text
//!   Idle --begin_read--> InFlight --complete(ok)--> Ready --consume--> Idle
//!                           |
//!                           +--complete(failed) / watchdog--> Idle
//! ```
//!
//! The sample buffer only exists inside the `Ready` state, so nothing can
//! read it while a transfer is still writing. A request made in any state
//! other than `Idle` is rejected, never queued.

use crate::drivers::bus::RegisterBus;
use crate::drivers::mpu6050::{RawSample, RAW_SAMPLE_LEN, REG_ACCEL_XOUT_H};
use crate::error::{Error, SequencerError};
use embassy_time::{Duration, Instant};

/// Token for the transfer currently on the bus.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingRead {
    pub issued_at: Instant,
    pub deadline: Instant,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcquisitionState {
    Idle,
    InFlight(PendingRead),
    Ready {
        buffer: [u8; RAW_SAMPLE_LEN],
        completed_at: Instant,
    },
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AcquisitionStats {
    pub completed: u32,
    pub failed: u32,
    pub timed_out: u32,
}

pub struct Acquisition {
    state: AcquisitionState,
    timeout: Duration,
    stats: AcquisitionStats,
}

impl Acquisition {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: AcquisitionState::Idle,
            timeout,
            stats: AcquisitionStats::default(),
        }
    }

    pub fn state(&self) -> &AcquisitionState {
        &self.state
    }

    pub fn stats(&self) -> AcquisitionStats {
        self.stats
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, AcquisitionState::Idle)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, AcquisitionState::Ready { .. })
    }

    pub fn pending(&self) -> Option<PendingRead> {
        match self.state {
            AcquisitionState::InFlight(pending) => Some(pending),
            _ => None,
        }
    }

    /// Start the 14 byte burst read at ACCEL_XOUT_H. Returns immediately.
    ///
    /// If the transport refuses to start, the failure is counted, the state
    /// stays `Idle` and the caller may try again next period.
    pub fn begin_read<B: RegisterBus>(
        &mut self,
        bus: &mut B,
        now: Instant,
    ) -> Result<PendingRead, Error<B::Error>> {
        match self.state {
            AcquisitionState::Idle => {}
            AcquisitionState::InFlight(_) => return Err(SequencerError::TransferInFlight.into()),
            AcquisitionState::Ready { .. } => return Err(SequencerError::DataNotConsumed.into()),
        }

        if let Err(e) = bus.start_read(REG_ACCEL_XOUT_H, RAW_SAMPLE_LEN) {
            self.stats.failed += 1;
            return Err(Error::Bus(e));
        }

        let pending = PendingRead {
            issued_at: now,
            deadline: now + self.timeout,
        };
        self.state = AcquisitionState::InFlight(pending);
        Ok(pending)
    }

    /// Called when the transport finishes. `None` means the transfer failed.
    ///
    /// A failure, or a buffer of the wrong length, returns to `Idle` and is
    /// counted; no retry is made here.
    pub fn on_transfer_complete(
        &mut self,
        data: Option<&[u8]>,
        now: Instant,
    ) -> Result<(), SequencerError> {
        if !matches!(self.state, AcquisitionState::InFlight(_)) {
            return Err(SequencerError::NoTransferInFlight);
        }

        let Some(data) = data else {
            self.stats.failed += 1;
            self.state = AcquisitionState::Idle;
            return Ok(());
        };

        match <[u8; RAW_SAMPLE_LEN]>::try_from(data) {
            Ok(buffer) => {
                self.stats.completed += 1;
                self.state = AcquisitionState::Ready {
                    buffer,
                    completed_at: now,
                };
                Ok(())
            }
            Err(_) => {
                self.stats.failed += 1;
                self.state = AcquisitionState::Idle;
                Err(SequencerError::InvalidLength(data.len()))
            }
        }
    }

    /// Take the completed sample and return to `Idle`.
    pub fn consume(&mut self) -> Result<RawSample, SequencerError> {
        match self.state {
            AcquisitionState::Ready { buffer, .. } => {
                self.state = AcquisitionState::Idle;
                Ok(RawSample::from_be_bytes(&buffer))
            }
            _ => Err(SequencerError::NoDataReady),
        }
    }

    /// Abandon a transfer that has passed its deadline. Returns `true` if one
    /// was abandoned.
    pub fn check_watchdog(&mut self, now: Instant) -> bool {
        match self.state {
            AcquisitionState::InFlight(pending) if now >= pending.deadline => {
                self.stats.timed_out += 1;
                self.state = AcquisitionState::Idle;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct StubBus {
        started: u32,
        refuse: bool,
    }

    impl RegisterBus for StubBus {
        type Error = u8;

        fn write_register(&mut self, _reg: u8, _value: u8) -> Result<(), u8> {
            Ok(())
        }

        fn read_registers(&mut self, _reg: u8, _buf: &mut [u8]) -> Result<(), u8> {
            Ok(())
        }

        fn start_read(&mut self, reg: u8, len: usize) -> Result<(), u8> {
            assert_eq!(reg, REG_ACCEL_XOUT_H);
            assert_eq!(len, RAW_SAMPLE_LEN);
            if self.refuse {
                return Err(7);
            }
            self.started += 1;
            Ok(())
        }

        fn poll_read(&mut self, _buf: &mut [u8]) -> nb::Result<usize, u8> {
            Err(nb::Error::WouldBlock)
        }
    }

    fn sequencer() -> Acquisition {
        Acquisition::new(Duration::from_millis(5))
    }

    const SAMPLE: [u8; RAW_SAMPLE_LEN] = [
        0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x19, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn begin_read_moves_idle_to_in_flight() {
        let mut bus = StubBus::default();
        let mut acq = sequencer();
        let now = Instant::from_millis(100);

        let pending = acq.begin_read(&mut bus, now).unwrap();
        assert_eq!(pending.issued_at, now);
        assert_eq!(pending.deadline, Instant::from_millis(105));
        assert_eq!(acq.state(), &AcquisitionState::InFlight(pending));
        assert_eq!(bus.started, 1);
    }

    #[test]
    fn second_begin_read_is_rejected_while_in_flight() {
        let mut bus = StubBus::default();
        let mut acq = sequencer();
        acq.begin_read(&mut bus, Instant::from_millis(0)).unwrap();

        assert_eq!(
            acq.begin_read(&mut bus, Instant::from_millis(1)),
            Err(Error::Sequencer(SequencerError::TransferInFlight))
        );
        assert_eq!(bus.started, 1);
    }

    #[test]
    fn begin_read_is_rejected_while_sample_unconsumed() {
        let mut bus = StubBus::default();
        let mut acq = sequencer();
        acq.begin_read(&mut bus, Instant::from_millis(0)).unwrap();
        acq.on_transfer_complete(Some(&SAMPLE), Instant::from_millis(1))
            .unwrap();

        assert_eq!(
            acq.begin_read(&mut bus, Instant::from_millis(2)),
            Err(Error::Sequencer(SequencerError::DataNotConsumed))
        );
    }

    #[test]
    fn consume_before_ready_fails() {
        let mut bus = StubBus::default();
        let mut acq = sequencer();
        assert_eq!(acq.consume(), Err(SequencerError::NoDataReady));

        acq.begin_read(&mut bus, Instant::from_millis(0)).unwrap();
        assert_eq!(acq.consume(), Err(SequencerError::NoDataReady));
    }

    #[test]
    fn completed_transfer_is_consumed_once() {
        let mut bus = StubBus::default();
        let mut acq = sequencer();
        acq.begin_read(&mut bus, Instant::from_millis(0)).unwrap();
        acq.on_transfer_complete(Some(&SAMPLE), Instant::from_millis(1))
            .unwrap();
        assert!(acq.is_ready());

        let raw = acq.consume().unwrap();
        assert_eq!(raw.accel[0], 4096);
        assert!(acq.is_idle());
        assert_eq!(acq.consume(), Err(SequencerError::NoDataReady));
        assert_eq!(acq.stats().completed, 1);
    }

    #[test]
    fn failed_transfer_returns_to_idle_and_is_counted() {
        let mut bus = StubBus::default();
        let mut acq = sequencer();
        acq.begin_read(&mut bus, Instant::from_millis(0)).unwrap();
        acq.on_transfer_complete(None, Instant::from_millis(1))
            .unwrap();

        assert!(acq.is_idle());
        assert_eq!(acq.stats().failed, 1);
        // the caller retries on the next period
        assert!(acq.begin_read(&mut bus, Instant::from_millis(2)).is_ok());
    }

    #[test]
    fn wrong_length_is_a_protocol_violation() {
        let mut bus = StubBus::default();
        let mut acq = sequencer();
        acq.begin_read(&mut bus, Instant::from_millis(0)).unwrap();

        assert_eq!(
            acq.on_transfer_complete(Some(&SAMPLE[..12]), Instant::from_millis(1)),
            Err(SequencerError::InvalidLength(12))
        );
        assert!(acq.is_idle());
        assert_eq!(acq.stats().failed, 1);
    }

    #[test]
    fn refused_start_stays_idle() {
        let mut bus = StubBus {
            refuse: true,
            ..Default::default()
        };
        let mut acq = sequencer();

        assert_eq!(
            acq.begin_read(&mut bus, Instant::from_millis(0)),
            Err(Error::Bus(7))
        );
        assert!(acq.is_idle());
        assert_eq!(acq.stats().failed, 1);
    }

    #[test]
    fn watchdog_abandons_stale_transfer() {
        let mut bus = StubBus::default();
        let mut acq = sequencer();
        acq.begin_read(&mut bus, Instant::from_millis(10)).unwrap();

        assert!(!acq.check_watchdog(Instant::from_millis(14)));
        assert!(acq.pending().is_some());
        assert!(acq.check_watchdog(Instant::from_millis(15)));
        assert!(acq.is_idle());
        assert_eq!(acq.stats().timed_out, 1);

        // a completion that shows up after the abort is not accepted
        assert_eq!(
            acq.on_transfer_complete(Some(&SAMPLE), Instant::from_millis(16)),
            Err(SequencerError::NoTransferInFlight)
        );
        assert!(acq.is_idle());
    }
}
