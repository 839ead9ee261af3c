//! In-memory radio adapter
//!
//! Frames are injected by the caller instead of arriving over the air. A
//! frame injected while no receive is armed waits in a queue and completes
//! the next arm. Transmitted frames are recorded for inspection.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, trace};

use super::{Modulation, RadioError, RadioLink, RxCallback, RxError, RxFrame, RxResult, TxFrame};

/// Completions held while no receive is armed; further ones are dropped
pub const MAX_PENDING: usize = 16;

#[derive(Default)]
struct LoopbackState {
    modulation: Option<Modulation>,
    filter: Vec<u8>,
    armed: Option<RxCallback>,
    pending: VecDeque<RxResult>,
    transmitted: Vec<TxFrame>,
    arm_count: u64,
    filtered_out: u64,
    dropped_pending: u64,
    fail_init: bool,
    fail_arm: bool,
    fail_transmit: bool,
}

/// Loopback radio for simulation and tests
#[derive(Default)]
pub struct LoopbackRadio {
    state: Mutex<LoopbackState>,
}

impl LoopbackRadio {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Deliver a frame as if it had been received over the air.
    ///
    /// Returns false if the address filter rejected it or the pending
    /// queue was full.
    pub fn inject(&self, frame: RxFrame) -> bool {
        {
            let mut state = self.state();
            if !state.filter.is_empty() && !state.filter.contains(&frame.dst_address) {
                state.filtered_out += 1;
                debug!("Loopback: dropping frame for {:#04x} (filtered)", frame.dst_address);
                return false;
            }
        }
        self.deliver(Ok(frame))
    }

    /// Complete a receive with a failure status
    pub fn inject_failure(&self, error: RxError) -> bool {
        self.deliver(Err(error))
    }

    fn deliver(&self, result: RxResult) -> bool {
        let callback = {
            let mut state = self.state();
            match state.armed.take() {
                Some(cb) => cb,
                None if state.pending.len() >= MAX_PENDING => {
                    state.dropped_pending += 1;
                    debug!("Loopback: pending queue full, completion dropped");
                    return false;
                }
                None => {
                    trace!("Loopback: not armed, queueing completion");
                    state.pending.push_back(result);
                    return true;
                }
            }
        };
        // Lock released before running the completion
        callback(result);
        true
    }

    pub fn transmitted(&self) -> Vec<TxFrame> {
        self.state().transmitted.clone()
    }

    pub fn arm_count(&self) -> u64 {
        self.state().arm_count
    }

    pub fn is_armed(&self) -> bool {
        self.state().armed.is_some()
    }

    pub fn pending(&self) -> usize {
        self.state().pending.len()
    }

    pub fn modulation(&self) -> Option<Modulation> {
        self.state().modulation
    }

    pub fn address_filter(&self) -> Vec<u8> {
        self.state().filter.clone()
    }

    pub fn filtered_out(&self) -> u64 {
        self.state().filtered_out
    }

    pub fn dropped_pending(&self) -> u64 {
        self.state().dropped_pending
    }

    pub fn set_fail_init(&self, fail: bool) {
        self.state().fail_init = fail;
    }

    pub fn set_fail_arm(&self, fail: bool) {
        self.state().fail_arm = fail;
    }

    pub fn set_fail_transmit(&self, fail: bool) {
        self.state().fail_transmit = fail;
    }
}

impl RadioLink for LoopbackRadio {
    fn init(&self, modulation: Modulation) -> Result<(), RadioError> {
        let mut state = self.state();
        if state.fail_init {
            return Err(RadioError::Rejected("init refused".to_string()));
        }
        state.modulation = Some(modulation);
        Ok(())
    }

    fn set_address_filter(&self, addresses: &[u8]) -> Result<(), RadioError> {
        let mut state = self.state();
        if state.modulation.is_none() {
            return Err(RadioError::NotInitialized);
        }
        state.filter = addresses.to_vec();
        Ok(())
    }

    fn receive_async(&self, on_complete: RxCallback) -> Result<(), RadioError> {
        let queued = {
            let mut state = self.state();
            if state.modulation.is_none() {
                return Err(RadioError::NotInitialized);
            }
            if state.armed.is_some() {
                return Err(RadioError::AlreadyArmed);
            }
            if state.fail_arm {
                return Err(RadioError::Rejected("receive refused".to_string()));
            }
            state.arm_count += 1;
            match state.pending.pop_front() {
                Some(result) => result,
                None => {
                    state.armed = Some(on_complete);
                    return Ok(());
                }
            }
        };
        on_complete(queued);
        Ok(())
    }

    fn transmit(&self, frame: &TxFrame) -> Result<(), RadioError> {
        let mut state = self.state();
        if state.modulation.is_none() {
            return Err(RadioError::NotInitialized);
        }
        if state.fail_transmit {
            return Err(RadioError::Rejected("transmit refused".to_string()));
        }
        state.transmitted.push(frame.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn frame(dst: u8) -> RxFrame {
        RxFrame {
            dst_address: dst,
            payload: vec![0x05, 0x00, 0x01, 0x2C],
            rssi: -60,
        }
    }

    fn collecting_callback(sink: &Arc<Mutex<Vec<RxResult>>>) -> RxCallback {
        let sink = sink.clone();
        Box::new(move |result| sink.lock().unwrap().push(result))
    }

    #[test]
    fn test_requires_init() {
        let radio = LoopbackRadio::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        assert!(matches!(
            radio.receive_async(collecting_callback(&seen)),
            Err(RadioError::NotInitialized)
        ));
        assert!(matches!(radio.set_address_filter(&[0]), Err(RadioError::NotInitialized)));
    }

    #[test]
    fn test_single_outstanding_receive() {
        let radio = LoopbackRadio::new();
        radio.init(Modulation::default()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        radio.receive_async(collecting_callback(&seen)).unwrap();
        assert!(matches!(
            radio.receive_async(collecting_callback(&seen)),
            Err(RadioError::AlreadyArmed)
        ));

        radio.inject(frame(0x00));
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(!radio.is_armed());
    }

    #[test]
    fn test_frames_queue_until_armed() {
        let radio = LoopbackRadio::new();
        radio.init(Modulation::default()).unwrap();
        radio.inject(frame(0x00));
        radio.inject_failure(RxError::Timeout);
        assert_eq!(radio.pending(), 2);

        let seen = Arc::new(Mutex::new(Vec::new()));
        radio.receive_async(collecting_callback(&seen)).unwrap();
        radio.receive_async(collecting_callback(&seen)).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], Ok(frame(0x00)));
        assert_eq!(seen[1], Err(RxError::Timeout));
        assert_eq!(radio.arm_count(), 2);
    }

    #[test]
    fn test_pending_queue_is_bounded() {
        let radio = LoopbackRadio::new();
        radio.init(Modulation::default()).unwrap();

        for _ in 0..MAX_PENDING {
            assert!(radio.inject(frame(0x00)));
        }
        assert!(!radio.inject(frame(0x00)));
        assert!(!radio.inject_failure(RxError::Timeout));
        assert_eq!(radio.pending(), MAX_PENDING);
        assert_eq!(radio.dropped_pending(), 2);

        // Arming drains one and makes room again
        let seen = Arc::new(Mutex::new(Vec::new()));
        radio.receive_async(collecting_callback(&seen)).unwrap();
        assert!(radio.inject(frame(0x00)));
        assert_eq!(radio.pending(), MAX_PENDING);
    }

    #[test]
    fn test_address_filter_drops_foreign_frames() {
        let radio = LoopbackRadio::new();
        radio.init(Modulation::default()).unwrap();
        radio.set_address_filter(&[0x00]).unwrap();

        assert!(!radio.inject(frame(0x09)));
        assert!(radio.inject(frame(0x00)));
        assert_eq!(radio.filtered_out(), 1);
        assert_eq!(radio.pending(), 1);
    }

    #[test]
    fn test_transmit_records_frames() {
        let radio = LoopbackRadio::new();
        radio.init(Modulation::default()).unwrap();
        let tx = TxFrame {
            dst_address: 0x05,
            payload: vec![0x00, 0x02],
        };
        radio.transmit(&tx).unwrap();
        assert_eq!(radio.transmitted(), vec![tx.clone()]);

        radio.set_fail_transmit(true);
        assert!(radio.transmit(&tx).is_err());
        assert_eq!(radio.transmitted().len(), 1);
    }
}
