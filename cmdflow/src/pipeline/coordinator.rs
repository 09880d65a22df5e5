//! Crash coordination: first failure wins.
//!
//! Every run owns one [`CrashGate`]. Monitors that observe a failure race to
//! claim it without blocking. The single winner records the terminal error and
//! flips the kill switch every monitor listens on; losers drop their failure
//! on the floor. Deadline and external cancellation claim the same gate, so a
//! run ends with exactly one verdict whichever path gets there first.

use crate::cancellation::CancellationToken;
use crate::errors::PipelineError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// The per-run exclusive gate plus its verdict slot.
#[derive(Debug, Default)]
pub(crate) struct CrashGate {
    claimed: AtomicBool,
    verdict: Mutex<Option<PipelineError>>,
    kill_switch: CancellationToken,
}

impl CrashGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Tries to become the sole reporter of the run's terminal error.
    ///
    /// On success the error is stored and then every stage is signalled to
    /// stop. Returns false, leaving state untouched, if the run is already
    /// decided.
    pub(crate) fn try_claim(&self, error: PipelineError) -> bool {
        if self
            .claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(error = %error, "pipeline already decided; discarding failure");
            return false;
        }

        let reason = error.to_string();
        *self.verdict.lock() = Some(error);
        self.kill_switch.cancel(reason);
        true
    }

    /// Signals every stage to stop without recording a verdict.
    pub(crate) fn terminate(&self, reason: &str) {
        self.kill_switch.cancel(reason);
    }

    /// Returns true once a terminal error has been claimed.
    pub(crate) fn is_decided(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }

    /// Returns true once stages have been told to stop.
    pub(crate) fn is_terminating(&self) -> bool {
        self.kill_switch.is_cancelled()
    }

    /// Resolves once stages have been told to stop.
    pub(crate) async fn terminated(&self) {
        self.kill_switch.cancelled().await;
    }

    /// Takes the recorded verdict. Only meaningful after all monitors joined.
    pub(crate) fn take_verdict(&self) -> Option<PipelineError> {
        self.verdict.lock().take()
    }
}

/// Stops every stage if the run is abandoned before it finishes.
///
/// Dropping the `run` future would otherwise leave monitor tasks and their
/// processes running unobserved.
pub(crate) struct TerminateOnDrop {
    gate: Option<Arc<CrashGate>>,
}

impl TerminateOnDrop {
    pub(crate) fn new(gate: Arc<CrashGate>) -> Self {
        Self { gate: Some(gate) }
    }

    /// Disarms the guard once every monitor has been joined.
    pub(crate) fn disarm(&mut self) {
        self.gate = None;
    }
}

impl Drop for TerminateOnDrop {
    fn drop(&mut self) {
        if let Some(gate) = self.gate.take() {
            gate.terminate("pipeline dropped before completion");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ExitSummary;
    use crate::errors::ErrorKind;
    use std::time::Duration;

    fn crash(stage: usize, stderr: &str) -> PipelineError {
        PipelineError::stage_failed(stage, "sh", ExitSummary::Code(1), stderr)
    }

    #[test]
    fn test_first_claim_wins() {
        let gate = CrashGate::new();

        assert!(gate.try_claim(crash(1, "root cause")));
        assert!(!gate.try_claim(crash(2, "symptom")));

        let verdict = gate.take_verdict().unwrap();
        assert_eq!(verdict.diagnostic(), Some("root cause"));
    }

    #[test]
    fn test_claim_flips_kill_switch() {
        let gate = CrashGate::new();
        assert!(!gate.is_terminating());
        assert!(!gate.is_decided());

        gate.try_claim(crash(0, "boom"));

        assert!(gate.is_decided());
        assert!(gate.is_terminating());
    }

    #[test]
    fn test_terminate_does_not_decide() {
        let gate = CrashGate::new();
        gate.terminate("shutdown");

        assert!(gate.is_terminating());
        assert!(!gate.is_decided());
        assert!(gate.take_verdict().is_none());
    }

    #[test]
    fn test_deadline_after_crash_keeps_crash() {
        let gate = CrashGate::new();
        gate.try_claim(crash(0, "boom"));
        gate.try_claim(PipelineError::DeadlineExceeded {
            deadline: Duration::from_millis(10),
        });

        assert_eq!(gate.take_verdict().unwrap().kind(), ErrorKind::StageFailed);
    }

    #[test]
    fn test_concurrent_claims_produce_one_winner() {
        let gate = Arc::new(CrashGate::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let gate = gate.clone();
                std::thread::spawn(move || gate.try_claim(crash(i, &format!("stage {i}"))))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        let verdict = gate.take_verdict().unwrap();
        let stage = verdict.stage().unwrap();
        assert_eq!(verdict.diagnostic(), Some(format!("stage {stage}").as_str()));
    }

    #[tokio::test]
    async fn test_terminated_resolves_after_claim() {
        let gate = Arc::new(CrashGate::new());
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.terminated().await })
        };

        gate.try_claim(crash(0, "boom"));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_guard_terminates_on_drop() {
        let gate = Arc::new(CrashGate::new());
        {
            let _guard = TerminateOnDrop::new(gate.clone());
        }
        assert!(gate.is_terminating());
    }

    #[test]
    fn test_disarmed_guard_is_inert() {
        let gate = Arc::new(CrashGate::new());
        {
            let mut guard = TerminateOnDrop::new(gate.clone());
            guard.disarm();
        }
        assert!(!gate.is_terminating());
    }
}
