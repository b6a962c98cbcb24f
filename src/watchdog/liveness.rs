use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::util::random::{Random, RngRandom};


#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verdict {
    /// there was no probe to verify
    NoProbe,
    Alive,
    /// a probe was sent and its echo did not arrive in time
    Dead,
}


#[derive(Debug, Default)]
struct LivenessInner {
    probe_in_flight: bool,
    last_probe_verified: bool,
    /// kept after verification so that a late echo is still recognized as one
    token: Option<String>,
}

/// Bookkeeping for the liveness probes of one engine: the prober starts a probe, the dispatcher
///  confirms it when the echo arrives, and the verifier checks the outcome.
#[derive(Debug, Default)]
pub struct LivenessState {
    inner: Mutex<LivenessInner>,
}
impl LivenessState {
    pub fn new() -> LivenessState {
        Default::default()
    }

    fn lock(&self) -> MutexGuard<'_, LivenessInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts a new probe, returning the token to send to ourselves
    pub fn begin_probe(&self) -> String {
        let token = format!("probe-{:016x}", RngRandom::next_u64());

        let mut inner = self.lock();
        inner.probe_in_flight = true;
        inner.last_probe_verified = false;
        inner.token = Some(token.clone());
        token
    }

    /// Returns `true` if `text` is a probe's echo, i.e. it should not be treated as a message
    pub fn confirm(&self, text: &str) -> bool {
        let mut inner = self.lock();
        if inner.token.as_deref() != Some(text.trim()) {
            return false;
        }
        if inner.probe_in_flight {
            debug!("liveness probe was echoed");
            inner.last_probe_verified = true;
        }
        true
    }

    /// Concludes the probe in flight, if any
    pub fn verify(&self) -> Verdict {
        let mut inner = self.lock();
        if !inner.probe_in_flight {
            return Verdict::NoProbe;
        }

        inner.probe_in_flight = false;
        if inner.last_probe_verified {
            Verdict::Alive
        }
        else {
            Verdict::Dead
        }
    }

    pub fn reset(&self) {
        *self.lock() = Default::default();
    }

    pub fn is_probe_in_flight(&self) -> bool {
        self.lock().probe_in_flight
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_echoed_probe_is_alive() {
        let liveness = LivenessState::new();
        let token = liveness.begin_probe();

        assert!(liveness.is_probe_in_flight());
        assert!(liveness.confirm(&format!(" {} ", token)));
        assert_eq!(liveness.verify(), Verdict::Alive);
        assert!(!liveness.is_probe_in_flight());
    }

    #[test]
    fn test_missing_echo_is_dead() {
        let liveness = LivenessState::new();
        let token = liveness.begin_probe();

        assert!(!liveness.confirm("something else"));
        assert_eq!(liveness.verify(), Verdict::Dead);
        assert_eq!(liveness.verify(), Verdict::NoProbe);

        // a late echo is still swallowed, but does not revive anything
        assert!(liveness.confirm(&token));
        assert_eq!(liveness.verify(), Verdict::NoProbe);
    }

    #[test]
    fn test_new_probe_invalidates_old_token() {
        let liveness = LivenessState::new();
        let old = liveness.begin_probe();
        let new = liveness.begin_probe();

        assert_ne!(old, new);
        assert!(!liveness.confirm(&old));
        assert_eq!(liveness.verify(), Verdict::Dead);
    }

    #[test]
    fn test_reset() {
        let liveness = LivenessState::new();
        let token = liveness.begin_probe();
        liveness.reset();

        assert!(!liveness.confirm(&token));
        assert_eq!(liveness.verify(), Verdict::NoProbe);
    }
}
