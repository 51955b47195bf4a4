use std::collections::HashMap;
use std::time::{Duration, Instant};

/// String->string metadata propagated with a call but not part of its
/// arguments. Protocols carry it across the wire untouched.
pub type PassthruMap = HashMap<String, String>;

/// Per-call context: optional deadline plus an optional passthrough map.
///
/// The context is owned by the caller and cheap to clone; transports derive
/// their timeouts from [CallCtx::remaining].
#[derive(Debug, Clone, Default)]
pub struct CallCtx {
    deadline: Option<Instant>,
    passthru: Option<PassthruMap>,
}

impl CallCtx {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an absolute deadline for the call.
    #[inline]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the deadline relative to now.
    #[inline]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, saturating at zero. `None` when no
    /// deadline is set.
    #[inline]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Merge `kv` into the passthrough map; keys in `kv` override existing
    /// ones. The context owns the merged map, so the caller's map does not
    /// alias into concurrent calls.
    pub fn with_passthru(mut self, kv: PassthruMap) -> Self {
        match self.passthru.as_mut() {
            None => self.passthru = Some(kv),
            Some(p) => p.extend(kv),
        }
        self
    }

    #[inline]
    pub fn passthru(&self) -> Option<&PassthruMap> {
        self.passthru.as_ref()
    }
}
