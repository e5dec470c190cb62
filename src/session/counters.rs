//! Client-side burst bookkeeping
//!
//! Decides when the client may move from burst to drain to terminate.

/// Send/receive accounting for one client session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BurstCounters {
    /// Target number of burst payloads
    pub iterations: usize,

    /// Burst payloads issued so far
    pub payloads_issued: usize,

    /// All sends issued (burst payloads and submitted commands), excluding Quit
    pub sends_issued: usize,

    /// Send completions observed, excluding Quit
    pub sends_completed: usize,

    /// Messages received from the server
    pub receives: usize,

    /// Messages the server is expected to send back
    pub expected_receives: usize,

    pub quit_sent: bool,
    pub quit_acknowledged: bool,
}

impl BurstCounters {
    pub fn new(iterations: usize) -> Self {
        Self {
            iterations,
            ..Self::default()
        }
    }

    /// Burst payloads still to be issued
    pub fn burst_remaining(&self) -> usize {
        self.iterations.saturating_sub(self.payloads_issued)
    }

    /// Record an issued send; `expects_reply` adds one expected receive
    pub fn record_send(&mut self, expects_reply: bool) {
        self.sends_issued += 1;
        if expects_reply {
            self.expected_receives += 1;
        }
    }

    pub fn record_completion(&mut self) {
        self.sends_completed += 1;
    }

    pub fn record_receive(&mut self) {
        self.receives += 1;
    }

    pub fn pending_sends(&self) -> usize {
        self.sends_issued.saturating_sub(self.sends_completed)
    }

    pub fn pending_receives(&self) -> usize {
        self.expected_receives.saturating_sub(self.receives)
    }

    /// Every issued send has completed and every expected message arrived
    pub fn reconciled(&self) -> bool {
        self.pending_sends() == 0 && self.pending_receives() == 0
    }
}
