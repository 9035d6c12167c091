// Debounced autosave deadline.
//
// The scheduler only tracks *when* a save is due. It never captures buffer
// content: the session reads the buffer at fire time, so a save can never
// persist a value older than the latest commit.

use std::time::Duration;

use tokio::time::Instant;

/// Tracks the pending debounced save, if any.
#[derive(Debug, Clone)]
pub struct AutosaveScheduler {
    window: Duration,
    deadline: Option<Instant>,
}

impl AutosaveScheduler {
    pub fn new(window: Duration) -> Self {
        Self { window, deadline: None }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Arm (or re-arm) the timer after a mutation.
    pub fn arm(&mut self) {
        self.arm_at(Instant::now());
    }

    /// Like `arm` but with a specific timestamp (for testing).
    fn arm_at(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    /// Drop the pending save. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consume the deadline if it has elapsed. Returns true when a save is due.
    pub fn take_due(&mut self) -> bool {
        self.take_due_at(Instant::now())
    }

    /// Like `take_due` but with a specific timestamp (for testing).
    fn take_due_at(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
