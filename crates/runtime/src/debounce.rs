use foundation::Time;

/// Trailing-edge debouncer driven by caller-supplied time.
///
/// Each `notify` pushes the deadline out by `delay_s`; `poll` fires once when
/// the deadline has passed.
#[derive(Debug, Clone, PartialEq)]
pub struct Debouncer {
    delay_s: f64,
    deadline: Option<Time>,
}

impl Debouncer {
    pub fn new(delay_s: f64) -> Self {
        Self {
            delay_s: delay_s.max(0.0),
            deadline: None,
        }
    }

    pub fn delay_s(&self) -> f64 {
        self.delay_s
    }

    pub fn notify(&mut self, now: Time) {
        self.deadline = Some(now.after(self.delay_s));
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Returns `true` exactly once per burst of notifications.
    pub fn poll(&mut self, now: Time) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
