//! Generation counters for discarding superseded asynchronous results.
//!
//! A producer stamps each request with the generation current at the time it
//! was issued; a result is applied only if its stamp is still the latest.

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

#[derive(Debug, Default, Clone)]
pub struct GenerationCounter {
    current: Generation,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new generation, superseding every earlier one.
    pub fn advance(&mut self) -> Generation {
        self.current = Generation(self.current.0.wrapping_add(1));
        self.current
    }

    pub fn current(&self) -> Generation {
        self.current
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        generation == self.current
    }
}

/// Identifies one outstanding request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(pub u64);

#[derive(Debug, Default, Clone)]
pub struct TicketIssuer {
    next: u64,
}

impl TicketIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self) -> Ticket {
        let t = Ticket(self.next);
        self.next = self.next.wrapping_add(1);
        t
    }
}
