/// Host-supplied event time, in seconds.
///
/// The engine never reads a wall clock; every time-dependent decision is made
/// against a `Time` the caller passes in, so behaviour can be replayed.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Default)]
pub struct Time(pub f64); // seconds

impl Time {
    pub fn from_millis(ms: f64) -> Self {
        Time(ms / 1000.0)
    }

    pub fn after(self, seconds: f64) -> Self {
        Time(self.0 + seconds)
    }

    pub fn seconds_since(self, earlier: Time) -> f64 {
        self.0 - earlier.0
    }
}

#[cfg(test)]
mod tests {
    use super::Time;

    #[test]
    fn millis_convert_to_seconds() {
        assert_eq!(Time::from_millis(250.0), Time(0.25));
    }

    #[test]
    fn after_and_since_are_inverse() {
        let t0 = Time(10.0);
        let t1 = t0.after(0.2);
        assert!((t1.seconds_since(t0) - 0.2).abs() < 1e-12);
        assert!(t1 > t0);
    }
}
