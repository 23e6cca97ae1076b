/// Axis-aligned 2D extent, `[min_x, min_y]` to `[max_x, max_y]`.
///
/// An extent carries no projection tag of its own; whoever holds one knows
/// which projection its numbers are in, the same way a bare `[f64; 2]` does.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Extent {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl Extent {
    pub fn new(min: [f64; 2], max: [f64; 2]) -> Self {
        Extent { min, max }
    }

    /// The inverted extent that any `extend` call will overwrite.
    pub fn empty() -> Self {
        Extent {
            min: [f64::INFINITY, f64::INFINITY],
            max: [f64::NEG_INFINITY, f64::NEG_INFINITY],
        }
    }

    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = [f64; 2]>,
    {
        let mut out = Self::empty();
        for p in points {
            out.extend(p);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.max[0] < self.min[0] || self.max[1] < self.min[1]
    }

    pub fn extend(&mut self, p: [f64; 2]) {
        self.min[0] = self.min[0].min(p[0]);
        self.min[1] = self.min[1].min(p[1]);
        self.max[0] = self.max[0].max(p[0]);
        self.max[1] = self.max[1].max(p[1]);
    }

    pub fn union(&self, other: &Extent) -> Extent {
        let mut out = *self;
        if !other.is_empty() {
            out.extend(other.min);
            out.extend(other.max);
        }
        out
    }

    /// Grows the extent by `value` on every side.
    pub fn buffer(&self, value: f64) -> Extent {
        if self.is_empty() {
            return *self;
        }
        Extent::new(
            [self.min[0] - value, self.min[1] - value],
            [self.max[0] + value, self.max[1] + value],
        )
    }

    pub fn width(&self) -> f64 {
        (self.max[0] - self.min[0]).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.max[1] - self.min[1]).max(0.0)
    }

    pub fn center(&self) -> [f64; 2] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
        ]
    }

    pub fn contains(&self, p: [f64; 2]) -> bool {
        p[0] >= self.min[0] && p[0] <= self.max[0] && p[1] >= self.min[1] && p[1] <= self.max[1]
    }

    /// Closed-interval overlap test; touching edges count as intersecting.
    pub fn intersects(&self, other: &Extent) -> bool {
        !(self.is_empty()
            || other.is_empty()
            || other.min[0] > self.max[0]
            || other.max[0] < self.min[0]
            || other.min[1] > self.max[1]
            || other.max[1] < self.min[1])
    }
}
