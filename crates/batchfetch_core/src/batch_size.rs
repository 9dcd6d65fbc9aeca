pub const DEFAULT_FLOOR: u64 = 100;
pub const DEFAULT_CEILING: u64 = 1000;

/// Current page size plus the bounds it moves between.
///
/// `floor <= current <= ceiling` holds for every value produced by this type:
/// `grow` doubles up to `ceiling`, `shrink` halves down to `floor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSizeState {
    current: u64,
    floor: u64,
    ceiling: u64,
}

impl BatchSizeState {
    /// Clamp `requested` into `[floor, ceiling]`.
    ///
    /// A zero floor is raised to 1 and a ceiling below the floor is raised to the
    /// floor, so the bounds are always usable.
    pub fn initial(floor: u64, ceiling: u64, requested: u64) -> Self {
        let floor = floor.max(1);
        let ceiling = ceiling.max(floor);
        Self {
            current: requested.clamp(floor, ceiling),
            floor,
            ceiling,
        }
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn floor(&self) -> u64 {
        self.floor
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Double the batch size, capped at the ceiling.
    #[must_use]
    pub fn grow(self) -> Self {
        Self {
            current: self.current.saturating_mul(2).min(self.ceiling),
            ..self
        }
    }

    /// Halve the batch size, never going below the floor.
    #[must_use]
    pub fn shrink(self) -> Self {
        Self {
            current: (self.current / 2).max(self.floor),
            ..self
        }
    }

    /// Whether a size-attributable rejection can still be answered by shrinking.
    pub fn can_shrink(&self) -> bool {
        self.current > self.floor
    }
}

impl Default for BatchSizeState {
    fn default() -> Self {
        Self::initial(DEFAULT_FLOOR, DEFAULT_CEILING, DEFAULT_FLOOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_clamps_into_bounds() {
        assert_eq!(BatchSizeState::initial(100, 1000, 5).current(), 100);
        assert_eq!(BatchSizeState::initial(100, 1000, 5000).current(), 1000);
        assert_eq!(BatchSizeState::initial(100, 1000, 250).current(), 250);
    }

    #[test]
    fn degenerate_bounds_are_repaired() {
        let state = BatchSizeState::initial(0, 0, 0);
        assert_eq!(state.floor(), 1);
        assert_eq!(state.ceiling(), 1);
        assert_eq!(state.current(), 1);

        let state = BatchSizeState::initial(500, 100, 50);
        assert_eq!(state.ceiling(), 500);
        assert_eq!(state.current(), 500);
    }
}
