/// Completed and total units of some population phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulationProgress {
    pub completed: u64,
    pub total: u64,
}

impl PopulationProgress {
    /// Nothing known yet.
    pub const NONE: Self = Self::single(0, 0);

    pub const DONE: Self = Self::single(1, 1);

    const RESOLUTION: u64 = 1_000_000;

    #[must_use]
    pub const fn single(completed: u64, total: u64) -> Self {
        Self { completed, total }
    }

    /// Completed share in `0.0..=1.0`; zero while the total is unknown.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // an estimate
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.completed.min(self.total) as f64) / (self.total as f64)
        }
    }

    /// Combine phases, each counted by its weight.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn weighted(parts: &[(Self, u32)]) -> Self {
        let total_weight: u32 = parts.iter().map(|&(_, weight)| weight).sum();
        if total_weight == 0 {
            return Self::NONE;
        }
        let fraction = parts
            .iter()
            .map(|(part, weight)| part.fraction() * f64::from(*weight))
            .sum::<f64>()
            / f64::from(total_weight);
        Self::single(
            (fraction * Self::RESOLUTION as f64).round() as u64,
            Self::RESOLUTION,
        )
    }
}
