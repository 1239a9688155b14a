/// Value written for any statistic that has no qualifying history.
pub const NEUTRAL: f64 = 0.0;

/// Outcome of a single statistic: either observed, or explicitly missing.
///
/// Missing values collapse to [`NEUTRAL`] when a row is materialised, so every code
/// path that runs out of history produces the same bytes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Measured {
    Observed(f64),
    #[default]
    Missing,
}

impl Measured {
    pub fn from_option(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Measured::Observed(v),
            _ => Measured::Missing,
        }
    }

    /// `numerator / denominator`, missing when the denominator is zero.
    pub fn ratio(numerator: usize, denominator: usize) -> Self {
        if denominator == 0 {
            Measured::Missing
        } else {
            Measured::Observed(numerator as f64 / denominator as f64)
        }
    }

    /// Arithmetic mean, missing for an empty input.
    pub fn mean<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let (sum, count) = values
            .into_iter()
            .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
        if count == 0 {
            Measured::Missing
        } else {
            Measured::from_option(Some(sum / count as f64))
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Measured::Missing)
    }

    /// Materialised value, [`NEUTRAL`] when missing or non-finite.
    pub fn value(self) -> f64 {
        match self {
            Measured::Observed(v) if v.is_finite() => v,
            _ => NEUTRAL,
        }
    }
}

impl From<f64> for Measured {
    fn from(value: f64) -> Self {
        Measured::from_option(Some(value))
    }
}
