use std::fmt;

/// How an aggregate stream folds the samples of one window into one value.
///
/// The discriminants are the on-disk encoding and must not change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Reducer {
    Max = 0,
    Min = 1,
    Count = 2,
    Mean = 3,
    Sum = 4,
}

impl Reducer {
    pub const ALL: [Reducer; 5] = [
        Reducer::Max,
        Reducer::Min,
        Reducer::Count,
        Reducer::Mean,
        Reducer::Sum,
    ];

    /// Count streams track events, not a source column; everything else
    /// needs a set index.
    pub fn takes_set_index(self) -> bool {
        !matches!(self, Reducer::Count)
    }

    /// Window value after the first sample of a fresh window.
    ///
    /// There is no sentinel start value: a min stream seeded with 0 holds 0.
    pub fn seed(self, incoming: f64) -> f64 {
        match self {
            Reducer::Count => 1.0,
            _ => incoming,
        }
    }

    /// Fold one more sample into the current window value. `folded` is how
    /// many samples the window already holds; only the mean depends on it.
    pub fn fold(self, prev: f64, incoming: f64, folded: f64) -> f64 {
        match self {
            Reducer::Max => prev.max(incoming),
            Reducer::Min => prev.min(incoming),
            Reducer::Count => prev + 1.0,
            Reducer::Sum => prev + incoming,
            Reducer::Mean => (prev * folded + incoming) / (folded + 1.0),
        }
    }

    /// One-shot fold over a whole window of samples. A window with no
    /// samples reduces to zero for every reducer, the mean included.
    pub fn fold_window(self, samples: impl Iterator<Item = f64>) -> f64 {
        let mut value = 0.0;
        let mut n = 0u64;
        for sample in samples {
            value = if n == 0 { self.seed(sample) } else { self.fold(value, sample, n as f64) };
            n += 1;
        }
        value
    }

    pub fn from_wire(value: u32) -> Option<Reducer> {
        Reducer::ALL.into_iter().find(|r| *r as u32 == value)
    }

    pub fn parse(name: &str) -> Option<Reducer> {
        match name {
            "RRDBMAX" => Some(Reducer::Max),
            "RRDBMIN" => Some(Reducer::Min),
            "RRDBCOUNT" => Some(Reducer::Count),
            "RRDBMEAN" => Some(Reducer::Mean),
            "RRDBSUM" => Some(Reducer::Sum),
            _ => None,
        }
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reducer::Max => "RRDBMAX",
            Reducer::Min => "RRDBMIN",
            Reducer::Count => "RRDBCOUNT",
            Reducer::Mean => "RRDBMEAN",
            Reducer::Sum => "RRDBSUM",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_values() {
        assert_eq!(Reducer::Count.seed(42.0), 1.0);
        assert_eq!(Reducer::Min.seed(0.0), 0.0);
        assert_eq!(Reducer::Sum.seed(42.0), 42.0);
    }

    #[test]
    fn incremental_fold() {
        assert_eq!(Reducer::Max.fold(3.0, 7.0, 1.0), 7.0);
        assert_eq!(Reducer::Min.fold(3.0, 7.0, 1.0), 3.0);
        assert_eq!(Reducer::Count.fold(2.0, 99.0, 2.0), 3.0);
        assert_eq!(Reducer::Sum.fold(10.0, 20.0, 1.0), 30.0);
        // running mean of [10, 20] extended by 30
        assert_eq!(Reducer::Mean.fold(15.0, 30.0, 2.0), 20.0);
    }

    #[test]
    fn window_fold_matches_definitions() {
        let samples = [10.0, 20.0, 30.0];
        assert_eq!(Reducer::Max.fold_window(samples.into_iter()), 30.0);
        assert_eq!(Reducer::Min.fold_window(samples.into_iter()), 10.0);
        assert_eq!(Reducer::Count.fold_window(samples.into_iter()), 3.0);
        assert_eq!(Reducer::Mean.fold_window(samples.into_iter()), 20.0);
        assert_eq!(Reducer::Sum.fold_window(samples.into_iter()), 60.0);
    }

    #[test]
    fn empty_window_folds_to_zero() {
        for r in Reducer::ALL {
            assert_eq!(r.fold_window(std::iter::empty()), 0.0);
        }
    }

    #[test]
    fn parse_and_wire() {
        for r in Reducer::ALL {
            assert_eq!(Reducer::parse(&r.to_string()), Some(r));
            assert_eq!(Reducer::from_wire(r as u32), Some(r));
        }
        assert_eq!(Reducer::parse("RRDBMEDIAN"), None);
        assert_eq!(Reducer::from_wire(9), None);
    }
}
