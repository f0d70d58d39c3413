use serde::{Deserialize, Serialize};

/// How closely one validator tracked a reconstructed chain over a
/// window. `score` is `validated / (validated + missed)` rounded to 5
/// decimals, and exactly 0 when the window holds no ledgers.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AgreementScore {
    pub validated: u64,
    pub missed: u64,
    pub score: f64,
    pub incomplete: bool,
}

impl AgreementScore {
    pub fn new(validated: u64, missed: u64, incomplete: bool) -> Self {
        let mut score = AgreementScore {
            validated,
            missed,
            score: 0.0,
            incomplete,
        };
        score.rescore();
        score
    }

    pub fn total(&self) -> u64 {
        self.validated + self.missed
    }

    /// Fold another window's counts into this one. Used when rolling
    /// hourly rows up into 24-hour, 30-day and daily summaries.
    pub fn accumulate(&mut self, other: &AgreementScore) {
        self.validated += other.validated;
        self.missed += other.missed;
        self.incomplete = self.incomplete || other.incomplete;
        self.rescore();
    }

    fn rescore(&mut self) {
        let total = self.total();
        self.score = if total == 0 {
            0.0
        } else {
            let raw = self.validated as f64 / total as f64;
            (raw * 100_000.0).round() / 100_000.0
        };
    }
}
