//! Probability quantization.
//!
//! Observed probabilities become small integer levels by equal-width
//! bucketing of `-ln(p)` over each table's observed span:
//!
//! ```text
//! level(p) = min(top, floor(ln(p_max / p) / w)),   w = ln(p_max / p_min) / (top + 1)
//! ```
//!
//! with `top = max_level - 1`. The top level `max_level` is reserved for
//! unseen events (smoothing) and is never assigned to an observed one, except
//! when `max_level == 0` where everything shares level 0.

use std::collections::BTreeMap;

use crate::alphabet::Symbol;
use crate::counter::NgramCounts;
use crate::error::{CoreError, Result};
use crate::ruleset::{Level, LevelTables};

/// Ratios closer than this to 1 are treated as a single bucket.
const FLAT_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
pub struct Quantizer {
    max_level: Level,
}

impl Quantizer {
    pub fn new(max_level: Level) -> Self {
        Self { max_level }
    }

    /// Level reserved for events never observed in training.
    pub fn smoothing_level(&self) -> Level {
        self.max_level
    }

    /// Highest level an observed event can receive.
    pub fn top(&self) -> Level {
        self.max_level.saturating_sub(1)
    }

    /// Quantize one table. Entries with non-positive probability are
    /// treated as unseen and left out.
    pub fn levels<K: Ord + Copy>(&self, probs: &[(K, f64)]) -> BTreeMap<K, Level> {
        let observed = probs.iter().filter(|(_, p)| *p > 0.0);
        let (p_max, p_min) = observed
            .clone()
            .fold((0.0f64, f64::INFINITY), |(hi, lo), &(_, p)| (hi.max(p), lo.min(p)));

        let top = self.top();
        let span = (p_max / p_min).ln();
        if top == 0 || !span.is_finite() || span < FLAT_EPSILON {
            return observed.map(|&(k, _)| (k, 0)).collect();
        }

        let width = span / (top as f64 + 1.0);
        observed
            .map(|&(k, p)| {
                let bucket = ((p_max / p).ln() / width).floor();
                (k, (bucket.max(0.0) as Level).min(top))
            })
            .collect()
    }

    /// Turn raw training counts into level tables.
    pub fn quantize(&self, counts: &NgramCounts) -> Result<LevelTables> {
        let total = counts.passwords();
        if total == 0 {
            return Err(CoreError::InsufficientData(format!(
                "no usable password in the training corpus ({} discarded)",
                counts.discards().total()
            )));
        }

        let length_probs: Vec<(usize, f64)> = counts
            .lengths()
            .iter()
            .enumerate()
            .map(|(i, &n)| (i, n as f64 / total as f64))
            .collect();
        let length_levels = self.levels(&length_probs);
        let lengths = (0..counts.max_length())
            .map(|i| length_levels.get(&i).copied().unwrap_or(self.max_level))
            .collect();

        let long_total: u64 = counts.ip().values().sum();
        let ip = self.levels(&relative(counts.ip().iter(), long_total));

        let short = counts
            .short()
            .iter()
            .enumerate()
            .map(|(i, table)| self.levels(&relative(table.iter(), counts.lengths()[i])))
            .collect();

        let mut transitions = Vec::new();
        for (&ctx, row) in counts.cp() {
            let row_total: u64 = row.values().sum();
            for (&sym, &n) in row {
                transitions.push(((ctx, sym), n as f64 / row_total as f64));
            }
        }
        let mut cp: BTreeMap<u64, BTreeMap<Symbol, Level>> = BTreeMap::new();
        for ((ctx, sym), level) in self.levels(&transitions) {
            cp.entry(ctx).or_default().insert(sym, level);
        }

        let endings: Vec<(u64, f64)> = counts
            .ep()
            .iter()
            .map(|(&ctx, &ends)| {
                let continues: u64 = counts.cp().get(&ctx).map_or(0, |row| row.values().sum());
                (ctx, ends as f64 / (ends + continues) as f64)
            })
            .collect();
        let ep = self.levels(&endings);

        Ok(LevelTables {
            ip,
            short,
            cp,
            ep,
            lengths,
        })
    }
}

fn relative<'a>(table: impl Iterator<Item = (&'a u64, &'a u64)>, total: u64) -> Vec<(u64, f64)> {
    if total == 0 {
        return Vec::new();
    }
    table
        .map(|(&code, &n)| (code, n as f64 / total as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;

    #[test]
    fn test_most_probable_gets_level_zero() {
        let q = Quantizer::new(10);
        let levels = q.levels(&[(1u32, 0.5), (2, 0.25), (3, 0.25)]);
        assert_eq!(levels[&1], 0);
        assert_eq!(levels[&2], 9);
        assert_eq!(levels[&3], 9);
    }

    #[test]
    fn test_flat_table_is_all_zero() {
        let q = Quantizer::new(10);
        let levels = q.levels(&[(1u32, 0.2), (2, 0.2)]);
        assert!(levels.values().all(|&l| l == 0));
    }

    #[test]
    fn test_zero_probability_left_unseen() {
        let q = Quantizer::new(10);
        let levels = q.levels(&[(1u32, 0.7), (2, 0.0)]);
        assert_eq!(levels.len(), 1);
    }

    #[test]
    fn test_observed_levels_never_reach_smoothing() {
        let q = Quantizer::new(4);
        let probs: Vec<(u32, f64)> = (1..50).map(|i| (i, 1.0 / (i * i) as f64)).collect();
        let levels = q.levels(&probs);
        assert!(levels.values().all(|&l| l < q.smoothing_level()));
        assert_eq!(levels.values().max(), Some(&3));
    }

    #[test]
    fn test_max_level_zero_collapses() {
        let q = Quantizer::new(0);
        let levels = q.levels(&[(1u32, 0.9), (2, 0.1)]);
        assert!(levels.values().all(|&l| l == 0));
        assert_eq!(q.smoothing_level(), 0);
    }

    #[test]
    fn test_monotonic_on_ladder() {
        let q = Quantizer::new(10);
        let probs: Vec<(u32, f64)> = (0..30).map(|i| (i, 0.8f64.powi(i as i32))).collect();
        let levels = q.levels(&probs);
        for i in 1..30u32 {
            assert!(levels[&(i - 1)] <= levels[&i]);
        }
    }

    #[test]
    fn test_quantize_empty_corpus_is_insufficient() {
        let counts = NgramCounts::new(5, 2, 20).unwrap();
        let err = Quantizer::new(10).quantize(&counts).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientData(_)));
    }

    #[test]
    fn test_quantize_successor_levels() {
        let a = Alphabet::new("abcde".chars()).unwrap();
        let mut counts = NgramCounts::new(a.len(), 2, 20).unwrap();
        for pw in ["abc", "abd", "abc", "abe"] {
            counts.observe(&a, pw);
        }
        let tables = Quantizer::new(10).quantize(&counts).unwrap();
        let row = &tables.cp[&1];
        assert!(row[&2] < row[&3]);
        assert_eq!(row[&3], row[&4]);
        assert_eq!(tables.lengths[2], 0);
        // unseen lengths carry the smoothing level
        assert_eq!(tables.lengths[0], 10);
    }
}
