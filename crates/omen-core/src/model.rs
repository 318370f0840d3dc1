//! Runtime index over a [`Ruleset`] for enumeration and scoring.
//!
//! Tables are regrouped by level so that "every gram at level x" and
//! "every successor of this context at level x" are contiguous slices.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::alphabet::{Alphabet, Symbol};
use crate::codec::GramCodec;
use crate::error::{CoreError, Result};
use crate::ruleset::{Level, Ruleset};

/// A set of contexts reachable under some level-vector prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frontier {
    /// Too large to track. Never prunes.
    Open,
    /// Sorted, deduplicated context codes.
    Known(Vec<u64>),
}

impl Frontier {
    pub fn is_empty(&self) -> bool {
        matches!(self, Frontier::Known(codes) if codes.is_empty())
    }

    /// Whether `code` may be in the set. Always true when open.
    pub fn admits(&self, code: u64) -> bool {
        match self {
            Frontier::Open => true,
            Frontier::Known(codes) => codes.binary_search(&code).is_ok(),
        }
    }

    /// Whether the two sets can share a context.
    pub fn meets(&self, other: &Frontier) -> bool {
        let (a, b) = match (self, other) {
            (Frontier::Known(a), Frontier::Known(b)) => (a, b),
            (Frontier::Known(codes), Frontier::Open) | (Frontier::Open, Frontier::Known(codes)) => {
                return !codes.is_empty();
            }
            (Frontier::Open, Frontier::Open) => return true,
        };
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => return true,
            }
        }
        false
    }

    /// The codes as a sorted slice, or `None` when open.
    pub fn known(&self) -> Option<&[u64]> {
        match self {
            Frontier::Open => None,
            Frontier::Known(codes) => Some(codes),
        }
    }

    pub(crate) fn bounded(mut codes: Vec<u64>, limit: usize) -> Self {
        codes.sort_unstable();
        codes.dedup();
        if codes.len() > limit {
            Frontier::Open
        } else {
            Frontier::Known(codes)
        }
    }
}

/// Initial (or short) grams grouped by level.
#[derive(Debug, Clone)]
pub struct GramTable {
    codec: GramCodec,
    levels: HashMap<u64, Level>,
    /// Observed codes sorted by (level, code).
    by_level: Vec<u64>,
    /// `by_level[starts[x]..starts[x + 1]]` holds the codes at level x.
    starts: Vec<usize>,
    smoothing: Level,
}

impl GramTable {
    fn new(codec: GramCodec, entries: &BTreeMap<u64, Level>, smoothing: Level) -> Self {
        let mut sorted: Vec<(Level, u64)> = entries.iter().map(|(&c, &l)| (l, c)).collect();
        sorted.sort_unstable();
        let starts = level_starts(sorted.iter().map(|&(l, _)| l), smoothing);
        Self {
            codec,
            levels: entries.iter().map(|(&c, &l)| (c, l)).collect(),
            by_level: sorted.into_iter().map(|(_, c)| c).collect(),
            starts,
            smoothing,
        }
    }

    pub fn codec(&self) -> GramCodec {
        self.codec
    }

    pub fn level(&self, code: u64) -> Level {
        self.levels.get(&code).copied().unwrap_or(self.smoothing)
    }

    /// Observed codes at `level`, in code order.
    pub fn observed_at(&self, level: Level) -> &[u64] {
        slice_at(&self.by_level, &self.starts, level)
    }

    /// Number of codes never seen in training.
    pub fn unseen_count(&self) -> u64 {
        self.codec.space() - self.levels.len() as u64
    }

    /// The first gram at `level` whose pick index is `>= from`.
    ///
    /// Observed grams come first, in code order. At the smoothing level the
    /// unseen grams follow, also in code order; their pick index is
    /// `observed + code`, so it is strictly increasing and resumable.
    /// `within`, when given, is a sorted list outside of which no gram can
    /// be completed; the rest are skipped without changing the order or the
    /// pick index of what remains.
    pub fn pick(&self, level: Level, from: u64, within: Option<&[u64]>) -> Option<(u64, u64)> {
        let observed = self.observed_at(level);
        let seen = observed.len() as u64;
        if from < seen {
            let admits = |code: &u64| within.is_none_or(|codes| codes.binary_search(code).is_ok());
            let skip = from as usize;
            if let Some(i) = observed[skip..].iter().position(admits) {
                return Some(((skip + i) as u64, observed[skip + i]));
            }
        }
        if level != self.smoothing {
            return None;
        }
        let start = from.saturating_sub(seen);
        let unseen = |code: &u64| !self.levels.contains_key(code);
        let code = match within {
            Some(codes) => {
                let i = codes.partition_point(|&c| c < start);
                codes[i..].iter().copied().find(unseen)
            }
            None => (start..self.codec.space()).find(unseen),
        };
        code.map(|code| (seen + code, code))
    }

    /// All codes at `level` as a frontier, or [`Frontier::Open`] when there
    /// are more than `limit`.
    pub fn frontier(&self, level: Level, limit: usize) -> Frontier {
        let observed = self.observed_at(level);
        if level != self.smoothing {
            return Frontier::bounded(observed.to_vec(), limit);
        }
        if observed.len() as u64 + self.unseen_count() > limit as u64 {
            return Frontier::Open;
        }
        let mut codes = observed.to_vec();
        codes.extend((0..self.codec.space()).filter(|code| !self.levels.contains_key(code)));
        Frontier::bounded(codes, limit)
    }

    pub fn len(&self) -> usize {
        self.by_level.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_level.is_empty()
    }
}

/// Successors of one context, grouped by transition level.
#[derive(Debug, Clone)]
pub struct Row {
    /// Level per symbol id.
    levels: Vec<Level>,
    /// Every symbol, sorted by (level, symbol).
    by_level: Vec<Symbol>,
    starts: Vec<usize>,
}

impl Row {
    fn new(
        alphabet_size: usize,
        observed: Option<&BTreeMap<Symbol, Level>>,
        smoothing: Level,
    ) -> Self {
        let mut levels = vec![smoothing; alphabet_size];
        if let Some(observed) = observed {
            for (&sym, &level) in observed {
                levels[sym as usize] = level;
            }
        }
        let mut sorted: Vec<(Level, Symbol)> = levels
            .iter()
            .enumerate()
            .map(|(s, &l)| (l, s as Symbol))
            .collect();
        sorted.sort_unstable();
        Self {
            starts: level_starts(sorted.iter().map(|&(l, _)| l), smoothing),
            by_level: sorted.into_iter().map(|(_, s)| s).collect(),
            levels,
        }
    }

    /// Symbols whose transition level is exactly `level`, in id order.
    pub fn at(&self, level: Level) -> &[Symbol] {
        slice_at(&self.by_level, &self.starts, level)
    }

    pub fn level(&self, symbol: Symbol) -> Level {
        self.levels[symbol as usize]
    }
}

/// Per-part levels of one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelBreakdown {
    pub length: Level,
    /// Initial gram level, or the short-gram level for passwords shorter
    /// than the context.
    pub initial: Level,
    pub transitions: Vec<Level>,
    /// `None` for short passwords, which have no end event.
    pub end: Option<Level>,
}

impl LevelBreakdown {
    pub fn total(&self) -> Level {
        self.length + self.initial + self.transitions.iter().sum::<Level>() + self.end.unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct Model {
    alphabet: Alphabet,
    ngram: usize,
    max_level: Level,
    max_length: usize,
    context: GramCodec,
    initial: GramTable,
    short: Vec<GramTable>,
    rows: HashMap<u64, Row>,
    unseen_row: Row,
    ends: HashMap<u64, Level>,
    /// Per non-smoothing level: every context reachable by one observed
    /// transition at that level, sorted.
    successors: Vec<Vec<u64>>,
    /// Per non-smoothing level: observed transitions as sorted
    /// `(target, source)` context pairs.
    predecessors: Vec<Vec<(u64, u64)>>,
    /// Per non-smoothing level: sorted contexts with an observed transition
    /// at that level.
    sources: Vec<Vec<u64>>,
    /// Per non-smoothing level: sorted contexts whose end event sits there.
    ends_by_level: Vec<Vec<u64>>,
    lengths: Vec<Level>,
    length_order: Vec<usize>,
}

impl Model {
    pub fn new(ruleset: &Ruleset) -> Result<Self> {
        let alphabet = ruleset.alphabet().clone();
        if alphabet.is_empty() {
            return Err(CoreError::EmptyAlphabet);
        }
        let tables = ruleset.tables();
        let smoothing = ruleset.max_level();
        let k = alphabet.len();
        let width = ruleset.ngram() - 1;

        let context = GramCodec::new(k, width)?;
        let short = tables
            .short
            .iter()
            .enumerate()
            .map(|(i, t)| Ok(GramTable::new(GramCodec::new(k, i + 1)?, t, smoothing)))
            .collect::<Result<Vec<_>>>()?;

        let mut successors = vec![Vec::new(); smoothing as usize];
        let mut predecessors = vec![Vec::new(); smoothing as usize];
        let mut sources = vec![Vec::new(); smoothing as usize];
        for (&ctx, row) in &tables.cp {
            for (&sym, &level) in row {
                if level < smoothing {
                    let next = context.shift(ctx, sym);
                    successors[level as usize].push(next);
                    predecessors[level as usize].push((next, ctx));
                    sources[level as usize].push(ctx);
                }
            }
        }
        for codes in successors.iter_mut().chain(&mut sources) {
            codes.sort_unstable();
            codes.dedup();
        }
        for pairs in &mut predecessors {
            pairs.sort_unstable();
        }
        let mut ends_by_level = vec![Vec::new(); smoothing as usize];
        for (&ctx, &level) in &tables.ep {
            if level < smoothing {
                ends_by_level[level as usize].push(ctx);
            }
        }

        let mut length_order: Vec<usize> = (1..=ruleset.max_length()).collect();
        length_order.sort_by_key(|&len| (tables.lengths[len - 1], len));

        Ok(Self {
            ngram: ruleset.ngram(),
            max_level: smoothing,
            max_length: ruleset.max_length(),
            context,
            initial: GramTable::new(context, &tables.ip, smoothing),
            short,
            rows: tables
                .cp
                .iter()
                .map(|(&ctx, row)| (ctx, Row::new(k, Some(row), smoothing)))
                .collect(),
            unseen_row: Row::new(k, None, smoothing),
            ends: tables.ep.iter().map(|(&c, &l)| (c, l)).collect(),
            successors,
            predecessors,
            sources,
            ends_by_level,
            lengths: tables.lengths.clone(),
            length_order,
            alphabet,
        })
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn ngram(&self) -> usize {
        self.ngram
    }

    /// Context width, n - 1.
    pub fn width(&self) -> usize {
        self.ngram - 1
    }

    pub fn max_level(&self) -> Level {
        self.max_level
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn context_codec(&self) -> GramCodec {
        self.context
    }

    pub fn initial(&self) -> &GramTable {
        &self.initial
    }

    /// Whole-password table for `len < n - 1`.
    pub fn short(&self, len: usize) -> &GramTable {
        &self.short[len - 1]
    }

    pub fn row(&self, ctx: u64) -> &Row {
        self.rows.get(&ctx).unwrap_or(&self.unseen_row)
    }

    pub fn end_level(&self, ctx: u64) -> Level {
        self.ends.get(&ctx).copied().unwrap_or(self.max_level)
    }

    /// Every context one observed transition at `level` can lead to, from
    /// any context. Empty at the smoothing level, where unseen rows make
    /// the set unbounded.
    pub fn successors_at(&self, level: Level) -> &[u64] {
        self.successors
            .get(level as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Contexts with an observed transition at `level` into `ctx`, sorted.
    pub fn predecessors_at(&self, level: Level, ctx: u64) -> impl Iterator<Item = u64> + '_ {
        let pairs = self
            .predecessors
            .get(level as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let lo = pairs.partition_point(|&(t, _)| t < ctx);
        let hi = pairs.partition_point(|&(t, _)| t <= ctx);
        pairs[lo..hi].iter().map(|&(_, source)| source)
    }

    /// Contexts with at least one observed transition at `level`.
    pub fn sources_at(&self, level: Level) -> &[u64] {
        self.sources
            .get(level as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Contexts whose observed end event is at `level`. Empty at the
    /// smoothing level.
    pub fn ends_at(&self, level: Level) -> &[u64] {
        self.ends_by_level
            .get(level as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn length_level(&self, len: usize) -> Level {
        self.lengths[len - 1]
    }

    /// Lengths sorted by (length level, length).
    pub fn length_order(&self) -> &[usize] {
        &self.length_order
    }

    /// Highest total level any candidate can have.
    pub fn ceiling(&self) -> Level {
        let slots = self.max_length.saturating_sub(self.width()) as Level + 3;
        self.max_level.saturating_mul(slots)
    }

    /// Level breakdown of `text`, or `None` if it is empty, too long, or
    /// uses characters outside the alphabet.
    pub fn score(&self, text: &str) -> Option<LevelBreakdown> {
        self.score_symbols(&self.alphabet.encode(text)?)
    }

    pub fn score_symbols(&self, symbols: &[Symbol]) -> Option<LevelBreakdown> {
        let len = symbols.len();
        if len == 0 || len > self.max_length {
            return None;
        }
        let length = self.length_level(len);
        let width = self.width();
        if len < width {
            let table = self.short(len);
            return Some(LevelBreakdown {
                length,
                initial: table.level(table.codec().encode(symbols)),
                transitions: Vec::new(),
                end: None,
            });
        }

        let mut ctx = self.context.encode(&symbols[..width]);
        let initial = self.initial.level(ctx);
        let mut transitions = Vec::with_capacity(len - width);
        for &next in &symbols[width..] {
            transitions.push(self.row(ctx).level(next));
            ctx = self.context.shift(ctx, next);
        }
        Some(LevelBreakdown {
            length,
            initial,
            transitions,
            end: Some(self.end_level(ctx)),
        })
    }
}

fn level_starts(sorted_levels: impl Iterator<Item = Level>, top: Level) -> Vec<usize> {
    let mut starts = vec![0usize; top as usize + 2];
    for level in sorted_levels {
        starts[level as usize + 1] += 1;
    }
    for i in 1..starts.len() {
        starts[i] += starts[i - 1];
    }
    starts
}

fn slice_at<'a, T>(items: &'a [T], starts: &[usize], level: Level) -> &'a [T] {
    let i = level as usize;
    if i + 1 >= starts.len() {
        return &[];
    }
    &items[starts[i]..starts[i + 1]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ruleset::LevelTables;
    use crate::ruleset::tests::sample_config;

    /// Bigram model over {a..e}: "ab" then c at level 0, d and e at 5.
    fn model() -> Model {
        let a = Alphabet::new("abcde".chars()).unwrap();
        let tables = LevelTables {
            ip: BTreeMap::from([(0, 0)]),
            short: Vec::new(),
            cp: BTreeMap::from([
                (0, BTreeMap::from([(1, 0)])),
                (1, BTreeMap::from([(2, 0), (3, 5), (4, 5)])),
            ]),
            ep: BTreeMap::from([(2, 0), (3, 0), (4, 0)]),
            lengths: vec![10, 10, 0, 10, 10, 10],
        };
        Model::new(&Ruleset::new("t", sample_config(&a, 2), a, tables).unwrap()).unwrap()
    }

    #[test]
    fn test_row_groups_by_level() {
        let m = model();
        let row = m.row(1);
        assert_eq!(row.at(0), &[2]);
        assert_eq!(row.at(5), &[3, 4]);
        assert_eq!(row.at(10), &[0, 1]);
        assert!(row.at(11).is_empty());
    }

    #[test]
    fn test_unseen_context_row_is_all_smoothing() {
        let m = model();
        assert_eq!(m.row(4).at(10), &[0, 1, 2, 3, 4]);
        assert_eq!(m.end_level(0), 10);
    }

    #[test]
    fn test_pick_observed_then_unseen() {
        let m = model();
        let t = m.initial();
        assert_eq!(t.pick(0, 0, None), Some((0, 0)));
        assert_eq!(t.pick(0, 1, None), None);
        assert_eq!(t.pick(10, 0, None), Some((1, 1)));
        assert_eq!(t.pick(10, 1, None), Some((1, 1)));
        assert_eq!(t.pick(10, 2, None), Some((2, 2)));
        assert_eq!(t.pick(10, 4, None), Some((4, 4)));
        assert_eq!(t.pick(10, 5, None), None);
    }

    #[test]
    fn test_pick_within_keeps_order() {
        let m = model();
        let t = m.initial();
        // gram 0 is observed, so only 1 is left at the smoothing level
        assert_eq!(t.pick(10, 0, Some(&[0, 1])), Some((1, 1)));
        assert_eq!(t.pick(10, 2, Some(&[0, 1])), None);
        assert_eq!(t.pick(10, 0, Some(&[2, 3, 4])), Some((2, 2)));
        assert_eq!(t.pick(10, 4, Some(&[2, 3, 4])), Some((4, 4)));
    }

    #[test]
    fn test_frontier_includes_unseen_at_smoothing() {
        let m = model();
        assert_eq!(m.initial().frontier(10, 100), Frontier::Known(vec![1, 2, 3, 4]));
        assert_eq!(m.initial().frontier(10, 3), Frontier::Open);
        assert!(m.initial().frontier(4, 100).is_empty());
    }

    #[test]
    fn test_successors_by_level() {
        let m = model();
        assert_eq!(m.successors_at(0), &[1, 2]);
        assert_eq!(m.successors_at(5), &[3, 4]);
        assert!(m.successors_at(10).is_empty());
    }

    #[test]
    fn test_predecessors_and_sources() {
        let m = model();
        assert_eq!(m.predecessors_at(0, 2).collect::<Vec<_>>(), vec![1]);
        assert_eq!(m.predecessors_at(5, 4).collect::<Vec<_>>(), vec![1]);
        assert_eq!(m.predecessors_at(0, 1).collect::<Vec<_>>(), vec![0]);
        assert_eq!(m.predecessors_at(0, 3).count(), 0);
        assert_eq!(m.predecessors_at(10, 2).count(), 0);
        assert_eq!(m.sources_at(0), &[0, 1]);
        assert_eq!(m.sources_at(5), &[1]);
        assert_eq!(m.ends_at(0), &[2, 3, 4]);
        assert!(m.ends_at(10).is_empty());
    }

    #[test]
    fn test_pick_within_skips_observed() {
        let m = model();
        // gram 0 is the only observed gram at level 0
        assert_eq!(m.initial().pick(0, 0, Some(&[0, 3])), Some((0, 0)));
        assert_eq!(m.initial().pick(0, 0, Some(&[3])), None);
    }

    #[test]
    fn test_frontier_meets() {
        let a = Frontier::Known(vec![1, 4, 9]);
        assert!(a.meets(&Frontier::Known(vec![2, 9])));
        assert!(!a.meets(&Frontier::Known(vec![2, 3, 10])));
        assert!(a.meets(&Frontier::Open));
        assert!(!Frontier::Open.meets(&Frontier::Known(Vec::new())));
        assert!(a.admits(4) && !a.admits(5));
        assert!(Frontier::Open.admits(5));
    }

    #[test]
    fn test_score_breakdown() {
        let m = model();
        let b = m.score("abd").unwrap();
        assert_eq!(b.initial, 0);
        assert_eq!(b.transitions, vec![0, 5]);
        assert_eq!(b.end, Some(0));
        assert_eq!(b.length, 0);
        assert_eq!(b.total(), 5);
        assert!(m.score("abz").is_none());
        assert!(m.score("").is_none());
    }

    #[test]
    fn test_length_order_and_ceiling() {
        let m = model();
        assert_eq!(m.length_order()[0], 3);
        assert_eq!(&m.length_order()[1..], &[1, 2, 4, 5, 6]);
        // max_length 6, width 1: ip + 5 transitions + ep + length
        assert_eq!(m.ceiling(), 10 * 8);
    }
}
