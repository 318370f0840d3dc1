//! Ordered guess enumeration.
//!
//! Candidates come out in non-decreasing total level. For each target level
//! T the engine walks lengths in (length level, length) order, and for each
//! length every level vector `[ip, cp_1, .., cp_m, ep]` summing to
//! `T - length_level`, in lexicographic order. Each vector is expanded
//! depth-first into the strings that realize it.
//!
//! Two pruning passes keep the walk proportional to its output. Forward
//! frontiers bound the contexts a vector prefix can reach; completion sets
//! bound the contexts from which the rest of the vector can still be
//! realized. Completion sets depend only on the vector suffix and are cached
//! by it.
//!
//! All state lives in [`Cursor`]-shaped fields, so the engine can stop after
//! any emission and [`Enumerator::resume`] continues exactly there.

use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::alphabet::Symbol;
use crate::composition::{advance_composition, first_composition, is_composition};
use crate::constants::FRONTIER_LIMIT;
use crate::error::{CoreError, Result};
use crate::model::{Frontier, Model};
use crate::ruleset::Level;

/// Serializable engine position.
///
/// `levels` empty means nothing has been emitted at `(target,
/// length_index)` yet. Otherwise `picks` identifies the last emitted
/// realization of `levels`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub target: Level,
    pub length_index: usize,
    pub levels: Vec<Level>,
    pub picks: Vec<u64>,
    pub emitted: u64,
}

impl Cursor {
    pub fn start() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guess {
    pub text: String,
    pub level: Level,
}

/// Completion sets grow to this multiple of the frontier limit before
/// going open.
const COMPLETION_SCALE: usize = 64;

/// Cached completion codes kept before the cache starts over.
const COMPLETION_CACHE_CODES: usize = 1 << 22;

#[derive(Debug, Clone, Copy)]
struct Frame {
    pick: u64,
    ctx: u64,
}

/// Completion sets keyed by the level suffix they complete.
#[derive(Default)]
struct CompletionCache {
    sets: HashMap<Vec<Level>, Rc<Frontier>>,
    codes: usize,
}

impl CompletionCache {
    fn get(&self, suffix: &[Level]) -> Option<Rc<Frontier>> {
        self.sets.get(suffix).cloned()
    }

    fn insert(&mut self, suffix: &[Level], set: Rc<Frontier>) {
        let size = set.known().map_or(0, <[u64]>::len);
        if self.codes + size > COMPLETION_CACHE_CODES {
            self.sets.clear();
            self.codes = 0;
        }
        self.codes += size;
        self.sets.insert(suffix.to_vec(), set);
    }
}

pub struct Enumerator<'m> {
    model: &'m Model,
    ceiling: Level,
    target: Level,
    length_index: usize,
    levels: Vec<Level>,
    frontiers: Vec<Frontier>,
    /// Per picking depth: contexts from which the rest of the current
    /// vector can be realized.
    completions: Vec<Rc<Frontier>>,
    completion_cache: CompletionCache,
    stack: Vec<Frame>,
    symbols: Vec<Symbol>,
    emitted: u64,
    frontier_limit: usize,
    completion_limit: usize,
}

impl<'m> Enumerator<'m> {
    pub fn new(model: &'m Model) -> Self {
        Self {
            model,
            ceiling: model.ceiling(),
            target: 0,
            length_index: 0,
            levels: Vec::new(),
            frontiers: Vec::new(),
            completions: Vec::new(),
            completion_cache: CompletionCache::default(),
            stack: Vec::new(),
            symbols: Vec::with_capacity(model.max_length()),
            emitted: 0,
            frontier_limit: FRONTIER_LIMIT,
            completion_limit: FRONTIER_LIMIT * COMPLETION_SCALE,
        }
    }

    /// Override the frontier size above which pruning stops. Completion
    /// sets scale with it; zero turns both passes off.
    pub fn with_frontier_limit(mut self, limit: usize) -> Self {
        self.frontier_limit = limit;
        self.completion_limit = limit.saturating_mul(COMPLETION_SCALE);
        self
    }

    /// Rebuild the engine at `cursor`. The next guess is the one right
    /// after the last guess the cursor recorded.
    pub fn resume(model: &'m Model, cursor: &Cursor) -> Result<Self> {
        let mut e = Self::new(model);
        e.target = cursor.target;
        e.length_index = cursor.length_index;
        e.emitted = cursor.emitted;
        if e.is_exhausted() {
            return Ok(e);
        }

        let invalid = |msg: String| Err(CoreError::InvalidCursor(msg));
        let Some(&len) = model.length_order().get(cursor.length_index) else {
            return invalid(format!("length index {} out of range", cursor.length_index));
        };
        let len_level = model.length_level(len);
        if len_level > cursor.target {
            return invalid(format!(
                "length {len} has level {len_level}, above target {}",
                cursor.target
            ));
        }
        if cursor.levels.is_empty() {
            if !cursor.picks.is_empty() {
                return invalid("picks recorded without a level vector".to_string());
            }
            return Ok(e);
        }

        let budget = cursor.target - len_level;
        if cursor.levels.len() != e.slots_for(len)
            || !is_composition(&cursor.levels, budget, model.max_level())
        {
            return invalid(format!(
                "level vector {:?} does not sum to {budget} over {} slots",
                cursor.levels,
                e.slots_for(len)
            ));
        }
        e.levels = cursor.levels.clone();
        for j in 0..e.choices() {
            let f = e.frontier_at(j);
            e.frontiers.push(f);
        }
        e.load_completions();

        if cursor.picks.is_empty() {
            return Ok(e);
        }
        if cursor.picks.len() != e.choices() {
            return invalid(format!(
                "{} picks for a {}-choice vector",
                cursor.picks.len(),
                e.choices()
            ));
        }
        for (depth, &pick) in cursor.picks.iter().enumerate() {
            match e.option(depth, pick) {
                Some(frame) if frame.pick == pick => e.push(depth, frame),
                _ => return invalid(format!("pick {pick} at slot {depth} is not a valid choice")),
            }
        }
        if !e.end_matches() {
            return invalid("recorded guess does not realize its end level".to_string());
        }
        Ok(e)
    }

    pub fn cursor(&self) -> Cursor {
        Cursor {
            target: self.target,
            length_index: self.length_index,
            levels: self.levels.clone(),
            picks: self.stack.iter().map(|f| f.pick).collect(),
            emitted: self.emitted,
        }
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Total level currently being enumerated.
    pub fn target(&self) -> Level {
        self.target
    }

    pub fn is_exhausted(&self) -> bool {
        self.target > self.ceiling
    }

    /// Produce the next guess, or `None` once every level up to the
    /// ceiling is done.
    pub fn next_guess(&mut self) -> Option<Guess> {
        loop {
            if self.is_exhausted() {
                return None;
            }
            if self.levels.is_empty() {
                if !self.start_length() {
                    self.next_length();
                }
                continue;
            }
            if self.next_realization() {
                self.emitted += 1;
                return Some(self.current_guess());
            }
            if !self.next_vector() {
                self.next_length();
            }
        }
    }

    fn current_len(&self) -> usize {
        self.model.length_order()[self.length_index]
    }

    fn budget(&self) -> Level {
        self.target - self.model.length_level(self.current_len())
    }

    fn is_short(&self, len: usize) -> bool {
        len < self.model.width()
    }

    fn slots_for(&self, len: usize) -> usize {
        if self.is_short(len) {
            1
        } else {
            len - self.model.width() + 2
        }
    }

    /// Slots that pick something. The trailing end slot only checks.
    fn choices(&self) -> usize {
        let len = self.current_len();
        if self.is_short(len) {
            1
        } else {
            len - self.model.width() + 1
        }
    }

    fn next_length(&mut self) {
        self.levels.clear();
        self.frontiers.clear();
        self.completions.clear();
        self.stack.clear();
        self.symbols.clear();
        self.length_index += 1;
        let order = self.model.length_order();
        let past_target = order
            .get(self.length_index)
            .is_none_or(|&len| self.model.length_level(len) > self.target);
        if past_target {
            self.target += 1;
            self.length_index = 0;
        }
    }

    /// Select the first surviving vector for the current length.
    fn start_length(&mut self) -> bool {
        let len = self.current_len();
        if self.model.length_level(len) > self.target {
            return false;
        }
        let Some(first) =
            first_composition(self.slots_for(len), self.budget(), self.model.max_level())
        else {
            return false;
        };
        self.levels = first;
        self.frontiers.clear();
        if self.seek(0) {
            true
        } else {
            self.levels.clear();
            false
        }
    }

    fn next_vector(&mut self) -> bool {
        let last = self.levels.len() - 1;
        match advance_composition(&mut self.levels, self.model.max_level(), last) {
            Some(changed) => self.seek(changed),
            None => false,
        }
    }

    /// Recompute frontiers from slot `from` on, advancing the vector past
    /// every prefix that cannot be realized.
    fn seek(&mut self, mut from: usize) -> bool {
        let cap = self.model.max_level();
        let choices = self.choices();
        let has_end = !self.is_short(self.current_len());
        loop {
            assert_eq!(
                self.levels.iter().sum::<Level>(),
                self.budget(),
                "level vector drifted from its budget"
            );
            self.frontiers.truncate(from);
            let mut dead = None;
            for j in from..choices {
                let f = self.frontier_at(j);
                if f.is_empty() {
                    dead = Some(j);
                    break;
                }
                self.frontiers.push(f);
            }
            if dead.is_none() && has_end && !self.end_reachable() {
                dead = Some(choices - 1);
            }
            if dead.is_none() {
                self.load_completions();
                if !self.completable() {
                    // only this exact vector is known dead
                    dead = Some(self.levels.len() - 1);
                }
            }
            match dead {
                None => return true,
                Some(j) => match advance_composition(&mut self.levels, cap, j) {
                    Some(changed) => from = changed,
                    None => return false,
                },
            }
        }
    }

    fn frontier_at(&self, j: usize) -> Frontier {
        let level = self.levels[j];
        if j == 0 {
            let len = self.current_len();
            let table = if self.is_short(len) {
                self.model.short(len)
            } else {
                self.model.initial()
            };
            return table.frontier(level, self.frontier_limit);
        }
        let prev = match &self.frontiers[j - 1] {
            Frontier::Known(prev) => prev,
            // Below the smoothing level only observed transitions exist, so
            // their targets bound the set whatever the predecessors were.
            Frontier::Open if level < self.model.max_level() => {
                let reachable = self.model.successors_at(level);
                return if reachable.len() > self.frontier_limit {
                    Frontier::Open
                } else {
                    Frontier::Known(reachable.to_vec())
                };
            }
            Frontier::Open => return Frontier::Open,
        };
        let codec = self.model.context_codec();
        let mut next = Vec::new();
        for &ctx in prev {
            for &sym in self.model.row(ctx).at(level) {
                next.push(codec.shift(ctx, sym));
            }
        }
        next.sort_unstable();
        next.dedup();
        if next.len() > self.frontier_limit {
            Frontier::Open
        } else {
            Frontier::Known(next)
        }
    }

    /// Fill `completions` for the current vector, deepest first.
    fn load_completions(&mut self) {
        self.completions.clear();
        if self.is_short(self.current_len()) {
            self.completions.push(Rc::new(Frontier::Open));
            return;
        }
        let choices = self.choices();
        for depth in (0..choices).rev() {
            let suffix = &self.levels[depth + 1..];
            let set = match self.completion_cache.get(suffix) {
                Some(set) => set,
                None => {
                    let set = Rc::new(match self.completions.last() {
                        None => self.ending_at(suffix[0]),
                        Some(next) => self.completable_before(suffix[0], next),
                    });
                    self.completion_cache.insert(suffix, Rc::clone(&set));
                    set
                }
            };
            self.completions.push(set);
        }
        self.completions.reverse();
    }

    /// Whether every depth has a context that is both reachable and
    /// completable.
    fn completable(&self) -> bool {
        self.completions
            .iter()
            .zip(&self.frontiers)
            .all(|(done, reached)| done.meets(reached))
    }

    /// Contexts whose end event is at `level`.
    fn ending_at(&self, level: Level) -> Frontier {
        if level >= self.model.max_level() {
            return Frontier::Open;
        }
        Frontier::bounded(self.model.ends_at(level).to_vec(), self.completion_limit)
    }

    /// Contexts with a step at `level` into `next`.
    fn completable_before(&self, level: Level, next: &Frontier) -> Frontier {
        let limit = self.completion_limit;
        if level < self.model.max_level() {
            let codes = match next.known() {
                None => self.model.sources_at(level).to_vec(),
                Some(targets) => targets
                    .iter()
                    .flat_map(|&t| self.model.predecessors_at(level, t))
                    .collect(),
            };
            return Frontier::bounded(codes, limit);
        }
        let Some(targets) = next.known() else {
            return Frontier::Open;
        };
        // an unseen step: any context whose row leaves the symbol unseen
        let codec = self.model.context_codec();
        let radix = self.model.alphabet().len() as u64;
        let mut codes = Vec::new();
        for &t in targets {
            let sym = (t % radix) as Symbol;
            codes.extend(
                codec
                    .unshift(t)
                    .filter(|&ctx| self.model.row(ctx).level(sym) == level),
            );
            if codes.len() > limit.saturating_mul(2) {
                codes.sort_unstable();
                codes.dedup();
                if codes.len() > limit {
                    return Frontier::Open;
                }
            }
        }
        Frontier::bounded(codes, limit)
    }

    fn end_reachable(&self) -> bool {
        let want = self.levels[self.levels.len() - 1];
        match self.frontiers.last() {
            Some(Frontier::Known(ctxs)) => ctxs.iter().any(|&c| self.model.end_level(c) == want),
            _ => true,
        }
    }

    fn end_matches(&self) -> bool {
        if self.is_short(self.current_len()) {
            return true;
        }
        let want = self.levels[self.levels.len() - 1];
        self.stack
            .last()
            .is_some_and(|f| self.model.end_level(f.ctx) == want)
    }

    /// The first option at `depth` with pick index `>= from` whose context
    /// can still complete the vector.
    fn option(&self, depth: usize, from: u64) -> Option<Frame> {
        let level = self.levels[depth];
        if depth == 0 {
            let len = self.current_len();
            if self.is_short(len) {
                let (pick, code) = self.model.short(len).pick(level, from, None)?;
                return Some(Frame { pick, ctx: code });
            }
            let within = self.completions[0].known();
            let (pick, code) = self.model.initial().pick(level, from, within)?;
            return Some(Frame { pick, ctx: code });
        }
        let prev = self.stack[depth - 1].ctx;
        let codec = self.model.context_codec();
        let completable = &self.completions[depth];
        let skip = usize::try_from(from).ok()?;
        self.model
            .row(prev)
            .at(level)
            .iter()
            .enumerate()
            .skip(skip)
            .find_map(|(i, &sym)| {
                let ctx = codec.shift(prev, sym);
                completable.admits(ctx).then_some(Frame { pick: i as u64, ctx })
            })
    }

    fn push(&mut self, depth: usize, frame: Frame) {
        if depth == 0 {
            let len = self.current_len();
            let codec = if self.is_short(len) {
                self.model.short(len).codec()
            } else {
                self.model.context_codec()
            };
            codec.decode_into(frame.ctx, &mut self.symbols);
        } else {
            // the newest symbol is the low digit of the shifted context
            let radix = self.model.alphabet().len() as u64;
            self.symbols.push((frame.ctx % radix) as Symbol);
        }
        self.stack.push(frame);
    }

    fn pop(&mut self) -> Option<Frame> {
        let frame = self.stack.pop()?;
        let keep = match self.stack.len() {
            0 => 0,
            d => self.model.width() + d - 1,
        };
        self.symbols.truncate(keep);
        Some(frame)
    }

    /// Step the depth-first cursor to the next full realization of the
    /// current vector. An empty stack starts from the first one.
    fn next_realization(&mut self) -> bool {
        let choices = self.choices();
        let (mut depth, mut from) = match self.pop() {
            Some(last) => (self.stack.len(), last.pick + 1),
            None => (0, 0),
        };
        loop {
            match self.option(depth, from) {
                Some(frame) => {
                    self.push(depth, frame);
                    if depth + 1 < choices {
                        depth += 1;
                        from = 0;
                    } else if self.end_matches() {
                        return true;
                    } else {
                        self.pop();
                        from = frame.pick + 1;
                    }
                }
                None => match self.pop() {
                    Some(parent) => {
                        depth -= 1;
                        from = parent.pick + 1;
                    }
                    None => return false,
                },
            }
        }
    }

    fn current_guess(&self) -> Guess {
        assert_eq!(
            self.model.score_symbols(&self.symbols).map(|b| b.total()),
            Some(self.target),
            "emitted guess does not score at its target level"
        );
        Guess {
            text: self.model.alphabet().decode(&self.symbols),
            level: self.target,
        }
    }
}

impl Iterator for Enumerator<'_> {
    type Item = Guess;

    fn next(&mut self) -> Option<Guess> {
        self.next_guess()
    }
}
