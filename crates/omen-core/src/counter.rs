//! N-gram frequency counting over a password stream.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::alphabet::{Alphabet, Symbol};
use crate::codec::GramCodec;
use crate::error::{CoreError, Result};

/// Per-reason counts of training lines that were skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discards {
    pub empty: u64,
    pub too_long: u64,
    pub foreign_chars: u64,
    /// Lines that did not decode in the declared encoding.
    #[serde(default)]
    pub undecodable: u64,
}

impl Discards {
    pub fn total(&self) -> u64 {
        self.empty + self.too_long + self.foreign_chars + self.undecodable
    }

    pub fn merge(&mut self, other: &Discards) {
        self.empty += other.empty;
        self.too_long += other.too_long;
        self.foreign_chars += other.foreign_chars;
        self.undecodable += other.undecodable;
    }
}

/// Raw counts for one (alphabet, n, max length) configuration.
///
/// Counting is commutative and associative, so shards of a corpus can be
/// counted independently and combined with [`merge`](Self::merge).
#[derive(Debug, Clone)]
pub struct NgramCounts {
    ngram: usize,
    max_length: usize,
    alphabet_size: usize,
    context: GramCodec,
    short_codecs: Vec<GramCodec>,
    ip: HashMap<u64, u64>,
    short: Vec<HashMap<u64, u64>>,
    cp: HashMap<u64, HashMap<Symbol, u64>>,
    ep: HashMap<u64, u64>,
    lengths: Vec<u64>,
    passwords: u64,
    discards: Discards,
    scratch: Vec<Symbol>,
}

impl NgramCounts {
    pub fn new(alphabet_size: usize, ngram: usize, max_length: usize) -> Result<Self> {
        if ngram < 2 {
            return Err(CoreError::Configuration(format!(
                "n-gram size must be at least 2 (got {ngram})"
            )));
        }
        if max_length == 0 {
            return Err(CoreError::Configuration(
                "max password length must be at least 1".to_string(),
            ));
        }
        // Transitions key on context * K + symbol, so K^n must fit.
        GramCodec::new(alphabet_size, ngram)?;
        let width = ngram - 1;
        let context = GramCodec::new(alphabet_size, width)?;
        let short_codecs = (1..width)
            .map(|j| GramCodec::new(alphabet_size, j))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            ngram,
            max_length,
            alphabet_size,
            context,
            short: vec![HashMap::new(); short_codecs.len()],
            short_codecs,
            ip: HashMap::new(),
            cp: HashMap::new(),
            ep: HashMap::new(),
            lengths: vec![0; max_length],
            passwords: 0,
            discards: Discards::default(),
            scratch: Vec::with_capacity(max_length),
        })
    }

    /// Count one password, or record why it was discarded.
    /// Returns true if the password was counted.
    pub fn observe(&mut self, alphabet: &Alphabet, password: &str) -> bool {
        if password.is_empty() {
            self.discards.empty += 1;
            return false;
        }
        if password.chars().count() > self.max_length {
            self.discards.too_long += 1;
            return false;
        }
        let mut symbols = std::mem::take(&mut self.scratch);
        let counted = if alphabet.encode_into(password, &mut symbols) {
            self.observe_symbols(&symbols);
            true
        } else {
            self.discards.foreign_chars += 1;
            false
        };
        self.scratch = symbols;
        counted
    }

    fn observe_symbols(&mut self, symbols: &[Symbol]) {
        let len = symbols.len();
        let width = self.context.width();
        self.lengths[len - 1] += 1;
        self.passwords += 1;

        if len < width {
            let code = self.short_codecs[len - 1].encode(symbols);
            *self.short[len - 1].entry(code).or_insert(0) += 1;
            return;
        }

        let mut ctx = self.context.encode(&symbols[..width]);
        *self.ip.entry(ctx).or_insert(0) += 1;
        for &next in &symbols[width..] {
            *self.cp.entry(ctx).or_default().entry(next).or_insert(0) += 1;
            ctx = self.context.shift(ctx, next);
        }
        *self.ep.entry(ctx).or_insert(0) += 1;
    }

    /// Record lines the corpus reader could not decode.
    pub fn record_undecodable(&mut self, lines: u64) {
        self.discards.undecodable += lines;
    }

    /// Fold another shard's counts into this one.
    pub fn merge(&mut self, other: &NgramCounts) -> Result<()> {
        if (self.ngram, self.max_length, self.alphabet_size)
            != (other.ngram, other.max_length, other.alphabet_size)
        {
            return Err(CoreError::Configuration(
                "cannot merge counts from different training configurations".to_string(),
            ));
        }
        for (&code, &n) in &other.ip {
            *self.ip.entry(code).or_insert(0) += n;
        }
        for (mine, theirs) in self.short.iter_mut().zip(&other.short) {
            for (&code, &n) in theirs {
                *mine.entry(code).or_insert(0) += n;
            }
        }
        for (&ctx, row) in &other.cp {
            let mine = self.cp.entry(ctx).or_default();
            for (&sym, &n) in row {
                *mine.entry(sym).or_insert(0) += n;
            }
        }
        for (&ctx, &n) in &other.ep {
            *self.ep.entry(ctx).or_insert(0) += n;
        }
        for (mine, theirs) in self.lengths.iter_mut().zip(&other.lengths) {
            *mine += theirs;
        }
        self.passwords += other.passwords;
        self.discards.merge(&other.discards);
        Ok(())
    }

    pub fn ngram(&self) -> usize {
        self.ngram
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    pub fn context_codec(&self) -> GramCodec {
        self.context
    }

    pub fn passwords(&self) -> u64 {
        self.passwords
    }

    pub fn discards(&self) -> Discards {
        self.discards
    }

    /// Initial (n-1)-gram counts.
    pub fn ip(&self) -> &HashMap<u64, u64> {
        &self.ip
    }

    /// Whole-password counts for lengths below n-1, indexed by length - 1.
    pub fn short(&self) -> &[HashMap<u64, u64>] {
        &self.short
    }

    /// Context -> next symbol -> count.
    pub fn cp(&self) -> &HashMap<u64, HashMap<Symbol, u64>> {
        &self.cp
    }

    /// Context -> number of passwords ending right after it.
    pub fn ep(&self) -> &HashMap<u64, u64> {
        &self.ep
    }

    /// Password counts indexed by length - 1.
    pub fn lengths(&self) -> &[u64] {
        &self.lengths
    }
}
