//! Alphabet selection.
//!
//! The alphabet is the ordered working character set. A character's index
//! in it is its symbol id; everything downstream (counting, tables, the
//! enumeration engine) speaks symbol ids, never chars.

use std::collections::HashMap;

use crate::constants::{DEFAULT_ALPHABET, RESERVED_CHARS};
use crate::error::{CoreError, Result};

/// Canonical symbol id: index into the alphabet.
pub type Symbol = u16;

/// Where the training alphabet comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlphabetSpec {
    /// The fixed [`DEFAULT_ALPHABET`].
    Default,
    /// The N most frequent characters of the corpus.
    Learned(usize),
    /// Caller-supplied characters, in order.
    Explicit(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    chars: Vec<char>,
    index: HashMap<char, Symbol>,
}

impl Alphabet {
    /// Build an alphabet from characters, keeping first occurrences and
    /// dropping reserved delimiters.
    pub fn new(chars: impl IntoIterator<Item = char>) -> Result<Self> {
        let mut ordered = Vec::new();
        let mut index = HashMap::new();
        for c in chars {
            if RESERVED_CHARS.contains(&c) || index.contains_key(&c) {
                continue;
            }
            let id = Symbol::try_from(ordered.len()).map_err(|_| {
                CoreError::Configuration(format!(
                    "alphabet larger than {} symbols",
                    Symbol::MAX
                ))
            })?;
            index.insert(c, id);
            ordered.push(c);
        }
        if ordered.is_empty() {
            return Err(CoreError::EmptyAlphabet);
        }
        Ok(Self {
            chars: ordered,
            index,
        })
    }

    pub fn default_set() -> Self {
        Self::new(DEFAULT_ALPHABET.chars()).expect("default alphabet is non-empty")
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    pub fn symbol(&self, c: char) -> Option<Symbol> {
        self.index.get(&c).copied()
    }

    pub fn char_of(&self, symbol: Symbol) -> char {
        self.chars[symbol as usize]
    }

    /// Map a password onto symbol ids. `None` if any character is outside
    /// the alphabet.
    pub fn encode(&self, text: &str) -> Option<Vec<Symbol>> {
        text.chars().map(|c| self.symbol(c)).collect()
    }

    /// Like [`encode`](Self::encode) but reuses `out`.
    pub fn encode_into(&self, text: &str, out: &mut Vec<Symbol>) -> bool {
        out.clear();
        for c in text.chars() {
            match self.symbol(c) {
                Some(s) => out.push(s),
                None => return false,
            }
        }
        true
    }

    pub fn decode(&self, symbols: &[Symbol]) -> String {
        symbols.iter().map(|&s| self.char_of(s)).collect()
    }
}

/// First-pass character counter for [`AlphabetSpec::Learned`].
#[derive(Debug, Default, Clone)]
pub struct AlphabetLearner {
    counts: HashMap<char, u64>,
}

impl AlphabetLearner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, password: &str) {
        for c in password.chars() {
            if !RESERVED_CHARS.contains(&c) {
                *self.counts.entry(c).or_insert(0) += 1;
            }
        }
    }

    pub fn merge(&mut self, other: &AlphabetLearner) {
        for (&c, &n) in &other.counts {
            *self.counts.entry(c).or_insert(0) += n;
        }
    }

    /// The `size` most frequent characters, most frequent first. Ties are
    /// broken by character order so the result is deterministic.
    pub fn finish(&self, size: usize) -> Result<Alphabet> {
        if size == 0 {
            return Err(CoreError::Configuration(
                "alphabet size must be at least 1".to_string(),
            ));
        }
        let mut ranked: Vec<(char, u64)> = self.counts.iter().map(|(&c, &n)| (c, n)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Alphabet::new(ranked.into_iter().take(size).map(|(c, _)| c))
    }
}
