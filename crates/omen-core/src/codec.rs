//! Fixed-width base-K integer codes for symbol sequences.
//!
//! Contexts, initial grams and short passwords are all keyed by their code.
//! Code order equals lexicographic order of the symbol tuple, which is the
//! engine's tie-break order.

use crate::alphabet::Symbol;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GramCodec {
    radix: u64,
    width: usize,
    space: u64,
    /// radix^(width-1): the weight of the oldest symbol.
    lead: u64,
}

impl GramCodec {
    pub fn new(radix: usize, width: usize) -> Result<Self> {
        if radix == 0 || width == 0 {
            return Err(CoreError::Configuration(format!(
                "gram codec needs radix >= 1 and width >= 1 (got {radix}, {width})"
            )));
        }
        let radix = radix as u64;
        let space = radix.checked_pow(width as u32).ok_or_else(|| {
            CoreError::Configuration(format!(
                "{radix}^{width} grams do not fit in 64 bits; use a smaller alphabet or n-gram"
            ))
        })?;
        Ok(Self {
            radix,
            width,
            space,
            lead: space / radix,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of distinct codes (radix^width).
    pub fn space(&self) -> u64 {
        self.space
    }

    /// Encode exactly `width` symbols.
    pub fn encode(&self, symbols: &[Symbol]) -> u64 {
        debug_assert_eq!(symbols.len(), self.width);
        symbols
            .iter()
            .fold(0u64, |acc, &s| acc * self.radix + s as u64)
    }

    pub fn decode(&self, code: u64) -> Vec<Symbol> {
        let mut out = Vec::with_capacity(self.width);
        self.decode_into(code, &mut out);
        out
    }

    /// Append the `width` symbols of `code` to `out`.
    pub fn decode_into(&self, code: u64, out: &mut Vec<Symbol>) {
        let start = out.len();
        let mut rest = code;
        for _ in 0..self.width {
            out.push((rest % self.radix) as Symbol);
            rest /= self.radix;
        }
        out[start..].reverse();
    }

    /// Slide a context window: drop the oldest symbol, append `next`.
    pub fn shift(&self, code: u64, next: Symbol) -> u64 {
        (code % self.lead) * self.radix + next as u64
    }

    /// Every code that `shift`s into `code`, one per possible oldest symbol,
    /// in code order. The symbol appended is always `code % radix`.
    pub fn unshift(&self, code: u64) -> impl Iterator<Item = u64> {
        let (lead, tail) = (self.lead, code / self.radix);
        (0..self.radix).map(move |oldest| oldest * lead + tail)
    }
}
