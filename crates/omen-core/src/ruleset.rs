//! The immutable trained artifact: configuration, alphabet and level tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::alphabet::{Alphabet, Symbol};
use crate::codec::GramCodec;
use crate::constants::{MAX_LEVEL_CAP, MAX_NGRAM, MIN_NGRAM, RULESET_FORMAT_VERSION};
use crate::counter::Discards;
use crate::encoding::Encoding;
use crate::error::{CoreError, Result};

/// Quantized negative log-probability bucket. Lower is more probable.
pub type Level = u32;

/// Quantized tables. Absent entries are unseen and score at the
/// smoothing level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelTables {
    /// Initial (n-1)-gram code -> level.
    pub ip: BTreeMap<u64, Level>,
    /// Whole-password tables for lengths `1..n-1`, indexed by length - 1.
    pub short: Vec<BTreeMap<u64, Level>>,
    /// Context code -> next symbol -> level.
    pub cp: BTreeMap<u64, BTreeMap<Symbol, Level>>,
    /// Context code -> level of ending right after it.
    pub ep: BTreeMap<u64, Level>,
    /// Level per password length, indexed by length - 1.
    pub lengths: Vec<Level>,
}

impl LevelTables {
    pub fn transition_count(&self) -> usize {
        self.cp.values().map(BTreeMap::len).sum()
    }

    pub fn short_count(&self) -> usize {
        self.short.iter().map(BTreeMap::len).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesetConfig {
    pub format_version: u32,
    pub ngram: usize,
    pub max_level: Level,
    pub max_length: usize,
    pub alphabet_size: usize,
    pub encoding: Encoding,
    pub training_id: Uuid,
    pub passwords: u64,
    #[serde(default)]
    pub discards: Discards,
}

#[derive(Debug, Clone)]
pub struct Ruleset {
    name: String,
    config: RulesetConfig,
    alphabet: Alphabet,
    tables: LevelTables,
    fingerprint: String,
}

impl Ruleset {
    /// Assemble a ruleset, checking that every table agrees with the
    /// configuration and the alphabet.
    pub fn new(
        name: impl Into<String>,
        config: RulesetConfig,
        alphabet: Alphabet,
        tables: LevelTables,
    ) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        validate(&config, &alphabet, &tables)?;
        let fingerprint = fingerprint(&config, &alphabet, &tables);
        Ok(Self {
            name,
            config,
            alphabet,
            tables,
            fingerprint,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RulesetConfig {
        &self.config
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn tables(&self) -> &LevelTables {
        &self.tables
    }

    /// Content hash over everything that shapes the guess order.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn ngram(&self) -> usize {
        self.config.ngram
    }

    pub fn max_level(&self) -> Level {
        self.config.max_level
    }

    pub fn max_length(&self) -> usize {
        self.config.max_length
    }
}

/// Ruleset names become directory names.
pub fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.len() <= 64
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(CoreError::Configuration(format!(
            "invalid ruleset name '{name}': use 1-64 letters, digits, '-', '_' or '.'"
        )))
    }
}

fn validate(config: &RulesetConfig, alphabet: &Alphabet, tables: &LevelTables) -> Result<()> {
    let bad = |msg: String| Err(CoreError::Configuration(msg));

    if config.format_version != RULESET_FORMAT_VERSION {
        return bad(format!(
            "unsupported ruleset format version {} (expected {RULESET_FORMAT_VERSION})",
            config.format_version
        ));
    }
    if !(MIN_NGRAM..=MAX_NGRAM).contains(&config.ngram) {
        return bad(format!(
            "n-gram size {} outside {MIN_NGRAM}..={MAX_NGRAM}",
            config.ngram
        ));
    }
    if config.max_length == 0 {
        return bad("max length must be at least 1".to_string());
    }
    if config.max_level > MAX_LEVEL_CAP {
        return bad(format!(
            "max level {} above the supported maximum {MAX_LEVEL_CAP}",
            config.max_level
        ));
    }
    if alphabet.is_empty() {
        return Err(CoreError::EmptyAlphabet);
    }
    if config.alphabet_size != alphabet.len() {
        return bad(format!(
            "config declares {} symbols but the alphabet has {}",
            config.alphabet_size,
            alphabet.len()
        ));
    }

    let k = alphabet.len();
    let width = config.ngram - 1;
    GramCodec::new(k, config.ngram)?;
    let context_space = GramCodec::new(k, width)?.space();
    let max = config.max_level;

    let check_level = |table: &str, level: Level| {
        if level > max {
            bad(format!("{table} level {level} above max level {max}"))
        } else {
            Ok(())
        }
    };

    if tables.lengths.len() != config.max_length {
        return bad(format!(
            "length table has {} entries, expected {}",
            tables.lengths.len(),
            config.max_length
        ));
    }
    for &level in &tables.lengths {
        check_level("length", level)?;
    }
    if tables.short.len() != width - 1 {
        return bad(format!(
            "{} short-gram tables, expected {}",
            tables.short.len(),
            width - 1
        ));
    }
    for (i, table) in tables.short.iter().enumerate() {
        let space = GramCodec::new(k, i + 1)?.space();
        for (&code, &level) in table {
            if code >= space {
                return bad(format!("short gram code {code} out of range"));
            }
            check_level("short gram", level)?;
        }
    }
    for (table, entries) in [("initial", &tables.ip), ("end", &tables.ep)] {
        for (&code, &level) in entries {
            if code >= context_space {
                return bad(format!("{table} gram code {code} out of range"));
            }
            check_level(table, level)?;
        }
    }
    for (&ctx, row) in &tables.cp {
        if ctx >= context_space {
            return bad(format!("transition context {ctx} out of range"));
        }
        for (&sym, &level) in row {
            if sym as usize >= k {
                return bad(format!("transition symbol {sym} outside the alphabet"));
            }
            check_level("transition", level)?;
        }
    }
    Ok(())
}

fn fingerprint(config: &RulesetConfig, alphabet: &Alphabet, tables: &LevelTables) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"omen-ruleset");
    hasher.update(config.format_version.to_le_bytes());
    hasher.update((config.ngram as u64).to_le_bytes());
    hasher.update(config.max_level.to_le_bytes());
    hasher.update((config.max_length as u64).to_le_bytes());

    let chars: String = alphabet.chars().iter().collect();
    hasher.update((chars.len() as u64).to_le_bytes());
    hasher.update(chars.as_bytes());

    let mut section = |tag: &[u8], entries: &mut dyn Iterator<Item = (u64, u64, Level)>| {
        hasher.update(tag);
        let mut n = 0u64;
        for (a, b, level) in entries {
            hasher.update(a.to_le_bytes());
            hasher.update(b.to_le_bytes());
            hasher.update(level.to_le_bytes());
            n += 1;
        }
        hasher.update(n.to_le_bytes());
    };

    section(
        b"LN",
        &mut tables
            .lengths
            .iter()
            .enumerate()
            .map(|(i, &l)| (i as u64 + 1, 0, l)),
    );
    section(b"IP", &mut tables.ip.iter().map(|(&c, &l)| (c, 0, l)));
    for (i, table) in tables.short.iter().enumerate() {
        section(
            b"SG",
            &mut table.iter().map(|(&c, &l)| (c, i as u64 + 1, l)),
        );
    }
    section(
        b"CP",
        &mut tables
            .cp
            .iter()
            .flat_map(|(&ctx, row)| row.iter().map(move |(&s, &l)| (ctx, s as u64, l))),
    );
    section(b"EP", &mut tables.ep.iter().map(|(&c, &l)| (c, 0, l)));

    hex::encode(hasher.finalize())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_config(alphabet: &Alphabet, ngram: usize) -> RulesetConfig {
        RulesetConfig {
            format_version: RULESET_FORMAT_VERSION,
            ngram,
            max_level: 10,
            max_length: 6,
            alphabet_size: alphabet.len(),
            encoding: Encoding::Utf8,
            training_id: Uuid::new_v4(),
            passwords: 4,
            discards: Discards::default(),
        }
    }

    fn sample_tables() -> LevelTables {
        LevelTables {
            ip: BTreeMap::from([(0, 0), (1, 3)]),
            short: Vec::new(),
            cp: BTreeMap::from([(1, BTreeMap::from([(2, 0), (3, 5)]))]),
            ep: BTreeMap::from([(2, 0)]),
            lengths: vec![10, 4, 0, 10, 10, 10],
        }
    }

    #[test]
    fn test_fingerprint_ignores_identity_fields() {
        let a = Alphabet::new("abcde".chars()).unwrap();
        let one = Ruleset::new("one", sample_config(&a, 2), a.clone(), sample_tables()).unwrap();
        let mut cfg = sample_config(&a, 2);
        cfg.passwords = 99;
        let two = Ruleset::new("two", cfg, a, sample_tables()).unwrap();
        assert_eq!(one.fingerprint(), two.fingerprint());
        assert_eq!(one.fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_tracks_table_content() {
        let a = Alphabet::new("abcde".chars()).unwrap();
        let one = Ruleset::new("r", sample_config(&a, 2), a.clone(), sample_tables()).unwrap();
        let mut tables = sample_tables();
        tables.ep.insert(3, 1);
        let two = Ruleset::new("r", sample_config(&a, 2), a, tables).unwrap();
        assert_ne!(one.fingerprint(), two.fingerprint());
    }

    #[test]
    fn test_level_above_max_rejected() {
        let a = Alphabet::new("abcde".chars()).unwrap();
        let mut tables = sample_tables();
        tables.ip.insert(4, 11);
        assert!(Ruleset::new("r", sample_config(&a, 2), a, tables).is_err());
    }

    #[test]
    fn test_max_level_above_cap_rejected() {
        let a = Alphabet::new("abcde".chars()).unwrap();
        let mut cfg = sample_config(&a, 2);
        cfg.max_level = MAX_LEVEL_CAP;
        assert!(Ruleset::new("r", cfg.clone(), a.clone(), sample_tables()).is_ok());
        cfg.max_level = 3_000_000_000;
        let err = Ruleset::new("r", cfg, a, sample_tables()).unwrap_err();
        assert!(matches!(err, CoreError::Configuration(ref m) if m.contains("max level")));
    }

    #[test]
    fn test_symbol_outside_alphabet_rejected() {
        let a = Alphabet::new("abcde".chars()).unwrap();
        let mut tables = sample_tables();
        tables.cp.insert(0, BTreeMap::from([(7, 0)]));
        assert!(Ruleset::new("r", sample_config(&a, 2), a, tables).is_err());
    }

    #[test]
    fn test_length_table_must_match() {
        let a = Alphabet::new("abcde".chars()).unwrap();
        let mut tables = sample_tables();
        tables.lengths.pop();
        assert!(Ruleset::new("r", sample_config(&a, 2), a, tables).is_err());
    }

    #[test]
    fn test_names() {
        assert!(validate_name("Default").is_ok());
        assert!(validate_name("rock_you-2.1").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("../etc").is_err());
        assert!(validate_name(".hidden").is_err());
    }
}
