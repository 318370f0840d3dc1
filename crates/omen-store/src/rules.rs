//! Ruleset directories.
//!
//! Each ruleset is a directory `Rules/<NAME>/` of small text files:
//!
//! ```text
//! config.toml   [program] + [training] parameters
//! alphabet.txt  one character per line, in symbol order
//! IP.level      level<TAB>gram   initial grams, plus whole short passwords
//! CP.level      level<TAB>gram   context followed by the next character
//! EP.level      level<TAB>gram   contexts a password can end after
//! LN.level      one level per line for lengths 1..=max_length
//! ```
//!
//! Saves are staged in a hidden sibling directory and renamed into place.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use omen_core::{
    Alphabet, DEFAULT_RULESET, GramCodec, Level, LevelTables, Ruleset, RulesetConfig, Symbol,
    validate_name,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::default_ruleset;
use crate::error::{Result, StoreError};

pub const CONFIG_FILE: &str = "config.toml";
pub const ALPHABET_FILE: &str = "alphabet.txt";
pub const IP_FILE: &str = "IP.level";
pub const CP_FILE: &str = "CP.level";
pub const EP_FILE: &str = "EP.level";
pub const LN_FILE: &str = "LN.level";

#[derive(Debug, Serialize, Deserialize)]
struct ConfigFile {
    program: ProgramSection,
    training: RulesetConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProgramSection {
    name: String,
    version: String,
}

pub struct RulesetStore {
    root: PathBuf,
}

impl RulesetStore {
    /// `root` is the `Rules/` directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.path_of(name).join(CONFIG_FILE).is_file()
    }

    /// Names of every stored ruleset, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.exists(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    // --- Save ---

    /// Persist `ruleset`, replacing any ruleset of the same name.
    pub fn save(&self, ruleset: &Ruleset) -> Result<PathBuf> {
        let name = ruleset.name();
        validate_name(name)?;
        fs::create_dir_all(&self.root)?;

        let stage = self.root.join(format!(".{name}.tmp-{}", Uuid::new_v4()));
        fs::create_dir(&stage)?;
        if let Err(e) = write_files(&stage, ruleset) {
            let _ = fs::remove_dir_all(&stage);
            return Err(e);
        }

        let target = self.path_of(name);
        if target.exists() {
            let retired = self.root.join(format!(".{name}.old-{}", Uuid::new_v4()));
            fs::rename(&target, &retired)?;
            if let Err(e) = fs::rename(&stage, &target) {
                let _ = fs::rename(&retired, &target);
                let _ = fs::remove_dir_all(&stage);
                return Err(e.into());
            }
            if let Err(e) = fs::remove_dir_all(&retired) {
                tracing::warn!("could not remove {}: {e}", retired.display());
            }
        } else {
            fs::rename(&stage, &target)?;
        }

        tracing::info!(
            ruleset = name,
            fingerprint = &ruleset.fingerprint()[..12],
            "saved ruleset to {}",
            target.display()
        );
        Ok(target)
    }

    // --- Load ---

    pub fn load(&self, name: &str) -> Result<Ruleset> {
        validate_name(name).map_err(|_| StoreError::RulesetNotFound(name.to_string()))?;
        let dir = self.path_of(name);
        if !dir.join(CONFIG_FILE).is_file() {
            return Err(StoreError::RulesetNotFound(name.to_string()));
        }

        let config = read_config(&dir)?;
        let alphabet = read_alphabet(&dir)?;
        let tables = read_tables(&dir, &config, &alphabet)?;
        let ruleset = Ruleset::new(name, config, alphabet, tables).map_err(|e| {
            StoreError::RulesetCorrupt {
                file: CONFIG_FILE.to_string(),
                line: 0,
                reason: e.to_string(),
            }
        })?;

        tracing::info!(
            ruleset = name,
            fingerprint = &ruleset.fingerprint()[..12],
            "loaded ruleset"
        );
        Ok(ruleset)
    }

    /// Load `name`, training and saving the built-in default ruleset the
    /// first time it is asked for.
    pub fn load_or_default(&self, name: &str) -> Result<Ruleset> {
        if name == DEFAULT_RULESET && !self.exists(name) {
            tracing::info!("default ruleset not found; training it from the built-in corpus");
            let ruleset = default_ruleset::train_default()?;
            self.save(&ruleset)?;
            return Ok(ruleset);
        }
        self.load(name)
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn write_files(dir: &Path, ruleset: &Ruleset) -> Result<()> {
    let config = ConfigFile {
        program: ProgramSection {
            name: "omen".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        training: ruleset.config().clone(),
    };
    let toml = toml::to_string(&config)
        .map_err(|e| StoreError::InvalidData(format!("cannot encode {CONFIG_FILE}: {e}")))?;
    fs::write(dir.join(CONFIG_FILE), toml)?;

    let alphabet = ruleset.alphabet();
    let mut out = String::new();
    for c in alphabet.chars() {
        out.push(*c);
        out.push('\n');
    }
    fs::write(dir.join(ALPHABET_FILE), &out)?;

    let tables = ruleset.tables();
    let k = alphabet.len();
    let width = ruleset.ngram() - 1;
    let context = GramCodec::new(k, width)?;

    out.clear();
    for (i, short) in tables.short.iter().enumerate() {
        let codec = GramCodec::new(k, i + 1)?;
        for (&code, &level) in short {
            level_line(&mut out, level, alphabet, &codec.decode(code));
        }
    }
    for (&code, &level) in &tables.ip {
        level_line(&mut out, level, alphabet, &context.decode(code));
    }
    fs::write(dir.join(IP_FILE), &out)?;

    out.clear();
    let mut gram = Vec::with_capacity(width + 1);
    for (&ctx, row) in &tables.cp {
        for (&sym, &level) in row {
            gram.clear();
            context.decode_into(ctx, &mut gram);
            gram.push(sym);
            level_line(&mut out, level, alphabet, &gram);
        }
    }
    fs::write(dir.join(CP_FILE), &out)?;

    out.clear();
    for (&code, &level) in &tables.ep {
        level_line(&mut out, level, alphabet, &context.decode(code));
    }
    fs::write(dir.join(EP_FILE), &out)?;

    out.clear();
    for level in &tables.lengths {
        let _ = writeln!(out, "{level}");
    }
    fs::write(dir.join(LN_FILE), &out)?;
    Ok(())
}

fn level_line(out: &mut String, level: Level, alphabet: &Alphabet, gram: &[Symbol]) {
    let _ = write!(out, "{level}\t");
    out.push_str(&alphabet.decode(gram));
    out.push('\n');
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

fn corrupt(file: &str, line: usize, reason: impl Into<String>) -> StoreError {
    StoreError::RulesetCorrupt {
        file: file.to_string(),
        line,
        reason: reason.into(),
    }
}

fn read_file(dir: &Path, file: &str) -> Result<String> {
    fs::read_to_string(dir.join(file)).map_err(|e| corrupt(file, 0, e.to_string()))
}

/// Non-final lines of `content`, 1-based, with a trailing `\r` removed.
fn lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    let body = content.strip_suffix('\n').unwrap_or(content);
    body.split('\n')
        .filter(move |_| !content.is_empty())
        .enumerate()
        .map(|(i, line)| (i + 1, line.strip_suffix('\r').unwrap_or(line)))
}

fn read_config(dir: &Path) -> Result<RulesetConfig> {
    let content = read_file(dir, CONFIG_FILE)?;
    let parsed: ConfigFile = toml::from_str(&content).map_err(|e| {
        let line = e
            .span()
            .map_or(0, |span| content[..span.start].matches('\n').count() + 1);
        corrupt(CONFIG_FILE, line, e.message())
    })?;
    Ok(parsed.training)
}

fn read_alphabet(dir: &Path) -> Result<Alphabet> {
    let content = read_file(dir, ALPHABET_FILE)?;
    let mut chars = Vec::new();
    for (n, line) in lines(&content) {
        let mut it = line.chars();
        match (it.next(), it.next()) {
            (Some(c), None) => {
                if chars.contains(&c) {
                    return Err(corrupt(ALPHABET_FILE, n, format!("duplicate character {c:?}")));
                }
                chars.push(c);
            }
            _ => return Err(corrupt(ALPHABET_FILE, n, "expected exactly one character")),
        }
    }
    Alphabet::new(chars).map_err(|e| corrupt(ALPHABET_FILE, 0, e.to_string()))
}

/// Parses `level<TAB>gram` lines into symbol sequences.
struct LevelReader<'a> {
    file: &'static str,
    alphabet: &'a Alphabet,
    max_level: Level,
}

impl LevelReader<'_> {
    fn level(&self, n: usize, text: &str) -> Result<Level> {
        let level: Level = text
            .parse()
            .map_err(|_| corrupt(self.file, n, format!("bad level {text:?}")))?;
        if level > self.max_level {
            return Err(corrupt(
                self.file,
                n,
                format!("level {level} above max level {}", self.max_level),
            ));
        }
        Ok(level)
    }

    fn entries(&self, content: &str) -> Result<Vec<(usize, Level, Vec<Symbol>)>> {
        let mut out = Vec::new();
        for (n, line) in lines(content) {
            let (level, gram) = line
                .split_once('\t')
                .ok_or_else(|| corrupt(self.file, n, "expected level<TAB>gram"))?;
            let level = self.level(n, level)?;
            let symbols = self.alphabet.encode(gram).ok_or_else(|| {
                corrupt(
                    self.file,
                    n,
                    format!("{gram:?} uses characters outside the alphabet"),
                )
            })?;
            out.push((n, level, symbols));
        }
        Ok(out)
    }
}

fn insert_once<K: Ord, V>(
    map: &mut BTreeMap<K, V>,
    key: K,
    value: V,
    file: &str,
    n: usize,
) -> Result<()> {
    if map.insert(key, value).is_some() {
        return Err(corrupt(file, n, "duplicate entry"));
    }
    Ok(())
}

fn read_tables(dir: &Path, config: &RulesetConfig, alphabet: &Alphabet) -> Result<LevelTables> {
    let k = alphabet.len();
    let width = config.ngram.checked_sub(1).filter(|w| *w > 0).ok_or_else(|| {
        corrupt(CONFIG_FILE, 0, format!("n-gram size {} too small", config.ngram))
    })?;
    let context = GramCodec::new(k, width).map_err(|e| corrupt(CONFIG_FILE, 0, e.to_string()))?;
    let short_codecs = (1..width)
        .map(|j| GramCodec::new(k, j))
        .collect::<omen_core::Result<Vec<_>>>()?;
    let reader = |file: &'static str| LevelReader {
        file,
        alphabet,
        max_level: config.max_level,
    };

    let mut tables = LevelTables {
        short: vec![BTreeMap::new(); width - 1],
        ..LevelTables::default()
    };

    let ip = reader(IP_FILE);
    for (n, level, gram) in ip.entries(&read_file(dir, IP_FILE)?)? {
        match gram.len() {
            len if len == width => {
                insert_once(&mut tables.ip, context.encode(&gram), level, IP_FILE, n)?
            }
            len if len >= 1 && len < width => {
                let code = short_codecs[len - 1].encode(&gram);
                insert_once(&mut tables.short[len - 1], code, level, IP_FILE, n)?
            }
            len => return Err(corrupt(IP_FILE, n, format!("gram of length {len}"))),
        }
    }

    let cp = reader(CP_FILE);
    for (n, level, gram) in cp.entries(&read_file(dir, CP_FILE)?)? {
        if gram.len() != width + 1 {
            return Err(corrupt(CP_FILE, n, format!("gram of length {}", gram.len())));
        }
        let ctx = context.encode(&gram[..width]);
        let row = tables.cp.entry(ctx).or_default();
        insert_once(row, gram[width], level, CP_FILE, n)?;
    }

    let ep = reader(EP_FILE);
    for (n, level, gram) in ep.entries(&read_file(dir, EP_FILE)?)? {
        if gram.len() != width {
            return Err(corrupt(EP_FILE, n, format!("gram of length {}", gram.len())));
        }
        insert_once(&mut tables.ep, context.encode(&gram), level, EP_FILE, n)?;
    }

    let ln = reader(LN_FILE);
    for (n, line) in lines(&read_file(dir, LN_FILE)?) {
        tables.lengths.push(ln.level(n, line.trim())?);
    }
    if tables.lengths.len() != config.max_length {
        return Err(corrupt(
            LN_FILE,
            0,
            format!(
                "{} lengths listed, expected {}",
                tables.lengths.len(),
                config.max_length
            ),
        ));
    }
    Ok(tables)
}
