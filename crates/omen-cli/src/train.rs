use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;
use omen_core::{
    AlphabetSpec, DEFAULT_RULESET, Detected, Encoding, EncodingDetector, Level, Trainer,
    Utf8Probe, validate_name,
};
use omen_store::StoreError;

use crate::Workspace;

/// Learned alphabets smaller than this are almost certainly a typo.
const MIN_LEARNED_ALPHABET: usize = 10;

/// Bytes read from the corpus to guess its encoding.
const PROBE_BYTES: u64 = 64 * 1024;

#[derive(Args)]
pub struct TrainArgs {
    /// Password list, one per line
    #[arg(long, short)]
    training: PathBuf,

    /// Name of the ruleset to write
    #[arg(long, short, default_value = DEFAULT_RULESET)]
    rule: String,

    /// Corpus encoding (utf-8, latin-1); probed when omitted
    #[arg(long, short)]
    encoding: Option<Encoding>,

    /// Learn the N most frequent characters as the alphabet
    #[arg(long, short, conflicts_with = "alphabet_chars")]
    alphabet: Option<usize>,

    /// Use exactly these characters as the alphabet
    #[arg(long)]
    alphabet_chars: Option<String>,

    /// N-gram size (2..=5)
    #[arg(long, short)]
    ngram: Option<usize>,

    #[arg(long)]
    max_level: Option<Level>,

    #[arg(long)]
    max_length: Option<usize>,

    /// Counting threads (defaults to one per CPU)
    #[arg(long)]
    workers: Option<usize>,
}

pub fn run(workspace: &Workspace, args: TrainArgs) -> Result<()> {
    validate_name(&args.rule)?;

    let mut config = workspace.settings().training_config();
    if let Some(n) = args.ngram {
        config.ngram = n;
    }
    if let Some(level) = args.max_level {
        config.max_level = level;
    }
    if let Some(len) = args.max_length {
        config.max_length = len;
    }
    if args.workers.is_some() {
        config.workers = args.workers;
    }
    config.alphabet = match (args.alphabet, args.alphabet_chars) {
        (Some(k), _) if k < MIN_LEARNED_ALPHABET => {
            bail!("alphabet size {k} is too small (minimum {MIN_LEARNED_ALPHABET})")
        }
        (Some(k), _) => AlphabetSpec::Learned(k),
        (None, Some(chars)) => AlphabetSpec::Explicit(chars),
        (None, None) => AlphabetSpec::Default,
    };

    let encoding = match args.encoding {
        Some(encoding) => encoding,
        None => detect_encoding(&args.training)?,
    };

    let trainer = Trainer::new(config)?;
    tracing::info!(
        corpus = %args.training.display(),
        %encoding,
        ngram = trainer.config().ngram,
        workers = trainer.config().workers(),
        "training ruleset '{}'",
        args.rule
    );

    let path = args.training.as_path();
    let ruleset = trainer
        .train::<_, _, StoreError>(&args.rule, encoding, || {
            Ok(BufReader::new(File::open(path)?))
        })
        .with_context(|| format!("failed to train from {}", path.display()))?;

    let discards = ruleset.config().discards;
    if discards.total() > 0 {
        tracing::warn!(
            empty = discards.empty,
            too_long = discards.too_long,
            foreign_chars = discards.foreign_chars,
            undecodable = discards.undecodable,
            "skipped {} training lines",
            discards.total()
        );
    }

    let dir = workspace
        .rulesets()
        .save(&ruleset)
        .with_context(|| format!("failed to save ruleset '{}'", args.rule))?;

    println!(
        "trained '{}' from {} passwords ({} skipped) -> {}",
        ruleset.name(),
        ruleset.config().passwords,
        discards.total(),
        dir.display()
    );
    println!("fingerprint: {}", ruleset.fingerprint());
    Ok(())
}

fn detect_encoding(path: &Path) -> Result<Encoding> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut sample = Vec::new();
    file.take(PROBE_BYTES)
        .read_to_end(&mut sample)
        .with_context(|| format!("failed to read {}", path.display()))?;

    match Utf8Probe.detect_encoding(&sample) {
        Detected::Known(encoding) => {
            tracing::debug!("detected {encoding} encoding");
            Ok(encoding)
        }
        Detected::Unknown => bail!(
            "could not detect the encoding of {}; pass --encoding (utf-8 or latin-1)",
            path.display()
        ),
    }
}
