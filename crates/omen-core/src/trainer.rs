//! Training pipeline: alphabet, counting, quantization.
//!
//! The trainer never touches the filesystem. Callers hand it an `open`
//! closure producing a fresh reader over the corpus; it is called once, or
//! twice when the alphabet is learned from the corpus itself.

use std::io::{self, BufRead};
use std::sync::mpsc;
use std::thread;

use uuid::Uuid;

use crate::alphabet::{Alphabet, AlphabetLearner, AlphabetSpec};
use crate::constants::{
    DEFAULT_MAX_LENGTH, DEFAULT_MAX_LEVEL, DEFAULT_NGRAM, DEFAULT_SHARD_SIZE, MAX_LEVEL_CAP,
    MAX_NGRAM, MIN_NGRAM, RULESET_FORMAT_VERSION,
};
use crate::corpus::CorpusReader;
use crate::counter::NgramCounts;
use crate::encoding::Encoding;
use crate::error::{CoreError, Result};
use crate::quantize::Quantizer;
use crate::ruleset::{Level, Ruleset, RulesetConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingConfig {
    pub alphabet: AlphabetSpec,
    pub ngram: usize,
    pub max_level: Level,
    pub max_length: usize,
    /// Counting threads. `None` uses one per CPU.
    pub workers: Option<usize>,
    /// Passwords per shard handed to one counting thread.
    pub shard_size: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            alphabet: AlphabetSpec::Default,
            ngram: DEFAULT_NGRAM,
            max_level: DEFAULT_MAX_LEVEL,
            max_length: DEFAULT_MAX_LENGTH,
            workers: None,
            shard_size: DEFAULT_SHARD_SIZE,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(CoreError::Configuration(msg));
        if !(MIN_NGRAM..=MAX_NGRAM).contains(&self.ngram) {
            return bad(format!(
                "n-gram size must be in {MIN_NGRAM}..={MAX_NGRAM} (got {})",
                self.ngram
            ));
        }
        if self.max_length == 0 {
            return bad("max length must be at least 1".to_string());
        }
        if self.max_level > MAX_LEVEL_CAP {
            return bad(format!(
                "max level must be at most {MAX_LEVEL_CAP} (got {})",
                self.max_level
            ));
        }
        if self.shard_size == 0 {
            return bad("shard size must be at least 1".to_string());
        }
        if self.workers == Some(0) {
            return bad("worker count must be at least 1".to_string());
        }
        if let AlphabetSpec::Learned(0) = self.alphabet {
            return bad("learned alphabet size must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}

pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train a ruleset named `name` from the corpus `open` yields.
    pub fn train<F, R, E>(
        &self,
        name: &str,
        encoding: Encoding,
        mut open: F,
    ) -> std::result::Result<Ruleset, E>
    where
        F: FnMut() -> std::result::Result<R, E>,
        R: BufRead,
        E: From<CoreError> + From<io::Error>,
    {
        let alphabet = match &self.config.alphabet {
            AlphabetSpec::Default => Alphabet::default_set(),
            AlphabetSpec::Explicit(chars) => Alphabet::new(chars.chars())?,
            AlphabetSpec::Learned(size) => {
                let learner = self.learn_alphabet(CorpusReader::new(open()?, encoding))?;
                learner.finish(*size)?
            }
        };
        let counts = self.count::<R, E>(&alphabet, CorpusReader::new(open()?, encoding))?;
        Ok(self.build(name, alphabet, &counts, encoding)?)
    }

    /// First pass for [`AlphabetSpec::Learned`]: character frequencies.
    pub fn learn_alphabet<R: BufRead>(
        &self,
        reader: CorpusReader<R>,
    ) -> io::Result<AlphabetLearner> {
        let mut learner = AlphabetLearner::new();
        for password in reader {
            let password = password?;
            if password.chars().count() <= self.config.max_length {
                learner.observe(&password);
            }
        }
        Ok(learner)
    }

    /// Count the corpus, in parallel shards when more than one worker is
    /// configured. The result does not depend on the worker count.
    pub fn count<R, E>(
        &self,
        alphabet: &Alphabet,
        mut reader: CorpusReader<R>,
    ) -> std::result::Result<NgramCounts, E>
    where
        R: BufRead,
        E: From<CoreError> + From<io::Error>,
    {
        let cfg = &self.config;
        let mut total = NgramCounts::new(alphabet.len(), cfg.ngram, cfg.max_length)?;
        let workers = cfg.workers();

        if workers == 1 {
            while let Some(password) = reader.next_password()? {
                total.observe(alphabet, &password);
            }
        } else {
            let mut done = false;
            while !done {
                let mut batch = Vec::with_capacity(workers);
                while batch.len() < workers && !done {
                    let mut shard = Vec::with_capacity(cfg.shard_size.min(DEFAULT_SHARD_SIZE));
                    while shard.len() < cfg.shard_size {
                        match reader.next_password()? {
                            Some(password) => shard.push(password),
                            None => {
                                done = true;
                                break;
                            }
                        }
                    }
                    if !shard.is_empty() {
                        batch.push(shard);
                    }
                }
                for partial in self.count_batch(alphabet, &batch) {
                    total.merge(&partial?)?;
                }
            }
        }

        total.record_undecodable(reader.encoding_errors());
        Ok(total)
    }

    fn count_batch(&self, alphabet: &Alphabet, batch: &[Vec<String>]) -> Vec<Result<NgramCounts>> {
        let cfg = &self.config;
        let (tx, rx) = mpsc::channel();
        thread::scope(|scope| {
            for shard in batch {
                let tx = tx.clone();
                scope.spawn(move || {
                    let partial = NgramCounts::new(alphabet.len(), cfg.ngram, cfg.max_length).map(
                        |mut counts| {
                            for password in shard {
                                counts.observe(alphabet, password);
                            }
                            counts
                        },
                    );
                    // the receiver outlives the scope
                    let _ = tx.send(partial);
                });
            }
        });
        drop(tx);
        rx.into_iter().collect()
    }

    /// Quantize `counts` into a named ruleset.
    pub fn build(
        &self,
        name: &str,
        alphabet: Alphabet,
        counts: &NgramCounts,
        encoding: Encoding,
    ) -> Result<Ruleset> {
        let tables = Quantizer::new(self.config.max_level).quantize(counts)?;
        let config = RulesetConfig {
            format_version: RULESET_FORMAT_VERSION,
            ngram: self.config.ngram,
            max_level: self.config.max_level,
            max_length: self.config.max_length,
            alphabet_size: alphabet.len(),
            encoding,
            training_id: Uuid::new_v4(),
            passwords: counts.passwords(),
            discards: counts.discards(),
        };
        Ruleset::new(name, config, alphabet, tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const CORPUS: &str = "password\n123456\nqwerty\npassword1\nletmein\nabc123\ndragon\n\
                          monkey\npassword\n111111\niloveyou\nsunshine\nwinter2024\n";

    fn train(config: TrainingConfig) -> Ruleset {
        Trainer::new(config)
            .unwrap()
            .train::<_, _, TestError>("test", Encoding::Utf8, || {
                Ok(Cursor::new(CORPUS.as_bytes()))
            })
            .unwrap()
    }

    #[derive(Debug)]
    enum TestError {
        Core(CoreError),
        Io(io::Error),
    }

    impl From<CoreError> for TestError {
        fn from(e: CoreError) -> Self {
            TestError::Core(e)
        }
    }

    impl From<io::Error> for TestError {
        fn from(e: io::Error) -> Self {
            TestError::Io(e)
        }
    }

    #[test]
    fn test_train_default_config() {
        let r = train(TrainingConfig::default());
        assert_eq!(r.name(), "test");
        assert_eq!(r.config().passwords, 13);
        assert_eq!(r.alphabet().len(), 72);
        assert_eq!(r.tables().lengths.len(), 20);
    }

    #[test]
    fn test_parallel_equals_serial() {
        let serial = train(TrainingConfig {
            workers: Some(1),
            ..TrainingConfig::default()
        });
        let parallel = train(TrainingConfig {
            workers: Some(4),
            shard_size: 2,
            ..TrainingConfig::default()
        });
        assert_eq!(serial.fingerprint(), parallel.fingerprint());
        assert_eq!(serial.config().passwords, parallel.config().passwords);
    }

    #[test]
    fn test_learned_alphabet_opens_corpus_twice() {
        let mut opened = 0;
        let trainer = Trainer::new(TrainingConfig {
            alphabet: AlphabetSpec::Learned(12),
            ..TrainingConfig::default()
        })
        .unwrap();
        let r = trainer
            .train::<_, _, TestError>("learned", Encoding::Utf8, || {
                opened += 1;
                Ok(Cursor::new(CORPUS.as_bytes()))
            })
            .unwrap();
        assert_eq!(opened, 2);
        assert_eq!(r.alphabet().len(), 12);
        assert!(r.config().discards.foreign_chars > 0);
    }

    #[test]
    fn test_empty_corpus_is_insufficient() {
        let trainer = Trainer::new(TrainingConfig::default()).unwrap();
        let err = trainer
            .train::<_, _, TestError>("empty", Encoding::Utf8, || Ok(Cursor::new(&b"\n\n"[..])))
            .unwrap_err();
        assert!(matches!(err, TestError::Core(CoreError::InsufficientData(_))));
    }

    #[test]
    fn test_open_failure_propagates() {
        let trainer = Trainer::new(TrainingConfig::default()).unwrap();
        let err = trainer
            .train::<_, Cursor<&[u8]>, TestError>("missing", Encoding::Utf8, || {
                Err(TestError::Io(io::Error::new(io::ErrorKind::NotFound, "no corpus")))
            })
            .unwrap_err();
        assert!(matches!(err, TestError::Io(_)));
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let base = TrainingConfig::default;
        for config in [
            TrainingConfig { ngram: 1, ..base() },
            TrainingConfig { ngram: 6, ..base() },
            TrainingConfig { max_length: 0, ..base() },
            TrainingConfig { max_level: MAX_LEVEL_CAP + 1, ..base() },
            TrainingConfig { max_level: 3_000_000_000, ..base() },
            TrainingConfig { workers: Some(0), ..base() },
            TrainingConfig {
                alphabet: AlphabetSpec::Learned(0),
                ..base()
            },
        ] {
            assert!(matches!(Trainer::new(config), Err(CoreError::Configuration(_))));
        }
        assert!(Trainer::new(TrainingConfig { max_level: MAX_LEVEL_CAP, ..base() }).is_ok());
    }

    #[test]
    fn test_undecodable_lines_counted() {
        let trainer = Trainer::new(TrainingConfig {
            workers: Some(1),
            ..TrainingConfig::default()
        })
        .unwrap();
        let r = trainer
            .train::<_, _, TestError>("mixed", Encoding::Utf8, || {
                Ok(Cursor::new(&b"abc\nd\xe9f\nxyz\n"[..]))
            })
            .unwrap();
        assert_eq!(r.config().discards.undecodable, 1);
        assert_eq!(r.config().passwords, 2);
    }
}
