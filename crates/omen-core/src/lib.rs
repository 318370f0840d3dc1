//! OMEN (Ordered Markov ENumerator) password model engine.
//!
//! Trains an n-gram model from a password corpus, quantizes its
//! probabilities into small integer levels, and enumerates candidates in
//! non-decreasing total level without materializing the candidate space.
//!
//! Zero filesystem I/O: corpora arrive as `BufRead`, rulesets and sessions
//! are plain values. Persistence lives in `omen-store`.

pub mod alphabet;
pub mod codec;
pub mod composition;
pub mod constants;
pub mod corpus;
pub mod counter;
pub mod encoding;
pub mod enumerate;
pub mod error;
pub mod model;
pub mod quantize;
pub mod ruleset;
pub mod session;
pub mod trainer;

pub use alphabet::{Alphabet, AlphabetLearner, AlphabetSpec, Symbol};
pub use codec::GramCodec;
pub use constants::{
    DEFAULT_ALPHABET, DEFAULT_MAX_LENGTH, DEFAULT_MAX_LEVEL, DEFAULT_NGRAM, DEFAULT_RULESET,
    DEFAULT_SESSION, FRONTIER_LIMIT, MAX_LEVEL_CAP, MAX_NGRAM, MIN_NGRAM, RULESET_FORMAT_VERSION,
};
pub use corpus::CorpusReader;
pub use counter::{Discards, NgramCounts};
pub use encoding::{Detected, Encoding, EncodingDetector, Utf8Probe};
pub use enumerate::{Cursor, Enumerator, Guess};
pub use error::{CoreError, Result};
pub use model::{Frontier, LevelBreakdown, Model};
pub use quantize::Quantizer;
pub use ruleset::{Level, LevelTables, Ruleset, RulesetConfig, validate_name};
pub use session::{CheckpointPolicy, Session};
pub use trainer::{Trainer, TrainingConfig};
