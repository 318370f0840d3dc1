//! The built-in `Default` ruleset, trained from a small corpus compiled into
//! the binary.

use std::io::Cursor;

use omen_core::{DEFAULT_RULESET, Encoding, Ruleset, Trainer, TrainingConfig};

use crate::error::{Result, StoreError};

const DEFAULT_CORPUS: &str = include_str!("../data/default_corpus.txt");

pub fn train_default() -> Result<Ruleset> {
    let trainer = Trainer::new(TrainingConfig::default())?;
    let ruleset = trainer.train::<_, _, StoreError>(DEFAULT_RULESET, Encoding::Utf8, || {
        Ok(Cursor::new(DEFAULT_CORPUS.as_bytes()))
    })?;
    tracing::info!(
        passwords = ruleset.config().passwords,
        fingerprint = &ruleset.fingerprint()[..12],
        "trained default ruleset"
    );
    Ok(ruleset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use omen_core::{Cursor, Enumerator, Level, Model};

    /// A cursor parked at the start of `levels` for passwords of `len`.
    fn parked(model: &Model, len: usize, levels: Vec<Level>) -> Cursor {
        Cursor {
            target: levels.iter().sum::<Level>() + model.length_level(len),
            length_index: model.length_order().iter().position(|&l| l == len).unwrap(),
            levels,
            picks: Vec::new(),
            emitted: 0,
        }
    }

    #[test]
    fn test_default_is_deterministic() {
        let a = train_default().unwrap();
        let b = train_default().unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.name(), DEFAULT_RULESET);
        assert_eq!(a.ngram(), 4);
        assert_eq!(a.max_level(), 10);
    }

    #[test]
    fn test_corpus_fits_default_alphabet() {
        let ruleset = train_default().unwrap();
        assert_eq!(ruleset.config().discards.total(), 0);
        assert_eq!(
            ruleset.config().passwords,
            DEFAULT_CORPUS.lines().count() as u64
        );
    }

    #[test]
    fn test_unseen_prefix_vectors_stay_fast() {
        let model = Model::new(&train_default().unwrap()).unwrap();
        let smoothing = model.max_level();
        // two unseen steps up front, then observed level-0 transitions
        let cursor = parked(&model, 6, vec![smoothing, smoothing, 0, 0, 5]);

        let start = Instant::now();
        let guesses: Vec<_> = Enumerator::resume(&model, &cursor)
            .unwrap()
            .take(2_000)
            .collect();
        let elapsed = start.elapsed();

        assert_eq!(guesses.len(), 2_000);
        assert!(guesses.windows(2).all(|w| w[0].level <= w[1].level));
        assert_eq!(guesses[0].level, cursor.target);
        assert!(elapsed < Duration::from_secs(30), "took {elapsed:?}");
    }
}
