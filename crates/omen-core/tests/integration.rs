//! Integration tests exercising the full pipeline:
//! train → model → enumerate → cursor → resume, across module boundaries.

use std::collections::HashSet;
use std::io::{self, Cursor as IoCursor};

use omen_core::{
    Alphabet, AlphabetSpec, CoreError, Encoding, Enumerator, Guess, Model, NgramCounts,
    Quantizer, Ruleset, Session, Trainer, TrainingConfig,
};
use proptest::prelude::*;

const COMMON: &str = "\
123456\npassword\n12345678\nqwerty\n123456789\n12345\n1234\n111111\n1234567\ndragon\n\
123123\nbaseball\nabc123\nfootball\nmonkey\nletmein\n696969\nshadow\nmaster\n666666\n\
qwertyuiop\n123321\nmustang\n1234567890\nmichael\n654321\nsummer\nsuperman\n1qaz2wsx\n\
7777777\nprincess\n121212\n000000\nqazwsx\n123qwe\nkiller\ntrustno1\njordan\njennifer\n\
zxcvbnm\nasdfgh\nhunter\nbuster\nsoccer\nharley\nbatman\nandrew\ntigger\nsunshine\n\
iloveyou\nfreedom\n2000\ncharlie\nrobert\nthomas\nhockey\nranger\ndaniel\nstarwars\n";

#[derive(Debug)]
enum Error {
    Core(CoreError),
    Io(io::Error),
}

impl From<CoreError> for Error {
    fn from(e: CoreError) -> Self {
        Error::Core(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

fn train(corpus: &'static str, config: TrainingConfig) -> Ruleset {
    Trainer::new(config)
        .unwrap()
        .train::<_, _, Error>("it", Encoding::Utf8, || {
            Ok(IoCursor::new(corpus.as_bytes()))
        })
        .unwrap()
}

fn small_config() -> TrainingConfig {
    TrainingConfig {
        ngram: 3,
        max_level: 5,
        max_length: 8,
        workers: Some(2),
        shard_size: 16,
        ..TrainingConfig::default()
    }
}

/// `{abc, abd, abc, abe}` over `{a..e}` with bigrams.
#[test]
fn frequent_successor_comes_first() {
    let config = TrainingConfig {
        alphabet: AlphabetSpec::Explicit("abcde".to_string()),
        ngram: 2,
        workers: Some(1),
        ..TrainingConfig::default()
    };
    let ruleset = train("abc\nabd\nabc\nabe\n", config);
    let model = Model::new(&ruleset).unwrap();

    let c = model.score("abc").unwrap();
    let d = model.score("abd").unwrap();
    let e = model.score("abe").unwrap();
    assert!(c.transitions[1] <= d.transitions[1]);
    assert!(c.transitions[1] <= e.transitions[1]);

    let order: Vec<String> = Enumerator::new(&model)
        .take(5000)
        .map(|g| g.text)
        .collect();
    let pos = |s: &str| order.iter().position(|g| g == s).unwrap();
    assert!(pos("abc") < pos("abd"));
    assert!(pos("abc") < pos("abe"));
    assert_eq!(order[0], "abc");
}

/// Levels never decrease and every guess scores at its reported level.
#[test]
fn guesses_are_ordered_and_consistent() {
    let ruleset = train(COMMON, small_config());
    let model = Model::new(&ruleset).unwrap();
    let guesses: Vec<Guess> = Enumerator::new(&model).take(5_000).collect();
    assert_eq!(guesses.len(), 5_000);
    for pair in guesses.windows(2) {
        assert!(pair[0].level <= pair[1].level);
    }
    for g in guesses.iter().step_by(97) {
        assert_eq!(model.score(&g.text).unwrap().total(), g.level);
    }
}

#[test]
fn no_guess_repeats() {
    let ruleset = train(COMMON, small_config());
    let model = Model::new(&ruleset).unwrap();
    let mut seen = HashSet::new();
    for g in Enumerator::new(&model).take(10_000) {
        assert!(seen.insert(g.text.clone()), "duplicate guess {}", g.text);
    }
}

/// Stopping after N, checkpointing through a session, and resuming for M
/// more yields exactly the first N + M guesses of an uninterrupted run.
#[test]
fn checkpoint_resume_matches_uninterrupted_run() {
    let ruleset = train(COMMON, small_config());
    let model = Model::new(&ruleset).unwrap();
    let straight: Vec<Guess> = Enumerator::new(&model).take(1500).collect();

    let mut session = Session::new("s", &ruleset);
    let mut first = Enumerator::new(&model);
    let head: Vec<Guess> = first.by_ref().take(1000).collect();
    session.cursor = first.cursor();
    assert_eq!(session.cursor.emitted, 1000);

    session.verify(&ruleset).unwrap();
    let mut resumed = Enumerator::resume(&model, &session.cursor).unwrap();
    let tail: Vec<Guess> = resumed.by_ref().take(500).collect();
    assert_eq!(resumed.emitted(), 1500);

    let joined: Vec<Guess> = head.into_iter().chain(tail).collect();
    assert_eq!(joined, straight);
}

#[test]
fn retrained_ruleset_rejects_old_session() {
    let ruleset = train(COMMON, small_config());
    let session = Session::new("s", &ruleset);
    let retrained = train(
        COMMON,
        TrainingConfig {
            max_level: 6,
            ..small_config()
        },
    );
    assert!(matches!(
        session.verify(&retrained),
        Err(CoreError::SessionMismatch { .. })
    ));
    // same data, same parameters: same fingerprint
    let again = train(COMMON, small_config());
    assert!(session.verify(&again).is_ok());
}

/// Passwords shorter than the context go through the short-gram table.
#[test]
fn short_passwords_are_guessed() {
    let config = TrainingConfig {
        ngram: 4,
        max_level: 4,
        max_length: 6,
        workers: Some(1),
        ..TrainingConfig::default()
    };
    let ruleset = train("ab\nab\nab\nabcd\nabce\n", config);
    let model = Model::new(&ruleset).unwrap();
    let breakdown = model.score("ab").unwrap();
    assert_eq!(breakdown.end, None);
    let first: Vec<String> = Enumerator::new(&model).take(3).map(|g| g.text).collect();
    assert!(first.contains(&"ab".to_string()));
}

#[test]
fn empty_corpus_cannot_train() {
    let err = Trainer::new(small_config())
        .unwrap()
        .train::<_, _, Error>("none", Encoding::Utf8, || Ok(IoCursor::new(&b""[..])))
        .unwrap_err();
    assert!(matches!(err, Error::Core(CoreError::InsufficientData(_))));
}

proptest! {
    /// More frequent successors never get a worse level.
    #[test]
    fn quantizer_is_monotone(counts in prop::collection::vec(1u32..500, 2..26)) {
        let alphabet = Alphabet::new(('a'..='z').take(counts.len())).unwrap();
        let mut ngrams = NgramCounts::new(alphabet.len(), 2, 3).unwrap();
        for (i, &n) in counts.iter().enumerate() {
            let pw: String = ['a', alphabet.chars()[i]].iter().collect();
            for _ in 0..n {
                ngrams.observe(&alphabet, &pw);
            }
        }
        let tables = Quantizer::new(10).quantize(&ngrams).unwrap();
        let row = &tables.cp[&0];
        for i in 0..counts.len() {
            for j in 0..counts.len() {
                if counts[i] > counts[j] {
                    prop_assert!(row[&(i as u16)] <= row[&(j as u16)]);
                }
            }
        }
    }

    /// Any split point resumes to the same sequence.
    #[test]
    fn resume_at_any_point(stop in 1usize..300) {
        let ruleset = train("abc\nbca\ncab\naab\nbbc\n", TrainingConfig {
            alphabet: AlphabetSpec::Explicit("abc".to_string()),
            ngram: 2,
            max_level: 3,
            max_length: 5,
            workers: Some(1),
            ..TrainingConfig::default()
        });
        let model = Model::new(&ruleset).unwrap();
        let all: Vec<Guess> = Enumerator::new(&model).take(stop + 50).collect();
        let mut head = Enumerator::new(&model);
        for _ in 0..stop {
            head.next();
        }
        let rest: Vec<Guess> = Enumerator::resume(&model, &head.cursor())
            .unwrap()
            .take(50)
            .collect();
        prop_assert_eq!(&rest[..], &all[stop..]);
    }
}
