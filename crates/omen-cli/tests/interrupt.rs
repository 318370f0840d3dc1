//! Integration tests for interrupting `omen guess`.
//! A signal must flush stdout, checkpoint the session and exit 0, so that a
//! restore continues exactly after the last printed guess.

#![cfg(unix)]

use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tempfile::TempDir;

const CORPUS: &str = "\
123456\npassword\n12345678\nqwerty\n123456789\n12345\n1234\n111111\n1234567\ndragon\n\
123123\nbaseball\nabc123\nfootball\nmonkey\nletmein\n696969\nshadow\nmaster\n666666\n";

fn omen_binary() -> std::path::PathBuf {
    assert_cmd::cargo::cargo_bin!("omen").into()
}

fn omen(data_dir: &TempDir) -> Command {
    let mut cmd = Command::new(omen_binary());
    cmd.env("OMEN_DATA_DIR", data_dir.path());
    cmd
}

fn train(data_dir: &TempDir) {
    let corpus = data_dir.path().join("corpus.txt");
    std::fs::write(&corpus, CORPUS).unwrap();
    let status = omen(data_dir)
        .args(["train", "--rule", "sig", "--ngram", "3", "--max-length", "10"])
        .arg("--training")
        .arg(&corpus)
        .stdout(Stdio::null())
        .status()
        .unwrap();
    assert!(status.success());
}

fn guess(data_dir: &TempDir, args: &[&str]) -> Vec<String> {
    let output = omen(data_dir).arg("guess").args(args).output().unwrap();
    assert!(output.status.success(), "guess {args:?} failed");
    String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Read `n` lines, signal, drain the rest. Returns everything printed.
fn interrupt_after(data_dir: &TempDir, n: usize, signal: libc::c_int) -> Vec<String> {
    let mut child = omen(data_dir)
        .args(["guess", "--rule", "sig", "--session", "cut"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn omen guess");

    let mut reader = BufReader::new(child.stdout.take().expect("stdout pipe"));
    let mut lines = Vec::new();
    let mut line = String::new();
    while lines.len() < n {
        line.clear();
        assert!(reader.read_line(&mut line).unwrap() > 0, "guess ended early");
        lines.push(line.trim_end_matches('\n').to_string());
    }

    unsafe {
        libc::kill(child.id() as libc::pid_t, signal);
    }

    let start = Instant::now();
    for rest in reader.lines() {
        lines.push(rest.unwrap());
    }
    let status = child.wait().expect("wait");
    assert!(
        status.success(),
        "omen guess should exit 0 on signal, got {status}"
    );
    assert!(start.elapsed() < Duration::from_secs(5));
    lines
}

/// Interrupt after at least 1000 guesses, restore, take 500 more: the
/// result matches an uninterrupted run.
#[test]
fn sigint_checkpoints_and_resumes() {
    let dir = TempDir::new().unwrap();
    train(&dir);

    let printed = interrupt_after(&dir, 1000, libc::SIGINT);
    assert!(printed.len() >= 1000);

    let rest = guess(&dir, &["--rule", "sig", "--restore", "cut", "--limit", "500"]);
    let total = printed.len() + 500;
    let straight = guess(
        &dir,
        &["--rule", "sig", "--session", "full", "--limit", &total.to_string()],
    );

    let joined: Vec<String> = printed.into_iter().chain(rest).collect();
    assert_eq!(joined, straight);
}

#[test]
fn sigterm_also_checkpoints() {
    let dir = TempDir::new().unwrap();
    train(&dir);

    let printed = interrupt_after(&dir, 200, libc::SIGTERM);
    let sessions = omen(&dir).arg("sessions").output().unwrap();
    let listing = String::from_utf8(sessions.stdout).unwrap();
    assert!(
        listing.contains(&format!("emitted={}", printed.len())),
        "checkpoint should cover exactly the printed guesses: {listing}"
    );
}
