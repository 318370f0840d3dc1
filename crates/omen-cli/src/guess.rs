use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use omen_core::{
    CheckpointPolicy, DEFAULT_RULESET, DEFAULT_SESSION, Enumerator, Model, Ruleset, Session,
};
use omen_store::CheckpointManager;

use crate::Workspace;

/// Guesses between checkpoint policy checks and progress lines.
const CLOCK_EVERY: u64 = 4096;

#[derive(Args)]
pub struct GuessArgs {
    /// Ruleset to enumerate
    #[arg(long, short, default_value = DEFAULT_RULESET)]
    rule: String,

    /// Session name to checkpoint under
    #[arg(long, short)]
    session: Option<String>,

    /// Resume a saved session
    #[arg(long)]
    restore: Option<String>,

    /// Stop after this many guesses (0 = no limit)
    #[arg(long, short, default_value_t = 0)]
    limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Limit,
    Interrupted,
    PipeClosed,
    Exhausted,
}

pub async fn run(workspace: &Workspace, args: GuessArgs) -> Result<()> {
    let ruleset = workspace.load_ruleset(&args.rule)?;
    let checkpoints = workspace.checkpoints()?;

    let mut session = match &args.restore {
        Some(name) => checkpoints
            .restore(name, &ruleset)
            .with_context(|| format!("cannot restore session '{name}'"))?,
        None => Session::new(DEFAULT_SESSION, &ruleset),
    };
    if let Some(name) = args.session {
        session.name = name;
    }
    let policy = workspace
        .settings()
        .checkpoint_policy()
        .starting_at(session.cursor.emitted);

    let stop = Arc::new(AtomicBool::new(false));
    watch_signals(Arc::clone(&stop))?;

    let limit = args.limit;
    let (reason, session) = tokio::task::spawn_blocking(move || {
        stream(&ruleset, session, &checkpoints, policy, limit, &stop)
    })
    .await
    .context("guess worker panicked")??;

    tracing::info!(
        session = %session.name,
        emitted = session.cursor.emitted,
        "stopped: {reason:?}"
    );
    Ok(())
}

/// Flip `stop` on SIGINT or SIGTERM. Handlers are registered before this
/// returns so no signal is lost once guessing starts.
fn watch_signals(stop: Arc<AtomicBool>) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut interrupt =
            signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
        let mut terminate =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::spawn(async move {
            tokio::select! {
                _ = interrupt.recv() => tracing::info!("received SIGINT, checkpointing"),
                _ = terminate.recv() => tracing::info!("received SIGTERM, checkpointing"),
            }
            stop.store(true, Ordering::SeqCst);
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received Ctrl+C, checkpointing");
            stop.store(true, Ordering::SeqCst);
        }
    });

    Ok(())
}

fn stream(
    ruleset: &Ruleset,
    mut session: Session,
    checkpoints: &CheckpointManager,
    mut policy: CheckpointPolicy,
    limit: u64,
    stop: &AtomicBool,
) -> Result<(Stop, Session)> {
    let model = Model::new(ruleset).context("failed to build model")?;
    let mut guesses = Enumerator::resume(&model, &session.cursor)
        .with_context(|| format!("session '{}' cannot be resumed", session.name))?;
    let start = guesses.emitted();
    let mut last_tick = Instant::now();
    let mut last_emitted = start;

    let stdout = io::stdout();
    let mut out = BufWriter::with_capacity(64 * 1024, stdout.lock());

    let reason = loop {
        if stop.load(Ordering::Relaxed) {
            break Stop::Interrupted;
        }
        let emitted = guesses.emitted();
        if limit > 0 && emitted - start >= limit {
            break Stop::Limit;
        }
        if emitted > start && emitted % CLOCK_EVERY == 0 {
            let now = Instant::now();
            let secs = now.duration_since(last_tick).as_secs_f64();
            let per_sec = (emitted - last_emitted) as f64 / secs.max(1e-6);
            tracing::debug!(
                emitted,
                level = guesses.target(),
                per_sec = per_sec.round() as u64,
                "progress"
            );
            last_tick = now;
            last_emitted = emitted;

            session.cursor = guesses.cursor();
            match checkpoints.maybe_checkpoint(&session, &mut policy, now, || out.flush()) {
                Ok(_) => {}
                Err(omen_store::StoreError::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                    break Stop::PipeClosed;
                }
                Err(e) => return Err(e).context("checkpoint failed"),
            }
        }

        let Some(guess) = guesses.next_guess() else {
            break Stop::Exhausted;
        };
        if let Err(e) = writeln!(out, "{}", guess.text) {
            if e.kind() == io::ErrorKind::BrokenPipe {
                break Stop::PipeClosed;
            }
            return Err(e).context("failed to write guess");
        }
    };

    match out.flush() {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            tracing::debug!("output closed before final flush");
        }
        Err(e) => return Err(e).context("failed to flush guesses"),
    }

    session.cursor = guesses.cursor();
    checkpoints
        .checkpoint(&session)
        .with_context(|| format!("failed to checkpoint session '{}'", session.name))?;
    if reason == Stop::Exhausted {
        tracing::warn!("ruleset '{}' has no more guesses", ruleset.name());
    }
    Ok((reason, session))
}
