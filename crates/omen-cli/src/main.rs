mod guess;
mod train;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use omen_core::{DEFAULT_RULESET, Model, Ruleset};
use omen_store::{CheckpointManager, DataDir, RulesetStore, SessionStore, Settings};

#[derive(Parser)]
#[command(name = "omen", version, about = "Ordered Markov ENumerator password guesser")]
struct Cli {
    /// Data directory (defaults to $OMEN_DATA_DIR, then ~/.omen)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a ruleset from a password list
    Train(train::TrainArgs),

    /// Stream guesses in order, one per line
    Guess(guess::GuessArgs),

    /// Show the level breakdown of passwords under a ruleset
    Score {
        #[arg(long, short, default_value = DEFAULT_RULESET)]
        rule: String,

        #[arg(required = true)]
        passwords: Vec<String>,
    },

    /// Show a ruleset's configuration and table sizes
    Info {
        #[arg(long, short, default_value = DEFAULT_RULESET)]
        rule: String,
    },

    /// List stored rulesets
    Rules,

    /// List stored sessions
    Sessions {
        /// Delete the named session instead of listing
        #[arg(long)]
        delete: Option<String>,
    },
}

/// Resolved data directory plus its settings file.
pub struct Workspace {
    data: DataDir,
    settings: Settings,
}

impl Workspace {
    fn open(cli: &Cli) -> Result<Self> {
        let root = omen_store::resolve_base_dir(cli.data_dir.as_deref());
        let data = DataDir::open(&root)
            .with_context(|| format!("failed to open data directory {}", root.display()))?;
        let settings = Settings::load(&data.settings_file()).context("failed to load settings")?;
        tracing::debug!("data directory: {}", data.root().display());
        Ok(Self { data, settings })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn rulesets(&self) -> RulesetStore {
        RulesetStore::new(self.data.rules_dir())
    }

    pub fn load_ruleset(&self, name: &str) -> Result<Ruleset> {
        self.rulesets()
            .load_or_default(name)
            .with_context(|| format!("failed to load ruleset '{name}'"))
    }

    pub fn checkpoints(&self) -> Result<CheckpointManager> {
        let path = self.data.sessions_db();
        let sessions = SessionStore::open(&path)
            .with_context(|| format!("failed to open session store {}", path.display()))?;
        Ok(CheckpointManager::new(sessions))
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let workspace = Workspace::open(&cli)?;

    match cli.command {
        Commands::Train(args) => train::run(&workspace, args),
        Commands::Guess(args) => guess::run(&workspace, args).await,
        Commands::Score { rule, passwords } => cmd_score(&workspace, &rule, &passwords),
        Commands::Info { rule } => cmd_info(&workspace, &rule),
        Commands::Rules => cmd_rules(&workspace),
        Commands::Sessions { delete } => cmd_sessions(&workspace, delete.as_deref()),
    }
}

fn cmd_score(workspace: &Workspace, rule: &str, passwords: &[String]) -> Result<()> {
    let ruleset = workspace.load_ruleset(rule)?;
    let model = Model::new(&ruleset).context("failed to build model")?;

    for password in passwords {
        match model.score(password) {
            Some(b) => {
                let transitions: Vec<String> =
                    b.transitions.iter().map(|l| l.to_string()).collect();
                let end = b.end.map_or_else(|| "-".to_string(), |l| l.to_string());
                println!(
                    "{password}\ttotal={} length={} initial={} transitions=[{}] end={end}",
                    b.total(),
                    b.length,
                    b.initial,
                    transitions.join(",")
                );
            }
            None => println!("{password}\tnot representable"),
        }
    }
    Ok(())
}

fn cmd_info(workspace: &Workspace, rule: &str) -> Result<()> {
    let ruleset = workspace.load_ruleset(rule)?;
    let config = ruleset.config();
    let tables = ruleset.tables();
    let alphabet: String = ruleset.alphabet().chars().iter().collect();

    println!("ruleset:      {}", ruleset.name());
    println!("path:         {}", workspace.rulesets().path_of(ruleset.name()).display());
    println!("fingerprint:  {}", ruleset.fingerprint());
    println!("training_id:  {}", config.training_id);
    println!("ngram:        {}", config.ngram);
    println!("max_level:    {}", config.max_level);
    println!("max_length:   {}", config.max_length);
    println!("encoding:     {}", config.encoding);
    println!("alphabet:     {} {alphabet:?}", config.alphabet_size);
    println!("passwords:    {}", config.passwords);
    println!(
        "discarded:    {} (empty={}, too_long={}, foreign={}, undecodable={})",
        config.discards.total(),
        config.discards.empty,
        config.discards.too_long,
        config.discards.foreign_chars,
        config.discards.undecodable
    );
    println!(
        "tables:       ip={} short={} cp={} ep={} lengths={}",
        tables.ip.len(),
        tables.short_count(),
        tables.transition_count(),
        tables.ep.len(),
        tables.lengths.len()
    );
    Ok(())
}

fn cmd_rules(workspace: &Workspace) -> Result<()> {
    let names = workspace.rulesets().list().context("failed to list rulesets")?;
    if names.is_empty() {
        println!("(no rulesets; '{DEFAULT_RULESET}' is created on first use)");
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

fn cmd_sessions(workspace: &Workspace, delete: Option<&str>) -> Result<()> {
    let checkpoints = workspace.checkpoints()?;
    let sessions = checkpoints.sessions();

    if let Some(name) = delete {
        if !sessions.delete(name)? {
            anyhow::bail!("session '{name}' not found");
        }
        println!("deleted session '{name}'");
        return Ok(());
    }

    let list = sessions.list().context("failed to list sessions")?;
    if list.is_empty() {
        println!("(no sessions)");
    }
    for s in list {
        let short = s.fingerprint.get(..12).unwrap_or(&s.fingerprint);
        println!(
            "{}\truleset={}@{short}\temitted={}\tsaved={}",
            s.name, s.ruleset, s.emitted, s.saved_at
        );
    }
    Ok(())
}
