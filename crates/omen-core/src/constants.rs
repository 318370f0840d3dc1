/// Fixed alphabet used when no alphabet is learned from the corpus.
pub const DEFAULT_ALPHABET: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!.*@-_$#<?";

/// Default n-gram size (context of n-1 symbols).
pub const DEFAULT_NGRAM: usize = 4;

/// Smallest and largest supported n-gram size.
pub const MIN_NGRAM: usize = 2;
pub const MAX_NGRAM: usize = 5;

/// Default quantizer resolution. Levels live in `[0, DEFAULT_MAX_LEVEL]`.
pub const DEFAULT_MAX_LEVEL: u32 = 10;

/// Largest accepted quantizer resolution. Per-level tables in the model are
/// sized by it.
pub const MAX_LEVEL_CAP: u32 = 255;

/// Passwords longer than this are discarded during training.
pub const DEFAULT_MAX_LENGTH: usize = 20;

/// Characters that can never be alphabet members: they delimit the
/// line-oriented ruleset files.
pub const RESERVED_CHARS: [char; 3] = ['\t', '\n', '\r'];

/// Frontier sets above this many contexts stop pruning and go open.
pub const FRONTIER_LIMIT: usize = 1 << 14;

/// Lines per shard when counting in parallel.
pub const DEFAULT_SHARD_SIZE: usize = 64 * 1024;

/// Version of the on-disk ruleset format. Part of the fingerprint.
pub const RULESET_FORMAT_VERSION: u32 = 1;

/// Name of the ruleset used when none is specified.
pub const DEFAULT_RULESET: &str = "Default";

/// Name of the session used when none is specified.
pub const DEFAULT_SESSION: &str = "default";
