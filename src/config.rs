//! Engine and session configuration.
//!
//! Engine settings are clamped into range instead of being rejected, so any
//! caller input produces a usable configuration.

use std::time::Duration;

use crate::error::ConfigError;
use crate::protocol::UciCommand;
use crate::transport::TransportTarget;

/// Search depth bounds, in plies
pub const MIN_DEPTH: u32 = 1;
pub const MAX_DEPTH: u32 = 50;
/// `UCI_Elo` bounds accepted by common engines
pub const MIN_ELO: u32 = 1320;
pub const MAX_ELO: u32 = 3190;

/// Engine-side defaults. Options equal to these are not sent.
const ENGINE_DEFAULT_THREADS: usize = 1;
const ENGINE_DEFAULT_HASH_MB: usize = 16;

const DEFAULT_DEPTH: u32 = 15;

/// Snapshot of the settings applied to an engine at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    depth: u32,
    elo_rating: u32,
    thread_count: usize,
    hash_size_mb: usize,
    ponder: bool,
    chess960: bool,
    limit_strength: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            depth: DEFAULT_DEPTH,
            elo_rating: MAX_ELO,
            thread_count: ENGINE_DEFAULT_THREADS,
            hash_size_mb: ENGINE_DEFAULT_HASH_MB,
            ponder: false,
            chess960: false,
            limit_strength: false,
        }
    }
}

impl EngineConfig {
    /// Engine defaults: depth 15, full strength, one thread, 16 MB hash.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Search depth, clamped to `MIN_DEPTH..=MAX_DEPTH`.
    #[must_use]
    pub fn with_depth(mut self, depth: i64) -> Self {
        self.depth = clamp_to(depth, MIN_DEPTH, MAX_DEPTH);
        self
    }

    /// Playing strength, clamped to `MIN_ELO..=MAX_ELO`.
    #[must_use]
    pub fn with_elo_rating(mut self, elo: i64) -> Self {
        self.elo_rating = clamp_to(elo, MIN_ELO, MAX_ELO);
        self
    }

    /// Engine search threads, at least one.
    #[must_use]
    pub fn with_threads(mut self, threads: i64) -> Self {
        self.thread_count = usize::try_from(threads.max(1)).unwrap_or(usize::MAX);
        self
    }

    /// Transposition table size in megabytes, at least one.
    #[must_use]
    pub fn with_hash_mb(mut self, mb: i64) -> Self {
        self.hash_size_mb = usize::try_from(mb.max(1)).unwrap_or(usize::MAX);
        self
    }

    /// Let the engine think on the opponent's time.
    #[must_use]
    pub fn with_ponder(mut self, ponder: bool) -> Self {
        self.ponder = ponder;
        self
    }

    /// Use Chess960 castling notation.
    #[must_use]
    pub fn with_chess960(mut self, chess960: bool) -> Self {
        self.chess960 = chess960;
        self
    }

    /// Ask the engine to honour `UCI_Elo` by also sending `UCI_LimitStrength`.
    #[must_use]
    pub fn with_limit_strength(mut self, limit: bool) -> Self {
        self.limit_strength = limit;
        self
    }

    /// Depth sent with each `go depth`.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Value sent as `UCI_Elo`.
    #[must_use]
    pub fn elo_rating(&self) -> u32 {
        self.elo_rating
    }

    /// Value sent as `Threads`.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Value sent as `Hash`.
    #[must_use]
    pub fn hash_size_mb(&self) -> usize {
        self.hash_size_mb
    }

    /// Value sent as `Ponder`.
    #[must_use]
    pub fn ponder(&self) -> bool {
        self.ponder
    }

    /// Value sent as `UCI_Chess960`.
    #[must_use]
    pub fn chess960(&self) -> bool {
        self.chess960
    }

    /// Whether `UCI_LimitStrength` is sent.
    #[must_use]
    pub fn limit_strength(&self) -> bool {
        self.limit_strength
    }

    /// Update one setting by name, the way an engine handles `setoption`.
    ///
    /// Names are matched case-insensitively. Numeric values are clamped.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        let normalized = name.trim().to_ascii_lowercase();
        let invalid = || ConfigError::InvalidValue {
            name: name.trim().to_string(),
            value: value.trim().to_string(),
        };
        let int = || value.trim().parse::<i64>().map_err(|_| invalid());
        let flag = || match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" => Ok(true),
            "false" | "0" | "off" => Ok(false),
            _ => Err(invalid()),
        };

        *self = match normalized.as_str() {
            "depth" => self.with_depth(int()?),
            "elo" | "uci_elo" => self.with_elo_rating(int()?),
            "threads" => self.with_threads(int()?),
            "hash" => self.with_hash_mb(int()?),
            "ponder" => self.with_ponder(flag()?),
            "chess960" | "uci_chess960" => self.with_chess960(flag()?),
            "limitstrength" | "uci_limitstrength" => self.with_limit_strength(flag()?),
            _ => {
                return Err(ConfigError::UnknownOption {
                    name: name.trim().to_string(),
                })
            }
        };
        Ok(())
    }

    /// Commands that push this configuration to the engine.
    ///
    /// `UCI_Elo` is always sent; the other options only when they differ
    /// from the engine defaults. Depth is not an engine option and travels
    /// with each `go`.
    #[must_use]
    pub fn setoption_commands(&self) -> Vec<UciCommand> {
        let mut commands = Vec::new();
        if self.thread_count != ENGINE_DEFAULT_THREADS {
            commands.push(UciCommand::set_option("Threads", self.thread_count));
        }
        if self.hash_size_mb != ENGINE_DEFAULT_HASH_MB {
            commands.push(UciCommand::set_option("Hash", self.hash_size_mb));
        }
        if self.ponder {
            commands.push(UciCommand::set_option("Ponder", true));
        }
        if self.chess960 {
            commands.push(UciCommand::set_option("UCI_Chess960", true));
        }
        if self.limit_strength {
            commands.push(UciCommand::set_option("UCI_LimitStrength", true));
        }
        commands.push(UciCommand::set_option("UCI_Elo", self.elo_rating));
        commands
    }
}

fn clamp_to(value: i64, min: u32, max: u32) -> u32 {
    // Both bounds fit in u32, so the clamped value does too.
    value.clamp(i64::from(min), i64::from(max)) as u32
}

/// Split a `name=value` assignment as given on the command line.
pub fn parse_assignment(text: &str) -> Result<(String, String), ConfigError> {
    match text.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(ConfigError::MalformedAssignment {
            found: text.to_string(),
        }),
    }
}

/// Default sleep between reader polls when no output is available
pub const DEFAULT_IDLE_POLL: Duration = Duration::from_millis(10);
/// Default bound on waiting for the reader thread at shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);
/// Default TCP connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How a session reaches its engine and paces its background reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Engine executable or TCP endpoint
    pub target: TransportTarget,
    /// Reader pause when no output is available; also the socket read timeout
    pub idle_poll: Duration,
    /// Upper bound on joining the reader thread at shutdown
    pub shutdown_timeout: Duration,
    /// Upper bound on each TCP connect attempt
    pub connect_timeout: Duration,
}

impl SessionOptions {
    /// Default timing for `target`.
    #[must_use]
    pub fn new(target: TransportTarget) -> Self {
        SessionOptions {
            target,
            idle_poll: DEFAULT_IDLE_POLL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set [`SessionOptions::idle_poll`].
    #[must_use]
    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    /// Set [`SessionOptions::shutdown_timeout`].
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set [`SessionOptions::connect_timeout`].
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
