use std::fmt;

use super::position::Position;

/// A command sent from the session to the engine, one per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciCommand {
    /// `uci`: switch the engine to UCI mode
    Uci,
    /// `setoption name <name> value <value>`
    SetOption { name: String, value: String },
    /// `ucinewgame`: clear state from a previous game
    UciNewGame,
    /// `isready`: answered with `readyok`
    IsReady,
    /// `position startpos|fen ... [moves ...]`
    Position(Position),
    /// `go depth <n>`
    GoDepth(u32),
    /// `go infinite`: search until `stop`
    GoInfinite,
    /// `stop`: end the current search, which still reports `bestmove`
    Stop,
    /// `quit`: ask the engine to exit
    Quit,
}

impl UciCommand {
    /// Build a `setoption` command from any displayable value.
    pub fn set_option(name: &str, value: impl fmt::Display) -> Self {
        UciCommand::SetOption {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    /// Short name used in logs and error messages.
    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            UciCommand::Uci => "uci",
            UciCommand::SetOption { .. } => "setoption",
            UciCommand::UciNewGame => "ucinewgame",
            UciCommand::IsReady => "isready",
            UciCommand::Position(_) => "position",
            UciCommand::GoDepth(_) | UciCommand::GoInfinite => "go",
            UciCommand::Stop => "stop",
            UciCommand::Quit => "quit",
        }
    }
}

impl fmt::Display for UciCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UciCommand::SetOption { name, value } => {
                write!(f, "setoption name {name} value {value}")
            }
            UciCommand::Position(position) => write!(f, "position {position}"),
            UciCommand::GoDepth(depth) => write!(f, "go depth {depth}"),
            UciCommand::GoInfinite => write!(f, "go infinite"),
            other => f.write_str(other.verb()),
        }
    }
}
