//! Positions as the engine is told about them.
//!
//! Legality is not checked here; moves are passed through in coordinate
//! notation exactly as the caller supplies them.

use std::fmt;

/// Where the move list starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionBase {
    /// The standard initial position
    StartPos,
    /// A position given in Forsyth-Edwards Notation
    Fen(String),
}

/// A base position plus the moves played from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    base: PositionBase,
    moves: Vec<String>,
}

impl Default for Position {
    fn default() -> Self {
        Self::startpos()
    }
}

impl Position {
    /// The standard initial position with no moves.
    #[must_use]
    pub fn startpos() -> Self {
        Position {
            base: PositionBase::StartPos,
            moves: Vec::new(),
        }
    }

    /// A FEN position with no moves. Surrounding whitespace is trimmed.
    pub fn fen(fen: impl Into<String>) -> Self {
        Position {
            base: PositionBase::Fen(fen.into().trim().to_string()),
            moves: Vec::new(),
        }
    }

    /// Append moves in coordinate notation, e.g. `e2e4` or `e7e8q`.
    #[must_use]
    pub fn with_moves<I, S>(mut self, moves: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.moves.extend(moves.into_iter().map(Into::into));
        self
    }

    /// Append one move.
    pub fn push_move(&mut self, mv: impl Into<String>) {
        self.moves.push(mv.into());
    }

    /// The position the moves start from.
    #[must_use]
    pub fn base(&self) -> &PositionBase {
        &self.base
    }

    /// Moves played from the base, oldest first.
    #[must_use]
    pub fn moves(&self) -> &[String] {
        &self.moves
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.base {
            PositionBase::StartPos => f.write_str("startpos")?,
            PositionBase::Fen(fen) => write!(f, "fen {fen}")?,
        }
        if !self.moves.is_empty() {
            write!(f, " moves {}", self.moves.join(" "))?;
        }
        Ok(())
    }
}
