//! Universal Chess Interface (UCI) wire format, seen from the GUI side.
//!
//! Outbound commands are built with [`UciCommand`]; inbound engine lines are
//! turned into [`ProtocolEvent`]s by [`parse`]. Matching is case-sensitive
//! and substring based, which is what engines actually emit.

pub mod command;
pub mod position;

pub use command::UciCommand;
pub use position::{Position, PositionBase};

/// Evaluations are saturated at this many pawns either way
pub const EVAL_SATURATION_PAWNS: f64 = 10.0;

/// A typed engine output line.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// `readyok`
    EngineReady,
    /// `bestmove <move> [ponder <move>]`
    BestMove { mv: String, ponder: Option<String> },
    /// Score from an `info` line, mapped into `[0, 1]` (0.5 = equal)
    Evaluation { normalized_score: f64 },
    /// Any other line, kept for diagnostics
    RawLine { text: String },
    /// The engine stream failed or closed unexpectedly
    TransportError { message: String },
}

/// Parse one engine output line. Never fails: anything unrecognised or
/// malformed becomes [`ProtocolEvent::RawLine`].
#[must_use]
pub fn parse(line: &str) -> ProtocolEvent {
    if line.contains("readyok") {
        return ProtocolEvent::EngineReady;
    }

    if line.starts_with("bestmove") {
        if let Some(event) = parse_bestmove(line) {
            return event;
        }
    } else if line.starts_with("info") {
        if let Some(pawns) = parse_score(line) {
            return ProtocolEvent::Evaluation {
                normalized_score: normalize_evaluation(pawns),
            };
        }
    }

    ProtocolEvent::RawLine {
        text: line.to_string(),
    }
}

fn parse_bestmove(line: &str) -> Option<ProtocolEvent> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let mv = (*parts.get(1)?).to_string();
    let ponder = parts
        .windows(2)
        .skip(2)
        .find(|pair| pair[0] == "ponder")
        .map(|pair| pair[1].to_string());
    Some(ProtocolEvent::BestMove { mv, ponder })
}

/// Score in pawns from an `info` line, if it carries one.
fn parse_score(line: &str) -> Option<f64> {
    let kind = if line.contains("score cp") {
        "cp"
    } else if line.contains("score mate") {
        "mate"
    } else {
        return None;
    };

    let parts: Vec<&str> = line.split_whitespace().collect();
    let value = parts
        .windows(3)
        .find(|w| w[0] == "score" && w[1] == kind)
        .and_then(|w| w[2].parse::<i32>().ok())?;

    if kind == "cp" {
        Some(f64::from(value) / 100.0)
    } else if value > 0 {
        Some(EVAL_SATURATION_PAWNS)
    } else {
        Some(-EVAL_SATURATION_PAWNS)
    }
}

/// Map an evaluation in pawns onto `[0, 1]`, saturating at ±10 pawns.
#[must_use]
pub fn normalize_evaluation(pawns: f64) -> f64 {
    let clamped = pawns.clamp(-EVAL_SATURATION_PAWNS, EVAL_SATURATION_PAWNS);
    0.5 + clamped / (2.0 * EVAL_SATURATION_PAWNS)
}
