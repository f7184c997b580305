//! Wire messages exchanged between two peers.
//!
//! Every message is one JSON object on its own line, tagged with a `kind`
//! field, for example `{"kind":"move","row":7,"col":7}`. The tag removes any
//! guessing about which shape a payload has; anything that does not decode into
//! a known kind is rejected outright.

use crate::error::NetError;
use crate::games::gomoku::GomokuMove;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireMessage {
    /// A stone placed by the sender.
    Move { row: usize, col: usize },
    /// The sender asks to take back the most recent move.
    UndoRequest,
    UndoAccept,
    UndoReject,
    /// The finished game is replaced by a fresh one.
    NewGame,
    /// The sender is leaving the session.
    Leave,
}

impl WireMessage {
    pub fn from_move(mv: GomokuMove) -> Self {
        WireMessage::Move {
            row: mv.row(),
            col: mv.col(),
        }
    }
}

/// Encodes one message as a newline-terminated JSON line.
pub fn encode(msg: &WireMessage) -> Result<Vec<u8>, NetError> {
    let mut line = serde_json::to_vec(msg).map_err(NetError::Encode)?;
    line.push(b'\n');
    Ok(line)
}

/// Decodes one line (with or without its trailing newline).
pub fn decode(line: &[u8]) -> Result<WireMessage, NetError> {
    let trimmed = line.trim_ascii_end();
    serde_json::from_slice(trimmed).map_err(|source| NetError::Decode {
        payload: String::from_utf8_lossy(trimmed).into_owned(),
        source,
    })
}
