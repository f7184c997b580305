//! Error types for the board model, the network layer and the move oracle.
//!
//! Input rejection on the interactive paths is silent (a rejected click simply
//! does nothing), so these types mostly surface at the library seams: board
//! placement, socket setup, framing, and the external oracle process.

use std::net::SocketAddr;
use thiserror::Error;

/// Reasons a stone cannot be placed on the board.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceError {
    #[error("position ({row}, {col}) is outside the board")]
    OutOfBounds { row: usize, col: usize },

    #[error("position ({row}, {col}) is already occupied")]
    CellOccupied { row: usize, col: usize },

    #[error("game already over")]
    GameOver,
}

/// Transport and framing failures.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("failed to bind {what}: {source}")]
    Bind {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("network I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode message {payload:?}: {source}")]
    Decode {
        payload: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid room advertisement {0:?}")]
    InvalidAdvert(String),

    #[error("peer disconnected")]
    Disconnected,
}

/// Failures of the external move-selection process used at Hard difficulty.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("no oracle command configured")]
    NotConfigured,

    #[error("failed to start oracle {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("oracle I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("oracle exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("unparsable oracle output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("oracle proposed illegal move ({row}, {col})")]
    IllegalMove { row: i64, col: i64 },
}
