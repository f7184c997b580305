//! External move-selection oracle used at Hard difficulty.
//!
//! The oracle is an opaque child process. It receives the whole board on stdin
//! as `{"board":[...]}` (225 cells, row-major, 0 empty, 1 black, 2 white) and
//! answers with a single `{"row":r,"col":c}` on stdout.

use crate::error::OracleError;
use crate::games::gomoku::{Board, GomokuMove, Stone, BOARD_SIZE};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};
use tracing::debug;

/// Anything that can pick a move for a board without running the search.
pub trait MoveOracle: Send {
    fn select_move(&self, board: &Board) -> Result<GomokuMove, OracleError>;
}

#[derive(Serialize)]
struct OracleRequest {
    board: Vec<u8>,
}

#[derive(Deserialize)]
struct OracleResponse {
    row: i64,
    col: i64,
}

/// Runs a program once per move and speaks the JSON protocol over its pipes.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
}

impl CommandOracle {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        CommandOracle {
            program: program.into(),
            args,
        }
    }

    /// Builds an oracle from a full command line (program first).
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

impl MoveOracle for CommandOracle {
    fn select_move(&self, board: &Board) -> Result<GomokuMove, OracleError> {
        let payload = serde_json::to_vec(&OracleRequest {
            board: board.to_flat(),
        })?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| OracleError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // An oracle that exits without reading its input is judged by its
            // exit status and output below, not by the broken pipe.
            if let Err(e) = stdin.write_all(&payload) {
                if e.kind() != ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(OracleError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let response: OracleResponse = serde_json::from_slice(&output.stdout)?;
        debug!(row = response.row, col = response.col, "oracle answered");
        validate(board, response.row, response.col)
    }
}

fn validate(board: &Board, row: i64, col: i64) -> Result<GomokuMove, OracleError> {
    let illegal = OracleError::IllegalMove { row, col };
    let size = BOARD_SIZE as i64;
    if !(0..size).contains(&row) || !(0..size).contains(&col) {
        return Err(illegal);
    }
    let mv = GomokuMove(row as u8, col as u8);
    if board.get(mv) != Stone::Empty {
        return Err(illegal);
    }
    Ok(mv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::gomoku::Player;

    #[test]
    fn test_validate_rejects_bad_answers() {
        let mut board = Board::new();
        board.place(GomokuMove(7, 7), Player::Black).unwrap();
        assert!(matches!(validate(&board, -1, -1), Err(OracleError::IllegalMove { .. })));
        assert!(matches!(validate(&board, 15, 0), Err(OracleError::IllegalMove { .. })));
        assert!(matches!(validate(&board, 7, 7), Err(OracleError::IllegalMove { .. })));
        assert_eq!(validate(&board, 7, 8).unwrap(), GomokuMove(7, 8));
    }

    #[test]
    fn test_from_command_needs_a_program() {
        assert!(CommandOracle::from_command(&[]).is_none());
        let oracle = CommandOracle::from_command(&["python".to_string(), "oracle.py".to_string()]).unwrap();
        assert_eq!(oracle.program, "python");
        assert_eq!(oracle.args, vec!["oracle.py".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_oracle_round_trip() {
        let oracle = CommandOracle::new(
            "sh",
            vec!["-c".to_string(), "cat > /dev/null; echo '{\"row\":3,\"col\":4}'".to_string()],
        );
        assert_eq!(oracle.select_move(&Board::new()).unwrap(), GomokuMove(3, 4));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_oracle_failures() {
        let failing = CommandOracle::new("sh", vec!["-c".to_string(), "exit 3".to_string()]);
        assert!(matches!(failing.select_move(&Board::new()), Err(OracleError::Exit { .. })));

        let garbage = CommandOracle::new("sh", vec!["-c".to_string(), "echo not-json".to_string()]);
        assert!(matches!(garbage.select_move(&Board::new()), Err(OracleError::Parse(_))));

        let missing = CommandOracle::new("/definitely/not/a/program", Vec::new());
        assert!(matches!(missing.select_move(&Board::new()), Err(OracleError::Spawn { .. })));
    }
}
