//! # Game Controller Module - Local Game Session Management
//!
//! The `GameController` is the single source of truth for a game played on
//! this machine, either hot-seat or against the computer. It owns the board,
//! the side to move and the move history; the AI worker only ever sees copies.
//!
//! ## Architecture Overview
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     GameController                       │
//! │   board + turn + history (validated, single writer)      │
//! │                         │                                │
//! │           ┌─────────────┴──────────────┐                 │
//! │           ▼                            ▼                 │
//! │   ┌───────────────┐            ┌──────────────┐          │
//! │   │ AIWorker      │  MoveReady │ Shell        │          │
//! │   │ (board copy)  │ ─────────▶ │ tick()/poll  │          │
//! │   └───────────────┘            └──────────────┘          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Undo
//! Hot-seat undo takes back one move. Against the computer it takes back the
//! computer's reply and the human move before it, so the human is to move
//! again; while the computer is still thinking only the human move is taken
//! back and the search is cancelled.

use crate::ai_worker::{AIResponse, AIWorker};
use crate::config::EngineConfig;
use crate::difficulty::DifficultyLevel;
use crate::error::PlaceError;
use crate::games::gomoku::{Board, GomokuMove, Outcome, Player};
use crate::SearchStatistics;
use std::fmt;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// The side the computer plays.
pub const AI_PLAYER: Player = Player::White;

/// Who is playing on this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    HumanVsHuman,
    HumanVsAi(DifficultyLevel),
}

/// Result of attempting to apply a move
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveResult {
    /// Move was successfully applied
    Success {
        move_made: GomokuMove,
        player: Player,
        outcome: Outcome,
    },
    /// Move was rejected; nothing changed
    Invalid { reason: MoveValidationError },
}

/// Why a move was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveValidationError {
    /// Off the board, on a stone, or after the game ended
    Illegal(PlaceError),
    /// The computer is to move
    NotYourTurn,
    /// A computer move is being computed
    AiThinking,
}

impl fmt::Display for MoveValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveValidationError::Illegal(e) => write!(f, "{}", e),
            MoveValidationError::NotYourTurn => write!(f, "It is not your turn"),
            MoveValidationError::AiThinking => write!(f, "The computer is thinking"),
        }
    }
}

/// A single entry in the move history
#[derive(Debug, Clone)]
pub struct MoveHistoryEntry {
    /// When the move was made
    pub timestamp: SystemTime,
    pub player: Player,
    pub move_made: GomokuMove,
    /// Move number (1-indexed)
    pub move_number: usize,
}

impl MoveHistoryEntry {
    pub fn new(player: Player, move_made: GomokuMove, move_number: usize) -> Self {
        Self {
            timestamp: SystemTime::now(),
            player,
            move_made,
            move_number,
        }
    }
}

/// A search that has been requested and not yet applied.
#[derive(Debug, Clone, Copy)]
struct PendingSearch {
    request_id: u64,
}

pub struct GameController {
    mode: PlayMode,
    board: Board,
    turn: Player,
    move_history: Vec<MoveHistoryEntry>,
    ai_worker: Option<AIWorker>,
    pending: Option<PendingSearch>,
    last_stats: Option<SearchStatistics>,
}

impl GameController {
    pub fn new(mode: PlayMode, config: EngineConfig) -> Self {
        let ai_worker = match mode {
            PlayMode::HumanVsAi(_) => Some(AIWorker::new(config)),
            PlayMode::HumanVsHuman => None,
        };
        Self::with_worker(mode, ai_worker)
    }

    /// Uses a prepared worker (for example one with a custom oracle).
    pub fn with_worker(mode: PlayMode, ai_worker: Option<AIWorker>) -> Self {
        Self {
            mode,
            board: Board::new(),
            turn: Player::Black,
            move_history: Vec::new(),
            ai_worker,
            pending: None,
            last_stats: None,
        }
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    fn is_ai_turn(&self) -> bool {
        matches!(self.mode, PlayMode::HumanVsAi(_)) && self.turn == AI_PLAYER
    }

    /// Validate a human move without applying it
    pub fn validate_move(&self, mv: GomokuMove) -> Result<(), MoveValidationError> {
        if self.pending.is_some() {
            return Err(MoveValidationError::AiThinking);
        }
        if self.is_ai_turn() {
            return Err(MoveValidationError::NotYourTurn);
        }
        if self.board.is_over() {
            return Err(MoveValidationError::Illegal(PlaceError::GameOver));
        }
        if !mv.in_bounds() {
            return Err(MoveValidationError::Illegal(PlaceError::OutOfBounds {
                row: mv.row(),
                col: mv.col(),
            }));
        }
        if self.board.get(mv).player().is_some() {
            return Err(MoveValidationError::Illegal(PlaceError::CellOccupied {
                row: mv.row(),
                col: mv.col(),
            }));
        }
        Ok(())
    }

    /// Plays a human move. Against the computer the search for the reply starts
    /// on the next [`GameController::tick`].
    pub fn request_move(&mut self, row: usize, col: usize) -> MoveResult {
        let mv = match GomokuMove::new(row, col) {
            Ok(mv) => mv,
            Err(e) => {
                debug!(row, col, "move off the board");
                return MoveResult::Invalid {
                    reason: MoveValidationError::Illegal(e),
                };
            }
        };
        if let Err(reason) = self.validate_move(mv) {
            debug!(%mv, %reason, "move rejected");
            return MoveResult::Invalid { reason };
        }
        self.apply(mv)
    }

    fn apply(&mut self, mv: GomokuMove) -> MoveResult {
        let player = self.turn;
        let outcome = match self.board.place(mv, player) {
            Ok(outcome) => outcome,
            Err(e) => return MoveResult::Invalid { reason: MoveValidationError::Illegal(e) },
        };
        let move_number = self.move_history.len() + 1;
        self.move_history.push(MoveHistoryEntry::new(player, mv, move_number));
        if !outcome.is_over() {
            self.turn = player.opponent();
        } else {
            info!(?outcome, moves = move_number, "game over");
        }
        MoveResult::Success {
            move_made: mv,
            player,
            outcome,
        }
    }

    /// Drives the computer opponent: starts a search when it is to move and
    /// applies the reply once it arrives. Returns the applied move, if any.
    pub fn tick(&mut self) -> Option<MoveResult> {
        let PlayMode::HumanVsAi(difficulty) = self.mode else {
            return None;
        };
        let worker = self.ai_worker.as_mut()?;

        let Some(pending) = self.pending else {
            if self.turn == AI_PLAYER && !self.board.is_over() {
                let request_id = worker.start_search(self.board, AI_PLAYER, difficulty);
                self.pending = Some(PendingSearch { request_id });
                debug!(request_id, ?difficulty, "AI search started");
            }
            return None;
        };

        while let Some(AIResponse::MoveReady { request_id, mv, stats }) = worker.try_recv() {
            if request_id != pending.request_id {
                debug!(request_id, "stale AI reply dropped");
                continue;
            }
            self.pending = None;
            self.last_stats = Some(stats);
            let Some(mv) = mv else {
                warn!("AI had no move to play");
                return None;
            };
            return Some(self.apply(mv));
        }
        None
    }

    /// Whether no computer move is outstanding.
    pub fn is_ai_move_complete(&self) -> bool {
        self.pending.is_none() && !(self.is_ai_turn() && !self.board.is_over())
    }

    /// Takes back moves as described in the module docs. Returns the moves
    /// removed, most recent first.
    pub fn undo(&mut self) -> Vec<GomokuMove> {
        let steps = match self.mode {
            PlayMode::HumanVsHuman => 1,
            PlayMode::HumanVsAi(_) => {
                if self.pending.take().is_some() {
                    if let Some(worker) = self.ai_worker.as_ref() {
                        worker.cancel();
                    }
                }
                match self.move_history.last() {
                    Some(entry) if entry.player == AI_PLAYER => 2,
                    Some(_) => 1,
                    None => 0,
                }
            }
        };

        let mut undone = Vec::new();
        for _ in 0..steps {
            let Some(entry) = self.move_history.pop() else {
                break;
            };
            self.board.remove(entry.move_made);
            self.turn = entry.player;
            undone.push(entry.move_made);
        }
        if !undone.is_empty() {
            info!(moves = ?undone, "undo");
        }
        undone
    }

    /// Starts over, optionally switching mode. A computer search in flight is
    /// cancelled and its reply will be ignored.
    pub fn reset(&mut self, mode: PlayMode, config: EngineConfig) {
        if let Some(worker) = self.ai_worker.as_ref() {
            worker.cancel();
        }
        self.pending = None;
        self.board = Board::new();
        self.turn = Player::Black;
        self.move_history.clear();
        self.last_stats = None;

        let needs_worker = matches!(mode, PlayMode::HumanVsAi(_));
        if needs_worker && self.ai_worker.is_none() {
            self.ai_worker = Some(AIWorker::new(config));
        } else if !needs_worker {
            self.ai_worker = None;
        }
        self.mode = mode;
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn current_player(&self) -> Player {
        self.turn
    }

    pub fn outcome(&self) -> Outcome {
        self.board.outcome()
    }

    pub fn is_game_over(&self) -> bool {
        self.board.is_over()
    }

    pub fn move_history(&self) -> &[MoveHistoryEntry] {
        &self.move_history
    }

    pub fn move_count(&self) -> usize {
        self.move_history.len()
    }

    pub fn last_move(&self) -> Option<&MoveHistoryEntry> {
        self.move_history.last()
    }

    /// Statistics of the most recent computer move.
    pub fn last_search_stats(&self) -> Option<&SearchStatistics> {
        self.last_stats.as_ref()
    }

    /// Move list in a plain text form, one move per line.
    pub fn format_history(&self) -> String {
        if self.move_history.is_empty() {
            return String::from("No moves made yet.");
        }
        let mut output = String::from("=== Gomoku Game History ===\n\n");
        for entry in &self.move_history {
            output.push_str(&format!("{}. {} - {}\n", entry.move_number, entry.player, entry.move_made));
        }
        match self.board.outcome() {
            Outcome::Win(winner) => output.push_str(&format!("\nResult: {} wins!\n", winner)),
            Outcome::Draw => output.push_str("\nResult: Draw\n"),
            Outcome::InProgress => output.push_str(&format!("\n(Game in progress - {} to move)\n", self.turn)),
        }
        output
    }
}
