//! Difficulty policy: maps a named level to a thinking budget or to the oracle.
//!
//! Easy and Medium run the same search and differ only in how long it may run.
//! Hard skips the search and asks an external [`MoveOracle`]; when that fails
//! (or none is configured) a random legal move keeps the turn from stalling.

use crate::config::EngineConfig;
use crate::error::OracleError;
use crate::games::gomoku::{Board, GomokuMove, GomokuState, Player};
use crate::oracle::{CommandOracle, MoveOracle};
use crate::{SearchLimits, SearchStatistics, MCTS};
use rand::Rng;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum DifficultyLevel {
    Easy,
    Medium,
    Hard,
}

/// What the engine does for a given difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovePolicy {
    Search(Duration),
    Oracle,
}

impl DifficultyLevel {
    pub fn policy(self, config: &EngineConfig) -> MovePolicy {
        match self {
            DifficultyLevel::Easy => MovePolicy::Search(config.easy_time),
            DifficultyLevel::Medium => MovePolicy::Search(config.medium_time),
            DifficultyLevel::Hard => MovePolicy::Oracle,
        }
    }
}

/// The computer opponent: search engine plus optional oracle.
pub struct Engine {
    mcts: MCTS,
    config: EngineConfig,
    oracle: Option<Box<dyn MoveOracle>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let oracle = config
            .oracle_command
            .as_deref()
            .and_then(CommandOracle::from_command)
            .map(|o| Box::new(o) as Box<dyn MoveOracle>);
        Self::with_oracle(config, oracle)
    }

    pub fn with_oracle(config: EngineConfig, oracle: Option<Box<dyn MoveOracle>>) -> Self {
        let mcts = match config.seed {
            Some(seed) => MCTS::with_seed(config.exploration_parameter, seed),
            None => MCTS::new(config.exploration_parameter),
        };
        Engine { mcts, config, oracle }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Picks a move for `side` on `board`.
    ///
    /// Returns `None` only when the game on `board` is already decided.
    pub fn best_move(&mut self, board: &Board, side: Player, difficulty: DifficultyLevel) -> Option<GomokuMove> {
        self.best_move_with_stop(board, side, difficulty, None).0
    }

    /// Like [`Engine::best_move`], with a stop flag that cuts the search short
    /// and the statistics of the search (default statistics for the oracle).
    pub fn best_move_with_stop(
        &mut self,
        board: &Board,
        side: Player,
        difficulty: DifficultyLevel,
        stop: Option<Arc<AtomicBool>>,
    ) -> (Option<GomokuMove>, SearchStatistics) {
        if board.is_over() {
            return (None, SearchStatistics::default());
        }

        match difficulty.policy(&self.config) {
            MovePolicy::Search(budget) => {
                let state = GomokuState::from_board(*board, side);
                self.mcts.search_with_stop(&state, &SearchLimits::time(budget), stop)
            }
            MovePolicy::Oracle => {
                let mv = match self.ask_oracle(board) {
                    Ok(mv) => {
                        debug!(%mv, "oracle move");
                        Some(mv)
                    }
                    Err(e) => {
                        warn!(error = %e, "oracle unavailable, playing a random move");
                        random_legal_move(board, &mut rand::rng())
                    }
                };
                (mv, SearchStatistics::default())
            }
        }
    }

    fn ask_oracle(&self, board: &Board) -> Result<GomokuMove, OracleError> {
        self.oracle
            .as_ref()
            .ok_or(OracleError::NotConfigured)?
            .select_move(board)
    }
}

/// Uniformly random empty cell, or `None` on a full board.
pub fn random_legal_move<R: Rng + ?Sized>(board: &Board, rng: &mut R) -> Option<GomokuMove> {
    let moves = board.legal_moves();
    if moves.is_empty() {
        None
    } else {
        Some(moves[rng.random_range(0..moves.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::gomoku::Stone;

    struct FixedOracle(Result<GomokuMove, ()>);

    impl MoveOracle for FixedOracle {
        fn select_move(&self, _board: &Board) -> Result<GomokuMove, OracleError> {
            self.0.map_err(|_| OracleError::Exit {
                status: "exit status: 1".to_string(),
                stderr: String::new(),
            })
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            easy_time: Duration::from_millis(50),
            medium_time: Duration::from_millis(100),
            seed: Some(9),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_policy_mapping() {
        let config = EngineConfig::default();
        assert_eq!(DifficultyLevel::Easy.policy(&config), MovePolicy::Search(Duration::from_secs(1)));
        assert_eq!(DifficultyLevel::Medium.policy(&config), MovePolicy::Search(Duration::from_secs(3)));
        assert_eq!(DifficultyLevel::Hard.policy(&config), MovePolicy::Oracle);
    }

    #[test]
    fn test_search_levels_return_legal_moves() {
        let mut engine = Engine::new(fast_config());
        let mut board = Board::new();
        board.place(GomokuMove(7, 7), Player::Black).unwrap();
        for level in [DifficultyLevel::Easy, DifficultyLevel::Medium] {
            let mv = engine.best_move(&board, Player::White, level).unwrap();
            assert_eq!(board.get(mv), Stone::Empty);
        }
    }

    #[test]
    fn test_hard_uses_oracle() {
        let oracle = Box::new(FixedOracle(Ok(GomokuMove(2, 3))));
        let mut engine = Engine::with_oracle(fast_config(), Some(oracle));
        assert_eq!(
            engine.best_move(&Board::new(), Player::Black, DifficultyLevel::Hard),
            Some(GomokuMove(2, 3))
        );
    }

    #[test]
    fn test_hard_falls_back_to_random_move() {
        let oracle = Box::new(FixedOracle(Err(())));
        let mut engine = Engine::with_oracle(fast_config(), Some(oracle));
        let mut board = Board::new();
        board.place(GomokuMove(0, 0), Player::Black).unwrap();
        let mv = engine.best_move(&board, Player::White, DifficultyLevel::Hard).unwrap();
        assert_eq!(board.get(mv), Stone::Empty);

        let mut unconfigured = Engine::with_oracle(fast_config(), None);
        assert!(unconfigured.best_move(&board, Player::White, DifficultyLevel::Hard).is_some());
    }

    #[test]
    fn test_missing_oracle_reported_as_not_configured() {
        let engine = Engine::with_oracle(fast_config(), None);
        assert!(matches!(engine.ask_oracle(&Board::new()), Err(OracleError::NotConfigured)));

        let engine = Engine::with_oracle(fast_config(), Some(Box::new(FixedOracle(Ok(GomokuMove(4, 4))))));
        assert_eq!(engine.ask_oracle(&Board::new()).unwrap(), GomokuMove(4, 4));
    }

    #[test]
    fn test_decided_game_has_no_move() {
        let mut board = Board::new();
        for c in 0..5 {
            board.place(GomokuMove(3, c), Player::White).unwrap();
        }
        let mut engine = Engine::new(fast_config());
        for level in [DifficultyLevel::Easy, DifficultyLevel::Hard] {
            assert_eq!(engine.best_move(&board, Player::Black, level), None);
        }
    }
}
