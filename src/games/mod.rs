//! # Game Implementations Module
//!
//! Game rules the search engine and the sessions operate on. Each game
//! implements the `GameState` trait so the Monte Carlo Tree Search can drive it.
//!
//! ## Supported Games
//! - **Gomoku (Five in a Row)**: 15x15 board, five or more in a row wins, a full
//!   board without a five is a draw

pub mod gomoku;
