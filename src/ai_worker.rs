//! # AI Worker
//!
//! Runs the [`Engine`] on its own thread so the game loop never blocks while
//! the computer is thinking. Requests and replies travel over `mpsc` channels.
//!
//! Every search carries a request id. When the position changes under a
//! running search (an undo, a new game) the caller cancels it and simply
//! ignores any reply whose id is not the one it is waiting for, so a stale
//! move can never land on the board.

use crate::config::EngineConfig;
use crate::difficulty::{DifficultyLevel, Engine};
use crate::games::gomoku::{Board, GomokuMove, Player};
use crate::SearchStatistics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Messages sent to the worker thread.
#[derive(Debug)]
pub enum AIRequest {
    Search {
        request_id: u64,
        board: Board,
        side: Player,
        difficulty: DifficultyLevel,
        cancel: Arc<AtomicBool>,
    },
    Stop,
}

/// Messages received from the worker thread.
#[derive(Debug)]
pub enum AIResponse {
    /// `mv` is `None` only if the position was already decided.
    MoveReady {
        request_id: u64,
        mv: Option<GomokuMove>,
        stats: SearchStatistics,
    },
}

pub struct AIWorker {
    handle: Option<JoinHandle<()>>,
    tx_req: Sender<AIRequest>,
    rx_resp: Receiver<AIResponse>,
    /// Cancel flag of the search most recently started.
    current: Arc<AtomicBool>,
    next_id: u64,
}

impl AIWorker {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_engine(Engine::new(config))
    }

    /// Runs a prepared engine (for example one with a custom oracle).
    pub fn with_engine(mut engine: Engine) -> Self {
        let (tx_req, rx_req) = mpsc::channel();
        let (tx_resp, rx_resp) = mpsc::channel();

        let handle = thread::spawn(move || {
            for request in rx_req {
                match request {
                    AIRequest::Search {
                        request_id,
                        board,
                        side,
                        difficulty,
                        cancel,
                    } => {
                        if cancel.load(Ordering::Relaxed) {
                            continue;
                        }
                        let (mv, stats) = engine.best_move_with_stop(&board, side, difficulty, Some(cancel.clone()));
                        if cancel.load(Ordering::Relaxed) {
                            debug!(request_id, "search cancelled, reply dropped");
                            continue;
                        }
                        // Receiver gone means the game is shutting down.
                        tx_resp.send(AIResponse::MoveReady { request_id, mv, stats }).ok();
                    }
                    AIRequest::Stop => break,
                }
            }
        });

        Self {
            handle: Some(handle),
            tx_req,
            rx_resp,
            current: Arc::new(AtomicBool::new(false)),
            next_id: 0,
        }
    }

    /// Starts thinking about `board` for `side`, cancelling any earlier search.
    /// Returns the id the reply will carry.
    pub fn start_search(&mut self, board: Board, side: Player, difficulty: DifficultyLevel) -> u64 {
        self.cancel();
        self.next_id += 1;
        self.current = Arc::new(AtomicBool::new(false));
        let request_id = self.next_id;
        self.tx_req
            .send(AIRequest::Search {
                request_id,
                board,
                side,
                difficulty,
                cancel: self.current.clone(),
            })
            .ok();
        request_id
    }

    pub fn try_recv(&self) -> Option<AIResponse> {
        self.rx_resp.try_recv().ok()
    }

    /// Interrupts the running search, if any. The worker stays available.
    pub fn cancel(&self) {
        self.current.store(true, Ordering::Relaxed);
    }

    /// Explicitly stop the AI worker
    pub fn stop(&self) {
        self.cancel();
        self.tx_req.send(AIRequest::Stop).ok();
    }
}

impl Drop for AIWorker {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
