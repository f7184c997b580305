//! # Gomoku LAN
//!
//! Five-in-a-row on a 15x15 board, played hot-seat, against a Monte Carlo Tree
//! Search opponent, or against another instance over the local network.
//!
//! The crate root holds the search engine itself: the [`GameState`] trait the
//! engine is written against and the time-boxed [`MCTS`] searcher. Everything
//! else lives in submodules:
//!
//! - [`games::gomoku`]: board model, win detection, legal moves
//! - [`difficulty`] / [`oracle`]: thinking-time policy and the Hard-level oracle
//! - [`game_controller`] / [`ai_worker`]: local and vs-AI game sessions
//! - [`net`]: room hosting/discovery, framing, and the move/undo protocol
//!
//! ## Search tree layout
//! Nodes live in a flat arena and refer to each other by [`NodeId`]. Parent
//! links are plain indices, so backpropagation walks upwards without any shared
//! ownership. A tree belongs to exactly one `search` call and is dropped when
//! it returns; nothing is reused between turns.

pub mod ai_worker;
pub mod config;
pub mod difficulty;
pub mod error;
pub mod game_controller;
pub mod games;
pub mod net;
pub mod oracle;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Exploration constant for the UCT formula (about sqrt(2)).
pub const DEFAULT_EXPLORATION: f64 = 1.41;

/// The state of the game. Must be cloneable to be used in the MCTS.
pub trait GameState: Clone + Send {
    /// The type of a move in the game.
    type Move: Copy + Eq + std::fmt::Debug + Send;

    /// Returns a vector of all possible moves from the current state.
    /// Must be empty once the game is over.
    fn get_possible_moves(&self) -> Vec<Self::Move>;
    /// Applies a move to the state, modifying it.
    fn make_move(&mut self, mv: &Self::Move);
    /// Returns true if the game is over.
    fn is_terminal(&self) -> bool;
    /// Returns the winner of the game, if any.
    /// Should return `Some(player_id)` if a player has won, `None` for a draw or if the game is not over.
    fn get_winner(&self) -> Option<i32>;
    /// Returns the player whose turn it is to move.
    fn get_current_player(&self) -> i32;

    /// Plays uniformly random moves, alternating sides, until the game ends and
    /// returns the winner (`None` for a draw). Never modifies `self`.
    fn rollout<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<i32> {
        let mut sim_state = self.clone();
        while !sim_state.is_terminal() {
            let moves = sim_state.get_possible_moves();
            if moves.is_empty() {
                break;
            }
            let mv = moves[rng.random_range(0..moves.len())];
            sim_state.make_move(&mv);
        }
        sim_state.get_winner()
    }
}

/// Index into the node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A node in the Monte Carlo Search Tree.
struct Node<S: GameState> {
    /// Position this node represents.
    state: S,
    /// Move that produced this node; `None` for the root.
    mv: Option<S::Move>,
    /// Player to move at this node.
    player: i32,
    /// Sum of rewards credited to the player who moved into this node.
    wins: f64,
    visits: u32,
    /// Legal moves not yet materialized as children, consumed from the back.
    /// Generated on the first expansion; most nodes are leaves that are only
    /// ever rolled out and never pay for the list.
    untried: Option<Vec<S::Move>>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl<S: GameState> Node<S> {
    fn new(state: S, mv: Option<S::Move>, parent: Option<NodeId>) -> Self {
        Node {
            player: state.get_current_player(),
            state,
            mv,
            wins: 0.0,
            visits: 0,
            untried: None,
            children: Vec::new(),
            parent,
        }
    }

    /// Whether some legal move has no child yet.
    fn has_untried(&self) -> bool {
        match &self.untried {
            Some(moves) => !moves.is_empty(),
            None => !self.state.is_terminal(),
        }
    }

    /// Calculates the UCT score for this node.
    ///
    /// # Arguments
    /// * `parent_visits` - The number of visits to the parent node.
    /// * `exploration_parameter` - A constant to tune the level of exploration.
    fn ucb1(&self, parent_visits: u32, exploration_parameter: f64) -> f64 {
        if self.visits == 0 {
            f64::INFINITY
        } else {
            let visits = self.visits as f64;
            self.wins / visits
                + exploration_parameter * ((parent_visits as f64).ln() / visits).sqrt()
        }
    }

    /// Reward for a finished rollout from the point of view of whoever moved
    /// into this node.
    fn reward(&self, winner: Option<i32>) -> f64 {
        match winner {
            None => 0.5,
            Some(w) if w == self.player => 0.0,
            Some(_) => 1.0,
        }
    }
}

/// Arena-backed search tree, private to one search.
struct SearchTree<S: GameState> {
    nodes: Vec<Node<S>>,
}

impl<S: GameState> SearchTree<S> {
    const ROOT: NodeId = NodeId(0);

    fn new(root_state: S) -> Self {
        SearchTree {
            nodes: vec![Node::new(root_state, None, None)],
        }
    }

    fn node(&self, id: NodeId) -> &Node<S> {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<S> {
        &mut self.nodes[id.index()]
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Child with the highest UCT score; the first one wins ties.
    fn best_uct_child(&self, id: NodeId, exploration_parameter: f64) -> Option<NodeId> {
        let node = self.node(id);
        let mut best: Option<(NodeId, f64)> = None;
        for &child in &node.children {
            let score = self.node(child).ucb1(node.visits, exploration_parameter);
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((child, score));
            }
        }
        best.map(|(child, _)| child)
    }

    /// Selection followed by expansion. Returns the node to simulate from.
    fn select<R: Rng + ?Sized>(&mut self, exploration_parameter: f64, rng: &mut R) -> NodeId {
        let mut current = Self::ROOT;
        while !self.node(current).has_untried() {
            match self.best_uct_child(current, exploration_parameter) {
                Some(child) => current = child,
                None => return current,
            }
        }
        self.expand(current, rng)
    }

    fn expand<R: Rng + ?Sized>(&mut self, id: NodeId, rng: &mut R) -> NodeId {
        let node = self.node_mut(id);
        if node.untried.is_none() {
            let mut moves = node.state.get_possible_moves();
            moves.shuffle(rng);
            node.untried = Some(moves);
        }
        let Some(mv) = node.untried.as_mut().and_then(Vec::pop) else {
            return id;
        };
        let mut state = self.node(id).state.clone();
        state.make_move(&mv);

        let child_id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(state, Some(mv), Some(id)));
        self.node_mut(id).children.push(child_id);
        child_id
    }

    fn backpropagate(&mut self, from: NodeId, winner: Option<i32>) {
        let mut current = Some(from);
        while let Some(id) = current {
            let node = self.node_mut(id);
            let reward = node.reward(winner);
            node.visits += 1;
            node.wins += reward;
            current = node.parent;
        }
    }

    /// Root child with the most visits (robust child); first one wins ties.
    fn robust_child(&self) -> Option<&Node<S>> {
        let mut best: Option<&Node<S>> = None;
        for &child in &self.node(Self::ROOT).children {
            let node = self.node(child);
            if best.map_or(true, |b| node.visits > b.visits) {
                best = Some(node);
            }
        }
        best
    }
}

/// How long a single search may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    /// Wall-clock budget; checked between whole iterations.
    pub time_budget: Duration,
    /// Optional cap on iterations, for reproducible tests and benchmarks.
    pub max_iterations: Option<u64>,
}

impl SearchLimits {
    pub fn time(time_budget: Duration) -> Self {
        SearchLimits {
            time_budget,
            max_iterations: None,
        }
    }

    pub fn iterations(max_iterations: u64) -> Self {
        SearchLimits {
            time_budget: Duration::from_secs(3600),
            max_iterations: Some(max_iterations),
        }
    }
}

/// Summary of one finished search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchStatistics {
    pub iterations: u64,
    pub total_nodes: usize,
    pub root_visits: u32,
    pub elapsed: Duration,
    /// Visits of the chosen child, 0 when the random fallback was used.
    pub best_visits: u32,
    pub best_win_rate: f64,
    pub used_fallback: bool,
}

/// The main MCTS engine.
pub struct MCTS {
    /// The exploration parameter for the UCT formula.
    exploration_parameter: f64,
    rng: Xoshiro256PlusPlus,
}

impl MCTS {
    /// Creates a new MCTS engine seeded from the thread RNG.
    pub fn new(exploration_parameter: f64) -> Self {
        Self::with_seed(exploration_parameter, rand::random())
    }

    /// Creates an engine with a fixed seed, so searches are reproducible when
    /// limited by iterations.
    pub fn with_seed(exploration_parameter: f64, seed: u64) -> Self {
        MCTS {
            exploration_parameter,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }

    pub fn exploration_parameter(&self) -> f64 {
        self.exploration_parameter
    }

    /// Runs a search from `state` and returns the chosen move.
    ///
    /// Returns `None` only when `state` is already terminal.
    pub fn search<S: GameState>(&mut self, state: &S, limits: &SearchLimits) -> (Option<S::Move>, SearchStatistics) {
        self.search_with_stop(state, limits, None)
    }

    /// Like [`MCTS::search`], but also stops early once `stop` is set.
    pub fn search_with_stop<S: GameState>(
        &mut self,
        state: &S,
        limits: &SearchLimits,
        stop: Option<Arc<AtomicBool>>,
    ) -> (Option<S::Move>, SearchStatistics) {
        let start = Instant::now();
        let mut stats = SearchStatistics::default();
        if state.is_terminal() {
            return (None, stats);
        }

        let deadline = start + limits.time_budget;
        let mut tree = SearchTree::new(state.clone());

        loop {
            if Instant::now() >= deadline {
                break;
            }
            if limits.max_iterations.is_some_and(|max| stats.iterations >= max) {
                break;
            }
            if stop.as_ref().is_some_and(|s| s.load(Ordering::Relaxed)) {
                break;
            }

            let leaf = tree.select(self.exploration_parameter, &mut self.rng);
            let winner = tree.node(leaf).state.rollout(&mut self.rng);
            tree.backpropagate(leaf, winner);
            stats.iterations += 1;
        }

        stats.elapsed = start.elapsed();
        stats.total_nodes = tree.len();
        stats.root_visits = tree.node(SearchTree::<S>::ROOT).visits;

        let best = match tree.robust_child() {
            Some(node) => {
                stats.best_visits = node.visits;
                stats.best_win_rate = node.wins / node.visits.max(1) as f64;
                node.mv
            }
            None => {
                stats.used_fallback = true;
                let moves = state.get_possible_moves();
                if moves.is_empty() {
                    None
                } else {
                    Some(moves[self.rng.random_range(0..moves.len())])
                }
            }
        };

        debug!(
            iterations = stats.iterations,
            nodes = stats.total_nodes,
            best_visits = stats.best_visits,
            win_rate = stats.best_win_rate,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            fallback = stats.used_fallback,
            "search finished"
        );
        (best, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::gomoku::{Board, GomokuMove, GomokuState, Player};

    fn state_with(stones: &[(u8, u8, Player)], to_move: Player) -> GomokuState {
        let mut board = Board::new();
        for &(r, c, p) in stones {
            board.place(GomokuMove(r, c), p).unwrap();
        }
        GomokuState::from_board(board, to_move)
    }

    #[test]
    fn test_backpropagation_rewards_the_mover() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let mut tree = SearchTree::new(GomokuState::new());
        let child = tree.expand(SearchTree::<GomokuState>::ROOT, &mut rng);
        assert_eq!(tree.node(child).player, Player::White.id());

        // Black moved into `child`, so a Black win is credited there but not at
        // the root, where Black is the side to move.
        tree.backpropagate(child, Some(Player::Black.id()));
        assert_eq!(tree.node(child).wins, 1.0);
        assert_eq!(tree.node(SearchTree::<GomokuState>::ROOT).wins, 0.0);

        tree.backpropagate(child, Some(Player::White.id()));
        assert_eq!(tree.node(child).wins, 1.0);
        assert_eq!(tree.node(SearchTree::<GomokuState>::ROOT).wins, 1.0);

        tree.backpropagate(child, None);
        assert_eq!(tree.node(child).wins, 1.5);
        assert_eq!(tree.node(child).visits, 3);
        assert_eq!(tree.node(SearchTree::<GomokuState>::ROOT).visits, 3);
    }

    #[test]
    fn test_expansion_uses_each_move_once() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        let state = state_with(&[(7, 7, Player::Black)], Player::White);
        let mut tree = SearchTree::new(state.clone());
        let root = SearchTree::<GomokuState>::ROOT;
        let expected = state.get_possible_moves().len();
        for _ in 0..expected {
            tree.expand(root, &mut rng);
        }
        let mut moves: Vec<_> = tree
            .node(root)
            .children
            .iter()
            .filter_map(|&c| tree.node(c).mv)
            .collect();
        moves.sort_by_key(|m| (m.0, m.1));
        moves.dedup();
        assert_eq!(moves.len(), expected);
        assert!(!tree.node(root).has_untried());
        // Nothing left to expand: the node itself is returned.
        assert_eq!(tree.expand(root, &mut rng), root);
    }

    #[test]
    fn test_move_lists_only_on_expanded_nodes() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let mut tree = SearchTree::new(GomokuState::new());
        let root = SearchTree::<GomokuState>::ROOT;
        assert!(tree.node(root).untried.is_none());
        assert!(tree.node(root).has_untried());

        for _ in 0..2_000 {
            let leaf = tree.select(DEFAULT_EXPLORATION, &mut rng);
            let winner = tree.node(leaf).state.rollout(&mut rng);
            tree.backpropagate(leaf, winner);
        }
        let with_lists = tree.nodes.iter().filter(|n| n.untried.is_some()).count();
        let expanded = tree.nodes.iter().filter(|n| !n.children.is_empty()).count();
        assert_eq!(with_lists, expanded);
        assert!(with_lists * 4 < tree.len(), "{with_lists} of {} nodes hold move lists", tree.len());
    }

    #[test]
    fn test_terminal_node_has_nothing_to_expand() {
        let state = state_with(
            &[
                (0, 0, Player::Black),
                (0, 1, Player::Black),
                (0, 2, Player::Black),
                (0, 3, Player::Black),
                (0, 4, Player::Black),
            ],
            Player::White,
        );
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(8);
        let mut tree = SearchTree::new(state);
        let root = SearchTree::<GomokuState>::ROOT;
        assert!(!tree.node(root).has_untried());
        assert_eq!(tree.select(DEFAULT_EXPLORATION, &mut rng), root);
    }

    #[test]
    fn test_uct_prefers_first_on_ties() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let mut tree = SearchTree::new(GomokuState::new());
        let root = SearchTree::<GomokuState>::ROOT;
        let a = tree.expand(root, &mut rng);
        let b = tree.expand(root, &mut rng);
        tree.backpropagate(a, None);
        tree.backpropagate(b, None);
        assert_eq!(tree.best_uct_child(root, DEFAULT_EXPLORATION), Some(a));
    }

    #[test]
    fn test_terminal_root_has_no_move() {
        let state = state_with(
            &[
                (0, 0, Player::Black),
                (0, 1, Player::Black),
                (0, 2, Player::Black),
                (0, 3, Player::Black),
                (0, 4, Player::Black),
            ],
            Player::White,
        );
        let mut mcts = MCTS::with_seed(DEFAULT_EXPLORATION, 4);
        let (mv, stats) = mcts.search(&state, &SearchLimits::iterations(100));
        assert_eq!(mv, None);
        assert_eq!(stats.iterations, 0);
    }

    #[test]
    fn test_zero_budget_falls_back_to_random_legal_move() {
        let state = state_with(&[(7, 7, Player::Black)], Player::White);
        let mut mcts = MCTS::with_seed(DEFAULT_EXPLORATION, 5);
        let (mv, stats) = mcts.search(&state, &SearchLimits::time(Duration::ZERO));
        assert!(stats.used_fallback);
        let mv = mv.unwrap();
        assert!(state.get_possible_moves().contains(&mv));
    }

    #[test]
    fn test_chosen_move_is_legal() {
        for seed in 0..5 {
            let state = state_with(
                &[(7, 7, Player::Black), (7, 8, Player::White), (8, 8, Player::Black)],
                Player::White,
            );
            let mut mcts = MCTS::with_seed(DEFAULT_EXPLORATION, seed);
            let (mv, stats) = mcts.search(&state, &SearchLimits::iterations(400));
            assert_eq!(stats.iterations, 400);
            assert!(!stats.used_fallback);
            assert!(state.get_possible_moves().contains(&mv.unwrap()));
        }
    }

    #[test]
    fn test_finds_immediate_win() {
        let state = state_with(
            &[
                (7, 3, Player::Black),
                (0, 0, Player::White),
                (7, 4, Player::Black),
                (0, 14, Player::White),
                (7, 5, Player::Black),
                (14, 0, Player::White),
                (7, 6, Player::Black),
                (14, 14, Player::White),
            ],
            Player::Black,
        );
        let winning = [GomokuMove(7, 2), GomokuMove(7, 7)];
        let mut found = 0;
        for seed in 0..5 {
            let mut mcts = MCTS::with_seed(DEFAULT_EXPLORATION, seed);
            let (mv, _) = mcts.search(&state, &SearchLimits::iterations(3_000));
            if winning.contains(&mv.unwrap()) {
                found += 1;
            }
        }
        assert!(found >= 4, "winning move found in only {found} of 5 trials");
    }

    #[test]
    fn test_stop_flag_ends_search() {
        let stop = Arc::new(AtomicBool::new(true));
        let mut mcts = MCTS::with_seed(DEFAULT_EXPLORATION, 6);
        let (mv, stats) = mcts.search_with_stop(&GomokuState::new(), &SearchLimits::time(Duration::from_secs(60)), Some(stop));
        assert_eq!(stats.iterations, 0);
        assert!(mv.is_some());
    }
}
