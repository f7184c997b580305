use crate::error::PlaceError;
use crate::GameState;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;
use std::str::FromStr;

/// Side length of the board.
pub const BOARD_SIZE: usize = 15;
/// Stones in a row needed to win.
pub const LINE_SIZE: usize = 5;

/// Axis directions scanned by the win check: horizontal, vertical, both diagonals.
const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// One of the two sides. Black (player A) always moves first.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Player {
    Black,
    White,
}

impl Player {
    pub fn opponent(self) -> Self {
        match self {
            Player::Black => Player::White,
            Player::White => Player::Black,
        }
    }

    pub fn stone(self) -> Stone {
        match self {
            Player::Black => Stone::Black,
            Player::White => Stone::White,
        }
    }

    /// Player id used by the search engine (1 for Black, -1 for White).
    pub fn id(self) -> i32 {
        match self {
            Player::Black => 1,
            Player::White => -1,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(Player::Black),
            -1 => Some(Player::White),
            _ => None,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Player::Black => write!(f, "Black"),
            Player::White => write!(f, "White"),
        }
    }
}

/// Contents of a single cell.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[repr(u8)]
pub enum Stone {
    #[default]
    Empty = 0,
    Black = 1,
    White = 2,
}

impl Stone {
    pub fn player(self) -> Option<Player> {
        match self {
            Stone::Empty => None,
            Stone::Black => Some(Player::Black),
            Stone::White => Some(Player::White),
        }
    }
}

/// A cell as (row, col). Stored as bytes so the search tree's untried-move
/// lists stay small.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GomokuMove(pub u8, pub u8);

impl GomokuMove {
    /// Builds a move from wide coordinates, rejecting anything off the board.
    pub fn new(row: usize, col: usize) -> Result<Self, PlaceError> {
        if row < BOARD_SIZE && col < BOARD_SIZE {
            Ok(GomokuMove(row as u8, col as u8))
        } else {
            Err(PlaceError::OutOfBounds { row, col })
        }
    }

    pub fn row(&self) -> usize {
        self.0 as usize
    }

    pub fn col(&self) -> usize {
        self.1 as usize
    }

    pub fn in_bounds(&self) -> bool {
        self.row() < BOARD_SIZE && self.col() < BOARD_SIZE
    }
}

impl fmt::Display for GomokuMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.0, self.1)
    }
}

impl FromStr for GomokuMove {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(|s| s.trim()).collect();
        if parts.len() != 2 {
            return Err("Expected format: r,c".to_string());
        }
        let r = parts[0].parse::<u8>().map_err(|e| e.to_string())?;
        let c = parts[1].parse::<u8>().map_err(|e| e.to_string())?;
        Ok(GomokuMove(r, c))
    }
}

/// Result of the game so far.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Outcome {
    InProgress,
    Win(Player),
    Draw,
}

impl Outcome {
    pub fn is_over(&self) -> bool {
        !matches!(self, Outcome::InProgress)
    }
}

/// The 15x15 grid. Copied by value whenever a hypothetical continuation is needed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Board {
    cells: [[Stone; BOARD_SIZE]; BOARD_SIZE],
    stones: usize,
    outcome: Outcome,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    pub fn new() -> Self {
        Board {
            cells: [[Stone::Empty; BOARD_SIZE]; BOARD_SIZE],
            stones: 0,
            outcome: Outcome::InProgress,
        }
    }

    pub fn get(&self, mv: GomokuMove) -> Stone {
        if mv.in_bounds() {
            self.cells[mv.row()][mv.col()]
        } else {
            Stone::Empty
        }
    }

    pub fn stones_placed(&self) -> usize {
        self.stones
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn is_over(&self) -> bool {
        self.outcome.is_over()
    }

    pub fn is_full(&self) -> bool {
        self.stones == BOARD_SIZE * BOARD_SIZE
    }

    /// Places `player`'s stone and updates the outcome.
    ///
    /// Only the placed cell is checked for a win, since a five can only be
    /// completed by the most recent stone.
    pub fn place(&mut self, mv: GomokuMove, player: Player) -> Result<Outcome, PlaceError> {
        if !mv.in_bounds() {
            return Err(PlaceError::OutOfBounds { row: mv.row(), col: mv.col() });
        }
        if self.outcome.is_over() {
            return Err(PlaceError::GameOver);
        }
        if self.cells[mv.row()][mv.col()] != Stone::Empty {
            return Err(PlaceError::CellOccupied { row: mv.row(), col: mv.col() });
        }

        self.cells[mv.row()][mv.col()] = player.stone();
        self.stones += 1;

        self.outcome = if self.is_win(mv) {
            Outcome::Win(player)
        } else if self.is_full() {
            Outcome::Draw
        } else {
            Outcome::InProgress
        };
        Ok(self.outcome)
    }

    /// Clears a cell for undo. Any finished game is reopened because the win or
    /// draw could only have been produced by the most recent stone.
    pub fn remove(&mut self, mv: GomokuMove) -> Option<Player> {
        let player = self.get(mv).player()?;
        self.cells[mv.row()][mv.col()] = Stone::Empty;
        self.stones -= 1;
        self.outcome = Outcome::InProgress;
        Some(player)
    }

    /// Whether the stone at `last_move` is part of five or more in a row.
    pub fn is_win(&self, last_move: GomokuMove) -> bool {
        let stone = self.get(last_move);
        if stone == Stone::Empty {
            return false;
        }

        DIRECTIONS.iter().any(|&(dr, dc)| {
            let count = 1
                + self.run_length(last_move, dr, dc, stone)
                + self.run_length(last_move, -dr, -dc, stone);
            count >= LINE_SIZE
        })
    }

    /// Contiguous `stone`s starting next to `from` and walking along (dr, dc).
    fn run_length(&self, from: GomokuMove, dr: isize, dc: isize, stone: Stone) -> usize {
        let mut count = 0;
        let (mut r, mut c) = (from.0 as isize, from.1 as isize);
        loop {
            r += dr;
            c += dc;
            if r < 0 || c < 0 || r >= BOARD_SIZE as isize || c >= BOARD_SIZE as isize {
                break;
            }
            if self.cells[r as usize][c as usize] != stone {
                break;
            }
            count += 1;
        }
        count
    }

    /// Every empty cell, in row-major order.
    pub fn legal_moves(&self) -> Vec<GomokuMove> {
        (0..BOARD_SIZE)
            .flat_map(|r| (0..BOARD_SIZE).map(move |c| (r, c)))
            .filter(|&(r, c)| self.cells[r][c] == Stone::Empty)
            .map(|(r, c)| GomokuMove(r as u8, c as u8))
            .collect()
    }

    /// Row-major 0/1/2 encoding of the cells.
    pub fn to_flat(&self) -> Vec<u8> {
        self.cells
            .iter()
            .flat_map(|row| row.iter().map(|&s| s as u8))
            .collect()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.cells {
            let line: String = row
                .iter()
                .map(|s| match s {
                    Stone::Empty => '.',
                    Stone::Black => 'X',
                    Stone::White => 'O',
                })
                .collect();
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// A board together with the side to move; the unit the search engine works on.
#[derive(Debug, Clone)]
pub struct GomokuState {
    pub board: Board,
    pub current_player: Player,
}

impl Default for GomokuState {
    fn default() -> Self {
        Self::new()
    }
}

impl GomokuState {
    pub fn new() -> Self {
        GomokuState {
            board: Board::new(),
            current_player: Player::Black,
        }
    }

    pub fn from_board(board: Board, current_player: Player) -> Self {
        GomokuState {
            board,
            current_player,
        }
    }
}

impl GameState for GomokuState {
    type Move = GomokuMove;

    fn get_possible_moves(&self) -> Vec<Self::Move> {
        if self.board.is_over() {
            Vec::new()
        } else {
            self.board.legal_moves()
        }
    }

    fn make_move(&mut self, mv: &Self::Move) {
        if self.board.place(*mv, self.current_player).is_ok() {
            self.current_player = self.current_player.opponent();
        }
    }

    fn is_terminal(&self) -> bool {
        self.board.is_over()
    }

    fn get_winner(&self) -> Option<i32> {
        match self.board.outcome() {
            Outcome::Win(p) => Some(p.id()),
            _ => None,
        }
    }

    fn get_current_player(&self) -> i32 {
        self.current_player.id()
    }

    /// Shuffling the empty cells once and playing them in order is the same
    /// distribution as drawing a uniform legal move at every ply.
    fn rollout<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<i32> {
        if self.board.is_over() {
            return self.get_winner();
        }
        let mut board = self.board;
        let mut player = self.current_player;
        let mut moves = board.legal_moves();
        moves.shuffle(rng);

        for mv in moves {
            match board.place(mv, player) {
                Ok(Outcome::Win(p)) => return Some(p.id()),
                Ok(Outcome::Draw) => return None,
                _ => {}
            }
            player = player.opponent();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn board_with(stones: &[(u8, u8, Player)]) -> Board {
        let mut board = Board::new();
        for &(r, c, p) in stones {
            board.place(GomokuMove(r, c), p).unwrap();
        }
        board
    }

    /// Rotates a coordinate 90 degrees clockwise.
    fn rotate(r: u8, c: u8) -> (u8, u8) {
        (c, BOARD_SIZE as u8 - 1 - r)
    }

    #[test]
    fn test_place_and_reject() {
        let mut board = Board::new();
        assert_eq!(board.place(GomokuMove(7, 7), Player::Black), Ok(Outcome::InProgress));
        assert_eq!(
            board.place(GomokuMove(7, 7), Player::White),
            Err(PlaceError::CellOccupied { row: 7, col: 7 })
        );
        assert_eq!(
            board.place(GomokuMove(15, 0), Player::White),
            Err(PlaceError::OutOfBounds { row: 15, col: 0 })
        );
        assert_eq!(board.stones_placed(), 1);
        assert_eq!(board.get(GomokuMove(7, 7)), Stone::Black);
    }

    #[test]
    fn test_win_in_every_direction() {
        let lines: [[(u8, u8); 5]; 4] = [
            [(3, 2), (3, 3), (3, 4), (3, 5), (3, 6)],
            [(2, 9), (3, 9), (4, 9), (5, 9), (6, 9)],
            [(8, 1), (9, 2), (10, 3), (11, 4), (12, 5)],
            [(4, 14), (5, 13), (6, 12), (7, 11), (8, 10)],
        ];
        for line in lines {
            let mut board = Board::new();
            // Fill the middle last so the win is detected from an interior cell.
            for &i in &[0, 1, 3, 4] {
                let (r, c) = line[i];
                assert_eq!(board.place(GomokuMove(r, c), Player::White), Ok(Outcome::InProgress));
            }
            let (r, c) = line[2];
            assert_eq!(
                board.place(GomokuMove(r, c), Player::White),
                Ok(Outcome::Win(Player::White))
            );
            assert!(board.is_win(GomokuMove(r, c)));
            assert_eq!(
                board.place(GomokuMove(0, 0), Player::Black),
                Err(PlaceError::GameOver)
            );
        }
    }

    #[test]
    fn test_four_is_not_a_win_and_colors_do_not_mix() {
        let board = board_with(&[
            (7, 3, Player::Black),
            (7, 4, Player::Black),
            (7, 5, Player::Black),
            (7, 6, Player::Black),
            (7, 7, Player::White),
        ]);
        assert!(!board.is_win(GomokuMove(7, 6)));
        assert!(!board.is_win(GomokuMove(7, 7)));
        assert!(!board.is_win(GomokuMove(0, 0)));
        assert_eq!(board.outcome(), Outcome::InProgress);
    }

    #[test]
    fn test_overline_counts_as_win() {
        let mut board = board_with(&[
            (0, 0, Player::Black),
            (0, 1, Player::Black),
            (0, 3, Player::Black),
            (0, 4, Player::Black),
            (0, 5, Player::Black),
        ]);
        assert_eq!(
            board.place(GomokuMove(0, 2), Player::Black),
            Ok(Outcome::Win(Player::Black))
        );
    }

    #[test]
    fn test_legal_moves_complement_stones() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        for _ in 0..20 {
            let mut board = Board::new();
            let mut player = Player::Black;
            let n = rng.random_range(0..120);
            let mut cells = board.legal_moves();
            cells.shuffle(&mut rng);
            for mv in cells.into_iter().take(n) {
                if board.place(mv, player).is_err() {
                    break;
                }
                player = player.opponent();
            }
            let legal = board.legal_moves();
            assert!(legal.iter().all(|&mv| board.get(mv) == Stone::Empty));
            assert_eq!(legal.len() + board.stones_placed(), BOARD_SIZE * BOARD_SIZE);
        }
    }

    #[test]
    fn test_win_verdict_survives_rotation() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
        for _ in 0..50 {
            let mut board = Board::new();
            let mut rotated = Board::new();
            let mut player = Player::Black;
            let mut cells = board.legal_moves();
            cells.shuffle(&mut rng);
            for mv in cells {
                let (rr, rc) = rotate(mv.0, mv.1);
                let a = board.place(mv, player).unwrap();
                let b = rotated.place(GomokuMove(rr, rc), player).unwrap();
                assert_eq!(board.is_win(mv), rotated.is_win(GomokuMove(rr, rc)));
                assert_eq!(a, b);
                if a.is_over() {
                    break;
                }
                player = player.opponent();
            }
        }
    }

    #[test]
    fn test_full_board_without_five_is_draw() {
        let mut board = Board::new();
        // Pairs alternate along every axis, so no run exceeds two stones.
        let mut last = Outcome::InProgress;
        for r in 0..BOARD_SIZE as u8 {
            for c in 0..BOARD_SIZE as u8 {
                let player = if (c / 2 + r) % 2 == 0 { Player::Black } else { Player::White };
                last = board.place(GomokuMove(r, c), player).unwrap();
            }
        }
        assert_eq!(last, Outcome::Draw);
        assert!(board.is_full());
        assert!(board.legal_moves().is_empty());
    }

    #[test]
    fn test_remove_reopens_game() {
        let mut board = board_with(&[
            (7, 3, Player::Black),
            (7, 4, Player::Black),
            (7, 5, Player::Black),
            (7, 6, Player::Black),
        ]);
        let before = board;
        board.place(GomokuMove(7, 7), Player::Black).unwrap();
        assert!(board.is_over());
        assert_eq!(board.remove(GomokuMove(7, 7)), Some(Player::Black));
        assert_eq!(board, before);
        assert_eq!(board.remove(GomokuMove(0, 0)), None);
    }

    #[test]
    fn test_state_rollout_respects_finished_games() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let board = board_with(&[
            (0, 0, Player::White),
            (0, 1, Player::White),
            (0, 2, Player::White),
            (0, 3, Player::White),
            (0, 4, Player::White),
        ]);
        let state = GomokuState::from_board(board, Player::Black);
        assert!(state.is_terminal());
        assert!(state.get_possible_moves().is_empty());
        assert_eq!(state.rollout(&mut rng), Some(Player::White.id()));

        let fresh = GomokuState::new();
        let winner = fresh.rollout(&mut rng);
        assert!(winner.is_none() || Player::from_id(winner.unwrap()).is_some());
    }

    #[test]
    fn test_flat_encoding() {
        let board = board_with(&[(0, 1, Player::Black), (14, 14, Player::White)]);
        let flat = board.to_flat();
        assert_eq!(flat.len(), BOARD_SIZE * BOARD_SIZE);
        assert_eq!(flat[1], 1);
        assert_eq!(flat[BOARD_SIZE * BOARD_SIZE - 1], 2);
        assert_eq!(flat.iter().filter(|&&v| v != 0).count(), 2);
    }

    #[test]
    fn test_move_parsing() {
        assert_eq!("3, 4".parse::<GomokuMove>(), Ok(GomokuMove(3, 4)));
        assert!("3".parse::<GomokuMove>().is_err());
        assert!("a,b".parse::<GomokuMove>().is_err());
        assert!("3,900".parse::<GomokuMove>().is_err());
    }

    #[test]
    fn test_wide_coordinates_are_checked() {
        assert_eq!(GomokuMove::new(14, 0), Ok(GomokuMove(14, 0)));
        assert_eq!(GomokuMove::new(15, 0), Err(PlaceError::OutOfBounds { row: 15, col: 0 }));
        assert_eq!(GomokuMove::new(3, 300), Err(PlaceError::OutOfBounds { row: 3, col: 300 }));
        assert_eq!(std::mem::size_of::<GomokuMove>(), 2);
    }
}
