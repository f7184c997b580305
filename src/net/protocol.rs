//! Move/undo synchronization between two peers.
//!
//! [`SyncProtocol`] is a pure state machine: it owns this side's copy of the
//! board, the turn indicator and the move history, consumes local intents and
//! remote [`WireMessage`]s, and returns the messages to send. It never touches
//! a socket, which keeps every board mutation on the game loop's thread.
//!
//! ```text
//! Idle ──start──▶ AwaitingMove ──request_undo──▶ UndoRequested ──accept/reject──┐
//!                   ▲   │                                                       │
//!                   │   └──recv UndoRequest──▶ UndoPending ──respond_undo───────┤
//!                   └───────────────────────────────────────────────────────────┘
//!            (any state) ──desync / disconnect──▶ PeerDisconnected
//! ```

use crate::games::gomoku::{Board, GomokuMove, Outcome, Player};
use crate::net::message::WireMessage;
use crate::net::session::Role;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Connected but no game started yet.
    Idle,
    AwaitingMove,
    /// We asked the peer to undo and are waiting for the answer.
    UndoRequested,
    /// The peer asked us to undo; a local accept/reject is pending.
    UndoPending,
    PeerDisconnected,
}

/// What changed as a result of a remote message, for the shell to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    MovePlayed {
        mv: GomokuMove,
        player: Player,
        outcome: Outcome,
    },
    UndoRequested,
    UndoApplied { mv: GomokuMove },
    UndoRejected,
    NewGame,
    PeerDisconnected { reason: String },
}

#[derive(Debug, Clone)]
pub struct SyncProtocol {
    role: Role,
    board: Board,
    turn: Player,
    history: Vec<GomokuMove>,
    state: SyncState,
    /// Set while our `NewGame` is unanswered; a `NewGame` from the peer in
    /// that window crossed ours on the wire.
    new_game_sent: bool,
}

impl SyncProtocol {
    pub fn new(role: Role) -> Self {
        SyncProtocol {
            role,
            board: Board::new(),
            turn: Player::Black,
            history: Vec::new(),
            state: SyncState::Idle,
            new_game_sent: false,
        }
    }

    /// Starts (or restarts) a game: empty board, Black to move.
    pub fn start(&mut self) {
        if self.state == SyncState::PeerDisconnected {
            return;
        }
        self.board = Board::new();
        self.turn = Player::Black;
        self.history.clear();
        self.state = SyncState::AwaitingMove;
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn local_player(&self) -> Player {
        self.role.player()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn turn(&self) -> Player {
        self.turn
    }

    pub fn history(&self) -> &[GomokuMove] {
        &self.history
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn outcome(&self) -> Outcome {
        self.board.outcome()
    }

    pub fn is_my_turn(&self) -> bool {
        self.state == SyncState::AwaitingMove && !self.board.is_over() && self.turn == self.local_player()
    }

    /// Applies a local move. Returns the message to send, or `None` when the
    /// move is rejected (no state changes in that case).
    pub fn local_move(&mut self, mv: GomokuMove) -> Option<WireMessage> {
        if !self.is_my_turn() {
            return None;
        }
        self.apply(mv).ok()?;
        Some(WireMessage::from_move(mv))
    }

    /// Whether the local side may ask to take back the most recent move: only
    /// the side that did not make it, only outside another undo exchange.
    pub fn can_request_undo(&self) -> bool {
        self.state == SyncState::AwaitingMove
            && !self.board.is_over()
            && self.last_mover().is_some_and(|p| p != self.local_player())
    }

    pub fn request_undo(&mut self) -> Option<WireMessage> {
        if !self.can_request_undo() {
            return None;
        }
        self.state = SyncState::UndoRequested;
        Some(WireMessage::UndoRequest)
    }

    /// Answers a pending undo request from the peer.
    pub fn respond_undo(&mut self, accept: bool) -> Option<WireMessage> {
        if self.state != SyncState::UndoPending {
            return None;
        }
        self.state = SyncState::AwaitingMove;
        if accept {
            self.revert_last();
            Some(WireMessage::UndoAccept)
        } else {
            Some(WireMessage::UndoReject)
        }
    }

    /// Replaces a decided game with a fresh one on both sides.
    pub fn request_new_game(&mut self) -> Option<WireMessage> {
        if self.state != SyncState::AwaitingMove || !self.board.is_over() {
            return None;
        }
        self.start();
        self.new_game_sent = true;
        Some(WireMessage::NewGame)
    }

    /// Processes one message from the peer. Anything that does not fit the
    /// current state is a desync and ends the session.
    pub fn handle_message(&mut self, msg: WireMessage) -> Option<SyncEvent> {
        let crossed_new_game = std::mem::take(&mut self.new_game_sent);
        match (self.state, msg) {
            (SyncState::PeerDisconnected, _) => None,
            (_, WireMessage::Leave) => Some(self.disconnect("peer left the game")),
            (SyncState::AwaitingMove, WireMessage::Move { row, col }) => {
                if self.turn == self.local_player() {
                    return Some(self.disconnect(format!("peer moved ({row},{col}) out of turn")));
                }
                let player = self.turn;
                let placed = GomokuMove::new(row, col).and_then(|mv| self.apply(mv).map(|outcome| (mv, outcome)));
                match placed {
                    Ok((mv, outcome)) => Some(SyncEvent::MovePlayed { mv, player, outcome }),
                    Err(e) => Some(self.disconnect(format!("peer move ({row},{col}) rejected: {e}"))),
                }
            }
            (SyncState::AwaitingMove, WireMessage::UndoRequest)
                if !self.board.is_over() && self.last_mover().is_some_and(|p| p == self.local_player()) =>
            {
                self.state = SyncState::UndoPending;
                Some(SyncEvent::UndoRequested)
            }
            (SyncState::AwaitingMove, WireMessage::NewGame) if self.board.is_over() => {
                self.start();
                Some(SyncEvent::NewGame)
            }
            // Both sides asked for a new game at once. Ours already reset the
            // board (and we may have opened it since), so theirs only confirms.
            (SyncState::AwaitingMove, WireMessage::NewGame) if crossed_new_game => {
                debug!("new game confirmed by peer");
                Some(SyncEvent::NewGame)
            }
            (SyncState::UndoRequested, WireMessage::UndoAccept) => {
                self.state = SyncState::AwaitingMove;
                self.revert_last().map(|mv| SyncEvent::UndoApplied { mv })
            }
            (SyncState::UndoRequested, WireMessage::UndoReject) => {
                self.state = SyncState::AwaitingMove;
                Some(SyncEvent::UndoRejected)
            }
            (state, msg) => Some(self.disconnect(format!("unexpected {msg:?} while {state:?}"))),
        }
    }

    /// Moves to the terminal disconnected state.
    pub fn disconnect(&mut self, reason: impl Into<String>) -> SyncEvent {
        let reason = reason.into();
        if self.state != SyncState::PeerDisconnected {
            warn!(%reason, "protocol ended");
        }
        self.state = SyncState::PeerDisconnected;
        SyncEvent::PeerDisconnected { reason }
    }

    fn last_mover(&self) -> Option<Player> {
        let last = *self.history.last()?;
        self.board.get(last).player()
    }

    fn apply(&mut self, mv: GomokuMove) -> Result<Outcome, crate::error::PlaceError> {
        let outcome = self.board.place(mv, self.turn)?;
        self.history.push(mv);
        debug!(%mv, player = %self.turn, ?outcome, "move applied");
        if !outcome.is_over() {
            self.turn = self.turn.opponent();
        }
        Ok(outcome)
    }

    /// Takes back the last move; the turn returns to whoever made it.
    fn revert_last(&mut self) -> Option<GomokuMove> {
        let mv = self.history.pop()?;
        if let Some(mover) = self.board.remove(mv) {
            self.turn = mover;
        }
        debug!(%mv, "move undone");
        Some(mv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (SyncProtocol, SyncProtocol) {
        let mut host = SyncProtocol::new(Role::Host);
        let mut client = SyncProtocol::new(Role::Client);
        host.start();
        client.start();
        (host, client)
    }

    /// Plays `mv` on `from` and delivers it to `to`.
    fn play(from: &mut SyncProtocol, to: &mut SyncProtocol, mv: GomokuMove) {
        let msg = from.local_move(mv).expect("local move accepted");
        assert!(matches!(to.handle_message(msg), Some(SyncEvent::MovePlayed { .. })));
    }

    #[test]
    fn test_idle_until_started() {
        let mut host = SyncProtocol::new(Role::Host);
        assert_eq!(host.state(), SyncState::Idle);
        assert_eq!(host.local_move(GomokuMove(7, 7)), None);
        host.start();
        assert!(host.is_my_turn());
    }

    #[test]
    fn test_host_move_reaches_client() {
        let (mut host, mut client) = pair();
        let msg = host.local_move(GomokuMove(7, 7)).unwrap();
        assert_eq!(msg, WireMessage::Move { row: 7, col: 7 });

        let event = client.handle_message(msg).unwrap();
        assert_eq!(
            event,
            SyncEvent::MovePlayed {
                mv: GomokuMove(7, 7),
                player: Player::Black,
                outcome: Outcome::InProgress
            }
        );
        assert_eq!(client.board().get(GomokuMove(7, 7)), crate::games::gomoku::Stone::Black);
        assert_eq!(client.turn(), Player::White);
        assert_eq!(client.board(), host.board());
        assert_eq!(client.turn(), host.turn());
        assert_eq!(client.history(), host.history());
    }

    #[test]
    fn test_local_moves_rejected_silently() {
        let (mut host, mut client) = pair();
        // Client cannot open.
        assert_eq!(client.local_move(GomokuMove(0, 0)), None);
        play(&mut host, &mut client, GomokuMove(7, 7));
        // Host cannot move twice; client cannot play on an occupied cell.
        assert_eq!(host.local_move(GomokuMove(1, 1)), None);
        assert_eq!(client.local_move(GomokuMove(7, 7)), None);
        assert_eq!(client.local_move(GomokuMove(15, 1)), None);
        assert_eq!(client.history().len(), 1);
        assert_eq!(client.turn(), Player::White);
    }

    #[test]
    fn test_undo_negotiation_accepted() {
        let (mut host, mut client) = pair();
        play(&mut host, &mut client, GomokuMove(7, 7));

        // The host made the last move, so only the client may ask.
        assert_eq!(host.request_undo(), None);
        let request = client.request_undo().unwrap();
        assert_eq!(client.state(), SyncState::UndoRequested);
        assert_eq!(client.local_move(GomokuMove(0, 0)), None);

        assert_eq!(host.handle_message(request), Some(SyncEvent::UndoRequested));
        assert_eq!(host.state(), SyncState::UndoPending);

        let answer = host.respond_undo(true).unwrap();
        assert_eq!(answer, WireMessage::UndoAccept);
        assert_eq!(
            client.handle_message(answer),
            Some(SyncEvent::UndoApplied { mv: GomokuMove(7, 7) })
        );

        for side in [&host, &client] {
            assert_eq!(side.board().get(GomokuMove(7, 7)), crate::games::gomoku::Stone::Empty);
            assert_eq!(side.turn(), Player::Black);
            assert!(side.history().is_empty());
            assert_eq!(side.state(), SyncState::AwaitingMove);
        }
        assert!(host.is_my_turn());
    }

    #[test]
    fn test_undo_negotiation_rejected() {
        let (mut host, mut client) = pair();
        play(&mut host, &mut client, GomokuMove(7, 7));
        let request = client.request_undo().unwrap();
        host.handle_message(request);
        assert_eq!(host.respond_undo(false), Some(WireMessage::UndoReject));
        assert_eq!(client.handle_message(WireMessage::UndoReject), Some(SyncEvent::UndoRejected));
        assert_eq!(client.history().len(), 1);
        assert!(client.is_my_turn());
        assert_eq!(host.respond_undo(true), None);
    }

    #[test]
    fn test_undo_round_trip_restores_state() {
        let (mut host, mut client) = pair();
        play(&mut host, &mut client, GomokuMove(7, 7));
        play(&mut client, &mut host, GomokuMove(7, 8));

        let board_before = *host.board();
        let turn_before = host.turn();
        let count_before = host.history().len();

        play(&mut host, &mut client, GomokuMove(8, 8));
        let request = client.request_undo().unwrap();
        host.handle_message(request);
        let accept = host.respond_undo(true).unwrap();
        client.handle_message(accept);

        for side in [&host, &client] {
            assert_eq!(*side.board(), board_before);
            assert_eq!(side.turn(), turn_before);
            assert_eq!(side.history().len(), count_before);
        }
    }

    #[test]
    fn test_out_of_order_messages_are_desync() {
        let (mut host, mut client) = pair();
        // Client receives a second move from the host without replying.
        play(&mut host, &mut client, GomokuMove(7, 7));
        let event = client.handle_message(WireMessage::Move { row: 1, col: 1 });
        assert!(matches!(event, Some(SyncEvent::PeerDisconnected { .. })));
        assert_eq!(client.state(), SyncState::PeerDisconnected);

        // Once disconnected nothing else is processed.
        assert_eq!(client.handle_message(WireMessage::UndoReject), None);
        assert_eq!(client.local_move(GomokuMove(0, 0)), None);
        assert_eq!(client.request_undo(), None);

        // Accept without a request.
        let mut fresh = SyncProtocol::new(Role::Host);
        fresh.start();
        assert!(matches!(
            fresh.handle_message(WireMessage::UndoAccept),
            Some(SyncEvent::PeerDisconnected { .. })
        ));
    }

    #[test]
    fn test_undo_request_from_wrong_side_is_desync() {
        let (mut host, mut client) = pair();
        play(&mut host, &mut client, GomokuMove(7, 7));
        // The client never moved, so a request aimed at it is invalid.
        assert!(matches!(
            client.handle_message(WireMessage::UndoRequest),
            Some(SyncEvent::PeerDisconnected { .. })
        ));
    }

    #[test]
    fn test_leave_and_win() {
        let (mut host, mut client) = pair();
        for c in 0..4 {
            play(&mut host, &mut client, GomokuMove(0, c));
            play(&mut client, &mut host, GomokuMove(1, c));
        }
        let msg = host.local_move(GomokuMove(0, 4)).unwrap();
        assert_eq!(
            client.handle_message(msg),
            Some(SyncEvent::MovePlayed {
                mv: GomokuMove(0, 4),
                player: Player::Black,
                outcome: Outcome::Win(Player::Black)
            })
        );
        assert!(!client.is_my_turn());
        assert_eq!(client.request_undo(), None);

        assert!(matches!(
            host.handle_message(WireMessage::Leave),
            Some(SyncEvent::PeerDisconnected { .. })
        ));
    }

    #[test]
    fn test_new_game_after_win() {
        let (mut host, mut client) = pair();
        // Not while the game is running.
        assert_eq!(client.request_new_game(), None);
        play_to_white_win(&mut host, &mut client);

        let msg = client.request_new_game().unwrap();
        assert_eq!(host.handle_message(msg), Some(SyncEvent::NewGame));
        for side in [&host, &client] {
            assert!(side.history().is_empty());
            assert_eq!(side.board().stones_placed(), 0);
            assert_eq!(side.turn(), Player::Black);
        }
        assert!(host.is_my_turn());
    }

    /// Plays a game in which White completes five on row 1.
    fn play_to_white_win(host: &mut SyncProtocol, client: &mut SyncProtocol) {
        play(host, client, GomokuMove(7, 7));
        for c in 0..4 {
            play(client, host, GomokuMove(1, c));
            if c < 3 {
                play(host, client, GomokuMove(14, c));
            }
        }
        play(host, client, GomokuMove(14, 10));
        play(client, host, GomokuMove(1, 4));
        assert_eq!(host.outcome(), Outcome::Win(Player::White));
    }

    #[test]
    fn test_new_game_requested_by_both_sides_at_once() {
        let (mut host, mut client) = pair();
        play_to_white_win(&mut host, &mut client);

        let from_host = host.request_new_game().unwrap();
        let from_client = client.request_new_game().unwrap();
        assert_eq!(client.handle_message(from_host), Some(SyncEvent::NewGame));
        assert_eq!(host.handle_message(from_client), Some(SyncEvent::NewGame));

        for side in [&host, &client] {
            assert_eq!(side.state(), SyncState::AwaitingMove);
            assert!(side.history().is_empty());
            assert_eq!(side.turn(), Player::Black);
        }
        play(&mut host, &mut client, GomokuMove(7, 7));
        assert_eq!(host.board(), client.board());
    }

    #[test]
    fn test_crossed_new_game_after_opening_move() {
        let (mut host, mut client) = pair();
        play_to_white_win(&mut host, &mut client);

        let from_host = host.request_new_game().unwrap();
        let from_client = client.request_new_game().unwrap();
        // The host opens the new game before the client's request arrives.
        let opening = host.local_move(GomokuMove(7, 7)).unwrap();

        assert_eq!(host.handle_message(from_client), Some(SyncEvent::NewGame));
        assert_eq!(client.handle_message(from_host), Some(SyncEvent::NewGame));
        assert!(matches!(client.handle_message(opening), Some(SyncEvent::MovePlayed { .. })));
        assert_eq!(host.board(), client.board());
        assert!(client.is_my_turn());

        // The window closes with the first peer message after ours.
        assert!(matches!(
            host.handle_message(WireMessage::NewGame),
            Some(SyncEvent::PeerDisconnected { .. })
        ));
    }

    #[test]
    fn test_undo_request_after_game_over_is_desync() {
        let (mut host, mut client) = pair();
        play_to_white_win(&mut host, &mut client);
        // White won with the last move; Black may not take it back.
        assert_eq!(host.request_undo(), None);
        assert!(matches!(
            client.handle_message(WireMessage::UndoRequest),
            Some(SyncEvent::PeerDisconnected { .. })
        ));
        assert_eq!(client.outcome(), Outcome::Win(Player::White));
    }

    #[test]
    fn test_off_board_peer_move_is_desync() {
        let (_host, mut client) = pair();
        let event = client.handle_message(WireMessage::Move { row: 7, col: 300 });
        assert!(matches!(event, Some(SyncEvent::PeerDisconnected { .. })), "got {event:?}");
        assert!(client.history().is_empty());
    }

    #[test]
    fn test_new_game_mid_game_is_desync() {
        let (mut host, mut client) = pair();
        play(&mut host, &mut client, GomokuMove(7, 7));
        assert!(matches!(
            client.handle_message(WireMessage::NewGame),
            Some(SyncEvent::PeerDisconnected { .. })
        ));
    }
}
