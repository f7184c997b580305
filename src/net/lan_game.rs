//! A networked game: one [`SyncProtocol`] driven by one [`PeerSession`].
//!
//! All board changes happen on the thread that owns the `LanGame`. Local
//! intents are applied and sent immediately; peer messages are applied when
//! the owner calls [`LanGame::poll`] or [`LanGame::wait_event`].

use crate::games::gomoku::{Board, GomokuMove, Outcome, Player};
use crate::net::message::WireMessage;
use crate::net::protocol::{SyncEvent, SyncProtocol, SyncState};
use crate::net::session::{PeerEvent, PeerSession, Role};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::info;

pub struct LanGame {
    session: PeerSession,
    protocol: SyncProtocol,
    /// Events produced locally (a failed send) awaiting the next poll.
    pending: VecDeque<SyncEvent>,
}

impl LanGame {
    /// Starts a fresh game on an established session.
    pub fn new(session: PeerSession) -> Self {
        let mut protocol = SyncProtocol::new(session.role());
        protocol.start();
        info!(role = ?session.role(), peer = %session.peer_addr(), "game started");
        LanGame {
            session,
            protocol,
            pending: VecDeque::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.protocol.role()
    }

    pub fn local_player(&self) -> Player {
        self.protocol.local_player()
    }

    pub fn board(&self) -> &Board {
        self.protocol.board()
    }

    pub fn turn(&self) -> Player {
        self.protocol.turn()
    }

    pub fn history(&self) -> &[GomokuMove] {
        self.protocol.history()
    }

    pub fn state(&self) -> SyncState {
        self.protocol.state()
    }

    pub fn outcome(&self) -> Outcome {
        self.protocol.outcome()
    }

    pub fn is_my_turn(&self) -> bool {
        self.protocol.is_my_turn()
    }

    pub fn can_request_undo(&self) -> bool {
        self.protocol.can_request_undo()
    }

    pub fn is_disconnected(&self) -> bool {
        self.protocol.state() == SyncState::PeerDisconnected
    }

    /// Plays a local move. Returns `false` (and changes nothing) when it is not
    /// our turn or the cell is not playable.
    pub fn request_move(&mut self, row: usize, col: usize) -> bool {
        let Ok(mv) = GomokuMove::new(row, col) else {
            return false;
        };
        let msg = self.protocol.local_move(mv);
        self.send(msg)
    }

    /// Asks the peer to take back its last move.
    pub fn request_undo(&mut self) -> bool {
        let msg = self.protocol.request_undo();
        self.send(msg)
    }

    /// Answers a pending undo request.
    pub fn respond_undo(&mut self, accept: bool) -> bool {
        let msg = self.protocol.respond_undo(accept);
        self.send(msg)
    }

    /// Sends what the protocol produced. A failed write ends the session; the
    /// resulting event is reported by the next poll.
    fn send(&mut self, msg: Option<WireMessage>) -> bool {
        let Some(msg) = msg else {
            return false;
        };
        if let Err(e) = self.session.send(&msg) {
            let event = self.protocol.disconnect(format!("send failed: {e}"));
            self.pending.push_back(event);
            self.session.close();
        }
        true
    }

    /// Applies every peer event that has already arrived.
    pub fn poll(&mut self) -> Vec<SyncEvent> {
        let mut events: Vec<SyncEvent> = self.pending.drain(..).collect();
        while let Some(event) = self.session.try_recv() {
            events.extend(self.apply(event));
        }
        events
    }

    /// Waits up to `timeout` for the next protocol event.
    pub fn wait_event(&mut self, timeout: Duration) -> Option<SyncEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || self.is_disconnected() {
                return None;
            }
            if let Some(event) = self.session.recv_timeout(remaining) {
                if let Some(sync) = self.apply(event) {
                    return Some(sync);
                }
            }
        }
    }

    fn apply(&mut self, event: PeerEvent) -> Option<SyncEvent> {
        let sync = match event {
            PeerEvent::Message(msg) => self.protocol.handle_message(msg),
            PeerEvent::Disconnected(_) if self.is_disconnected() => None,
            PeerEvent::Disconnected(reason) => Some(self.protocol.disconnect(reason)),
        };
        // A desync leaves the peer in an unknown state; dropping the link lets
        // it notice on its next read.
        if self.is_disconnected() {
            self.session.close();
        }
        sync
    }

    /// Starts another game with the same peer once the current one is decided.
    pub fn new_game(&mut self) -> bool {
        let msg = self.protocol.request_new_game();
        self.send(msg)
    }

    /// Tells the peer we are leaving and closes the connection.
    pub fn close(mut self) {
        if !self.is_disconnected() {
            let _ = self.session.send(&WireMessage::Leave);
        }
        self.session.close();
    }
}
