//! A live connection to one peer.
//!
//! The session owns the write half of the TCP stream and a background receive
//! thread that owns a clone of it. The receive thread never touches game state:
//! it decodes one line at a time and forwards [`PeerEvent`]s over a channel
//! that the game loop drains. Reads use a short deadline; a lapsed deadline is
//! simply retried, while EOF, an I/O error or an undecodable line ends the
//! thread with a single `Disconnected` event.

use crate::config::NetConfig;
use crate::error::NetError;
use crate::games::gomoku::Player;
use crate::net::message::{self, WireMessage};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which end of the connection this instance is. Fixed for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepted the connection; plays Black and moves first.
    Host,
    /// Joined a room; plays White.
    Client,
}

impl Role {
    pub fn player(self) -> Player {
        match self {
            Role::Host => Player::Black,
            Role::Client => Player::White,
        }
    }
}

/// Last known state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Closed,
}

/// Something the receive thread observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Message(WireMessage),
    Disconnected(String),
}

pub struct PeerSession {
    role: Role,
    peer: SocketAddr,
    stream: TcpStream,
    events: Receiver<PeerEvent>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    state: ConnectionState,
}

impl PeerSession {
    /// Wraps a connected stream and starts its receive thread.
    pub fn new(stream: TcpStream, role: Role, config: &NetConfig) -> Result<Self, NetError> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let read_half = stream.try_clone()?;
        read_half.set_read_timeout(Some(config.read_timeout))?;

        let (tx, events) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let reader = thread::spawn(move || receive_loop(read_half, tx, stop_flag));

        info!(?role, %peer, "session started");
        Ok(PeerSession {
            role,
            peer,
            stream,
            events,
            stop,
            reader: Some(reader),
            state: ConnectionState::Connected,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Writes one complete message.
    pub fn send(&mut self, msg: &WireMessage) -> Result<(), NetError> {
        if self.state != ConnectionState::Connected {
            return Err(NetError::Disconnected);
        }
        let line = message::encode(msg)?;
        let written = self.stream.write_all(&line).and_then(|_| self.stream.flush());
        if let Err(e) = written {
            self.state = ConnectionState::Disconnected;
            return Err(e.into());
        }
        debug!(?msg, "sent");
        Ok(())
    }

    /// Next event if one is ready.
    pub fn try_recv(&mut self) -> Option<PeerEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(self.observe(event)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => self.reader_gone(),
        }
    }

    /// Waits up to `timeout` for the next event.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<PeerEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(self.observe(event)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => self.reader_gone(),
        }
    }

    fn observe(&mut self, event: PeerEvent) -> PeerEvent {
        if matches!(event, PeerEvent::Disconnected(_)) && self.state == ConnectionState::Connected {
            self.state = ConnectionState::Disconnected;
        }
        event
    }

    /// The receive thread ended without a final event; report it once.
    fn reader_gone(&mut self) -> Option<PeerEvent> {
        if self.state == ConnectionState::Connected {
            self.state = ConnectionState::Disconnected;
            Some(PeerEvent::Disconnected("receive task ended".to_string()))
        } else {
            None
        }
    }

    /// Shuts the socket down and joins the receive thread.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.state = ConnectionState::Closed;
        info!(peer = %self.peer, "session closed");
    }
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn receive_loop(stream: TcpStream, tx: Sender<PeerEvent>, stop: Arc<AtomicBool>) {
    let mut reader = BufReader::new(stream);
    // Bytes of a partially received line survive read timeouts.
    let mut line = Vec::new();

    let reason = loop {
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break "peer closed the connection".to_string(),
            Ok(_) if line.last() != Some(&b'\n') => break "connection closed mid-message".to_string(),
            Ok(_) => {
                let decoded = message::decode(&line);
                line.clear();
                match decoded {
                    Ok(msg) => {
                        debug!(?msg, "received");
                        if tx.send(PeerEvent::Message(msg)).is_err() {
                            return;
                        }
                    }
                    Err(e) => break e.to_string(),
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                if stop.load(Ordering::Relaxed) {
                    return;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => break e.to_string(),
        }
    };

    if stop.load(Ordering::Relaxed) {
        return;
    }
    warn!(%reason, "peer disconnected");
    let _ = tx.send(PeerEvent::Disconnected(reason));
}
