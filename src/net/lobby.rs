//! Background hosting and discovery for an interactive shell.
//!
//! Hosting blocks until a peer connects and discovery blocks for the whole
//! listening window, so both run on a worker thread. The worker publishes its
//! progress through a shared [`LobbyStatus`] that the shell polls, and parks a
//! finished [`PeerSession`] until the shell takes it.

use crate::config::NetConfig;
use crate::net::session::PeerSession;
use crate::net::transport::{discover_rooms, join_room, HostListener, RoomInfo};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyStatus {
    Idle,
    /// Waiting for a peer; the room being advertised.
    Hosting(RoomInfo),
    Searching,
    /// Discovery finished. May be empty.
    Rooms(Vec<RoomInfo>),
    Joining(RoomInfo),
    /// A session is ready to be taken.
    Connected,
    Failed(String),
}

pub struct Lobby {
    config: NetConfig,
    status: Arc<Mutex<LobbyStatus>>,
    session: Arc<Mutex<Option<PeerSession>>>,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Lobby {
    pub fn new(config: NetConfig) -> Self {
        Lobby {
            config,
            status: Arc::new(Mutex::new(LobbyStatus::Idle)),
            session: Arc::new(Mutex::new(None)),
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn status(&self) -> LobbyStatus {
        self.status.lock().clone()
    }

    /// Is a background operation still running?
    pub fn is_busy(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Binds a listener, advertises it and waits for a peer in the background.
    pub fn host(&mut self) {
        let config = self.config.clone();
        self.spawn(move |status, session, cancel| {
            let listener = HostListener::bind(&config)?;
            *status.lock() = LobbyStatus::Hosting(listener.room()?);
            if let Some(peer) = listener.accept_until(cancel)? {
                *session.lock() = Some(peer);
                *status.lock() = LobbyStatus::Connected;
            } else {
                *status.lock() = LobbyStatus::Idle;
            }
            Ok(())
        });
    }

    /// Listens for room adverts for the configured window in the background.
    pub fn discover(&mut self) {
        let config = self.config.clone();
        self.spawn(move |status, _session, _cancel| {
            *status.lock() = LobbyStatus::Searching;
            let rooms = discover_rooms(&config, config.discovery_window)?;
            info!(found = rooms.len(), "discovery finished");
            *status.lock() = LobbyStatus::Rooms(rooms);
            Ok(())
        });
    }

    /// Connects to `room` in the background.
    pub fn join(&mut self, room: RoomInfo) {
        let config = self.config.clone();
        self.spawn(move |status, session, _cancel| {
            *status.lock() = LobbyStatus::Joining(room);
            let peer = join_room(&room, &config)?;
            *session.lock() = Some(peer);
            *status.lock() = LobbyStatus::Connected;
            Ok(())
        });
    }

    /// Takes the connected session, if one is ready. The lobby returns to idle.
    pub fn take_session(&mut self) -> Option<PeerSession> {
        let session = self.session.lock().take()?;
        *self.status.lock() = LobbyStatus::Idle;
        Some(session)
    }

    /// Stops hosting (if hosting) and waits for the worker. Discovery and
    /// joining always finish on their own within their timeouts.
    pub fn cancel(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn spawn<F>(&mut self, task: F)
    where
        F: FnOnce(
                &Mutex<LobbyStatus>,
                &Mutex<Option<PeerSession>>,
                &AtomicBool,
            ) -> Result<(), crate::error::NetError>
            + Send
            + 'static,
    {
        self.cancel();
        self.cancel = Arc::new(AtomicBool::new(false));

        let status = self.status.clone();
        let session = self.session.clone();
        let cancel = self.cancel.clone();
        self.worker = Some(thread::spawn(move || {
            if let Err(e) = task(&*status, &*session, &*cancel) {
                warn!(error = %e, "lobby operation failed");
                *status.lock() = LobbyStatus::Failed(e.to_string());
            }
        }));
    }
}

impl Drop for Lobby {
    fn drop(&mut self) {
        self.cancel();
    }
}
