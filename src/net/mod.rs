//! Playing over the local network.
//!
//! ## Layers
//! - [`transport`]: UDP room adverts, discovery, TCP host/join
//! - [`session`]: one live connection with its receive thread
//! - [`message`]: the line-delimited JSON wire format
//! - [`protocol`]: the move/undo state machine, free of I/O
//! - [`lan_game`]: a protocol driven by a session
//! - [`lobby`]: hosting and discovery in the background for the shell
//!
//! The host plays Black and moves first. Every move and undo goes through the
//! protocol on the owning thread, so both boards stay identical as long as the
//! connection lives.

pub mod lan_game;
pub mod lobby;
pub mod message;
pub mod protocol;
pub mod session;
pub mod transport;

pub use lan_game::LanGame;
pub use lobby::{Lobby, LobbyStatus};
pub use message::WireMessage;
pub use protocol::{SyncEvent, SyncProtocol, SyncState};
pub use session::{ConnectionState, PeerEvent, PeerSession, Role};
pub use transport::{discover_rooms, host_game, join_room, HostListener, RoomAdvertiser, RoomInfo};
