//! LAN transport: room advertising, discovery, hosting and joining.
//!
//! A host binds an ephemeral TCP listener and broadcasts `"<ip>:<port>"` over
//! UDP on the well-known discovery port until one peer connects. Discovery
//! listens on that port for a bounded window and returns every room seen,
//! keyed by sender address. Joining is a plain TCP connect.

use crate::config::NetConfig;
use crate::error::NetError;
use crate::net::session::{PeerSession, Role};
use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const ACCEPT_POLL: Duration = Duration::from_millis(25);

/// A discovered, joinable game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomInfo {
    pub ip: IpAddr,
    pub port: u16,
}

impl RoomInfo {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// Parses an advert of the form `"<ip>:<port>"`.
    pub fn parse_advert(text: &str) -> Result<Self, NetError> {
        let invalid = || NetError::InvalidAdvert(text.to_string());
        let (ip, port) = text.trim().rsplit_once(':').ok_or_else(invalid)?;
        Ok(RoomInfo {
            ip: ip.parse().map_err(|_| invalid())?,
            port: port.parse().map_err(|_| invalid())?,
        })
    }

    pub fn advert(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl fmt::Display for RoomInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Best guess at this machine's LAN address. Connecting a UDP socket sends no
/// packets; it only asks the OS which interface would route there.
pub fn local_ip() -> IpAddr {
    let detect = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1))?;
        Ok(socket.local_addr()?.ip())
    };
    match detect() {
        Ok(ip) if !ip.is_unspecified() => ip,
        _ => IpAddr::V4(Ipv4Addr::LOCALHOST),
    }
}

/// Background task that periodically broadcasts a room advert.
/// Stops when [`RoomAdvertiser::stop`] is called or the value is dropped.
pub struct RoomAdvertiser {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RoomAdvertiser {
    pub fn start(room: RoomInfo, config: &NetConfig) -> Result<Self, NetError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(|source| NetError::Bind {
            what: "advert socket",
            source,
        })?;
        socket.set_broadcast(true)?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let target = config.broadcast_target;
        let interval = config.broadcast_interval;
        let advert = room.advert();
        info!(%advert, %target, "advertising room");

        let handle = thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                if let Err(e) = socket.send_to(advert.as_bytes(), target) {
                    warn!(error = %e, "room advert failed");
                }
                sleep_unless_stopped(interval, &stop_flag);
            }
            debug!("room advertiser stopped");
        });

        Ok(RoomAdvertiser {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RoomAdvertiser {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleeps in short slices so a stop request is honoured quickly.
fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) {
    let slice = Duration::from_millis(50);
    let deadline = Instant::now() + total;
    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(slice.min(deadline - now));
    }
}

/// A bound but not yet connected game listener.
pub struct HostListener {
    listener: TcpListener,
    config: NetConfig,
}

impl HostListener {
    pub fn bind(config: &NetConfig) -> Result<Self, NetError> {
        let listener = TcpListener::bind(config.listen_addr).map_err(|source| NetError::Bind {
            what: "game listener",
            source,
        })?;
        Ok(HostListener {
            listener,
            config: config.clone(),
        })
    }

    pub fn local_port(&self) -> Result<u16, NetError> {
        Ok(self.listener.local_addr()?.port())
    }

    /// The room this listener will advertise.
    pub fn room(&self) -> Result<RoomInfo, NetError> {
        Ok(RoomInfo {
            ip: self.config.advertise_ip.unwrap_or_else(local_ip),
            port: self.local_port()?,
        })
    }

    /// Advertises the room and blocks until exactly one peer connects.
    pub fn accept(self) -> Result<PeerSession, NetError> {
        self.accept_until(&AtomicBool::new(false))?.ok_or(NetError::Disconnected)
    }

    /// Like [`HostListener::accept`], but gives up with `Ok(None)` once `stop`
    /// is set. The advertiser stops as soon as this returns either way.
    pub fn accept_until(self, stop: &AtomicBool) -> Result<Option<PeerSession>, NetError> {
        let mut advertiser = RoomAdvertiser::start(self.room()?, &self.config)?;
        self.listener.set_nonblocking(true)?;

        let accepted = loop {
            if stop.load(Ordering::Relaxed) {
                break None;
            }
            match self.listener.accept() {
                Ok(pair) => break Some(pair),
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    advertiser.stop();
                    return Err(e.into());
                }
            }
        };
        advertiser.stop();

        let Some((stream, peer)) = accepted else {
            info!("hosting cancelled");
            return Ok(None);
        };
        stream.set_nonblocking(false)?;
        info!(%peer, "peer joined");
        PeerSession::new(stream, Role::Host, &self.config).map(Some)
    }
}

/// Hosts a game: bind, advertise, wait for one peer.
pub fn host_game(config: &NetConfig) -> Result<PeerSession, NetError> {
    HostListener::bind(config)?.accept()
}

/// Listens for room adverts for `timeout` and returns the rooms seen, one per
/// sender address.
pub fn discover_rooms(config: &NetConfig, timeout: Duration) -> Result<Vec<RoomInfo>, NetError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.discovery_port)).map_err(|source| NetError::Bind {
        what: "discovery socket",
        source,
    })?;
    let deadline = Instant::now() + timeout;
    let mut rooms: BTreeMap<IpAddr, RoomInfo> = BTreeMap::new();
    let mut buf = [0u8; 64];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        socket.set_read_timeout(Some(remaining))?;
        match socket.recv_from(&mut buf) {
            Ok((n, sender)) => {
                let text = String::from_utf8_lossy(&buf[..n]);
                match RoomInfo::parse_advert(&text) {
                    Ok(advert) => {
                        let room = RoomInfo {
                            ip: sender.ip(),
                            port: advert.port,
                        };
                        if rooms.insert(sender.ip(), room).is_none() {
                            debug!(%room, "room discovered");
                        }
                    }
                    Err(e) => debug!(error = %e, %sender, "ignoring datagram"),
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(rooms.into_values().collect())
}

/// Connects to a discovered room as the client.
pub fn join_room(room: &RoomInfo, config: &NetConfig) -> Result<PeerSession, NetError> {
    let addr = room.addr();
    let stream = TcpStream::connect_timeout(&addr, config.connect_timeout)
        .map_err(|source| NetError::Connect { addr, source })?;
    info!(%addr, "joined room");
    PeerSession::new(stream, Role::Client, config)
}
