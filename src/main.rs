//! # Gomoku LAN - terminal shell
//!
//! Plays five-in-a-row from the terminal: hot-seat, against the MCTS engine,
//! or against another instance on the local network.
//!
//! ## Usage
//! ```text
//! play local
//! play ai --difficulty medium
//! play --oracle "python3 oracle.py" ai --difficulty hard
//! play host                # advertise a room and wait for a peer
//! play discover            # list rooms on the LAN
//! play join --index 0      # join the first room found
//! ```
//!
//! While playing, type `row,col` to place a stone, `undo`, `yes`/`no` to
//! answer an undo request from the peer, `new` for a new game and `quit`.
//!
//! Run with `cargo run --release` for best performance.

use clap::{Parser, Subcommand};
use colored::Colorize;
use gomoku::config::{EngineConfig, NetConfig, DISCOVERY_PORT};
use gomoku::difficulty::DifficultyLevel;
use gomoku::game_controller::{GameController, MoveResult, PlayMode};
use gomoku::games::gomoku::{Board, GomokuMove, Outcome, Player, Stone, BOARD_SIZE};
use gomoku::net::{LanGame, Lobby, LobbyStatus, RoomInfo, SyncEvent, SyncState};
use gomoku::DEFAULT_EXPLORATION;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// UCT exploration constant
    #[arg(long, default_value_t = DEFAULT_EXPLORATION)]
    exploration: f64,

    /// Thinking time at Easy difficulty (milliseconds)
    #[arg(long, default_value_t = 1000)]
    easy_ms: u64,

    /// Thinking time at Medium difficulty (milliseconds)
    #[arg(long, default_value_t = 3000)]
    medium_ms: u64,

    /// Command line of the Hard-difficulty oracle, e.g. "python3 oracle.py"
    #[arg(long)]
    oracle: Option<String>,

    /// Fixed seed for the search RNG
    #[arg(long)]
    seed: Option<u64>,

    /// UDP port rooms are advertised on
    #[arg(long, default_value_t = DISCOVERY_PORT)]
    discovery_port: u16,

    /// Read deadline of the network receive task (milliseconds)
    #[arg(long, default_value_t = 1000)]
    read_timeout_ms: u64,

    /// Keep all networking on 127.0.0.1 (two instances on one machine)
    #[arg(long, default_value_t = false)]
    loopback: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Two players on one keyboard
    Local,
    /// Play Black against the computer
    Ai {
        #[arg(short, long, value_enum, default_value_t = DifficultyLevel::Easy)]
        difficulty: DifficultyLevel,
    },
    /// Host a LAN game and wait for one peer
    Host,
    /// List the rooms currently advertised on the LAN
    Discover,
    /// Join a LAN game
    Join {
        /// Which discovered room to join (asked interactively when omitted)
        #[arg(long)]
        index: Option<usize>,
        /// Join this "<ip>:<port>" directly instead of discovering
        #[arg(long)]
        addr: Option<String>,
    },
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        let oracle_command = self
            .oracle
            .as_deref()
            .map(|cmd| cmd.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|parts| !parts.is_empty());
        EngineConfig {
            exploration_parameter: self.exploration,
            easy_time: Duration::from_millis(self.easy_ms),
            medium_time: Duration::from_millis(self.medium_ms),
            oracle_command,
            seed: self.seed,
        }
    }

    fn net_config(&self) -> NetConfig {
        let mut config = if self.loopback {
            NetConfig::loopback(self.discovery_port)
        } else {
            NetConfig::default().with_discovery_port(self.discovery_port)
        };
        config.read_timeout = Duration::from_millis(self.read_timeout_ms);
        config
    }
}

/// One line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Move(GomokuMove),
    Undo,
    Yes,
    No,
    New,
    Quit,
    Unknown(String),
}

impl Input {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        match line.to_ascii_lowercase().as_str() {
            "undo" | "u" => Input::Undo,
            "yes" | "y" => Input::Yes,
            "no" | "n" => Input::No,
            "new" => Input::New,
            "quit" | "q" | "exit" => Input::Quit,
            _ => line
                .parse::<GomokuMove>()
                .map(Input::Move)
                .unwrap_or_else(|_| Input::Unknown(line.to_string())),
        }
    }
}

/// Reads stdin on its own thread so the game loop can keep polling.
fn spawn_input_reader() -> Receiver<Input> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            if tx.send(Input::parse(&line)).is_err() {
                break;
            }
        }
        // EOF counts as quitting.
        let _ = tx.send(Input::Quit);
    });
    rx
}

fn render(board: &Board, last: Option<GomokuMove>) {
    let mut out = String::from("\n   ");
    for c in 0..BOARD_SIZE {
        out.push_str(&format!("{:>3}", c));
    }
    out.push('\n');
    for r in 0..BOARD_SIZE as u8 {
        out.push_str(&format!("{:>3}", r));
        for c in 0..BOARD_SIZE as u8 {
            let mv = GomokuMove(r, c);
            let cell = match board.get(mv) {
                Stone::Empty => ".".dimmed(),
                Stone::Black => "X".bright_white().bold(),
                Stone::White => "O".yellow().bold(),
            };
            let cell = if Some(mv) == last { cell.on_blue() } else { cell };
            out.push_str(&format!("  {}", cell));
        }
        out.push('\n');
    }
    print!("{}", out);
    let _ = io::stdout().flush();
}

fn announce_outcome(outcome: Outcome) {
    match outcome {
        Outcome::Win(player) => println!("{}", format!("{} wins! Type `new` to play again.", player).green().bold()),
        Outcome::Draw => println!("{}", "Draw. Type `new` to play again.".green().bold()),
        Outcome::InProgress => {}
    }
}

fn prompt(text: &str) {
    println!("{}", text.cyan());
}

fn run_local(mode: PlayMode, config: EngineConfig, input: &Receiver<Input>) {
    let mut controller = GameController::new(mode, config.clone());
    render(controller.board(), None);
    prompt("Black (X) to move. Enter row,col.");

    loop {
        if let Some(MoveResult::Success { move_made, player, outcome }) = controller.tick() {
            render(controller.board(), Some(move_made));
            println!("Computer ({}) played {}", player, move_made);
            if let Some(stats) = controller.last_search_stats() {
                tracing::info!(iterations = stats.iterations, win_rate = stats.best_win_rate, "computer move");
            }
            announce_outcome(outcome);
        }

        match input.recv_timeout(POLL_INTERVAL) {
            Ok(Input::Move(mv)) => match controller.request_move(mv.row(), mv.col()) {
                MoveResult::Success { move_made, outcome, .. } => {
                    render(controller.board(), Some(move_made));
                    announce_outcome(outcome);
                    if !outcome.is_over() {
                        if controller.is_ai_move_complete() {
                            prompt(&format!("{} to move.", controller.current_player()));
                        } else {
                            prompt("Computer is thinking...");
                        }
                    }
                }
                MoveResult::Invalid { reason } => println!("{}", reason.to_string().red()),
            },
            Ok(Input::Undo) => {
                let undone = controller.undo();
                if undone.is_empty() {
                    println!("{}", "Nothing to undo.".red());
                } else {
                    render(controller.board(), controller.last_move().map(|e| e.move_made));
                    prompt(&format!("Took back {} move(s). {} to move.", undone.len(), controller.current_player()));
                }
            }
            Ok(Input::New) => {
                controller.reset(mode, config.clone());
                render(controller.board(), None);
                prompt("New game. Black (X) to move.");
            }
            Ok(Input::Quit) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(Input::Yes) | Ok(Input::No) => println!("{}", "No undo request is pending.".red()),
            Ok(Input::Unknown(text)) => println!("{}", format!("Unrecognised input: {}", text).red()),
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}

fn describe_turn(game: &LanGame) {
    if game.outcome().is_over() {
        return;
    }
    if game.is_my_turn() {
        prompt(&format!("Your turn ({}). Enter row,col.", game.local_player()));
    } else {
        prompt(&format!("Waiting for {}...", game.turn()));
    }
}

fn run_lan(mut game: LanGame, input: &Receiver<Input>) {
    println!("Connected. You play {}.", game.local_player().to_string().bold());
    render(game.board(), None);
    describe_turn(&game);

    loop {
        for event in game.poll() {
            match event {
                SyncEvent::MovePlayed { mv, player, outcome } => {
                    render(game.board(), Some(mv));
                    println!("{} played {}", player, mv);
                    announce_outcome(outcome);
                    describe_turn(&game);
                }
                SyncEvent::UndoRequested => prompt("Opponent asks to take back their move. Allow? (yes/no)"),
                SyncEvent::UndoApplied { mv } => {
                    render(game.board(), game.history().last().copied());
                    println!("Undo accepted: {} removed.", mv);
                    describe_turn(&game);
                }
                SyncEvent::NewGame => {
                    println!("Opponent started a new game.");
                    render(game.board(), None);
                    describe_turn(&game);
                }
                SyncEvent::UndoRejected => {
                    println!("{}", "Undo rejected.".red());
                    describe_turn(&game);
                }
                SyncEvent::PeerDisconnected { reason } => {
                    println!("{}", format!("Opponent disconnected: {}", reason).red().bold());
                }
            }
        }
        if game.is_disconnected() {
            break;
        }

        match input.recv_timeout(POLL_INTERVAL) {
            Ok(Input::Move(mv)) => {
                if game.request_move(mv.row(), mv.col()) {
                    render(game.board(), Some(mv));
                    announce_outcome(game.outcome());
                    describe_turn(&game);
                } else {
                    println!("{}", "Move not accepted.".red());
                }
            }
            Ok(Input::Undo) => {
                if game.request_undo() {
                    prompt("Undo requested, waiting for the opponent...");
                } else {
                    println!("{}", "You can only ask to undo your opponent's last move.".red());
                }
            }
            Ok(answer @ (Input::Yes | Input::No)) => {
                let accept = answer == Input::Yes;
                if game.respond_undo(accept) {
                    if accept {
                        render(game.board(), game.history().last().copied());
                    }
                    describe_turn(&game);
                } else {
                    println!("{}", "No undo request is pending.".red());
                }
            }
            Ok(Input::New) => {
                if game.new_game() {
                    render(game.board(), None);
                    describe_turn(&game);
                } else {
                    println!("{}", "Finish this game first.".red());
                }
            }
            Ok(Input::Quit) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(Input::Unknown(text)) => println!("{}", format!("Unrecognised input: {}", text).red()),
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    if game.state() != SyncState::PeerDisconnected {
        println!("Leaving the game.");
    }
    game.close();
}

/// Polls the lobby until its background operation finishes. Returns `None` if
/// the user quit first.
fn wait_lobby(lobby: &mut Lobby, input: &Receiver<Input>) -> Option<LobbyStatus> {
    let mut announced = LobbyStatus::Idle;
    loop {
        let busy = lobby.is_busy();
        let status = lobby.status();
        if status != announced {
            match &status {
                LobbyStatus::Hosting(room) => prompt(&format!("Hosting room {}; waiting for a player (quit to cancel)...", room)),
                LobbyStatus::Searching => prompt("Searching for rooms..."),
                LobbyStatus::Joining(room) => prompt(&format!("Joining {}...", room)),
                _ => {}
            }
            announced = status.clone();
        }
        if !busy {
            return Some(status);
        }
        if let Ok(Input::Quit) = input.recv_timeout(POLL_INTERVAL) {
            lobby.cancel();
            return None;
        }
    }
}

fn print_rooms(rooms: &[RoomInfo]) {
    if rooms.is_empty() {
        println!("No rooms found.");
    }
    for (i, room) in rooms.iter().enumerate() {
        println!("  [{}] {}", i, room);
    }
}

/// Asks the user to pick a room by index.
fn choose_room(rooms: &[RoomInfo], input: &Receiver<Input>) -> Option<RoomInfo> {
    if rooms.len() == 1 {
        return rooms.first().copied();
    }
    prompt("Enter the number of the room to join:");
    loop {
        match input.recv() {
            Ok(Input::Quit) | Err(_) => return None,
            Ok(Input::Unknown(text)) => match text.parse::<usize>().ok().and_then(|i| rooms.get(i)) {
                Some(room) => return Some(*room),
                None => println!("{}", "Pick one of the listed numbers.".red()),
            },
            Ok(_) => println!("{}", "Pick one of the listed numbers.".red()),
        }
    }
}

fn finish_connect(lobby: &mut Lobby, status: LobbyStatus, input: &Receiver<Input>) {
    match status {
        LobbyStatus::Connected => match lobby.take_session() {
            Some(session) => run_lan(LanGame::new(session), input),
            None => println!("{}", "Connection was lost before the game started.".red()),
        },
        LobbyStatus::Failed(reason) => println!("{}", format!("Network error: {}", reason).red()),
        _ => {}
    }
}

fn run_join(lobby: &mut Lobby, index: Option<usize>, addr: Option<String>, input: &Receiver<Input>) {
    let room = match addr {
        Some(addr) => match RoomInfo::parse_advert(&addr) {
            Ok(room) => room,
            Err(e) => {
                println!("{}", e.to_string().red());
                return;
            }
        },
        None => {
            lobby.discover();
            let rooms = match wait_lobby(lobby, input) {
                Some(LobbyStatus::Rooms(rooms)) => rooms,
                Some(LobbyStatus::Failed(reason)) => {
                    println!("{}", format!("Discovery failed: {}", reason).red());
                    return;
                }
                _ => return,
            };
            print_rooms(&rooms);
            let picked = match index {
                Some(i) => rooms.get(i).copied(),
                None => choose_room(&rooms, input),
            };
            let Some(room) = picked else {
                return;
            };
            room
        }
    };

    lobby.join(room);
    if let Some(status) = wait_lobby(lobby, input) {
        finish_connect(lobby, status, input);
    }
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .init();

    let engine_config = args.engine_config();
    let net_config = args.net_config();
    let input = spawn_input_reader();

    match args.command {
        Command::Local => run_local(PlayMode::HumanVsHuman, engine_config, &input),
        Command::Ai { difficulty } => {
            if difficulty == DifficultyLevel::Hard && engine_config.oracle_command.is_none() {
                println!("{}", "No --oracle given; Hard will play random moves.".yellow());
            }
            println!("You play {} against the computer ({:?}).", Player::Black, difficulty);
            run_local(PlayMode::HumanVsAi(difficulty), engine_config, &input)
        }
        Command::Host => {
            let mut lobby = Lobby::new(net_config);
            lobby.host();
            if let Some(status) = wait_lobby(&mut lobby, &input) {
                finish_connect(&mut lobby, status, &input);
            }
        }
        Command::Discover => {
            let mut lobby = Lobby::new(net_config);
            lobby.discover();
            match wait_lobby(&mut lobby, &input) {
                Some(LobbyStatus::Rooms(rooms)) => print_rooms(&rooms),
                Some(LobbyStatus::Failed(reason)) => println!("{}", format!("Discovery failed: {}", reason).red()),
                _ => {}
            }
        }
        Command::Join { index, addr } => {
            let mut lobby = Lobby::new(net_config);
            run_join(&mut lobby, index, addr, &input);
        }
    }
}
