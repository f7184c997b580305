//! Measures the search engine: raw search throughput from the opening, then
//! playing strength against a uniformly random opponent over many seeded
//! games run in parallel.

use clap::Parser;
use gomoku::difficulty::random_legal_move;
use gomoku::games::gomoku::{Board, GomokuState, Outcome, Player};
use gomoku::{SearchLimits, SearchStatistics, DEFAULT_EXPLORATION, MCTS};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Duration of the throughput search (milliseconds)
    #[arg(long, default_value_t = 3000)]
    duration_ms: u64,

    /// Thinking time per engine move in the strength games (milliseconds)
    #[arg(long, default_value_t = 100)]
    move_ms: u64,

    /// Number of engine-vs-random games
    #[arg(long, default_value_t = 16)]
    games: usize,

    /// Worker threads for the games (0 = one per logical CPU)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// UCT exploration constant
    #[arg(long, default_value_t = DEFAULT_EXPLORATION)]
    exploration: f64,

    /// Base seed; game `i` uses `seed + i`
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Result of one engine-vs-random game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GameResult {
    EngineWin,
    RandomWin,
    Draw,
}

/// Plays one game; the engine takes Black in even games and White in odd ones.
fn play_game(index: usize, args: &Args) -> (GameResult, usize) {
    let seed = args.seed.wrapping_add(index as u64);
    let mut engine = MCTS::with_seed(args.exploration, seed);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed ^ 0x9E37_79B9_7F4A_7C15);
    let engine_side = if index % 2 == 0 { Player::Black } else { Player::White };
    let limits = SearchLimits::time(Duration::from_millis(args.move_ms));

    let mut board = Board::new();
    let mut turn = Player::Black;
    let mut moves = 0;
    while !board.is_over() {
        let mv = if turn == engine_side {
            engine.search(&GomokuState::from_board(board, turn), &limits).0
        } else {
            random_legal_move(&board, &mut rng)
        };
        let Some(mv) = mv else { break };
        if let Err(e) = board.place(mv, turn) {
            warn!(game = index, %mv, error = %e, "illegal move in benchmark game");
            break;
        }
        moves += 1;
        turn = turn.opponent();
    }

    let result = match board.outcome() {
        Outcome::Win(p) if p == engine_side => GameResult::EngineWin,
        Outcome::Win(_) => GameResult::RandomWin,
        _ => GameResult::Draw,
    };
    info!(game = index, ?engine_side, ?result, moves, "game finished");
    (result, moves)
}

fn print_stats(name: &str, stats: &SearchStatistics, duration: Duration) {
    let secs = duration.as_secs_f64();
    let ips = stats.iterations as f64 / secs;

    println!("{} Results:", name);
    println!("  Iterations: {}", stats.iterations);
    println!("  Total Nodes: {}", stats.total_nodes);
    println!("  Time: {:.3}s", secs);
    println!("  Iterations/sec: {:.0}", ips);
    println!("  Root Visits: {}", stats.root_visits);
    println!("  Best Move Visits: {} (win rate {:.3})", stats.best_visits, stats.best_win_rate);
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .init();

    let threads = if args.threads == 0 { num_cpus::get() } else { args.threads };

    println!("Gomoku MCTS - Benchmark Tool");
    println!("============================");
    println!("Throughput search: {} ms", args.duration_ms);
    println!("Games: {} x {} ms per move on {} threads", args.games, args.move_ms, threads);
    println!("Exploration: {}", args.exploration);
    println!("----------------------------");

    #[cfg(debug_assertions)]
    println!("WARNING: Running in debug mode. Performance will be significantly lower.\nUse --release for accurate benchmarks.\n");

    println!("\nRunning throughput search...");
    let mut mcts = MCTS::with_seed(args.exploration, args.seed);
    let start = Instant::now();
    let (_move, stats) = mcts.search(&GomokuState::new(), &SearchLimits::time(Duration::from_millis(args.duration_ms)));
    print_stats("Search", &stats, start.elapsed());

    println!("\nPlaying {} games against a random opponent...", args.games);
    let pool = match ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Could not start the thread pool: {}", e);
            std::process::exit(1);
        }
    };
    let start = Instant::now();
    let results: Vec<(GameResult, usize)> = pool.install(|| (0..args.games).into_par_iter().map(|i| play_game(i, &args)).collect());
    let elapsed = start.elapsed();

    let count = |r: GameResult| results.iter().filter(|(res, _)| *res == r).count();
    let wins = count(GameResult::EngineWin);
    let losses = count(GameResult::RandomWin);
    let draws = count(GameResult::Draw);
    let avg_moves = results.iter().map(|(_, m)| *m).sum::<usize>() as f64 / results.len().max(1) as f64;

    println!("Strength Results:");
    println!("  Engine wins: {}", wins);
    println!("  Random wins: {}", losses);
    println!("  Draws: {}", draws);
    println!("  Win rate: {:.1}%", 100.0 * wins as f64 / results.len().max(1) as f64);
    println!("  Average game length: {:.1} moves", avg_moves);
    println!("  Wall time: {:.3}s", elapsed.as_secs_f64());
}
