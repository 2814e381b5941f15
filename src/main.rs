use std::cell::RefCell;
use std::error::Error;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use uci_session::config::parse_assignment;
use uci_session::{
    EngineConfig, EngineSession, EventKind, Position, SessionEvent, SessionOptions, SessionState,
    TransportTarget,
};

/// Host tick between queue drains
const TICK: Duration = Duration::from_millis(16);

/// Analyse one position with a UCI engine and print its best move.
#[derive(Debug, Parser)]
#[command(name = "uci-session", version)]
struct Args {
    /// Engine executable path, or tcp://host:port
    #[arg(short, long)]
    engine: TransportTarget,

    /// Position to analyse (defaults to the start position)
    #[arg(long)]
    fen: Option<String>,

    /// Moves played from the position, in coordinate notation
    #[arg(long, num_args = 1..)]
    moves: Vec<String>,

    #[arg(short, long)]
    depth: Option<i64>,

    #[arg(long)]
    elo: Option<i64>,

    #[arg(long)]
    threads: Option<i64>,

    #[arg(long)]
    hash: Option<i64>,

    /// Extra engine setting as name=value (repeatable)
    #[arg(short = 'o', long = "option")]
    options: Vec<String>,

    /// Give up if no best move arrives within this many seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

impl Args {
    fn engine_config(&self) -> Result<EngineConfig, Box<dyn Error>> {
        let mut config = EngineConfig::new();
        if let Some(depth) = self.depth {
            config = config.with_depth(depth);
        }
        if let Some(elo) = self.elo {
            config = config.with_elo_rating(elo).with_limit_strength(true);
        }
        if let Some(threads) = self.threads {
            config = config.with_threads(threads);
        }
        if let Some(hash) = self.hash {
            config = config.with_hash_mb(hash);
        }
        for assignment in &self.options {
            let (name, value) = parse_assignment(assignment)?;
            config.set_option(&name, &value)?;
        }
        Ok(config)
    }

    fn position(&self) -> Position {
        let base = match &self.fen {
            Some(fen) => Position::fen(fen.as_str()),
            None => Position::startpos(),
        };
        base.with_moves(self.moves.iter().cloned())
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.engine_config()?;
    let mut session = EngineSession::new(SessionOptions::new(args.engine.clone()));
    session.stage_config(config)?;

    let best = Rc::new(RefCell::new(None));
    let failure = Rc::new(RefCell::new(None));
    session.subscribe(EventKind::Evaluation, |event| {
        if let SessionEvent::Evaluation(score) = event {
            println!("info eval {score:.3}");
        }
    });
    {
        let best = Rc::clone(&best);
        session.subscribe(EventKind::BestMove, move |event| {
            if let SessionEvent::BestMove { mv, ponder } = event {
                *best.borrow_mut() = Some((mv.clone(), ponder.clone()));
            }
        });
    }
    {
        let failure = Rc::clone(&failure);
        session.subscribe(EventKind::Error, move |event| {
            if let SessionEvent::Error(err) = event {
                *failure.borrow_mut() = Some(err.clone());
            }
        });
    }

    session.start()?;
    let deadline = Instant::now() + Duration::from_secs(args.timeout_secs);
    let mut searching = false;
    let outcome: Result<(String, Option<String>), Box<dyn Error>> = loop {
        session.poll();
        if let Some(err) = failure.borrow_mut().take() {
            break Err(err.into());
        }
        if let Some(found) = best.borrow_mut().take() {
            break Ok(found);
        }
        if !searching && session.state() == SessionState::Ready {
            if let Some(name) = session.engine_name() {
                println!("info engine {name}");
            }
            session.set_position(args.position())?;
            session.find_best_move()?;
            searching = true;
        }
        if Instant::now() >= deadline {
            break Err(format!("no best move within {}s", args.timeout_secs).into());
        }
        thread::sleep(TICK);
    };
    session.shutdown();

    let (mv, ponder) = outcome?;
    match ponder {
        Some(ponder) => println!("bestmove {mv} ponder {ponder}"),
        None => println!("bestmove {mv}"),
    }
    Ok(())
}
