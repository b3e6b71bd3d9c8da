use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use cozy_chess::util::{display_uci_move, parse_uci_move};
use cozy_chess::Board;
use itertools::Itertools;
use log::{debug, info, warn};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::board::BoardExt;
use crate::book::PolyglotBook;
use crate::eval::{nnue, EvalParams};
use crate::exporter::StateExporter;
use crate::search::history::HistoryTable;
use crate::search::iterative::{search_it, SearchLimits};
use crate::search::lmr::LmrTable;
use crate::search::thread::{SharedSearchState, ThreadData};
use crate::search::time::{think_time, Clock, Timekeeper};
use crate::stats::ChessStats;
use crate::tablebase::SyzygyTables;
use crate::transposition::{TranspositionTable, DEFAULT_TABLE_MB};

const NAME: &str = concat!("Sable ", env!("CARGO_PKG_VERSION"));
const DEFAULT_EVAL_FILE: &str = "sable.nnue";
const EXPORT_HZ: u32 = 25;

pub struct Engine {
    tt: TranspositionTable,
    params: EvalParams,
    lmr: LmrTable,
    stop: Arc<AtomicBool>,
    timekeeper: Timekeeper,

    board: Board,
    game_history: Vec<u64>,

    threads: usize,
    histories: Vec<HistoryTable>,

    book: Option<PolyglotBook>,
    tb: Option<SyzygyTables>,
    rng: SmallRng,

    shared: Arc<SharedSearchState>,
    exporter: Option<StateExporter>,
}

impl Engine {
    pub fn new() -> Self {
        let board = Board::default();
        let game_history = vec![board.hash()];
        let shared = Arc::new(SharedSearchState::default());
        let exporter = Some(StateExporter::start(
            std::env::temp_dir().join("sable-stats"),
            EXPORT_HZ,
            Arc::clone(&shared),
        ));

        let mut engine = Self {
            tt: TranspositionTable::new(DEFAULT_TABLE_MB),
            params: EvalParams::default(),
            lmr: LmrTable::new(),
            stop: Arc::new(AtomicBool::new(false)),
            timekeeper: Timekeeper::new(),
            board,
            game_history,
            threads: 1,
            histories: vec![HistoryTable::default()],
            book: None,
            tb: None,
            rng: SmallRng::from_entropy(),
            shared,
            exporter,
        };
        engine.load_network(Path::new(DEFAULT_EVAL_FILE), false);
        engine
    }

    /// A wrong-size blob means a file that was never produced for this
    /// network shape; that is fatal. A missing file just disables the
    /// network and leaves the classical evaluator in charge.
    fn load_network(&mut self, path: &Path, explicit: bool) {
        match nnue::load(path) {
            Ok(()) => info!("network loaded from {}", path.display()),
            Err(e @ nnue::NnueError::BadSize { .. }) => {
                eprintln!("fatal: {e}");
                exit(1);
            }
            Err(e) => {
                if explicit {
                    println!("info string eval file {}: {e}", path.display());
                }
                debug!("no network ({e}); using the classical evaluator");
            }
        }
    }

    fn set_position(&mut self, tokens: &[&str]) {
        let mut board = Board::default();
        let mut moves_at = None;

        if tokens.get(1) == Some(&"fen") {
            let fen_end = tokens.iter().position(|&t| t == "moves").unwrap_or(tokens.len());
            let fen = tokens[2..fen_end].join(" ");
            match Board::from_fen(&fen, false) {
                Ok(b) => board = b,
                Err(e) => {
                    warn!("bad fen '{fen}': {e:?}");
                    return;
                }
            }
            moves_at = (fen_end < tokens.len()).then_some(fen_end + 1);
        } else if tokens.get(1) == Some(&"startpos") {
            moves_at = (tokens.get(2) == Some(&"moves")).then_some(3);
        }

        self.game_history = vec![board.hash()];
        if let Some(at) = moves_at {
            for text in &tokens[at..] {
                match parse_uci_move(&board, text) {
                    Ok(m) => {
                        board.play_unchecked(m);
                        self.game_history.push(board.hash());
                    }
                    Err(_) => {
                        warn!("dropping unparseable move '{text}'");
                        break;
                    }
                }
            }
        }
        self.board = board;
    }

    fn set_option(&mut self, tokens: &[&str]) {
        let Some(name_at) = tokens.iter().position(|&t| t == "name") else { return };
        let value_at = tokens.iter().position(|&t| t == "value");
        let name = tokens[name_at + 1..value_at.unwrap_or(tokens.len())].join(" ");
        let value = value_at.map_or(String::new(), |at| tokens[at + 1..].join(" "));

        match name.as_str() {
            "Hash" => {
                if let Ok(mb) = value.parse::<usize>() {
                    self.tt.resize(mb.clamp(1, 65536));
                }
            }
            "Threads" => {
                if let Ok(n) = value.parse::<usize>() {
                    self.threads = n.clamp(1, 256);
                    self.histories.resize_with(self.threads, HistoryTable::default);
                }
            }
            "BookFile" => {
                self.book = if value.is_empty() {
                    None
                } else {
                    match PolyglotBook::open(Path::new(&value)) {
                        Ok(book) => {
                            info!("book {} with {} entries", value, book.len());
                            Some(book)
                        }
                        Err(e) => {
                            println!("info string book {value}: {e}");
                            None
                        }
                    }
                };
            }
            "SyzygyPath" => {
                self.tb = if value.is_empty() { None } else { SyzygyTables::load(&value) };
                if !value.is_empty() && self.tb.is_none() {
                    println!("info string no tablebase files under {value}");
                }
            }
            "EvalFile" => {
                if !value.is_empty() {
                    self.load_network(Path::new(&value), true);
                }
            }
            "StatsFile" => {
                if self.exporter.take().is_some() {
                    debug!("stats exporter stopped");
                }
                if !value.is_empty() {
                    self.exporter = Some(StateExporter::start(
                        PathBuf::from(value),
                        EXPORT_HZ,
                        Arc::clone(&self.shared),
                    ));
                }
            }
            _ => debug!("option {name} not handled"),
        }
    }

    fn parse_go(&self, tokens: &[&str]) -> SearchLimits {
        let mut limits = SearchLimits::default();
        let mut wtime: Option<u64> = None;
        let mut btime: Option<u64> = None;
        let mut winc: u64 = 0;
        let mut binc: u64 = 0;
        let mut movestogo: i32 = 0;

        for (key, value) in tokens.iter().skip(1).tuples() {
            match (*key, value.parse::<i64>()) {
                ("wtime", Ok(v)) => wtime = Some(v.max(0) as u64),
                ("btime", Ok(v)) => btime = Some(v.max(0) as u64),
                ("winc", Ok(v)) => winc = v.max(0) as u64,
                ("binc", Ok(v)) => binc = v.max(0) as u64,
                ("movestogo", Ok(v)) => movestogo = v as i32,
                ("movetime", Ok(v)) => {
                    limits.clock = Some(Clock { think_ms: v.max(0) as u64, absolute: true });
                }
                ("depth", Ok(v)) => limits.max_depth = Some((v as i32).clamp(1, 127)),
                ("nodes", Ok(v)) => limits.max_nodes = Some(v.max(0) as u64),
                _ => {}
            }
        }

        if limits.clock.is_none() {
            let (my_time, my_inc) = match self.board.side_to_move() {
                cozy_chess::Color::White => (wtime, winc),
                cozy_chess::Color::Black => (btime, binc),
            };
            if let Some(my_time) = my_time {
                limits.clock =
                    Some(Clock { think_ms: think_time(my_time, my_inc, movestogo), absolute: false });
            }
        }
        limits
    }

    fn go(&mut self, tokens: &[&str], input: &Receiver<String>) {
        self.stop.store(false, Ordering::Relaxed);
        self.tt.age_up();

        // Book first, then the tablebases, then the search proper.
        if let Some(book) = &self.book {
            if let Some(m) = book.query(&self.board, &mut self.rng) {
                println!("bestmove {}", display_uci_move(&self.board, m));
                return;
            }
        }
        if let Some(tb) = &self.tb {
            if self.board.occupied().len() as usize <= tb.max_pieces() {
                if let Some((m, score)) = tb.probe_root(&self.board) {
                    println!("info depth 1 score cp {score} tbhits 1");
                    println!("bestmove {}", display_uci_move(&self.board, m));
                    return;
                }
            }
        }

        if !self.board.has_legal_moves() {
            println!("info string no legal moves");
            println!("bestmove 0000");
            return;
        }

        let limits = self.parse_go(tokens);
        let timer = limits
            .clock
            .filter(|c| c.think_ms > 0)
            .map(|c| self.timekeeper.start(c.think_ms, Arc::clone(&self.stop)));

        let mut tds: Vec<ThreadData> = (0..self.threads)
            .map(|i| {
                let mut td = ThreadData::new(Arc::clone(&self.stop), i, &self.lmr, &self.params);
                td.tb = self.tb.as_ref();
                td.history = std::mem::take(&mut self.histories[i]);
                td.prepare(&self.board, &self.game_history);
                td
            })
            .collect();

        let board = self.board.clone();
        let tt = &self.tt;
        let report = std::thread::scope(|s| {
            let board = &board;
            let limits = &limits;
            let (main_td, workers) = tds.split_first_mut().unwrap();
            for td in workers.iter_mut() {
                s.spawn(move || {
                    search_it(td, tt, board, limits, None, false);
                });
            }
            let shared = Arc::clone(&self.shared);
            let stop = Arc::clone(&self.stop);
            let main = s.spawn(move || {
                let report = search_it(main_td, tt, board, limits, Some(shared.as_ref()), true);
                // Main thread done: wave the workers off.
                stop.store(true, Ordering::Relaxed);
                report
            });

            // Stay responsive on stdin while the search runs.
            loop {
                if main.is_finished() {
                    break main.join().unwrap();
                }
                match input.recv_timeout(Duration::from_millis(10)) {
                    Ok(line) => match line.trim() {
                        "stop" => {
                            self.stop.store(true, Ordering::Relaxed);
                            self.timekeeper.wake();
                        }
                        "isready" => println!("readyok"),
                        "quit" => exit(0),
                        other => debug!("ignored during search: {other}"),
                    },
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        self.stop.store(true, Ordering::Relaxed);
                    }
                }
            }
        });

        self.timekeeper.wake();
        if let Some(timer) = timer {
            timer.join().ok();
        }

        let mut summed = ChessStats::default();
        for td in &tds {
            summed.add(&td.stats);
        }
        self.shared.publish(&summed, Some(report.best_move));

        for (i, td) in tds.into_iter().enumerate() {
            self.histories[i] = td.history;
        }

        println!("bestmove {}", display_uci_move(&self.board, report.best_move));
    }

    fn new_game(&mut self) {
        self.tt.clear();
        for history in &mut self.histories {
            history.clear();
        }
        self.board = Board::default();
        self.game_history = vec![self.board.hash()];
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Main loop that handles UCI communication with GUIs.
pub fn main_loop() -> ! {
    let (tx, rx) = std::sync::mpsc::channel::<String>();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let mut engine = Engine::new();

    loop {
        let Ok(line) = rx.recv() else { exit(0) };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.first().copied() {
            Some("uci") => {
                println!("id name {NAME}");
                println!("id author the Sable authors");
                println!("option name Hash type spin default {DEFAULT_TABLE_MB} min 1 max 65536");
                println!("option name Threads type spin default 1 min 1 max 256");
                println!("option name BookFile type string default <empty>");
                println!("option name SyzygyPath type string default <empty>");
                println!("option name EvalFile type string default {DEFAULT_EVAL_FILE}");
                println!("option name StatsFile type string default <empty>");
                println!("uciok");
            }
            Some("isready") => println!("readyok"),
            Some("ucinewgame") => engine.new_game(),
            Some("position") => engine.set_position(&tokens),
            Some("setoption") => engine.set_option(&tokens),
            Some("go") => engine.go(&tokens, &rx),
            Some("stop") => {
                engine.stop.store(true, Ordering::Relaxed);
                engine.timekeeper.wake();
            }
            Some("d") => println!("{}", engine.board),
            Some("quit") => exit(0),
            Some(_) | None => {
                // Malformed lines are dropped.
            }
        }
    }
}
