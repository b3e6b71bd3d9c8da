use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use cozy_chess::Board;

use crate::eval::EvalParams;
use crate::search::iterative::{search_it, SearchLimits};
use crate::search::lmr::LmrTable;
use crate::search::thread::ThreadData;
use crate::transposition::TranspositionTable;

const BENCH_DEPTH: i32 = 8;

const BENCH_POSITIONS: &[&str] = &[
    crate::board::STARTING_FEN,
    "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
    "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
    "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
    "r2q1rk1/ppp2ppp/3p1n2/8/2PNP3/2N5/PP3PPP/R2QK2R b KQ - 1 11",
    "6k1/R7/6K1/8/8/8/8/8 w - - 0 1",
    "8/8/4k3/8/8/3KB3/5N2/8 w - - 0 1",
];

/// Fixed-depth sweep over a small position suite; prints a stable node count
/// and the speed, which is what automated testers diff against.
pub fn bench() {
    let tt = TranspositionTable::new(16);
    let lmr = LmrTable::new();
    let params = EvalParams::default();
    let limits = SearchLimits { max_depth: Some(BENCH_DEPTH), ..Default::default() };

    let mut total_nodes = 0;
    let start = Instant::now();

    for fen in BENCH_POSITIONS {
        let board = Board::from_fen(fen, false).unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let mut td = ThreadData::new(stop, 0, &lmr, &params);
        td.prepare(&board, &[]);
        tt.age_up();

        let report = search_it(&mut td, &tt, &board, &limits, None, false);
        total_nodes += td.stats.total_nodes();
        println!("{fen}: best {} score {}", report.best_move, report.score);
    }

    let elapsed = start.elapsed().as_secs_f64();
    println!("{total_nodes} nodes {} nps", (total_nodes as f64 / elapsed) as u64);
}
