use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use cozy_chess::{Board, Move};

use crate::board::encode_move;
use crate::eval::nnue::Eval;
use crate::eval::EvalParams;
use crate::stats::ChessStats;
use crate::tablebase::SyzygyTables;

use super::lmr::LmrTable;
use super::SearchStack;

/// Accumulator snapshots, one per ply, pushed on make and popped on unmake so
/// the evaluator state always matches the board handed to the current frame.
#[derive(Clone)]
pub struct AccumulatorStack {
    stack: Vec<Eval>,
}

impl AccumulatorStack {
    pub fn new(base: Eval) -> Self {
        let mut stack = Vec::with_capacity(super::MAX_PLY as usize + 8);
        stack.push(base);
        Self { stack }
    }

    pub fn top(&self) -> &Eval {
        self.stack.last().unwrap()
    }

    /// Clones the top accumulator and applies `m`, which is about to be
    /// played on `board`.
    pub fn push_move(&mut self, board: &Board, m: Move) {
        let mut next = *self.top();
        next.play(board, m);
        self.stack.push(next);
    }

    pub fn pop(&mut self) {
        self.stack.pop();
    }

    pub fn reset(&mut self, base: Eval) {
        self.stack.clear();
        self.stack.push(base);
    }
}

/// Snapshot the driver publishes once per finished iteration; the statistics
/// exporter reads it on its own cadence.
#[derive(Default)]
pub struct SharedSearchState {
    pub counters: Mutex<ChessStats>,
    pub cur_move: AtomicU32,
}

impl SharedSearchState {
    pub fn publish(&self, stats: &ChessStats, best_move: Option<Move>) {
        *self.counters.lock().unwrap() = *stats;
        if let Some(m) = best_move {
            self.cur_move.store(u32::from(encode_move(m)), Ordering::Relaxed);
        }
    }
}

/// Everything one search thread owns or borrows: history, counters,
/// accumulators, the path from the root, plus handles to the shared
/// cancellation flag and read-only tables.
pub struct ThreadData<'a> {
    pub ply: i32,
    pub thread_idx: usize,

    pub stats: ChessStats,
    pub history: super::history::HistoryTable,
    pub hash_history: Vec<u64>,
    pub accumulators: AccumulatorStack,
    pub stack: SearchStack,

    pub stop: Arc<AtomicBool>,
    pub lmr: &'a LmrTable,
    pub params: &'a EvalParams,
    pub tb: Option<&'a SyzygyTables>,
}

impl<'a> ThreadData<'a> {
    pub fn new(
        stop: Arc<AtomicBool>,
        thread_idx: usize,
        lmr: &'a LmrTable,
        params: &'a EvalParams,
    ) -> Self {
        Self {
            ply: 0,
            thread_idx,
            stats: ChessStats::default(),
            history: super::history::HistoryTable::default(),
            hash_history: Vec::with_capacity(256),
            accumulators: AccumulatorStack::new(Eval::default()),
            stack: SearchStack::default(),
            stop,
            lmr,
            params,
            tb: None,
        }
    }

    pub fn main_thread(&self) -> bool {
        self.thread_idx == 0
    }

    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Prepares the thread for a search from `board`, seeding the path with
    /// the game history so repetitions across the root are seen.
    pub fn prepare(&mut self, board: &Board, game_history: &[u64]) {
        self.ply = 0;
        self.stats.reset();
        self.stack = SearchStack::default();
        self.hash_history.clear();
        self.hash_history.extend_from_slice(game_history);
        if self.hash_history.last() != Some(&board.hash()) {
            self.hash_history.push(board.hash());
        }
        self.accumulators.reset(Eval::from_board(board));
    }

    /// Twofold repetition along the path counts as a draw; the halfmove clock
    /// bounds how far back an identical position can occur.
    pub fn is_repetition(&self, board: &Board) -> bool {
        let mut seen = 0;
        for &hash in
            self.hash_history.iter().rev().take(board.halfmove_clock() as usize + 1)
        {
            if hash == board.hash() {
                seen += 1;
                if seen == 2 {
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod thread_tests {
    use super::*;

    #[test]
    fn repetition_is_found_on_the_path() {
        let lmr = LmrTable::new();
        let params = EvalParams::default();
        let mut td = ThreadData::new(Arc::new(AtomicBool::new(false)), 0, &lmr, &params);

        let mut board = Board::default();
        td.prepare(&board, &[board.hash()]);
        for m in ["g1f3", "g8f6", "f3g1", "f6g8"] {
            let m: Move = m.parse().unwrap();
            board.play_unchecked(m);
            td.hash_history.push(board.hash());
        }
        // Knights returned home: the start position occurred twice.
        assert!(td.is_repetition(&board));
    }

    #[test]
    fn accumulator_stack_restores_on_pop() {
        let board = Board::default();
        let mut stack = AccumulatorStack::new(Eval::from_board(&board));
        let before = *stack.top();
        stack.push_move(&board, "e2e4".parse().unwrap());
        stack.pop();
        assert_eq!(before, *stack.top());
    }
}
