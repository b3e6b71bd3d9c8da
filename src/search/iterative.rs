use std::time::Instant;

use cozy_chess::{util::display_uci_move, Board, Move};
use itertools::Itertools;
use log::debug;

use crate::board::BoardExt;
use crate::eval::evaluate;
use crate::transposition::TranspositionTable;

use super::alpha_beta::search;
use super::thread::{SharedSearchState, ThreadData};
use super::time::Clock;
use super::{INFINITY, MATE, MATE_THRESHOLD, MAX_PLY};

#[derive(Clone, Copy, Debug, Default)]
pub struct SearchLimits {
    pub clock: Option<Clock>,
    pub max_depth: Option<i32>,
    pub max_nodes: Option<u64>,
}

#[derive(Clone, Copy, Debug)]
pub struct SearchReport {
    pub best_move: Move,
    pub score: i32,
}

/// Effective branching factor over the last two completed iterations.
fn ebf(node_counts: &[u64]) -> Option<f64> {
    let n = node_counts.len();
    if n >= 3 && node_counts[n - 3] > 0 {
        Some((node_counts[n - 1] as f64 / node_counts[n - 3] as f64).sqrt())
    } else {
        None
    }
}

fn pv_string(board: &Board, pv: &[Move]) -> String {
    let mut board = board.clone();
    pv.iter()
        .map(|&m| {
            let text = display_uci_move(&board, m).to_string();
            board.play_unchecked(m);
            text
        })
        .join(" ")
}

fn score_string(score: i32) -> String {
    if score.abs() > MATE_THRESHOLD {
        let mate_moves = (MATE - score.abs() + 1) / 2 * score.signum();
        format!("mate {mate_moves}")
    } else {
        format!("cp {score}")
    }
}

/// Iterative deepening around the alpha-beta search: each depth starts from
/// an aspiration window placed around the previous score, widened step by
/// step when the result lands outside it.
pub fn search_it(
    td: &mut ThreadData,
    tt: &TranspositionTable,
    board: &Board,
    limits: &SearchLimits,
    shared: Option<&SharedSearchState>,
    output: bool,
) -> SearchReport {
    let start = Instant::now();

    let move_list = board.legal_moves();
    let mut best_move = move_list[0];
    let mut best_score = 0;

    if move_list.len() == 1 {
        debug!("only 1 move possible ({best_move} for {board})");
        return SearchReport { best_move, score: evaluate(board, td.accumulators.top(), td.params) };
    }

    let mut alpha = -INFINITY;
    let mut beta = INFINITY;
    let mut add_alpha = 75;
    let mut add_beta = 75;
    let mut alpha_repeat = 0;
    let mut beta_repeat = 0;

    let mut max_depth = 1;
    let mut node_counts: Vec<u64> = Vec::new();
    let mut previous_node_count = 0;

    while limits.max_depth.map_or(true, |cap| max_depth <= cap) {
        let (score, cur_move) = search(td, tt, board, max_depth, alpha, beta, 0);

        if td.stopped() {
            if output {
                println!("info depth {} score {}", max_depth - 1, score_string(best_score));
            }
            break;
        }

        let cur_n_nodes = td.stats.total_nodes();
        node_counts.push(cur_n_nodes - previous_node_count);
        previous_node_count = cur_n_nodes;

        if score <= alpha {
            // Fail low: drop the lower bound, squeeze the upper one.
            if alpha_repeat >= 3 {
                alpha = -MATE;
            } else {
                beta = (alpha + beta) / 2;
                alpha = (score - add_alpha).max(-MATE);
                add_alpha += add_alpha / 15 + 1;
                alpha_repeat += 1;
            }
        } else if score >= beta {
            if beta_repeat >= 3 {
                beta = MATE;
            } else {
                alpha = (alpha + beta) / 2;
                beta = (score + add_beta).min(MATE);
                add_beta += add_beta / 15 + 1;
                beta_repeat += 1;
            }
        } else {
            if alpha != -INFINITY {
                td.stats.alpha_distance += (score - alpha).unsigned_abs() as u64;
                td.stats.n_alpha_distances += 1;
            }
            if beta != INFINITY {
                td.stats.beta_distance += (beta - score).unsigned_abs() as u64;
                td.stats.n_beta_distances += 1;
            }

            alpha_repeat = 0;
            beta_repeat = 0;
            alpha = (score - add_alpha).max(-MATE);
            beta = (score + add_beta).min(MATE);

            if let Some(m) = cur_move {
                best_move = m;
            }
            best_score = score;

            if let Some(shared) = shared {
                shared.publish(&td.stats, Some(best_move));
            }

            let elapsed_ms = start.elapsed().as_millis() as u64;
            if output {
                let use_ms = elapsed_ms.max(1);
                let ebf_str = ebf(&node_counts).map_or(String::new(), |e| format!("ebf {e:.2} "));
                println!(
                    "info depth {} score {} nodes {} {}time {} nps {} tbhits {} hashfull {} pv {}",
                    max_depth,
                    score_string(score),
                    cur_n_nodes,
                    ebf_str,
                    elapsed_ms,
                    cur_n_nodes * 1000 / use_ms,
                    td.stats.syzygy_query_hits,
                    tt.permille_filled(),
                    pv_string(board, &tt.principal_variation(board, best_move)),
                );
            }

            if let Some(clock) = limits.clock {
                let soft_stop = !clock.absolute && elapsed_ms > clock.think_ms / 2;
                let hard_stop = clock.absolute && elapsed_ms >= clock.think_ms;
                if soft_stop || hard_stop {
                    debug!("time {} is up after {elapsed_ms}", clock.think_ms);
                    break;
                }
            }

            add_alpha = 75;
            add_beta = 75;

            if max_depth == MAX_PLY {
                break;
            }
            if limits.max_nodes.is_some_and(|cap| cur_n_nodes >= cap) {
                debug!("node limit reached with {cur_n_nodes} nodes");
                break;
            }

            max_depth += 1;
        }
    }

    if td.main_thread() && output {
        td.stats.log_summary("move statistics");
    }

    SearchReport { best_move, score: best_score }
}

#[cfg(test)]
mod iterative_tests {
    use super::*;
    use crate::eval::EvalParams;
    use crate::search::lmr::LmrTable;
    use crate::search::thread::ThreadData;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn run(fen: &str, limits: SearchLimits) -> (SearchReport, TranspositionTable) {
        let board = Board::from_fen(fen, false).unwrap();
        let lmr = LmrTable::new();
        let params = EvalParams::default();
        let tt = TranspositionTable::new(8);
        let mut td = ThreadData::new(Arc::new(AtomicBool::new(false)), 0, &lmr, &params);
        td.prepare(&board, &[]);
        let report = search_it(&mut td, &tt, &board, &limits, None, false);
        (report, tt)
    }

    #[test]
    fn deepening_reaches_the_requested_depth() {
        let limits = SearchLimits { max_depth: Some(5), ..Default::default() };
        let (report, _) = run(crate::board::STARTING_FEN, limits);
        let board = Board::default();
        assert!(board.is_legal(report.best_move));
    }

    #[test]
    fn single_reply_is_played_instantly() {
        // The rook check leaves black exactly one flight square.
        let limits = SearchLimits::default();
        let (report, _) = run("R5k1/6P1/7K/8/8/8/8/8 b - - 0 1", limits);
        assert_eq!("g8f7", report.best_move.to_string());
    }

    #[test]
    fn node_cap_terminates_the_loop() {
        let limits = SearchLimits { max_nodes: Some(500), ..Default::default() };
        let (report, _) = run(crate::board::STARTING_FEN, limits);
        let board = Board::default();
        assert!(board.is_legal(report.best_move));
    }

    #[test]
    fn principal_variation_is_idempotent() {
        let limits = SearchLimits { max_depth: Some(4), ..Default::default() };
        let fen = "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 0 1";
        let (report, tt) = run(fen, limits);
        let board = Board::from_fen(fen, false).unwrap();

        let first = tt.principal_variation(&board, report.best_move);
        let second = tt.principal_variation(&board, report.best_move);
        assert!(!first.is_empty());
        assert_eq!(first, second);

        // Every PV move must be legal when replayed from the root.
        let mut replay = board.clone();
        for m in &first {
            assert!(replay.is_legal(*m), "{m} in pv");
            replay.play_unchecked(*m);
        }
    }

    #[test]
    fn mate_score_formatting() {
        assert_eq!("mate 1", score_string(MATE - 1));
        assert_eq!("mate 2", score_string(MATE - 3));
        assert_eq!("mate -1", score_string(-(MATE - 2)));
        assert_eq!("cp 150", score_string(150));
    }
}
