use cozy_chess::Board;

use crate::board::BoardExt;
use crate::eval::evaluate;
use crate::search::ordering::MoveList;

use super::thread::ThreadData;
use super::{MATE, MATE_THRESHOLD, MAX_PLY};

/// Captures-and-promotions search below the main search's leaves; all
/// evasions are searched when in check.
pub fn qs(td: &mut ThreadData, board: &Board, mut alpha: i32, beta: i32) -> i32 {
    if td.stopped() {
        return 0;
    }

    if td.ply >= MAX_PLY {
        return evaluate(board, td.accumulators.top(), td.params);
    }

    td.stats.qnodes += 1;

    if board.halfmove_clock() >= 100 || td.is_repetition(board) || board.insufficient_material() {
        return 0;
    }

    let in_check = board.in_check();
    let mut best_score = -32767;

    if !in_check {
        // Standing pat: the side to move may simply decline to capture.
        best_score = evaluate(board, td.accumulators.top(), td.params);
        if best_score > alpha && best_score >= beta {
            td.stats.n_standing_pat += 1;
            return best_score;
        }

        let mut big_delta = td.params.big_delta;
        if td.stack.prev_move(td.ply).is_some_and(|m| m.promotion.is_some()) {
            big_delta += td.params.big_delta_promotion;
        }
        if best_score < alpha - big_delta {
            return alpha;
        }
        alpha = alpha.max(best_score);
    }

    let moves = board.qs_moves();
    let mut list = MoveList::scored(board, &moves, &[], &td.history, td.params);

    let mut n_played: u64 = 0;
    while let Some(entry) = list.next() {
        let m = entry.m;

        // Skip a capture when the capturer outranks the victim and the
        // square is defended; the exchange can only lose material.
        if !in_check {
            if let Some(victim) = board.victim(m) {
                let mover = board.piece_on(m.from).map_or(0, |p| td.params.piece(p));
                let defended = !board
                    .attackers_to(m.to, !board.side_to_move(), board.occupied())
                    .is_empty();
                if mover > td.params.piece(victim) && defended {
                    continue;
                }
            }
        }

        n_played += 1;

        let mut child = board.clone();
        td.accumulators.push_move(board, m);
        child.play_unchecked(m);
        td.stack[td.ply].played_move = Some(m);
        td.hash_history.push(child.hash());
        td.ply += 1;

        let score = -qs(td, &child, -beta, -alpha);

        td.ply -= 1;
        td.hash_history.pop();
        td.accumulators.pop();

        if score > best_score {
            best_score = score;

            if score > alpha {
                if score >= beta {
                    td.stats.n_qmoves_cutoff += n_played;
                    td.stats.nmc_qnodes += 1;
                    break;
                }
                alpha = score;
            }
        }

        // A mate-sized score after a few tries will not be improved upon.
        if n_played >= 3 && best_score >= MATE_THRESHOLD {
            td.stats.n_qs_early_stop += 1;
            break;
        }
    }

    if n_played == 0 {
        if in_check {
            best_score = -MATE + td.ply;
        } else if best_score == -32767 {
            best_score = evaluate(board, td.accumulators.top(), td.params);
        }
    }

    best_score
}

#[cfg(test)]
mod qs_tests {
    use super::*;
    use crate::eval::EvalParams;
    use crate::search::lmr::LmrTable;
    use crate::search::INFINITY;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn run(fen: &str) -> i32 {
        let board = Board::from_fen(fen, false).unwrap();
        let lmr = LmrTable::new();
        let params = EvalParams::default();
        let mut td = ThreadData::new(Arc::new(AtomicBool::new(false)), 0, &lmr, &params);
        td.prepare(&board, &[]);
        qs(&mut td, &board, -INFINITY, INFINITY)
    }

    #[test]
    fn hanging_queen_is_taken() {
        // White rook takes the undefended queen and comes out well ahead.
        let score = run("4k3/8/8/3q4/3R4/8/8/4K3 w - - 0 1");
        assert!(score > 500, "{score}");
    }

    #[test]
    fn checkmate_in_quiescence() {
        // Doubled rooks deliver a back-rank mate; black has no evasion.
        let score = run("7k/8/8/8/8/8/8/K5RR b - - 0 1");
        assert_eq!(-MATE, score);
    }

    #[test]
    fn quiet_position_stands_pat() {
        let board = Board::default();
        let lmr = LmrTable::new();
        let params = EvalParams::default();
        let mut td = ThreadData::new(Arc::new(AtomicBool::new(false)), 0, &lmr, &params);
        td.prepare(&board, &[]);
        let score = qs(&mut td, &board, -INFINITY, INFINITY);
        assert_eq!(evaluate(&board, td.accumulators.top(), &params), score);
    }
}
