use arrayvec::ArrayVec;
use cozy_chess::{Board, Move};

use crate::board::{decode_legal, BoardExt, MAX_MOVES};
use crate::eval::evaluate;
use crate::transposition::{eval_from_tt, eval_to_tt, Flag, TranspositionTable};

use super::ordering::MoveList;
use super::quiescence::qs;
use super::thread::ThreadData;
use super::{INFINITY, MATE, MATE_THRESHOLD};

/// Principal-variation alpha-beta. Returns the score of the position and the
/// best move found at this node (the root keeps it; inner nodes store it in
/// the transposition table).
pub fn search(
    td: &mut ThreadData,
    tt: &TranspositionTable,
    board: &Board,
    mut depth: i32,
    mut alpha: i32,
    beta: i32,
    null_depth: i32,
) -> (i32, Option<Move>) {
    if td.stopped() {
        return (0, None);
    }

    if depth <= 0 {
        return (qs(td, board, alpha, beta), None);
    }

    td.stats.nodes += 1;

    let is_root = td.ply == 0;
    if !is_root && (td.is_repetition(board) || board.insufficient_material()) {
        td.stats.n_draws += 1;
        return (0, None);
    }

    let start_alpha = alpha;
    let is_pv = alpha != beta - 1;
    let hash = board.hash();

    // Transposition table probe.
    let mut tt_move = None;
    let entry = tt.lookup(hash);
    td.stats.tt_query += 1;

    if let Some(entry) = entry {
        td.stats.tt_hit += 1;
        if entry.m != 0 {
            match decode_legal(board, entry.m as u16) {
                Some(m) => tt_move = Some(m),
                // A hash collision or torn write left an impossible move.
                None => td.stats.tt_invalid += 1,
            }
        }

        if i32::from(entry.depth) >= depth && !is_pv {
            let score = eval_from_tt(i32::from(entry.score), td.ply);
            let usable = match entry.flag {
                Flag::Exact => true,
                Flag::LowerBound => score >= beta,
                Flag::UpperBound => score <= alpha,
                Flag::NotValid => false,
            };
            if usable {
                return (score, tt_move);
            }
        }
    } else if depth >= 4 {
        // IIR: without a table move this subtree is badly ordered anyway;
        // search it shallower and let the table fill in.
        depth -= 1;
    }

    // Endgame tablebase probe, exact for any position it covers.
    if !is_root {
        if let Some(tb) = td.tb {
            if board.occupied().len() as usize <= tb.max_pieces() {
                td.stats.syzygy_queries += 1;
                if let Some(score) = tb.probe_wdl(board) {
                    td.stats.syzygy_query_hits += 1;
                    td.stats.tt_store += 1;
                    tt.store(hash, Flag::Exact, depth, eval_to_tt(score, td.ply), None);
                    return (score, None);
                }
            }
        }
    }

    let in_check = board.in_check();

    // Static null pruning (reverse futility pruning).
    if !is_root && !in_check && depth <= 7 && beta <= MATE_THRESHOLD {
        td.stats.n_static_eval += 1;
        let static_eval = evaluate(board, td.accumulators.top(), td.params);
        if static_eval - depth * 121 > beta {
            td.stats.n_static_eval_hit += 1;
            return ((beta + static_eval) / 2, None);
        }
    }

    // Null move: hand the opponent a free move at reduced depth; if they
    // still cannot reach beta, verify at the same depth before cutting.
    let nm_reduce_depth = if depth > 6 { 4 } else { 3 };
    if depth >= nm_reduce_depth && !in_check && !is_root && null_depth < 2 {
        if let Some(null_board) = board.null_move() {
            td.stats.n_null_move += 1;

            td.stack[td.ply].played_move = None;
            td.hash_history.push(null_board.hash());
            td.ply += 1;
            let nm_score = -search(
                td,
                tt,
                &null_board,
                depth - nm_reduce_depth,
                -beta,
                -beta + 1,
                null_depth + 1,
            )
            .0;
            td.ply -= 1;
            td.hash_history.pop();

            if nm_score >= beta {
                let verification =
                    search(td, tt, board, depth - nm_reduce_depth, beta - 1, beta, null_depth).0;
                if verification >= beta {
                    td.stats.n_null_move_hit += 1;
                    let score = if nm_score.abs() >= MATE_THRESHOLD { beta } else { nm_score };
                    return (score, None);
                }
            }
        }
    }

    let moves = board.legal_moves();
    let first_moves: ArrayVec<Move, 1> = tt_move.into_iter().collect();
    let mut list = MoveList::scored(board, &moves, &first_moves, &td.history, td.params);

    let mut best_score = -INFINITY;
    let mut best_move = None;
    let mut n_played: u64 = 0;
    let mut beta_cutoff_move = None;
    let mut quiets_tried: ArrayVec<Move, MAX_MOVES> = ArrayVec::new();

    let lmr_ok = !in_check && depth >= 2;

    while let Some(entry) = list.next() {
        let m = entry.m;
        let is_quiet = !board.is_capture(m) && m.promotion.is_none();
        if is_quiet {
            quiets_tried.push(m);
        }

        let mut child = board.clone();
        td.accumulators.push_move(board, m);
        child.play_unchecked(m);
        tt.prefetch(child.hash());

        td.stack[td.ply].played_move = Some(m);
        td.hash_history.push(child.hash());
        td.ply += 1;

        let mut score;
        if n_played == 0 {
            score = -search(td, tt, &child, depth - 1, -beta, -alpha, null_depth).0;
        } else {
            // Later moves start with a reduced zero-window probe; anything
            // that beats alpha earns its re-search.
            let mut reduction = 1;
            if lmr_ok && n_played >= 4 && is_quiet {
                td.stats.n_lmr += 1;
                reduction = td.lmr.reduction(depth, n_played as i32);
            }
            let is_lmr = reduction > 1;

            let new_depth = (depth - reduction).max(0);
            score = -search(td, tt, &child, new_depth, -alpha - 1, -alpha, null_depth).0;

            if is_lmr && score > alpha {
                score = -search(td, tt, &child, depth - 1, -alpha - 1, -alpha, null_depth).0;
            }
            if score > alpha && score < beta {
                score = -search(td, tt, &child, depth - 1, -beta, -alpha, null_depth).0;
            }
            if score >= beta && is_lmr {
                td.stats.n_lmr_hit += 1;
            }
        }

        td.ply -= 1;
        td.hash_history.pop();
        td.accumulators.pop();

        n_played += 1;

        if score > best_score {
            best_score = score;
            best_move = Some(m);

            if score > alpha {
                if score >= beta {
                    if is_quiet {
                        beta_cutoff_move = Some(m);
                    }
                    break;
                }
                alpha = score;
            }
        }
    }

    // History gravity on a quiet beta cutoff: the cut move gains, every
    // quiet tried before it pays.
    if let Some(cutoff) = beta_cutoff_move {
        let bonus = depth * depth;
        let side = board.side_to_move();
        for &q in &quiets_tried {
            if let Some(piece) = board.piece_on(q.from) {
                let delta = if q == cutoff { bonus } else { -bonus };
                td.history.update(side, piece, q.to, delta);
            }
        }
        td.stats.n_moves_cutoff += n_played;
        td.stats.nmc_nodes += 1;
    }

    if n_played == 0 {
        best_score = if in_check { -MATE + td.ply } else { 0 };
    }

    if !td.stopped() {
        td.stats.tt_store += 1;
        let flag = if best_score >= beta {
            Flag::LowerBound
        } else if best_score > start_alpha {
            Flag::Exact
        } else {
            Flag::UpperBound
        };
        let work_score = eval_to_tt(best_score, td.ply);
        let stored_move = if best_score > start_alpha && best_move.is_some() {
            best_move
        } else {
            tt_move
        };
        tt.store(hash, flag, depth, work_score, stored_move);
    }

    (best_score, best_move)
}

#[cfg(test)]
mod alpha_beta_tests {
    use super::*;
    use crate::eval::EvalParams;
    use crate::search::lmr::LmrTable;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn thread_for<'a>(
        board: &Board,
        lmr: &'a LmrTable,
        params: &'a EvalParams,
        stop: Arc<AtomicBool>,
    ) -> ThreadData<'a> {
        let mut td = ThreadData::new(stop, 0, lmr, params);
        td.prepare(board, &[]);
        td
    }

    #[test]
    fn finds_mate_in_one() {
        let cases = [
            ("6k1/R7/6K1/8/8/8/8/8 w - - 0 1", "a7a8"),
            ("8/8/8/8/8/6k1/r7/6K1 b - - 0 1", "a2a1"),
            ("k7/6R1/5R1P/8/8/8/8/K7 w - - 0 1", "f6f8"),
            ("k7/8/8/8/8/5r1p/6r1/K7 b - - 0 1", "f3f1"),
        ];
        let lmr = LmrTable::new();
        let params = EvalParams::default();
        for (fen, expected) in cases {
            let board = Board::from_fen(fen, false).unwrap();
            let tt = TranspositionTable::new(4);
            let mut td = thread_for(&board, &lmr, &params, Arc::new(AtomicBool::new(false)));

            let (score, m) = search(&mut td, &tt, &board, 4, -INFINITY, INFINITY, 0);
            let m = m.expect(fen);
            assert_eq!(expected, m.to_string(), "in {fen}");
            assert_eq!(MATE - 1, score, "in {fen}");

            let mut after = board.clone();
            after.play_unchecked(m);
            assert!(after.is_checkmate(), "after {m} in {fen}");
        }
    }

    #[test]
    fn finds_the_underpromotion() {
        // Promoting to a queen stalemates; only the knight mates.
        let cases = [
            ("8/5P1k/8/4B1K1/8/1B6/2N5/8 w - - 0 1", "f7f8n"),
            ("8/2n5/1b6/8/4b1k1/8/5p1K/8 b - - 0 1", "f2f1n"),
        ];
        let lmr = LmrTable::new();
        let params = EvalParams::default();
        for (fen, expected) in cases {
            let board = Board::from_fen(fen, false).unwrap();
            let tt = TranspositionTable::new(4);
            let mut td = thread_for(&board, &lmr, &params, Arc::new(AtomicBool::new(false)));

            let (_, m) = search(&mut td, &tt, &board, 4, -INFINITY, INFINITY, 0);
            let m = m.expect(fen);
            assert_eq!(expected, m.to_string(), "in {fen}");
            let mut after = board.clone();
            after.play_unchecked(m);
            assert!(after.is_checkmate(), "after {m} in {fen}");
        }
    }

    #[test]
    fn raised_stop_flag_cuts_the_search_short() {
        let board = Board::default();
        let lmr = LmrTable::new();
        let params = EvalParams::default();
        let stop = Arc::new(AtomicBool::new(false));
        let tt = TranspositionTable::new(4);
        let mut td = thread_for(&board, &lmr, &params, Arc::clone(&stop));

        stop.store(true, Ordering::Relaxed);
        let (score, m) = search(&mut td, &tt, &board, 30, -INFINITY, INFINITY, 0);
        assert_eq!(0, score);
        assert_eq!(None, m);
        assert_eq!(0, td.stats.nodes);
    }

    #[test]
    fn stalemate_scores_zero() {
        let board = Board::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", false).unwrap();
        let lmr = LmrTable::new();
        let params = EvalParams::default();
        let tt = TranspositionTable::new(4);
        let mut td = thread_for(&board, &lmr, &params, Arc::new(AtomicBool::new(false)));

        let (score, m) = search(&mut td, &tt, &board, 3, -INFINITY, INFINITY, 0);
        assert_eq!(0, score);
        assert_eq!(None, m);
    }

    #[test]
    fn mated_root_reports_the_distance() {
        // Back-rank mate already delivered; black is mated where it stands.
        let board = Board::from_fen("7k/8/8/8/8/8/8/K5RR b - - 0 1", false).unwrap();
        let lmr = LmrTable::new();
        let params = EvalParams::default();
        let tt = TranspositionTable::new(4);
        let mut td = thread_for(&board, &lmr, &params, Arc::new(AtomicBool::new(false)));

        let (score, _) = search(&mut td, &tt, &board, 3, -INFINITY, INFINITY, 0);
        assert_eq!(-MATE, score);
    }
}
