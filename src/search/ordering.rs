use arrayvec::ArrayVec;
use cozy_chess::{Board, Move, Piece};

use crate::board::{BoardExt, MoveVec, MAX_MOVES};
use crate::eval::psq::psq_mg;
use crate::eval::EvalParams;

use super::history::HistoryTable;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveEntry {
    pub m: Move,
    pub score: i32,
}

/// A scored move list handed out best-first. Scoring happens once up front;
/// `next` selection-sorts one entry at a time since a β-cut usually means
/// most of the list is never consumed.
pub struct MoveList {
    entries: ArrayVec<MoveEntry, MAX_MOVES>,
    current: usize,
}

impl MoveList {
    pub fn scored(
        board: &Board,
        moves: &MoveVec,
        first_moves: &[Move],
        history: &HistoryTable,
        params: &EvalParams,
    ) -> Self {
        let mut entries = ArrayVec::new();
        for &m in moves {
            entries.push(MoveEntry { m, score: score_move(board, m, first_moves, history, params) });
        }
        Self { entries, current: 0 }
    }

    pub fn next(&mut self) -> Option<MoveEntry> {
        if self.current >= self.entries.len() {
            return None;
        }
        let mut best = self.current;
        for i in self.current + 1..self.entries.len() {
            if self.entries[i].score > self.entries[best].score {
                best = i;
            }
        }
        self.entries.swap(self.current, best);
        let entry = self.entries[self.current];
        self.current += 1;
        Some(entry)
    }

}

/// MVV-LVA style scorer. Captures and promotions dominate quiets, quiets are
/// ranked by history, and everything gets a small positional nudge from the
/// middle-game piece-square delta. The shifts keep the bands disjoint:
/// piece values stay below 2048 and `|history| * 256` below `1 << 19`.
pub fn score_move(
    board: &Board,
    m: Move,
    first_moves: &[Move],
    history: &HistoryTable,
    params: &EvalParams,
) -> i32 {
    if let Some(i) = first_moves.iter().position(|&f| f == m) {
        return i32::MAX - i as i32;
    }

    let side = board.side_to_move();
    let piece = board.piece_on(m.from).unwrap_or(Piece::Pawn);
    let mut to_type = piece;
    let mut score = 0;

    if let Some(promotion) = m.promotion {
        to_type = promotion;
        score += params.piece(promotion) << 19;
    }

    if let Some(victim) = board.victim(m) {
        score += params.piece(victim) << 19;
        if piece != Piece::King {
            score += (params.queen - params.piece(piece)) * 256;
        }
    } else {
        score += history.get(side, piece, m.to) * 256;
    }

    score + psq_mg(m.to, side, to_type) - psq_mg(m.from, side, piece)
}

#[cfg(test)]
mod ordering_tests {
    use super::*;
    use cozy_chess::Square;

    fn list_for(fen: &str, first: &[Move]) -> MoveList {
        let board = Board::from_fen(fen, false).unwrap();
        let moves = board.legal_moves();
        MoveList::scored(&board, &moves, first, &HistoryTable::default(), &EvalParams::default())
    }

    #[test]
    fn scores_come_out_non_increasing() {
        let mut list =
            list_for("r1bqkbnr/ppp2ppp/2np4/1B2p3/4P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 0 1", &[]);
        let mut prev = i32::MAX;
        while let Some(entry) = list.next() {
            assert!(entry.score <= prev);
            prev = entry.score;
        }
    }

    #[test]
    fn first_moves_pin_to_the_front(){
        let tt_move = "d2d4".parse::<Move>().unwrap();
        let mut list = list_for(crate::board::STARTING_FEN, &[tt_move]);
        assert_eq!(tt_move, list.next().unwrap().m);
    }

    #[test]
    fn captures_outrank_quiets() {
        let board =
            Board::from_fen("rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 1", false)
                .unwrap();
        let capture = "e4d5".parse::<Move>().unwrap();
        let quiet = "b1c3".parse::<Move>().unwrap();
        let hist = HistoryTable::default();
        let params = EvalParams::default();
        assert!(
            score_move(&board, capture, &[], &hist, &params)
                > score_move(&board, quiet, &[], &hist, &params)
        );
    }

    #[test]
    fn history_breaks_quiet_ties() {
        let board = Board::default();
        let mut hist = HistoryTable::default();
        let good = "b1c3".parse::<Move>().unwrap();
        let bad = "b1a3".parse::<Move>().unwrap();
        hist.update(board.side_to_move(), Piece::Knight, Square::C3, 400);
        hist.update(board.side_to_move(), Piece::Knight, Square::A3, -400);
        let params = EvalParams::default();
        assert!(
            score_move(&board, good, &[], &hist, &params)
                > score_move(&board, bad, &[], &hist, &params)
        );
    }
}
