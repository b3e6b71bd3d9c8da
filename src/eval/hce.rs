use cozy_chess::{
    get_bishop_moves, get_king_moves, get_knight_moves, get_rook_moves, BitBoard, Board, Color,
    File, Piece, Rank, Square,
};

use super::params::EvalParams;
use super::psq::psq;
use super::MAX_NON_MATE;

/// Game phase in [0, 256]: 0 with full material, 256 in a bare endgame.
pub fn game_phase(board: &Board) -> i32 {
    // https://www.chessprogramming.org/Tapered_Eval
    const KNIGHT_PHASE: i32 = 1;
    const BISHOP_PHASE: i32 = 1;
    const ROOK_PHASE: i32 = 2;
    const QUEEN_PHASE: i32 = 4;
    const TOTAL_PHASE: i32 = KNIGHT_PHASE * 4 + BISHOP_PHASE * 4 + ROOK_PHASE * 4 + QUEEN_PHASE * 2;

    let mut phase = TOTAL_PHASE;
    phase -= KNIGHT_PHASE * board.pieces(Piece::Knight).len() as i32;
    phase -= BISHOP_PHASE * board.pieces(Piece::Bishop).len() as i32;
    phase -= ROOK_PHASE * board.pieces(Piece::Rook).len() as i32;
    phase -= QUEEN_PHASE * board.pieces(Piece::Queen).len() as i32;

    (phase * 256 + TOTAL_PHASE / 2) / TOTAL_PHASE
}

fn taper(mg: i32, eg: i32, phase: i32) -> i32 {
    (mg * (256 - phase) + eg * phase) / 256
}

fn file_bb(file: File) -> BitBoard {
    file.bitboard()
}

fn adjacent_files(file: File) -> BitBoard {
    let idx = file as usize;
    let mut bb = BitBoard::EMPTY;
    if let Some(f) = idx.checked_sub(1).and_then(File::try_index) {
        bb |= f.bitboard();
    }
    if let Some(f) = File::try_index(idx + 1) {
        bb |= f.bitboard();
    }
    bb
}

fn ranks_in_front(sq: Square, color: Color) -> BitBoard {
    let mut bb = BitBoard::EMPTY;
    let rank = sq.rank() as usize;
    match color {
        Color::White => {
            for r in rank + 1..8 {
                bb |= Rank::try_index(r).unwrap().bitboard();
            }
        }
        Color::Black => {
            for r in 0..rank {
                bb |= Rank::try_index(r).unwrap().bitboard();
            }
        }
    }
    bb
}

fn is_passed(board: &Board, sq: Square, color: Color) -> bool {
    let span = (file_bb(sq.file()) | adjacent_files(sq.file())) & ranks_in_front(sq, color);
    (span & board.colored_pieces(!color, Piece::Pawn)).is_empty()
}

fn relative_rank(sq: Square, color: Color) -> usize {
    match color {
        Color::White => sq.rank() as usize,
        Color::Black => 7 - sq.rank() as usize,
    }
}

fn pawn_structure(board: &Board, color: Color, phase: i32, params: &EvalParams) -> i32 {
    let pawns = board.colored_pieces(color, Piece::Pawn);
    let mut score = 0;

    for sq in pawns {
        if (adjacent_files(sq.file()) & pawns).is_empty() {
            score += params.isolated_pawns;
        }
        if is_passed(board, sq, color) {
            let rank = relative_rank(sq, color);
            score += taper(params.pp_scores[0][rank], params.pp_scores[1][rank], phase);
        }
    }

    for file in File::ALL {
        let on_file = (pawns & file.bitboard()).len() as i32;
        if on_file > 1 {
            score -= (on_file - 1) * params.double_pawns;
        }
    }

    score
}

fn mobility(board: &Board, color: Color) -> i32 {
    let occupied = board.occupied();
    let mut count = 0;
    for sq in board.colors(color) & !board.pieces(Piece::Pawn) & !board.pieces(Piece::King) {
        count += match board.piece_on(sq) {
            Some(Piece::Knight) => get_knight_moves(sq).len(),
            Some(Piece::Bishop) => get_bishop_moves(sq, occupied).len(),
            Some(Piece::Rook) => get_rook_moves(sq, occupied).len(),
            Some(Piece::Queen) => {
                (get_rook_moves(sq, occupied) | get_bishop_moves(sq, occupied)).len()
            }
            _ => 0,
        } as i32;
    }
    count
}

fn side_score(board: &Board, color: Color, phase: i32, params: &EvalParams) -> i32 {
    let mut score = 0;

    for piece in Piece::ALL {
        let bb = board.colored_pieces(color, piece);
        if piece != Piece::King {
            score += bb.len() as i32 * params.piece(piece);
        }
        let mut positional = 0;
        for sq in bb {
            let (mg, eg) = psq(sq, color, piece);
            positional += taper(mg, eg, phase);
        }
        score += positional * params.psq_mul / params.psq_div;
    }

    if board.colored_pieces(color, Piece::Bishop).len() >= 2 {
        score += params.bishop_pair;
    }

    let all_pawns = board.pieces(Piece::Pawn);
    for sq in board.colored_pieces(color, Piece::Rook) {
        if (file_bb(sq.file()) & all_pawns).is_empty() {
            score += params.rook_on_open_file;
        }
    }

    score += pawn_structure(board, color, phase, params);

    let king = board.king(color);
    let shield = get_king_moves(king)
        & ranks_in_front(king, color)
        & board.colored_pieces(color, Piece::Pawn);
    score += shield.len() as i32 * params.king_shield;

    score += mobility(board, color) * params.mobility;

    score
}

/// Classical tapered evaluation, relative to the side to move.
pub fn evaluate(board: &Board, params: &EvalParams) -> i32 {
    let phase = game_phase(board);
    let white = side_score(board, Color::White, phase, params);
    let black = side_score(board, Color::Black, phase, params);

    let score = match board.side_to_move() {
        Color::White => white - black,
        Color::Black => black - white,
    };
    score.clamp(-MAX_NON_MATE, MAX_NON_MATE)
}

#[cfg(test)]
mod hce_tests {
    use super::*;

    #[test]
    fn startpos_is_balanced() {
        let params = EvalParams::default();
        let board = Board::default();
        let white_view = evaluate(&board, &params);
        // Mirror: black to move in the mirrored position must see the same score.
        let mirrored = Board::from_fen(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR b KQkq - 0 1",
            false,
        )
        .unwrap();
        assert_eq!(white_view, evaluate(&mirrored, &params));
    }

    #[test]
    fn extra_queen_wins_the_eval() {
        let params = EvalParams::default();
        let board =
            Board::from_fen("4k3/8/8/8/8/8/8/3QK3 w - - 0 1", false).unwrap();
        assert!(evaluate(&board, &params) > params.queen / 2);
    }

    #[test]
    fn passed_pawn_is_rewarded() {
        let params = EvalParams::default();
        let passed = Board::from_fen("4k3/8/8/3P4/8/8/8/4K3 w - - 0 1", false).unwrap();
        let blocked = Board::from_fen("4k3/3p4/8/3P4/8/8/8/4K3 w - - 0 1", false).unwrap();
        assert!(evaluate(&passed, &params) > evaluate(&blocked, &params));
    }

    #[test]
    fn phase_bounds() {
        assert_eq!(0, game_phase(&Board::default()));
        let bare = Board::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1", false).unwrap();
        assert_eq!(256, game_phase(&bare));
    }
}
