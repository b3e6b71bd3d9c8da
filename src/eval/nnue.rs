use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use cozy_chess::{Board, Color, File, Move, Piece, Rank, Square};
use thiserror::Error;

use crate::board::BoardExt;

use super::MAX_NON_MATE;

pub const HIDDEN_SIZE: usize = 128;
const SCALE: i32 = 400;
const QA: i32 = 255;
const QB: i32 = 64;

const FEATURES: usize = 2 * 6 * 64;
/// feature weights + feature bias + two output vectors, padded to the
/// accumulator alignment, plus the output bias.
pub const NETWORK_BYTES: usize = 197_440;
const WEIGHT_I16S: usize = (FEATURES + 1 + 2) * HIDDEN_SIZE + 1;

type Block = [i16; HIDDEN_SIZE];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C, align(64))]
pub struct Accumulator {
    vals: Block,
}

/// The network weights, read-only for the lifetime of the process.
pub struct Network {
    feature_weights: Box<[Accumulator]>,
    feature_bias: Accumulator,
    output_weights: [Accumulator; 2],
    output_bias: i16,
}

static NETWORK: OnceLock<Network> = OnceLock::new();

#[derive(Debug, Error)]
pub enum NnueError {
    #[error("failed to read network file: {0}")]
    Io(#[from] std::io::Error),
    #[error("network file is {got} bytes, expected {NETWORK_BYTES}")]
    BadSize { got: usize },
    #[error("a network was already loaded")]
    AlreadyLoaded,
}

pub fn network() -> Option<&'static Network> {
    NETWORK.get()
}

/// Loads the weight blob (little-endian, fixed layout) and installs it for
/// the lifetime of the process.
pub fn load(path: &Path) -> Result<(), NnueError> {
    let bytes = fs::read(path)?;
    if bytes.len() != NETWORK_BYTES {
        return Err(NnueError::BadSize { got: bytes.len() });
    }
    let vals: Vec<i16> = bytemuck::pod_collect_to_vec(&bytes[..WEIGHT_I16S * 2]);
    NETWORK.set(Network::from_i16s(&vals)).map_err(|_| NnueError::AlreadyLoaded)
}

impl Network {
    fn from_i16s(vals: &[i16]) -> Self {
        assert_eq!(WEIGHT_I16S, vals.len());
        let mut chunks = vals.chunks_exact(HIDDEN_SIZE);
        let mut block = || {
            let mut acc = Accumulator { vals: [0; HIDDEN_SIZE] };
            acc.vals.copy_from_slice(chunks.next().unwrap());
            acc
        };
        let feature_weights: Vec<Accumulator> = (0..FEATURES).map(|_| block()).collect();
        let feature_bias = block();
        let output_weights = [block(), block()];
        let output_bias = vals[WEIGHT_I16S - 1];
        Self {
            feature_weights: feature_weights.into_boxed_slice(),
            feature_bias,
            output_weights,
            output_bias,
        }
    }

    fn add_feature(&self, acc: &mut Accumulator, idx: usize) {
        for (v, w) in acc.vals.iter_mut().zip(&self.feature_weights[idx].vals) {
            *v += w;
        }
    }

    fn remove_feature(&self, acc: &mut Accumulator, idx: usize) {
        for (v, w) in acc.vals.iter_mut().zip(&self.feature_weights[idx].vals) {
            *v -= w;
        }
    }

    fn evaluate(&self, us: &Accumulator, them: &Accumulator) -> i32 {
        let mut output = 0i64;

        for (half, weights) in [(us, &self.output_weights[0]), (them, &self.output_weights[1])] {
            for (&v, &w) in half.vals.iter().zip(&weights.vals) {
                // Squared clipped ReLU, fused with the weight multiply. The
                // intermediate product is truncated to 16 bits on purpose:
                // that is what the quantisation scheme was trained against.
                let input = i32::from(v.clamp(0, QA as i16));
                let weight = (input * i32::from(w)) as i16;
                output += i64::from(input) * i64::from(weight);
            }
        }

        let mut out = output / QA as i64;
        out += i64::from(self.output_bias);
        out = out * SCALE as i64 / (QA * QB) as i64;
        out.clamp(-MAX_NON_MATE as i64, MAX_NON_MATE as i64) as i32
    }
}

/// The accumulator pair carried alongside the position during search. Each
/// side accumulates the feature weights from its own perspective; the board
/// is mirrored vertically (`sq ^ 56`) for the view from the other side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Eval {
    white: Accumulator,
    black: Accumulator,
}

impl Default for Eval {
    fn default() -> Self {
        let bias = network().map_or(Accumulator { vals: [0; HIDDEN_SIZE] }, |n| n.feature_bias);
        Self { white: bias, black: bias }
    }
}

impl Eval {
    pub fn from_board(board: &Board) -> Self {
        let mut eval = Self::default();
        eval.set(board);
        eval
    }

    pub fn set(&mut self, board: &Board) {
        *self = Self::default();
        for color in Color::ALL {
            for piece in Piece::ALL {
                for sq in board.colored_pieces(color, piece) {
                    self.add_piece(piece, sq, color == Color::White);
                }
            }
        }
    }

    pub fn add_piece(&mut self, piece: Piece, sq: Square, is_white: bool) {
        let Some(net) = network() else { return };
        let (piece, sq) = (piece as usize, sq as usize);
        if is_white {
            net.add_feature(&mut self.white, 64 * piece + sq);
            net.add_feature(&mut self.black, 64 * (6 + piece) + (sq ^ 56));
        } else {
            net.add_feature(&mut self.black, 64 * piece + (sq ^ 56));
            net.add_feature(&mut self.white, 64 * (6 + piece) + sq);
        }
    }

    pub fn remove_piece(&mut self, piece: Piece, sq: Square, is_white: bool) {
        let Some(net) = network() else { return };
        let (piece, sq) = (piece as usize, sq as usize);
        if is_white {
            net.remove_feature(&mut self.white, 64 * piece + sq);
            net.remove_feature(&mut self.black, 64 * (6 + piece) + (sq ^ 56));
        } else {
            net.remove_feature(&mut self.black, 64 * piece + (sq ^ 56));
            net.remove_feature(&mut self.white, 64 * (6 + piece) + sq);
        }
    }

    /// Applies a move's feature updates. `board` is the position the move is
    /// about to be played in.
    pub fn play(&mut self, board: &Board, m: Move) {
        let is_white = board.side_to_move() == Color::White;
        let piece = match board.piece_on(m.from) {
            Some(p) => p,
            None => return,
        };

        if board.is_castling(m) {
            let back = if is_white { Rank::First } else { Rank::Eighth };
            let (king_to, rook_to) = if (m.to.file() as usize) > (m.from.file() as usize) {
                (File::G, File::F)
            } else {
                (File::C, File::D)
            };
            self.remove_piece(Piece::King, m.from, is_white);
            self.remove_piece(Piece::Rook, m.to, is_white);
            self.add_piece(Piece::King, Square::new(king_to, back), is_white);
            self.add_piece(Piece::Rook, Square::new(rook_to, back), is_white);
            return;
        }

        if let Some(victim) = board.victim(m) {
            let victim_sq = if board.is_en_passant(m) {
                Square::new(m.to.file(), m.from.rank())
            } else {
                m.to
            };
            self.remove_piece(victim, victim_sq, !is_white);
        }
        self.remove_piece(piece, m.from, is_white);
        self.add_piece(m.promotion.unwrap_or(piece), m.to, is_white);
    }

    pub fn evaluate(&self, white_to_move: bool) -> i32 {
        let Some(net) = network() else { return 0 };
        if white_to_move {
            net.evaluate(&self.white, &self.black)
        } else {
            net.evaluate(&self.black, &self.white)
        }
    }
}

/// Deterministic material-counting network for tests. Own material lands in
/// the low half of the lanes, opposing material in the high half, so the
/// output tracks the material balance and search tests behave the same
/// whether or not this network happens to be installed.
#[cfg(test)]
pub(crate) fn install_test_network() {
    const VALUES: [i16; 6] = [10, 30, 30, 50, 90, 0];
    let mut vals = vec![0i16; WEIGHT_I16S];
    for piece in 0..6 {
        for sq in 0..64 {
            let own = 64 * piece + sq;
            let opp = 64 * (6 + piece) + sq;
            for lane in 0..HIDDEN_SIZE / 2 {
                vals[own * HIDDEN_SIZE + lane] = VALUES[piece];
            }
            for lane in HIDDEN_SIZE / 2..HIDDEN_SIZE {
                vals[opp * HIDDEN_SIZE + lane] = VALUES[piece];
            }
        }
    }
    let out = (FEATURES + 1) * HIDDEN_SIZE;
    for lane in 0..HIDDEN_SIZE / 2 {
        vals[out + lane] = 300;
    }
    for lane in HIDDEN_SIZE / 2..HIDDEN_SIZE {
        vals[out + lane] = -300;
    }
    let _ = NETWORK.set(Network::from_i16s(&vals));
}

#[cfg(test)]
mod nnue_tests {
    use super::*;
    use crate::board::STARTING_FEN;

    fn scratch(board: &Board) -> Eval {
        let mut e = Eval::default();
        e.set(board);
        e
    }

    #[test]
    fn incremental_matches_scratch() {
        install_test_network();
        let lines = [
            vec!["e2e4", "d7d5", "e4d5", "d8d5", "b1c3", "d5a5", "d2d4", "g8f6"],
            // Castling both ways, promotion, en passant.
            // Castling is encoded as king-takes-rook by the board library.
            vec!["e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "g8f6", "e1h1", "f8c5"],
            vec!["h2h4", "g7g5", "h4g5", "g8f6", "g5g6", "e7e6", "g6g7", "f8e7", "g7h8q"],
            vec!["e2e4", "a7a6", "e4e5", "d7d5", "e5d6"],
        ];
        for line in lines {
            let mut board = Board::from_fen(STARTING_FEN, false).unwrap();
            let mut eval = scratch(&board);
            for mv in line {
                let m: Move = mv.parse().unwrap();
                eval.play(&board, m);
                board.play_unchecked(m);
                assert_eq!(scratch(&board), eval, "after {mv}");
                assert_eq!(
                    scratch(&board).evaluate(board.side_to_move() == Color::White),
                    eval.evaluate(board.side_to_move() == Color::White)
                );
            }
        }
    }

    #[test]
    fn add_remove_are_inverses() {
        install_test_network();
        let board = Board::default();
        let fresh = Eval::from_board(&board);
        let mut probed = fresh;
        probed.add_piece(Piece::Queen, Square::D4, true);
        probed.remove_piece(Piece::Queen, Square::D4, true);
        assert_eq!(fresh, probed);
    }
}
