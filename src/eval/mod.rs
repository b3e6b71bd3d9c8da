use cozy_chess::{Board, Color};

pub mod hce;
pub mod nnue;
pub mod params;
pub mod psq;

pub use params::EvalParams;

/// Evaluator outputs stay well inside the mate range so search scores and
/// static scores share one scale.
pub const MAX_NON_MATE: i32 = 9500;

/// Hybrid static evaluation: the network when one is loaded, the classical
/// evaluator otherwise. Score is relative to the side to move.
pub fn evaluate(board: &Board, acc: &nnue::Eval, params: &EvalParams) -> i32 {
    if nnue::network().is_some() {
        acc.evaluate(board.side_to_move() == Color::White)
    } else {
        hce::evaluate(board, params)
    }
}
