use std::path::Path;

use cozy_chess::util::parse_uci_move;
use cozy_chess::{Board, Move};
use log::{debug, warn};
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess};
use shakmaty_syzygy::{Dtz, Tablebase, Wdl};

use crate::search::MATE;

/// Adapter around the tablebase probing library. Positions cross the
/// boundary as FEN, results come back as plain scores and engine moves.
pub struct SyzygyTables {
    tables: Tablebase<Chess>,
}

impl SyzygyTables {
    /// Loads table files from one or more directories (separated the way the
    /// UCI option delivers them).
    pub fn load(paths: &str) -> Option<Self> {
        let mut tables = Tablebase::new();
        let mut found = 0;
        for dir in paths.split(';').flat_map(|p| p.split(':')).filter(|p| !p.is_empty()) {
            match tables.add_directory(Path::new(dir)) {
                Ok(n) => found += n,
                Err(e) => warn!("tablebase path {dir}: {e}"),
            }
        }
        if found == 0 {
            return None;
        }
        debug!("{} men syzygy, {found} table files", tables.max_pieces());
        Some(Self { tables })
    }

    pub fn max_pieces(&self) -> usize {
        self.tables.max_pieces()
    }

    fn convert(board: &Board) -> Option<Chess> {
        let fen: Fen = board.to_string().parse().ok()?;
        fen.into_position(CastlingMode::Standard).ok()
    }

    /// Win/draw/loss probe for the side to move, used inside the search.
    pub fn probe_wdl(&self, board: &Board) -> Option<i32> {
        let pos = Self::convert(board)?;
        let score = match self.tables.probe_wdl_after_zeroing(&pos).ok()? {
            Wdl::Win | Wdl::CursedWin => MATE - 1,
            Wdl::Draw => 0,
            Wdl::Loss | Wdl::BlessedLoss => -(MATE - 1),
        };
        Some(score)
    }

    /// Root probe: the DTZ-optimal move plus a score graded by the distance
    /// to zeroing, so faster wins (and slower losses) come out ahead.
    pub fn probe_root(&self, board: &Board) -> Option<(Move, i32)> {
        let pos = Self::convert(board)?;
        let (tb_move, dtz) = self.tables.best_move(&pos).ok()??;
        let Dtz(dtz) = dtz.ignore_rounding();
        let score = match dtz {
            0 => 0,
            d if d > 0 => MATE - d,
            d => -(MATE + d),
        };
        let uci = tb_move.to_uci(CastlingMode::Standard).to_string();
        let m = parse_uci_move(board, &uci).ok()?;
        Some((m, score))
    }
}
