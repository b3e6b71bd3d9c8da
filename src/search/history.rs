use cozy_chess::{Color, Piece, Square};

const MAX_HISTORY: i32 = 1023;

/// Quiet-move history, indexed by side, moving piece type and destination
/// square. Lives per search thread and is zeroed on a new game.
#[derive(Clone)]
pub struct HistoryTable {
    table: [[[i16; 64]; 6]; 2],
}

impl Default for HistoryTable {
    fn default() -> Self {
        Self { table: [[[0; 64]; 6]; 2] }
    }
}

impl HistoryTable {
    pub fn get(&self, side: Color, piece: Piece, to: Square) -> i32 {
        i32::from(self.table[side as usize][piece as usize][to as usize])
    }

    /// Gravity update: the running score decays towards the applied bonus, so
    /// it can never leave `[-MAX_HISTORY, MAX_HISTORY]`.
    /// https://www.chessprogramming.org/History_Heuristic#History_Bonuses
    pub fn update(&mut self, side: Color, piece: Piece, to: Square, bonus: i32) {
        let entry = &mut self.table[side as usize][piece as usize][to as usize];
        let clamped = bonus.clamp(-MAX_HISTORY, MAX_HISTORY);
        let current = i32::from(*entry);
        *entry = (current + clamped - current * clamped.abs() / MAX_HISTORY) as i16;
    }

    pub fn clear(&mut self) {
        self.table = [[[0; 64]; 6]; 2];
    }
}
