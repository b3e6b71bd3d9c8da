use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use cozy_chess::{Board, Move, Piece};
use log::{debug, warn};
use rand::Rng;
use thiserror::Error;

use crate::board::square_at;

pub mod zobrist;

use zobrist::polyglot_hash;

const ENTRY_SIZE: u64 = 16;

/// One 16-byte book record; every field is big-endian on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BookEntry {
    pub hash: u64,
    pub raw_move: u16,
    pub weight: u16,
    pub learn: u32,
}

impl BookEntry {
    pub fn from_bytes(bytes: &[u8; 16]) -> Self {
        Self {
            hash: u64::from_be_bytes(bytes[0..8].try_into().unwrap()),
            raw_move: u16::from_be_bytes(bytes[8..10].try_into().unwrap()),
            weight: u16::from_be_bytes(bytes[10..12].try_into().unwrap()),
            learn: u32::from_be_bytes(bytes[12..16].try_into().unwrap()),
        }
    }

    #[cfg(test)]
    fn to_bytes(self) -> [u8; 16] {
        let mut out = [0; 16];
        out[0..8].copy_from_slice(&self.hash.to_be_bytes());
        out[8..10].copy_from_slice(&self.raw_move.to_be_bytes());
        out[10..12].copy_from_slice(&self.weight.to_be_bytes());
        out[12..16].copy_from_slice(&self.learn.to_be_bytes());
        out
    }
}

/// Decodes a book move against a position. Castling arrives as the king
/// landing on its own rook, which is exactly how the board library encodes
/// it; promotions carry a piece index. Anything that is not legal in the
/// position is a hash collision and gets dropped by the caller.
pub fn decode_book_move(board: &Board, raw: u16) -> Option<Move> {
    let to = square_at((raw & 7) as usize, (raw >> 3 & 7) as usize)?;
    let from = square_at((raw >> 6 & 7) as usize, (raw >> 9 & 7) as usize)?;
    let promotion = match raw >> 12 & 7 {
        0 => None,
        p if board.piece_on(from) == Some(Piece::Pawn) => Some(Piece::try_index(p as usize)?),
        _ => None,
    };
    let m = Move { from, to, promotion };
    board.is_legal(m).then_some(m)
}

#[derive(Debug, Error)]
pub enum BookError {
    #[error("failed to open book: {0}")]
    Io(#[from] std::io::Error),
    #[error("book size {0} is not a multiple of {ENTRY_SIZE} bytes")]
    BadSize(u64),
}

/// A sorted array of 16-byte records on disk; the file handle is kept open
/// for the engine's lifetime and records are read on demand.
pub struct PolyglotBook {
    file: Mutex<File>,
    n_entries: u64,
}

impl PolyglotBook {
    pub fn open(path: &Path) -> Result<Self, BookError> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        if size % ENTRY_SIZE != 0 {
            return Err(BookError::BadSize(size));
        }
        Ok(Self { file: Mutex::new(file), n_entries: size / ENTRY_SIZE })
    }

    pub fn len(&self) -> u64 {
        self.n_entries
    }

    pub fn is_empty(&self) -> bool {
        self.n_entries == 0
    }

    fn read_entry(&self, index: u64) -> std::io::Result<BookEntry> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(index * ENTRY_SIZE))?;
        let mut bytes = [0u8; 16];
        file.read_exact(&mut bytes)?;
        Ok(BookEntry::from_bytes(&bytes))
    }

    /// All records for `hash`: binary search to any match, then scan out in
    /// both directions.
    fn entries_for(&self, hash: u64) -> Vec<BookEntry> {
        let mut out = Vec::new();
        let (mut low, mut high) = (0, self.n_entries);
        while low < high {
            let mid = (low + high) / 2;
            let entry = match self.read_entry(mid) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("problem reading from book: {e}");
                    return out;
                }
            };
            if entry.hash < hash {
                low = mid + 1;
            } else if entry.hash > hash {
                high = mid;
            } else {
                out.push(entry);
                for index in (0..mid).rev() {
                    match self.read_entry(index) {
                        Ok(e) if e.hash == hash => out.push(e),
                        _ => break,
                    }
                }
                for index in mid + 1..self.n_entries {
                    match self.read_entry(index) {
                        Ok(e) if e.hash == hash => out.push(e),
                        _ => break,
                    }
                }
                break;
            }
        }
        out
    }

    /// Weighted-random selection among the book moves for this position.
    pub fn query(&self, board: &Board, rng: &mut impl Rng) -> Option<Move> {
        let mut candidates = Vec::new();
        for entry in self.entries_for(polyglot_hash(board)) {
            match decode_book_move(board, entry.raw_move) {
                Some(m) => candidates.push((m, entry.weight)),
                None => warn!("book hash collision (raw move {:#06x})", entry.raw_move),
            }
        }

        // https://stackoverflow.com/a/56006340: min of -log(u + 1) / (w + 1)
        // draws each candidate with probability proportional to its weight.
        let picked = candidates
            .into_iter()
            .map(|(m, weight)| {
                let u = rng.gen_range(0..1u64 << 30);
                (-((u + 1) as f64).ln() / f64::from(weight + 1), m)
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, m)| m);

        if let Some(m) = picked {
            debug!("book move {m} selected");
        }
        picked
    }
}

#[cfg(test)]
mod book_tests {
    use super::*;
    use crate::board::BoardExt;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::io::Write;

    // from_rank 1, from_file e, to_rank 3, to_file e: the double push e2e4.
    const E2E4_RAW: u16 = 1 << 9 | 4 << 6 | 3 << 3 | 4;

    #[test]
    fn raw_move_decodes_to_the_double_push() {
        let board = Board::default();
        let m = decode_book_move(&board, E2E4_RAW).unwrap();
        assert_eq!("e2e4".parse::<Move>().unwrap(), m);
        let mut after = board.clone();
        after.play_unchecked(m);
        assert!(after.ep_square().is_some());
    }

    #[test]
    fn castling_arrives_as_king_onto_rook() {
        let board = Board::from_fen(
            "r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1",
            false,
        )
        .unwrap();
        // from e1 (rank 0, file 4) to h1 (rank 0, file 7).
        let short = decode_book_move(&board, 4 << 6 | 7).unwrap();
        assert!(board.is_castling(short));
        // from e1 to a1.
        let long = decode_book_move(&board, 4 << 6).unwrap();
        assert!(board.is_castling(long));
    }

    #[test]
    fn illegal_raw_moves_are_rejected() {
        let board = Board::default();
        // e2 to e5 is no legal pawn move.
        assert_eq!(None, decode_book_move(&board, 1 << 9 | 4 << 6 | 4 << 3 | 4));
    }

    fn write_book(entries: &[BookEntry]) -> std::path::PathBuf {
        let mut sorted = entries.to_vec();
        sorted.sort_by_key(|e| e.hash);
        let path = std::env::temp_dir().join(format!("sable-book-test-{}.bin", std::process::id()));
        let mut file = File::create(&path).unwrap();
        for entry in sorted {
            file.write_all(&entry.to_bytes()).unwrap();
        }
        path
    }

    #[test]
    fn query_returns_a_stored_move() {
        let board = Board::default();
        let hash = polyglot_hash(&board);
        let d2d4: u16 = 1 << 9 | 3 << 6 | 3 << 3 | 3;
        let entries = [
            BookEntry { hash: hash.wrapping_sub(1), raw_move: 0, weight: 1, learn: 0 },
            BookEntry { hash, raw_move: E2E4_RAW, weight: 100, learn: 0 },
            BookEntry { hash, raw_move: d2d4, weight: 50, learn: 0 },
            BookEntry { hash: hash.wrapping_add(1), raw_move: 0, weight: 1, learn: 0 },
        ];
        let path = write_book(&entries);
        let book = PolyglotBook::open(&path).unwrap();
        let mut rng = SmallRng::seed_from_u64(7);

        for _ in 0..20 {
            let m = book.query(&board, &mut rng).unwrap();
            assert!(["e2e4", "d2d4"].contains(&m.to_string().as_str()));
        }

        // A position that is not in the book misses.
        let mut other = board.clone();
        other.play_unchecked("g1f3".parse().unwrap());
        assert_eq!(None, book.query(&other, &mut rng));

        std::fs::remove_file(path).ok();
    }
}
