use std::mem::size_of;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use cozy_chess::{Board, Move};

use crate::board::{decode_legal, encode_move};
use crate::search::{MATE_THRESHOLD, MAX_PLY};

pub const DEFAULT_TABLE_MB: usize = 64;
const ENTRIES_PER_BUCKET: usize = 8;
const BYTES_PER_MB: usize = 1024 * 1024;
const MAX_AGE: u8 = (1 << 6) - 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum Flag {
    #[default]
    NotValid = 0,
    Exact = 1,
    LowerBound = 2,
    UpperBound = 3,
}

impl Flag {
    fn from_bits(bits: u64) -> Self {
        match bits & 0b11 {
            1 => Self::Exact,
            2 => Self::LowerBound,
            3 => Self::UpperBound,
            _ => Self::NotValid,
        }
    }
}

/// One decoded table entry. On the wire this is two 64-bit words: the data
/// word below and the entry hash XOR'd with it, so a torn concurrent write
/// can never satisfy the lookup test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableEntry {
    pub score: i16,
    pub flag: Flag,
    pub age: u8,
    pub depth: u8,
    pub m: u32,
}

impl TableEntry {
    pub fn best_move(&self, board: &Board) -> Option<Move> {
        decode_legal(board, self.m as u16)
    }
}

/// Packed layout: score in bits 0..16, flag 16..18, age 18..24, depth 24..32,
/// move 32..64.
fn pack(score: i16, flag: Flag, age: u8, depth: u8, m: u32) -> u64 {
    (score as u16 as u64)
        | (flag as u64) << 16
        | u64::from(age & MAX_AGE) << 18
        | u64::from(depth) << 24
        | u64::from(m) << 32
}

fn unpack(data: u64) -> TableEntry {
    TableEntry {
        score: data as u16 as i16,
        flag: Flag::from_bits(data >> 16),
        age: (data >> 18 & u64::from(MAX_AGE)) as u8,
        depth: (data >> 24) as u8,
        m: (data >> 32) as u32,
    }
}

#[derive(Default)]
struct Slot {
    hash: AtomicU64,
    data: AtomicU64,
}

impl Slot {
    fn write(&self, hash: u64, data: u64) {
        self.hash.store(hash ^ data, Ordering::Relaxed);
        self.data.store(data, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct Bucket {
    slots: [Slot; ENTRIES_PER_BUCKET],
}

/// Shared, lock-free transposition table. Readers and writers race freely;
/// the XOR test filters out torn entries as misses.
pub struct TranspositionTable {
    buckets: Box<[Bucket]>,
    age: AtomicU8,
}

impl TranspositionTable {
    pub fn new(mb: usize) -> Self {
        let n_buckets = (mb * BYTES_PER_MB / size_of::<Bucket>()).max(1);
        let mut buckets = Vec::new();
        buckets.resize_with(n_buckets, Bucket::default);
        Self { buckets: buckets.into_boxed_slice(), age: AtomicU8::new(0) }
    }

    pub fn resize(&mut self, mb: usize) {
        *self = Self::new(mb);
    }

    pub fn clear(&self) {
        for bucket in self.buckets.iter() {
            for slot in &bucket.slots {
                slot.hash.store(0, Ordering::Relaxed);
                slot.data.store(0, Ordering::Relaxed);
            }
        }
        self.age.store(0, Ordering::Relaxed);
    }

    fn age(&self) -> u8 {
        self.age.load(Ordering::Relaxed)
    }

    /// Advanced once at the start of every iterative-deepening root call, so
    /// entries from earlier searches become preferred replacement victims.
    pub fn age_up(&self) {
        self.age.store((self.age() + 1) & MAX_AGE, Ordering::Relaxed);
    }

    fn bucket(&self, hash: u64) -> &Bucket {
        &self.buckets[(hash % self.buckets.len() as u64) as usize]
    }

    pub fn prefetch(&self, hash: u64) {
        #[cfg(target_arch = "x86_64")]
        {
            use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
            let bucket: *const Bucket = self.bucket(hash);
            unsafe { _mm_prefetch::<_MM_HINT_T0>(bucket.cast()) }
        }
        #[cfg(not(target_arch = "x86_64"))]
        let _ = hash;
    }

    pub fn lookup(&self, hash: u64) -> Option<TableEntry> {
        for slot in &self.bucket(hash).slots {
            let data = slot.data.load(Ordering::Relaxed);
            if slot.hash.load(Ordering::Relaxed) ^ data == hash {
                let mut entry = unpack(data);
                entry.age = self.age();
                slot.write(hash, pack(entry.score, entry.flag, entry.age, entry.depth, entry.m));
                return Some(entry);
            }
        }
        None
    }

    pub fn store(&self, hash: u64, flag: Flag, depth: i32, score: i32, m: Option<Move>) {
        let age = self.age();
        let bucket = self.bucket(hash);

        let mut victim = None;
        let mut shallowest = (u8::MAX, 0);
        for (i, slot) in bucket.slots.iter().enumerate() {
            let data = slot.data.load(Ordering::Relaxed);
            if slot.hash.load(Ordering::Relaxed) ^ data == hash {
                let entry = unpack(data);
                // Deeper results win; an equal-depth bound never displaces
                // anything. Either way the entry stays fresh.
                if i32::from(entry.depth) > depth
                    || (flag != Flag::Exact && i32::from(entry.depth) == depth)
                {
                    slot.write(hash, pack(entry.score, entry.flag, age, entry.depth, entry.m));
                    return;
                }
                victim = Some(slot);
                break;
            }
            let entry = unpack(data);
            if entry.age != age {
                victim = Some(slot);
            } else if entry.depth < shallowest.0 {
                shallowest = (entry.depth, i);
            }
        }

        let slot = victim.unwrap_or(&bucket.slots[shallowest.1]);
        let m = m.map_or(0, |m| u32::from(encode_move(m)));
        slot.write(hash, pack(score as i16, flag, age, depth as u8, m));
    }

    /// Permille of sampled slots holding an entry from the current search.
    pub fn permille_filled(&self) -> usize {
        self.buckets
            .iter()
            .flat_map(|b| &b.slots)
            .take(1000)
            .map(|slot| unpack(slot.data.load(Ordering::Relaxed)))
            .filter(|e| e.flag != Flag::NotValid && e.age == self.age())
            .count()
    }

    /// Walks the principal variation out of the table: play the best move,
    /// probe for the next, stop on a miss, an illegal move, or a repetition.
    pub fn principal_variation(&self, board: &Board, first: Move) -> Vec<Move> {
        let mut pv = vec![first];
        let mut board = board.clone();
        let mut seen = vec![board.hash()];
        board.play_unchecked(first);

        while let Some(entry) = self.lookup(board.hash()) {
            let Some(m) = entry.best_move(&board) else { break };
            if seen.contains(&board.hash()) || pv.len() > MAX_PLY as usize {
                break;
            }
            seen.push(board.hash());
            pv.push(m);
            board.play_unchecked(m);
        }
        pv
    }
}

/// Mate scores are stored relative to the probing node so a hit at another
/// ply still yields the right mate distance.
pub fn eval_to_tt(score: i32, ply: i32) -> i32 {
    if score > MATE_THRESHOLD {
        score + ply
    } else if score < -MATE_THRESHOLD {
        score - ply
    } else {
        score
    }
}

pub fn eval_from_tt(score: i32, ply: i32) -> i32 {
    if score > MATE_THRESHOLD {
        score - ply
    } else if score < -MATE_THRESHOLD {
        score + ply
    } else {
        score
    }
}

#[cfg(test)]
mod transpos_tests {
    use super::*;
    use crate::search::MATE;

    fn entry_move(raw: u16) -> Option<Move> {
        crate::board::decode_move(raw)
    }

    #[test]
    fn packing_round_trips_every_field() {
        for (score, flag, age, depth, m) in [
            (0i16, Flag::Exact, 0u8, 0u8, 0u32),
            (-9999, Flag::LowerBound, 63, 255, 0xFFFF),
            (1234, Flag::UpperBound, 17, 42, 0x0314),
            (i16::MIN, Flag::Exact, 1, 1, 1),
            (i16::MAX, Flag::LowerBound, 62, 127, 0xABC),
        ] {
            let entry = unpack(pack(score, flag, age, depth, m));
            assert_eq!(TableEntry { score, flag, age, depth, m }, entry);
        }
    }

    #[test]
    fn store_then_lookup() {
        let table = TranspositionTable::new(1);
        let hash = 0xDEAD_BEEF_0BAD_F00D;
        let m = "e2e4".parse::<Move>().unwrap();
        table.store(hash, Flag::Exact, 7, 25, Some(m));

        let entry = table.lookup(hash).unwrap();
        assert_eq!(25, entry.score);
        assert_eq!(Flag::Exact, entry.flag);
        assert_eq!(7, entry.depth);
        assert_eq!(table.age(), entry.age);
        assert_eq!(Some(m), entry_move(entry.m as u16));
        assert!(table.lookup(hash ^ 1).is_none());
    }

    #[test]
    fn xor_integrity() {
        let table = TranspositionTable::new(1);
        let hash = 0x1234_5678_9ABC_DEF0;
        table.store(hash, Flag::LowerBound, 3, -42, None);
        let bucket = table.bucket(hash);
        let slot = bucket
            .slots
            .iter()
            .find(|s| s.data.load(Ordering::Relaxed) != 0)
            .unwrap();
        assert_eq!(
            hash,
            slot.hash.load(Ordering::Relaxed) ^ slot.data.load(Ordering::Relaxed)
        );
    }

    #[test]
    fn shallower_store_refreshes_but_keeps_deeper_entry() {
        let table = TranspositionTable::new(1);
        let hash = 0xABCD;
        let deep = "e2e4".parse::<Move>().unwrap();
        let shallow = "d2d4".parse::<Move>().unwrap();
        table.store(hash, Flag::Exact, 9, 100, Some(deep));
        table.store(hash, Flag::Exact, 3, -5, Some(shallow));

        let entry = table.lookup(hash).unwrap();
        assert_eq!(9, entry.depth);
        assert_eq!(100, entry.score);
        assert_eq!(Some(deep), entry_move(entry.m as u16));
    }

    #[test]
    fn equal_depth_bound_does_not_displace() {
        let table = TranspositionTable::new(1);
        let hash = 0x77;
        table.store(hash, Flag::Exact, 5, 60, None);
        table.store(hash, Flag::LowerBound, 5, 999, None);
        assert_eq!(60, table.lookup(hash).unwrap().score);

        // An exact result at the same depth does replace.
        table.store(hash, Flag::Exact, 5, 61, None);
        assert_eq!(61, table.lookup(hash).unwrap().score);
    }

    #[test]
    fn stale_entries_are_replaced_first() {
        let table = TranspositionTable::new(1);
        let n_buckets = table.buckets.len() as u64;
        // Two hashes landing in the same bucket.
        let (a, b) = (5, 5 + n_buckets);
        table.store(a, Flag::Exact, 20, 1, None);
        table.age_up();
        table.store(b, Flag::Exact, 1, 2, None);
        // The shallow store went into a free slot, not over the deep entry.
        assert_eq!(20, table.lookup(a).unwrap().depth);
        assert_eq!(1, table.lookup(b).unwrap().depth);
    }

    #[test]
    fn mate_scores_are_ply_normalised() {
        let found_mate = MATE - 12;
        let stored = eval_to_tt(found_mate, 12);
        assert_eq!(MATE, stored);
        assert_eq!(MATE - 4, eval_from_tt(stored, 4));

        let mated = -MATE + 15;
        let stored = eval_to_tt(mated, 15);
        assert_eq!(-MATE, stored);
        assert_eq!(-MATE + 2, eval_from_tt(stored, 2));

        assert_eq!(123, eval_from_tt(eval_to_tt(123, 31), 31));
    }
}
