use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bytemuck::{Pod, Zeroable};
use log::warn;

use crate::search::thread::SharedSearchState;
use crate::stats::ChessStats;

/// The record external observers map: a revision counter gating a counter
/// snapshot and the move currently considered best. The revision is odd
/// while a write is in flight; readers wait for an even revision > 0 and
/// re-read when it changed underneath them.
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct ExportRecord {
    pub revision: u32,
    _pad: u32,
    pub counters: ChessStats,
    pub cur_move: u32,
    _pad2: u32,
}

/// Publishes search counters to a fixed path (tmpfs by convention) at a
/// fixed cadence from a background task.
pub struct StateExporter {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StateExporter {
    pub fn start(path: PathBuf, hz: u32, shared: Arc<SharedSearchState>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = std::thread::spawn(move || {
            let mut file = match OpenOptions::new().create(true).write(true).open(&path) {
                Ok(file) => file,
                Err(e) => {
                    warn!("statistics exporter disabled: {}: {e}", path.display());
                    return;
                }
            };
            let mut revision: u32 = 0;
            while !thread_stop.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_micros(1_000_000 / u64::from(hz.max(1))));

                let counters = *shared.counters.lock().unwrap();
                let cur_move = shared.cur_move.load(Ordering::Relaxed);
                if write_record(&mut file, revision, &counters, cur_move).is_err() {
                    break;
                }
                revision += 2;
            }
        });

        Self { stop, handle: Some(handle) }
    }
}

fn write_record(
    file: &mut std::fs::File,
    revision: u32,
    counters: &ChessStats,
    cur_move: u32,
) -> std::io::Result<()> {
    let mut record = ExportRecord {
        revision: revision + 1, // odd: write in flight
        _pad: 0,
        counters: *counters,
        cur_move,
        _pad2: 0,
    };
    file.seek(SeekFrom::Start(0))?;
    file.write_all(bytemuck::bytes_of(&record))?;
    file.flush()?;

    record.revision = revision + 2; // even: stable
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&record.revision.to_ne_bytes())?;
    file.flush()
}

impl Drop for StateExporter {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

#[cfg(test)]
mod exporter_tests {
    use super::*;

    #[test]
    fn record_layout_is_stable() {
        // revision + pad + 25 counters + cur_move + pad.
        assert_eq!(8 + 25 * 8 + 8, std::mem::size_of::<ExportRecord>());
    }

    #[test]
    fn exporter_publishes_even_revisions() {
        let path = std::env::temp_dir().join(format!("sable-stats-test-{}", std::process::id()));
        let shared = Arc::new(SharedSearchState::default());
        shared.publish(&ChessStats { nodes: 42, ..Default::default() }, None);
        {
            let _exporter = StateExporter::start(path.clone(), 200, Arc::clone(&shared));
            std::thread::sleep(Duration::from_millis(50));
        }
        let bytes = std::fs::read(&path).unwrap();
        let record: ExportRecord = bytemuck::pod_read_unaligned(&bytes);
        assert!(record.revision > 0 && record.revision % 2 == 0);
        assert_eq!(42, record.counters.nodes);
        std::fs::remove_file(path).ok();
    }
}
