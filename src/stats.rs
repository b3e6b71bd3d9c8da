use bytemuck::{Pod, Zeroable};
use log::debug;

/// Search counters, one instance per search thread. The layout is fixed and
/// padding-free because the statistics exporter publishes it verbatim.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ChessStats {
    pub nodes: u64,
    pub qnodes: u64,
    pub n_standing_pat: u64,
    pub n_draws: u64,
    pub n_qs_early_stop: u64,

    pub alpha_distance: u64,
    pub beta_distance: u64,
    pub n_alpha_distances: u64,
    pub n_beta_distances: u64,

    pub tt_query: u64,
    pub tt_hit: u64,
    pub tt_store: u64,
    pub tt_invalid: u64,

    pub n_null_move: u64,
    pub n_null_move_hit: u64,

    pub n_lmr: u64,
    pub n_lmr_hit: u64,

    pub n_static_eval: u64,
    pub n_static_eval_hit: u64,

    pub n_moves_cutoff: u64,
    pub nmc_nodes: u64,
    pub n_qmoves_cutoff: u64,
    pub nmc_qnodes: u64,

    pub syzygy_queries: u64,
    pub syzygy_query_hits: u64,
}

impl ChessStats {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn add(&mut self, other: &Self) {
        let dst: &mut [u64; 25] = bytemuck::cast_mut(self);
        let src: &[u64; 25] = bytemuck::cast_ref(other);
        for (d, s) in dst.iter_mut().zip(src) {
            *d += s;
        }
    }

    pub fn total_nodes(&self) -> u64 {
        self.nodes + self.qnodes
    }

    fn pct(part: u64, whole: u64) -> f64 {
        if whole == 0 {
            return 0.0;
        }
        part as f64 * 100.0 / whole as f64
    }

    fn ratio(a: u64, b: u64) -> f64 {
        if b == 0 {
            return 0.0;
        }
        a as f64 / b as f64
    }

    /// One-shot derived-statistics dump after a completed search.
    pub fn log_summary(&self, header: &str) {
        debug!("* {header} *");
        debug!(
            "{} search {} qs: qs/s={:.3}, draws: {:.2}%, standing pat: {:.2}%",
            self.nodes,
            self.qnodes,
            Self::ratio(self.qnodes, self.nodes),
            Self::pct(self.n_draws, self.nodes),
            Self::pct(self.n_standing_pat, self.qnodes),
        );
        debug!(
            "{:.2}% tt hit, {:.2} tt query/store, {:.2}% syzygy hit",
            Self::pct(self.tt_hit, self.tt_query),
            Self::ratio(self.tt_query, self.tt_store),
            Self::pct(self.syzygy_query_hits, self.syzygy_queries),
        );
        debug!(
            "avg bco index: {:.2}, qs bco index: {:.2}, qs early stop: {:.2}%",
            Self::ratio(self.n_moves_cutoff, self.nmc_nodes),
            Self::ratio(self.n_qmoves_cutoff, self.nmc_qnodes),
            Self::pct(self.n_qs_early_stop, self.qnodes),
        );
        debug!(
            "null move co: {:.2}%, LMR co: {:.2}%, static eval co: {:.2}%",
            Self::pct(self.n_null_move_hit, self.n_null_move),
            Self::pct(self.n_lmr_hit, self.n_lmr),
            Self::pct(self.n_static_eval_hit, self.n_static_eval),
        );
        debug!(
            "avg a/b distance: {:.2}/{:.2}",
            Self::ratio(self.alpha_distance, self.n_alpha_distances),
            Self::ratio(self.beta_distance, self.n_beta_distances),
        );
    }
}
