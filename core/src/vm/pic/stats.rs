use serde::Serialize;

/// Point-in-time counters of one call site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CallSiteStats {
    pub hits: u64,
    pub misses: u64,
    /// Dispatches that bypassed the cache (uncacheable receiver or cache off).
    pub cold: u64,
    pub promotions: u64,
    pub demotions: u64,
    pub active_slots: usize,
    pub promoted: bool,
    pub freeze_remaining: u32,
    pub entries: usize,
}

impl CallSiteStats {
    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }

    /// Hits over cached accesses, `0.0` before the first access.
    pub fn hit_rate(&self) -> f64 {
        match self.accesses() {
            0 => 0.0,
            n => self.hits as f64 / n as f64,
        }
    }
}

/// Stats of one site together with where it lives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSiteReport {
    pub offset: usize,
    pub method: String,
    #[serde(flatten)]
    pub stats: CallSiteStats,
}

/// Per-function rollup of [`CallSiteReport`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FunctionPicSummary {
    pub sites: usize,
    pub hits: u64,
    pub misses: u64,
    pub cold: u64,
    pub promoted_sites: usize,
}

impl FunctionPicSummary {
    pub fn from_reports(reports: &[CallSiteReport]) -> Self {
        reports.iter().fold(Self::default(), |mut acc, r| {
            acc.sites += 1;
            acc.hits += r.stats.hits;
            acc.misses += r.stats.misses;
            acc.cold += r.stats.cold;
            if r.stats.promoted {
                acc.promoted_sites += 1;
            }
            acc
        })
    }
}
