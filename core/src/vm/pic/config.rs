use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

/// Call-site cache tuning, handed to every [`MethodCallSite`](super::MethodCallSite).
///
/// Deserializes from partial documents; missing keys take the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PicConfig {
    /// Cache dispatch decisions at all. When off every call resolves fully.
    pub enabled: bool,
    /// Run with four active entries from the start and never adapt.
    pub always_four: bool,
    /// Promote from two to four entries under sustained polymorphism.
    pub adaptive: bool,
    /// Demote back to two entries when a promoted site keeps missing.
    pub windowed_demotion: bool,
    /// Lifetime accesses between promotion checks.
    pub promote_after: u32,
    /// Promote when lifetime misses exceed this share of accesses.
    pub promote_miss_pct: u32,
    /// Accesses per demotion window.
    pub window: u32,
    /// Demote when window misses reach this share of accesses.
    pub demote_miss_pct: u32,
    /// Windows skipped after a demotion before promotion may fire again.
    pub freeze_windows: u32,
    /// Saturation point of the lifetime counters.
    pub counter_cap: u32,
}

impl Default for PicConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            always_four: false,
            adaptive: true,
            windowed_demotion: true,
            promote_after: 256,
            promote_miss_pct: 20,
            window: 256,
            demote_miss_pct: 25,
            freeze_windows: 4,
            counter_cap: 1_000_000,
        }
    }
}

impl PicConfig {
    /// Every call goes through full resolution.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.promote_after > 0, "promote_after must be positive");
        ensure!(self.window > 0, "window must be positive");
        ensure!(
            self.promote_miss_pct <= 100 && self.demote_miss_pct <= 100,
            "miss percentages must be within 0..=100"
        );
        ensure!(
            self.counter_cap >= self.promote_after,
            "counter_cap ({}) below promote_after ({})",
            self.counter_cap,
            self.promote_after
        );
        Ok(())
    }

    /// Whether the active entry count may change at runtime.
    #[inline]
    pub(crate) fn adapts(&self) -> bool {
        self.enabled && self.adaptive && !self.always_four
    }
}
