//! Adaptive polymorphic inline cache for dynamic method calls.
//!
//! A site starts with two active entries, enough for the mono- and bimorphic
//! sites that dominate real programs. Sustained misses over the lifetime
//! counters promote it to four entries; a promoted site that keeps missing a
//! whole window is demoted again and frozen for a few windows so it cannot
//! oscillate. Entries are keyed by `(class id, layout version)` and kept in
//! most-recently-used order.
//!
//! The state lock is released before any invoker runs, so a method body may
//! re-enter the same site (recursion) and several threads may share it.

mod config;
mod invoker;
mod stats;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;

use crate::val::Value;
use crate::val::methods::invoke_method;
use crate::vm::CallContext;

pub use config::PicConfig;
pub use invoker::Invoker;
pub use stats::{CallSiteReport, CallSiteStats, FunctionPicSummary};

/// Entry capacity of a promoted site.
pub const MAX_ENTRIES: usize = 4;
/// Active entries of a fresh or demoted site.
pub const BASE_ENTRIES: usize = 2;
/// Set on keys of class values so `C` and instances of `C` never collide.
pub const META_KEY_BIT: u64 = 1 << 63;

/// Cache key of `receiver`: `(key, layout version)`, or `None` when the
/// receiver has no class identity.
#[inline]
pub fn receiver_key(receiver: &Value) -> Option<(u64, u64)> {
    match receiver {
        Value::Instance(inst) => {
            let class = inst.class();
            Some((class.id(), class.layout_version()))
        }
        Value::Class(class) => Some((class.id() | META_KEY_BIT, class.layout_version())),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct Entry {
    key: u64,
    version: u64,
    invoker: Invoker,
}

impl Entry {
    #[inline]
    fn matches(&self, key: u64, version: u64) -> bool {
        self.key == key && self.version == version
    }
}

#[derive(Debug)]
struct SiteState {
    entries: [Option<Entry>; MAX_ENTRIES],
    active: usize,
    promoted: bool,
    freeze: u32,
    lifetime_accesses: u32,
    lifetime_misses: u32,
    window_accesses: u32,
    window_misses: u32,
    hits: u64,
    misses: u64,
    cold: u64,
    promotions: u64,
    demotions: u64,
}

impl SiteState {
    fn new(config: &PicConfig) -> Self {
        Self {
            entries: Default::default(),
            active: if config.always_four { MAX_ENTRIES } else { BASE_ENTRIES },
            promoted: false,
            freeze: 0,
            lifetime_accesses: 0,
            lifetime_misses: 0,
            window_accesses: 0,
            window_misses: 0,
            hits: 0,
            misses: 0,
            cold: 0,
            promotions: 0,
            demotions: 0,
        }
    }

    /// Find a live entry among the active ones and move it to the front.
    fn lookup(&mut self, key: u64, version: u64) -> Option<Invoker> {
        let active = &mut self.entries[..self.active];
        let idx = active.iter().position(|e| e.as_ref().is_some_and(|e| e.matches(key, version)))?;
        if idx > 0 {
            active[..=idx].rotate_right(1);
        }
        active[0].as_ref().map(|e| e.invoker.clone())
    }

    /// Insert at the front, evicting the oldest active entry. A matching
    /// entry that appeared meanwhile (re-entrant or parallel miss) is
    /// replaced in place instead of duplicated.
    fn insert(&mut self, entry: Entry) {
        let active = &mut self.entries[..self.active];
        let idx = active
            .iter()
            .position(|e| e.as_ref().is_some_and(|e| e.matches(entry.key, entry.version)))
            .unwrap_or(active.len() - 1);
        active[..=idx].rotate_right(1);
        active[0] = Some(entry);
    }

    fn record_hit(&mut self, config: &PicConfig, site: &str) {
        self.hits += 1;
        if config.adapts() {
            self.lifetime_accesses = self.lifetime_accesses.saturating_add(1).min(config.counter_cap);
            if self.advance_window(config, false) {
                self.log_demotion(site);
            }
        }
    }

    fn record_miss(&mut self, config: &PicConfig, site: &str) {
        self.misses += 1;
        if !config.adapts() {
            return;
        }
        self.lifetime_accesses = self.lifetime_accesses.saturating_add(1).min(config.counter_cap);
        self.lifetime_misses = self.lifetime_misses.saturating_add(1).min(config.counter_cap);
        if self.advance_window(config, true) {
            self.log_demotion(site);
        }

        if self.promoted || self.freeze > 0 || self.lifetime_accesses < config.promote_after {
            return;
        }
        let miss_pct = self.lifetime_misses as u64 * 100;
        if miss_pct > config.promote_miss_pct as u64 * self.lifetime_accesses as u64 {
            self.promoted = true;
            self.active = MAX_ENTRIES;
            self.promotions += 1;
            tracing::debug!(
                target: "slotvm::pic",
                site,
                accesses = self.lifetime_accesses,
                misses = self.lifetime_misses,
                "promoted to {} entries",
                MAX_ENTRIES
            );
        }
        self.lifetime_accesses = 0;
        self.lifetime_misses = 0;
    }

    /// Count one access in the demotion window. Returns whether the site
    /// was demoted.
    fn advance_window(&mut self, config: &PicConfig, miss: bool) -> bool {
        if !config.windowed_demotion {
            return false;
        }
        self.window_accesses += 1;
        if miss {
            self.window_misses += 1;
        }
        if self.window_accesses < config.window {
            return false;
        }
        let (accesses, misses) = (self.window_accesses as u64, self.window_misses as u64);
        self.window_accesses = 0;
        self.window_misses = 0;
        if self.freeze > 0 {
            self.freeze -= 1;
            return false;
        }
        if self.promoted && misses * 100 >= config.demote_miss_pct as u64 * accesses {
            self.demote(config);
            return true;
        }
        false
    }

    fn log_demotion(&self, site: &str) {
        tracing::debug!(
            target: "slotvm::pic",
            site,
            freeze = self.freeze,
            "demoted to {} entries",
            BASE_ENTRIES
        );
    }

    fn demote(&mut self, config: &PicConfig) {
        self.promoted = false;
        self.active = BASE_ENTRIES;
        for entry in &mut self.entries[BASE_ENTRIES..] {
            *entry = None;
        }
        self.freeze = config.freeze_windows;
        self.lifetime_accesses = 0;
        self.lifetime_misses = 0;
        self.demotions += 1;
    }

    fn stats(&self) -> CallSiteStats {
        CallSiteStats {
            hits: self.hits,
            misses: self.misses,
            cold: self.cold,
            promotions: self.promotions,
            demotions: self.demotions,
            active_slots: self.active,
            promoted: self.promoted,
            freeze_remaining: self.freeze,
            entries: self.entries[..self.active].iter().filter(|e| e.is_some()).count(),
        }
    }
}

/// Per-call-site dispatch cache for one method name.
pub struct MethodCallSite {
    name: Arc<str>,
    config: PicConfig,
    state: Mutex<SiteState>,
}

impl MethodCallSite {
    pub fn new(name: impl Into<Arc<str>>, config: PicConfig) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(SiteState::new(&config)),
            config,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn config(&self) -> &PicConfig {
        &self.config
    }

    #[inline]
    fn state(&self) -> MutexGuard<'_, SiteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Call the site's method on `receiver`. Results and errors are the same
    /// as [`invoke_method`] would produce.
    pub fn invoke(&self, ctx: &mut CallContext, receiver: &Value, args: &[Value]) -> Result<Value> {
        let name = self.name.as_ref();
        let key = if self.config.enabled { receiver_key(receiver) } else { None };
        let Some((key, version)) = key else {
            self.state().cold += 1;
            return invoke_method(ctx, receiver, name, args);
        };

        let cached = {
            let mut state = self.state();
            let found = state.lookup(key, version);
            match found {
                Some(_) => state.record_hit(&self.config, name),
                None => state.record_miss(&self.config, name),
            }
            found
        };
        if let Some(invoker) = cached {
            return invoker.invoke(ctx, receiver, name, args);
        }

        let invoker = Invoker::resolve(ctx, receiver, name);
        tracing::trace!(
            target: "slotvm::pic",
            site = name,
            key,
            version,
            invoker = invoker.kind(),
            "miss"
        );
        if let Invoker::CachedError(err) = &invoker {
            tracing::debug!(target: "slotvm::pic", site = name, key, version, error = %err, "caching resolution failure");
        }
        self.state().insert(Entry {
            key,
            version,
            invoker: invoker.clone(),
        });
        invoker.invoke(ctx, receiver, name, args)
    }

    pub fn stats(&self) -> CallSiteStats {
        self.state().stats()
    }

    #[inline]
    pub fn active_slots(&self) -> usize {
        self.state().active
    }

    #[inline]
    pub fn is_promoted(&self) -> bool {
        self.state().promoted
    }

    /// Kinds of the active entries, front first. `None` marks an empty entry.
    pub fn entry_kinds(&self) -> Vec<Option<&'static str>> {
        let state = self.state();
        state.entries[..state.active]
            .iter()
            .map(|e| e.as_ref().map(|e| e.invoker.kind()))
            .collect()
    }
}

impl fmt::Debug for MethodCallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodCallSite")
            .field("name", &self.name)
            .field("stats", &self.stats())
            .finish()
    }
}
