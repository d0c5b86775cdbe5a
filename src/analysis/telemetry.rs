use crate::store::{VariableId, VariableRegistry};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated during evaluation.
#[derive(Debug)]
pub struct Telemetry {
    /// Formula executions per variable.
    evaluations: Vec<AtomicU64>,
    cache_hits: AtomicU64,
    probe_hits: AtomicU64,
    probe_misses: AtomicU64,
    /// Resolutions answered with a default-filled array.
    defaults_used: AtomicU64,
}

impl Telemetry {
    pub fn new(variables: usize) -> Self {
        Self {
            evaluations: (0..variables).map(|_| AtomicU64::new(0)).collect(),
            cache_hits: AtomicU64::new(0),
            probe_hits: AtomicU64::new(0),
            probe_misses: AtomicU64::new(0),
            defaults_used: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_evaluation(&self, id: VariableId) {
        if let Some(counter) = self.evaluations.get(id.index()) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_cache_hit(&self) { self.cache_hits.fetch_add(1, Ordering::Relaxed); }

    #[inline]
    pub fn record_probe(&self, hit: bool) {
        let counter = if hit { &self.probe_hits } else { &self.probe_misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_default(&self) { self.defaults_used.fetch_add(1, Ordering::Relaxed); }

    pub fn evaluations(&self, id: VariableId) -> u64 {
        self.evaluations.get(id.index()).map_or(0, |c| c.load(Ordering::Relaxed))
    }

    pub fn report(&self, registry: &VariableRegistry) -> TelemetryReport {
        let evaluations: BTreeMap<String, u64> = registry
            .definitions()
            .map(|(id, def)| (def.name.clone(), self.evaluations(id)))
            .filter(|(_, n)| *n > 0)
            .collect();

        TelemetryReport {
            total_evaluations: evaluations.values().sum(),
            evaluations,
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            probe_hits: self.probe_hits.load(Ordering::Relaxed),
            probe_misses: self.probe_misses.load(Ordering::Relaxed),
            defaults_used: self.defaults_used.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetryReport {
    pub total_evaluations: u64,
    /// Only variables whose formula ran at least once.
    pub evaluations: BTreeMap<String, u64>,
    pub cache_hits: u64,
    pub probe_hits: u64,
    pub probe_misses: u64,
    pub defaults_used: u64,
}

impl TelemetryReport {
    /// Share of resolutions served from the cache.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.total_evaluations;
        if total > 0 { self.cache_hits as f64 / total as f64 } else { 0.0 }
    }
}
