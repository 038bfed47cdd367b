//! Content-addressed composition plan cache.
//!
//! Plans are keyed by source reference, a SHA-256 of the project
//! description and the frame rate. Reads never block each other; planning
//! for one key is serialized so a plan is computed at most once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use sha2::{Digest, Sha256};

use revunk_common::error::RevunkResult;
use revunk_common::time::FrameRate;
use revunk_processing_core::planner;
use revunk_project_model::plan::CompositionPlan;
use revunk_project_model::project::ProjectDescription;

/// Cache key for one plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanKey {
    pub source_reference: String,
    pub description_hash: [u8; 32],
    pub frame_rate: FrameRate,
}

impl PlanKey {
    pub fn for_project(project: &ProjectDescription, frame_rate: FrameRate) -> RevunkResult<Self> {
        let encoded = serde_json::to_vec(project)?;
        let mut description_hash = [0u8; 32];
        description_hash.copy_from_slice(&Sha256::digest(&encoded));
        Ok(Self {
            source_reference: project.source_reference.clone().unwrap_or_default(),
            description_hash,
            frame_rate,
        })
    }
}

#[derive(Default)]
struct Slot {
    plan: OnceLock<Arc<CompositionPlan>>,
    planning: Mutex<()>,
}

/// Shared plan cache.
#[derive(Default)]
pub struct PlanCache {
    slots: RwLock<HashMap<PlanKey, Arc<Slot>>>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached plan for `key`, if one has been computed.
    pub fn get(&self, key: &PlanKey) -> Option<Arc<CompositionPlan>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).and_then(|slot| slot.plan.get().cloned())
    }

    /// Return the cached plan or compute and store it.
    ///
    /// Planning errors are returned and not cached.
    pub fn get_or_plan(
        &self,
        project: &ProjectDescription,
        frame_rate: FrameRate,
    ) -> RevunkResult<Arc<CompositionPlan>> {
        let key = PlanKey::for_project(project, frame_rate)?;
        let slot = self.slot(&key);

        if let Some(plan) = slot.plan.get() {
            tracing::debug!(source = %key.source_reference, "Plan cache hit");
            return Ok(Arc::clone(plan));
        }

        let _guard = slot.planning.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(plan) = slot.plan.get() {
            return Ok(Arc::clone(plan));
        }

        let plan = Arc::new(planner::plan(project, frame_rate)?);
        let _ = slot.plan.set(Arc::clone(&plan));
        tracing::debug!(source = %key.source_reference, "Plan cached");
        Ok(plan)
    }

    /// Number of keys with a computed plan.
    pub fn len(&self) -> usize {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|slot| slot.plan.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &PlanKey) -> Arc<Slot> {
        {
            let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = slots.get(key) {
                return Arc::clone(slot);
            }
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.clone()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revunk_common::error::RevunkError;
    use revunk_project_model::parser::parse_script;

    fn project() -> ProjectDescription {
        parse_script("video: a.mov\nbpm: 120\ndownbeat: 0\nexport:\n  1 2 3 4\n").unwrap()
    }

    #[test]
    fn test_second_lookup_returns_same_plan() {
        let cache = PlanCache::new();
        let first = cache.get_or_plan(&project(), FrameRate::fps(30)).unwrap();
        let second = cache.get_or_plan(&project(), FrameRate::fps(30)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_frame_rate_is_part_of_key() {
        let cache = PlanCache::new();
        let a = cache.get_or_plan(&project(), FrameRate::fps(30)).unwrap();
        let b = cache.get_or_plan(&project(), FrameRate::fps(24)).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_description_change_misses() {
        let cache = PlanCache::new();
        cache.get_or_plan(&project(), FrameRate::fps(30)).unwrap();

        let mut edited = project();
        edited.export_beats.pop();
        let key = PlanKey::for_project(&edited, FrameRate::fps(30)).unwrap();
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = PlanCache::new();
        let mut broken = project();
        broken.export_beats.clear();
        assert!(matches!(
            cache.get_or_plan(&broken, FrameRate::fps(30)),
            Err(RevunkError::EmptyExport)
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_callers_share_one_plan() {
        let cache = Arc::new(PlanCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get_or_plan(&project(), FrameRate::fps(30)).unwrap())
            })
            .collect();
        let plans: Vec<Arc<CompositionPlan>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        for plan in &plans[1..] {
            assert!(Arc::ptr_eq(&plans[0], plan));
        }
    }
}
