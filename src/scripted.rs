//! A motion tracker whose answers are dictated by the test.

use crate::{
    motion::{FrameGeometry, MotionTracker, ObjectId, SessionFactory},
    object::BBox,
};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

type Key = (usize, ObjectId);

#[derive(Default)]
struct Script {
    seed_correlations: VecDeque<f32>,
    correlations: HashMap<Key, f32>,
    positions: HashMap<Key, BBox>,
    live: HashSet<Key>,
    seeds: usize,
    releases: usize,
    frames: usize,
    position_updates: usize,
    sessions_created: usize,
    sessions_destroyed: usize,
}

impl Script {
    fn current_session(&self) -> usize {
        self.sessions_created.saturating_sub(1)
    }
}

#[derive(Clone, Default)]
pub struct ScriptedMotion {
    script: Arc<Mutex<Script>>,
}

impl ScriptedMotion {
    pub fn tracker(&self) -> Box<dyn MotionTracker> {
        let session = {
            let mut script = self.script.lock();
            script.sessions_created += 1;
            script.sessions_created - 1
        };
        Box::new(ScriptedTracker {
            session,
            script: self.script.clone(),
        })
    }

    pub fn factory(&self) -> impl SessionFactory {
        let motion = self.clone();
        move |_geometry: FrameGeometry| Some(motion.tracker())
    }

    /// Correlation reported right after the next seed. Seeds without a
    /// scripted value correlate perfectly.
    pub fn push_seed_correlation(&self, correlation: f32) {
        self.script.lock().seed_correlations.push_back(correlation);
    }

    pub fn set_correlation(&self, object: ObjectId, correlation: f32) {
        let mut script = self.script.lock();
        let key = (script.current_session(), object);
        script.correlations.insert(key, correlation);
    }

    pub fn set_all_correlations(&self, correlation: f32) {
        let mut script = self.script.lock();
        let live: Vec<Key> = script.live.iter().copied().collect();
        for key in live {
            script.correlations.insert(key, correlation);
        }
    }

    pub fn set_position(&self, object: ObjectId, position: BBox) {
        let mut script = self.script.lock();
        let key = (script.current_session(), object);
        script.positions.insert(key, position);
    }

    pub fn seeds(&self) -> usize {
        self.script.lock().seeds
    }

    pub fn releases(&self) -> usize {
        self.script.lock().releases
    }

    pub fn live(&self) -> usize {
        self.script.lock().live.len()
    }

    pub fn frames(&self) -> usize {
        self.script.lock().frames
    }

    pub fn position_updates(&self) -> usize {
        self.script.lock().position_updates
    }

    pub fn sessions_created(&self) -> usize {
        self.script.lock().sessions_created
    }

    pub fn destroyed_sessions(&self) -> usize {
        self.script.lock().sessions_destroyed
    }
}

struct ScriptedTracker {
    session: usize,
    script: Arc<Mutex<Script>>,
}

impl MotionTracker for ScriptedTracker {
    fn seed(&mut self, object: ObjectId, position: &BBox, _frame: &[u8], _timestamp_ns: u64) {
        let mut script = self.script.lock();
        let key = (self.session, object);
        let correlation = script.seed_correlations.pop_front().unwrap_or(1.0);
        assert!(script.live.insert(key), "object {object:?} seeded twice");
        script.correlations.insert(key, correlation);
        script.positions.insert(key, *position);
        script.seeds += 1;
    }

    fn advance(&mut self, _frame: &[u8], _timestamp_ns: u64) {
        self.script.lock().frames += 1;
    }

    fn set_position(&mut self, object: ObjectId, position: &BBox, _timestamp_ns: u64) {
        let mut script = self.script.lock();
        script.positions.insert((self.session, object), *position);
        script.position_updates += 1;
    }

    fn position_of(&self, object: ObjectId) -> Option<BBox> {
        self.script
            .lock()
            .positions
            .get(&(self.session, object))
            .copied()
    }

    fn correlation_of(&self, object: ObjectId) -> f32 {
        self.script
            .lock()
            .correlations
            .get(&(self.session, object))
            .copied()
            .unwrap_or(0.0)
    }

    fn release(&mut self, object: ObjectId) {
        let mut script = self.script.lock();
        assert!(
            script.live.remove(&(self.session, object)),
            "object {object:?} released twice"
        );
        script.releases += 1;
    }

    fn destroy_session(&mut self) {
        self.script.lock().sessions_destroyed += 1;
    }
}
