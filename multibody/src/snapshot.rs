use serde::{Deserialize, Serialize};

use crate::body::{BodyId, BodyState, Pose};

/// Committed state of every body after a step, indexed by [`BodyId`].
/// Read-only view handed to rendering and result writers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub step: u64,
    pub time: f64,
    pub states: Vec<BodyState>,
}

impl Snapshot {
    pub fn state(&self, id: BodyId) -> Option<&BodyState> {
        self.states.get(id.0)
    }

    pub fn pose(&self, id: BodyId) -> Option<Pose> {
        self.state(id).map(|s| s.pose())
    }

    pub fn poses(&self) -> impl Iterator<Item = (BodyId, Pose)> + '_ {
        self.states
            .iter()
            .enumerate()
            .map(|(i, s)| (BodyId(i), s.pose()))
    }
}
