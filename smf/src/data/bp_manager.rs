//! bp_manager - locates the uplink classifier of a session with more than one anchor
use super::{DataPath, NodeIndex};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BpStatus {
    #[default]
    UnInitialized,
    AddingPsa,
    AddPsaSuccess,
}

/// Branching point state of one session.
#[derive(Debug, Default)]
pub struct BpManager {
    pub status: BpStatus,
    pub activated_paths: Vec<u32>,
    pub activating_path: Option<u32>,
    // Depth, counted from the access side, to which each UPF is shared with the activating path.
    pub upf_depths: HashMap<NodeIndex, usize>,
    pub ulcl: Option<NodeIndex>,
}

impl BpManager {
    /// Chooses the first data path not yet activated as the next one to bring up.
    pub fn select_next_anchor_candidate(&mut self, paths: &BTreeMap<u32, DataPath>) -> Option<u32> {
        self.activated_paths = paths
            .values()
            .filter(|p| p.activated)
            .map(|p| p.id)
            .collect();
        self.activating_path = paths.values().find(|p| !p.activated).map(|p| p.id);
        if self.activating_path.is_some() {
            self.status = BpStatus::AddingPsa;
        }
        self.activating_path
    }

    /// Walks each activated path alongside the activating path and records how deep each shared
    /// UPF lies.  The deepest shared UPF is the uplink classifier.
    ///
    /// Only the single deepest point is kept, so with three or more anchors the result is the
    /// branching point of the activating path and whichever activated path shares the longest
    /// prefix with it.
    pub fn find_branching_point(&mut self, paths: &BTreeMap<u32, DataPath>) -> Option<NodeIndex> {
        self.upf_depths.clear();
        self.ulcl = None;
        let activating = paths.get(&self.activating_path?)?;
        for path in self.activated_paths.iter().filter_map(|id| paths.get(id)) {
            for (position, (a, b)) in path.iter().zip(activating.iter()).enumerate() {
                if a.node != b.node {
                    break;
                }
                let depth = self.upf_depths.entry(a.node).or_default();
                *depth = (*depth).max(position + 1);
            }
        }
        self.ulcl = self
            .upf_depths
            .iter()
            .max_by_key(|(node, depth)| (**depth, **node))
            .map(|(node, _)| *node);
        self.ulcl
    }

    pub fn anchor_added(&mut self) {
        self.status = BpStatus::AddPsaSuccess;
        if let Some(id) = self.activating_path.take() {
            self.activated_paths.push(id);
        }
    }
}
