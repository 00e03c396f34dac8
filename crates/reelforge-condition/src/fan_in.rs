//! Runtime fan-in materialisation (§4.7 step 5): turn an expander
//! [`FanInDescriptor`] into the dense, ordered value the runner stores on
//! `resolvedInputs`.

use reelforge_expand::FanInDescriptor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanInValue {
    pub group_by: Option<String>,
    pub order_by: Option<String>,
    /// `groups[k]` is the ordered list of canonical source ids in group `k`;
    /// dense (no gaps), with empty groups represented as `[]`.
    pub groups: Vec<Vec<String>>,
}

/// Fold a descriptor's flat member list into dense, ordered groups.
pub fn materialise_fan_in(descriptor: &FanInDescriptor) -> FanInValue {
    let max_group = descriptor.members.iter().map(|m| m.group).max();
    let mut groups = vec![Vec::new(); max_group.map(|m| m + 1).unwrap_or(0)];

    let mut members = descriptor.members.clone();
    members.sort_by(|a, b| a.id.cmp(&b.id));
    members.sort_by_key(|m| (m.group, m.order.unwrap_or(0)));

    for member in members {
        groups[member.group].push(member.id);
    }

    FanInValue { group_by: descriptor.group_by.clone(), order_by: descriptor.order_by.clone(), groups }
}
