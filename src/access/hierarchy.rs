use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

use crate::organizations::Organization;

/// Transitive closure of one organization's subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyExpansion {
    /// The root plus every descendant organization id, in traversal order.
    pub organization_ids: Vec<Uuid>,
    /// Union of practice uids owned directly across the closure.
    pub practice_uids: Vec<i64>,
}

impl HierarchyExpansion {
    /// True when the expansion reached beyond the root organization alone.
    pub fn expanded_beyond_root(&self) -> bool {
        self.organization_ids.len() > 1
    }
}

/// Expand `root` to itself plus all descendants, unioning the practice uids
/// owned across the subtree. Deactivated or soft-deleted organizations are
/// pruned together with their entire subtree: a partition owned below a
/// disabled node stays inaccessible until that node is restored. Only the
/// root is vouched for by the caller. The graph is expected to be a forest,
/// but a malformed parent cycle must not hang the traversal, so visited ids
/// are tracked explicitly.
pub fn expand_hierarchy(root: Uuid, organizations: &[Organization]) -> HierarchyExpansion {
    let mut children: HashMap<Uuid, Vec<&Organization>> = HashMap::new();
    let mut by_id: HashMap<Uuid, &Organization> = HashMap::new();
    for org in organizations {
        by_id.insert(org.id, org);
        if let Some(parent) = org.parent_id {
            children.entry(parent).or_default().push(org);
        }
    }

    let mut visited: HashSet<Uuid> = HashSet::new();
    let mut organization_ids = Vec::new();
    let mut practice_uids: Vec<i64> = Vec::new();

    let mut queue = VecDeque::from([root]);
    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }

        let org = by_id.get(&id).copied();
        let usable = org.map(Organization::is_usable).unwrap_or(false);
        if id != root && !usable {
            continue;
        }
        organization_ids.push(id);

        if let Some(org) = org {
            if usable {
                practice_uids.extend(&org.practice_uids);
            }
        }
        if let Some(kids) = children.get(&id) {
            queue.extend(kids.iter().map(|o| o.id));
        }
    }

    practice_uids.sort_unstable();
    practice_uids.dedup();

    HierarchyExpansion {
        organization_ids,
        practice_uids,
    }
}
