//! Group flattening

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use nom_config::{ConfigError, GroupConfig};
use tracing::error;

/// Flatten every group into its member node ids
///
/// Members keep their first position and appear once. A group that contains
/// itself, directly or through other groups, is reported and the offending
/// branch contributes nothing; the rest of the group still resolves. Unknown
/// member groups are skipped here, config validation reports them.
pub fn flatten_groups(groups: &[GroupConfig]) -> (IndexMap<String, Vec<String>>, Vec<ConfigError>) {
    let by_id: IndexMap<&str, &GroupConfig> = groups.iter().map(|g| (g.id.as_str(), g)).collect();
    let mut errors = Vec::new();
    let mut reported = HashSet::new();

    let flattened = groups
        .iter()
        .map(|group| {
            let mut members = IndexSet::new();
            let mut path = vec![group.id.as_str()];
            collect(group, &by_id, &mut path, &mut members, &mut |cyclic: &str| {
                if reported.insert(cyclic.to_string()) {
                    error!("Config Error: Circular reference with group id \"{}\"", cyclic);
                    errors.push(ConfigError::CyclicGroup(cyclic.to_string()));
                }
            });
            (group.id.clone(), members.into_iter().collect())
        })
        .collect();

    (flattened, errors)
}

fn collect<'a>(
    group: &'a GroupConfig,
    by_id: &IndexMap<&str, &'a GroupConfig>,
    path: &mut Vec<&'a str>,
    members: &mut IndexSet<String>,
    on_cycle: &mut dyn FnMut(&str),
) {
    for sub in &group.groups {
        if path.contains(&sub.as_str()) {
            on_cycle(sub);
            continue;
        }
        let Some(&sub_group) = by_id.get(sub.as_str()) else {
            continue;
        };
        path.push(sub.as_str());
        collect(sub_group, by_id, path, members, on_cycle);
        path.pop();
    }

    for node in &group.nodes {
        members.insert(node.clone());
    }
}
