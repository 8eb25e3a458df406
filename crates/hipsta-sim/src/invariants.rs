use std::collections::HashMap;

use hipsta_core::{EntityStore, Item, ListQuery};

/// A violation detected during simulation.
#[derive(Debug, Clone)]
pub struct Violation {
    pub step: usize,
    pub invariant: String,
    pub details: String,
}

impl Violation {
    pub fn new(step: usize, invariant: &str, details: impl Into<String>) -> Self {
        Violation {
            step,
            invariant: invariant.to_string(),
            details: details.into(),
        }
    }
}

/// Which completion callback fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Quick,
    Full,
}

/// Each callback fires exactly once, quick first.
pub fn check_phase_order(step: usize, op: &str, phases: &[Phase]) -> Vec<Violation> {
    if phases == [Phase::Quick, Phase::Full] {
        return Vec::new();
    }
    vec![Violation::new(
        step,
        "phase-order",
        format!("{} delivered {:?}", op, phases),
    )]
}

async fn snapshot(store: &dyn EntityStore) -> Result<Vec<Item>, String> {
    let ids = store
        .list(&ListQuery::recently_modified())
        .await
        .map_err(|e| e.to_string())?;
    store.read_many(&ids).await.map_err(|e| e.to_string())
}

/// After a clean sync: every local record links to a distinct remote record
/// with the same content, and the remote store holds nothing else.
pub async fn check_equivalence(
    step: usize,
    local: &dyn EntityStore,
    remote: &dyn EntityStore,
) -> Vec<Violation> {
    let (local, remote) = match (snapshot(local).await, snapshot(remote).await) {
        (Ok(l), Ok(r)) => (l, r),
        (Err(e), _) | (_, Err(e)) => {
            return vec![Violation::new(step, "snapshot", e)];
        }
    };

    let mut violations = Vec::new();
    if local.len() != remote.len() {
        violations.push(Violation::new(
            step,
            "record-count",
            format!("local has {}, remote has {}", local.len(), remote.len()),
        ));
    }

    let by_remote_id: HashMap<&str, &Item> = remote
        .iter()
        .filter_map(|r| r.remote_id.as_deref().map(|id| (id, r)))
        .collect();
    let mut seen = HashMap::new();

    for l in &local {
        let local_id = l.local_id.as_deref().unwrap_or("-");
        let Some(remote_id) = l.remote_id.as_deref() else {
            violations.push(Violation::new(step, "linked", format!("{} is unlinked", local_id)));
            continue;
        };
        if let Some(other) = seen.insert(remote_id, local_id) {
            violations.push(Violation::new(
                step,
                "unique-link",
                format!("{} and {} both link to {}", other, local_id, remote_id),
            ));
        }
        match by_remote_id.get(remote_id) {
            None => violations.push(Violation::new(
                step,
                "remote-twin",
                format!("{} links to missing {}", local_id, remote_id),
            )),
            Some(r) if !l.same_content(r) => violations.push(Violation::new(
                step,
                "same-content",
                format!("{} differs from {}: {:?} vs {:?}", local_id, remote_id, l, r),
            )),
            Some(_) => {}
        }
    }

    violations
}
