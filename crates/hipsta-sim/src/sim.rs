use std::sync::{Arc, Mutex};

use hipsta_core::{EntityStore, Item, ListQuery, StoreError, StoreRole, Tag};
use hipsta_sync::{Completion, Coordinator, MemoryStore, RemoteConfig, RemoteStore, SyncConfig};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::fault::{is_injected_sync_fault, FaultConfig, FaultStats, FaultyStore};
use crate::invariants::{check_equivalence, check_phase_order, Phase, Violation};
use crate::ops::{generate, Op};

/// A single operation/result entry captured during simulation.
#[derive(Debug, Clone)]
pub struct SimTraceEntry {
    pub step: usize,
    pub op: String,
    pub outcome: String,
}

type PhaseLog = Arc<Mutex<Vec<Phase>>>;

fn recorder<T>(log: &PhaseLog, phase: Phase) -> impl FnOnce(Result<T, StoreError>) + Send {
    let log = log.clone();
    move |_| log.lock().unwrap_or_else(|e| e.into_inner()).push(phase)
}

fn outcome<T>(done: &Completion<T>) -> String {
    let half = |r: &Result<T, StoreError>| match r {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("err({})", e),
    };
    format!("quick={} full={}", half(&done.quick), half(&done.full))
}

/// Drives random client operations through a coordinator whose remote
/// service fails at random, then checks that a clean sync reconciles
/// both stores.
pub struct Sim {
    pub rng: ChaCha8Rng,
    pub step: usize,
    pub violations: Vec<Violation>,
    pub trace: Vec<SimTraceEntry>,
    local: Arc<MemoryStore>,
    service: Arc<MemoryStore>,
    faulty: Arc<FaultyStore>,
    remote: Arc<RemoteStore>,
    coordinator: Coordinator,
}

impl Sim {
    /// Create a new deterministic simulation with the given seed.
    pub async fn new(seed: u64) -> Self {
        Self::new_with_faults(seed, None).await
    }

    /// Create a new deterministic simulation with optional fault injection.
    ///
    /// Must be called within a Tokio runtime.
    pub async fn new_with_faults(seed: u64, fault_config: Option<FaultConfig>) -> Self {
        let local = Arc::new(MemoryStore::new(StoreRole::Local));
        let service = Arc::new(MemoryStore::new(StoreRole::Remote));
        let faulty = Arc::new(FaultyStore::new(
            service.clone(),
            ChaCha8Rng::seed_from_u64(seed ^ 0xFA01_7FA0_17FA_017F),
            fault_config.unwrap_or_default(),
        ));
        let remote = Arc::new(RemoteStore::spawn(faulty.clone(), RemoteConfig::default()));
        let coordinator = Coordinator::new(local.clone(), remote.clone(), SyncConfig::default())
            .with_remote_activity(remote.subscribe());

        Sim {
            rng: ChaCha8Rng::seed_from_u64(seed),
            step: 0,
            violations: Vec::new(),
            trace: Vec::new(),
            local,
            service,
            faulty,
            remote,
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn fault_stats(&self) -> FaultStats {
        self.faulty.stats()
    }

    /// Run `steps` random operations.
    pub async fn run(&mut self, steps: usize) -> &[Violation] {
        for _ in 0..steps {
            let op = generate(&mut self.rng);
            self.step_with(op).await;
        }
        &self.violations
    }

    /// Run one operation and check the per-step invariants.
    pub async fn step_with(&mut self, op: Op) -> String {
        self.step += 1;
        let result = match self.apply(&op).await {
            Ok(outcome) => outcome,
            Err(e) => format!("harness error: {}", e),
        };
        debug!(step = self.step, op = ?op, outcome = %result, "sim step");
        self.trace.push(SimTraceEntry {
            step: self.step,
            op: format!("{:?}", op),
            outcome: result.clone(),
        });
        result
    }

    /// Turn faults off, sync, and check that both stores agree.
    ///
    /// Returns every violation seen over the whole run.
    pub async fn finish(&mut self) -> Vec<Violation> {
        self.faulty.set_enabled(false);
        let step = self.step;

        match self.coordinator.sync().await {
            Ok(report) => debug!(passes = report.passes, actions = report.actions_applied, "final sync"),
            Err(e) => self
                .violations
                .push(Violation::new(step, "final-sync", e.to_string())),
        }

        let equivalence = check_equivalence(step, self.local.as_ref(), self.service.as_ref()).await;
        self.violations.extend(equivalence);

        match self.coordinator.sync().await {
            Ok(report) if report.actions_applied == 0 => {}
            Ok(report) => self.violations.push(Violation::new(
                step,
                "idempotent-sync",
                format!("second sync applied {} actions", report.actions_applied),
            )),
            Err(e) => self
                .violations
                .push(Violation::new(step, "idempotent-sync", e.to_string())),
        }

        if self.remote.in_flight() != 0 || self.coordinator.is_syncing() {
            self.violations.push(Violation::new(
                step,
                "quiescent",
                format!("{} remote requests still in flight", self.remote.in_flight()),
            ));
        }

        self.violations.clone()
    }

    async fn apply(&mut self, op: &Op) -> Result<String, StoreError> {
        let step = self.step;
        let label = format!("{:?}", op);
        let log: PhaseLog = Arc::new(Mutex::new(Vec::new()));

        let summary = match op {
            Op::Create { url, tags } => {
                let tags = tags
                    .iter()
                    .map(|name| Tag::new(name))
                    .collect::<Result<Vec<_>, _>>()?;
                let template = Item::new(url.as_str()).with_tags(tags);
                let done = self
                    .coordinator
                    .create(Some(template), recorder(&log, Phase::Quick), recorder(&log, Phase::Full))
                    .await;
                self.check_linked(&done).await?;
                self.check_quick(&label, &done);
                outcome(&done)
            }
            Op::Read { slot } => {
                let Some(item) = self.pick_local(*slot).await? else {
                    return Ok("skipped".to_string());
                };
                let id = item.local_id.unwrap_or_default();
                let done = self
                    .coordinator
                    .read(&id, recorder(&log, Phase::Quick), recorder(&log, Phase::Full))
                    .await;
                self.check_quick(&label, &done);
                outcome(&done)
            }
            Op::SetArchived { slot, archived } => {
                let Some(mut item) = self.pick_local(*slot).await? else {
                    return Ok("skipped".to_string());
                };
                item.is_archived = *archived;
                let done = self
                    .coordinator
                    .update(item, recorder(&log, Phase::Quick), recorder(&log, Phase::Full))
                    .await;
                self.check_quick(&label, &done);
                outcome(&done)
            }
            Op::ToggleTag { slot, tag } => {
                let Some(mut item) = self.pick_local(*slot).await? else {
                    return Ok("skipped".to_string());
                };
                let tag = Tag::new(tag)?;
                if !item.tags.remove(&tag) {
                    item.tags.insert(tag);
                }
                let done = self
                    .coordinator
                    .update(item, recorder(&log, Phase::Quick), recorder(&log, Phase::Full))
                    .await;
                self.check_quick(&label, &done);
                outcome(&done)
            }
            Op::Delete { slot } => {
                let Some(item) = self.pick_local(*slot).await? else {
                    return Ok("skipped".to_string());
                };
                let done = self
                    .coordinator
                    .delete(item, recorder(&log, Phase::Quick), recorder(&log, Phase::Full))
                    .await;
                self.check_quick(&label, &done);
                outcome(&done)
            }
            Op::Sync => return Ok(self.sync_step().await),
            Op::RemoteEdit { .. } | Op::RemoteCreate { .. } | Op::RemoteDelete { .. } => {
                return self.apply_remote(op).await;
            }
        };

        let phases = log.lock().unwrap_or_else(|e| e.into_inner()).clone();
        self.violations.extend(check_phase_order(step, &label, &phases));
        Ok(summary)
    }

    /// A sync may fail on an injected fault; any other failure is a violation.
    async fn sync_step(&mut self) -> String {
        match self.coordinator.sync().await {
            Ok(report) => format!("synced in {} passes", report.passes),
            Err(e) => {
                if !is_injected_sync_fault(&e) {
                    self.violations
                        .push(Violation::new(self.step, "sync-error", e.to_string()));
                }
                format!("sync failed: {}", e)
            }
        }
    }

    /// Changes another device makes directly on the remote service.
    async fn apply_remote(&mut self, op: &Op) -> Result<String, StoreError> {
        match op {
            Op::RemoteCreate { url } => {
                let item = self.service.create(Some(&Item::new(url.as_str()))).await?;
                Ok(format!("remote created {:?}", item.remote_id))
            }
            Op::RemoteEdit { slot, url } => match self.pick(self.service.as_ref(), *slot).await? {
                Some(mut item) => {
                    item.url_string = url.clone();
                    item.touch();
                    self.service.update(&item).await?;
                    Ok(format!("remote edited {:?}", item.remote_id))
                }
                None => Ok("skipped".to_string()),
            },
            Op::RemoteDelete { slot } => match self.pick(self.service.as_ref(), *slot).await? {
                Some(item) => {
                    self.service.delete(&item).await?;
                    Ok(format!("remote deleted {:?}", item.remote_id))
                }
                None => Ok("skipped".to_string()),
            },
            _ => Ok("skipped".to_string()),
        }
    }

    async fn pick_local(&self, slot: usize) -> Result<Option<Item>, StoreError> {
        self.pick(self.local.as_ref(), slot).await
    }

    /// The record at `slot` among the store's ids in lexical order.
    async fn pick(&self, store: &dyn EntityStore, slot: usize) -> Result<Option<Item>, StoreError> {
        let mut ids = store.list(&ListQuery::default()).await?;
        if ids.is_empty() {
            return Ok(None);
        }
        ids.sort();
        let id = &ids[slot % ids.len()];
        store.read(id).await.map(Some)
    }

    /// The local store never fails here, so every quick result is a success.
    fn check_quick<T>(&mut self, label: &str, done: &Completion<T>) {
        if let Err(e) = &done.quick {
            self.violations
                .push(Violation::new(self.step, "quick-ok", format!("{}: {}", label, e)));
        }
    }

    /// A successful create leaves the local record linked to the new remote one.
    async fn check_linked(&mut self, done: &Completion<Item>) -> Result<(), StoreError> {
        let Ok(full) = &done.full else {
            return Ok(());
        };
        let Some(local_id) = full.local_id.as_deref() else {
            self.violations
                .push(Violation::new(self.step, "linked-after-create", "full result has no local id"));
            return Ok(());
        };
        let stored = self.local.read(local_id).await?;
        if stored.remote_id.is_none() || stored.remote_id != full.remote_id {
            self.violations.push(Violation::new(
                self.step,
                "linked-after-create",
                format!("{} links to {:?}, full reported {:?}", local_id, stored.remote_id, full.remote_id),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_scripted_run_without_faults() {
        let mut sim = Sim::new(1).await;
        sim.step_with(Op::Create {
            url: "https://a.example".to_string(),
            tags: vec!["news".to_string()],
        })
        .await;
        sim.step_with(Op::ToggleTag {
            slot: 0,
            tag: "News".to_string(),
        })
        .await;
        sim.step_with(Op::RemoteCreate {
            url: "https://b.example".to_string(),
        })
        .await;
        sim.step_with(Op::Sync).await;
        sim.step_with(Op::RemoteDelete { slot: 0 }).await;
        sim.step_with(Op::Read { slot: 0 }).await;

        let violations = sim.finish().await;
        assert!(violations.is_empty(), "{:?}", violations);
        assert_eq!(sim.trace.len(), 6);
        assert_eq!(sim.fault_stats().fault_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ops_on_empty_stores_are_skipped() {
        let mut sim = Sim::new(2).await;
        assert_eq!(sim.step_with(Op::Delete { slot: 3 }).await, "skipped");
        assert_eq!(sim.step_with(Op::RemoteEdit { slot: 1, url: "https://x.example".to_string() }).await, "skipped");
        assert!(sim.finish().await.is_empty());
    }
}
