//! Background index maintenance. Writers queue the ids they touched; every refresh interval
//! the queued ids are reloaded from the source of truth and the index is brought in line with
//! whatever the rows look like at that moment. `flush` waits until everything submitted so far
//! is searchable.

use super::{IndexOp, ProfileIndex};
use crate::entity::Profile;
use crate::error::AppError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// Current committed rows by id. Ids with no row are absent from the result.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn load(&self, ids: &[Uuid]) -> Result<Vec<Profile>, AppError>;
}

pub struct IndexSynchronizer {
    tx: mpsc::UnboundedSender<Uuid>,
    submitted: AtomicU64,
    applied: watch::Receiver<u64>,
}

impl IndexSynchronizer {
    /// Spawn the refresh task on the current runtime. It stops once the synchronizer is dropped
    /// and the queue is drained.
    pub fn spawn(index: Arc<ProfileIndex>, source: Arc<dyn ProfileSource>, refresh_interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (applied_tx, applied) = watch::channel(0);
        tokio::spawn(run(index, source, rx, applied_tx, refresh_interval));
        IndexSynchronizer {
            tx,
            submitted: AtomicU64::new(0),
            applied,
        }
    }

    /// Queue `id` for reindexing. Call after the write that touched it has committed.
    pub fn submit(&self, id: Uuid) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(id).is_err() {
            self.submitted.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!(%id, "search index task stopped; update dropped");
        }
    }

    pub async fn flush(&self) {
        let target = self.submitted.load(Ordering::SeqCst);
        let mut applied = self.applied.clone();
        // Err only when the task is gone; nothing left to wait for then.
        let _ = applied.wait_for(|n| *n >= target).await;
    }
}

async fn run(
    index: Arc<ProfileIndex>,
    source: Arc<dyn ProfileSource>,
    mut rx: mpsc::UnboundedReceiver<Uuid>,
    applied: watch::Sender<u64>,
    refresh_interval: Duration,
) {
    let mut ticker = tokio::time::interval(refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut total = 0u64;
    loop {
        ticker.tick().await;
        let mut received = Vec::new();
        let closed = loop {
            match rx.try_recv() {
                Ok(id) => received.push(id),
                Err(TryRecvError::Empty) => break false,
                Err(TryRecvError::Disconnected) => break true,
            }
        };
        if !received.is_empty() {
            let n = received.len() as u64;
            refresh(&index, source.as_ref(), received).await;
            // Count failed batches too so flush never hangs on them.
            total += n;
            applied.send_replace(total);
        }
        if closed {
            break;
        }
    }
}

/// Reload `ids` and upsert or remove each one according to its current row.
async fn refresh(index: &Arc<ProfileIndex>, source: &dyn ProfileSource, ids: Vec<Uuid>) {
    let mut seen = HashSet::with_capacity(ids.len());
    let ids: Vec<Uuid> = ids.into_iter().filter(|id| seen.insert(*id)).collect();
    let mut rows: HashMap<Uuid, Profile> = match source.load(&ids).await {
        Ok(rows) => rows.into_iter().map(|p| (p.id, p)).collect(),
        Err(e) => {
            tracing::error!(error = %e, ids = ids.len(), "reloading rows for the search index failed");
            return;
        }
    };
    let ops: Vec<IndexOp> = ids
        .into_iter()
        .map(|id| match rows.remove(&id) {
            Some(p) => IndexOp::Upsert(p),
            None => IndexOp::Remove(id),
        })
        .collect();
    let n = ops.len();
    let idx = index.clone();
    match tokio::task::spawn_blocking(move || idx.apply(ops)).await {
        Ok(Ok(())) => tracing::debug!(ops = n, "search index refreshed"),
        Ok(Err(e)) => tracing::error!(error = %e, ops = n, "search index commit failed"),
        Err(e) => tracing::error!(error = %e, ops = n, "search index task panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{IndexQuery, SearchSettings, TermField};
    use std::sync::Mutex;

    /// Rows held in memory, standing in for the database.
    #[derive(Default)]
    struct Rows(Mutex<HashMap<Uuid, Profile>>);

    impl Rows {
        fn put(&self, p: Profile) {
            self.0.lock().unwrap().insert(p.id, p);
        }

        fn remove(&self, id: Uuid) {
            self.0.lock().unwrap().remove(&id);
        }
    }

    #[async_trait]
    impl ProfileSource for Rows {
        async fn load(&self, ids: &[Uuid]) -> Result<Vec<Profile>, AppError> {
            let rows = self.0.lock().unwrap();
            Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
        }
    }

    fn profile(name: &str) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
            experience: 1,
            github: None,
            linked_in: None,
            stack_overflow: None,
        }
    }

    fn by_name(gram: &str) -> IndexQuery {
        IndexQuery {
            terms: vec![(TermField::Name, gram.into())],
            limit: 10,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn flush_waits_for_queued_writes() {
        let index = Arc::new(ProfileIndex::open(&SearchSettings::default()).unwrap());
        let rows = Arc::new(Rows::default());
        let sync = IndexSynchronizer::spawn(index.clone(), rows.clone(), Duration::from_millis(10));
        for name in ["Alice", "Alicia", "Bob"] {
            let p = profile(name);
            let id = p.id;
            rows.put(p);
            sync.submit(id);
        }
        sync.flush().await;
        assert_eq!(index.num_docs(), 3);
        assert_eq!(index.search(&by_name("ali")).unwrap().total, 2);
    }

    #[tokio::test]
    async fn late_submits_index_the_current_row() {
        let index = Arc::new(ProfileIndex::open(&SearchSettings::default()).unwrap());
        let rows = Arc::new(Rows::default());
        let sync = IndexSynchronizer::spawn(index.clone(), rows.clone(), Duration::from_millis(10));

        // Two writers commit Alpha then Bravo, and their submits arrive in the opposite order.
        let mut p = profile("Alpha");
        rows.put(p.clone());
        p.name = "Bravo".into();
        rows.put(p.clone());
        sync.submit(p.id);
        sync.flush().await;
        sync.submit(p.id);
        sync.flush().await;

        assert_eq!(index.search(&by_name("bra")).unwrap().ids, vec![p.id.to_string()]);
        assert!(index.search(&by_name("alp")).unwrap().ids.is_empty());

        // A create racing a delete: the row is gone, so the document goes too.
        rows.remove(p.id);
        sync.submit(p.id);
        sync.flush().await;
        assert_eq!(index.num_docs(), 0);
    }

    #[tokio::test]
    async fn flush_with_nothing_queued_returns() {
        let index = Arc::new(ProfileIndex::open(&SearchSettings::default()).unwrap());
        let sync = IndexSynchronizer::spawn(index, Arc::new(Rows::default()), Duration::from_millis(10));
        sync.flush().await;
    }
}
