//! Fire-and-forget fan-out of status documents to the mirrors.
//!
//! Writes for one token are ordered by document timestamp: each mirror sees
//! at most one in-flight write per token, and a document older than one
//! already published for its token is dropped instead of retried.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::mirror::StatusMirror;
use crate::domain::{RedemptionToken, StatusDocument};

/// Ordering state for one token while documents for it are in flight.
#[derive(Debug)]
struct TokenLane {
    /// Timestamp (µs) of the newest document published for the token.
    newest: AtomicI64,
    /// One gate per mirror holding the timestamp of the last document
    /// that mirror accepted.
    gates: Vec<tokio::sync::Mutex<i64>>,
}

impl TokenLane {
    fn new(mirrors: usize) -> Self {
        Self {
            newest: AtomicI64::new(i64::MIN),
            gates: (0..mirrors).map(|_| tokio::sync::Mutex::new(i64::MIN)).collect(),
        }
    }

    fn superseded(&self, stamp: i64) -> bool {
        self.newest.load(Ordering::SeqCst) > stamp
    }
}

struct Queued {
    document: StatusDocument,
    stamp: i64,
    lane: Arc<TokenLane>,
}

type Lanes = Arc<Mutex<HashMap<RedemptionToken, Arc<TokenLane>>>>;

/// Spawns mirror writes after a transition commits.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    mirrors: Vec<Arc<dyn StatusMirror>>,
    attempts: u32,
    backoff: Duration,
    lanes: Lanes,
}

impl StatusPublisher {
    /// Creates a publisher writing to `mirrors`, trying each write up to
    /// `attempts` times with doubling delays starting at `backoff`.
    #[must_use]
    pub fn new(mirrors: Vec<Arc<dyn StatusMirror>>, attempts: u32, backoff: Duration) -> Self {
        Self {
            mirrors,
            attempts: attempts.max(1),
            backoff,
            lanes: Lanes::default(),
        }
    }

    /// Mirrors `documents` in the background and returns immediately.
    /// Mirrors are written concurrently, so a slow one never delays another.
    ///
    /// The returned handle resolves once every write has succeeded, exhausted
    /// its attempts, or been superseded by a newer document for the same
    /// token; callers are free to drop it.
    pub fn publish(&self, documents: Vec<StatusDocument>) -> JoinHandle<()> {
        let queued: Vec<Queued> = documents.into_iter().map(|d| self.enqueue(d)).collect();
        let mirrors = self.mirrors.clone();
        let lanes = Arc::clone(&self.lanes);
        let attempts = self.attempts;
        let backoff = self.backoff;
        tokio::spawn(async move {
            let pending = &queued;
            let writes = mirrors.iter().enumerate().map(|(slot, mirror)| async move {
                for item in pending {
                    let Some(gate) = item.lane.gates.get(slot) else {
                        continue;
                    };
                    let mut accepted = gate.lock().await;
                    if *accepted > item.stamp || item.lane.superseded(item.stamp) {
                        debug!(
                            mirror = mirror.name(),
                            token = %item.document.token,
                            "stale status document skipped"
                        );
                        continue;
                    }
                    if write_with_retry(mirror.as_ref(), item, attempts, backoff).await {
                        *accepted = item.stamp;
                    }
                }
            });
            join_all(writes).await;
            retire(&lanes, queued);
        })
    }

    fn enqueue(&self, document: StatusDocument) -> Queued {
        let stamp = document.timestamp.timestamp_micros();
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        let lane = lanes
            .entry(document.token.clone())
            .or_insert_with(|| Arc::new(TokenLane::new(self.mirrors.len())));
        lane.newest.fetch_max(stamp, Ordering::SeqCst);
        Queued {
            stamp,
            lane: Arc::clone(lane),
            document,
        }
    }
}

/// Drops lanes no other publish task still holds.
fn retire(lanes: &Lanes, queued: Vec<Queued>) {
    let mut lanes = lanes.lock().unwrap_or_else(PoisonError::into_inner);
    for item in queued {
        let ours = lanes
            .get(&item.document.token)
            .is_some_and(|lane| Arc::ptr_eq(lane, &item.lane));
        if ours && Arc::strong_count(&item.lane) == 2 {
            lanes.remove(&item.document.token);
        }
    }
}

/// Returns whether the mirror accepted the document.
async fn write_with_retry(
    mirror: &dyn StatusMirror,
    item: &Queued,
    attempts: u32,
    backoff: Duration,
) -> bool {
    let document = &item.document;
    let mut delay = backoff;
    for attempt in 1..=attempts {
        if attempt > 1 && item.lane.superseded(item.stamp) {
            debug!(mirror = mirror.name(), token = %document.token, "retry superseded");
            return false;
        }
        match mirror.write(document).await {
            Ok(()) => {
                debug!(
                    mirror = mirror.name(),
                    token = %document.token,
                    status = document.status.as_str(),
                    "status mirrored"
                );
                return true;
            }
            Err(e) if attempt < attempts => {
                debug!(
                    mirror = mirror.name(),
                    attempt,
                    error = %e,
                    "mirror write failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(e) => {
                warn!(
                    mirror = mirror.name(),
                    token = %document.token,
                    status = document.status.as_str(),
                    error = %e,
                    "status mirror write abandoned"
                );
            }
        }
    }
    false
}
