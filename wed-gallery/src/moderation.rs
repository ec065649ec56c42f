//! Admin review of guest photos.
//!
//! A [`ModerationQueue`] is a local view of the backend's unapproved images.
//! Items leave the queue as soon as a decision is taken (optimistically) and
//! come back through a refetch if the backend call fails. A decided image is
//! never decided twice.
//!
//! [`ModerationDesk`] keeps one queue per admin session; in-flight and decided
//! images are tracked desk-wide.

use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use wed_blob::UploadCoordinator;
use wed_core::{WedError, WedResult};

use crate::backend::GalleryBackend;
use crate::models::GalleryImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewState {
    Unreviewed,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn from_approve(approve: bool) -> Self {
        if approve {
            Decision::Approve
        } else {
            Decision::Reject
        }
    }

    pub fn is_approve(&self) -> bool {
        matches!(self, Decision::Approve)
    }

    fn outcome(&self) -> ReviewState {
        match self {
            Decision::Approve => ReviewState::Approved,
            Decision::Reject => ReviewState::Rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

impl FromStr for QueueOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "oldest" | "oldest-first" | "asc" => Ok(QueueOrder::OldestFirst),
            "newest" | "newest-first" | "desc" => Ok(QueueOrder::NewestFirst),
            other => Err(format!("unknown moderation order: {other}")),
        }
    }
}

impl QueueOrder {
    /// Sort by creation time; images without a timestamp go last.
    pub fn sort(&self, images: &mut [GalleryImage]) {
        images.sort_by(|a, b| match (a.created_at, b.created_at) {
            (Some(x), Some(y)) => match self {
                QueueOrder::OldestFirst => x.cmp(&y),
                QueueOrder::NewestFirst => y.cmp(&x),
            },
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        });
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionOutcome {
    pub image_id: String,
    pub state: ReviewState,
    /// False when the storage object of a rejected image could not be removed.
    pub storage_deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSummary {
    pub unreviewed: usize,
    pub presented: usize,
    pub approved: usize,
    pub rejected: usize,
}

/// Decisions shared by every queue on a desk, so an image decided in one
/// session is a conflict in all others.
#[derive(Default)]
struct Ledger {
    in_flight: HashSet<String>,
    decided: HashMap<String, ReviewState>,
}

impl Ledger {
    fn count(&self, state: ReviewState) -> usize {
        self.decided.values().filter(|s| **s == state).count()
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<GalleryImage>,
    presented: HashMap<String, GalleryImage>,
}

impl QueueState {
    fn take(&mut self, image_id: &str) -> Option<GalleryImage> {
        if let Some(image) = self.presented.remove(image_id) {
            return Some(image);
        }
        let pos = self.pending.iter().position(|i| i.id == image_id)?;
        self.pending.remove(pos)
    }
}

pub struct ModerationQueue {
    backend: Arc<dyn GalleryBackend>,
    coordinator: Arc<dyn UploadCoordinator>,
    order: QueueOrder,
    state: Mutex<QueueState>,
    ledger: Arc<Mutex<Ledger>>,
}

impl ModerationQueue {
    pub fn new(backend: Arc<dyn GalleryBackend>, coordinator: Arc<dyn UploadCoordinator>, order: QueueOrder) -> Self {
        Self::with_ledger(backend, coordinator, order, Arc::default())
    }

    fn with_ledger(
        backend: Arc<dyn GalleryBackend>,
        coordinator: Arc<dyn UploadCoordinator>,
        order: QueueOrder,
        ledger: Arc<Mutex<Ledger>>,
    ) -> Self {
        Self {
            backend,
            coordinator,
            order,
            state: Mutex::new(QueueState::default()),
            ledger,
        }
    }

    pub fn order(&self) -> QueueOrder {
        self.order
    }

    /// Refetch the unreviewed batch. Presented, in-flight and decided images
    /// keep their place.
    pub async fn refresh(&self) -> WedResult<Vec<GalleryImage>> {
        let mut images = self.backend.list_unapproved().await?;
        self.order.sort(&mut images);

        let mut state = self.state.lock();
        let ledger = self.ledger.lock();
        let pending: VecDeque<GalleryImage> = images
            .into_iter()
            .filter(|i| {
                !state.presented.contains_key(&i.id)
                    && !ledger.in_flight.contains(&i.id)
                    && !ledger.decided.contains_key(&i.id)
            })
            .collect();
        drop(ledger);
        state.pending = pending;
        tracing::debug!(pending = state.pending.len(), "moderation queue refreshed");
        Ok(state.pending.iter().cloned().collect())
    }

    /// Hand out the next unreviewed image. Images another session decided or
    /// is deciding are skipped.
    pub fn present_next(&self) -> Option<GalleryImage> {
        let mut state = self.state.lock();
        let ledger = self.ledger.lock();
        while let Some(image) = state.pending.pop_front() {
            if ledger.decided.contains_key(&image.id) || ledger.in_flight.contains(&image.id) {
                continue;
            }
            state.presented.insert(image.id.clone(), image.clone());
            return Some(image);
        }
        None
    }

    /// A presented image was dismissed without a decision: back to the front.
    pub fn abandon(&self, image_id: &str) -> WedResult<()> {
        let mut state = self.state.lock();
        if let Some(done) = self.ledger.lock().decided.get(image_id).copied() {
            state.presented.remove(image_id);
            return Err(already_decided(image_id, done));
        }
        match state.presented.remove(image_id) {
            Some(image) => {
                state.pending.push_front(image);
                Ok(())
            }
            None => Err(WedError::not_found(format!("Image {image_id} is not being reviewed.")).into_anyhow()),
        }
    }

    pub async fn decide(&self, image_id: &str, decision: Decision) -> WedResult<DecisionOutcome> {
        let image = match self.claim(image_id)? {
            Some(image) => image,
            None => {
                // not known locally yet; the backend may have it
                self.refresh().await?;
                self.claim(image_id)?.ok_or_else(|| {
                    WedError::not_found(format!("Image {image_id} is not awaiting review.")).into_anyhow()
                })?
            }
        };

        if let Err(err) = self.backend.decide(image_id, decision.is_approve()).await {
            tracing::warn!(image = %image_id, ?decision, error = %err, "decision failed, reconciling queue");
            self.ledger.lock().in_flight.remove(image_id);
            if let Err(refetch) = self.refresh().await {
                tracing::warn!(error = %refetch, "queue reconcile failed");
            }
            return Err(err);
        }

        let mut storage_deleted = true;
        if decision == Decision::Reject {
            if let Err(err) = self.coordinator.delete_url(&image.url).await {
                storage_deleted = false;
                tracing::warn!(image = %image_id, url = %image.url, error = %err, "rejected photo left in storage");
            }
        }

        let state = decision.outcome();
        {
            let mut ledger = self.ledger.lock();
            ledger.in_flight.remove(image_id);
            ledger.decided.insert(image_id.to_string(), state);
        }
        tracing::info!(image = %image_id, ?state, storage_deleted, "image moderated");

        Ok(DecisionOutcome {
            image_id: image_id.to_string(),
            state,
            storage_deleted,
        })
    }

    /// Move an image out of the queue and mark it in flight on the ledger.
    fn claim(&self, image_id: &str) -> WedResult<Option<GalleryImage>> {
        let mut state = self.state.lock();
        let mut ledger = self.ledger.lock();
        if let Some(done) = ledger.decided.get(image_id).copied() {
            state.take(image_id);
            return Err(already_decided(image_id, done));
        }
        if ledger.in_flight.contains(image_id) {
            return Err(WedError::conflict(format!("Image {image_id} is already being decided.")).into_anyhow());
        }
        let image = state.take(image_id);
        if image.is_some() {
            ledger.in_flight.insert(image_id.to_string());
        }
        Ok(image)
    }

    /// Images still waiting, in review order (presented ones excluded).
    pub fn pending(&self) -> Vec<GalleryImage> {
        let state = self.state.lock();
        let ledger = self.ledger.lock();
        state
            .pending
            .iter()
            .filter(|i| !ledger.decided.contains_key(&i.id))
            .cloned()
            .collect()
    }

    pub fn state_of(&self, image_id: &str) -> Option<ReviewState> {
        let state = self.state.lock();
        let ledger = self.ledger.lock();
        if let Some(done) = ledger.decided.get(image_id) {
            return Some(*done);
        }
        let waiting = state.presented.contains_key(image_id)
            || ledger.in_flight.contains(image_id)
            || state.pending.iter().any(|i| i.id == image_id);
        waiting.then_some(ReviewState::Unreviewed)
    }

    /// Local counts for this queue; approved and rejected totals cover the
    /// whole desk.
    pub fn summary(&self) -> QueueSummary {
        let state = self.state.lock();
        let ledger = self.ledger.lock();
        let live = |i: &&GalleryImage| !ledger.decided.contains_key(&i.id);
        let pending = state.pending.iter().filter(live).count();
        let presented = state.presented.values().filter(live).count();
        QueueSummary {
            unreviewed: pending + presented,
            presented,
            approved: ledger.count(ReviewState::Approved),
            rejected: ledger.count(ReviewState::Rejected),
        }
    }
}

fn already_decided(image_id: &str, state: ReviewState) -> anyhow::Error {
    let verb = match state {
        ReviewState::Approved => "approved",
        ReviewState::Rejected => "rejected",
        ReviewState::Unreviewed => "decided",
    };
    WedError::conflict(format!("Image {image_id} was already {verb}."))
        .with_data(serde_json::json!({ "imageId": image_id, "state": state }))
        .into_anyhow()
}

struct SessionQueue {
    queue: Arc<ModerationQueue>,
    expires_at: i64,
}

/// One moderation queue per admin session, all sharing one decision ledger.
/// Queues of expired sessions are dropped on the next lookup.
pub struct ModerationDesk {
    backend: Arc<dyn GalleryBackend>,
    coordinator: Arc<dyn UploadCoordinator>,
    order: QueueOrder,
    ledger: Arc<Mutex<Ledger>>,
    queues: DashMap<String, SessionQueue>,
}

impl ModerationDesk {
    pub fn new(backend: Arc<dyn GalleryBackend>, coordinator: Arc<dyn UploadCoordinator>, order: QueueOrder) -> Self {
        Self {
            backend,
            coordinator,
            order,
            ledger: Arc::default(),
            queues: DashMap::new(),
        }
    }

    /// Queue for a session whose token expires at `expires_at` (unix seconds).
    pub fn queue(&self, session_id: &str, expires_at: i64) -> Arc<ModerationQueue> {
        self.prune_expired(Utc::now().timestamp());
        let mut entry = self.queues.entry(session_id.to_string()).or_insert_with(|| SessionQueue {
            queue: Arc::new(ModerationQueue::with_ledger(
                Arc::clone(&self.backend),
                Arc::clone(&self.coordinator),
                self.order,
                Arc::clone(&self.ledger),
            )),
            expires_at,
        });
        entry.expires_at = entry.expires_at.max(expires_at);
        Arc::clone(&entry.queue)
    }

    /// Drop queues whose session expired at or before `now`.
    pub fn prune_expired(&self, now: i64) -> usize {
        let before = self.queues.len();
        self.queues.retain(|_, q| q.expires_at > now);
        let pruned = before.saturating_sub(self.queues.len());
        if pruned > 0 {
            tracing::debug!(pruned, "expired moderation queues dropped");
        }
        pruned
    }

    pub fn drop_session(&self, session_id: &str) -> bool {
        self.queues.remove(session_id).is_some()
    }

    pub fn sessions(&self) -> usize {
        self.queues.len()
    }
}
