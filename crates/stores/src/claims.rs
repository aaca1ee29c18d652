//! Claim cache and claim operations.
//!
//! Every claim mutation changes the owning task as well (status, escrow), so
//! each one re-queries that task through the [`TaskStore`] along with the
//! task's claim list.

use std::sync::Arc;

use taskboard_api::{BackendApi, Claim, SubmitCompletionRequest};
use tracing::{debug, info, warn};

use crate::error::StoreResult;
use crate::reconcile::{EntityCache, ViewKey};
use crate::tasks::TaskStore;
use crate::tracker::OperationTracker;

struct ClaimStoreInner {
    api: Arc<dyn BackendApi>,
    tasks: TaskStore,
    claims: EntityCache<Claim>,
    tracker: OperationTracker,
}

/// Store for claims on tasks
#[derive(Clone)]
pub struct ClaimStore {
    inner: Arc<ClaimStoreInner>,
}

impl ClaimStore {
    pub fn new(api: Arc<dyn BackendApi>, tasks: TaskStore) -> Self {
        Self {
            inner: Arc::new(ClaimStoreInner {
                api,
                tasks,
                claims: EntityCache::new(),
                tracker: OperationTracker::new(),
            }),
        }
    }

    pub async fn fetch_claims(&self, task_id: &str) -> StoreResult<Vec<Claim>> {
        let claims = self
            .inner
            .tracker
            .query("fetch_claims", self.inner.api.claims_for_task(task_id))
            .await?;
        debug!(task_id, count = claims.len(), "claims fetched");
        self.inner
            .claims
            .replace_view(ViewKey::TaskClaims(task_id.to_string()), &claims);
        Ok(claims)
    }

    pub async fn fetch_claim(&self, claim_id: &str) -> StoreResult<Claim> {
        let claim = self
            .inner
            .tracker
            .query("fetch_claim", self.inner.api.claim(claim_id))
            .await?;
        self.inner.claims.upsert(claim.clone());
        Ok(claim)
    }

    /// Claim a task for this device
    pub async fn claim_task(&self, task_id: &str) -> StoreResult<Claim> {
        let claim = self
            .inner
            .tracker
            .mutation("claim_task", self.inner.api.claim_task(task_id))
            .await?;
        info!(task_id, claim_id = %claim.id, "task claimed");

        self.refresh_task_side(task_id).await;
        Ok(claim)
    }

    /// Submit completion evidence for a claim held by this device
    pub async fn submit_completion(
        &self,
        claim_id: &str,
        request: &SubmitCompletionRequest,
    ) -> StoreResult<Claim> {
        let claim = self
            .inner
            .tracker
            .mutation(
                "submit_completion",
                self.inner.api.submit_completion(claim_id, request),
            )
            .await?;
        info!(claim_id, task_id = %claim.task_id, "completion submitted");

        self.inner.claims.upsert(claim.clone());
        self.refresh_task_side(&claim.task_id).await;
        Ok(claim)
    }

    /// Approve a submitted claim; only the task owner may do this
    pub async fn approve_claim(&self, claim_id: &str) -> StoreResult<()> {
        self.inner
            .tracker
            .mutation("approve_claim", self.inner.api.approve_claim(claim_id))
            .await?;
        info!(claim_id, "claim approved");

        self.refresh_after_review(claim_id).await;
        Ok(())
    }

    /// Reject a submitted claim; only the task owner may do this
    pub async fn reject_claim(&self, claim_id: &str) -> StoreResult<()> {
        self.inner
            .tracker
            .mutation("reject_claim", self.inner.api.reject_claim(claim_id))
            .await?;
        info!(claim_id, "claim rejected");

        self.refresh_after_review(claim_id).await;
        Ok(())
    }

    async fn refresh_after_review(&self, claim_id: &str) {
        match self.fetch_claim(claim_id).await {
            Ok(claim) => self.refresh_task_side(&claim.task_id).await,
            Err(error) => warn!(claim_id, %error, "claim refresh failed, owning task unknown"),
        }
    }

    async fn refresh_task_side(&self, task_id: &str) {
        self.inner.tasks.refresh_task(task_id).await;
        if let Err(error) = self.fetch_claims(task_id).await {
            warn!(task_id, %error, "claim list refresh failed");
        }
    }

    pub fn claims_for_task(&self, task_id: &str) -> Vec<Claim> {
        self.inner
            .claims
            .view(&ViewKey::TaskClaims(task_id.to_string()))
    }

    pub fn claim(&self, claim_id: &str) -> Option<Claim> {
        self.inner.claims.get(claim_id)
    }

    /// Merge a pushed claim snapshot
    pub fn apply_claim(&self, claim: Claim) {
        debug!(claim_id = %claim.id, status = ?claim.status, "applying claim snapshot");
        self.inner.claims.upsert(claim);
    }

    pub fn cache(&self) -> &EntityCache<Claim> {
        &self.inner.claims
    }

    pub fn tracker(&self) -> &OperationTracker {
        &self.inner.tracker
    }
}
