//! Loading and error state for one domain store.
//!
//! Each operation holds its own guard for as long as it runs, so one
//! operation finishing never hides another that is still in flight.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use taskboard_api::ApiResult;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Last failure recorded by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFailure {
    pub operation: &'static str,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct OperationTracker {
    in_flight: AtomicUsize,
    last_error: Mutex<Option<OperationFailure>>,
}

/// Counts as in flight until dropped.
#[must_use]
pub struct OperationGuard<'a> {
    tracker: &'a OperationTracker,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.tracker.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl OperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> OperationGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        OperationGuard { tracker: self }
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight() > 0
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn last_error(&self) -> Option<OperationFailure> {
        self.last_error.lock().clone()
    }

    pub fn clear_error(&self) {
        self.last_error.lock().take();
    }

    pub async fn query<T, F>(&self, operation: &'static str, call: F) -> StoreResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        self.track(operation, call, StoreError::query).await
    }

    pub async fn mutation<T, F>(&self, operation: &'static str, call: F) -> StoreResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        self.track(operation, call, StoreError::mutation).await
    }

    async fn track<T, F>(
        &self,
        operation: &'static str,
        call: F,
        wrap: fn(&'static str, taskboard_api::ApiError) -> StoreError,
    ) -> StoreResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        let _guard = self.begin();
        match call.await {
            Ok(value) => {
                self.resolve(operation);
                Ok(value)
            }
            Err(source) => {
                let error = wrap(operation, source);
                warn!(operation, error = %error, "backend call failed");
                self.record(&error);
                Err(error)
            }
        }
    }

    fn record(&self, error: &StoreError) {
        *self.last_error.lock() = Some(OperationFailure {
            operation: error.operation(),
            message: error.to_string(),
        });
    }

    // A later success of the same operation supersedes its earlier failure.
    fn resolve(&self, operation: &'static str) {
        let mut slot = self.last_error.lock();
        if slot.as_ref().is_some_and(|failure| failure.operation == operation) {
            debug!(operation, "clearing earlier failure");
            *slot = None;
        }
    }
}
