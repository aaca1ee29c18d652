//! Error types for domain store operations.

use taskboard_api::ApiError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// A Backend API call made by a store failed. The cache is left as it was.
///
/// Displays the backend's own message so callers can show it unchanged.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{source}")]
    Query {
        operation: &'static str,
        source: ApiError,
    },

    #[error("{source}")]
    Mutation {
        operation: &'static str,
        source: ApiError,
    },
}

impl StoreError {
    pub fn query(operation: &'static str, source: ApiError) -> Self {
        Self::Query { operation, source }
    }

    pub fn mutation(operation: &'static str, source: ApiError) -> Self {
        Self::Mutation { operation, source }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::Query { operation, .. } | Self::Mutation { operation, .. } => operation,
        }
    }

    pub fn api_error(&self) -> &ApiError {
        match self {
            Self::Query { source, .. } | Self::Mutation { source, .. } => source,
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Mutation { .. })
    }
}
