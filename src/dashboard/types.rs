//! Dashboard response types

use serde::{Deserialize, Serialize};

use crate::metrics::FunnelSummary;
use crate::types::OpportunityRecord;

/// Envelope every JSON endpoint returns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// GET /api/opportunities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunitiesResponse {
    pub funnel: FunnelSummary,
    /// Newest first, capped at `limit`
    pub recent: Vec<OpportunityRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpportunitiesQuery {
    pub limit: Option<usize>,
}
