//! Dashboard API route handlers.
//!
//! All endpoints return JSON read from the latest [`AgentSnapshot`] the
//! driver published. State is shared via `Arc<DashboardState>`.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::correlation::DispatchStats;
use crate::engine::{AgentSnapshot, Stage, WorkflowSnapshot};
use crate::transport::Protocol;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub agent_name: String,
    pub started_at: DateTime<Utc>,
    pub snapshot: RwLock<AgentSnapshot>,
}

impl DashboardState {
    pub fn new(agent_name: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            agent_name: agent_name.into(),
            started_at,
            snapshot: RwLock::new(AgentSnapshot::empty(started_at)),
        }
    }

    /// Replace the published snapshot.
    pub async fn publish(&self, snapshot: AgentSnapshot) {
        *self.snapshot.write().await = snapshot;
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DropCounts {
    pub unidentified_dialogue: u64,
    pub unallowed_kind: u64,
    pub no_callback: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub agent: String,
    pub uptime_secs: i64,
    pub snapshot_at: DateTime<Utc>,
    pub active_workflow_id: u64,
    pub active_stage: Stage,
    pub workflows_total: usize,
    pub workflows_completed: usize,
    pub pending_requests: usize,
    pub notifications_sent: u64,
    pub delivered: u64,
    pub dropped: DropCounts,
    pub by_protocol: BTreeMap<Protocol, DispatchStats>,
}

impl StatsResponse {
    fn from_snapshot(agent: &str, started_at: DateTime<Utc>, snap: &AgentSnapshot) -> Self {
        let mut dropped = DropCounts::default();
        let mut delivered = 0;
        for stats in snap.dispatch.values() {
            delivered += stats.delivered;
            dropped.unidentified_dialogue += stats.unidentified_dialogue;
            dropped.unallowed_kind += stats.unallowed_kind;
            dropped.no_callback += stats.no_callback;
        }

        Self {
            agent: agent.to_string(),
            uptime_secs: (snap.taken_at - started_at).num_seconds(),
            snapshot_at: snap.taken_at,
            active_workflow_id: snap.active_workflow_id,
            active_stage: snap.active_stage,
            workflows_total: snap.workflows.len(),
            workflows_completed: snap
                .workflows
                .iter()
                .filter(|wf| wf.completed_at.is_some())
                .count(),
            pending_requests: snap.pending_requests,
            notifications_sent: snap.notifications_sent,
            delivered,
            dropped,
            by_protocol: snap.dispatch.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/workflows
pub async fn get_workflows(State(state): State<AppState>) -> Json<Vec<WorkflowSnapshot>> {
    let snap = state.snapshot.read().await;
    Json(snap.workflows.clone())
}

/// GET /api/workflows/active
pub async fn get_active_workflow(
    State(state): State<AppState>,
) -> Result<Json<WorkflowSnapshot>, StatusCode> {
    let snap = state.snapshot.read().await;
    snap.active().cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let snap = state.snapshot.read().await;
    Json(StatsResponse::from_snapshot(
        &state.agent_name,
        state.started_at,
        &snap,
    ))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn snapshot_with_drops() -> AgentSnapshot {
        let mut snap = AgentSnapshot::empty(t0() + Duration::seconds(90));
        snap.active_workflow_id = 2;
        snap.dispatch.insert(
            Protocol::ContractApi,
            DispatchStats {
                delivered: 5,
                unidentified_dialogue: 1,
                unallowed_kind: 2,
                no_callback: 0,
            },
        );
        snap.dispatch.insert(
            Protocol::Signing,
            DispatchStats {
                delivered: 2,
                unidentified_dialogue: 0,
                unallowed_kind: 1,
                no_callback: 3,
            },
        );
        snap
    }

    #[test]
    fn test_stats_sum_across_protocols() {
        let stats = StatsResponse::from_snapshot("MW", t0(), &snapshot_with_drops());
        assert_eq!(stats.delivered, 7);
        assert_eq!(
            stats.dropped,
            DropCounts {
                unidentified_dialogue: 1,
                unallowed_kind: 3,
                no_callback: 3,
            }
        );
        assert_eq!(stats.uptime_secs, 90);
        assert_eq!(stats.active_workflow_id, 2);
    }

    #[tokio::test]
    async fn test_publish_replaces_snapshot() {
        let state = Arc::new(DashboardState::new("MW", t0()));
        state.publish(snapshot_with_drops()).await;
        let Json(stats) = get_stats(State(state)).await;
        assert_eq!(stats.agent, "MW");
        assert_eq!(stats.by_protocol.len(), 2);
    }

    #[tokio::test]
    async fn test_active_workflow_missing_before_first_snapshot() {
        let state = Arc::new(DashboardState::new("MW", t0()));
        let resp = get_active_workflow(State(state)).await;
        assert_eq!(resp.err(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_get_workflows_empty() {
        let state = Arc::new(DashboardState::new("MW", t0()));
        let Json(workflows) = get_workflows(State(state)).await;
        assert!(workflows.is_empty());
    }
}
