// libs/appointment-cell/src/services/collaborators.rs
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, warn};

use shared_database::supabase::SupabaseClient;
use shared_models::context::RequestContext;

use crate::models::{AuditRecord, SessionStartEvent, StoreError};

/// Receives a record of every committed booking and status change.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord, ctx: &RequestContext) -> Result<(), StoreError>;
}

/// Told when an appointment enters `em_andamento`, so the session side can
/// open whatever it tracks for a live session.
#[async_trait]
pub trait SessionTracker: Send + Sync {
    async fn session_started(&self, event: &SessionStartEvent, ctx: &RequestContext) -> Result<(), StoreError>;
}

/// Deliver an audit record without holding up the caller. Failures are
/// logged and dropped.
pub fn dispatch_audit(sink: Arc<dyn AuditSink>, record: AuditRecord, ctx: RequestContext) {
    tokio::spawn(async move {
        if let Err(e) = sink.record(&record, &ctx).await {
            warn!("Audit record for appointment {} not delivered: {}", record.appointment_id, e);
        }
    });
}

pub fn dispatch_session_start(tracker: Arc<dyn SessionTracker>, event: SessionStartEvent, ctx: RequestContext) {
    tokio::spawn(async move {
        if let Err(e) = tracker.session_started(&event, &ctx).await {
            warn!("Session start for appointment {} not delivered: {}", event.appointment_id, e);
        }
    });
}

// ==============================================================================
// TRACING IMPLEMENTATIONS
// ==============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: &AuditRecord, _ctx: &RequestContext) -> Result<(), StoreError> {
        info!(
            appointment_id = %record.appointment_id,
            actor_id = %record.actor_id,
            action = ?record.action,
            from = ?record.from_status,
            to = %record.to_status,
            "appointment audit"
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSessionTracker;

#[async_trait]
impl SessionTracker for TracingSessionTracker {
    async fn session_started(&self, event: &SessionStartEvent, _ctx: &RequestContext) -> Result<(), StoreError> {
        info!(
            appointment_id = %event.appointment_id,
            therapist_id = %event.therapist_id,
            client_id = %event.client_id,
            "session started"
        );
        Ok(())
    }
}

// ==============================================================================
// SUPABASE IMPLEMENTATIONS
// ==============================================================================

pub struct SupabaseAuditSink {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAuditSink {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl AuditSink for SupabaseAuditSink {
    async fn record(&self, record: &AuditRecord, ctx: &RequestContext) -> Result<(), StoreError> {
        let body = json!({
            "appointment_id": record.appointment_id,
            "actor_id": record.actor_id,
            "action": record.action,
            "from_status": record.from_status,
            "to_status": record.to_status,
            "created_at": record.at.to_rfc3339(),
        });

        let _: Value = self
            .supabase
            .request(Method::POST, "/rest/v1/audit_log", Some(ctx.token()), Some(body))
            .await?;
        Ok(())
    }
}

pub struct SupabaseSessionTracker {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseSessionTracker {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl SessionTracker for SupabaseSessionTracker {
    async fn session_started(&self, event: &SessionStartEvent, ctx: &RequestContext) -> Result<(), StoreError> {
        let body = json!({
            "appointment_id": event.appointment_id,
            "therapist_id": event.therapist_id,
            "client_id": event.client_id,
            "started_at": event.started_at.to_rfc3339(),
        });

        let _: Value = self
            .supabase
            .request(Method::POST, "/rest/v1/sessions", Some(ctx.token()), Some(body))
            .await?;
        Ok(())
    }
}
