// libs/appointment-cell/src/services/supabase_store.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::context::RequestContext;

use crate::models::{Appointment, AppointmentStatus, NewAppointment, StoreError};
use crate::services::store::AppointmentStore;

/// Appointment store on the clinic's Supabase project.
///
/// Inserts go through the `book_appointment` function, which re-checks
/// overlap inside the transaction and relies on the exclusion constraint on
/// `appointments` for the final word. A rejected insert comes back as 409.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(Arc::new(SupabaseClient::new(config)))
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn range_query(
        column: &str,
        id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: Option<&[AppointmentStatus]>,
    ) -> String {
        let mut query_parts = vec![
            format!("{}=eq.{}", column, id),
            format!("start_time=gte.{}", urlencoding::encode(&start.to_rfc3339())),
            format!("start_time=lt.{}", urlencoding::encode(&end.to_rfc3339())),
        ];

        if let Some(statuses) = statuses {
            let list = statuses.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(",");
            query_parts.push(format!("status=in.({})", list));
        }

        query_parts.push("order=start_time.asc".to_string());
        format!("/rest/v1/appointments?{}", query_parts.join("&"))
    }

    fn representation() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn list_appointments(
        &self,
        therapist_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: Option<&[AppointmentStatus]>,
        ctx: &RequestContext,
    ) -> Result<Vec<Appointment>, StoreError> {
        let path = Self::range_query("therapist_id", therapist_id, start, end, statuses);
        debug!("Fetching appointments for therapist {}", therapist_id);

        Ok(self.supabase.request(Method::GET, &path, Some(ctx.token()), None).await?)
    }

    async fn list_client_appointments(
        &self,
        client_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: Option<&[AppointmentStatus]>,
        ctx: &RequestContext,
    ) -> Result<Vec<Appointment>, StoreError> {
        let path = Self::range_query("client_id", client_id, start, end, statuses);
        debug!("Fetching appointments for client {}", client_id);

        Ok(self.supabase.request(Method::GET, &path, Some(ctx.token()), None).await?)
    }

    async fn get_appointment(
        &self,
        appointment_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<Appointment, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(ctx.token()), None)
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("appointment {}", appointment_id)))
    }

    async fn insert_appointment(
        &self,
        appointment: NewAppointment,
        ctx: &RequestContext,
    ) -> Result<Appointment, StoreError> {
        let args = json!({
            "p_therapist_id": appointment.therapist_id,
            "p_client_id": appointment.client_id,
            "p_start_time": appointment.start_time.to_rfc3339(),
            "p_duration_minutes": appointment.duration_minutes,
            "p_notes": appointment.notes,
        });

        let stored: Appointment = self
            .supabase
            .rpc("book_appointment", Some(ctx.token()), args)
            .await?;

        info!("Appointment {} stored for therapist {}", stored.id, stored.therapist_id);
        Ok(stored)
    }

    async fn update_status(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        notes: Option<String>,
        ctx: &RequestContext,
    ) -> Result<Appointment, StoreError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment_id,
            from.as_str()
        );

        let mut body = json!({
            "status": to,
            "updated_at": Utc::now().to_rfc3339(),
        });
        if let Some(notes) = notes {
            body["notes"] = json!(notes);
        }

        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(ctx.token()),
                Some(body),
                Some(Self::representation()),
            )
            .await?;

        match rows.into_iter().next() {
            Some(updated) => Ok(updated),
            None => {
                // Nothing matched: either the row is gone or its status moved on.
                let current = self.get_appointment(appointment_id, ctx).await?;
                Err(StoreError::Conflict(format!(
                    "appointment {} is {} not {}",
                    appointment_id, current.status, from
                )))
            }
        }
    }
}
