// libs/therapist-cell/src/services/supabase_store.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::context::RequestContext;

use crate::models::{AvailabilityError, AvailabilityWindow, WindowInput};
use crate::services::availability::{sort_windows, validate_windows, AvailabilityStore};

/// Postgres function that deletes and re-inserts a therapist's windows in a
/// single transaction.
const REPLACE_AVAILABILITY_RPC: &str = "replace_therapist_availability";

pub struct SupabaseAvailabilityStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAvailabilityStore {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(Arc::new(SupabaseClient::new(config)))
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl AvailabilityStore for SupabaseAvailabilityStore {
    async fn set_availability(
        &self,
        therapist_id: Uuid,
        windows: Vec<WindowInput>,
        ctx: &RequestContext,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        debug!("Replacing availability for therapist {} via RPC", therapist_id);
        validate_windows(&windows)?;

        let rows: Vec<_> = windows
            .iter()
            .map(|w| {
                json!({
                    "day_of_week": w.day_of_week,
                    "start_time": w.start_time.format("%H:%M:%S").to_string(),
                    "end_time": w.end_time.format("%H:%M:%S").to_string(),
                    "is_active": w.is_active.unwrap_or(true),
                })
            })
            .collect();

        let mut stored: Vec<AvailabilityWindow> = self
            .supabase
            .rpc(
                REPLACE_AVAILABILITY_RPC,
                Some(ctx.token()),
                json!({
                    "p_therapist_id": therapist_id,
                    "p_windows": rows,
                }),
            )
            .await?;
        sort_windows(&mut stored);

        info!("Availability replaced for therapist {} ({} windows)", therapist_id, stored.len());
        Ok(stored)
    }

    async fn list_windows(
        &self,
        therapist_id: Uuid,
        include_inactive: bool,
        ctx: &RequestContext,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        let mut query_parts = vec![format!("therapist_id=eq.{}", therapist_id)];
        if !include_inactive {
            query_parts.push("is_active=eq.true".to_string());
        }

        let path = format!(
            "/rest/v1/availability_windows?{}&order=day_of_week.asc,start_time.asc",
            query_parts.join("&")
        );

        let mut windows: Vec<AvailabilityWindow> = self
            .supabase
            .request(Method::GET, &path, Some(ctx.token()), None)
            .await?;
        sort_windows(&mut windows);
        Ok(windows)
    }

    async fn set_window_active(
        &self,
        therapist_id: Uuid,
        window_id: Uuid,
        is_active: bool,
        ctx: &RequestContext,
    ) -> Result<AvailabilityWindow, AvailabilityError> {
        let path = format!(
            "/rest/v1/availability_windows?id=eq.{}&therapist_id=eq.{}",
            window_id, therapist_id
        );

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let updated: Vec<AvailabilityWindow> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(ctx.token()),
                Some(json!({
                    "is_active": is_active,
                    "updated_at": Utc::now().to_rfc3339(),
                })),
                Some(headers),
            )
            .await?;

        updated
            .into_iter()
            .next()
            .ok_or_else(|| AvailabilityError::NotFound(format!("availability window {}", window_id)))
    }
}
