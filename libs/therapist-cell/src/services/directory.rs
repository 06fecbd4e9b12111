// libs/therapist-cell/src/services/directory.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono_tz::Tz;
use dashmap::DashMap;
use reqwest::Method;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::context::RequestContext;

use crate::models::{parse_timezone, AvailabilityError, TherapistProfile};

/// Identity and timezone lookup for therapists, owned by the profile CRUD
/// side of the clinic.
#[async_trait]
pub trait TherapistDirectory: Send + Sync {
    async fn therapist_profile(
        &self,
        therapist_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<TherapistProfile, AvailabilityError>;

    /// Fallback used when a profile carries no timezone.
    fn default_timezone(&self) -> &str;

    async fn therapist_timezone(
        &self,
        therapist_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<Tz, AvailabilityError> {
        let profile = self.therapist_profile(therapist_id, ctx).await?;
        profile.tz(self.default_timezone())
    }
}

/// Directory backed by a map, for single-process deployments and tests.
///
/// With `allow_unknown` set, unregistered therapists resolve to the default
/// timezone instead of `NotFound`.
pub struct StaticTherapistDirectory {
    timezones: DashMap<Uuid, String>,
    default_timezone: String,
    allow_unknown: bool,
}

impl StaticTherapistDirectory {
    pub fn new(default_timezone: impl Into<String>) -> Self {
        Self {
            timezones: DashMap::new(),
            default_timezone: default_timezone.into(),
            allow_unknown: false,
        }
    }

    pub fn permissive(default_timezone: impl Into<String>) -> Self {
        Self {
            allow_unknown: true,
            ..Self::new(default_timezone)
        }
    }

    pub fn register(&self, therapist_id: Uuid, timezone: &str) -> Result<(), AvailabilityError> {
        parse_timezone(timezone)?;
        self.timezones.insert(therapist_id, timezone.to_string());
        Ok(())
    }
}

#[async_trait]
impl TherapistDirectory for StaticTherapistDirectory {
    async fn therapist_profile(
        &self,
        therapist_id: Uuid,
        _ctx: &RequestContext,
    ) -> Result<TherapistProfile, AvailabilityError> {
        match self.timezones.get(&therapist_id) {
            Some(tz) => Ok(TherapistProfile {
                id: therapist_id,
                timezone: Some(tz.value().clone()),
            }),
            None if self.allow_unknown => Ok(TherapistProfile {
                id: therapist_id,
                timezone: None,
            }),
            None => Err(AvailabilityError::NotFound(format!("therapist {}", therapist_id))),
        }
    }

    fn default_timezone(&self) -> &str {
        &self.default_timezone
    }
}

pub struct SupabaseTherapistDirectory {
    supabase: Arc<SupabaseClient>,
    default_timezone: String,
}

impl SupabaseTherapistDirectory {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(
            Arc::new(SupabaseClient::new(config)),
            config.scheduling.default_timezone.clone(),
        )
    }

    pub fn with_client(supabase: Arc<SupabaseClient>, default_timezone: String) -> Self {
        Self { supabase, default_timezone }
    }
}

#[async_trait]
impl TherapistDirectory for SupabaseTherapistDirectory {
    async fn therapist_profile(
        &self,
        therapist_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<TherapistProfile, AvailabilityError> {
        debug!("Looking up therapist {} in directory", therapist_id);
        let path = format!("/rest/v1/therapists?id=eq.{}&select=id,timezone", therapist_id);

        let rows: Vec<TherapistProfile> = self
            .supabase
            .request(Method::GET, &path, Some(ctx.token()), None)
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| AvailabilityError::NotFound(format!("therapist {}", therapist_id)))
    }

    fn default_timezone(&self) -> &str {
        &self.default_timezone
    }
}
