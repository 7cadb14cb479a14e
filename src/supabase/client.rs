//! Minimal PostgREST client for inserting contacts
//!
//! One call only: `POST /rest/v1/contacts` with the service-role key.
//! With `Prefer: return=minimal` the endpoint answers `201 Created` and no
//! body; some deployments answer `200 OK`, which is accepted too.
//!
//! Reference: <https://postgrest.org/en/stable/references/api/tables_views.html#insert>

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

use super::{ContactSink, DeliveryError};
use crate::config::{DeliveryConfig, SupabaseConfig};
use crate::contact::ContactRecord;

/// HTTP client for the `contacts` table
pub struct SupabaseClient {
    http: Client,
    endpoint: String,
}

impl SupabaseClient {
    /// Build the client; no request is made until the first insert
    pub fn new(supabase: &SupabaseConfig, delivery: &DeliveryConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&supabase.key).context("supabase.key is not a valid header value")?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", supabase.key))
            .context("supabase.key is not a valid header value")?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // With a qso_key column, retried inserts of an accepted row are ignored
        let (endpoint, prefer) = if delivery.idempotency_key {
            (
                format!("{}/rest/v1/contacts?on_conflict=qso_key", supabase.url.trim_end_matches('/')),
                "return=minimal,resolution=ignore-duplicates",
            )
        } else {
            (
                format!("{}/rest/v1/contacts", supabase.url.trim_end_matches('/')),
                "return=minimal",
            )
        };
        headers.insert("prefer", HeaderValue::from_static(prefer));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(delivery.timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        info!("Supabase client configured for {}", supabase.url);

        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ContactSink for SupabaseClient {
    async fn insert_contact(&self, contact: &ContactRecord) -> Result<(), DeliveryError> {
        debug!("POST {} ({})", self.endpoint, contact.summary());

        let resp = self.http.post(&self.endpoint).json(contact).send().await?;

        let status = resp.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(DeliveryError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
