//! Delivery of contacts to the Supabase backend
//!
//! The listener hands built contacts to a bounded queue; a single worker
//! drains it and inserts each contact with bounded retry. Retry sleeps only
//! hold up the worker, never reception.

pub mod client;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::DeliveryConfig;
use crate::contact::ContactRecord;
pub use client::SupabaseClient;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Somewhere contacts can be inserted
#[async_trait]
pub trait ContactSink: Send + Sync {
    /// One insert attempt; `Ok` only if the endpoint accepted the row
    async fn insert_contact(&self, contact: &ContactRecord) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl From<&DeliveryConfig> for RetryPolicy {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            attempts: config.retry_attempts,
            delay: Duration::from_secs(config.retry_delay),
        }
    }
}

/// Result of delivering one contact
#[derive(Debug)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32, error: DeliveryError },
}

/// Insert a contact, retrying with a fixed delay between attempts
pub async fn deliver(
    sink: &dyn ContactSink,
    contact: &ContactRecord,
    policy: RetryPolicy,
) -> DeliveryOutcome {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match sink.insert_contact(contact).await {
            Ok(()) => return DeliveryOutcome::Delivered { attempts: attempt },
            Err(e) => {
                if attempt >= policy.attempts {
                    return DeliveryOutcome::Failed {
                        attempts: attempt,
                        error: e,
                    };
                }
                warn!(
                    "Insert attempt {}/{} for {} failed: {}. Retrying in {:?}...",
                    attempt,
                    policy.attempts,
                    contact.contacted_callsign,
                    e,
                    policy.delay
                );
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}

/// Totals reported when the worker stops
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub delivered: u64,
    pub failed: u64,
}

/// Drain the delivery queue until every sender is dropped
pub async fn run_worker(
    sink: Arc<dyn ContactSink>,
    mut rx: mpsc::Receiver<ContactRecord>,
    policy: RetryPolicy,
) -> WorkerStats {
    let mut stats = WorkerStats::default();

    while let Some(contact) = rx.recv().await {
        match deliver(sink.as_ref(), &contact, policy).await {
            DeliveryOutcome::Delivered { attempts } => {
                stats.delivered += 1;
                info!(
                    "[OK] Logged contact: {} (attempt {})",
                    contact.summary(),
                    attempts
                );
            }
            DeliveryOutcome::Failed { attempts, error } => {
                stats.failed += 1;
                error!(
                    "Failed to log contact {} after {} attempts: {}",
                    contact.summary(),
                    attempts,
                    error
                );
            }
        }
    }

    info!(
        "Delivery queue closed ({} delivered, {} failed)",
        stats.delivered, stats.failed
    );
    stats
}
