//! Payment-provider feed sync
//!
//! Providers (credit card processor, payment gateway) expose a JSON feed of
//! settled transactions. The client pulls a feed, maps each record onto a
//! `NewTransaction`, and the caller inserts them with the same dedup as CSV
//! import.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::import::generate_hash;
use crate::models::{NewTransaction, TransactionSource, TransactionStatus};

/// Environment variable for the provider feed base URL
pub const PROVIDER_URL_ENV: &str = "TALLY_PROVIDER_URL";

/// One record from a provider feed
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTransaction {
    /// Provider-side transaction id, becomes our reference
    pub id: String,
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
}

/// HTTP client for provider feeds
#[derive(Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    base_url: String,
}

impl ProviderClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build a client from `TALLY_PROVIDER_URL`, if set
    pub fn from_env() -> Option<Self> {
        let url = std::env::var(PROVIDER_URL_ENV).ok()?;
        Self::new(&url).ok()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Pull the feed for one source
    pub async fn pull(&self, source: TransactionSource) -> Result<Vec<ProviderTransaction>> {
        let url = format!("{}/{}/transactions", self.base_url, source.as_str());
        debug!(url = %url, "Pulling provider feed");

        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Provider(format!(
                "{} feed returned {}",
                source,
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}

/// Map a provider record onto a new transaction
///
/// Unknown provider statuses fall back to `completed` - feeds only carry
/// settled records. A missing timestamp means "just now" from our side.
pub fn to_new_transaction(source: TransactionSource, record: ProviderTransaction) -> NewTransaction {
    let created_at = record.created_at.unwrap_or_else(Utc::now);
    let status = record
        .status
        .as_deref()
        .and_then(|s| TransactionStatus::from_str(s).ok())
        .unwrap_or(TransactionStatus::Completed);

    let import_hash = generate_hash(
        &created_at,
        &record.id,
        record.amount,
        record.merchant.as_deref(),
    );

    NewTransaction {
        reference: record.id,
        created_at,
        status,
        source,
        amount: record.amount,
        currency: record.currency.unwrap_or_else(|| "USD".to_string()),
        customer_name: record.customer_name,
        customer_email: record.customer_email,
        merchant: record.merchant,
        notes: None,
        import_hash,
    }
}
