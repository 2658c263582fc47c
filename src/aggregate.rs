use std::collections::BTreeMap;

use tracing::{debug, error, info, warn};

use crate::config::EndpointUrls;
use crate::domain::{
    Endpoint, EndpointResult, EntityIdentity, EntityRecord, FailureRecord, iso_timestamp,
};
use crate::error::HarvestError;
use crate::extract::parse_table;
use crate::transport::{Fetched, Transport};

/// Receives every non-empty raw document before it is parsed.
pub trait RawDocumentSink {
    fn store_raw(
        &self,
        identity: &EntityIdentity,
        endpoint: Endpoint,
        html: &str,
    ) -> Result<(), HarvestError>;
}

pub struct DiscardRaw;

impl RawDocumentSink for DiscardRaw {
    fn store_raw(
        &self,
        _identity: &EntityIdentity,
        _endpoint: Endpoint,
        _html: &str,
    ) -> Result<(), HarvestError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityOutcome {
    /// `None` when no endpoint produced a data row.
    pub record: Option<EntityRecord>,
    pub failures: Vec<FailureRecord>,
}

pub struct EntityAggregator<T: Transport, S: RawDocumentSink> {
    transport: T,
    raw: S,
    urls: EndpointUrls,
}

impl<T: Transport, S: RawDocumentSink> EntityAggregator<T, S> {
    pub fn new(transport: T, raw: S, urls: EndpointUrls) -> Self {
        Self {
            transport,
            raw,
            urls,
        }
    }

    /// Fetches every endpoint for `identity`. A failing endpoint is recorded
    /// and the remaining endpoints are still attempted.
    pub fn scrape_entity(&self, identity: &EntityIdentity) -> EntityOutcome {
        let key = identity.composite_key();
        let mut esg_data = BTreeMap::new();
        let mut failures = Vec::new();

        for endpoint in Endpoint::ALL {
            let url = self.urls.endpoint_url(&key, endpoint);
            info!(%endpoint, "fetching");
            debug!(%url, "endpoint url");

            match self.collect(identity, endpoint, &url) {
                Ok(Some(result)) => {
                    info!(%endpoint, rows = result.row_count, "rows found");
                    esg_data.insert(endpoint, result);
                }
                Ok(None) => {}
                Err(err) => {
                    error!(%endpoint, company = %identity.name, error = %err, "endpoint failed");
                    failures.push(FailureRecord::new(identity, endpoint, &url, err.to_string()));
                }
            }
        }

        if esg_data.is_empty() {
            warn!(company = %identity.name, "no ESG data found");
            return EntityOutcome {
                record: None,
                failures,
            };
        }

        info!(company = %identity.name, endpoints = esg_data.len(), "entity scraped");
        EntityOutcome {
            record: Some(EntityRecord {
                company: identity.clone(),
                esg_data,
                scrape_timestamp: iso_timestamp(),
            }),
            failures,
        }
    }

    fn collect(
        &self,
        identity: &EntityIdentity,
        endpoint: Endpoint,
        url: &str,
    ) -> Result<Option<EndpointResult>, HarvestError> {
        let html = match self.transport.fetch(url)? {
            Fetched::NotFound => {
                info!(%endpoint, "no data (not found)");
                return Ok(None);
            }
            Fetched::Content(html) => html,
        };

        if html.trim().is_empty() {
            warn!(%endpoint, "empty HTML response");
            return Ok(None);
        }

        if let Err(err) = self.raw.store_raw(identity, endpoint, &html) {
            error!(%endpoint, error = %err, "failed to save raw document");
        }

        match parse_table(&html) {
            Some(result) if result.row_count > 0 => Ok(Some(result)),
            _ => {
                warn!(%endpoint, "HTML received but no table data extracted");
                let lower = html.to_lowercase();
                if ["indicator", "rating", "tbody", "thead"]
                    .iter()
                    .any(|keyword| lower.contains(keyword))
                {
                    warn!(%endpoint, "HTML looks like indicator content but parsing failed");
                }
                Ok(None)
            }
        }
    }
}
