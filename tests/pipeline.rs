use std::cell::Cell;
use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use esg_harvester::aggregate::EntityAggregator;
use esg_harvester::config::{Config, ConfigLoader};
use esg_harvester::domain::{Endpoint, EntityIdentity, RunMode};
use esg_harvester::error::HarvestError;
use esg_harvester::flatten::{ProjectionFormat, write_projections};
use esg_harvester::output::JsonOutput;
use esg_harvester::pipeline::DatasetBuilder;
use esg_harvester::store::Store;
use esg_harvester::transport::{Fetched, Transport, send_with_retries};

const ENVIRONMENTAL: &str = r#"
<table class="table">
  <tr><th>Indicator</th><th>Unit</th><th>2024</th><th>2023</th><th>2022</th></tr>
  <tr><td>GHG Emissions (Scope 1)</td><td>tCO2e</td><td>120</td><td>130</td><td>140</td></tr>
</table>
<div class="card-footer"><p>Source: Company - Last Update: 2024-06-30</p></div>"#;

const RATINGS: &str = r#"<table class="table"><tr><th>Agency</th><th>Rating</th></tr><tr><td>MSCI</td><td>AA</td></tr></table>"#;

/// Serves canned pages by URL; unknown URLs are 404s, `None` bodies fail.
struct CannedSite {
    pages: HashMap<String, Option<&'static str>>,
}

impl Transport for CannedSite {
    fn fetch(&self, url: &str) -> Result<Fetched, HarvestError> {
        match self.pages.get(url) {
            Some(Some(body)) => Ok(Fetched::Content(body.to_string())),
            Some(None) => Err(HarvestError::Transport {
                url: url.to_string(),
                message: "connection reset".to_string(),
            }),
            None => Ok(Fetched::NotFound),
        }
    }
}

#[test]
fn scrape_persist_and_flatten() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let store = Store::new_with_root(root.join("output"));
    store.ensure_layout().unwrap();

    let urls = ConfigLoader::resolve_config(Config::default()).urls;
    let danone = EntityIdentity::new("Danone", "FR0000120644", "XPAR");
    let adyen = EntityIdentity::new("Adyen", "NL0012969182", "XAMS");
    let pages = HashMap::from([
        (
            urls.endpoint_url(&danone.composite_key(), Endpoint::EnvironmentalIndicators),
            Some(ENVIRONMENTAL),
        ),
        (
            urls.endpoint_url(&danone.composite_key(), Endpoint::Ratings),
            Some(RATINGS),
        ),
        (
            urls.endpoint_url(&adyen.composite_key(), Endpoint::Ratings),
            None,
        ),
    ]);

    let aggregator = EntityAggregator::new(CannedSite { pages }, store.clone(), urls);
    let builder = DatasetBuilder::new(aggregator, 50);
    let output = builder.run(&[danone.clone(), adyen], RunMode::Test, &JsonOutput);

    assert_eq!(output.dataset.companies.len(), 1);
    assert_eq!(output.failure_log.failed_requests.len(), 1);
    assert_eq!(output.failure_log.failed_requests[0].endpoint, Endpoint::Ratings);
    assert_eq!(output.success_rate(), 50.0);

    let persisted = store.persist_run(&output).unwrap();
    let reloaded = Store::load_dataset(&persisted.dataset).unwrap();
    assert_eq!(reloaded, output.dataset);

    let raw = store.raw_document_path(&danone, Endpoint::Ratings);
    assert_eq!(fs::read_to_string(&raw).unwrap(), RATINGS);

    let failures: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&persisted.failures).unwrap()).unwrap();
    assert_eq!(failures["failed_requests"][0]["company"], "Adyen");
    assert_eq!(failures["metadata"]["test_mode"], true);

    let dataset_json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&persisted.dataset).unwrap()).unwrap();
    let esg_data = &dataset_json["companies"][0]["esg_data"];
    assert_eq!(
        esg_data["esg_environmental_indicators"]["metadata"]["last_update"],
        "2024-06-30"
    );
    assert_eq!(esg_data["esg_ratings"]["row_count"], 1);

    let written =
        write_projections(&reloaded, ProjectionFormat::Detailed, &root.join("csv_output")).unwrap();
    let detailed = fs::read_to_string(&written[0]).unwrap();
    assert_eq!(detailed.lines().count(), 3);
}

#[test]
fn retry_recovers_after_two_failures() {
    let calls = Cell::new(0);
    let result = send_with_retries(2, Duration::ZERO, |_| {
        calls.set(calls.get() + 1);
        if calls.get() < 3 {
            Err(HarvestError::TransportStatus {
                url: "https://example.test".to_string(),
                status: 502,
            })
        } else {
            Ok(Fetched::Content("<table></table>".to_string()))
        }
    });

    assert_matches!(result, Ok(Fetched::Content(body)) if body == "<table></table>");
    assert_eq!(calls.get(), 3);
}
