use std::fs::File;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::EntityIdentity;
use crate::error::HarvestError;

pub const REQUIRED_COLUMNS: [&str; 3] = ["Name", "ISIN", "MIC"];

#[derive(Debug, Deserialize)]
struct EntityRow {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "ISIN", default)]
    isin: Option<String>,
    #[serde(rename = "MIC", default)]
    mic: Option<String>,
    #[serde(rename = "Symbol", default)]
    symbol: Option<String>,
    #[serde(rename = "Market", default)]
    market: Option<String>,
    #[serde(rename = "Currency", default)]
    currency: Option<String>,
}

pub(crate) fn open_reader(path: &Path) -> Result<csv::Reader<File>, HarvestError> {
    if !path.exists() {
        return Err(HarvestError::InputMissing(path.to_path_buf()));
    }
    csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_path(path)
        .map_err(|err| input_error(path, err))
}

pub(crate) fn input_error(path: &Path, err: impl ToString) -> HarvestError {
    HarvestError::InputRead {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Index of `column` in `headers`, or an error naming the missing column.
pub(crate) fn column_index(headers: &csv::StringRecord, column: &str) -> Result<usize, HarvestError> {
    headers
        .iter()
        .position(|header| header == column)
        .ok_or_else(|| HarvestError::InputColumn(column.to_string()))
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Reads the entity list. Rows without an ISIN or MIC are dropped; file order
/// is kept for the rest.
pub fn load_entities(path: &Path) -> Result<Vec<EntityIdentity>, HarvestError> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(|err| input_error(path, err))?.clone();
    for column in REQUIRED_COLUMNS {
        column_index(&headers, column)?;
    }

    let mut entities = Vec::new();
    let mut dropped = 0usize;
    for row in reader.deserialize::<EntityRow>() {
        let row = row.map_err(|err| input_error(path, err))?;
        let (Some(isin), Some(mic)) = (present(row.isin), present(row.mic)) else {
            dropped += 1;
            continue;
        };
        let mut identity = EntityIdentity::new(present(row.name).unwrap_or_default(), isin, mic);
        identity.symbol = present(row.symbol);
        identity.market = present(row.market);
        identity.currency = present(row.currency);
        entities.push(identity);
    }

    if dropped > 0 {
        warn!(dropped, "skipped rows without ISIN or MIC");
    }
    info!(count = entities.len(), "found companies with valid ISIN and MIC codes");
    Ok(entities)
}
