use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One of the fixed remote data blocks fetched per entity. Variant order is
/// fetch order, and `Ord` follows it so keyed collections iterate the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Endpoint {
    EnvironmentalIndicators,
    SocialGovernanceIndicators,
    EuTaxonomyCsrdEligibility,
    Ratings,
}

impl Endpoint {
    pub const ALL: [Endpoint; 4] = [
        Endpoint::EnvironmentalIndicators,
        Endpoint::SocialGovernanceIndicators,
        Endpoint::EuTaxonomyCsrdEligibility,
        Endpoint::Ratings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::EnvironmentalIndicators => "esg_environmental_indicators",
            Endpoint::SocialGovernanceIndicators => "esg_social_governance_indicators",
            Endpoint::EuTaxonomyCsrdEligibility => "esg_eu_taxonomy_csrd_eligibility",
            Endpoint::Ratings => "esg_ratings",
        }
    }

    /// Ratings live on their own block; everything else is an indicator block
    /// addressed by endpoint name.
    pub fn is_indicator_block(&self) -> bool {
        !matches!(self, Endpoint::Ratings)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEndpoint(pub String);

impl fmt::Display for UnknownEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown endpoint: {}", self.0)
    }
}

impl std::error::Error for UnknownEndpoint {}

impl FromStr for Endpoint {
    type Err = UnknownEndpoint;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Endpoint::ALL
            .into_iter()
            .find(|endpoint| endpoint.as_str() == value.trim())
            .ok_or_else(|| UnknownEndpoint(value.to_string()))
    }
}

impl Serialize for Endpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Endpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityIdentity {
    pub name: String,
    pub isin: String,
    pub mic: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl EntityIdentity {
    pub fn new(name: impl Into<String>, isin: impl Into<String>, mic: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            isin: isin.into(),
            mic: mic.into(),
            symbol: None,
            market: None,
            currency: None,
        }
    }

    /// The remote site's per-entity identifier, `{ISIN}-{MIC}`.
    pub fn composite_key(&self) -> String {
        format!("{}-{}", self.isin, self.mic)
    }
}

/// One table row: header name to cell text, in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorRow(Vec<(String, String)>);

impl IndicatorRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repeated header keeps its first position and takes the newest value.
    pub fn insert(&mut self, header: impl Into<String>, value: impl Into<String>) {
        let header = header.into();
        let value = value.into();
        match self.0.iter_mut().find(|(key, _)| *key == header) {
            Some(slot) => slot.1 = value,
            None => self.0.push((header, value)),
        }
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == header)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for IndicatorRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = IndicatorRow::new();
        for (key, value) in iter {
            row.insert(key, value);
        }
        row
    }
}

impl Serialize for IndicatorRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for IndicatorRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = IndicatorRow;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of header names to cell text")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut row = IndicatorRow::new();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    row.insert(key, value);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub raw_source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointResult {
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub data: Vec<IndicatorRow>,
    pub row_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SourceMetadata>,
}

impl EndpointResult {
    pub fn new(headers: Vec<String>, data: Vec<IndicatorRow>, metadata: Option<SourceMetadata>) -> Self {
        let row_count = data.len();
        Self {
            headers,
            data,
            row_count,
            metadata,
        }
    }

    pub fn has_rows(&self) -> bool {
        !self.data.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub company: EntityIdentity,
    pub esg_data: BTreeMap<Endpoint, EndpointResult>,
    pub scrape_timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub company: String,
    pub isin: String,
    pub mic: String,
    pub endpoint: Endpoint,
    pub error: String,
    pub url: String,
}

impl FailureRecord {
    pub fn new(identity: &EntityIdentity, endpoint: Endpoint, url: &str, error: String) -> Self {
        Self {
            company: identity.name.clone(),
            isin: identity.isin.clone(),
            mic: identity.mic.clone(),
            endpoint,
            error,
            url: url.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Test,
    Full,
}

impl RunMode {
    pub fn is_test(&self) -> bool {
        matches!(self, RunMode::Test)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub scrape_date: String,
    pub total_companies_attempted: usize,
    pub successful_companies: usize,
    pub failed_companies: usize,
    pub endpoints_per_company: usize,
    pub test_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub metadata: RunMetadata,
    #[serde(default)]
    pub companies: Vec<EntityRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureLog {
    pub metadata: RunMetadata,
    #[serde(default)]
    pub failed_requests: Vec<FailureRecord>,
}

pub fn iso_timestamp() -> String {
    chrono::Local::now().to_rfc3339()
}
