//! ICB industry lookup against the factsheet info block.

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::{error, info, warn};

use crate::config::EndpointUrls;
use crate::error::HarvestError;
use crate::input::{column_index, input_error, open_reader};
use crate::transport::{Fetched, Transport};

pub const SECTOR_COLUMN: &str = "Sector";

static CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("static CSS selector must parse"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectorLookup {
    Found(String),
    NotFound,
    Error,
    InvalidIdentity,
}

impl fmt::Display for SectorLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectorLookup::Found(industry) => write!(f, "{industry}"),
            SectorLookup::NotFound => write!(f, "Not Found"),
            SectorLookup::Error => write!(f, "Error"),
            SectorLookup::InvalidIdentity => write!(f, "Invalid ISIN or MIC"),
        }
    }
}

/// Text of the cell following the `Industry` label cell.
pub fn extract_industry(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let label = document
        .select(&CELL)
        .find(|cell| cell.text().collect::<String>().trim() == "Industry")?;
    let value = label
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|sibling| sibling.value().name() == "td")?;
    Some(value.text().collect::<String>().trim().to_string())
}

pub struct SectorExtractor<T: Transport> {
    transport: T,
    urls: EndpointUrls,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectorReport {
    pub rows: usize,
    pub found: usize,
}

impl<T: Transport> SectorExtractor<T> {
    pub fn new(transport: T, urls: EndpointUrls) -> Self {
        Self { transport, urls }
    }

    pub fn lookup(&self, isin: &str, mic: &str) -> SectorLookup {
        let (isin, mic) = (isin.trim(), mic.trim());
        if isin.is_empty() || mic.is_empty() {
            return SectorLookup::InvalidIdentity;
        }

        let key = format!("{isin}-{mic}");
        let url = self.urls.factsheet_url(&key);
        info!(%key, "fetching sector");
        match self.transport.fetch(&url) {
            Ok(Fetched::NotFound) => {
                warn!(%key, "no factsheet found (404)");
                SectorLookup::NotFound
            }
            Ok(Fetched::Content(html)) => match extract_industry(&html) {
                Some(industry) => {
                    info!(%key, %industry, "sector found");
                    SectorLookup::Found(industry)
                }
                None => {
                    warn!(%key, "no Industry field in factsheet");
                    SectorLookup::NotFound
                }
            },
            Err(err) => {
                error!(%key, error = %err, "sector lookup failed");
                SectorLookup::Error
            }
        }
    }

    /// Copies the CSV at `input` to `output` with a `Sector` column appended
    /// to every row. Rows without an ISIN or MIC are kept.
    pub fn annotate(&self, input: &Path, output: &Path) -> Result<SectorReport, HarvestError> {
        let mut reader = open_reader(input)?;
        let headers = reader.headers().map_err(|err| input_error(input, err))?.clone();
        let isin_at = column_index(&headers, "ISIN")?;
        let mic_at = column_index(&headers, "MIC")?;

        let mut writer =
            csv::Writer::from_path(output).map_err(|err| HarvestError::Csv(err.to_string()))?;
        let mut header_out = headers.clone();
        header_out.push_field(SECTOR_COLUMN);
        writer
            .write_record(&header_out)
            .map_err(|err| HarvestError::Csv(err.to_string()))?;

        let mut report = SectorReport::default();
        for record in reader.records() {
            let mut record = record.map_err(|err| input_error(input, err))?;
            // Pad short rows so the appended column lines up.
            while record.len() < headers.len() {
                record.push_field("");
            }
            let lookup = self.lookup(
                record.get(isin_at).unwrap_or_default(),
                record.get(mic_at).unwrap_or_default(),
            );
            report.rows += 1;
            if matches!(lookup, SectorLookup::Found(_)) {
                report.found += 1;
            }
            record.push_field(&lookup.to_string());
            writer
                .write_record(&record)
                .map_err(|err| HarvestError::Csv(err.to_string()))?;
        }
        writer
            .flush()
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;

        info!(rows = report.rows, found = report.found, output = %output.display(), "sector file written");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ConfigLoader};

    const FACTSHEET: &str = r#"
        <table>
          <tr><td>Industry</td><td> Consumer Staples </td></tr>
          <tr><td>SuperSector</td><td>Food, Beverage and Tobacco</td></tr>
        </table>"#;

    struct Factsheets;

    impl Transport for Factsheets {
        fn fetch(&self, url: &str) -> Result<Fetched, HarvestError> {
            if url.contains("FR0000120644-XPAR") {
                Ok(Fetched::Content(FACTSHEET.to_string()))
            } else if url.contains("BROKEN") {
                Err(HarvestError::TransportStatus {
                    url: url.to_string(),
                    status: 503,
                })
            } else if url.contains("PLAIN") {
                Ok(Fetched::Content("<p>nothing here</p>".to_string()))
            } else {
                Ok(Fetched::NotFound)
            }
        }
    }

    fn extractor() -> SectorExtractor<Factsheets> {
        SectorExtractor::new(Factsheets, ConfigLoader::resolve_config(Config::default()).urls)
    }

    #[test]
    fn industry_is_the_cell_after_the_label() {
        assert_eq!(extract_industry(FACTSHEET).as_deref(), Some("Consumer Staples"));
        assert_eq!(extract_industry("<table><tr><td>Industry</td></tr></table>"), None);
    }

    #[test]
    fn lookup_outcomes() {
        let extractor = extractor();
        assert_eq!(
            extractor.lookup("FR0000120644", "XPAR"),
            SectorLookup::Found("Consumer Staples".to_string())
        );
        assert_eq!(extractor.lookup("BROKEN", "XPAR"), SectorLookup::Error);
        assert_eq!(extractor.lookup("PLAIN", "XPAR"), SectorLookup::NotFound);
        assert_eq!(extractor.lookup("NL0000000000", "XAMS"), SectorLookup::NotFound);
        assert_eq!(extractor.lookup("", "XPAR"), SectorLookup::InvalidIdentity);
        assert_eq!(SectorLookup::InvalidIdentity.to_string(), "Invalid ISIN or MIC");
    }

    #[test]
    fn annotate_appends_sector_column() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.csv");
        std::fs::write(&input, "Name,ISIN,MIC\nDanone,FR0000120644,XPAR\nBlank,,XPAR\n").unwrap();

        let report = extractor().annotate(&input, &output).unwrap();
        assert_eq!(report, SectorReport { rows: 2, found: 1 });
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "Name,ISIN,MIC,Sector\nDanone,FR0000120644,XPAR,Consumer Staples\nBlank,,XPAR,Invalid ISIN or MIC\n"
        );
    }
}
