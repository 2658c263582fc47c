//! Heuristic extraction of the indicator table and its "Source / Last Update"
//! footer from one HTML fragment.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::domain::{EndpointResult, IndicatorRow, SourceMetadata};

const SOURCE_MARKER: &str = "Source:";
const LAST_UPDATE_MARKER: &str = "Last Update:";

static TABLE: LazyLock<Selector> = LazyLock::new(|| selector("table"));
static ROW: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static HEADER_CELL: LazyLock<Selector> = LazyLock::new(|| selector("th"));
static DATA_CELL: LazyLock<Selector> = LazyLock::new(|| selector("td"));
static FOOTER: LazyLock<Selector> = LazyLock::new(|| selector("div.card-footer"));
static PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| selector("p"));

// Only ever called with the literal selectors above.
fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static CSS selector must parse")
}

/// Parses `html` into a table result. `None` when there is no table, no
/// header row, or no accepted data row.
pub fn parse_table(html: &str) -> Option<EndpointResult> {
    debug!(length = html.len(), "parsing HTML fragment");
    let document = Html::parse_document(html);

    let tables: Vec<ElementRef<'_>> = document.select(&TABLE).collect();
    if tables.is_empty() {
        let lower = html.to_lowercase();
        if lower.contains("table") || lower.contains("indicator") {
            warn!("fragment mentions table data but contains no <table> element");
        } else {
            debug!("no tables found");
        }
        return None;
    }

    let classes: Vec<Option<&str>> = tables
        .iter()
        .map(|table| table.value().attr("class"))
        .collect();
    let index = preferred_table(&classes)?;
    debug!(candidates = tables.len(), selected = index, "table selected");
    let table = tables[index];

    let rows: Vec<ElementRef<'_>> = table.select(&ROW).collect();
    let (header_row, body_rows) = rows.split_first()?;

    let headers = header_cells(*header_row);
    if headers.is_empty() {
        debug!("no headers found in table");
        return None;
    }

    let data: Vec<IndicatorRow> = body_rows
        .iter()
        .filter_map(|row| {
            let cells: Vec<String> = row.select(&DATA_CELL).map(cell_text).collect();
            accept_row(&headers, cells)
        })
        .collect();

    if data.is_empty() {
        warn!("table found but no data rows extracted");
        return None;
    }
    debug!(rows = data.len(), "extracted data rows");

    let metadata = extract_metadata(&document);
    Some(EndpointResult::new(headers, data, metadata))
}

/// Picks among candidate tables given their class attributes: the first whose
/// class mentions `table`, else the first table.
pub fn preferred_table(classes: &[Option<&str>]) -> Option<usize> {
    if classes.is_empty() {
        return None;
    }
    let styled = classes
        .iter()
        .position(|class| class.is_some_and(|class| class.contains("table")));
    Some(styled.unwrap_or(0))
}

/// Binds `cells` to `headers` by position. Short rows and rows without any
/// non-blank cell are rejected; surplus cells are ignored.
pub fn accept_row(headers: &[String], cells: Vec<String>) -> Option<IndicatorRow> {
    if cells.is_empty() || cells.len() < headers.len() {
        return None;
    }
    let row: IndicatorRow = headers
        .iter()
        .cloned()
        .zip(cells)
        .collect();
    if row.values().all(|value| value.trim().is_empty()) {
        return None;
    }
    Some(row)
}

fn header_cells(row: ElementRef<'_>) -> Vec<String> {
    let headers: Vec<String> = row.select(&HEADER_CELL).map(cell_text).collect();
    if !headers.is_empty() {
        return headers;
    }
    row.select(&DATA_CELL).map(cell_text).collect()
}

/// Text of an element with each text node trimmed, joined without separator.
fn cell_text(element: ElementRef<'_>) -> String {
    element.text().map(str::trim).collect()
}

fn extract_metadata(document: &Html) -> Option<SourceMetadata> {
    let footer = document.select(&FOOTER).next()?;
    let paragraph = footer.select(&PARAGRAPH).next()?;
    let text = cell_text(paragraph);
    if text.is_empty() {
        return None;
    }
    debug!(text = %text, "found footer metadata");
    Some(split_source_text(&text))
}

/// Splits footer text of the form `Source: X - Last Update: Y`.
pub fn split_source_text(text: &str) -> SourceMetadata {
    let raw = text.trim();
    let mut metadata = SourceMetadata {
        raw_source: raw.to_string(),
        source: None,
        last_update: None,
    };

    let Some((_, remainder)) = raw.split_once(SOURCE_MARKER) else {
        return metadata;
    };
    let remainder = remainder.trim();
    match remainder.split_once(LAST_UPDATE_MARKER) {
        Some((source, last_update)) => {
            metadata.source = Some(source.trim().trim_end_matches([' ', '-']).to_string());
            metadata.last_update = Some(last_update.trim().to_string());
        }
        None => metadata.source = Some(remainder.to_string()),
    }
    metadata
}
