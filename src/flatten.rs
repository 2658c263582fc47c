//! Flat tabular projections of a scraped [`Dataset`].
//!
//! Every projection is recomputed from the dataset on each call and written
//! as CSV. Columns appear in the order they are first produced, so two calls
//! on the same dataset give byte-identical files.

use std::collections::HashMap;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use tracing::info;

use crate::domain::{Dataset, Endpoint, EntityRecord};
use crate::error::HarvestError;
use crate::store::Store;

pub const SUMMARY_FILE: &str = "companies_summary.csv";
pub const DETAILED_FILE: &str = "indicators_detailed.csv";
pub const PIVOT_FILE: &str = "esg_data_pivot.csv";

const YEARS: [&str; 3] = ["2024", "2023", "2022"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProjectionFormat {
    Summary,
    Detailed,
    Category,
    Pivot,
    All,
}

impl fmt::Display for ProjectionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionFormat::Summary => write!(f, "summary"),
            ProjectionFormat::Detailed => write!(f, "detailed"),
            ProjectionFormat::Category => write!(f, "category"),
            ProjectionFormat::Pivot => write!(f, "pivot"),
            ProjectionFormat::All => write!(f, "all"),
        }
    }
}

type Cell = Option<String>;

/// A table whose column set grows as rows introduce new names. Cells a row
/// never set stay blank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatTable {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Cell>>,
}

impl FlatTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_row(&mut self, cells: Row) {
        let mut row = vec![None; self.columns.len()];
        for (column, value) in cells {
            let position = match self.index.get(&column) {
                Some(position) => *position,
                None => {
                    self.index.insert(column.clone(), self.columns.len());
                    self.columns.push(column);
                    row.push(None);
                    self.columns.len() - 1
                }
            };
            row[position] = value;
        }
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let position = *self.index.get(column)?;
        self.rows.get(row)?.get(position)?.as_deref()
    }

    pub fn to_csv(&self) -> Result<Vec<u8>, HarvestError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        if !self.columns.is_empty() {
            writer
                .write_record(&self.columns)
                .map_err(|err| HarvestError::Csv(err.to_string()))?;
        }
        for row in &self.rows {
            let record = (0..self.columns.len())
                .map(|position| row.get(position).cloned().flatten().unwrap_or_default());
            writer
                .write_record(record)
                .map_err(|err| HarvestError::Csv(err.to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|err| HarvestError::Csv(err.to_string()))
    }
}

fn cell(column: impl Into<String>, value: Option<&str>) -> (String, Cell) {
    (column.into(), value.map(str::to_string))
}

fn identity_cells(record: &EntityRecord) -> Row {
    let company = &record.company;
    vec![
        cell("company_name", Some(&company.name)),
        cell("isin", Some(&company.isin)),
        cell("mic", Some(&company.mic)),
        cell("symbol", company.symbol.as_deref()),
        cell("market", company.market.as_deref()),
        cell("currency", company.currency.as_deref()),
        cell("scrape_timestamp", Some(&record.scrape_timestamp)),
    ]
}

/// One row per entity with per-category counts and source columns.
pub fn summary(dataset: &Dataset) -> FlatTable {
    let mut table = FlatTable::new();
    for record in &dataset.companies {
        let mut cells = identity_cells(record);
        for (endpoint, result) in &record.esg_data {
            let count = result.row_count.to_string();
            cells.push(cell(format!("{endpoint}_indicators_count"), Some(&count)));
            if let Some(metadata) = &result.metadata {
                cells.push(cell(format!("{endpoint}_source"), metadata.source.as_deref()));
                cells.push(cell(
                    format!("{endpoint}_last_update"),
                    metadata.last_update.as_deref(),
                ));
            }
        }
        table.push_row(cells);
    }
    table
}

type Row = Vec<(String, Cell)>;

/// Indicator rows of one entity, in category order. Categories without data
/// rows contribute nothing.
fn indicator_rows(record: &EntityRecord, with_category: bool) -> Vec<(Endpoint, Row)> {
    let base = identity_cells(record);
    let mut rows = Vec::new();
    for (endpoint, result) in &record.esg_data {
        if !result.has_rows() {
            continue;
        }
        let source = result.metadata.as_ref().and_then(|m| m.source.as_deref());
        let last_update = result
            .metadata
            .as_ref()
            .and_then(|m| m.last_update.as_deref());
        for row in &result.data {
            let mut cells = base.clone();
            if with_category {
                cells.push(cell("esg_category", Some(endpoint.as_str())));
            }
            cells.push(cell("indicator", row.get("Indicator")));
            cells.push(cell("unit", row.get("Unit")));
            for year in YEARS {
                cells.push(cell(format!("value_{year}"), row.get(year)));
            }
            cells.push(cell("data_source", source));
            cells.push(cell("data_last_update", last_update));
            rows.push((*endpoint, cells));
        }
    }
    rows
}

/// One row per (entity, category, indicator row).
pub fn detailed(dataset: &Dataset) -> FlatTable {
    let mut table = FlatTable::new();
    for record in &dataset.companies {
        for (_, cells) in indicator_rows(record, true) {
            table.push_row(cells);
        }
    }
    table
}

/// The detailed shape without the category column, one table per category
/// that has at least one row, in order of first appearance.
pub fn by_category(dataset: &Dataset) -> Vec<(Endpoint, FlatTable)> {
    let mut tables: Vec<(Endpoint, FlatTable)> = Vec::new();
    for record in &dataset.companies {
        for (endpoint, cells) in indicator_rows(record, false) {
            match tables.iter_mut().find(|(seen, _)| *seen == endpoint) {
                Some((_, table)) => table.push_row(cells),
                None => {
                    let mut table = FlatTable::new();
                    table.push_row(cells);
                    tables.push((endpoint, table));
                }
            }
        }
    }
    tables
}

/// Column prefix for one indicator in the pivot table. Spaces, `/` and `-`
/// become `_`; parentheses are dropped; case is kept.
pub fn pivot_prefix(category: &str, indicator: &str) -> String {
    format!("{category}_{indicator}")
        .chars()
        .filter_map(|ch| match ch {
            ' ' | '/' | '-' => Some('_'),
            '(' | ')' => None,
            other => Some(other),
        })
        .collect()
}

/// One row per entity, four columns per indicator.
pub fn pivot(dataset: &Dataset) -> FlatTable {
    let mut table = FlatTable::new();
    for record in &dataset.companies {
        let mut cells = identity_cells(record);
        for (endpoint, result) in &record.esg_data {
            for row in &result.data {
                let prefix = pivot_prefix(endpoint.as_str(), row.get("Indicator").unwrap_or(""));
                for year in YEARS {
                    cells.push(cell(format!("{prefix}_{year}"), row.get(year)));
                }
                cells.push(cell(format!("{prefix}_unit"), Some(row.get("Unit").unwrap_or(""))));
            }
        }
        table.push_row(cells);
    }
    table
}

/// Writes the projections selected by `format` under `output_dir` and returns
/// the files written.
pub fn write_projections(
    dataset: &Dataset,
    format: ProjectionFormat,
    output_dir: &Utf8Path,
) -> Result<Vec<Utf8PathBuf>, HarvestError> {
    let mut written = Vec::new();
    let all = format == ProjectionFormat::All;

    if all || format == ProjectionFormat::Summary {
        written.push(write_table(&summary(dataset), &output_dir.join(SUMMARY_FILE))?);
    }
    if all || format == ProjectionFormat::Detailed {
        written.push(write_table(&detailed(dataset), &output_dir.join(DETAILED_FILE))?);
    }
    if all || format == ProjectionFormat::Category {
        for (endpoint, table) in by_category(dataset) {
            let path = output_dir.join(format!("{endpoint}.csv"));
            written.push(write_table(&table, &path)?);
        }
    }
    if all || format == ProjectionFormat::Pivot {
        written.push(write_table(&pivot(dataset), &output_dir.join(PIVOT_FILE))?);
    }

    info!(files = written.len(), dir = %output_dir, "projections written");
    Ok(written)
}

fn write_table(table: &FlatTable, path: &Utf8Path) -> Result<Utf8PathBuf, HarvestError> {
    let bytes = table.to_csv()?;
    Store::write_bytes_atomic(path, &bytes)?;
    info!(path = %path, rows = table.len(), "wrote table");
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pivot_prefix_drops_parentheses() {
        assert_eq!(
            pivot_prefix("esg_environmental_indicators", "GHG Emissions (Scope 1)"),
            "esg_environmental_indicators_GHG_Emissions_Scope_1"
        );
        assert_eq!(
            pivot_prefix("esg_ratings", "Water/Energy - intensity"),
            "esg_ratings_Water_Energy___intensity"
        );
    }

    #[test]
    fn columns_grow_in_first_seen_order() {
        let mut table = FlatTable::new();
        table.push_row(vec![cell("a", Some("1")), cell("b", None)]);
        table.push_row(vec![cell("c", Some("3")), cell("a", Some("4"))]);

        assert_eq!(table.columns(), ["a", "b", "c"]);
        assert_eq!(table.value(0, "c"), None);
        assert_eq!(table.value(1, "a"), Some("4"));

        let csv = String::from_utf8(table.to_csv().unwrap()).unwrap();
        assert_eq!(csv, "a,b,c\n1,,\n4,,3\n");
    }

    #[test]
    fn empty_table_writes_nothing() {
        assert!(FlatTable::new().to_csv().unwrap().is_empty());
    }
}
