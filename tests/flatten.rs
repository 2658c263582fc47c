use std::fs;

use camino::Utf8PathBuf;
use esg_harvester::domain::{Dataset, Endpoint};
use esg_harvester::flatten::{
    DETAILED_FILE, PIVOT_FILE, ProjectionFormat, SUMMARY_FILE, by_category, detailed, pivot,
    summary, write_projections,
};

const DATASET: &str = r#"{
  "metadata": {
    "scrape_date": "2024-07-01T09:00:00+02:00",
    "total_companies_attempted": 2,
    "successful_companies": 2,
    "failed_companies": 0,
    "endpoints_per_company": 4,
    "test_mode": true
  },
  "companies": [
    {
      "company": {
        "name": "Danone",
        "isin": "FR0000120644",
        "mic": "XPAR",
        "symbol": "BN",
        "market": "Euronext Paris",
        "currency": "EUR"
      },
      "esg_data": {
        "esg_environmental_indicators": {
          "headers": ["Indicator", "Unit", "2024", "2023", "2022"],
          "data": [
            {"Indicator": "GHG Emissions (Scope 1)", "Unit": "tCO2e", "2024": "120", "2023": "130", "2022": "140"},
            {"Indicator": "Water/Energy - intensity", "Unit": "m3", "2024": "5", "2023": "", "2022": "7"}
          ],
          "row_count": 2,
          "metadata": {
            "raw_source": "Source: Company - Last Update: 2024-06-30",
            "source": "Company",
            "last_update": "2024-06-30"
          }
        },
        "esg_ratings": {
          "headers": ["Indicator", "2024"],
          "data": [{"Indicator": "MSCI", "2024": "AA"}],
          "row_count": 1
        }
      },
      "scrape_timestamp": "2024-07-01T09:00:05+02:00"
    },
    {
      "company": {"name": "Adyen", "isin": "NL0012969182", "mic": "XAMS"},
      "esg_data": {
        "esg_social_governance_indicators": {
          "row_count": 3,
          "metadata": {"raw_source": "Source: Adyen - Last Update: 2024-03-31", "source": "Adyen", "last_update": "2024-03-31"}
        }
      },
      "scrape_timestamp": "2024-07-01T09:00:09+02:00"
    }
  ]
}"#;

fn dataset() -> Dataset {
    serde_json::from_str(DATASET).unwrap()
}

#[test]
fn summary_has_one_row_per_entity() {
    let table = summary(&dataset());

    assert_eq!(table.len(), 2);
    assert_eq!(
        &table.columns()[..7],
        ["company_name", "isin", "mic", "symbol", "market", "currency", "scrape_timestamp"]
    );
    assert_eq!(table.value(0, "esg_ratings_indicators_count"), Some("1"));
    assert_eq!(table.value(1, "esg_ratings_indicators_count"), None);
    assert_eq!(table.value(0, "esg_environmental_indicators_source"), Some("Company"));
    assert_eq!(table.value(0, "esg_ratings_source"), None);
    assert!(!table.columns().iter().any(|column| column == "esg_ratings_source"));
    assert_eq!(
        table.value(1, "esg_social_governance_indicators_indicators_count"),
        Some("3")
    );
    assert_eq!(
        table.value(1, "esg_social_governance_indicators_last_update"),
        Some("2024-03-31")
    );
    assert_eq!(table.value(1, "symbol"), None);
}

#[test]
fn detailed_rows_come_only_from_entities_with_data() {
    let table = detailed(&dataset());

    assert_eq!(table.len(), 3);
    for row in 0..table.len() {
        assert_eq!(table.value(row, "isin"), Some("FR0000120644"));
    }
    assert_eq!(table.value(0, "esg_category"), Some("esg_environmental_indicators"));
    assert_eq!(table.value(1, "value_2023"), Some(""));
    assert_eq!(table.value(1, "data_last_update"), Some("2024-06-30"));
    assert_eq!(table.value(2, "esg_category"), Some("esg_ratings"));
    assert_eq!(table.value(2, "unit"), None);
    assert_eq!(table.value(2, "data_source"), None);
}

#[test]
fn category_tables_omit_category_column() {
    let tables = by_category(&dataset());

    let categories: Vec<Endpoint> = tables.iter().map(|(endpoint, _)| *endpoint).collect();
    assert_eq!(categories, [Endpoint::EnvironmentalIndicators, Endpoint::Ratings]);
    for (_, table) in &tables {
        assert!(!table.columns().iter().any(|column| column == "esg_category"));
    }
    assert_eq!(tables[0].1.len(), 2);
}

#[test]
fn pivot_spreads_indicators_into_columns() {
    let table = pivot(&dataset());

    assert_eq!(table.len(), 2);
    assert_eq!(
        table.value(0, "esg_environmental_indicators_GHG_Emissions_Scope_1_2024"),
        Some("120")
    );
    assert_eq!(
        table.value(0, "esg_environmental_indicators_Water_Energy___intensity_unit"),
        Some("m3")
    );
    assert_eq!(table.value(0, "esg_ratings_MSCI_unit"), Some(""));
    assert_eq!(table.value(0, "esg_ratings_MSCI_2023"), None);
    assert_eq!(table.value(1, "esg_ratings_MSCI_2024"), None);
    assert_eq!(table.value(1, "company_name"), Some("Adyen"));
}

#[test]
fn projections_are_written_and_repeatable() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let dataset = dataset();

    let first_dir = root.join("first");
    let second_dir = root.join("second");
    let first = write_projections(&dataset, ProjectionFormat::All, &first_dir).unwrap();
    let second = write_projections(&dataset, ProjectionFormat::All, &second_dir).unwrap();

    let names: Vec<&str> = first.iter().filter_map(|path| path.file_name()).collect();
    assert_eq!(
        names,
        [
            SUMMARY_FILE,
            DETAILED_FILE,
            "esg_environmental_indicators.csv",
            "esg_ratings.csv",
            PIVOT_FILE
        ]
    );
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(fs::read(a).unwrap(), fs::read(b).unwrap());
    }

    let summary_csv = fs::read_to_string(first_dir.join(SUMMARY_FILE)).unwrap();
    let mut lines = summary_csv.lines();
    assert!(lines.next().unwrap().starts_with("company_name,isin,mic,"));
    assert!(lines.next().unwrap().starts_with("Danone,FR0000120644,XPAR,BN,"));
    assert!(lines.next().unwrap().starts_with("Adyen,NL0012969182,XAMS,,,,"));
}

#[test]
fn single_format_writes_one_file() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

    let written = write_projections(&dataset(), ProjectionFormat::Pivot, &root).unwrap();
    assert_eq!(written, [root.join(PIVOT_FILE)]);
}
