use std::io::{self, Write};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::info;

use crate::pipeline::{ProgressEvent, ProgressSink, RunOutput};
use crate::sector::SectorReport;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total_companies: usize,
    pub successful: usize,
    pub failed: usize,
    pub failed_requests: usize,
    pub success_rate: String,
    pub files_created: Vec<Utf8PathBuf>,
}

impl RunSummary {
    pub fn new(output: &RunOutput, files_created: Vec<Utf8PathBuf>) -> Self {
        let total = output.attempted();
        let successful = output.dataset.companies.len();
        Self {
            total_companies: total,
            successful,
            failed: total - successful,
            failed_requests: output.failure_log.failed_requests.len(),
            success_rate: format!("{:.1}%", output.success_rate()),
            files_created,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FlattenSummary {
    pub input: Utf8PathBuf,
    pub companies: usize,
    pub files_created: Vec<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectorSummary {
    pub output: String,
    pub rows: usize,
    pub found: usize,
}

impl SectorSummary {
    pub fn new(output: String, report: &SectorReport) -> Self {
        Self {
            output,
            rows: report.rows,
            found: report.found,
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_flatten(summary: &FlattenSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_sector(summary: &SectorSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress events to the tracing subscriber.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_secs = elapsed.as_secs_f64(), "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}
