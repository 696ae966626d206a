use tracing::{debug, info, warn};

use crate::app::{GranuleOutcome, ProgressEvent, ProgressSink, RunReport};

/// Forwards progress events to `tracing`; failures are logged as warnings.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        if event.failed {
            warn!("{event}");
        } else {
            info!("{event}");
        }
    }
}

pub fn summary_lines(report: &RunReport) -> Vec<String> {
    let mut lines = Vec::new();
    match &report.collection_id {
        Some(id) => lines.push(format!("collection {} (DOI {})", id, report.doi)),
        None => lines.push(format!("no collection for DOI {}", report.doi)),
    }
    if report.granules.is_empty() {
        lines.push("no granules tested".to_string());
    }
    for granule in &report.granules {
        let name = granule.filename.as_deref().unwrap_or(granule.title.as_str());
        let line = match &granule.outcome {
            GranuleOutcome::DownloadFailed { reason } => {
                format!("{name}: download failed ({reason})")
            }
            GranuleOutcome::MissingLocalFile => format!("{name}: file missing after download"),
            GranuleOutcome::IndexFailed { reason } => {
                format!("{name}: gen_dmrpp_side_car failed ({reason})")
            }
            GranuleOutcome::Verified { checks } => {
                let passed = checks.iter().filter(|check| check.passed()).count();
                format!("{name}: {passed}/{} endpoints OK", checks.len())
            }
        };
        lines.push(line);
    }
    lines
}

pub fn log_report(report: &RunReport) {
    for line in summary_lines(report) {
        info!("{line}");
    }
    match serde_json::to_string_pretty(report) {
        Ok(json) => debug!("run report:\n{json}"),
        Err(err) => warn!("failed to serialize run report: {err}"),
    }
}
