use std::sync::Arc;
use std::time::Duration;

use super::report::{CommunityReport, CommunityReportsResult};

/// Receives human readable progress lines.
pub type ProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Output sequences and counters shared by every community task of a run. Callers keep it
/// behind a mutex; each `record` is one atomic update.
#[derive(Debug, Default)]
pub struct ReportAggregator {
    output: Vec<String>,
    structured_output: Vec<CommunityReport>,
    processed_count: usize,
    total_token_count: usize,
}

impl ReportAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a validated report and its text rendering, then returns the updated
    /// `(processed_count, total_token_count)`.
    pub fn record(&mut self, report: CommunityReport, token_count: usize) -> (usize, usize) {
        self.output.push(report.to_text_output());
        self.structured_output.push(report);
        self.processed_count += 1;
        self.total_token_count += token_count;
        (self.processed_count, self.total_token_count)
    }

    pub fn processed_count(&self) -> usize {
        self.processed_count
    }

    pub fn total_token_count(&self) -> usize {
        self.total_token_count
    }

    pub fn into_result(self) -> CommunityReportsResult {
        CommunityReportsResult {
            output: self.output,
            structured_output: self.structured_output,
        }
    }
}

#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    total_communities: usize,
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>, total_communities: usize) -> Self {
        ProgressReporter {
            callback,
            total_communities,
        }
    }

    pub fn community_done(&self, processed: usize, tokens: usize) {
        if let Some(callback) = &self.callback {
            callback(format!(
                "Communities: {}/{}, used tokens: {}",
                processed, self.total_communities, tokens
            ));
        }
    }

    pub fn finished(&self, elapsed: Duration, tokens: usize) {
        if let Some(callback) = &self.callback {
            callback(format!(
                "Community reports done in {:.2}s, used tokens: {}",
                elapsed.as_secs_f64(),
                tokens
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::Map;

    use super::*;
    use crate::extraction::report::Finding;

    fn report(title: &str) -> CommunityReport {
        CommunityReport {
            title: title.to_string(),
            summary: "S".to_string(),
            findings: vec![Finding::Text("A".to_string())],
            rating: 5.0,
            rating_explanation: "R".to_string(),
            weight: 1.0,
            entities: vec!["X".to_string(), "Y".to_string()],
            extra: Map::new(),
        }
    }

    #[test]
    fn test_record_accumulates() {
        let mut aggregator = ReportAggregator::new();
        assert_eq!(aggregator.record(report("T1"), 10), (1, 10));
        assert_eq!(aggregator.record(report("T2"), 32), (2, 42));
        assert_eq!(aggregator.processed_count(), 2);
        assert_eq!(aggregator.total_token_count(), 42);

        let result = aggregator.into_result();
        assert_eq!(result.output, vec!["# T1\n\nS\n\n## A\n\n", "# T2\n\nS\n\n## A\n\n"]);
        assert_eq!(result.structured_output.len(), 2);
        assert_eq!(result.structured_output[1].title, "T2");
    }

    #[test]
    fn test_progress_messages() {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = messages.clone();
        let callback: ProgressCallback = Arc::new(move |message| sink.lock().unwrap().push(message));
        let reporter = ProgressReporter::new(Some(callback), 7);

        reporter.community_done(3, 1200);
        reporter.finished(Duration::from_millis(2500), 1200);

        let messages = messages.lock().unwrap();
        assert_eq!(messages[0], "Communities: 3/7, used tokens: 1200");
        assert_eq!(messages[1], "Community reports done in 2.50s, used tokens: 1200");
    }

    #[test]
    fn test_progress_without_callback_is_silent() {
        let reporter = ProgressReporter::new(None, 1);
        reporter.community_done(1, 1);
        reporter.finished(Duration::ZERO, 1);
    }
}
