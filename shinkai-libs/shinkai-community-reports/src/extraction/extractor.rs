use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::community_reports_errors::CommunityReportError;
use crate::community_reports_logging::{report_log, truncate_for_log, ReportLogLevel, ReportLogOption};
use crate::configuration::CommunityReportsConfig;
use crate::graph::knowledge_graph::KnowledgeGraph;
use crate::graph::partition::{Community, CommunityDetector, Partition};
use crate::llm::base::{ChatMessage, CompletionLLM, GenerationConfig};
use crate::llm::utils::num_tokens;

use super::aggregator::{ProgressCallback, ProgressReporter, ReportAggregator};
use super::governor::ConcurrencyGovernor;
use super::invocation::{InvocationEngine, RetryPolicy};
use super::prompt_tables::build_prompt_tables;
use super::prompts::{perform_variable_replacements, COMMUNITY_REPORT_PROMPT};
use super::report::CommunityReportsResult;
use super::response_validator::parse_report_response;
use super::scheduler::BatchScheduler;

pub type TokenCounter = fn(&str) -> usize;

/// Terminal state of one community task.
#[derive(Debug, Clone, PartialEq)]
pub enum CommunityOutcome {
    /// Fewer than two entities, nothing was asked.
    Skipped,
    Reported,
    Dropped(CommunityReportError),
}

/// Everything a community task needs. Shared by all tasks of a run.
pub struct CommunityReportTask {
    graph: Arc<RwLock<KnowledgeGraph>>,
    engine: InvocationEngine,
    extraction_prompt: String,
    max_report_length: usize,
    gen_conf: GenerationConfig,
    token_counter: TokenCounter,
    aggregator: Arc<Mutex<ReportAggregator>>,
    progress: ProgressReporter,
}

impl CommunityReportTask {
    pub async fn process_community(&self, community: Community) -> CommunityOutcome {
        if !community.is_reportable() {
            return CommunityOutcome::Skipped;
        }

        match self.report_community(&community).await {
            Ok(()) => CommunityOutcome::Reported,
            Err(error) => {
                report_log(
                    ReportLogOption::Extraction,
                    ReportLogLevel::Warn,
                    &format!(
                        "Community {} dropped: {}",
                        community.id,
                        truncate_for_log(&error.to_string(), 100)
                    ),
                );
                CommunityOutcome::Dropped(error)
            }
        }
    }

    async fn report_community(&self, community: &Community) -> Result<(), CommunityReportError> {
        let tables = {
            let graph = self.graph.read().await;
            build_prompt_tables(&community.nodes, &graph)?
        };

        let max_report_length = self.max_report_length.to_string();
        let prompt = perform_variable_replacements(
            &self.extraction_prompt,
            &[
                ("entity_df", tables.entity_table.as_str()),
                ("relation_df", tables.relation_table.as_str()),
                ("max_report_length", max_report_length.as_str()),
            ],
        );
        let history = vec![ChatMessage::user("Output:")];

        let response = self
            .engine
            .invoke(&community.id, &prompt, &history, &self.gen_conf)
            .await?;
        report_log(
            ReportLogOption::Validation,
            ReportLogLevel::Debug,
            &format!("Community {} response: {}", community.id, truncate_for_log(&response, 200)),
        );

        let mut report = parse_report_response(&response).map_err(|error| {
            report_log(
                ReportLogOption::Validation,
                ReportLogLevel::Error,
                &format!(
                    "Community {} rejected response: {}. Response content: {}",
                    community.id,
                    truncate_for_log(&error.to_string(), 100),
                    truncate_for_log(&response, 500)
                ),
            );
            error
        })?;
        report.weight = community.weight;
        report.entities = community.nodes.clone();

        let token_count = (self.token_counter)(&format!("{}{}", prompt, response));

        self.graph
            .write()
            .await
            .add_community_title(&community.nodes, &report.title);
        // report under the lock so progress lines arrive in counter order
        let mut aggregator = self.aggregator.lock().await;
        let (processed, tokens) = aggregator.record(report, token_count);
        self.progress.community_done(processed, tokens);
        Ok(())
    }
}

/// Produces one report per eligible community of a partition by asking the model, in
/// bounded parallel groups.
pub struct CommunityReportsExtractor {
    llm: Arc<dyn CompletionLLM>,
    config: CommunityReportsConfig,
    extraction_prompt: String,
    token_counter: TokenCounter,
}

impl CommunityReportsExtractor {
    pub fn new(llm: Arc<dyn CompletionLLM>, config: CommunityReportsConfig) -> Self {
        CommunityReportsExtractor {
            llm,
            config: config.normalized(),
            extraction_prompt: COMMUNITY_REPORT_PROMPT.to_string(),
            token_counter: num_tokens,
        }
    }

    pub fn with_prompt(mut self, extraction_prompt: &str) -> Self {
        self.extraction_prompt = extraction_prompt.to_string();
        self
    }

    pub fn with_token_counter(mut self, token_counter: TokenCounter) -> Self {
        self.token_counter = token_counter;
        self
    }

    pub fn config(&self) -> &CommunityReportsConfig {
        &self.config
    }

    /// Ranks nodes by degree, detects communities once and reports on them. Only a
    /// detection failure is returned as an error.
    pub async fn run(
        &self,
        graph: Arc<RwLock<KnowledgeGraph>>,
        detector: &dyn CommunityDetector,
        callback: Option<ProgressCallback>,
    ) -> anyhow::Result<CommunityReportsResult> {
        let partition = {
            let mut graph = graph.write().await;
            graph.assign_degree_ranks();
            detector.detect(&graph)?
        };
        Ok(self.process_partition(graph, &partition, callback).await)
    }

    /// Same as `run` with an already computed partition.
    pub async fn extract_from_partition(
        &self,
        graph: Arc<RwLock<KnowledgeGraph>>,
        partition: &Partition,
        callback: Option<ProgressCallback>,
    ) -> CommunityReportsResult {
        graph.write().await.assign_degree_ranks();
        self.process_partition(graph, partition, callback).await
    }

    async fn process_partition(
        &self,
        graph: Arc<RwLock<KnowledgeGraph>>,
        partition: &Partition,
        callback: Option<ProgressCallback>,
    ) -> CommunityReportsResult {
        for level in &partition.levels {
            report_log(
                ReportLogOption::Extraction,
                ReportLogLevel::Info,
                &format!("Level {}: Community: {}", level.level, level.communities.len()),
            );
        }

        let aggregator = Arc::new(Mutex::new(ReportAggregator::new()));
        let progress = ProgressReporter::new(callback, partition.total_communities());
        let task = Arc::new(CommunityReportTask {
            graph,
            engine: InvocationEngine::new(
                Arc::clone(&self.llm),
                ConcurrencyGovernor::new(self.config.max_concurrent_communities),
                RetryPolicy::from_config(&self.config),
            ),
            extraction_prompt: self.extraction_prompt.clone(),
            max_report_length: self.config.max_report_length,
            gen_conf: GenerationConfig {
                temperature: self.config.temperature,
                max_tokens: None,
            },
            token_counter: self.token_counter,
            aggregator: Arc::clone(&aggregator),
            progress: progress.clone(),
        });

        let started = Instant::now();
        let scheduler = BatchScheduler::new(self.config.batch_size, self.config.batch_pause());
        let communities: Vec<Community> = partition.communities().cloned().collect();
        let outcomes = scheduler
            .run(communities, move |community| {
                let task = Arc::clone(&task);
                async move { task.process_community(community).await }
            })
            .await;

        let (mut reported, mut skipped, mut dropped) = (0, 0, 0);
        for outcome in outcomes.iter().flatten() {
            match outcome {
                CommunityOutcome::Reported => reported += 1,
                CommunityOutcome::Skipped => skipped += 1,
                CommunityOutcome::Dropped(_) => dropped += 1,
            }
        }
        report_log(
            ReportLogOption::Extraction,
            ReportLogLevel::Info,
            &format!(
                "Community reports finished: {} reported, {} skipped, {} dropped",
                reported, skipped, dropped
            ),
        );

        // every task has been joined, so nothing else holds the lock
        let aggregator = std::mem::take(&mut *aggregator.lock().await);
        progress.finished(started.elapsed(), aggregator.total_token_count());
        aggregator.into_result()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::llm::base::LLMError;

    const REPORT: &str = r#"{"title": "Ring", "summary": "S", "findings": ["A"], "rating": 4.0, "rating_explanation": "R"}"#;

    struct CannedLLM {
        response: &'static str,
        calls: AtomicUsize,
        prompts: StdMutex<Vec<String>>,
    }

    impl CannedLLM {
        fn new(response: &'static str) -> Arc<Self> {
            Arc::new(CannedLLM {
                response,
                calls: AtomicUsize::new(0),
                prompts: StdMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionLLM for CannedLLM {
        async fn chat(
            &self,
            system_prompt: &str,
            history: &[ChatMessage],
            _gen_conf: &GenerationConfig,
        ) -> Result<String, LLMError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(history, &[ChatMessage::user("Output:")]);
            self.prompts.lock().unwrap().push(system_prompt.to_string());
            Ok(self.response.to_string())
        }
    }

    fn graph() -> Arc<RwLock<KnowledgeGraph>> {
        let mut graph = KnowledgeGraph::new();
        graph.add_node("A", "alpha");
        graph.add_node("B", "beta");
        graph.add_node("C", "gamma");
        graph.add_edge("A", "B", "a meets b");
        graph.add_edge("A", "C", "a meets c");
        Arc::new(RwLock::new(graph))
    }

    fn fixed_counter(_: &str) -> usize {
        7
    }

    fn extractor(llm: Arc<CannedLLM>) -> CommunityReportsExtractor {
        let config = CommunityReportsConfig {
            time_unit: std::time::Duration::from_millis(1),
            ..CommunityReportsConfig::default()
        };
        CommunityReportsExtractor::new(llm, config)
            .with_prompt("entities:\n{entity_df}relations:\n{relation_df}limit {max_report_length}")
            .with_token_counter(fixed_counter)
    }

    #[tokio::test]
    async fn test_extract_fills_prompt_and_annotates_graph() {
        let llm = CannedLLM::new(REPORT);
        let graph = graph();
        let mut partition = Partition::new();
        partition.add_community("0", Community::new("c0", 0.5, vec!["A".to_string(), "B".to_string()]));

        let result = extractor(llm.clone())
            .extract_from_partition(graph.clone(), &partition, None)
            .await;

        assert_eq!(result.output, vec!["# Ring\n\nS\n\n## A\n\n"]);
        assert_eq!(result.structured_output[0].weight, 0.5);
        assert_eq!(result.structured_output[0].entities, vec!["A", "B"]);

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(
            prompts[0],
            "entities:\nid,entity,description\n0,A,alpha\n1,B,beta\n\
             relations:\nid,source,target,description\n0,A,B,a meets b\n\
             limit 1500"
        );

        let graph = graph.read().await;
        assert_eq!(graph.node("A").map(|n| n.rank), Some(2));
        assert_eq!(graph.node("A").map(|n| n.communities.clone()), Some(vec!["Ring".to_string()]));
        assert!(graph.node("C").map_or(false, |n| n.communities.is_empty()));
    }

    #[tokio::test]
    async fn test_placeholder_text_in_descriptions_is_not_expanded() {
        let llm = CannedLLM::new(REPORT);
        let mut graph = KnowledgeGraph::new();
        graph.add_node("A", "mentions {relation_df} literally");
        graph.add_node("B", "{max_report_length}");
        graph.add_edge("A", "B", "a meets b");
        let graph = Arc::new(RwLock::new(graph));
        let mut partition = Partition::new();
        partition.add_community("0", Community::new("c0", 1.0, vec!["A".to_string(), "B".to_string()]));

        let extractor = extractor(llm.clone());
        for _ in 0..8 {
            extractor.extract_from_partition(graph.clone(), &partition, None).await;
        }

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 8);
        assert_eq!(
            prompts[0],
            "entities:\nid,entity,description\n0,A,mentions {relation_df} literally\n1,B,{max_report_length}\n\
             relations:\nid,source,target,description\n0,A,B,a meets b\n\
             limit 1500"
        );
        assert!(prompts.iter().all(|prompt| prompt == &prompts[0]));
    }

    #[tokio::test]
    async fn test_small_and_unknown_communities_produce_nothing() {
        let llm = CannedLLM::new(REPORT);
        let mut partition = Partition::new();
        partition.add_community("0", Community::new("lonely", 1.0, vec!["A".to_string()]));
        partition.add_community("0", Community::new("ghost", 1.0, vec!["A".to_string(), "Z".to_string()]));

        let result = extractor(llm.clone())
            .extract_from_partition(graph(), &partition, None)
            .await;

        assert!(result.output.is_empty());
        assert!(result.structured_output.is_empty());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_process_community_outcomes() {
        let llm = CannedLLM::new("not json at all");
        let progress = ProgressReporter::new(None, 2);
        let task = CommunityReportTask {
            graph: graph(),
            engine: InvocationEngine::new(
                llm.clone(),
                ConcurrencyGovernor::new(1),
                RetryPolicy::from_config(&CommunityReportsConfig::default()),
            ),
            extraction_prompt: "{entity_df}".to_string(),
            max_report_length: 10,
            gen_conf: GenerationConfig {
                temperature: 0.3,
                max_tokens: None,
            },
            token_counter: fixed_counter,
            aggregator: Arc::new(Mutex::new(ReportAggregator::new())),
            progress,
        };

        let skipped = task.process_community(Community::new("s", 1.0, vec![])).await;
        assert_eq!(skipped, CommunityOutcome::Skipped);

        let dropped = task
            .process_community(Community::new("d", 1.0, vec!["A".to_string(), "B".to_string()]))
            .await;
        assert!(matches!(dropped, CommunityOutcome::Dropped(CommunityReportError::ResponseFormat(_))));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
        assert_eq!(task.aggregator.lock().await.processed_count(), 0);
    }

    #[tokio::test]
    async fn test_run_propagates_detection_failure() {
        struct FailingDetector;

        impl CommunityDetector for FailingDetector {
            fn detect(&self, _graph: &KnowledgeGraph) -> anyhow::Result<Partition> {
                Err(anyhow::anyhow!("detector unavailable"))
            }
        }

        let llm = CannedLLM::new(REPORT);
        let result = extractor(llm.clone()).run(graph(), &FailingDetector, None).await;

        assert!(result.is_err());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }
}
