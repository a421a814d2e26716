use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shinkai_community_reports::graph::knowledge_graph::KnowledgeGraph;
use shinkai_community_reports::graph::partition::{Community, Partition};
use shinkai_community_reports::llm::base::{ChatMessage, CompletionLLM, GenerationConfig, LLMError};
use tokio::time::Instant;

pub enum MockReply {
    Text(Duration, String),
    Fail(String),
    Hang,
}

type Script = dyn Fn(&str, usize) -> MockReply + Send + Sync;

/// Model stand-in driven by a script. The script sees the prompt and how many times that
/// same prompt was sent before.
pub struct MockReportLLM {
    script: Box<Script>,
    started: Instant,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    seen: Mutex<HashMap<String, usize>>,
    call_starts: Mutex<Vec<Duration>>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockReportLLM {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&str, usize) -> MockReply + Send + Sync + 'static,
    {
        Arc::new(MockReportLLM {
            script: Box::new(script),
            started: Instant::now(),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            seen: Mutex::new(HashMap::new()),
            call_starts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn call_starts(&self) -> Vec<Duration> {
        self.call_starts.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.seen.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl CompletionLLM for MockReportLLM {
    async fn chat(
        &self,
        system_prompt: &str,
        _history: &[ChatMessage],
        _gen_conf: &GenerationConfig,
    ) -> Result<String, LLMError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_starts.lock().unwrap().push(self.started.elapsed());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let previous = {
            let mut seen = self.seen.lock().unwrap();
            let count = seen.entry(system_prompt.to_string()).or_insert(0);
            *count += 1;
            *count - 1
        };

        match (self.script)(system_prompt, previous) {
            MockReply::Text(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            MockReply::Fail(message) => Err(LLMError::RequestFailed(message)),
            MockReply::Hang => std::future::pending().await,
        }
    }
}

pub fn report_json(title: &str) -> String {
    format!(
        r#"Sure, here is the report: {{"title": "{}", "summary": "Summary of {}", "findings": [{{"summary": "Key", "explanation": "Because"}}], "rating": 6.5, "rating_explanation": "Moderate"}}"#,
        title, title
    )
}

/// `count` disjoint communities of two linked entities each, `C{i}_A` and `C{i}_B`, all on
/// level "0". Community `i` has weight `i + 1`.
pub fn paired_communities(count: usize) -> (KnowledgeGraph, Partition) {
    let mut graph = KnowledgeGraph::new();
    let mut partition = Partition::new();
    for i in 0..count {
        let a = format!("C{}_A", i);
        let b = format!("C{}_B", i);
        graph.add_node(&a, &format!("first member of {}", i));
        graph.add_node(&b, &format!("second member of {}", i));
        graph.add_edge(&a, &b, "linked");
        partition.add_community("0", Community::new(&format!("c{}", i), (i + 1) as f64, vec![a, b]));
    }
    (graph, partition)
}

/// Index of the community whose entities appear in `prompt`.
pub fn community_in_prompt(prompt: &str) -> Option<usize> {
    let start = prompt.find(",C")? + 2;
    let digits: String = prompt[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
