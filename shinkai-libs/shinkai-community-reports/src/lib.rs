pub mod community_reports_errors;
pub mod community_reports_logging;
pub mod configuration;
pub mod extraction;
pub mod graph;
pub mod llm;
