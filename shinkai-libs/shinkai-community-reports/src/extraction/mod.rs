pub mod aggregator;
pub mod extractor;
pub mod governor;
pub mod invocation;
pub mod prompt_tables;
pub mod prompts;
pub mod report;
pub mod response_validator;
pub mod scheduler;
