pub mod base;
pub mod openai;
pub mod utils;
