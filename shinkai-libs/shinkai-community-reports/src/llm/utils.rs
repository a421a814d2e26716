use lazy_static::lazy_static;
use tiktoken_rs::CoreBPE;

lazy_static! {
    static ref CL100K_BPE: Option<CoreBPE> = tiktoken_rs::cl100k_base().ok();
}

/// Counts cl100k_base tokens. Falls back to a four-characters-per-token estimate if the
/// encoder cannot be built.
pub fn num_tokens(text: &str) -> usize {
    match CL100K_BPE.as_ref() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.chars().count().div_ceil(4),
    }
}
