//! Token counting and budget checks

mod budget;
mod counter;

pub use budget::{TokenBudget, RESERVED_TOKENS};
pub use counter::{TiktokenTokenizer, Tokenizer, WordTokenizer};
