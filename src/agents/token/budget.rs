//! Token budget checks

use super::Tokenizer;

/// Safety margin kept free for the model's answer
pub const RESERVED_TOKENS: usize = 500;

/// Budget of a model context: `max_token - reserved`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    max_token: usize,
    reserved: usize,
}

impl TokenBudget {
    /// Budget with the default reserved margin
    pub fn new(max_token: usize) -> Self {
        Self::with_reserved(max_token, RESERVED_TOKENS)
    }

    pub fn with_reserved(max_token: usize, reserved: usize) -> Self {
        Self { max_token, reserved }
    }

    /// Tokens available to the prompt
    pub fn available(&self) -> usize {
        self.max_token.saturating_sub(self.reserved)
    }

    /// Whether `tokens` fit the budget
    pub fn fits(&self, tokens: usize) -> bool {
        tokens <= self.available()
    }

    /// Whether `text`, tokenized with `tokenizer`, fits the budget
    pub fn is_within_budget(&self, tokenizer: &dyn Tokenizer, text: &str) -> bool {
        self.fits(tokenizer.count(text))
    }
}
