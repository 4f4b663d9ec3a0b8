//! Token counting utilities

use tiktoken_rs::CoreBPE;

/// Counts tokens the way a target model's tokenizer would
pub trait Tokenizer: Send + Sync {
    /// Number of tokens in `text`
    fn count(&self, text: &str) -> usize;
}

/// BPE tokenizer backed by `tiktoken-rs`
pub struct TiktokenTokenizer {
    bpe: CoreBPE,
}

impl TiktokenTokenizer {
    /// Tokenizer for the given model, falling back to `cl100k_base`
    /// for models tiktoken does not know
    pub fn for_model(model_name: &str) -> anyhow::Result<Self> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model_name) {
            Ok(bpe) => bpe,
            Err(_) => {
                tracing::debug!(model = model_name, "No tiktoken encoding for model, using cl100k_base");
                tiktoken_rs::cl100k_base()?
            }
        };

        Ok(Self { bpe })
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Approximate tokenizer counting one token per whitespace-separated word
#[derive(Debug, Default, Clone, Copy)]
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}
