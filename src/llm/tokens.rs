//! Token accounting for stored conversations
//!
//! Mirrors the OpenAI chat accounting: a fixed overhead per message plus
//! the encoded role and content, with a trailing reply priming allowance.

use crate::storage::ChatRecord;
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Tokens every reply is primed with
const REPLY_PRIMING_TOKENS: usize = 3;

/// Counts tokens for conversation records against a fixed budget
pub struct TokenCounter {
    bpe: Option<CoreBPE>,
    max_tokens: usize,
    tokens_per_message: usize,
}

impl TokenCounter {
    /// Create a counter with the given budget and per-message overhead
    #[must_use]
    pub fn new(max_tokens: usize, tokens_per_message: usize) -> Self {
        Self {
            bpe: cl100k_base().ok(),
            max_tokens,
            tokens_per_message,
        }
    }

    fn encoded_len(&self, text: &str) -> usize {
        // Rough 4-chars-per-token estimate when the encoder is unavailable.
        self.bpe
            .as_ref()
            .map_or(text.len() / 4, |bpe| {
                bpe.encode_with_special_tokens(text).len()
            })
    }

    /// Count tokens for a full record list
    #[must_use]
    pub fn count(&self, records: &[ChatRecord]) -> usize {
        let mut total = REPLY_PRIMING_TOKENS;
        for record in records {
            total += self.tokens_per_message;
            total += self.encoded_len(record.role.as_str());
            total += self.encoded_len(&record.content);
        }
        total
    }

    /// True once the count reaches the configured budget
    #[must_use]
    pub const fn over_budget(&self, token_count: usize) -> bool {
        token_count >= self.max_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history_costs_only_priming() {
        let counter = TokenCounter::new(4096, 3);
        assert_eq!(counter.count(&[]), REPLY_PRIMING_TOKENS);
    }

    #[test]
    fn test_count_grows_with_records() {
        let counter = TokenCounter::new(4096, 3);
        let one = vec![ChatRecord::user("привет, как дела?")];
        let two = vec![
            ChatRecord::user("привет, как дела?"),
            ChatRecord::assistant("Хорошо, спасибо!"),
        ];
        let count_one = counter.count(&one);
        let count_two = counter.count(&two);
        assert!(count_one > REPLY_PRIMING_TOKENS + 3);
        assert!(count_two > count_one);
    }

    #[test]
    fn test_budget_boundary_is_inclusive() {
        let counter = TokenCounter::new(10, 3);
        assert!(!counter.over_budget(9));
        assert!(counter.over_budget(10));
        assert!(counter.over_budget(11));
    }
}
