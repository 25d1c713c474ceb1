//! Token/cost accounting, accumulated across turns.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt: u64,
    #[serde(default)]
    pub completion: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub tokens: TokenUsage,
    #[serde(default)]
    pub cost: f64,
}

impl Usage {
    /// Fold a delta reported by one chunk/response into the running
    /// total. Fields absent on the delta leave the running total
    /// unchanged rather than zeroing it.
    pub fn accumulate(&mut self, delta: &UsageDelta) {
        if let Some(p) = delta.prompt {
            self.tokens.prompt += p;
        }
        if let Some(c) = delta.completion {
            self.tokens.completion += c;
        }
        if let Some(t) = delta.total {
            self.tokens.total += t;
        }
        if let Some(r) = delta.reasoning_tokens {
            *self.tokens.reasoning_tokens.get_or_insert(0) += r;
        }
        if let Some(c) = delta.cached_tokens {
            *self.tokens.cached_tokens.get_or_insert(0) += c;
        }
        if let Some(cost) = delta.cost {
            self.cost += cost;
        }
    }
}

/// Usage fields as reported by a single LLM chunk or response; `None`
/// means "not reported", not "zero".
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageDelta {
    pub prompt: Option<u64>,
    pub completion: Option<u64>,
    pub total: Option<u64>,
    pub reasoning_tokens: Option<u64>,
    pub cached_tokens: Option<u64>,
    pub cost: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_across_multiple_deltas() {
        let mut usage = Usage::default();
        usage.accumulate(&UsageDelta {
            prompt: Some(10),
            completion: Some(5),
            total: Some(15),
            ..Default::default()
        });
        usage.accumulate(&UsageDelta {
            prompt: Some(3),
            completion: Some(2),
            total: Some(5),
            cached_tokens: Some(1),
            ..Default::default()
        });
        assert_eq!(usage.tokens.prompt, 13);
        assert_eq!(usage.tokens.completion, 7);
        assert_eq!(usage.tokens.total, 20);
        assert_eq!(usage.tokens.cached_tokens, Some(1));
    }

    #[test]
    fn absent_fields_do_not_reset_total() {
        let mut usage = Usage::default();
        usage.accumulate(&UsageDelta {
            prompt: Some(10),
            ..Default::default()
        });
        usage.accumulate(&UsageDelta::default());
        assert_eq!(usage.tokens.prompt, 10);
    }
}
