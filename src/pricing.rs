//! Per-model pricing used to cost completed invocations.

/// Unit prices in USD per 1000 tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceInfo {
    pub prompt_price_per_1k: f64,
    pub completion_price_per_1k: f64,
    pub currency: &'static str,
}

/// Look up unit prices for a model. Unknown models fall back to a flat
/// default rate.
#[must_use]
pub fn price_info(model: &str) -> PriceInfo {
    let (prompt, completion) = match model {
        "gpt4-128k" => (0.01, 0.03),
        "qwen-plus" => (0.008, 0.02),
        "qwen-turbo" => (0.003, 0.008),
        "deepseek-v3" | "deepseek-coder" => (0.0014, 0.0028),
        "doubao-pro" => (0.005, 0.015),
        "doubao-lite" => (0.0007, 0.001),
        _ => (0.01, 0.01),
    };
    PriceInfo {
        prompt_price_per_1k: prompt,
        completion_price_per_1k: completion,
        currency: "USD",
    }
}

/// Cost of `tokens` at `price_per_1k`.
#[must_use]
pub fn token_cost(tokens: u64, price_per_1k: f64) -> f64 {
    tokens as f64 * price_per_1k / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_model_prices() {
        let info = price_info("qwen-plus");
        assert_eq!(info.prompt_price_per_1k, 0.008);
        assert_eq!(info.completion_price_per_1k, 0.02);
        assert_eq!(info.currency, "USD");
    }

    #[test]
    fn test_unknown_model_uses_default() {
        let info = price_info("experimental-model");
        assert_eq!(info.prompt_price_per_1k, 0.01);
        assert_eq!(info.completion_price_per_1k, 0.01);
    }

    #[test]
    fn test_token_cost() {
        assert!((token_cost(2000, 0.01) - 0.02).abs() < 1e-12);
        assert_eq!(token_cost(0, 0.03), 0.0);
    }
}
