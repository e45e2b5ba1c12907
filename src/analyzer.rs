use std::sync::Arc;

use tracing::warn;

use crate::interfaces::providers::LlmProvider;
use crate::interfaces::storage::ExpenseRecord;

const SYSTEM_PROMPT: &str = "You are a travel budget analysis expert.";

/// Free-text spending analysis over a plan's recorded expenses. The
/// model's answer is returned verbatim; failures degrade to an error
/// string rather than surfacing to the caller.
pub struct ExpenseAnalyzer {
    llm: Arc<dyn LlmProvider>,
}

impl ExpenseAnalyzer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    pub async fn analyze(&self, expenses: &[ExpenseRecord], budget: f64) -> String {
        let prompt = Self::build_prompt(expenses, budget);
        match self.llm.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("budget analysis failed: {e}");
                format!("budget analysis failed: {e}")
            }
        }
    }

    fn build_prompt(expenses: &[ExpenseRecord], budget: f64) -> String {
        let spent = serde_json::to_string(expenses).unwrap_or_else(|_| "[]".to_string());
        format!(
            "Analyze the following travel spending:\n\
             Budget: {budget}\n\
             Spent so far: {spent}\n\n\
             Please provide:\n\
             1. How the budget has been used\n\
             2. The share of each spending category\n\
             3. Ways to save\n\
             4. Advice for the remaining budget"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_budget_and_expenses() {
        let expenses = vec![ExpenseRecord {
            id: 1,
            plan_id: 2,
            user_id: 3,
            category: "food".to_string(),
            amount: 42.5,
            description: "ramen".to_string(),
            date: "2026-05-01".to_string(),
            created_at: 0,
        }];
        let prompt = ExpenseAnalyzer::build_prompt(&expenses, 1000.0);
        assert!(prompt.contains("Budget: 1000"));
        assert!(prompt.contains("ramen"));
    }
}
