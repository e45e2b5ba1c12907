use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    pub id: i64,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRecord {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub plan_data: Value,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExpense {
    pub category: String,
    pub amount: f64,
    #[serde(default)]
    pub description: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub id: i64,
    pub plan_id: i64,
    pub user_id: i64,
    pub category: String,
    pub amount: f64,
    #[serde(default)]
    pub description: String,
    pub date: String,
    pub created_at: i64,
}

/// Persistence contract shared by the local and cloud backends.
///
/// Every plan/expense lookup filters on the owning user id together with
/// the row id, so a foreign row is indistinguishable from a missing one.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Returns `(false, message)` on a username/email collision instead of
    /// erroring; the message must indicate the duplicate.
    async fn create_user(&self, username: &str, email: &str, password: &str)
        -> Result<(bool, String)>;

    async fn authenticate(&self, username: &str, password: &str) -> Result<Option<UserRecord>>;

    async fn get_user_by_id(&self, user_id: i64) -> Result<Option<UserRecord>>;

    /// Derives the title from the plan's `destination` field
    /// ("untitled plan" when absent) and returns the generated id.
    async fn save_plan(&self, user_id: i64, plan: &Value) -> Result<i64>;

    /// Summaries ordered by `created_at` descending.
    async fn list_plans(&self, user_id: i64) -> Result<Vec<PlanSummary>>;

    async fn get_plan(&self, plan_id: i64, user_id: i64) -> Result<Option<PlanRecord>>;

    /// Removes the plan's expenses first, then the plan row. Failures are
    /// logged and reported as `false`, never raised.
    async fn delete_plan(&self, plan_id: i64, user_id: i64) -> bool;

    async fn add_expense(&self, plan_id: i64, user_id: i64, expense: &NewExpense) -> bool;

    /// Expense rows for a plan, newest date first.
    async fn list_expenses(&self, plan_id: i64, user_id: i64) -> Result<Vec<ExpenseRecord>>;
}
