use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::auth;
use crate::error::{Result, WayfarerError};
use crate::interfaces::storage::{
    ExpenseRecord, NewExpense, PlanRecord, PlanSummary, StorageBackend, UserRecord,
};

/// Storage over a Supabase project's PostgREST surface. The table layout
/// mirrors the local SQLite schema; rows are addressed with `eq.` filters
/// so every lookup carries the owning user id.
pub struct SupabaseStore {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct CloudPlanRow {
    id: i64,
    user_id: i64,
    title: String,
    plan_data: String,
    created_at: i64,
    updated_at: i64,
}

#[derive(Deserialize)]
struct InsertedRow {
    id: i64,
}

impl SupabaseStore {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            base_url: url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    async fn select(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| WayfarerError::Http(format!("cloud store request failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WayfarerError::Http(format!("cloud store read failed: {e}")))?;
        if status != StatusCode::OK {
            return Err(WayfarerError::Http(format!(
                "cloud store query failed ({status}): {body}"
            )));
        }
        serde_json::from_str(&body).map_err(|e| WayfarerError::Serialization(e.to_string()))
    }

    async fn insert(&self, table: &str, row: &Value) -> Result<(StatusCode, String)> {
        let response = self
            .client
            .post(self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await
            .map_err(|e| WayfarerError::Http(format!("cloud store request failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WayfarerError::Http(format!("cloud store read failed: {e}")))?;
        Ok((status, body))
    }

    async fn delete(&self, table: &str, query: &[(&str, String)]) -> Result<()> {
        let response = self
            .client
            .delete(self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| WayfarerError::Http(format!("cloud store request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WayfarerError::Http(format!(
                "cloud store delete failed ({status}): {body}"
            )));
        }
        Ok(())
    }

    async fn delete_plan_inner(&self, plan_id: i64, user_id: i64) -> Result<()> {
        self.delete(
            "expenses",
            &[
                ("plan_id", format!("eq.{plan_id}")),
                ("user_id", format!("eq.{user_id}")),
            ],
        )
        .await?;
        self.delete(
            "travel_plans",
            &[
                ("id", format!("eq.{plan_id}")),
                ("user_id", format!("eq.{user_id}")),
            ],
        )
        .await
    }
}

#[async_trait]
impl StorageBackend for SupabaseStore {
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<(bool, String)> {
        let row = json!({
            "username": username,
            "email": email,
            "password_hash": auth::hash_password(password),
            "created_at": now_ts(),
        });
        let (status, body) = self.insert("users", &row).await?;
        if status.is_success() {
            return Ok((true, "account created".to_string()));
        }
        let lower = body.to_ascii_lowercase();
        if lower.contains("duplicate") || lower.contains("unique") {
            Ok((false, "username or email already taken".to_string()))
        } else {
            Ok((false, format!("registration failed: {body}")))
        }
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<Option<UserRecord>> {
        let password_hash = auth::hash_password(password);
        let rows = self
            .select(
                "users",
                &[
                    ("username", format!("eq.{username}")),
                    ("password_hash", format!("eq.{password_hash}")),
                    ("select", "*".to_string()),
                ],
            )
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| serde_json::from_value(row).ok()))
    }

    async fn get_user_by_id(&self, user_id: i64) -> Result<Option<UserRecord>> {
        let rows = self
            .select(
                "users",
                &[
                    ("id", format!("eq.{user_id}")),
                    ("select", "*".to_string()),
                ],
            )
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| serde_json::from_value(row).ok()))
    }

    async fn save_plan(&self, user_id: i64, plan: &Value) -> Result<i64> {
        let now = now_ts();
        let row = json!({
            "user_id": user_id,
            "title": super::sqlite::plan_title(plan),
            "plan_data": plan.to_string(),
            "created_at": now,
            "updated_at": now,
        });
        let (status, body) = self.insert("travel_plans", &row).await?;
        if !status.is_success() {
            return Err(WayfarerError::Http(format!(
                "cloud store insert failed ({status}): {body}"
            )));
        }
        let rows: Vec<InsertedRow> =
            serde_json::from_str(&body).map_err(|e| WayfarerError::Serialization(e.to_string()))?;
        rows.first()
            .map(|row| row.id)
            .ok_or_else(|| WayfarerError::Storage("insert returned no representation".to_string()))
    }

    async fn list_plans(&self, user_id: i64) -> Result<Vec<PlanSummary>> {
        let rows = self
            .select(
                "travel_plans",
                &[
                    ("user_id", format!("eq.{user_id}")),
                    ("select", "id,title,created_at,updated_at".to_string()),
                    ("order", "created_at.desc".to_string()),
                ],
            )
            .await?;
        serde_json::from_value(Value::Array(rows))
            .map_err(|e| WayfarerError::Serialization(e.to_string()))
    }

    async fn get_plan(&self, plan_id: i64, user_id: i64) -> Result<Option<PlanRecord>> {
        let rows = self
            .select(
                "travel_plans",
                &[
                    ("id", format!("eq.{plan_id}")),
                    ("user_id", format!("eq.{user_id}")),
                    ("select", "*".to_string()),
                ],
            )
            .await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let row: CloudPlanRow =
            serde_json::from_value(row).map_err(|e| WayfarerError::Serialization(e.to_string()))?;
        Ok(Some(PlanRecord {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            plan_data: serde_json::from_str(&row.plan_data).unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }

    async fn delete_plan(&self, plan_id: i64, user_id: i64) -> bool {
        match self.delete_plan_inner(plan_id, user_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(plan_id, user_id, "plan delete failed: {e}");
                false
            }
        }
    }

    async fn add_expense(&self, plan_id: i64, user_id: i64, expense: &NewExpense) -> bool {
        // An expense may only ever attach to a plan its user owns.
        match self.get_plan(plan_id, user_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return false,
            Err(e) => {
                warn!(plan_id, user_id, "plan ownership check failed: {e}");
                return false;
            }
        }

        let row = json!({
            "plan_id": plan_id,
            "user_id": user_id,
            "category": expense.category,
            "amount": expense.amount,
            "description": expense.description,
            "date": expense.date,
            "created_at": now_ts(),
        });
        match self.insert("expenses", &row).await {
            Ok((status, _)) if status.is_success() => true,
            Ok((status, body)) => {
                warn!(plan_id, user_id, "expense insert failed ({status}): {body}");
                false
            }
            Err(e) => {
                warn!(plan_id, user_id, "expense insert failed: {e}");
                false
            }
        }
    }

    async fn list_expenses(&self, plan_id: i64, user_id: i64) -> Result<Vec<ExpenseRecord>> {
        let rows = self
            .select(
                "expenses",
                &[
                    ("plan_id", format!("eq.{plan_id}")),
                    ("user_id", format!("eq.{user_id}")),
                    ("select", "*".to_string()),
                    ("order", "date.desc".to_string()),
                ],
            )
            .await?;
        serde_json::from_value(Value::Array(rows))
            .map_err(|e| WayfarerError::Serialization(e.to_string()))
    }
}

fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
