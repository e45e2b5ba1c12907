use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel::sqlite::SqliteConnection;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::RunQueryDsl;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use serde_json::Value;
use tracing::warn;

use crate::auth;
use crate::error::{Result, WayfarerError};
use crate::interfaces::storage::{
    ExpenseRecord, NewExpense, PlanRecord, PlanSummary, StorageBackend, UserRecord,
};

mod schema;
use schema::{expenses, travel_plans, users};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

type SqliteAsyncConn = SyncConnectionWrapper<SqliteConnection>;
type SqlitePool = Pool<SqliteAsyncConn>;
type SqlitePooledConn<'a> = PooledConnection<'a, SqliteAsyncConn>;

#[derive(Queryable)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    #[allow(dead_code)]
    password_hash: String,
    #[allow(dead_code)]
    created_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
struct NewUser<'a> {
    username: &'a str,
    email: &'a str,
    password_hash: &'a str,
    created_at: i64,
}

#[derive(Queryable)]
struct PlanRow {
    id: i64,
    user_id: i64,
    title: String,
    plan_data: String,
    created_at: i64,
    updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = travel_plans)]
struct NewPlanRow<'a> {
    user_id: i64,
    title: &'a str,
    plan_data: String,
    created_at: i64,
    updated_at: i64,
}

#[derive(Queryable)]
struct ExpenseRow {
    id: i64,
    plan_id: i64,
    user_id: i64,
    category: String,
    amount: f64,
    description: String,
    date: String,
    created_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = expenses)]
struct NewExpenseRow<'a> {
    plan_id: i64,
    user_id: i64,
    category: &'a str,
    amount: f64,
    description: &'a str,
    date: &'a str,
    created_at: i64,
}

/// SQLite-backed storage. Schema init is embedded and idempotent, so a
/// fresh database file is usable without any out-of-band setup.
pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    pub async fn new(sqlite_path: impl AsRef<str>) -> Result<Self> {
        let sqlite_path = sqlite_path.as_ref();
        ensure_parent_dir(sqlite_path)?;
        run_migrations(sqlite_path).await?;

        let manager = AsyncDieselConnectionManager::<SqliteAsyncConn>::new(sqlite_path);
        let pool: SqlitePool = Pool::builder()
            .build(manager)
            .await
            .map_err(|e| WayfarerError::Storage(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<SqlitePooledConn<'_>> {
        self.pool
            .get()
            .await
            .map_err(|e| WayfarerError::Storage(e.to_string()))
    }

    async fn delete_plan_inner(&self, plan_id: i64, user_id: i64) -> Result<bool> {
        let mut conn = self.conn().await?;
        diesel::delete(
            expenses::table
                .filter(expenses::plan_id.eq(plan_id))
                .filter(expenses::user_id.eq(user_id)),
        )
        .execute(&mut conn)
        .await
        .map_err(|e| WayfarerError::Storage(e.to_string()))?;

        let deleted = diesel::delete(
            travel_plans::table
                .filter(travel_plans::id.eq(plan_id))
                .filter(travel_plans::user_id.eq(user_id)),
        )
        .execute(&mut conn)
        .await
        .map_err(|e| WayfarerError::Storage(e.to_string()))?;
        Ok(deleted > 0)
    }

    async fn add_expense_inner(
        &self,
        plan_id: i64,
        user_id: i64,
        expense: &NewExpense,
    ) -> Result<bool> {
        let mut conn = self.conn().await?;

        // An expense may only ever attach to a plan its user owns.
        let owned: Option<i64> = travel_plans::table
            .filter(travel_plans::id.eq(plan_id))
            .filter(travel_plans::user_id.eq(user_id))
            .select(travel_plans::id)
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| WayfarerError::Storage(e.to_string()))?;
        if owned.is_none() {
            return Ok(false);
        }

        let new = NewExpenseRow {
            plan_id,
            user_id,
            category: &expense.category,
            amount: expense.amount,
            description: &expense.description,
            date: &expense.date,
            created_at: now_ts(),
        };
        diesel::insert_into(expenses::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| WayfarerError::Storage(e.to_string()))?;
        Ok(true)
    }
}

#[async_trait]
impl StorageBackend for LocalStore {
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<(bool, String)> {
        let password_hash = auth::hash_password(password);
        let new = NewUser {
            username,
            email,
            password_hash: &password_hash,
            created_at: now_ts(),
        };
        let mut conn = self.conn().await?;
        let inserted = diesel::insert_into(users::table)
            .values(&new)
            .execute(&mut conn)
            .await;

        match inserted {
            Ok(_) => Ok((true, "account created".to_string())),
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Ok((false, "username or email already taken".to_string()))
            }
            Err(e) => Ok((false, format!("registration failed: {e}"))),
        }
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<Option<UserRecord>> {
        let password_hash = auth::hash_password(password);
        let mut conn = self.conn().await?;
        let row: Option<UserRow> = users::table
            .filter(users::username.eq(username))
            .filter(users::password_hash.eq(&password_hash))
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| WayfarerError::Storage(e.to_string()))?;
        Ok(row.map(map_user))
    }

    async fn get_user_by_id(&self, user_id: i64) -> Result<Option<UserRecord>> {
        let mut conn = self.conn().await?;
        let row: Option<UserRow> = users::table
            .filter(users::id.eq(user_id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| WayfarerError::Storage(e.to_string()))?;
        Ok(row.map(map_user))
    }

    async fn save_plan(&self, user_id: i64, plan: &Value) -> Result<i64> {
        let now = now_ts();
        let new = NewPlanRow {
            user_id,
            title: plan_title(plan),
            plan_data: plan.to_string(),
            created_at: now,
            updated_at: now,
        };
        let mut conn = self.conn().await?;
        diesel::insert_into(travel_plans::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| WayfarerError::Storage(e.to_string()))?;

        let plan_id: i64 = travel_plans::table
            .filter(travel_plans::user_id.eq(user_id))
            .order(travel_plans::id.desc())
            .select(travel_plans::id)
            .first(&mut conn)
            .await
            .map_err(|e| WayfarerError::Storage(e.to_string()))?;
        Ok(plan_id)
    }

    async fn list_plans(&self, user_id: i64) -> Result<Vec<PlanSummary>> {
        let mut conn = self.conn().await?;
        let rows: Vec<(i64, String, i64, i64)> = travel_plans::table
            .filter(travel_plans::user_id.eq(user_id))
            .order(travel_plans::created_at.desc())
            .select((
                travel_plans::id,
                travel_plans::title,
                travel_plans::created_at,
                travel_plans::updated_at,
            ))
            .load(&mut conn)
            .await
            .map_err(|e| WayfarerError::Storage(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|(id, title, created_at, updated_at)| PlanSummary {
                id,
                title,
                created_at,
                updated_at,
            })
            .collect())
    }

    async fn get_plan(&self, plan_id: i64, user_id: i64) -> Result<Option<PlanRecord>> {
        let mut conn = self.conn().await?;
        let row: Option<PlanRow> = travel_plans::table
            .filter(travel_plans::id.eq(plan_id))
            .filter(travel_plans::user_id.eq(user_id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| WayfarerError::Storage(e.to_string()))?;
        Ok(row.map(map_plan))
    }

    async fn delete_plan(&self, plan_id: i64, user_id: i64) -> bool {
        match self.delete_plan_inner(plan_id, user_id).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(plan_id, user_id, "plan delete failed: {e}");
                false
            }
        }
    }

    async fn add_expense(&self, plan_id: i64, user_id: i64, expense: &NewExpense) -> bool {
        match self.add_expense_inner(plan_id, user_id, expense).await {
            Ok(inserted) => inserted,
            Err(e) => {
                warn!(plan_id, user_id, "expense insert failed: {e}");
                false
            }
        }
    }

    async fn list_expenses(&self, plan_id: i64, user_id: i64) -> Result<Vec<ExpenseRecord>> {
        let mut conn = self.conn().await?;
        let rows: Vec<ExpenseRow> = expenses::table
            .filter(expenses::plan_id.eq(plan_id))
            .filter(expenses::user_id.eq(user_id))
            .order(expenses::date.desc())
            .load(&mut conn)
            .await
            .map_err(|e| WayfarerError::Storage(e.to_string()))?;
        Ok(rows.into_iter().map(map_expense).collect())
    }
}

pub(crate) fn plan_title(plan: &Value) -> &str {
    plan.get("destination")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or("untitled plan")
}

fn map_user(row: UserRow) -> UserRecord {
    UserRecord {
        id: row.id,
        username: row.username,
        email: row.email,
    }
}

fn map_plan(row: PlanRow) -> PlanRecord {
    PlanRecord {
        id: row.id,
        user_id: row.user_id,
        title: row.title,
        plan_data: serde_json::from_str(&row.plan_data).unwrap_or_default(),
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn map_expense(row: ExpenseRow) -> ExpenseRecord {
    ExpenseRecord {
        id: row.id,
        plan_id: row.plan_id,
        user_id: row.user_id,
        category: row.category,
        amount: row.amount,
        description: row.description,
        date: row.date,
        created_at: row.created_at,
    }
}

fn ensure_parent_dir(path: &str) -> Result<()> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| WayfarerError::Storage(e.to_string()))?;
    }
    Ok(())
}

async fn run_migrations(database_url: &str) -> Result<()> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = SqliteConnection::establish(&database_url)
            .map_err(|e| WayfarerError::Storage(e.to_string()))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| WayfarerError::Storage(e.to_string()))?;
        Ok::<_, WayfarerError>(())
    })
    .await
    .map_err(|e| WayfarerError::Runtime(e.to_string()))??;
    Ok(())
}

fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
