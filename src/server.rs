use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::analyzer::ExpenseAnalyzer;
use crate::auth;
use crate::config::{Config, MapConfig};
use crate::error::{Result, WayfarerError};
use crate::generator::PlanGenerator;
use crate::interfaces::providers::LlmProvider;
use crate::interfaces::storage::{
    NewExpense, PlanRecord, PlanSummary, StorageBackend, UserRecord,
};
use crate::voice::VoiceSigner;

const SESSION_COOKIE: &str = "wayfarer_session";
const SESSION_MAX_AGE_SECS: i64 = 7 * 24 * 60 * 60;

const INDEX_HTML: &str = include_str!("../templates/index.html");
const LOGIN_HTML: &str = include_str!("../templates/login.html");
const PLANNER_HTML: &str = include_str!("../templates/planner.html");

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageBackend>,
    pub generator: Arc<PlanGenerator>,
    pub analyzer: Arc<ExpenseAnalyzer>,
    pub voice: VoiceSigner,
    pub secret_key: String,
    pub map: MapConfig,
}

impl AppState {
    pub fn new(
        config: &Config,
        storage: Arc<dyn StorageBackend>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            storage,
            generator: Arc::new(PlanGenerator::new(llm.clone())),
            analyzer: Arc::new(ExpenseAnalyzer::new(llm)),
            voice: VoiceSigner::new(
                config.voice.app_id.clone(),
                config.voice.api_key.clone(),
                config.voice.api_secret.clone(),
            ),
            secret_key: config.secret_key.clone(),
            map: config.map.clone(),
        }
    }
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct GeneratePlanRequest {
    #[serde(default)]
    input: String,
}

#[derive(Deserialize)]
struct AddExpenseRequest {
    plan_id: i64,
    expense: NewExpense,
}

#[derive(Deserialize)]
struct AnalyzeBudgetRequest {
    plan_id: i64,
    budget: f64,
}

#[derive(Serialize)]
struct ApiMessage {
    success: bool,
    message: String,
}

#[derive(Serialize)]
struct GeneratePlanResponse {
    success: bool,
    plan: Value,
    plan_id: i64,
}

#[derive(Serialize)]
struct PlansResponse {
    success: bool,
    plans: Vec<PlanSummary>,
}

#[derive(Serialize)]
struct PlanResponse {
    success: bool,
    plan: PlanRecord,
}

#[derive(Serialize)]
struct ExpenseResponse {
    success: bool,
}

#[derive(Serialize)]
struct AnalysisResponse {
    success: bool,
    analysis: String,
}

#[derive(Serialize)]
struct MapConfigResponse {
    amap_key: String,
    amap_secret: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/login", get(login_page).post(login))
        .route("/register", post(register))
        .route("/logout", get(logout))
        .route("/planner", get(planner_page))
        .route("/api/generate-plan", post(generate_plan))
        .route("/api/my-plans", get(my_plans))
        .route("/api/plan/{id}", get(get_plan).delete(delete_plan))
        .route("/api/expense", post(add_expense))
        .route("/api/analyze-budget", post(analyze_budget))
        .route("/api/voice-config", get(voice_config))
        .route("/api/voice-signature", get(voice_signature))
        .route("/api/map-config", get(map_config))
        .with_state(state)
}

async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn login_page() -> Html<&'static str> {
    Html(LOGIN_HTML)
}

async fn planner_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match require_user(&state, &headers).await {
        Ok(_) => Html(PLANNER_HTML).into_response(),
        Err(_) => Redirect::to("/login").into_response(),
    }
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Response {
    match state
        .storage
        .authenticate(&payload.username, &payload.password)
        .await
    {
        Ok(Some(user)) => {
            let token = auth::issue_session(user.id, &state.secret_key);
            let cookie = format!(
                "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={SESSION_MAX_AGE_SECS}"
            );
            (
                [(header::SET_COOKIE, cookie)],
                Json(ApiMessage {
                    success: true,
                    message: "login successful".to_string(),
                }),
            )
                .into_response()
        }
        Ok(None) => (
            StatusCode::UNAUTHORIZED,
            Json(ApiMessage {
                success: false,
                message: "invalid username or password".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            warn!("login failed: {e}");
            internal_error("login failed")
        }
    }
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Response {
    match state
        .storage
        .create_user(&payload.username, &payload.email, &payload.password)
        .await
    {
        Ok((success, message)) => Json(ApiMessage { success, message }).into_response(),
        Err(e) => {
            warn!("registration failed: {e}");
            internal_error("registration failed")
        }
    }
}

async fn logout() -> Response {
    let cookie = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    ([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response()
}

async fn generate_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<GeneratePlanRequest>,
) -> Response {
    let user = match require_user(&state, &headers).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };

    let plan = state.generator.generate(&payload.input).await;
    let plan_value = match serde_json::to_value(&plan) {
        Ok(value) => value,
        Err(e) => {
            warn!("plan serialization failed: {e}");
            return internal_error("plan generation failed");
        }
    };

    match state.storage.save_plan(user.id, &plan_value).await {
        Ok(plan_id) => Json(GeneratePlanResponse {
            success: true,
            plan: plan_value,
            plan_id,
        })
        .into_response(),
        Err(e) => {
            warn!("plan save failed: {e}");
            internal_error("could not save the generated plan")
        }
    }
}

async fn my_plans(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = match require_user(&state, &headers).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };

    match state.storage.list_plans(user.id).await {
        Ok(plans) => Json(PlansResponse {
            success: true,
            plans,
        })
        .into_response(),
        Err(e) => {
            warn!("plan listing failed: {e}");
            internal_error("could not load plans")
        }
    }
}

async fn get_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(plan_id): Path<i64>,
) -> Response {
    let user = match require_user(&state, &headers).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };

    match state.storage.get_plan(plan_id, user.id).await {
        Ok(Some(plan)) => Json(PlanResponse {
            success: true,
            plan,
        })
        .into_response(),
        Ok(None) => not_found("plan not found"),
        Err(e) => {
            warn!(plan_id, "plan fetch failed: {e}");
            internal_error("could not load the plan")
        }
    }
}

async fn delete_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(plan_id): Path<i64>,
) -> Response {
    let user = match require_user(&state, &headers).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };

    // Ownership check doubles as the existence check; a foreign plan is
    // indistinguishable from a missing one.
    match state.storage.get_plan(plan_id, user.id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("plan not found"),
        Err(e) => {
            warn!(plan_id, "plan fetch failed: {e}");
            return internal_error("delete failed");
        }
    }

    if state.storage.delete_plan(plan_id, user.id).await {
        Json(ApiMessage {
            success: true,
            message: "plan deleted".to_string(),
        })
        .into_response()
    } else {
        internal_error("delete failed")
    }
}

async fn add_expense(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AddExpenseRequest>,
) -> Response {
    let user = match require_user(&state, &headers).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };

    let success = state
        .storage
        .add_expense(payload.plan_id, user.id, &payload.expense)
        .await;
    Json(ExpenseResponse { success }).into_response()
}

async fn analyze_budget(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AnalyzeBudgetRequest>,
) -> Response {
    let user = match require_user(&state, &headers).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };

    match state.storage.get_plan(payload.plan_id, user.id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("plan not found"),
        Err(e) => {
            warn!(plan_id = payload.plan_id, "plan fetch failed: {e}");
            return internal_error("could not load the plan");
        }
    }

    let expenses = match state.storage.list_expenses(payload.plan_id, user.id).await {
        Ok(expenses) => expenses,
        Err(e) => {
            warn!(plan_id = payload.plan_id, "expense listing failed: {e}");
            return internal_error("could not load expenses");
        }
    };

    let analysis = state.analyzer.analyze(&expenses, payload.budget).await;
    Json(AnalysisResponse {
        success: true,
        analysis,
    })
    .into_response()
}

async fn voice_config(State(state): State<AppState>) -> Response {
    Json(state.voice.client_config()).into_response()
}

async fn voice_signature(State(state): State<AppState>) -> Response {
    Json(state.voice.handshake()).into_response()
}

async fn map_config(State(state): State<AppState>) -> Response {
    Json(MapConfigResponse {
        amap_key: state.map.api_key.clone(),
        amap_secret: state.map.secret_key.clone(),
    })
    .into_response()
}

async fn require_user(
    state: &AppState,
    headers: &HeaderMap,
) -> std::result::Result<UserRecord, (StatusCode, Json<ApiMessage>)> {
    let Some(token) = session_cookie(headers) else {
        return Err(unauthorized());
    };
    let Some(user_id) = auth::verify_session(&token, &state.secret_key) else {
        return Err(unauthorized());
    };
    match state.storage.get_user_by_id(user_id).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(unauthorized()),
        Err(e) => {
            warn!(user_id, "session user lookup failed: {e}");
            Err(unauthorized())
        }
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers.get_all(header::COOKIE).iter().find_map(|value| {
        value.to_str().ok().and_then(|cookies| {
            cookies.split(';').find_map(|cookie| {
                cookie
                    .trim()
                    .strip_prefix(SESSION_COOKIE)
                    .and_then(|rest| rest.strip_prefix('='))
                    .map(str::to_string)
            })
        })
    })
}

fn unauthorized() -> (StatusCode, Json<ApiMessage>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiMessage {
            success: false,
            message: "authentication required".to_string(),
        }),
    )
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiMessage {
            success: false,
            message: message.to_string(),
        }),
    )
        .into_response()
}

fn internal_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiMessage {
            success: false,
            message: message.to_string(),
        }),
    )
        .into_response()
}

pub async fn run(host: &str, port: u16, state: AppState) -> Result<()> {
    run_with_shutdown(host, port, state, std::future::pending::<()>()).await
}

pub async fn run_with_shutdown<F>(host: &str, port: u16, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| WayfarerError::Runtime(e.to_string()))?;
    tracing::info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| WayfarerError::Runtime(e.to_string()))?;

    Ok(())
}
