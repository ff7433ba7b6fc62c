use std::{net::SocketAddr, sync::Arc};

use anyhow::Result as AnyResult;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use flowpay_core::{
    EventSink, LedgerStore, Milestone, NoopEventSink, Project, ProjectDraft, VerificationMethod,
};
use flowpay_custody::SandboxCustody;
use flowpay_escrow::{Activation, EscrowCoordinator, EscrowError, PartyProjects};
use flowpay_ledger::{InMemoryLedgerStore, PgLedgerStore};
use flowpay_lifecycle::Reconciliation;
use flowpay_platform::{
    DecisionRequest, DecisionResponse, HealthResponse, PaymentsResponse, RedisBus, ServiceConfig,
    SubmitMilestoneRequest, VerifyMilestoneRequest, VerifyMilestoneResponse, connect_database,
};
use flowpay_verify::{HeuristicVerifier, ManualVerifier, VerifierSet};
use tracing::{error, info, warn};
use uuid::Uuid;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

#[derive(Clone)]
struct AppState {
    coordinator: Arc<EscrowCoordinator>,
    reviewers: Arc<ManualVerifier>,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "flowpay_gateway=info,flowpay_escrow=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;

    let store: Arc<dyn LedgerStore> = match &config.database_url {
        Some(database_url) => {
            let store = PgLedgerStore::new(connect_database(database_url).await?);
            store.ensure_schema().await?;
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, ledger is in memory");
            Arc::new(InMemoryLedgerStore::default())
        }
    };

    let events: Arc<dyn EventSink> = match &config.redis_url {
        Some(redis_url) => Arc::new(RedisBus::connect(redis_url)?),
        None => Arc::new(NoopEventSink),
    };

    let custody = Arc::new(SandboxCustody::with_balances(
        config.sandbox_balances.clone(),
    ));
    let state = app_state(store, custody, events, config.escrow.clone());

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn app_state(
    store: Arc<dyn LedgerStore>,
    custody: Arc<SandboxCustody>,
    events: Arc<dyn EventSink>,
    config: flowpay_escrow::CoordinatorConfig,
) -> AppState {
    let reviewers = Arc::new(ManualVerifier::default());
    let verifiers = VerifierSet {
        ai: Arc::new(HeuristicVerifier),
        validator: reviewers.clone(),
        client: reviewers.clone(),
    };
    let coordinator = EscrowCoordinator::new(store, custody, verifiers, events, config);

    AppState {
        coordinator: Arc::new(coordinator),
        reviewers,
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/{project_id}", get(get_project))
        .route("/projects/{project_id}/activate", post(activate_project))
        .route("/projects/{project_id}/cancel", post(cancel_project))
        .route("/projects/{project_id}/payments", get(project_payments))
        .route("/projects/{project_id}/audit", get(audit_project))
        .route("/parties/{address}/projects", get(party_projects))
        .route("/milestones/{milestone_id}", get(get_milestone))
        .route("/milestones/{milestone_id}/submit", post(submit_milestone))
        .route("/milestones/{milestone_id}/review", post(begin_review))
        .route("/milestones/{milestone_id}/verify", post(verify_milestone))
        .route("/milestones/{milestone_id}/dispute", post(file_dispute))
        .route("/milestones/{milestone_id}/decision", post(record_decision))
        .with_state(state)
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "flowpay-gateway".to_string(),
    })
}

async fn create_project(
    State(state): State<AppState>,
    Json(payload): Json<ProjectDraft>,
) -> ApiResult<Project> {
    let project = state
        .coordinator
        .create_project(payload)
        .await
        .map_err(escrow_error)?;
    Ok(Json(project))
}

async fn list_projects(State(state): State<AppState>) -> ApiResult<Vec<Project>> {
    let projects = state
        .coordinator
        .list_projects()
        .await
        .map_err(escrow_error)?;
    Ok(Json(projects))
}

async fn party_projects(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<PartyProjects> {
    let projects = state
        .coordinator
        .party_projects(&address)
        .await
        .map_err(escrow_error)?;
    Ok(Json(projects))
}

async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Project> {
    let project = state
        .coordinator
        .get_project(project_id)
        .await
        .map_err(escrow_error)?;
    Ok(Json(project))
}

async fn activate_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Activation> {
    let activation = state
        .coordinator
        .activate_project(project_id)
        .await
        .map_err(escrow_error)?;
    Ok(Json(activation))
}

async fn cancel_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Project> {
    let project = state
        .coordinator
        .cancel_project(project_id)
        .await
        .map_err(escrow_error)?;
    Ok(Json(project))
}

async fn project_payments(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<PaymentsResponse> {
    let payments = state
        .coordinator
        .payments(project_id)
        .await
        .map_err(escrow_error)?;
    Ok(Json(PaymentsResponse {
        project_id,
        payments,
    }))
}

async fn audit_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Reconciliation> {
    let summary = state
        .coordinator
        .audit_project(project_id)
        .await
        .map_err(escrow_error)?;
    Ok(Json(summary))
}

async fn get_milestone(
    State(state): State<AppState>,
    Path(milestone_id): Path<Uuid>,
) -> ApiResult<Milestone> {
    let milestone = state
        .coordinator
        .milestone(milestone_id)
        .await
        .map_err(escrow_error)?;
    Ok(Json(milestone))
}

async fn submit_milestone(
    State(state): State<AppState>,
    Path(milestone_id): Path<Uuid>,
    Json(payload): Json<SubmitMilestoneRequest>,
) -> ApiResult<Milestone> {
    let milestone = state
        .coordinator
        .submit_milestone(milestone_id, payload.deliverables)
        .await
        .map_err(escrow_error)?;
    Ok(Json(milestone))
}

async fn begin_review(
    State(state): State<AppState>,
    Path(milestone_id): Path<Uuid>,
) -> ApiResult<Milestone> {
    let milestone = state
        .coordinator
        .begin_review(milestone_id)
        .await
        .map_err(escrow_error)?;
    Ok(Json(milestone))
}

async fn verify_milestone(
    State(state): State<AppState>,
    Path(milestone_id): Path<Uuid>,
    Json(payload): Json<VerifyMilestoneRequest>,
) -> ApiResult<VerifyMilestoneResponse> {
    let release = match payload.deliverables {
        Some(deliverables) => {
            state
                .coordinator
                .verify_and_release(milestone_id, deliverables)
                .await
        }
        None => state.coordinator.verify_submission(milestone_id).await,
    }
    .map_err(escrow_error)?;

    Ok(Json(release.into()))
}

async fn file_dispute(
    State(state): State<AppState>,
    Path(milestone_id): Path<Uuid>,
) -> ApiResult<Milestone> {
    let milestone = state
        .coordinator
        .file_dispute(milestone_id)
        .await
        .map_err(escrow_error)?;
    Ok(Json(milestone))
}

async fn record_decision(
    State(state): State<AppState>,
    Path(milestone_id): Path<Uuid>,
    Json(payload): Json<DecisionRequest>,
) -> ApiResult<DecisionResponse> {
    let milestone = state
        .coordinator
        .milestone(milestone_id)
        .await
        .map_err(escrow_error)?;

    if milestone.verification_method == VerificationMethod::Ai {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("milestone {milestone_id} is verified automatically"),
        ));
    }
    if milestone.status.is_terminal() {
        return Err((
            StatusCode::CONFLICT,
            format!("milestone {milestone_id} is already {}", milestone.status),
        ));
    }

    let verdict = state
        .reviewers
        .record(milestone_id, payload.approved, &payload.reasoning)
        .await;
    info!(%milestone_id, approved = verdict.approved, "reviewer decision recorded");

    Ok(Json(DecisionResponse {
        milestone_id,
        verdict,
        recorded_at: Utc::now(),
    }))
}

fn escrow_error(err: EscrowError) -> (StatusCode, String) {
    let status = match &err {
        EscrowError::Validation(_) => StatusCode::BAD_REQUEST,
        EscrowError::InvalidTransition { .. } => StatusCode::CONFLICT,
        EscrowError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
        EscrowError::Custody { .. } => StatusCode::BAD_GATEWAY,
        EscrowError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        EscrowError::ProjectNotFound(_) | EscrowError::MilestoneNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        EscrowError::LedgerInconsistency(_) | EscrowError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    if status.is_server_error() {
        error!("request failed: {err}");
    }
    (status, err.to_string())
}
