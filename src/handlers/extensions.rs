use crate::{
    auth::AuthContext,
    entities::loan_extension::{self, ExtensionStatus},
    services::extensions::CreateExtensionInput,
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_extension))
        .route("/pending", get(pending_extensions))
        .route("/loan/:loan_id", get(extensions_for_loan))
        .route("/:id", get(get_extension))
        .route("/:id/approve", post(approve_extension))
        .route("/:id/reject", post(reject_extension))
}

// ---- DTOs ------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateExtensionPayload {
    pub loan_id: Uuid,
    pub new_return_date: NaiveDate,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct ReviewPayload {
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExtensionSummary {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub requested_by: Uuid,
    pub new_return_date: NaiveDate,
    pub reason: Option<String>,
    #[schema(value_type = String)]
    pub status: ExtensionStatus,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<loan_extension::Model> for ExtensionSummary {
    fn from(model: loan_extension::Model) -> Self {
        Self {
            id: model.id,
            loan_id: model.loan_id,
            requested_by: model.requested_by,
            new_return_date: model.new_return_date,
            reason: model.reason,
            status: model.status,
            reviewed_by: model.reviewed_by,
            reviewed_at: model.reviewed_at,
            review_notes: model.review_notes,
            created_at: model.created_at,
        }
    }
}

// ---- handlers --------------------------------------------------------------

pub async fn create_extension(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(payload): Json<CreateExtensionPayload>,
) -> ApiResult<ExtensionSummary> {
    let created = state
        .extension_service()
        .create_extension(
            &ctx,
            CreateExtensionInput {
                loan_id: payload.loan_id,
                new_return_date: payload.new_return_date,
                reason: payload.reason,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(ExtensionSummary::from(created))))
}

pub async fn pending_extensions(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> ApiResult<Vec<ExtensionSummary>> {
    let records = state.extension_service().pending(&ctx).await?;
    Ok(Json(ApiResponse::success(
        records.into_iter().map(ExtensionSummary::from).collect(),
    )))
}

pub async fn extensions_for_loan(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<Vec<ExtensionSummary>> {
    let records = state
        .extension_service()
        .list_for_loan(&ctx, loan_id)
        .await?;
    Ok(Json(ApiResponse::success(
        records.into_iter().map(ExtensionSummary::from).collect(),
    )))
}

pub async fn get_extension(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<ExtensionSummary> {
    let found = state.extension_service().get_extension(&ctx, id).await?;
    Ok(Json(ApiResponse::success(ExtensionSummary::from(found))))
}

pub async fn approve_extension(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    payload: Option<Json<ReviewPayload>>,
) -> ApiResult<ExtensionSummary> {
    let notes = payload.and_then(|Json(p)| p.notes);
    let updated = state.extension_service().approve(&ctx, id, notes).await?;
    Ok(Json(ApiResponse::success(ExtensionSummary::from(updated))))
}

pub async fn reject_extension(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    payload: Option<Json<ReviewPayload>>,
) -> ApiResult<ExtensionSummary> {
    let notes = payload.and_then(|Json(p)| p.notes);
    let updated = state.extension_service().reject(&ctx, id, notes).await?;
    Ok(Json(ApiResponse::success(ExtensionSummary::from(updated))))
}
