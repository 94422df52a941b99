use crate::{
    auth::AuthContext,
    entities::loan_request::{self, RequestStatus},
    services::loan_requests::{CreateLoanRequestInput, LoanRequestDetail, RequestItemInput},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_requests).post(create_request))
        .route("/pending", get(pending_requests))
        .route("/mine", get(my_requests))
        .route("/:id", get(get_request))
        .route("/:id/approve", post(approve_request))
        .route("/:id/reject", post(reject_request))
        .route("/:id/cancel", post(cancel_request))
        .route("/:id/complete", post(complete_request))
}

// ---- DTOs ------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct RequestItemPayload {
    pub material_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity_requested: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateLoanRequestPayload {
    pub desired_pickup_date: NaiveDate,
    pub desired_return_date: NaiveDate,
    pub purpose: Option<String>,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<RequestItemPayload>,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct ReviewPayload {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct RequestListQuery {
    /// Page number (1-indexed)
    pub page: Option<u64>,
    /// Page size (max 100)
    pub limit: Option<u64>,
    #[schema(value_type = Option<String>)]
    pub status: Option<RequestStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestItemSummary {
    pub id: Uuid,
    pub material_id: Uuid,
    pub quantity_requested: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoanRequestSummary {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub desired_pickup_date: NaiveDate,
    pub desired_return_date: NaiveDate,
    pub purpose: Option<String>,
    #[schema(value_type = String)]
    pub status: RequestStatus,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub items: Option<Vec<RequestItemSummary>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<loan_request::Model> for LoanRequestSummary {
    fn from(model: loan_request::Model) -> Self {
        Self {
            id: model.id,
            requester_id: model.requester_id,
            desired_pickup_date: model.desired_pickup_date,
            desired_return_date: model.desired_return_date,
            purpose: model.purpose,
            status: model.status,
            reviewed_by: model.reviewed_by,
            reviewed_at: model.reviewed_at,
            review_notes: model.review_notes,
            items: None,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<LoanRequestDetail> for LoanRequestSummary {
    fn from(detail: LoanRequestDetail) -> Self {
        let items = detail
            .items
            .into_iter()
            .map(|item| RequestItemSummary {
                id: item.id,
                material_id: item.material_id,
                quantity_requested: item.quantity_requested,
            })
            .collect();
        let mut summary = Self::from(detail.request);
        summary.items = Some(items);
        summary
    }
}

// ---- handlers --------------------------------------------------------------

pub async fn create_request(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(payload): Json<CreateLoanRequestPayload>,
) -> ApiResult<LoanRequestSummary> {
    payload.validate()?;
    let input = CreateLoanRequestInput {
        desired_pickup_date: payload.desired_pickup_date,
        desired_return_date: payload.desired_return_date,
        purpose: payload.purpose,
        items: payload
            .items
            .into_iter()
            .map(|item| RequestItemInput {
                material_id: item.material_id,
                quantity_requested: item.quantity_requested,
            })
            .collect(),
    };
    let created = state
        .loan_request_service()
        .create_request(&ctx, input)
        .await?;
    Ok(Json(ApiResponse::success(LoanRequestSummary::from(created))))
}

pub async fn list_requests(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<RequestListQuery>,
) -> ApiResult<PaginatedResponse<LoanRequestSummary>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let (records, total) = state
        .loan_request_service()
        .list_requests(&ctx, query.status, page, limit)
        .await?;

    let items = records.into_iter().map(LoanRequestSummary::from).collect();
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}

pub async fn pending_requests(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> ApiResult<Vec<LoanRequestSummary>> {
    let records = state.loan_request_service().pending(&ctx).await?;
    Ok(Json(ApiResponse::success(
        records.into_iter().map(LoanRequestSummary::from).collect(),
    )))
}

pub async fn my_requests(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> ApiResult<Vec<LoanRequestSummary>> {
    let records = state.loan_request_service().my_requests(&ctx).await?;
    Ok(Json(ApiResponse::success(
        records.into_iter().map(LoanRequestSummary::from).collect(),
    )))
}

pub async fn get_request(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<LoanRequestSummary> {
    let detail = state.loan_request_service().get_request(&ctx, id).await?;
    Ok(Json(ApiResponse::success(LoanRequestSummary::from(detail))))
}

pub async fn approve_request(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    payload: Option<Json<ReviewPayload>>,
) -> ApiResult<LoanRequestSummary> {
    let notes = payload.and_then(|Json(p)| p.notes);
    let updated = state
        .loan_request_service()
        .approve(&ctx, id, notes)
        .await?;
    Ok(Json(ApiResponse::success(LoanRequestSummary::from(updated))))
}

pub async fn reject_request(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    payload: Option<Json<ReviewPayload>>,
) -> ApiResult<LoanRequestSummary> {
    let notes = payload.and_then(|Json(p)| p.notes);
    let updated = state.loan_request_service().reject(&ctx, id, notes).await?;
    Ok(Json(ApiResponse::success(LoanRequestSummary::from(updated))))
}

pub async fn cancel_request(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<LoanRequestSummary> {
    let updated = state.loan_request_service().cancel(&ctx, id).await?;
    Ok(Json(ApiResponse::success(LoanRequestSummary::from(updated))))
}

pub async fn complete_request(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<LoanRequestSummary> {
    let updated = state.loan_request_service().complete(&ctx, id).await?;
    Ok(Json(ApiResponse::success(LoanRequestSummary::from(updated))))
}
