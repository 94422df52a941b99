use crate::{
    auth::AuthContext,
    entities::loan::{self, ConditionRating, LoanStatus},
    services::loans::{IssueLoanInput, ReturnLoanInput},
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
        .route("/", get(list_loans).post(issue_loan))
        .route("/active", get(active_loans))
        .route("/overdue", get(overdue_loans))
        .route("/mine", get(my_loans))
        .route("/sweep-overdue", post(sweep_overdue))
        .route("/:id", get(get_loan))
        .route("/:id/return", post(return_loan))
        .route("/:id/lost", post(mark_lost))
        .route("/:id/facial-auth", post(verify_facial_auth))
}

// ---- DTOs ------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct IssueLoanPayload {
    pub borrower_id: Uuid,
    pub material_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub loan_request_id: Option<Uuid>,
    pub expected_return_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>)]
    pub condition_on_pickup: Option<ConditionRating>,
    pub pickup_signature: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReturnLoanPayload {
    #[schema(value_type = String)]
    pub condition_on_return: ConditionRating,
    pub damage_notes: Option<String>,
    pub return_signature: Option<String>,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct MarkLostPayload {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct LoanListQuery {
    /// Page number (1-indexed)
    pub page: Option<u64>,
    /// Page size (max 100)
    pub limit: Option<u64>,
    #[schema(value_type = Option<String>)]
    pub status: Option<LoanStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoanSummary {
    pub id: Uuid,
    pub loan_request_id: Option<Uuid>,
    pub borrower_id: Uuid,
    pub issued_by: Uuid,
    pub returned_to: Option<Uuid>,
    pub material_id: Uuid,
    pub quantity_loaned: i32,
    pub quantity_returned: i32,
    pub is_consumable_loan: bool,
    pub issued_at: DateTime<Utc>,
    pub expected_return_date: Option<NaiveDate>,
    pub actual_return_date: Option<DateTime<Utc>>,
    pub facial_auth_verified: bool,
    #[schema(value_type = String)]
    pub condition_on_pickup: ConditionRating,
    #[schema(value_type = Option<String>)]
    pub condition_on_return: Option<ConditionRating>,
    pub damage_notes: Option<String>,
    #[schema(value_type = String)]
    pub status: LoanStatus,
    pub is_overdue: bool,
    pub days_until_return: i64,
}

impl From<loan::Model> for LoanSummary {
    fn from(model: loan::Model) -> Self {
        let today = Utc::now().date_naive();
        let is_overdue = model.status == LoanStatus::Overdue || model.is_overdue(today);
        let days_until_return = model.days_until_return(today);
        Self {
            id: model.id,
            loan_request_id: model.loan_request_id,
            borrower_id: model.borrower_id,
            issued_by: model.issued_by,
            returned_to: model.returned_to,
            material_id: model.material_id,
            quantity_loaned: model.quantity_loaned,
            quantity_returned: model.quantity_returned,
            is_consumable_loan: model.is_consumable_loan,
            issued_at: model.issued_at,
            expected_return_date: model.expected_return_date,
            actual_return_date: model.actual_return_date,
            facial_auth_verified: model.facial_auth_verified,
            condition_on_pickup: model.condition_on_pickup,
            condition_on_return: model.condition_on_return,
            damage_notes: model.damage_notes,
            status: model.status,
            is_overdue,
            days_until_return,
        }
    }
}

// ---- handlers --------------------------------------------------------------

pub async fn issue_loan(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(payload): Json<IssueLoanPayload>,
) -> ApiResult<LoanSummary> {
    payload.validate()?;
    let input = IssueLoanInput {
        borrower_id: payload.borrower_id,
        material_id: payload.material_id,
        quantity: payload.quantity,
        loan_request_id: payload.loan_request_id,
        expected_return_date: payload.expected_return_date,
        condition_on_pickup: payload.condition_on_pickup.unwrap_or(ConditionRating::Good),
        pickup_signature: payload.pickup_signature,
    };
    let created = state.loan_service().issue_loan(&ctx, input).await?;
    Ok(Json(ApiResponse::success(LoanSummary::from(created))))
}

pub async fn list_loans(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<LoanListQuery>,
) -> ApiResult<PaginatedResponse<LoanSummary>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let (records, total) = state
        .loan_service()
        .list_loans(&ctx, query.status, page, limit)
        .await?;

    let items = records.into_iter().map(LoanSummary::from).collect();
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}

pub async fn active_loans(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> ApiResult<Vec<LoanSummary>> {
    let records = state.loan_service().active_loans(&ctx).await?;
    Ok(Json(ApiResponse::success(
        records.into_iter().map(LoanSummary::from).collect(),
    )))
}

pub async fn overdue_loans(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> ApiResult<Vec<LoanSummary>> {
    let today = Utc::now().date_naive();
    let records = state.loan_service().overdue_loans(&ctx, today).await?;
    Ok(Json(ApiResponse::success(
        records.into_iter().map(LoanSummary::from).collect(),
    )))
}

pub async fn my_loans(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> ApiResult<Vec<LoanSummary>> {
    let records = state.loan_service().my_loans(&ctx).await?;
    Ok(Json(ApiResponse::success(
        records.into_iter().map(LoanSummary::from).collect(),
    )))
}

pub async fn get_loan(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<LoanSummary> {
    let found = state.loan_service().get_loan(&ctx, id).await?;
    Ok(Json(ApiResponse::success(LoanSummary::from(found))))
}

pub async fn return_loan(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReturnLoanPayload>,
) -> ApiResult<LoanSummary> {
    let input = ReturnLoanInput {
        condition_on_return: payload.condition_on_return,
        damage_notes: payload.damage_notes,
        return_signature: payload.return_signature,
    };
    let updated = state.loan_service().return_loan(&ctx, id, input).await?;
    Ok(Json(ApiResponse::success(LoanSummary::from(updated))))
}

pub async fn mark_lost(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    payload: Option<Json<MarkLostPayload>>,
) -> ApiResult<LoanSummary> {
    let notes = payload.and_then(|Json(p)| p.notes);
    let updated = state.loan_service().mark_lost(&ctx, id, notes).await?;
    Ok(Json(ApiResponse::success(LoanSummary::from(updated))))
}

pub async fn verify_facial_auth(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<LoanSummary> {
    let updated = state.loan_service().verify_facial_auth(&ctx, id).await?;
    Ok(Json(ApiResponse::success(LoanSummary::from(updated))))
}

/// Manual trigger for the reconciliation sweep that normally runs on a timer.
pub async fn sweep_overdue(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> ApiResult<serde_json::Value> {
    ctx.require_manager()?;
    let today = Utc::now().date_naive();
    let flipped = state.loan_service().sweep_overdue(today).await?;
    Ok(Json(ApiResponse::success(
        serde_json::json!({ "flipped": flipped }),
    )))
}
