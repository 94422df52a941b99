use crate::{
    auth::AuthContext,
    entities::{
        category, location,
        material::{self, MaterialStatus, UnitOfMeasure},
    },
    services::materials::{
        CreateCategoryInput, CreateLocationInput, CreateMaterialInput, MaterialFilter,
        UpdateMaterialInput,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/:id",
            get(get_category).delete(delete_category),
        )
        .route("/locations", get(list_locations).post(create_location))
        .route("/locations/:id", axum::routing::delete(delete_location))
        .route("/materials", get(list_materials).post(create_material))
        .route("/materials/:id", get(get_material).put(update_material))
        .route("/materials/qr/:code", get(get_material_by_qr))
        .route("/materials/:id/consume", post(consume_material))
        .route("/materials/:id/return", post(return_material))
        .route("/materials/:id/recompute", post(recompute_availability))
}

// ---- DTOs ------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_consumable: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateLocationRequest {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: String,
    pub description: Option<String>,
    pub street: String,
    pub exterior_number: String,
    pub interior_number: Option<String>,
    pub neighborhood: String,
    pub postal_code: String,
    pub city: String,
    pub state: String,
    pub country: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateMaterialRequest {
    pub category_id: Uuid,
    pub location_id: Option<Uuid>,
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "SKU cannot be empty"))]
    pub sku: String,
    pub barcode: Option<String>,
    #[validate(range(min = 0))]
    pub quantity: i32,
    pub available_quantity: Option<i32>,
    #[schema(value_type = String)]
    pub unit_of_measure: UnitOfMeasure,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub min_stock_level: i32,
    #[serde(default)]
    pub reorder_quantity: i32,
    pub image_url: Option<String>,
    #[serde(default)]
    pub requires_facial_auth: bool,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct UpdateMaterialRequest {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub location_id: Option<Option<Uuid>>,
    pub min_stock_level: Option<i32>,
    pub reorder_quantity: Option<i32>,
    pub image_url: Option<Option<String>>,
    #[schema(value_type = Option<String>)]
    pub status: Option<MaterialStatus>,
    pub is_available_for_loan: Option<bool>,
    pub requires_facial_auth: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct StockQuantityRequest {
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

fn default_return_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReturnStockRequest {
    #[serde(default = "default_return_quantity")]
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct MaterialListQuery {
    /// Page number (1-indexed)
    pub page: Option<u64>,
    /// Page size (max 100)
    pub limit: Option<u64>,
    pub category_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    #[schema(value_type = Option<String>)]
    pub status: Option<MaterialStatus>,
    pub low_stock: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MaterialSummary {
    pub id: Uuid,
    pub category_id: Uuid,
    pub location_id: Option<Uuid>,
    pub name: String,
    pub sku: String,
    pub qr_code: String,
    pub quantity: i32,
    pub available_quantity: i32,
    pub min_stock_level: i32,
    #[schema(value_type = String)]
    pub unit_of_measure: UnitOfMeasure,
    #[schema(value_type = String)]
    pub status: MaterialStatus,
    pub is_available_for_loan: bool,
    pub requires_facial_auth: bool,
    pub is_active: bool,
    pub is_low_stock: bool,
    pub can_be_loaned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<material::Model> for MaterialSummary {
    fn from(model: material::Model) -> Self {
        let is_low_stock = model.is_low_stock();
        let can_be_loaned = model.can_be_loaned();
        Self {
            id: model.id,
            category_id: model.category_id,
            location_id: model.location_id,
            name: model.name,
            sku: model.sku,
            qr_code: model.qr_code,
            quantity: model.quantity,
            available_quantity: model.available_quantity,
            min_stock_level: model.min_stock_level,
            unit_of_measure: model.unit_of_measure,
            status: model.status,
            is_available_for_loan: model.is_available_for_loan,
            requires_facial_auth: model.requires_facial_auth,
            is_active: model.is_active,
            is_low_stock,
            can_be_loaned,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

// ---- categories ------------------------------------------------------------

pub async fn create_category(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(payload): Json<CreateCategoryRequest>,
) -> ApiResult<category::Model> {
    payload.validate()?;
    let created = state
        .material_service()
        .create_category(
            &ctx,
            CreateCategoryInput {
                name: payload.name,
                description: payload.description,
                is_consumable: payload.is_consumable,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(created)))
}

pub async fn list_categories(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> ApiResult<Vec<category::Model>> {
    let items = state.material_service().list_categories(&ctx).await?;
    Ok(Json(ApiResponse::success(items)))
}

pub async fn get_category(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<category::Model> {
    let found = state.material_service().get_category(&ctx, id).await?;
    Ok(Json(ApiResponse::success(found)))
}

pub async fn delete_category(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<serde_json::Value> {
    state.material_service().delete_category(&ctx, id).await?;
    Ok(Json(ApiResponse::success(
        serde_json::json!({ "deleted": id }),
    )))
}

// ---- locations -------------------------------------------------------------

pub async fn create_location(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(payload): Json<CreateLocationRequest>,
) -> ApiResult<location::Model> {
    payload.validate()?;
    let created = state
        .material_service()
        .create_location(
            &ctx,
            CreateLocationInput {
                name: payload.name,
                description: payload.description,
                street: payload.street,
                exterior_number: payload.exterior_number,
                interior_number: payload.interior_number,
                neighborhood: payload.neighborhood,
                postal_code: payload.postal_code,
                city: payload.city,
                state: payload.state,
                country: payload.country,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(created)))
}

pub async fn list_locations(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> ApiResult<Vec<location::Model>> {
    let items = state.material_service().list_locations(&ctx).await?;
    Ok(Json(ApiResponse::success(items)))
}

pub async fn delete_location(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<serde_json::Value> {
    state.material_service().delete_location(&ctx, id).await?;
    Ok(Json(ApiResponse::success(
        serde_json::json!({ "deleted": id }),
    )))
}

// ---- materials -------------------------------------------------------------

pub async fn create_material(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(payload): Json<CreateMaterialRequest>,
) -> ApiResult<MaterialSummary> {
    payload.validate()?;
    let created = state
        .material_service()
        .create_material(
            &ctx,
            CreateMaterialInput {
                category_id: payload.category_id,
                location_id: payload.location_id,
                name: payload.name,
                description: payload.description,
                sku: payload.sku,
                barcode: payload.barcode,
                quantity: payload.quantity,
                available_quantity: payload.available_quantity,
                unit_of_measure: payload.unit_of_measure,
                min_stock_level: payload.min_stock_level,
                reorder_quantity: payload.reorder_quantity,
                image_url: payload.image_url,
                requires_facial_auth: payload.requires_facial_auth,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(MaterialSummary::from(created))))
}

pub async fn list_materials(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<MaterialListQuery>,
) -> ApiResult<PaginatedResponse<MaterialSummary>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let filter = MaterialFilter {
        category_id: query.category_id,
        location_id: query.location_id,
        status: query.status,
        low_stock_only: query.low_stock.unwrap_or(false),
    };
    let (records, total) = state
        .material_service()
        .list_materials(&ctx, filter, page, limit)
        .await?;

    let items = records.into_iter().map(MaterialSummary::from).collect();
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}

pub async fn get_material(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<MaterialSummary> {
    let found = state.material_service().get_material(&ctx, id).await?;
    Ok(Json(ApiResponse::success(MaterialSummary::from(found))))
}

pub async fn get_material_by_qr(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(code): Path<String>,
) -> ApiResult<MaterialSummary> {
    let found = state
        .material_service()
        .get_material_by_qr(&ctx, &code)
        .await?;
    Ok(Json(ApiResponse::success(MaterialSummary::from(found))))
}

pub async fn update_material(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMaterialRequest>,
) -> ApiResult<MaterialSummary> {
    let updated = state
        .material_service()
        .update_material(
            &ctx,
            id,
            UpdateMaterialInput {
                name: payload.name,
                description: payload.description,
                location_id: payload.location_id,
                min_stock_level: payload.min_stock_level,
                reorder_quantity: payload.reorder_quantity,
                image_url: payload.image_url,
                status: payload.status,
                is_available_for_loan: payload.is_available_for_loan,
                requires_facial_auth: payload.requires_facial_auth,
                is_active: payload.is_active,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(MaterialSummary::from(updated))))
}

pub async fn consume_material(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<StockQuantityRequest>,
) -> ApiResult<MaterialSummary> {
    payload.validate()?;
    let updated = state
        .material_service()
        .consume(&ctx, id, payload.quantity)
        .await?;
    Ok(Json(ApiResponse::success(MaterialSummary::from(updated))))
}

pub async fn return_material(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReturnStockRequest>,
) -> ApiResult<MaterialSummary> {
    payload.validate()?;
    let updated = state
        .material_service()
        .return_material(&ctx, id, payload.quantity)
        .await?;
    Ok(Json(ApiResponse::success(MaterialSummary::from(updated))))
}

pub async fn recompute_availability(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<MaterialSummary> {
    let updated = state
        .material_service()
        .recompute_availability(&ctx, id)
        .await?;
    Ok(Json(ApiResponse::success(MaterialSummary::from(updated))))
}
