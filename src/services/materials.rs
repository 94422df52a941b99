//! Material inventory ledger: owns `quantity`, `available_quantity` and
//! `status` for each material, plus category/location lookups with their
//! referential rules.

use crate::{
    auth::AuthContext,
    db::DbPool,
    entities::{
        category, loan,
        material::{self, MaterialStatus, UnitOfMeasure},
        location,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::txn_err,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CreateCategoryInput {
    pub name: String,
    pub description: Option<String>,
    pub is_consumable: bool,
}

#[derive(Debug, Clone)]
pub struct CreateLocationInput {
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

#[derive(Debug, Clone)]
pub struct CreateMaterialInput {
    pub category_id: Uuid,
    pub location_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub sku: String,
    pub barcode: Option<String>,
    pub quantity: i32,
    pub available_quantity: Option<i32>,
    pub unit_of_measure: UnitOfMeasure,
    pub min_stock_level: i32,
    pub reorder_quantity: i32,
    pub image_url: Option<String>,
    pub requires_facial_auth: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateMaterialInput {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub location_id: Option<Option<Uuid>>,
    pub min_stock_level: Option<i32>,
    pub reorder_quantity: Option<i32>,
    pub image_url: Option<Option<String>>,
    pub status: Option<MaterialStatus>,
    pub is_available_for_loan: Option<bool>,
    pub requires_facial_auth: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct MaterialFilter {
    pub category_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub status: Option<MaterialStatus>,
    pub low_stock_only: bool,
}

#[derive(Clone)]
pub struct MaterialService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl MaterialService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    // ---- categories -------------------------------------------------------

    #[instrument(skip(self, input))]
    pub async fn create_category(
        &self,
        ctx: &AuthContext,
        input: CreateCategoryInput,
    ) -> Result<category::Model, ServiceError> {
        ctx.require_manager()?;
        if input.name.trim().is_empty() {
            return Err(ServiceError::Validation("name cannot be empty".into()));
        }

        let existing = category::Entity::find()
            .filter(category::Column::AccountId.eq(ctx.account_id))
            .filter(category::Column::Name.eq(input.name.trim()))
            .one(self.db.as_ref())
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Category '{}' already exists",
                input.name.trim()
            )));
        }

        let now = Utc::now();
        let model = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(ctx.account_id),
            name: Set(input.name.trim().to_string()),
            description: Set(input.description),
            is_consumable: Set(input.is_consumable),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(model.insert(self.db.as_ref()).await?)
    }

    pub async fn get_category(
        &self,
        ctx: &AuthContext,
        category_id: Uuid,
    ) -> Result<category::Model, ServiceError> {
        category::Entity::find_by_id(category_id)
            .filter(category::Column::AccountId.eq(ctx.account_id))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", category_id)))
    }

    pub async fn list_categories(
        &self,
        ctx: &AuthContext,
    ) -> Result<Vec<category::Model>, ServiceError> {
        Ok(category::Entity::find()
            .filter(category::Column::AccountId.eq(ctx.account_id))
            .order_by_asc(category::Column::Name)
            .all(self.db.as_ref())
            .await?)
    }

    /// Delete a category. Blocked (restrict) while materials reference it.
    #[instrument(skip(self))]
    pub async fn delete_category(
        &self,
        ctx: &AuthContext,
        category_id: Uuid,
    ) -> Result<(), ServiceError> {
        ctx.require_manager()?;
        let cat = self.get_category(ctx, category_id).await?;

        let referencing = material::Entity::find()
            .filter(material::Column::CategoryId.eq(category_id))
            .count(self.db.as_ref())
            .await?;
        if referencing > 0 {
            return Err(ServiceError::Conflict(format!(
                "Category '{}' is referenced by {} material(s)",
                cat.name, referencing
            )));
        }

        category::Entity::delete_by_id(cat.id)
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    // ---- locations --------------------------------------------------------

    #[instrument(skip(self, input))]
    pub async fn create_location(
        &self,
        ctx: &AuthContext,
        input: CreateLocationInput,
    ) -> Result<location::Model, ServiceError> {
        ctx.require_manager()?;
        if input.name.trim().is_empty() {
            return Err(ServiceError::Validation("name cannot be empty".into()));
        }

        let now = Utc::now();
        let model = location::ActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(ctx.account_id),
            name: Set(input.name.trim().to_string()),
            description: Set(input.description),
            street: Set(input.street),
            exterior_number: Set(input.exterior_number),
            interior_number: Set(input.interior_number),
            neighborhood: Set(input.neighborhood),
            postal_code: Set(input.postal_code),
            city: Set(input.city),
            state: Set(input.state),
            country: Set(input.country),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(model.insert(self.db.as_ref()).await?)
    }

    pub async fn list_locations(
        &self,
        ctx: &AuthContext,
    ) -> Result<Vec<location::Model>, ServiceError> {
        Ok(location::Entity::find()
            .filter(location::Column::AccountId.eq(ctx.account_id))
            .order_by_asc(location::Column::Name)
            .all(self.db.as_ref())
            .await?)
    }

    /// Delete a location, nulling out the location of materials stored there.
    #[instrument(skip(self))]
    pub async fn delete_location(
        &self,
        ctx: &AuthContext,
        location_id: Uuid,
    ) -> Result<(), ServiceError> {
        ctx.require_manager()?;
        let account_id = ctx.account_id;

        let loc = location::Entity::find_by_id(location_id)
            .filter(location::Column::AccountId.eq(account_id))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Location {} not found", location_id)))?;

        self.db
            .transaction::<_, (), ServiceError>(move |txn| {
                Box::pin(async move {
                    material::Entity::update_many()
                        .col_expr(material::Column::LocationId, sea_orm::sea_query::Expr::value(Option::<Uuid>::None))
                        .filter(material::Column::LocationId.eq(loc.id))
                        .exec(txn)
                        .await?;
                    location::Entity::delete_by_id(loc.id).exec(txn).await?;
                    Ok(())
                })
            })
            .await
            .map_err(txn_err)
    }

    // ---- materials --------------------------------------------------------

    /// Create a material. The QR token is assigned here, exactly once for the
    /// lifetime of the record.
    #[instrument(skip(self, input))]
    pub async fn create_material(
        &self,
        ctx: &AuthContext,
        input: CreateMaterialInput,
    ) -> Result<material::Model, ServiceError> {
        ctx.require_manager()?;

        if input.name.trim().is_empty() {
            return Err(ServiceError::Validation("name cannot be empty".into()));
        }
        if input.quantity < 0 {
            return Err(ServiceError::Validation("quantity must be >= 0".into()));
        }
        let available = input.available_quantity.unwrap_or(input.quantity);
        if available < 0 || available > input.quantity {
            return Err(ServiceError::Validation(
                "available_quantity must be between 0 and quantity".into(),
            ));
        }

        // Category must exist in this account (restrict semantics).
        let _ = self.get_category(ctx, input.category_id).await?;
        if let Some(location_id) = input.location_id {
            let found = location::Entity::find_by_id(location_id)
                .filter(location::Column::AccountId.eq(ctx.account_id))
                .one(self.db.as_ref())
                .await?;
            if found.is_none() {
                return Err(ServiceError::NotFound(format!(
                    "Location {} not found",
                    location_id
                )));
            }
        }

        let now = Utc::now();
        let material_id = Uuid::new_v4();
        let model = material::ActiveModel {
            id: Set(material_id),
            account_id: Set(ctx.account_id),
            category_id: Set(input.category_id),
            location_id: Set(input.location_id),
            name: Set(input.name.trim().to_string()),
            description: Set(input.description),
            sku: Set(input.sku),
            barcode: Set(input.barcode),
            qr_code: Set(generate_qr_code()),
            quantity: Set(input.quantity),
            available_quantity: Set(available),
            unit_of_measure: Set(input.unit_of_measure),
            min_stock_level: Set(input.min_stock_level),
            reorder_quantity: Set(input.reorder_quantity),
            image_url: Set(input.image_url),
            status: Set(MaterialStatus::Available),
            is_available_for_loan: Set(true),
            requires_facial_auth: Set(input.requires_facial_auth),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let created = model.insert(self.db.as_ref()).await?;

        self.event_sender
            .send_or_log(Event::MaterialCreated {
                account_id: ctx.account_id,
                actor_id: ctx.user_id,
                material_id,
            })
            .await;

        info!(material_id = %material_id, sku = %created.sku, "Created material");
        Ok(created)
    }

    pub async fn get_material(
        &self,
        ctx: &AuthContext,
        material_id: Uuid,
    ) -> Result<material::Model, ServiceError> {
        material::Entity::find_by_id(material_id)
            .filter(material::Column::AccountId.eq(ctx.account_id))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Material {} not found", material_id)))
    }

    /// Lookup by the QR token printed on the item's label.
    pub async fn get_material_by_qr(
        &self,
        ctx: &AuthContext,
        qr_code: &str,
    ) -> Result<material::Model, ServiceError> {
        material::Entity::find()
            .filter(material::Column::AccountId.eq(ctx.account_id))
            .filter(material::Column::QrCode.eq(qr_code))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Material with code {} not found", qr_code)))
    }

    pub async fn list_materials(
        &self,
        ctx: &AuthContext,
        filter: MaterialFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<material::Model>, u64), ServiceError> {
        let mut query = material::Entity::find()
            .filter(material::Column::AccountId.eq(ctx.account_id));

        if let Some(category_id) = filter.category_id {
            query = query.filter(material::Column::CategoryId.eq(category_id));
        }
        if let Some(location_id) = filter.location_id {
            query = query.filter(material::Column::LocationId.eq(location_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(material::Column::Status.eq(status));
        }
        if filter.low_stock_only {
            query = query.filter(
                sea_orm::sea_query::Expr::col(material::Column::AvailableQuantity)
                    .lte(sea_orm::sea_query::Expr::col(material::Column::MinStockLevel)),
            );
        }

        let paginator = query
            .order_by_asc(material::Column::Name)
            .paginate(self.db.as_ref(), limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    /// Update mutable material fields. The QR token is never touched; blocked
    /// statuses force availability to zero.
    #[instrument(skip(self, input))]
    pub async fn update_material(
        &self,
        ctx: &AuthContext,
        material_id: Uuid,
        input: UpdateMaterialInput,
    ) -> Result<material::Model, ServiceError> {
        ctx.require_manager()?;
        let existing = self.get_material(ctx, material_id).await?;

        let mut active: material::ActiveModel = existing.into();
        if let Some(name) = input.name {
            if name.trim().is_empty() {
                return Err(ServiceError::Validation("name cannot be empty".into()));
            }
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(location_id) = input.location_id {
            active.location_id = Set(location_id);
        }
        if let Some(min_stock_level) = input.min_stock_level {
            if min_stock_level < 0 {
                return Err(ServiceError::Validation("min_stock_level must be >= 0".into()));
            }
            active.min_stock_level = Set(min_stock_level);
        }
        if let Some(reorder_quantity) = input.reorder_quantity {
            active.reorder_quantity = Set(reorder_quantity);
        }
        if let Some(image_url) = input.image_url {
            active.image_url = Set(image_url);
        }
        if let Some(status) = input.status {
            active.status = Set(status);
            if status.zeroes_availability() {
                active.available_quantity = Set(0);
                active.is_available_for_loan = Set(false);
            }
        }
        if let Some(flag) = input.is_available_for_loan {
            active.is_available_for_loan = Set(flag);
        }
        if let Some(flag) = input.requires_facial_auth {
            active.requires_facial_auth = Set(flag);
        }
        if let Some(flag) = input.is_active {
            active.is_active = Set(flag);
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Permanently draw down consumable stock. Both counters decrement
    /// together; hitting zero retires the material.
    #[instrument(skip(self))]
    pub async fn consume(
        &self,
        ctx: &AuthContext,
        material_id: Uuid,
        quantity: i32,
    ) -> Result<material::Model, ServiceError> {
        ctx.require_manager()?;
        if quantity < 1 {
            return Err(ServiceError::Validation("quantity must be >= 1".into()));
        }
        let account_id = ctx.account_id;

        let updated = self
            .db
            .transaction::<_, material::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let mat = find_material_for_update(txn, account_id, material_id).await?;
                    let cat = load_category(txn, account_id, mat.category_id).await?;
                    if !cat.is_consumable {
                        return Err(ServiceError::NotConsumable(mat.name));
                    }
                    consume_in_txn(txn, mat, quantity).await
                })
            })
            .await
            .map_err(txn_err)?;

        self.event_sender
            .send_or_log(Event::MaterialConsumed {
                account_id,
                actor_id: ctx.user_id,
                material_id,
                quantity,
                remaining: updated.available_quantity,
            })
            .await;

        info!(material_id = %material_id, quantity, remaining = updated.available_quantity, "Consumed stock");
        Ok(updated)
    }

    /// Restore non-consumable stock, capped at the total owned quantity.
    #[instrument(skip(self))]
    pub async fn return_material(
        &self,
        ctx: &AuthContext,
        material_id: Uuid,
        quantity: i32,
    ) -> Result<material::Model, ServiceError> {
        ctx.require_manager()?;
        if quantity < 1 {
            return Err(ServiceError::Validation("quantity must be >= 1".into()));
        }
        let account_id = ctx.account_id;

        let updated = self
            .db
            .transaction::<_, material::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let mat = find_material_for_update(txn, account_id, material_id).await?;
                    let cat = load_category(txn, account_id, mat.category_id).await?;
                    if cat.is_consumable {
                        return Err(ServiceError::ConsumableNotReturnable(mat.name));
                    }
                    return_in_txn(txn, mat, quantity).await
                })
            })
            .await
            .map_err(txn_err)?;

        self.event_sender
            .send_or_log(Event::StockReturned {
                account_id,
                actor_id: ctx.user_id,
                material_id,
                quantity,
                available: updated.available_quantity,
            })
            .await;

        Ok(updated)
    }

    /// Recompute availability from outstanding loans. Idempotent; safe to
    /// call at any time.
    #[instrument(skip(self))]
    pub async fn recompute_availability(
        &self,
        ctx: &AuthContext,
        material_id: Uuid,
    ) -> Result<material::Model, ServiceError> {
        let account_id = ctx.account_id;
        let updated = self
            .db
            .transaction::<_, material::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let mat = find_material_for_update(txn, account_id, material_id).await?;
                    recompute_in_txn(txn, mat).await
                })
            })
            .await
            .map_err(txn_err)?;

        self.event_sender
            .send_or_log(Event::AvailabilityRecomputed {
                account_id,
                material_id,
                available: updated.available_quantity,
            })
            .await;

        Ok(updated)
    }
}

/// QR token format: opaque, unique, assigned once at creation.
pub(crate) fn generate_qr_code() -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("MAT-{}", &hex[..12])
}

/// Load a material row locked for update, scoped to the account. Rows outside
/// the account behave exactly as absent.
pub(crate) async fn find_material_for_update<C: ConnectionTrait>(
    conn: &C,
    account_id: Uuid,
    material_id: Uuid,
) -> Result<material::Model, ServiceError> {
    material::Entity::find_by_id(material_id)
        .filter(material::Column::AccountId.eq(account_id))
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Material {} not found", material_id)))
}

pub(crate) async fn load_category<C: ConnectionTrait>(
    conn: &C,
    account_id: Uuid,
    category_id: Uuid,
) -> Result<category::Model, ServiceError> {
    category::Entity::find_by_id(category_id)
        .filter(category::Column::AccountId.eq(account_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", category_id)))
}

/// Ledger consume step, shared with loan issuance. The caller has already
/// established that the material's category is consumable.
pub(crate) async fn consume_in_txn<C: ConnectionTrait>(
    conn: &C,
    mat: material::Model,
    quantity: i32,
) -> Result<material::Model, ServiceError> {
    if quantity > mat.available_quantity {
        return Err(ServiceError::InsufficientStock(format!(
            "{}: available {}, requested {}",
            mat.name, mat.available_quantity, quantity
        )));
    }

    let new_available = mat.available_quantity - quantity;
    let new_quantity = mat.quantity - quantity;

    let mut active: material::ActiveModel = mat.into();
    active.available_quantity = Set(new_available);
    active.quantity = Set(new_quantity);
    if new_available == 0 {
        active.status = Set(MaterialStatus::Retired);
        active.is_available_for_loan = Set(false);
    }
    active.updated_at = Set(Utc::now());
    Ok(active.update(conn).await?)
}

/// Ledger return step, shared with loan return. Caps at the total owned
/// quantity and clears the on-loan status once fully available.
pub(crate) async fn return_in_txn<C: ConnectionTrait>(
    conn: &C,
    mat: material::Model,
    quantity: i32,
) -> Result<material::Model, ServiceError> {
    let new_available = (mat.available_quantity + quantity).min(mat.quantity);
    let was_on_loan = mat.status == MaterialStatus::OnLoan;
    let total = mat.quantity;

    let mut active: material::ActiveModel = mat.into();
    active.available_quantity = Set(new_available);
    if was_on_loan && new_available == total {
        active.status = Set(MaterialStatus::Available);
    }
    active.updated_at = Set(Utc::now());
    Ok(active.update(conn).await?)
}

/// Full availability recompute from outstanding loans: a deliberate aggregate
/// instead of incremental updates, so a missed step cannot cause drift.
pub(crate) async fn recompute_in_txn<C: ConnectionTrait>(
    conn: &C,
    mat: material::Model,
) -> Result<material::Model, ServiceError> {
    // Blocked statuses hold zero availability no matter what the loan
    // aggregate says; a later return must not put damaged stock back on
    // the shelf.
    if mat.status.zeroes_availability() {
        if mat.available_quantity == 0 {
            return Ok(mat);
        }
        let mut active: material::ActiveModel = mat.into();
        active.available_quantity = Set(0);
        active.updated_at = Set(Utc::now());
        return Ok(active.update(conn).await?);
    }

    let outstanding_loans = loan::Entity::find()
        .filter(loan::Column::MaterialId.eq(mat.id))
        .filter(
            loan::Column::Status
                .is_in([loan::LoanStatus::Active, loan::LoanStatus::Overdue]),
        )
        .all(conn)
        .await?;
    let outstanding: i64 = outstanding_loans
        .iter()
        .map(|l| i64::from(l.quantity_loaned))
        .sum();

    let new_available = (i64::from(mat.quantity) - outstanding).max(0) as i32;
    let status = mat.status;

    let mut active: material::ActiveModel = mat.into();
    active.available_quantity = Set(new_available);
    if new_available <= 0 {
        active.status = Set(MaterialStatus::OnLoan);
    } else if status == MaterialStatus::OnLoan {
        active.status = Set(MaterialStatus::Available);
    }
    active.updated_at = Set(Utc::now());
    Ok(active.update(conn).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qr_codes_are_opaque_and_prefixed() {
        let code = generate_qr_code();
        assert!(code.starts_with("MAT-"));
        assert_eq!(code.len(), 16);
        assert!(code[4..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(code, generate_qr_code());
    }
}
