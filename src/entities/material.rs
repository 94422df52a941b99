use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MaterialStatus {
    #[sea_orm(string_value = "available")]
    Available,
    #[sea_orm(string_value = "on_loan")]
    OnLoan,
    #[sea_orm(string_value = "maintenance")]
    Maintenance,
    #[sea_orm(string_value = "damaged")]
    Damaged,
    #[sea_orm(string_value = "retired")]
    Retired,
}

impl MaterialStatus {
    /// Statuses under which the material holds no loanable units.
    pub fn zeroes_availability(&self) -> bool {
        matches!(self, Self::Damaged | Self::Retired | Self::Maintenance)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UnitOfMeasure {
    #[sea_orm(string_value = "unit")]
    Unit,
    #[sea_orm(string_value = "set")]
    Set,
    #[sea_orm(string_value = "box")]
    Box,
    #[sea_orm(string_value = "package")]
    Package,
    #[sea_orm(string_value = "meter")]
    Meter,
    #[sea_orm(string_value = "kg")]
    Kg,
    #[sea_orm(string_value = "liter")]
    Liter,
}

/// Inventory item available for loan (or consumption, when its category is
/// consumable).
///
/// Invariants maintained by the ledger:
/// - `0 <= available_quantity <= quantity`
/// - status in {damaged, retired, maintenance} implies `available_quantity = 0`
///   and `is_available_for_loan = false`
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "materials")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub account_id: Uuid,
    pub category_id: Uuid,
    pub location_id: Option<Uuid>,
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    #[sea_orm(unique)]
    pub sku: String,
    pub barcode: Option<String>,
    /// Opaque unique token assigned exactly once at creation, never
    /// regenerated for the lifetime of the record.
    #[sea_orm(unique)]
    pub qr_code: String,
    pub quantity: i32,
    pub available_quantity: i32,
    pub unit_of_measure: UnitOfMeasure,
    pub min_stock_level: i32,
    pub reorder_quantity: i32,
    pub image_url: Option<String>,
    pub status: MaterialStatus,
    pub is_available_for_loan: bool,
    pub requires_facial_auth: bool,
    pub is_active: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Stock is at or below the configured minimum.
    pub fn is_low_stock(&self) -> bool {
        self.available_quantity <= self.min_stock_level
    }

    /// Whether new loans may be issued against this material.
    pub fn can_be_loaned(&self) -> bool {
        self.is_active
            && self.is_available_for_loan
            && self.status == MaterialStatus::Available
            && self.available_quantity > 0
    }

    /// Whether a restock should be ordered. Only meaningful for consumable
    /// categories; the flag is looked up on the category, not stored here.
    pub fn needs_reorder(&self, is_consumable: bool) -> bool {
        is_consumable && self.is_low_stock()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id",
        on_delete = "Restrict"
    )]
    Category,
    #[sea_orm(
        belongs_to = "super::location::Entity",
        from = "Column::LocationId",
        to = "super::location::Column::Id",
        on_delete = "SetNull"
    )]
    Location,
    #[sea_orm(has_many = "super::loan::Entity")]
    Loan,
    #[sea_orm(has_many = "super::loan_request_item::Entity")]
    LoanRequestItem,
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl Related<super::location::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Location.def()
    }
}

impl Related<super::loan::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Loan.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn material(status: MaterialStatus, available: i32, min_stock: i32) -> Model {
        Model {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            location_id: None,
            name: "Drill".to_string(),
            description: None,
            sku: "SKU-1".to_string(),
            barcode: None,
            qr_code: "MAT-0123456789AB".to_string(),
            quantity: 10,
            available_quantity: available,
            unit_of_measure: UnitOfMeasure::Unit,
            min_stock_level: min_stock,
            reorder_quantity: 0,
            image_url: None,
            status,
            is_available_for_loan: true,
            requires_facial_auth: false,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn low_stock_and_reorder() {
        let m = material(MaterialStatus::Available, 2, 2);
        assert!(m.is_low_stock());
        assert!(m.needs_reorder(true));
        assert!(!m.needs_reorder(false));

        let m = material(MaterialStatus::Available, 3, 2);
        assert!(!m.is_low_stock());
    }

    #[test]
    fn loanability_requires_available_status_and_stock() {
        assert!(material(MaterialStatus::Available, 1, 0).can_be_loaned());
        assert!(!material(MaterialStatus::Available, 0, 0).can_be_loaned());
        assert!(!material(MaterialStatus::OnLoan, 1, 0).can_be_loaned());
        assert!(!material(MaterialStatus::Maintenance, 1, 0).can_be_loaned());
    }

    #[test]
    fn blocked_statuses_zero_availability() {
        assert!(MaterialStatus::Damaged.zeroes_availability());
        assert!(MaterialStatus::Retired.zeroes_availability());
        assert!(MaterialStatus::Maintenance.zeroes_availability());
        assert!(!MaterialStatus::Available.zeroes_availability());
        assert!(!MaterialStatus::OnLoan.zeroes_availability());
    }
}
