use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Physical warehouse or storage location belonging to an account.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "locations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub street: String,
    pub exterior_number: String,
    pub interior_number: Option<String>,
    pub neighborhood: String,
    pub postal_code: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub is_active: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Formatted single-line address.
    pub fn full_address(&self) -> String {
        let mut parts = vec![self.street.clone(), self.exterior_number.clone()];
        if let Some(interior) = &self.interior_number {
            parts.push(format!("Int. {}", interior));
        }
        parts.push(self.neighborhood.clone());
        parts.push(format!("C.P. {}", self.postal_code));
        parts.push(self.city.clone());
        parts.push(self.state.clone());
        parts.push(self.country.clone());
        parts.join(", ")
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::material::Entity")]
    Material,
}

impl Related<super::material::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Material.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
