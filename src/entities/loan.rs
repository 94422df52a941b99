use chrono::NaiveDate;
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
pub enum LoanStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "returned")]
    Returned,
    #[sea_orm(string_value = "overdue")]
    Overdue,
    #[sea_orm(string_value = "lost")]
    Lost,
}

impl LoanStatus {
    /// Loans in these states still count against material availability.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Active | Self::Overdue)
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
pub enum ConditionRating {
    #[sea_orm(string_value = "excellent")]
    Excellent,
    #[sea_orm(string_value = "good")]
    Good,
    #[sea_orm(string_value = "fair")]
    Fair,
    #[sea_orm(string_value = "poor")]
    Poor,
    #[sea_orm(string_value = "damaged")]
    Damaged,
}

/// Issued loan of a single material to a borrower.
///
/// Consumable loans are born `returned`: stock is drawn down permanently at
/// issuance, `expected_return_date` stays empty and no return step exists.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "loans")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub account_id: Uuid,
    pub loan_request_id: Option<Uuid>,
    pub borrower_id: Uuid,
    pub issued_by: Uuid,
    pub returned_to: Option<Uuid>,
    pub material_id: Uuid,
    pub quantity_loaned: i32,
    pub quantity_returned: i32,
    /// Frozen from the material's category at issuance.
    pub is_consumable_loan: bool,
    pub issued_at: DateTimeUtc,
    pub expected_return_date: Option<Date>,
    pub actual_return_date: Option<DateTimeUtc>,
    pub facial_auth_verified: bool,
    pub facial_auth_at: Option<DateTimeUtc>,
    #[sea_orm(column_type = "Text", nullable)]
    pub pickup_signature: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub return_signature: Option<String>,
    pub condition_on_pickup: ConditionRating,
    pub condition_on_return: Option<ConditionRating>,
    #[sea_orm(column_type = "Text", nullable)]
    pub damage_notes: Option<String>,
    pub status: LoanStatus,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Past its due date while still active. Pure derived read; the persisted
    /// status may lag until the reconciliation sweep runs.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        if self.is_consumable_loan {
            return false;
        }
        self.status == LoanStatus::Active
            && self.expected_return_date.is_some_and(|due| due < today)
    }

    /// Signed number of days until the due date (negative when past due,
    /// 0 for consumable loans or loans without a due date).
    pub fn days_until_return(&self, today: NaiveDate) -> i64 {
        match self.expected_return_date {
            Some(due) if !self.is_consumable_loan => (due - today).num_days(),
            _ => 0,
        }
    }

    pub fn is_fully_returned(&self) -> bool {
        self.quantity_returned >= self.quantity_loaned
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::material::Entity",
        from = "Column::MaterialId",
        to = "super::material::Column::Id",
        on_delete = "Cascade"
    )]
    Material,
    #[sea_orm(
        belongs_to = "super::loan_request::Entity",
        from = "Column::LoanRequestId",
        to = "super::loan_request::Column::Id",
        on_delete = "SetNull"
    )]
    LoanRequest,
    #[sea_orm(has_many = "super::loan_extension::Entity")]
    LoanExtension,
}

impl Related<super::material::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Material.def()
    }
}

impl Related<super::loan_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LoanRequest.def()
    }
}

impl Related<super::loan_extension::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LoanExtension.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn loan(status: LoanStatus, due: Option<NaiveDate>, consumable: bool) -> Model {
        Model {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            loan_request_id: None,
            borrower_id: Uuid::new_v4(),
            issued_by: Uuid::new_v4(),
            returned_to: None,
            material_id: Uuid::new_v4(),
            quantity_loaned: 2,
            quantity_returned: 0,
            is_consumable_loan: consumable,
            issued_at: Utc::now(),
            expected_return_date: due,
            actual_return_date: None,
            facial_auth_verified: false,
            facial_auth_at: None,
            pickup_signature: None,
            return_signature: None,
            condition_on_pickup: ConditionRating::Good,
            condition_on_return: None,
            damage_notes: None,
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn overdue_is_date_and_status_driven() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 26).unwrap();
        let yesterday = today.pred_opt().unwrap();
        let tomorrow = today.succ_opt().unwrap();

        assert!(loan(LoanStatus::Active, Some(yesterday), false).is_overdue(today));
        assert!(!loan(LoanStatus::Active, Some(tomorrow), false).is_overdue(today));
        assert!(!loan(LoanStatus::Returned, Some(yesterday), false).is_overdue(today));
        // Consumable loans never go overdue.
        assert!(!loan(LoanStatus::Returned, None, true).is_overdue(today));
    }

    #[test]
    fn days_until_return_is_signed() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 26).unwrap();
        let due = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();

        assert_eq!(loan(LoanStatus::Active, Some(due), false).days_until_return(today), 3);
        let past = NaiveDate::from_ymd_opt(2026, 8, 20).unwrap();
        assert_eq!(loan(LoanStatus::Overdue, Some(past), false).days_until_return(today), -6);
        assert_eq!(loan(LoanStatus::Returned, None, true).days_until_return(today), 0);
    }

    #[test]
    fn fully_returned_threshold() {
        let mut l = loan(LoanStatus::Active, None, false);
        assert!(!l.is_fully_returned());
        l.quantity_returned = l.quantity_loaned;
        assert!(l.is_fully_returned());
    }
}
