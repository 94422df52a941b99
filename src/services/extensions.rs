//! Loan extension workflow. Approval is the one path that moves a loan's due
//! date and reopens an overdue loan without a physical return.

use crate::{
    auth::AuthContext,
    db::DbPool,
    entities::{
        loan::{self, LoanStatus},
        loan_extension::{self, ExtensionStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{loans::find_loan, txn_err},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CreateExtensionInput {
    pub loan_id: Uuid,
    pub new_return_date: NaiveDate,
    pub reason: Option<String>,
}

#[derive(Clone)]
pub struct ExtensionService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl ExtensionService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Request more time on an outstanding loan. Open to the loan's borrower
    /// or a manager; consumable loans have nothing to extend.
    #[instrument(skip(self, input))]
    pub async fn create_extension(
        &self,
        ctx: &AuthContext,
        input: CreateExtensionInput,
    ) -> Result<loan_extension::Model, ServiceError> {
        let today = Utc::now().date_naive();
        if input.new_return_date <= today {
            return Err(ServiceError::Validation(
                "new_return_date must be in the future".into(),
            ));
        }

        let l = find_loan(self.db.as_ref(), ctx.account_id, input.loan_id).await?;
        if !ctx.is_manager() && l.borrower_id != ctx.user_id {
            return Err(ServiceError::PermissionDenied);
        }
        if l.is_consumable_loan {
            return Err(ServiceError::Validation(
                "consumable loans cannot be extended".into(),
            ));
        }
        if !l.status.is_outstanding() {
            return Err(ServiceError::Validation(format!(
                "loan in state {} cannot be extended",
                l.status
            )));
        }

        let now = Utc::now();
        let created = loan_extension::ActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(ctx.account_id),
            loan_id: Set(l.id),
            requested_by: Set(ctx.user_id),
            new_return_date: Set(input.new_return_date),
            reason: Set(input.reason),
            status: Set(ExtensionStatus::Pending),
            reviewed_by: Set(None),
            reviewed_at: Set(None),
            review_notes: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await?;

        self.event_sender
            .send_or_log(Event::ExtensionRequested {
                account_id: ctx.account_id,
                actor_id: ctx.user_id,
                extension_id: created.id,
                loan_id: l.id,
            })
            .await;

        info!(extension_id = %created.id, loan_id = %l.id, "Extension requested");
        Ok(created)
    }

    /// Approve a pending extension. In the same transaction the parent loan's
    /// due date moves to the requested date, and an overdue loan goes back to
    /// active.
    #[instrument(skip(self, notes))]
    pub async fn approve(
        &self,
        ctx: &AuthContext,
        extension_id: Uuid,
        notes: Option<String>,
    ) -> Result<loan_extension::Model, ServiceError> {
        ctx.require_manager()?;
        let account_id = ctx.account_id;
        let reviewer_id = ctx.user_id;

        let (updated, loan_id) = self
            .db
            .transaction::<_, (loan_extension::Model, Uuid), ServiceError>(move |txn| {
                Box::pin(async move {
                    let ext = find_extension(txn, account_id, extension_id).await?;
                    if ext.status != ExtensionStatus::Pending {
                        return Err(invalid_transition(ext.status, ExtensionStatus::Approved));
                    }

                    let l = find_loan(txn, account_id, ext.loan_id).await?;
                    let new_date = ext.new_return_date;
                    let loan_id = l.id;
                    let was_overdue = l.status == LoanStatus::Overdue;

                    let mut loan_active: loan::ActiveModel = l.into();
                    loan_active.expected_return_date = Set(Some(new_date));
                    if was_overdue {
                        loan_active.status = Set(LoanStatus::Active);
                    }
                    loan_active.updated_at = Set(Utc::now());
                    loan_active.update(txn).await?;

                    let mut active: loan_extension::ActiveModel = ext.into();
                    active.status = Set(ExtensionStatus::Approved);
                    active.reviewed_by = Set(Some(reviewer_id));
                    active.reviewed_at = Set(Some(Utc::now()));
                    active.review_notes = Set(notes);
                    active.updated_at = Set(Utc::now());
                    let updated = active.update(txn).await?;

                    Ok((updated, loan_id))
                })
            })
            .await
            .map_err(txn_err)?;

        self.event_sender
            .send_or_log(Event::ExtensionApproved {
                account_id,
                actor_id: reviewer_id,
                extension_id,
                loan_id,
            })
            .await;

        info!(extension_id = %extension_id, loan_id = %loan_id, "Extension approved");
        Ok(updated)
    }

    /// Reject a pending extension. Stamp-only; the parent loan is untouched.
    #[instrument(skip(self, notes))]
    pub async fn reject(
        &self,
        ctx: &AuthContext,
        extension_id: Uuid,
        notes: Option<String>,
    ) -> Result<loan_extension::Model, ServiceError> {
        ctx.require_manager()?;

        let ext = find_extension(self.db.as_ref(), ctx.account_id, extension_id).await?;
        if ext.status != ExtensionStatus::Pending {
            return Err(invalid_transition(ext.status, ExtensionStatus::Rejected));
        }
        let loan_id = ext.loan_id;

        let mut active: loan_extension::ActiveModel = ext.into();
        active.status = Set(ExtensionStatus::Rejected);
        active.reviewed_by = Set(Some(ctx.user_id));
        active.reviewed_at = Set(Some(Utc::now()));
        active.review_notes = Set(notes);
        active.updated_at = Set(Utc::now());
        let updated = active.update(self.db.as_ref()).await?;

        self.event_sender
            .send_or_log(Event::ExtensionRejected {
                account_id: ctx.account_id,
                actor_id: ctx.user_id,
                extension_id,
                loan_id,
            })
            .await;
        Ok(updated)
    }

    // ---- reads ------------------------------------------------------------

    pub async fn get_extension(
        &self,
        ctx: &AuthContext,
        extension_id: Uuid,
    ) -> Result<loan_extension::Model, ServiceError> {
        find_extension(self.db.as_ref(), ctx.account_id, extension_id).await
    }

    pub async fn list_for_loan(
        &self,
        ctx: &AuthContext,
        loan_id: Uuid,
    ) -> Result<Vec<loan_extension::Model>, ServiceError> {
        // Loan lookup doubles as the account scope check.
        let l = find_loan(self.db.as_ref(), ctx.account_id, loan_id).await?;
        Ok(loan_extension::Entity::find()
            .filter(loan_extension::Column::LoanId.eq(l.id))
            .order_by_desc(loan_extension::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    pub async fn pending(
        &self,
        ctx: &AuthContext,
    ) -> Result<Vec<loan_extension::Model>, ServiceError> {
        ctx.require_manager()?;
        Ok(loan_extension::Entity::find()
            .filter(loan_extension::Column::AccountId.eq(ctx.account_id))
            .filter(loan_extension::Column::Status.eq(ExtensionStatus::Pending))
            .order_by_asc(loan_extension::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }
}

async fn find_extension<C: sea_orm::ConnectionTrait>(
    conn: &C,
    account_id: Uuid,
    extension_id: Uuid,
) -> Result<loan_extension::Model, ServiceError> {
    loan_extension::Entity::find_by_id(extension_id)
        .filter(loan_extension::Column::AccountId.eq(account_id))
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Loan extension {} not found", extension_id))
        })
}

fn invalid_transition(from: ExtensionStatus, to: ExtensionStatus) -> ServiceError {
    ServiceError::InvalidTransition {
        entity: "loan_extension",
        from: from.to_string(),
        to: to.to_string(),
    }
}
