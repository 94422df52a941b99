//! Loan lifecycle: issuance, return, loss and the overdue reconciliation
//! sweep. Every stock-affecting step runs inside one transaction together
//! with the material ledger update.

use crate::{
    auth::AuthContext,
    db::DbPool,
    entities::{
        loan::{self, ConditionRating, LoanStatus},
        loan_request::{self, RequestStatus},
        material::MaterialStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        materials::{consume_in_txn, find_material_for_update, load_category, recompute_in_txn},
        txn_err,
    },
};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct IssueLoanInput {
    pub borrower_id: Uuid,
    pub material_id: Uuid,
    pub quantity: i32,
    pub loan_request_id: Option<Uuid>,
    /// Required for non-consumable loans, ignored for consumables.
    pub expected_return_date: Option<NaiveDate>,
    pub condition_on_pickup: ConditionRating,
    pub pickup_signature: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReturnLoanInput {
    pub condition_on_return: ConditionRating,
    pub damage_notes: Option<String>,
    pub return_signature: Option<String>,
}

#[derive(Clone)]
pub struct LoanService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl LoanService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Issue a loan. Consumable materials are drawn down permanently and the
    /// loan record is created already returned; non-consumables reserve stock
    /// and open an active (or immediately overdue) loan.
    #[instrument(skip(self, input))]
    pub async fn issue_loan(
        &self,
        ctx: &AuthContext,
        input: IssueLoanInput,
    ) -> Result<loan::Model, ServiceError> {
        ctx.require_manager()?;
        if input.quantity < 1 {
            return Err(ServiceError::Validation("quantity must be >= 1".into()));
        }

        let account_id = ctx.account_id;
        let issued_by = ctx.user_id;
        let today = Utc::now().date_naive();

        let (created, remaining) = self
            .db
            .transaction::<_, (loan::Model, Option<i32>), ServiceError>(move |txn| {
                Box::pin(async move {
                    if let Some(request_id) = input.loan_request_id {
                        let request = loan_request::Entity::find_by_id(request_id)
                            .filter(loan_request::Column::AccountId.eq(account_id))
                            .one(txn)
                            .await?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "Loan request {} not found",
                                    request_id
                                ))
                            })?;
                        if request.status != RequestStatus::Approved {
                            return Err(ServiceError::Validation(format!(
                                "loan request {} is not approved",
                                request_id
                            )));
                        }
                    }

                    let mat = find_material_for_update(txn, account_id, input.material_id).await?;
                    let cat = load_category(txn, account_id, mat.category_id).await?;
                    let material_name = mat.name.clone();

                    let now = Utc::now();
                    let mut model = loan::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        account_id: Set(account_id),
                        loan_request_id: Set(input.loan_request_id),
                        borrower_id: Set(input.borrower_id),
                        issued_by: Set(issued_by),
                        returned_to: Set(None),
                        material_id: Set(mat.id),
                        quantity_loaned: Set(input.quantity),
                        quantity_returned: Set(0),
                        is_consumable_loan: Set(cat.is_consumable),
                        issued_at: Set(now),
                        expected_return_date: Set(None),
                        actual_return_date: Set(None),
                        facial_auth_verified: Set(false),
                        facial_auth_at: Set(None),
                        pickup_signature: Set(input.pickup_signature),
                        return_signature: Set(None),
                        condition_on_pickup: Set(input.condition_on_pickup),
                        condition_on_return: Set(None),
                        damage_notes: Set(None),
                        status: Set(LoanStatus::Active),
                        created_at: Set(now),
                        updated_at: Set(now),
                    };

                    if cat.is_consumable {
                        // Stock leaves the ledger for good; the loan record is
                        // born returned and never enters the active state.
                        let mat = consume_in_txn(txn, mat, input.quantity).await?;
                        model.status = Set(LoanStatus::Returned);
                        model.quantity_returned = Set(input.quantity);
                        let inserted = model.insert(txn).await?;
                        return Ok((inserted, Some(mat.available_quantity)));
                    } else {
                        // A fully-loaned material (OnLoan, zero availability)
                        // still takes the stock comparison below, so the
                        // shortfall surfaces as InsufficientStock rather than
                        // a loanability complaint.
                        let loanable_status = matches!(
                            mat.status,
                            MaterialStatus::Available | MaterialStatus::OnLoan
                        );
                        if !mat.is_active || !mat.is_available_for_loan || !loanable_status {
                            return Err(ServiceError::Validation(format!(
                                "{} is not available for loan",
                                material_name
                            )));
                        }
                        let due = input.expected_return_date.ok_or_else(|| {
                            ServiceError::Validation(
                                "expected_return_date is required for non-consumable loans".into(),
                            )
                        })?;
                        if input.quantity > mat.available_quantity {
                            return Err(ServiceError::InsufficientStock(format!(
                                "{}: available {}, requested {}",
                                material_name, mat.available_quantity, input.quantity
                            )));
                        }
                        model.expected_return_date = Set(Some(due));
                        if due < today {
                            model.status = Set(LoanStatus::Overdue);
                        }
                        let inserted = model.insert(txn).await?;
                        recompute_in_txn(txn, mat).await?;
                        Ok((inserted, None))
                    }
                })
            })
            .await
            .map_err(txn_err)?;

        self.event_sender
            .send_or_log(Event::LoanIssued {
                account_id,
                actor_id: issued_by,
                loan_id: created.id,
                material_id: created.material_id,
                quantity: created.quantity_loaned,
                consumable: created.is_consumable_loan,
            })
            .await;
        if let Some(remaining) = remaining {
            self.event_sender
                .send_or_log(Event::MaterialConsumed {
                    account_id,
                    actor_id: issued_by,
                    material_id: created.material_id,
                    quantity: created.quantity_loaned,
                    remaining,
                })
                .await;
        }

        info!(
            loan_id = %created.id,
            material_id = %created.material_id,
            quantity = created.quantity_loaned,
            consumable = created.is_consumable_loan,
            "Issued loan"
        );
        Ok(created)
    }

    /// Close an outstanding loan and put its stock back on the shelf. A
    /// damaged return also flags the material itself.
    #[instrument(skip(self, input))]
    pub async fn return_loan(
        &self,
        ctx: &AuthContext,
        loan_id: Uuid,
        input: ReturnLoanInput,
    ) -> Result<loan::Model, ServiceError> {
        ctx.require_manager()?;
        let account_id = ctx.account_id;
        let returned_to = ctx.user_id;

        let updated = self
            .db
            .transaction::<_, loan::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let existing = find_loan(txn, account_id, loan_id).await?;
                    if existing.is_consumable_loan {
                        return Err(ServiceError::ConsumableNotReturnable(format!(
                            "loan {}",
                            loan_id
                        )));
                    }
                    if !existing.status.is_outstanding() {
                        return Err(invalid_transition(existing.status, LoanStatus::Returned));
                    }

                    let mat = find_material_for_update(txn, account_id, existing.material_id).await?;
                    let quantity = existing.quantity_loaned;
                    let damaged = input.condition_on_return == ConditionRating::Damaged;

                    let mut active: loan::ActiveModel = existing.into();
                    active.status = Set(LoanStatus::Returned);
                    active.actual_return_date = Set(Some(Utc::now()));
                    active.returned_to = Set(Some(returned_to));
                    active.quantity_returned = Set(quantity);
                    active.condition_on_return = Set(Some(input.condition_on_return));
                    active.damage_notes = Set(input.damage_notes);
                    active.return_signature = Set(input.return_signature);
                    active.updated_at = Set(Utc::now());
                    let updated = active.update(txn).await?;

                    // With the loan no longer outstanding, the aggregate puts
                    // the stock back and clears OnLoan.
                    let mat = recompute_in_txn(txn, mat).await?;
                    if damaged {
                        let mut damaged_mat: crate::entities::material::ActiveModel = mat.into();
                        damaged_mat.status = Set(MaterialStatus::Damaged);
                        damaged_mat.available_quantity = Set(0);
                        damaged_mat.is_available_for_loan = Set(false);
                        damaged_mat.updated_at = Set(Utc::now());
                        damaged_mat.update(txn).await?;
                    }

                    Ok(updated)
                })
            })
            .await
            .map_err(txn_err)?;

        self.event_sender
            .send_or_log(Event::LoanReturned {
                account_id,
                actor_id: returned_to,
                loan_id,
                material_id: updated.material_id,
                quantity: updated.quantity_returned,
                damaged: updated.condition_on_return == Some(ConditionRating::Damaged),
            })
            .await;

        info!(loan_id = %loan_id, "Loan returned");
        Ok(updated)
    }

    /// Write off an outstanding loan. The stock never comes back; availability
    /// is recomputed so the lost quantity stops counting as out on loan.
    #[instrument(skip(self, notes))]
    pub async fn mark_lost(
        &self,
        ctx: &AuthContext,
        loan_id: Uuid,
        notes: Option<String>,
    ) -> Result<loan::Model, ServiceError> {
        ctx.require_manager()?;
        let account_id = ctx.account_id;

        let updated = self
            .db
            .transaction::<_, loan::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let existing = find_loan(txn, account_id, loan_id).await?;
                    if !existing.status.is_outstanding() {
                        return Err(invalid_transition(existing.status, LoanStatus::Lost));
                    }

                    let mat = find_material_for_update(txn, account_id, existing.material_id).await?;
                    let lost_quantity = existing.quantity_loaned;

                    let mut active: loan::ActiveModel = existing.into();
                    active.status = Set(LoanStatus::Lost);
                    active.damage_notes = Set(notes);
                    active.updated_at = Set(Utc::now());
                    let updated = active.update(txn).await?;

                    // Lost stock leaves the owned quantity before the recompute.
                    let new_quantity = (mat.quantity - lost_quantity).max(0);
                    let mut shrunk: crate::entities::material::ActiveModel = mat.into();
                    shrunk.quantity = Set(new_quantity);
                    shrunk.updated_at = Set(Utc::now());
                    let mat = shrunk.update(txn).await?;
                    recompute_in_txn(txn, mat).await?;

                    Ok(updated)
                })
            })
            .await
            .map_err(txn_err)?;

        self.event_sender
            .send_or_log(Event::LoanLost {
                account_id,
                actor_id: ctx.user_id,
                loan_id,
            })
            .await;

        info!(loan_id = %loan_id, "Loan marked lost");
        Ok(updated)
    }

    /// Record a successful facial verification for a loan pickup. Independent
    /// of the loan state machine.
    #[instrument(skip(self))]
    pub async fn verify_facial_auth(
        &self,
        ctx: &AuthContext,
        loan_id: Uuid,
    ) -> Result<loan::Model, ServiceError> {
        let existing = find_loan(self.db.as_ref(), ctx.account_id, loan_id).await?;

        let mut active: loan::ActiveModel = existing.into();
        active.facial_auth_verified = Set(true);
        active.facial_auth_at = Set(Some(Utc::now()));
        active.updated_at = Set(Utc::now());
        let updated = active.update(self.db.as_ref()).await?;

        self.event_sender
            .send_or_log(Event::FacialAuthVerified {
                account_id: ctx.account_id,
                actor_id: ctx.user_id,
                loan_id,
            })
            .await;
        Ok(updated)
    }

    /// Reconciliation sweep across all accounts: persist Active -> Overdue for
    /// loans whose due date has passed. Idempotent; reads of `is_overdue` stay
    /// correct whether or not the sweep has run yet.
    #[instrument(skip(self))]
    pub async fn sweep_overdue(&self, today: NaiveDate) -> Result<u64, ServiceError> {
        let due_loans = loan::Entity::find()
            .filter(loan::Column::Status.eq(LoanStatus::Active))
            .filter(loan::Column::IsConsumableLoan.eq(false))
            .filter(loan::Column::ExpectedReturnDate.lt(today))
            .all(self.db.as_ref())
            .await?;

        let mut flipped = 0u64;
        for l in due_loans {
            let account_id = l.account_id;
            let loan_id = l.id;

            let mut active: loan::ActiveModel = l.into();
            active.status = Set(LoanStatus::Overdue);
            active.updated_at = Set(Utc::now());
            active.update(self.db.as_ref()).await?;
            flipped += 1;

            self.event_sender
                .send_or_log(Event::LoanOverdue {
                    account_id,
                    loan_id,
                })
                .await;
        }

        if flipped > 0 {
            info!(flipped, "Overdue sweep flipped loans");
        }
        Ok(flipped)
    }

    // ---- reads ------------------------------------------------------------

    pub async fn get_loan(
        &self,
        ctx: &AuthContext,
        loan_id: Uuid,
    ) -> Result<loan::Model, ServiceError> {
        find_loan(self.db.as_ref(), ctx.account_id, loan_id).await
    }

    pub async fn list_loans(
        &self,
        ctx: &AuthContext,
        status: Option<LoanStatus>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<loan::Model>, u64), ServiceError> {
        let mut query = loan::Entity::find()
            .filter(loan::Column::AccountId.eq(ctx.account_id));
        if let Some(status) = status {
            query = query.filter(loan::Column::Status.eq(status));
        }

        let paginator = query
            .order_by_desc(loan::Column::IssuedAt)
            .paginate(self.db.as_ref(), limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    pub async fn active_loans(&self, ctx: &AuthContext) -> Result<Vec<loan::Model>, ServiceError> {
        Ok(loan::Entity::find()
            .filter(loan::Column::AccountId.eq(ctx.account_id))
            .filter(loan::Column::Status.eq(LoanStatus::Active))
            .order_by_asc(loan::Column::ExpectedReturnDate)
            .all(self.db.as_ref())
            .await?)
    }

    /// Persisted Overdue plus active loans already past their due date that
    /// the sweep has not flipped yet.
    pub async fn overdue_loans(
        &self,
        ctx: &AuthContext,
        today: NaiveDate,
    ) -> Result<Vec<loan::Model>, ServiceError> {
        let outstanding = loan::Entity::find()
            .filter(loan::Column::AccountId.eq(ctx.account_id))
            .filter(
                loan::Column::Status.is_in([LoanStatus::Active, LoanStatus::Overdue]),
            )
            .order_by_asc(loan::Column::ExpectedReturnDate)
            .all(self.db.as_ref())
            .await?;

        Ok(outstanding
            .into_iter()
            .filter(|l| l.status == LoanStatus::Overdue || l.is_overdue(today))
            .collect())
    }

    pub async fn my_loans(&self, ctx: &AuthContext) -> Result<Vec<loan::Model>, ServiceError> {
        Ok(loan::Entity::find()
            .filter(loan::Column::AccountId.eq(ctx.account_id))
            .filter(loan::Column::BorrowerId.eq(ctx.user_id))
            .order_by_desc(loan::Column::IssuedAt)
            .all(self.db.as_ref())
            .await?)
    }
}

pub(crate) async fn find_loan<C: sea_orm::ConnectionTrait>(
    conn: &C,
    account_id: Uuid,
    loan_id: Uuid,
) -> Result<loan::Model, ServiceError> {
    loan::Entity::find_by_id(loan_id)
        .filter(loan::Column::AccountId.eq(account_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Loan {} not found", loan_id)))
}

fn invalid_transition(from: LoanStatus, to: LoanStatus) -> ServiceError {
    ServiceError::InvalidTransition {
        entity: "loan",
        from: from.to_string(),
        to: to.to_string(),
    }
}
