//! Loan request workflow: pending -> {approved, rejected, cancelled,
//! completed}. Review never touches stock; issuance is a separate act.

use crate::{
    auth::AuthContext,
    db::DbPool,
    entities::{
        loan_request::{self, RequestStatus},
        loan_request_item,
        material,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{materials::load_category, txn_err},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RequestItemInput {
    pub material_id: Uuid,
    pub quantity_requested: i32,
}

#[derive(Debug, Clone)]
pub struct CreateLoanRequestInput {
    pub desired_pickup_date: NaiveDate,
    pub desired_return_date: NaiveDate,
    pub purpose: Option<String>,
    pub items: Vec<RequestItemInput>,
}

/// A request together with its line items.
#[derive(Debug, Clone)]
pub struct LoanRequestDetail {
    pub request: loan_request::Model,
    pub items: Vec<loan_request_item::Model>,
}

#[derive(Clone)]
pub struct LoanRequestService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl LoanRequestService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Submit a new request. Consumable items get a soft stock check against
    /// live availability; the hard, serialized check happens at issuance.
    #[instrument(skip(self, input))]
    pub async fn create_request(
        &self,
        ctx: &AuthContext,
        input: CreateLoanRequestInput,
    ) -> Result<LoanRequestDetail, ServiceError> {
        if input.items.is_empty() {
            return Err(ServiceError::Validation(
                "a loan request needs at least one item".into(),
            ));
        }
        if input.desired_return_date < input.desired_pickup_date {
            return Err(ServiceError::Validation(
                "desired_return_date must not precede desired_pickup_date".into(),
            ));
        }
        let mut seen = HashSet::new();
        for item in &input.items {
            if item.quantity_requested < 1 {
                return Err(ServiceError::Validation(
                    "quantity_requested must be >= 1".into(),
                ));
            }
            if !seen.insert(item.material_id) {
                return Err(ServiceError::Validation(format!(
                    "material {} listed more than once",
                    item.material_id
                )));
            }
        }

        let account_id = ctx.account_id;
        let requester_id = ctx.user_id;
        let item_count = input.items.len();

        let detail = self
            .db
            .transaction::<_, LoanRequestDetail, ServiceError>(move |txn| {
                Box::pin(async move {
                    let now = Utc::now();
                    let request_id = Uuid::new_v4();

                    let request = loan_request::ActiveModel {
                        id: Set(request_id),
                        account_id: Set(account_id),
                        requester_id: Set(requester_id),
                        desired_pickup_date: Set(input.desired_pickup_date),
                        desired_return_date: Set(input.desired_return_date),
                        purpose: Set(input.purpose),
                        status: Set(RequestStatus::Pending),
                        reviewed_by: Set(None),
                        reviewed_at: Set(None),
                        review_notes: Set(None),
                        created_at: Set(now),
                        updated_at: Set(now),
                    }
                    .insert(txn)
                    .await?;

                    let mut items = Vec::with_capacity(input.items.len());
                    for item in input.items {
                        let mat = material::Entity::find_by_id(item.material_id)
                            .filter(material::Column::AccountId.eq(account_id))
                            .one(txn)
                            .await?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "Material {} not found",
                                    item.material_id
                                ))
                            })?;

                        if !mat.can_be_loaned() {
                            return Err(ServiceError::Validation(format!(
                                "{} is not available for loan",
                                mat.name
                            )));
                        }

                        let cat = load_category(txn, account_id, mat.category_id).await?;
                        if cat.is_consumable && item.quantity_requested > mat.available_quantity {
                            return Err(ServiceError::InsufficientStock(format!(
                                "{}: available {}, requested {}",
                                mat.name, mat.available_quantity, item.quantity_requested
                            )));
                        }

                        let row = loan_request_item::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            loan_request_id: Set(request_id),
                            material_id: Set(item.material_id),
                            quantity_requested: Set(item.quantity_requested),
                            created_at: Set(now),
                        }
                        .insert(txn)
                        .await?;
                        items.push(row);
                    }

                    Ok(LoanRequestDetail { request, items })
                })
            })
            .await
            .map_err(txn_err)?;

        self.event_sender
            .send_or_log(Event::LoanRequestSubmitted {
                account_id,
                actor_id: requester_id,
                request_id: detail.request.id,
                item_count,
            })
            .await;

        info!(request_id = %detail.request.id, items = item_count, "Loan request submitted");
        Ok(detail)
    }

    pub async fn get_request(
        &self,
        ctx: &AuthContext,
        request_id: Uuid,
    ) -> Result<LoanRequestDetail, ServiceError> {
        let request = self.find_request(ctx, request_id).await?;
        let items = loan_request_item::Entity::find()
            .filter(loan_request_item::Column::LoanRequestId.eq(request.id))
            .all(self.db.as_ref())
            .await?;
        Ok(LoanRequestDetail { request, items })
    }

    pub async fn list_requests(
        &self,
        ctx: &AuthContext,
        status: Option<RequestStatus>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<loan_request::Model>, u64), ServiceError> {
        let mut query = loan_request::Entity::find()
            .filter(loan_request::Column::AccountId.eq(ctx.account_id));
        if let Some(status) = status {
            query = query.filter(loan_request::Column::Status.eq(status));
        }

        let paginator = query
            .order_by_desc(loan_request::Column::CreatedAt)
            .paginate(self.db.as_ref(), limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    /// Review queue, oldest first.
    pub async fn pending(
        &self,
        ctx: &AuthContext,
    ) -> Result<Vec<loan_request::Model>, ServiceError> {
        ctx.require_manager()?;
        Ok(loan_request::Entity::find()
            .filter(loan_request::Column::AccountId.eq(ctx.account_id))
            .filter(loan_request::Column::Status.eq(RequestStatus::Pending))
            .order_by_asc(loan_request::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    pub async fn my_requests(
        &self,
        ctx: &AuthContext,
    ) -> Result<Vec<loan_request::Model>, ServiceError> {
        Ok(loan_request::Entity::find()
            .filter(loan_request::Column::AccountId.eq(ctx.account_id))
            .filter(loan_request::Column::RequesterId.eq(ctx.user_id))
            .order_by_desc(loan_request::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    /// Approve a pending request. Records the decision only; no stock is
    /// reserved and no loans are created.
    #[instrument(skip(self, notes))]
    pub async fn approve(
        &self,
        ctx: &AuthContext,
        request_id: Uuid,
        notes: Option<String>,
    ) -> Result<loan_request::Model, ServiceError> {
        ctx.require_manager()?;
        let updated = self
            .review(ctx, request_id, RequestStatus::Approved, notes)
            .await?;

        self.event_sender
            .send_or_log(Event::LoanRequestApproved {
                account_id: ctx.account_id,
                actor_id: ctx.user_id,
                request_id,
            })
            .await;
        Ok(updated)
    }

    /// Reject a pending request.
    #[instrument(skip(self, notes))]
    pub async fn reject(
        &self,
        ctx: &AuthContext,
        request_id: Uuid,
        notes: Option<String>,
    ) -> Result<loan_request::Model, ServiceError> {
        ctx.require_manager()?;
        let updated = self
            .review(ctx, request_id, RequestStatus::Rejected, notes)
            .await?;

        self.event_sender
            .send_or_log(Event::LoanRequestRejected {
                account_id: ctx.account_id,
                actor_id: ctx.user_id,
                request_id,
            })
            .await;
        Ok(updated)
    }

    /// Cancel a pending request. Allowed for the requester themselves or a
    /// manager.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        ctx: &AuthContext,
        request_id: Uuid,
    ) -> Result<loan_request::Model, ServiceError> {
        let request = self.find_request(ctx, request_id).await?;
        if !ctx.is_manager() && request.requester_id != ctx.user_id {
            return Err(ServiceError::PermissionDenied);
        }
        if request.status != RequestStatus::Pending {
            return Err(invalid_transition(request.status, RequestStatus::Cancelled));
        }

        let mut active: loan_request::ActiveModel = request.into();
        active.status = Set(RequestStatus::Cancelled);
        active.updated_at = Set(Utc::now());
        let updated = active.update(self.db.as_ref()).await?;

        self.event_sender
            .send_or_log(Event::LoanRequestCancelled {
                account_id: ctx.account_id,
                actor_id: ctx.user_id,
                request_id,
            })
            .await;
        Ok(updated)
    }

    /// Mark an approved request as completed once its loans have been issued.
    #[instrument(skip(self))]
    pub async fn complete(
        &self,
        ctx: &AuthContext,
        request_id: Uuid,
    ) -> Result<loan_request::Model, ServiceError> {
        ctx.require_manager()?;
        let request = self.find_request(ctx, request_id).await?;
        if request.status != RequestStatus::Approved {
            return Err(invalid_transition(request.status, RequestStatus::Completed));
        }

        let mut active: loan_request::ActiveModel = request.into();
        active.status = Set(RequestStatus::Completed);
        active.updated_at = Set(Utc::now());
        let updated = active.update(self.db.as_ref()).await?;

        self.event_sender
            .send_or_log(Event::LoanRequestCompleted {
                account_id: ctx.account_id,
                actor_id: ctx.user_id,
                request_id,
            })
            .await;
        Ok(updated)
    }

    async fn find_request(
        &self,
        ctx: &AuthContext,
        request_id: Uuid,
    ) -> Result<loan_request::Model, ServiceError> {
        loan_request::Entity::find_by_id(request_id)
            .filter(loan_request::Column::AccountId.eq(ctx.account_id))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Loan request {} not found", request_id)))
    }

    /// Shared review path: strictly pending -> target, stamping reviewer,
    /// timestamp and notes.
    async fn review(
        &self,
        ctx: &AuthContext,
        request_id: Uuid,
        target: RequestStatus,
        notes: Option<String>,
    ) -> Result<loan_request::Model, ServiceError> {
        let request = self.find_request(ctx, request_id).await?;
        if request.status != RequestStatus::Pending {
            return Err(invalid_transition(request.status, target));
        }

        let mut active: loan_request::ActiveModel = request.into();
        active.status = Set(target);
        active.reviewed_by = Set(Some(ctx.user_id));
        active.reviewed_at = Set(Some(Utc::now()));
        active.review_notes = Set(notes);
        active.updated_at = Set(Utc::now());
        Ok(active.update(self.db.as_ref()).await?)
    }
}

fn invalid_transition(from: RequestStatus, to: RequestStatus) -> ServiceError {
    ServiceError::InvalidTransition {
        entity: "loan_request",
        from: from.to_string(),
        to: to.to_string(),
    }
}
