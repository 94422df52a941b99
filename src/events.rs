//! Domain events and the audit sink.
//!
//! Services publish events over an mpsc channel after their transaction
//! commits; a background writer appends them to `audit_logs`. The sink is
//! fire-and-forget: a full channel or a failed insert is logged and dropped,
//! never surfaced to the primary operation.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::audit_log;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    MaterialCreated {
        account_id: Uuid,
        actor_id: Uuid,
        material_id: Uuid,
    },
    MaterialConsumed {
        account_id: Uuid,
        actor_id: Uuid,
        material_id: Uuid,
        quantity: i32,
        remaining: i32,
    },
    StockReturned {
        account_id: Uuid,
        actor_id: Uuid,
        material_id: Uuid,
        quantity: i32,
        available: i32,
    },
    AvailabilityRecomputed {
        account_id: Uuid,
        material_id: Uuid,
        available: i32,
    },
    LoanRequestSubmitted {
        account_id: Uuid,
        actor_id: Uuid,
        request_id: Uuid,
        item_count: usize,
    },
    LoanRequestApproved {
        account_id: Uuid,
        actor_id: Uuid,
        request_id: Uuid,
    },
    LoanRequestRejected {
        account_id: Uuid,
        actor_id: Uuid,
        request_id: Uuid,
    },
    LoanRequestCancelled {
        account_id: Uuid,
        actor_id: Uuid,
        request_id: Uuid,
    },
    LoanRequestCompleted {
        account_id: Uuid,
        actor_id: Uuid,
        request_id: Uuid,
    },
    LoanIssued {
        account_id: Uuid,
        actor_id: Uuid,
        loan_id: Uuid,
        material_id: Uuid,
        quantity: i32,
        consumable: bool,
    },
    LoanReturned {
        account_id: Uuid,
        actor_id: Uuid,
        loan_id: Uuid,
        material_id: Uuid,
        quantity: i32,
        damaged: bool,
    },
    LoanLost {
        account_id: Uuid,
        actor_id: Uuid,
        loan_id: Uuid,
    },
    LoanOverdue {
        account_id: Uuid,
        loan_id: Uuid,
    },
    FacialAuthVerified {
        account_id: Uuid,
        actor_id: Uuid,
        loan_id: Uuid,
    },
    ExtensionRequested {
        account_id: Uuid,
        actor_id: Uuid,
        extension_id: Uuid,
        loan_id: Uuid,
    },
    ExtensionApproved {
        account_id: Uuid,
        actor_id: Uuid,
        extension_id: Uuid,
        loan_id: Uuid,
    },
    ExtensionRejected {
        account_id: Uuid,
        actor_id: Uuid,
        extension_id: Uuid,
        loan_id: Uuid,
    },
}

impl Event {
    /// Audit action kind recorded for this event.
    pub fn audit_action(&self) -> &'static str {
        match self {
            Event::MaterialCreated { .. } => "create",
            Event::MaterialConsumed { .. } => "material_consume",
            Event::StockReturned { .. } => "stock_update",
            Event::AvailabilityRecomputed { .. } => "stock_update",
            Event::LoanRequestSubmitted { .. } => "create",
            Event::LoanRequestApproved { .. } => "approve",
            Event::LoanRequestRejected { .. } => "reject",
            Event::LoanRequestCancelled { .. } => "cancel",
            Event::LoanRequestCompleted { .. } => "complete",
            Event::LoanIssued { .. } => "loan_issue",
            Event::LoanReturned { .. } => "loan_return",
            Event::LoanLost { .. } => "loan_lost",
            Event::LoanOverdue { .. } => "loan_overdue",
            Event::FacialAuthVerified { .. } => "facial_auth",
            Event::ExtensionRequested { .. } => "extension_request",
            Event::ExtensionApproved { .. } => "extension_approved",
            Event::ExtensionRejected { .. } => "extension_rejected",
        }
    }

    fn audit_parts(&self) -> (Option<Uuid>, Option<Uuid>, Option<&'static str>, Option<Uuid>) {
        match *self {
            Event::MaterialCreated {
                account_id,
                actor_id,
                material_id,
            } => (Some(account_id), Some(actor_id), Some("materials"), Some(material_id)),
            Event::MaterialConsumed {
                account_id,
                actor_id,
                material_id,
                ..
            } => (Some(account_id), Some(actor_id), Some("materials"), Some(material_id)),
            Event::StockReturned {
                account_id,
                actor_id,
                material_id,
                ..
            } => (Some(account_id), Some(actor_id), Some("materials"), Some(material_id)),
            Event::AvailabilityRecomputed {
                account_id,
                material_id,
                ..
            } => (Some(account_id), None, Some("materials"), Some(material_id)),
            Event::LoanRequestSubmitted {
                account_id,
                actor_id,
                request_id,
                ..
            }
            | Event::LoanRequestApproved {
                account_id,
                actor_id,
                request_id,
            }
            | Event::LoanRequestRejected {
                account_id,
                actor_id,
                request_id,
            }
            | Event::LoanRequestCancelled {
                account_id,
                actor_id,
                request_id,
            }
            | Event::LoanRequestCompleted {
                account_id,
                actor_id,
                request_id,
            } => (Some(account_id), Some(actor_id), Some("loan_requests"), Some(request_id)),
            Event::LoanIssued {
                account_id,
                actor_id,
                loan_id,
                ..
            }
            | Event::LoanReturned {
                account_id,
                actor_id,
                loan_id,
                ..
            }
            | Event::LoanLost {
                account_id,
                actor_id,
                loan_id,
            }
            | Event::FacialAuthVerified {
                account_id,
                actor_id,
                loan_id,
            } => (Some(account_id), Some(actor_id), Some("loans"), Some(loan_id)),
            Event::LoanOverdue {
                account_id,
                loan_id,
            } => (Some(account_id), None, Some("loans"), Some(loan_id)),
            Event::ExtensionRequested {
                account_id,
                actor_id,
                extension_id,
                ..
            }
            | Event::ExtensionApproved {
                account_id,
                actor_id,
                extension_id,
                ..
            }
            | Event::ExtensionRejected {
                account_id,
                actor_id,
                extension_id,
                ..
            } => (Some(account_id), Some(actor_id), Some("loan_extensions"), Some(extension_id)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Publish an event, logging instead of failing when the sink is
    /// unavailable. Audit delivery never gates the primary operation.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!("Dropping audit event, sink unavailable: {}", e);
        }
    }
}

/// Create a bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drain the event channel into `audit_logs`. Runs until the channel closes.
pub async fn run_audit_writer(db: Arc<DbPool>, mut rx: mpsc::Receiver<Event>) {
    info!("Audit writer started");

    while let Some(event) = rx.recv().await {
        let (account_id, user_id, table_name, record_id) = event.audit_parts();
        let changes = serde_json::to_value(&event).ok();

        let entry = audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(account_id),
            user_id: Set(user_id),
            action: Set(event.audit_action().to_string()),
            table_name: Set(table_name.map(str::to_string)),
            record_id: Set(record_id),
            changes: Set(changes),
            description: Set(None),
            created_at: Set(Utc::now()),
        };

        if let Err(e) = entry.insert(db.as_ref()).await {
            error!(action = event.audit_action(), "Failed to append audit record: {}", e);
        }
    }

    info!("Audit writer stopped");
}
