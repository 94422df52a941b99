//! Multi-tenant inventory loan-management backend.
//!
//! The crate is organized in three layers: `entities` (sea-orm models and
//! their pure derived reads), `services` (transactional domain operations,
//! always tenant-scoped through an explicit [`auth::AuthContext`]) and
//! `handlers` (the axum HTTP surface). Domain events flow through `events`
//! into an append-only audit log.

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod services;

use axum::response::Json;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    extensions::ExtensionService, loan_requests::LoanRequestService, loans::LoanService,
    materials::MaterialService,
};

/// Standard envelope for every successful API response.
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            errors: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { (total + limit - 1) / limit };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Shared application state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub event_sender: EventSender,
    materials: MaterialService,
    loan_requests: LoanRequestService,
    loans: LoanService,
    extensions: ExtensionService,
}

impl AppState {
    pub fn new(db: Arc<DbPool>, config: Arc<AppConfig>, event_sender: EventSender) -> Self {
        Self {
            materials: MaterialService::new(db.clone(), event_sender.clone()),
            loan_requests: LoanRequestService::new(db.clone(), event_sender.clone()),
            loans: LoanService::new(db.clone(), event_sender.clone()),
            extensions: ExtensionService::new(db.clone(), event_sender.clone()),
            db,
            config,
            event_sender,
        }
    }

    pub fn material_service(&self) -> &MaterialService {
        &self.materials
    }

    pub fn loan_request_service(&self) -> &LoanRequestService {
        &self.loan_requests
    }

    pub fn loan_service(&self) -> &LoanService {
        &self.loans
    }

    pub fn extension_service(&self) -> &ExtensionService {
        &self.extensions
    }
}
