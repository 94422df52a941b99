//! Shared test harness: in-memory SQLite with the schema created from the
//! entity definitions, plus pre-built identities for two tenants.

#![allow(dead_code)]

use packstock_api::{
    auth::{AuthContext, Role},
    db,
    entities::material::UnitOfMeasure,
    events,
    services::{
        extensions::ExtensionService,
        loan_requests::LoanRequestService,
        loans::LoanService,
        materials::{CreateCategoryInput, CreateMaterialInput, MaterialService},
    },
};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use uuid::Uuid;

pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub event_sender: events::EventSender,
    _db_dir: tempfile::TempDir,
    pub materials: MaterialService,
    pub requests: LoanRequestService,
    pub loans: LoanService,
    pub extensions: ExtensionService,
    /// Manager in the primary tenant.
    pub manager: AuthContext,
    /// Employee in the primary tenant.
    pub employee: AuthContext,
    /// Manager in an unrelated tenant.
    pub other_manager: AuthContext,
}

pub async fn spawn_app() -> TestApp {
    // File-backed SQLite with a single pooled connection, so every handle
    // sees the same database.
    let db_dir = tempfile::tempdir().expect("temp dir");
    let db_path = db_dir.path().join("packstock_test.db");
    let mut opts = ConnectOptions::new(format!("sqlite://{}?mode=rwc", db_path.display()));
    opts.max_connections(1).min_connections(1);

    let conn = Database::connect(opts).await.expect("test sqlite database");
    db::create_schema(&conn).await.expect("schema creation");
    let db = Arc::new(conn);

    let (event_sender, event_rx) = events::channel(64);
    tokio::spawn(events::run_audit_writer(db.clone(), event_rx));

    let account_id = Uuid::new_v4();
    let other_account_id = Uuid::new_v4();

    TestApp {
        materials: MaterialService::new(db.clone(), event_sender.clone()),
        requests: LoanRequestService::new(db.clone(), event_sender.clone()),
        loans: LoanService::new(db.clone(), event_sender.clone()),
        extensions: ExtensionService::new(db.clone(), event_sender.clone()),
        event_sender,
        db,
        _db_dir: db_dir,
        manager: AuthContext::new(account_id, Uuid::new_v4(), Role::InventoryManager),
        employee: AuthContext::new(account_id, Uuid::new_v4(), Role::Employee),
        other_manager: AuthContext::new(other_account_id, Uuid::new_v4(), Role::InventoryManager),
    }
}

impl TestApp {
    pub async fn seed_category(&self, name: &str, is_consumable: bool) -> Uuid {
        self.materials
            .create_category(
                &self.manager,
                CreateCategoryInput {
                    name: name.to_string(),
                    description: None,
                    is_consumable,
                },
            )
            .await
            .expect("seed category")
            .id
    }

    pub async fn seed_material(&self, category_id: Uuid, name: &str, quantity: i32) -> Uuid {
        self.materials
            .create_material(
                &self.manager,
                CreateMaterialInput {
                    category_id,
                    location_id: None,
                    name: name.to_string(),
                    description: None,
                    sku: format!("SKU-{}", Uuid::new_v4().simple()),
                    barcode: None,
                    quantity,
                    available_quantity: None,
                    unit_of_measure: UnitOfMeasure::Unit,
                    min_stock_level: 0,
                    reorder_quantity: 0,
                    image_url: None,
                    requires_facial_auth: false,
                },
            )
            .await
            .expect("seed material")
            .id
    }

    /// A non-consumable material ready to loan.
    pub async fn seed_tool(&self, name: &str, quantity: i32) -> Uuid {
        let category_id = self
            .seed_category(&format!("{} category", name), false)
            .await;
        self.seed_material(category_id, name, quantity).await
    }

    /// A consumable material ready to draw down.
    pub async fn seed_consumable(&self, name: &str, quantity: i32) -> Uuid {
        let category_id = self
            .seed_category(&format!("{} category", name), true)
            .await;
        self.seed_material(category_id, name, quantity).await
    }
}
