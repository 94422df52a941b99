mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::{spawn_app, TestApp};
use packstock_api::{
    entities::{
        loan::{ConditionRating, LoanStatus},
        material::MaterialStatus,
    },
    errors::ServiceError,
    services::{
        loan_requests::{CreateLoanRequestInput, RequestItemInput},
        loans::{IssueLoanInput, ReturnLoanInput},
        materials::UpdateMaterialInput,
    },
};
use sea_orm::ModelTrait;
use uuid::Uuid;

fn issue_input(app: &TestApp, material_id: Uuid, quantity: i32) -> IssueLoanInput {
    IssueLoanInput {
        borrower_id: app.employee.user_id,
        material_id,
        quantity,
        loan_request_id: None,
        expected_return_date: Some(Utc::now().date_naive() + Duration::days(7)),
        condition_on_pickup: ConditionRating::Good,
        pickup_signature: None,
    }
}

fn plain_return() -> ReturnLoanInput {
    ReturnLoanInput {
        condition_on_return: ConditionRating::Good,
        damage_notes: None,
        return_signature: None,
    }
}

#[tokio::test]
async fn returnable_stock_follows_loans_end_to_end() {
    let app = spawn_app().await;
    let material_id = app.seed_tool("Ratchet set", 5).await;
    app.materials
        .update_material(
            &app.manager,
            material_id,
            UpdateMaterialInput {
                min_stock_level: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let first = app
        .loans
        .issue_loan(&app.manager, issue_input(&app, material_id, 3))
        .await
        .unwrap();
    assert_eq!(first.status, LoanStatus::Active);

    let material = app
        .materials
        .get_material(&app.manager, material_id)
        .await
        .unwrap();
    assert_eq!(material.available_quantity, 2);
    assert_eq!(material.status, MaterialStatus::Available);
    assert!(material.is_low_stock());

    let second = app
        .loans
        .issue_loan(&app.manager, issue_input(&app, material_id, 2))
        .await
        .unwrap();
    assert_eq!(second.status, LoanStatus::Active);

    let material = app
        .materials
        .get_material(&app.manager, material_id)
        .await
        .unwrap();
    assert_eq!(material.available_quantity, 0);
    assert_eq!(material.status, MaterialStatus::OnLoan);

    let returned = app
        .loans
        .return_loan(&app.manager, first.id, plain_return())
        .await
        .unwrap();
    assert_eq!(returned.status, LoanStatus::Returned);
    assert_eq!(returned.quantity_returned, 3);
    assert!(returned.actual_return_date.is_some());

    let material = app
        .materials
        .get_material(&app.manager, material_id)
        .await
        .unwrap();
    assert_eq!(material.available_quantity, 3);
    assert_eq!(material.status, MaterialStatus::Available);
}

#[tokio::test]
async fn consumable_loans_are_born_returned() {
    let app = spawn_app().await;
    let material_id = app.seed_consumable("Epoxy", 50).await;

    let loan = app
        .loans
        .issue_loan(
            &app.manager,
            IssueLoanInput {
                borrower_id: app.employee.user_id,
                material_id,
                quantity: 45,
                loan_request_id: None,
                expected_return_date: None,
                condition_on_pickup: ConditionRating::Good,
                pickup_signature: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(loan.status, LoanStatus::Returned);
    assert!(loan.is_consumable_loan);
    assert_eq!(loan.expected_return_date, None);
    assert_eq!(loan.quantity_returned, loan.quantity_loaned);

    let material = app
        .materials
        .get_material(&app.manager, material_id)
        .await
        .unwrap();
    assert_eq!(material.quantity, 5);
    assert_eq!(material.available_quantity, 5);
}

#[tokio::test]
async fn issuing_beyond_availability_fails_hard() {
    let app = spawn_app().await;
    let material_id = app.seed_tool("Impact driver", 2).await;

    app.loans
        .issue_loan(&app.manager, issue_input(&app, material_id, 2))
        .await
        .unwrap();

    let err = app
        .loans
        .issue_loan(&app.manager, issue_input(&app, material_id, 1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));
}

#[tokio::test]
async fn non_consumable_loans_require_a_due_date() {
    let app = spawn_app().await;
    let material_id = app.seed_tool("Torque wrench", 2).await;

    let mut input = issue_input(&app, material_id, 1);
    input.expected_return_date = None;
    let err = app.loans.issue_loan(&app.manager, input).await.unwrap_err();
    assert_matches!(err, ServiceError::Validation(_));
}

#[tokio::test]
async fn issuing_with_a_past_due_date_starts_overdue() {
    let app = spawn_app().await;
    let material_id = app.seed_tool("Sander", 1).await;

    let mut input = issue_input(&app, material_id, 1);
    input.expected_return_date = Some(Utc::now().date_naive() - Duration::days(3));
    let loan = app.loans.issue_loan(&app.manager, input).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Overdue);
}

#[tokio::test]
async fn only_managers_issue_loans() {
    let app = spawn_app().await;
    let material_id = app.seed_tool("Grinder", 2).await;

    let err = app
        .loans
        .issue_loan(&app.employee, issue_input(&app, material_id, 1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::PermissionDenied);
}

#[tokio::test]
async fn consumable_loans_cannot_be_returned() {
    let app = spawn_app().await;
    let material_id = app.seed_consumable("Primer", 10).await;

    let loan = app
        .loans
        .issue_loan(
            &app.manager,
            IssueLoanInput {
                borrower_id: app.employee.user_id,
                material_id,
                quantity: 2,
                loan_request_id: None,
                expected_return_date: None,
                condition_on_pickup: ConditionRating::Good,
                pickup_signature: None,
            },
        )
        .await
        .unwrap();

    let err = app
        .loans
        .return_loan(&app.manager, loan.id, plain_return())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ConsumableNotReturnable(_));
}

#[tokio::test]
async fn double_return_is_an_invalid_transition() {
    let app = spawn_app().await;
    let material_id = app.seed_tool("Pressure washer", 1).await;
    let loan = app
        .loans
        .issue_loan(&app.manager, issue_input(&app, material_id, 1))
        .await
        .unwrap();

    app.loans
        .return_loan(&app.manager, loan.id, plain_return())
        .await
        .unwrap();
    let err = app
        .loans
        .return_loan(&app.manager, loan.id, plain_return())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { entity: "loan", .. });
}

#[tokio::test]
async fn damaged_return_flags_the_material() {
    let app = spawn_app().await;
    let material_id = app.seed_tool("Laser level", 2).await;
    let loan = app
        .loans
        .issue_loan(&app.manager, issue_input(&app, material_id, 1))
        .await
        .unwrap();

    let returned = app
        .loans
        .return_loan(
            &app.manager,
            loan.id,
            ReturnLoanInput {
                condition_on_return: ConditionRating::Damaged,
                damage_notes: Some("cracked housing".to_string()),
                return_signature: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(returned.condition_on_return, Some(ConditionRating::Damaged));

    let material = app
        .materials
        .get_material(&app.manager, material_id)
        .await
        .unwrap();
    assert_eq!(material.status, MaterialStatus::Damaged);
    assert_eq!(material.available_quantity, 0);
    assert!(!material.can_be_loaned());
}

#[tokio::test]
async fn damaged_material_stays_unavailable_after_later_returns() {
    let app = spawn_app().await;
    let material_id = app.seed_tool("Thermal camera", 2).await;

    let first = app
        .loans
        .issue_loan(&app.manager, issue_input(&app, material_id, 1))
        .await
        .unwrap();
    let second = app
        .loans
        .issue_loan(&app.manager, issue_input(&app, material_id, 1))
        .await
        .unwrap();

    app.loans
        .return_loan(
            &app.manager,
            first.id,
            ReturnLoanInput {
                condition_on_return: ConditionRating::Damaged,
                damage_notes: Some("dropped".to_string()),
                return_signature: None,
            },
        )
        .await
        .unwrap();

    // Returning the second loan must not put damaged stock back on the shelf.
    app.loans
        .return_loan(&app.manager, second.id, plain_return())
        .await
        .unwrap();

    let material = app
        .materials
        .get_material(&app.manager, material_id)
        .await
        .unwrap();
    assert_eq!(material.status, MaterialStatus::Damaged);
    assert_eq!(material.available_quantity, 0);
    assert!(!material.can_be_loaned());
}

#[tokio::test]
async fn fully_loaned_material_rejects_issuance_as_insufficient_stock() {
    let app = spawn_app().await;
    let material_id = app.seed_tool("Rotary hammer", 2).await;

    app.loans
        .issue_loan(&app.manager, issue_input(&app, material_id, 2))
        .await
        .unwrap();
    let material = app
        .materials
        .get_material(&app.manager, material_id)
        .await
        .unwrap();
    assert_eq!(material.status, MaterialStatus::OnLoan);
    assert_eq!(material.available_quantity, 0);

    let err = app
        .loans
        .issue_loan(&app.manager, issue_input(&app, material_id, 1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));
}

#[tokio::test]
async fn blocked_status_material_rejects_issuance_outright() {
    let app = spawn_app().await;
    let material_id = app.seed_tool("Bench grinder", 2).await;
    app.materials
        .update_material(
            &app.manager,
            material_id,
            UpdateMaterialInput {
                status: Some(MaterialStatus::Maintenance),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = app
        .loans
        .issue_loan(&app.manager, issue_input(&app, material_id, 1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Validation(_));
}

#[tokio::test]
async fn issued_loans_link_back_to_their_request() {
    let app = spawn_app().await;
    let material_id = app.seed_tool("Beam clamp", 2).await;
    let today = Utc::now().date_naive();

    let detail = app
        .requests
        .create_request(
            &app.employee,
            CreateLoanRequestInput {
                desired_pickup_date: today,
                desired_return_date: today + Duration::days(7),
                purpose: None,
                items: vec![RequestItemInput {
                    material_id,
                    quantity_requested: 1,
                }],
            },
        )
        .await
        .unwrap();
    app.requests
        .approve(&app.manager, detail.request.id, None)
        .await
        .unwrap();

    let mut input = issue_input(&app, material_id, 1);
    input.loan_request_id = Some(detail.request.id);
    let loan = app.loans.issue_loan(&app.manager, input).await.unwrap();

    let request = loan
        .find_related(packstock_api::entities::LoanRequest)
        .one(app.db.as_ref())
        .await
        .unwrap()
        .expect("linked request");
    assert_eq!(request.id, detail.request.id);
}

#[tokio::test]
async fn lost_loans_stop_counting_as_outstanding() {
    let app = spawn_app().await;
    let material_id = app.seed_tool("Surveying kit", 3).await;
    let loan = app
        .loans
        .issue_loan(&app.manager, issue_input(&app, material_id, 2))
        .await
        .unwrap();

    let lost = app
        .loans
        .mark_lost(&app.manager, loan.id, Some("never came back".to_string()))
        .await
        .unwrap();
    assert_eq!(lost.status, LoanStatus::Lost);

    // The lost units leave the owned quantity; the remainder is available.
    let material = app
        .materials
        .get_material(&app.manager, material_id)
        .await
        .unwrap();
    assert_eq!(material.quantity, 1);
    assert_eq!(material.available_quantity, 1);
}

#[tokio::test]
async fn facial_auth_is_independent_of_loan_state() {
    let app = spawn_app().await;
    let material_id = app.seed_tool("Spectrometer", 1).await;
    let loan = app
        .loans
        .issue_loan(&app.manager, issue_input(&app, material_id, 1))
        .await
        .unwrap();
    assert!(!loan.facial_auth_verified);

    let verified = app
        .loans
        .verify_facial_auth(&app.employee, loan.id)
        .await
        .unwrap();
    assert!(verified.facial_auth_verified);
    assert!(verified.facial_auth_at.is_some());
    assert_eq!(verified.status, LoanStatus::Active);
}

#[tokio::test]
async fn overdue_sweep_flips_exactly_the_past_due_loans() {
    let app = spawn_app().await;
    let material_id = app.seed_tool("Camera rig", 4).await;

    let mut past_due = issue_input(&app, material_id, 1);
    past_due.expected_return_date = Some(Utc::now().date_naive() + Duration::days(1));
    let stale = app.loans.issue_loan(&app.manager, past_due).await.unwrap();

    let fresh = app
        .loans
        .issue_loan(&app.manager, issue_input(&app, material_id, 1))
        .await
        .unwrap();

    // Pretend two days pass.
    let later = Utc::now().date_naive() + Duration::days(2);
    let flipped = app.loans.sweep_overdue(later).await.unwrap();
    assert_eq!(flipped, 1);

    let stale = app.loans.get_loan(&app.manager, stale.id).await.unwrap();
    assert_eq!(stale.status, LoanStatus::Overdue);
    let fresh = app.loans.get_loan(&app.manager, fresh.id).await.unwrap();
    assert_eq!(fresh.status, LoanStatus::Active);

    // Idempotent: a second pass finds nothing to flip.
    assert_eq!(app.loans.sweep_overdue(later).await.unwrap(), 0);
}

#[tokio::test]
async fn overdue_listing_includes_derived_and_persisted_overdues() {
    let app = spawn_app().await;
    let material_id = app.seed_tool("Drone", 2).await;

    let mut input = issue_input(&app, material_id, 1);
    input.expected_return_date = Some(Utc::now().date_naive() + Duration::days(1));
    let loan = app.loans.issue_loan(&app.manager, input).await.unwrap();

    // Past the due date but before any sweep: derived overdue only.
    let later = Utc::now().date_naive() + Duration::days(2);
    let overdue = app.loans.overdue_loans(&app.manager, later).await.unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].id, loan.id);
    assert_eq!(overdue[0].status, LoanStatus::Active);
}
