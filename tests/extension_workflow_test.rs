mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::{spawn_app, TestApp};
use packstock_api::{
    entities::{
        loan::{ConditionRating, LoanStatus},
        loan_extension::ExtensionStatus,
    },
    errors::ServiceError,
    services::{extensions::CreateExtensionInput, loans::IssueLoanInput},
};
use uuid::Uuid;

async fn issue_tool_loan(app: &TestApp, days_until_due: i64) -> (Uuid, Uuid) {
    let material_id = app.seed_tool("Endoscope", 2).await;
    let loan = app
        .loans
        .issue_loan(
            &app.manager,
            IssueLoanInput {
                borrower_id: app.employee.user_id,
                material_id,
                quantity: 1,
                loan_request_id: None,
                expected_return_date: Some(Utc::now().date_naive() + Duration::days(days_until_due)),
                condition_on_pickup: ConditionRating::Good,
                pickup_signature: None,
            },
        )
        .await
        .expect("issue loan");
    (loan.id, material_id)
}

#[tokio::test]
async fn borrower_can_request_an_extension() {
    let app = spawn_app().await;
    let (loan_id, _) = issue_tool_loan(&app, 3).await;

    let ext = app
        .extensions
        .create_extension(
            &app.employee,
            CreateExtensionInput {
                loan_id,
                new_return_date: Utc::now().date_naive() + Duration::days(10),
                reason: Some("project overran".to_string()),
            },
        )
        .await
        .unwrap();

    assert_eq!(ext.status, ExtensionStatus::Pending);
    assert_eq!(ext.requested_by, app.employee.user_id);
}

#[tokio::test]
async fn non_borrowers_cannot_request_extensions() {
    let app = spawn_app().await;
    let (loan_id, _) = issue_tool_loan(&app, 3).await;

    let stranger = packstock_api::auth::AuthContext::new(
        app.employee.account_id,
        Uuid::new_v4(),
        packstock_api::auth::Role::Employee,
    );
    let err = app
        .extensions
        .create_extension(
            &stranger,
            CreateExtensionInput {
                loan_id,
                new_return_date: Utc::now().date_naive() + Duration::days(10),
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::PermissionDenied);
}

#[tokio::test]
async fn extension_date_must_be_in_the_future() {
    let app = spawn_app().await;
    let (loan_id, _) = issue_tool_loan(&app, 3).await;

    let err = app
        .extensions
        .create_extension(
            &app.employee,
            CreateExtensionInput {
                loan_id,
                new_return_date: Utc::now().date_naive(),
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Validation(_));
}

#[tokio::test]
async fn consumable_loans_cannot_be_extended() {
    let app = spawn_app().await;
    let material_id = app.seed_consumable("Flux", 10).await;
    let loan = app
        .loans
        .issue_loan(
            &app.manager,
            IssueLoanInput {
                borrower_id: app.employee.user_id,
                material_id,
                quantity: 1,
                loan_request_id: None,
                expected_return_date: None,
                condition_on_pickup: ConditionRating::Good,
                pickup_signature: None,
            },
        )
        .await
        .unwrap();

    let err = app
        .extensions
        .create_extension(
            &app.employee,
            CreateExtensionInput {
                loan_id: loan.id,
                new_return_date: Utc::now().date_naive() + Duration::days(5),
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Validation(_));
}

#[tokio::test]
async fn approval_on_an_active_loan_only_moves_the_date() {
    let app = spawn_app().await;
    let (loan_id, _) = issue_tool_loan(&app, 3).await;
    let new_date = Utc::now().date_naive() + Duration::days(14);

    let ext = app
        .extensions
        .create_extension(
            &app.employee,
            CreateExtensionInput {
                loan_id,
                new_return_date: new_date,
                reason: None,
            },
        )
        .await
        .unwrap();

    let approved = app
        .extensions
        .approve(&app.manager, ext.id, Some("fine".to_string()))
        .await
        .unwrap();
    assert_eq!(approved.status, ExtensionStatus::Approved);
    assert_eq!(approved.reviewed_by, Some(app.manager.user_id));

    let loan = app.loans.get_loan(&app.manager, loan_id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(loan.expected_return_date, Some(new_date));
}

#[tokio::test]
async fn approval_reopens_an_overdue_loan() {
    let app = spawn_app().await;
    let (loan_id, _) = issue_tool_loan(&app, 1).await;

    // Let the sweep persist the overdue state.
    let later = Utc::now().date_naive() + Duration::days(2);
    app.loans.sweep_overdue(later).await.unwrap();
    let loan = app.loans.get_loan(&app.manager, loan_id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Overdue);

    let new_date = Utc::now().date_naive() + Duration::days(14);
    let ext = app
        .extensions
        .create_extension(
            &app.employee,
            CreateExtensionInput {
                loan_id,
                new_return_date: new_date,
                reason: None,
            },
        )
        .await
        .unwrap();
    app.extensions
        .approve(&app.manager, ext.id, None)
        .await
        .unwrap();

    let loan = app.loans.get_loan(&app.manager, loan_id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(loan.expected_return_date, Some(new_date));
}

#[tokio::test]
async fn rejection_is_stamp_only() {
    let app = spawn_app().await;
    let (loan_id, _) = issue_tool_loan(&app, 3).await;
    let original_due = app
        .loans
        .get_loan(&app.manager, loan_id)
        .await
        .unwrap()
        .expected_return_date;

    let ext = app
        .extensions
        .create_extension(
            &app.employee,
            CreateExtensionInput {
                loan_id,
                new_return_date: Utc::now().date_naive() + Duration::days(20),
                reason: None,
            },
        )
        .await
        .unwrap();

    let rejected = app
        .extensions
        .reject(&app.manager, ext.id, Some("too long".to_string()))
        .await
        .unwrap();
    assert_eq!(rejected.status, ExtensionStatus::Rejected);

    let loan = app.loans.get_loan(&app.manager, loan_id).await.unwrap();
    assert_eq!(loan.expected_return_date, original_due);
}

#[tokio::test]
async fn review_transitions_are_terminal() {
    let app = spawn_app().await;
    let (loan_id, _) = issue_tool_loan(&app, 3).await;

    let ext = app
        .extensions
        .create_extension(
            &app.employee,
            CreateExtensionInput {
                loan_id,
                new_return_date: Utc::now().date_naive() + Duration::days(10),
                reason: None,
            },
        )
        .await
        .unwrap();
    app.extensions
        .approve(&app.manager, ext.id, None)
        .await
        .unwrap();

    let err = app
        .extensions
        .approve(&app.manager, ext.id, None)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InvalidTransition {
            entity: "loan_extension",
            ..
        }
    );
    let err = app
        .extensions
        .reject(&app.manager, ext.id, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });
}

#[tokio::test]
async fn only_managers_review_extensions() {
    let app = spawn_app().await;
    let (loan_id, _) = issue_tool_loan(&app, 3).await;

    let ext = app
        .extensions
        .create_extension(
            &app.employee,
            CreateExtensionInput {
                loan_id,
                new_return_date: Utc::now().date_naive() + Duration::days(10),
                reason: None,
            },
        )
        .await
        .unwrap();

    let err = app
        .extensions
        .approve(&app.employee, ext.id, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::PermissionDenied);
}

#[tokio::test]
async fn returned_loans_cannot_be_extended() {
    let app = spawn_app().await;
    let (loan_id, _) = issue_tool_loan(&app, 3).await;
    app.loans
        .return_loan(
            &app.manager,
            loan_id,
            packstock_api::services::loans::ReturnLoanInput {
                condition_on_return: ConditionRating::Good,
                damage_notes: None,
                return_signature: None,
            },
        )
        .await
        .unwrap();

    let err = app
        .extensions
        .create_extension(
            &app.employee,
            CreateExtensionInput {
                loan_id,
                new_return_date: Utc::now().date_naive() + Duration::days(10),
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Validation(_));
}
