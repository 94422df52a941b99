mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::spawn_app;
use packstock_api::{
    entities::loan::ConditionRating,
    errors::ServiceError,
    services::{
        extensions::CreateExtensionInput,
        loan_requests::{CreateLoanRequestInput, RequestItemInput},
        loans::IssueLoanInput,
    },
};

#[tokio::test]
async fn materials_are_invisible_across_accounts() {
    let app = spawn_app().await;
    let material_id = app.seed_tool("Plasma cutter", 2).await;

    let err = app
        .materials
        .get_material(&app.other_manager, material_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let err = app
        .materials
        .consume(&app.other_manager, material_id, 1)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let (listed, total) = app
        .materials
        .list_materials(&app.other_manager, Default::default(), 1, 50)
        .await
        .unwrap();
    assert!(listed.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn qr_lookup_is_account_scoped() {
    let app = spawn_app().await;
    let material_id = app.seed_tool("Borescope", 1).await;
    let material = app
        .materials
        .get_material(&app.manager, material_id)
        .await
        .unwrap();

    let err = app
        .materials
        .get_material_by_qr(&app.other_manager, &material.qr_code)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn requests_cannot_be_reviewed_across_accounts() {
    let app = spawn_app().await;
    let material_id = app.seed_tool("Telescope", 2).await;
    let today = Utc::now().date_naive();

    let detail = app
        .requests
        .create_request(
            &app.employee,
            CreateLoanRequestInput {
                desired_pickup_date: today,
                desired_return_date: today + Duration::days(3),
                purpose: None,
                items: vec![RequestItemInput {
                    material_id,
                    quantity_requested: 1,
                }],
            },
        )
        .await
        .unwrap();

    let err = app
        .requests
        .approve(&app.other_manager, detail.request.id, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let err = app
        .requests
        .get_request(&app.other_manager, detail.request.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn loans_and_extensions_are_account_scoped() {
    let app = spawn_app().await;
    let material_id = app.seed_tool("Crane scale", 2).await;

    let loan = app
        .loans
        .issue_loan(
            &app.manager,
            IssueLoanInput {
                borrower_id: app.employee.user_id,
                material_id,
                quantity: 1,
                loan_request_id: None,
                expected_return_date: Some(Utc::now().date_naive() + Duration::days(7)),
                condition_on_pickup: ConditionRating::Good,
                pickup_signature: None,
            },
        )
        .await
        .unwrap();

    let err = app
        .loans
        .get_loan(&app.other_manager, loan.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let err = app
        .extensions
        .create_extension(
            &app.other_manager,
            CreateExtensionInput {
                loan_id: loan.id,
                new_return_date: Utc::now().date_naive() + Duration::days(10),
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let ext = app
        .extensions
        .create_extension(
            &app.employee,
            CreateExtensionInput {
                loan_id: loan.id,
                new_return_date: Utc::now().date_naive() + Duration::days(10),
                reason: None,
            },
        )
        .await
        .unwrap();
    let err = app
        .extensions
        .approve(&app.other_manager, ext.id, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn category_names_are_unique_per_account_not_globally() {
    let app = spawn_app().await;
    app.seed_category("Optics", false).await;

    // The same name in another account is fine.
    let created = app
        .materials
        .create_category(
            &app.other_manager,
            packstock_api::services::materials::CreateCategoryInput {
                name: "Optics".to_string(),
                description: None,
                is_consumable: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(created.account_id, app.other_manager.account_id);
}
