#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Document-number endpoint tests.

mod common;

use axum::http::StatusCode;
use chrono::{Datelike, Utc};
use serde_json::json;

use common::TestApp;
use procura_test_utils::{TestRecord, assert, purchase_order};

async fn next_number(app: &TestApp, type_key: &str) -> String {
    let (status, body) = app.get(&format!("/api/sequence?type={type_key}")).await;
    assert_eq!(status, StatusCode::OK, "sequence failed: {body}");
    assert::success(&body);
    body["nextNumber"].as_str().unwrap().to_string()
}

// ---- scanning generator ----

#[tokio::test]
async fn numbers_increase_as_records_are_saved() {
    let app = TestApp::new();
    let year = Utc::now().year();

    for n in 1..=4 {
        let number = next_number(&app, "PURCHASE_ORDER").await;
        assert_eq!(number, format!("PO-{year}-{n:03}"));
        app.create("purchaseOrders", &purchase_order(&number)).await;
    }
}

#[tokio::test]
async fn types_number_independently() {
    let app = TestApp::new();
    let year = Utc::now().year();

    let grn = next_number(&app, "GRN").await;
    app.create(
        "goodsReceivedNotes",
        &TestRecord::new()
            .with_field("grnNumber", grn.clone().into())
            .with_field("referenceNumber", format!("GRREF-{year}-007").into()),
    )
    .await;

    assert_eq!(grn, format!("GRN-{year}-001"));
    assert_eq!(next_number(&app, "GRN").await, format!("GRN-{year}-002"));
    assert_eq!(
        next_number(&app, "GRN_REFERENCE").await,
        format!("GRREF-{year}-008")
    );
    assert_eq!(
        next_number(&app, "GOODS_RETURN").await,
        format!("GRT-{year}-001")
    );
}

#[tokio::test]
async fn unsaved_numbers_are_issued_twice() {
    let app = TestApp::new();
    let year = Utc::now().year();
    app.create(
        "purchaseOrders",
        &purchase_order(&format!("PO-{year}-001")),
    )
    .await;

    let (first, second) = tokio::join!(
        next_number(&app, "PURCHASE_ORDER"),
        next_number(&app, "PURCHASE_ORDER")
    );
    assert_eq!(first, format!("PO-{year}-002"));
    assert_eq!(first, second);
}

#[tokio::test]
async fn deleted_records_still_hold_their_number() {
    let app = TestApp::new();
    let year = Utc::now().year();
    app.create(
        "purchaseOrders",
        &purchase_order(&format!("PO-{year}-005")).deleted(),
    )
    .await;

    assert_eq!(
        next_number(&app, "PURCHASE_ORDER").await,
        format!("PO-{year}-006")
    );
}

// ---- counter generator ----

#[tokio::test]
async fn counter_strategy_never_repeats() {
    let app = TestApp::with_counter_sequences();
    let year = Utc::now().year();

    let (first, second) = tokio::join!(
        next_number(&app, "PURCHASE_ORDER"),
        next_number(&app, "PURCHASE_ORDER")
    );
    assert_ne!(first, second);

    let mut issued = vec![first, second];
    issued.sort();
    assert_eq!(
        issued,
        vec![format!("PO-{year}-001"), format!("PO-{year}-002")]
    );
}

// ---- errors ----

#[tokio::test]
async fn unknown_or_missing_type_is_a_bad_request() {
    let app = TestApp::new();

    let (status, body) = app.get("/api/sequence?type=INVOICE").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert::failure(&body);
    assert_eq!(body["message"], json!("unknown sequence type: INVOICE"));

    let (status, body) = app.get("/api/sequence").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert::failure(&body);
    assert_eq!(
        body["message"],
        json!(
            "query parameter `type` is required \
             (one of: GOODS_RETURN, GRN, GRN_REFERENCE, PURCHASE_ORDER)"
        )
    );
}
