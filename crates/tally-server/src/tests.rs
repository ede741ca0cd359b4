//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use tally_core::db::Database;
use tempfile::TempDir;
use tower::ServiceExt;

fn open_config() -> ServerConfig {
    ServerConfig {
        require_auth: false,
        ..Default::default()
    }
}

/// Router plus the tempdir backing its uploads (kept alive for the test)
fn setup_test_app() -> (Router, TempDir) {
    let db = Database::in_memory().unwrap();
    setup_test_app_with_db(db)
}

fn setup_test_app_with_db(db: Database) -> (Router, TempDir) {
    let uploads = TempDir::new().unwrap();
    let app = create_router_with_options(
        db,
        None,
        open_config(),
        Some(uploads.path().to_path_buf()),
        None,
    );
    (app, uploads)
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get_body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn create_transaction(
    app: &Router,
    reference: &str,
    amount: f64,
    created_at: &str,
    merchant: Option<&str>,
) -> i64 {
    let mut body = serde_json::json!({
        "reference": reference,
        "amount": amount,
        "created_at": created_at,
    });
    if let Some(merchant) = merchant {
        body["merchant"] = serde_json::json!(merchant);
    }

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/transactions", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    get_body_json(response).await["id"].as_i64().unwrap()
}

async fn upload_receipt(app: &Router, query: &str, bytes: &[u8]) -> serde_json::Value {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/receipts?{}", query))
                .body(Body::from(bytes.to_vec()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    get_body_json(response).await
}

// ========== Transaction API Tests ==========

#[tokio::test]
async fn test_list_transactions_empty() {
    let (app, _uploads) = setup_test_app();

    let response = app.oneshot(get("/api/transactions")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["total"], 0);
    assert!(json["transactions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_and_get_transaction() {
    let (app, _uploads) = setup_test_app();

    let id = create_transaction(&app, "TRX-7845", 1299.0, "2025-04-14T09:00:00Z", Some("ElectroMart")).await;

    let response = app
        .oneshot(get(&format!("/api/transactions/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["reference"], "TRX-7845");
    assert_eq!(json["amount"], 1299.0);
    assert_eq!(json["merchant"], "ElectroMart");
    assert_eq!(json["status"], "completed");
    assert!(json["receipt_id"].is_null());
}

#[tokio::test]
async fn test_duplicate_transaction_conflicts() {
    let (app, _uploads) = setup_test_app();
    create_transaction(&app, "TRX-1", 10.0, "2025-01-01T00:00:00Z", None).await;

    let body = serde_json::json!({
        "reference": "TRX-1",
        "amount": 10.0,
        "created_at": "2025-01-01T00:00:00Z",
    });
    let response = app
        .oneshot(json_request("POST", "/api/transactions", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_create_transaction_rejects_bad_status() {
    let (app, _uploads) = setup_test_app();

    let body = serde_json::json!({
        "reference": "TRX-1",
        "amount": 10.0,
        "status": "sideways",
    });
    let response = app
        .oneshot(json_request("POST", "/api/transactions", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transaction_not_found() {
    let (app, _uploads) = setup_test_app();

    let response = app.oneshot(get("/api/transactions/99999")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_transaction_status() {
    let (app, _uploads) = setup_test_app();
    let id = create_transaction(&app, "TRX-1", 10.0, "2025-01-01T00:00:00Z", None).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/transactions/{}/status", id),
            serde_json::json!({"status": "refunded"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await["status"], "refunded");

    // Unknown status is a client error
    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/api/transactions/{}/status", id),
            serde_json::json!({"status": "sideways"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transaction_filters() {
    let (app, _uploads) = setup_test_app();
    create_transaction(&app, "TRX-1", 10.0, "2025-01-01T00:00:00Z", Some("ElectroMart")).await;
    let id = create_transaction(&app, "TRX-2", 500.0, "2025-02-01T00:00:00Z", None).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/transactions/{}/status", id),
            serde_json::json!({"status": "pending"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get("/api/transactions?status=pending"))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["transactions"][0]["reference"], "TRX-2");

    let response = app
        .clone()
        .oneshot(get("/api/transactions?search=electro"))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["transactions"][0]["reference"], "TRX-1");

    // Invalid status in the filter is a client error
    let response = app
        .oneshot(get("/api/transactions?status=sideways"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transaction_stats() {
    let (app, _uploads) = setup_test_app();
    create_transaction(&app, "TRX-1", 10.0, "2025-01-01T00:00:00Z", None).await;
    create_transaction(&app, "TRX-2", 30.0, "2025-01-02T00:00:00Z", None).await;

    let response = app.oneshot(get("/api/transactions/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["total"]["count"], 2);
    assert_eq!(json["total"]["amount"], 40.0);
    assert_eq!(json["avg_amount"], 20.0);
}

// ========== Receipt API Tests ==========

#[tokio::test]
async fn test_upload_receipt_and_duplicate_rejection() {
    let (app, _uploads) = setup_test_app();

    let receipt = upload_receipt(
        &app,
        "filename=lunch.jpg&amount=12.50&merchant=Cafe&date=2025-03-01",
        b"fake image bytes",
    )
    .await;
    assert_eq!(receipt["filename"], "lunch.jpg");
    assert_eq!(receipt["amount"], 12.5);
    assert_eq!(receipt["status"], "unmatched");
    assert_eq!(receipt["receipt_date"], "2025-03-01");

    // Same bytes again is a duplicate
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/receipts?filename=lunch-again.jpg")
                .body(Body::from(&b"fake image bytes"[..]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Empty body is rejected
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/receipts")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_receipt_image_round_trip() {
    let (app, _uploads) = setup_test_app();

    let receipt = upload_receipt(&app, "filename=r.jpg", b"image-bytes-here").await;
    let id = receipt["id"].as_i64().unwrap();

    let response = app
        .oneshot(get(&format!("/api/receipts/{}/image", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["filename"], "r.jpg");
    let decoded = {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(json["content_base64"].as_str().unwrap())
            .unwrap()
    };
    assert_eq!(decoded, b"image-bytes-here");
}

#[tokio::test]
async fn test_receipt_candidates_ranked() {
    let (app, _uploads) = setup_test_app();

    create_transaction(&app, "TRX-FAR", 500.0, "2025-04-01T12:00:00Z", None).await;
    let close = create_transaction(&app, "TRX-CLOSE", 103.0, "2025-04-13T12:00:00Z", Some("ElectroMart")).await;
    let exact = create_transaction(&app, "TRX-EXACT", 100.0, "2025-04-14T12:00:00Z", Some("ElectroMart")).await;

    let receipt = upload_receipt(
        &app,
        "filename=tv.pdf&amount=100.00&merchant=ElectroMart&date=2025-04-14",
        b"tv receipt",
    )
    .await;
    let id = receipt["id"].as_i64().unwrap();

    let response = app
        .oneshot(get(&format!("/api/receipts/{}/candidates", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["total_matches"], 2);
    let matches = json["matches"].as_array().unwrap();
    assert_eq!(matches[0]["transaction_id"], exact);
    assert_eq!(matches[0]["confidence"], 100);
    assert_eq!(
        matches[0]["reasons"],
        serde_json::json!([
            "Amount matches exactly",
            "Date matches exactly",
            "Merchant name matches exactly"
        ])
    );
    assert_eq!(matches[1]["transaction_id"], close);
    // Denormalized snapshot is present for display
    assert_eq!(matches[0]["transaction"]["reference"], "TRX-EXACT");
}

#[tokio::test]
async fn test_candidates_empty_without_amount() {
    let (app, _uploads) = setup_test_app();
    create_transaction(&app, "TRX-1", 100.0, "2025-04-14T12:00:00Z", None).await;

    // No amount on the receipt: no candidates, but the receipt comes back so
    // the caller can tell "cannot compute" from "zero hits"
    let receipt = upload_receipt(&app, "filename=blurry.jpg", b"blurry scan").await;
    let id = receipt["id"].as_i64().unwrap();

    let response = app
        .oneshot(get(&format!("/api/receipts/{}/candidates", id)))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["total_matches"], 0);
    assert!(json["matches"].as_array().unwrap().is_empty());
    assert!(json["receipt"]["amount"].is_null());
}

#[tokio::test]
async fn test_link_and_unlink_receipt() {
    let (app, _uploads) = setup_test_app();
    let tx_id = create_transaction(&app, "TRX-1", 12.5, "2025-03-01T12:00:00Z", None).await;
    let other_tx = create_transaction(&app, "TRX-2", 99.0, "2025-03-02T12:00:00Z", None).await;

    let receipt = upload_receipt(&app, "filename=r.jpg&amount=12.50", b"r1").await;
    let receipt_id = receipt["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/receipts/{}/link", receipt_id),
            serde_json::json!({"transaction_id": tx_id}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["status"], "matched");
    assert_eq!(json["transaction_id"], tx_id);

    // Transaction side is updated too
    let response = app
        .clone()
        .oneshot(get(&format!("/api/transactions/{}", tx_id)))
        .await
        .unwrap();
    assert_eq!(get_body_json(response).await["receipt_id"], receipt_id);

    // A second receipt cannot claim the same transaction
    let second = upload_receipt(&app, "filename=r2.jpg&amount=12.50", b"r2").await;
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/receipts/{}/link", second["id"].as_i64().unwrap()),
            serde_json::json!({"transaction_id": tx_id}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // An already-matched receipt cannot be re-linked
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/receipts/{}/link", receipt_id),
            serde_json::json!({"transaction_id": other_tx}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unlink releases both sides
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/receipts/{}/unlink", receipt_id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await["status"], "unmatched");

    let response = app
        .oneshot(get(&format!("/api/transactions/{}", tx_id)))
        .await
        .unwrap();
    assert!(get_body_json(response).await["receipt_id"].is_null());
}

#[tokio::test]
async fn test_auto_match_endpoint() {
    let (app, _uploads) = setup_test_app();
    let tx_id = create_transaction(&app, "TRX-1", 1299.0, "2025-04-14T09:00:00Z", Some("ElectroMart")).await;
    create_transaction(&app, "TRX-2", 20.0, "2025-01-01T09:00:00Z", None).await;

    let receipt = upload_receipt(
        &app,
        "filename=tv.pdf&amount=1299.00&merchant=ElectroMart&date=2025-04-14",
        b"tv",
    )
    .await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/receipts/auto-match",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["matched"], 1);
    assert_eq!(json["checked"], 1);

    let response = app
        .oneshot(get(&format!("/api/receipts/{}", receipt["id"].as_i64().unwrap())))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["status"], "matched");
    assert_eq!(json["transaction_id"], tx_id);
}

#[tokio::test]
async fn test_receipt_stats() {
    let (app, _uploads) = setup_test_app();
    let tx_id = create_transaction(&app, "TRX-1", 10.0, "2025-01-01T00:00:00Z", None).await;

    let matched = upload_receipt(&app, "filename=a.jpg&amount=10.00", b"a").await;
    upload_receipt(&app, "filename=b.jpg&amount=20.00", b"b").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/receipts/{}/link", matched["id"].as_i64().unwrap()),
            serde_json::json!({"transaction_id": tx_id}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/api/receipts/stats")).await.unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["total"], 2);
    assert_eq!(json["matched"], 1);
    assert_eq!(json["match_rate"], 50.0);
}

// ========== Shipment API Tests ==========

#[tokio::test]
async fn test_shipment_lifecycle() {
    let (app, _uploads) = setup_test_app();
    let tx_id = create_transaction(&app, "TRX-1", 10.0, "2025-01-01T00:00:00Z", None).await;

    // Carrier is inferred from the UPS tracking format
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/shipments",
            serde_json::json!({
                "tracking_number": "1Z999AA10123456784",
                "transaction_id": tx_id,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let shipment = get_body_json(response).await;
    assert_eq!(shipment["carrier"], "ups");
    assert_eq!(shipment["status"], "pending");
    let shipment_id = shipment["id"].as_i64().unwrap();

    // Status update appends a tracking event
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/shipments/{}/status", shipment_id),
            serde_json::json!({
                "status": "in_transit",
                "description": "Departed origin facility",
                "location": "Memphis, TN",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await["status"], "in_transit");

    let response = app
        .clone()
        .oneshot(get(&format!("/api/shipments/{}/events", shipment_id)))
        .await
        .unwrap();
    let events = get_body_json(response).await;
    assert_eq!(events.as_array().unwrap().len(), 2);

    let response = app.clone().oneshot(get("/api/shipments/stats")).await.unwrap();
    let stats = get_body_json(response).await;
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["in_transit"], 1);

    // Delete releases the transaction link
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/shipments/{}", shipment_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get(&format!("/api/transactions/{}", tx_id)))
        .await
        .unwrap();
    assert!(get_body_json(response).await["shipment_id"].is_null());
}

// ========== Import/Export API Tests ==========

#[tokio::test]
async fn test_import_csv_and_export_round_trip() {
    let (app, _uploads) = setup_test_app();

    let csv = "\
Date,Reference,Amount,Currency,Status,Merchant,Customer Name,Customer Email
2025-04-14,TRX-7845,1299.00,USD,completed,ElectroMart,Ada Lovelace,ada@example.com
2025-04-15,TRX-7846,55.20,USD,pending,Cafe,,
";
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/import")
                .body(Body::from(csv))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = get_body_json(response).await;
    assert_eq!(report["imported"], 2);
    assert_eq!(report["skipped_duplicates"], 0);

    // Importing the same file again only skips
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/import")
                .body(Body::from(csv))
                .unwrap(),
        )
        .await
        .unwrap();
    let report = get_body_json(response).await;
    assert_eq!(report["imported"], 0);
    assert_eq!(report["skipped_duplicates"], 2);

    // Export includes what was imported
    let response = app
        .clone()
        .oneshot(get("/api/export/transactions"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/csv; charset=utf-8"
    );
    let exported = String::from_utf8(get_body_bytes(response).await).unwrap();
    assert!(exported.contains("TRX-7845"));
    assert!(exported.contains("ElectroMart"));

    // Full export gunzips to a JSON snapshot
    let response = app.oneshot(get("/api/export/full")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = get_body_bytes(response).await;
    let mut decoder = flate2::read::GzDecoder::new(bytes.as_slice());
    let mut json = String::new();
    std::io::Read::read_to_string(&mut decoder, &mut json).unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(snapshot["transactions"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_import_profile() {
    let (app, _uploads) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/import?profile=nonexistent")
                .body(Body::from("Date,Amount\n"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ========== Provider Sync Tests ==========

/// Stub provider feed serving two credit card records
async fn spawn_stub_provider() -> String {
    use axum::routing::get as axum_get;

    let feed = Router::new().route(
        "/credit_card/transactions",
        axum_get(|| async {
            Json(serde_json::json!([
                {
                    "id": "cc_a1b2c3d4",
                    "amount": 1299.0,
                    "status": "completed",
                    "created_at": "2025-04-14T09:00:00Z",
                    "merchant": "ElectroMart"
                },
                {
                    "id": "cc_e5f6a7b8",
                    "amount": 55.20,
                    "merchant": "Cafe"
                }
            ]))
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, feed).await.unwrap();
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_source_sync_pulls_provider_feed() {
    let base_url = spawn_stub_provider().await;

    let db = Database::in_memory().unwrap();
    let uploads = TempDir::new().unwrap();
    let app = create_router_with_options(
        db,
        None,
        open_config(),
        Some(uploads.path().to_path_buf()),
        Some(ProviderClient::new(&base_url).unwrap()),
    );

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/sources/credit_card/sync",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["pulled"], 2);
    assert_eq!(json["imported"], 2);

    // Second sync only skips duplicates
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/sources/credit_card/sync",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["imported"], 0);
    assert_eq!(json["skipped_duplicates"], 2);

    let response = app.oneshot(get("/api/transactions?search=cc_a1b2")).await.unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["transactions"][0]["source"], "credit_card");
}

#[tokio::test]
async fn test_sync_without_provider_is_client_error() {
    let (app, _uploads) = setup_test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/sources/credit_card/sync",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ========== Audit Log Tests ==========

#[tokio::test]
async fn test_requests_are_audited() {
    let (app, _uploads) = setup_test_app();
    create_transaction(&app, "TRX-1", 10.0, "2025-01-01T00:00:00Z", None).await;

    let response = app.oneshot(get("/api/audit")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let entries = get_body_json(response).await;
    let entries = entries.as_array().unwrap();
    assert!(!entries.is_empty());
    assert!(entries
        .iter()
        .any(|e| e["action"] == "create" && e["entity_type"] == "transaction"));
    assert_eq!(entries[0]["user_email"], "local-dev");
}

// ========== Auth Tests ==========

#[tokio::test]
async fn test_auth_required_by_default() {
    let db = Database::in_memory().unwrap();
    let app = create_router(db, None, ServerConfig::default());

    let response = app.oneshot(get("/api/transactions")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_api_key_auth() {
    let db = Database::in_memory().unwrap();
    let config = ServerConfig {
        api_keys: vec!["test-key-123".to_string()],
        ..Default::default()
    };
    let app = create_router(db, None, config);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/transactions")
                .header("authorization", "Bearer test-key-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/transactions")
                .header("authorization", "Bearer wrong-key-456")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_issues_working_session_token() {
    let db = Database::in_memory().unwrap();
    let config = ServerConfig {
        jwt_secret: "test-secret".to_string(),
        users: vec![UserCredential {
            email: "ada@example.com".to_string(),
            password: "hunter2hunter2".to_string(),
        }],
        ..Default::default()
    };
    let app = create_router(db, None, config);

    // Login is reachable without auth
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            serde_json::json!({"email": "ada@example.com", "password": "hunter2hunter2"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    let token = json["token"].as_str().unwrap().to_string();
    assert_eq!(json["email"], "ada@example.com");

    // The token authenticates API requests and /me reports the identity
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await["email"], "ada@example.com");

    // Bad credentials are rejected without detail
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            serde_json::json!({"email": "ada@example.com", "password": "wrong-password"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
