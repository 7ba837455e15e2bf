use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use rules_hub_api::{create_router, ApiConfig, AppState, StorageKind};
use rules_hub_catalog::StaticCatalog;
use rules_hub_codec::RuleCodec;
use rules_hub_core::{Device, Room, RuleDocument};
use rules_hub_storage::{InMemoryStorage, RuntimeCommand};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt; // for oneshot

fn app(storage: &Arc<InMemoryStorage>) -> Router {
    let catalog = StaticCatalog::new(
        vec![
            Device::new("12", "Hall sensor").with_room("1"),
            Device::new("13", "Garage door").with_room("2"),
        ],
        vec![
            Room::new("1", "Hall"),
            Room::new("2", "Garage"),
        ],
    );
    let state = AppState::with_backends(storage.clone(), storage.clone(), Arc::new(catalog), 8);
    create_router(Arc::new(state))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };
    (status, body)
}

fn names(listing: &Value) -> Vec<&str> {
    listing["rules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["rule"]["name"].as_str().unwrap())
        .collect()
}

async fn create(app: &Router, file: &str, rule: Value) -> (StatusCode, Value) {
    send(app, "POST", &format!("/api/files/{}/rules", file), Some(rule)).await
}

#[tokio::test]
async fn test_health_check() {
    let storage = Arc::new(InMemoryStorage::new());
    let (status, body) = send(&app(&storage), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_full_rule_lifecycle() {
    let storage = Arc::new(InMemoryStorage::new());
    let app = app(&storage);

    // 1. Create two rules in a new file
    let (status, body) = create(&app, "rules.xml", json!({ "name": "Hall" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["outcome"], "saved");
    assert_eq!(body["idx"], 1);
    assert_eq!(body["rule_id"], 1);

    let (status, body) = create(&app, "rules.xml", json!({ "name": "Garage" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["idx"], 2);
    assert_eq!(body["rule_id"], 2);

    // 2. List them in file order, with their runtime ids
    let (status, body) = send(&app, "GET", "/api/files/rules.xml/rules", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&body), vec!["Hall", "Garage"]);
    assert_eq!(body["rules"][0]["idx"], 1);
    assert_eq!(body["rules"][1]["rule"]["id"], 2);
    assert_eq!(body["report"]["warnings"], json!([]));

    // 3. Replace the first rule
    let (status, body) = send(
        &app,
        "PUT",
        "/api/files/rules.xml/rules/1",
        Some(json!({ "id": 1, "name": "Hall", "description": "Motion in the hall" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["warnings"], json!([]));

    let (_, body) = send(&app, "GET", "/api/files/rules.xml/rules", None).await;
    assert_eq!(body["rules"][0]["rule"]["description"], "Motion in the hall");

    // 4. Statuses come from the runtime
    let (status, body) = send(&app, "GET", "/api/rules/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(body[0]["icon"], "inactive");
    assert_eq!(body[0]["arm_toggle_enabled"], true);

    // 5. Delete the first rule; the runtime index is reloaded
    let (status, body) = send(&app, "DELETE", "/api/files/rules.xml/rules/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["remaining"][0]["name"], "Garage");
    assert_eq!(body["remaining"][0]["id"], 2);
    assert!(body.get("reload_error").is_none());

    let (_, body) = send(&app, "GET", "/api/files/rules.xml/rules", None).await;
    assert_eq!(names(&body), vec!["Garage"]);
}

#[tokio::test]
async fn test_listing_reports_reordered_rules() {
    let storage = Arc::new(InMemoryStorage::new());
    let app = app(&storage);
    create(&app, "rules.xml", json!({ "name": "Hall" })).await;
    create(&app, "rules.xml", json!({ "name": "Garage" })).await;

    // Swapped behind the runtime's back
    let mut garage = RuleDocument::new("Garage");
    garage.id = Some(2);
    let mut hall = RuleDocument::new("Hall");
    hall.id = Some(1);
    storage.insert_file(
        "rules.xml",
        RuleCodec::new().encode_file(&[garage, hall]).unwrap(),
    );

    let (status, body) = send(&app, "GET", "/api/files/rules.xml/rules", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&body), vec!["Garage", "Hall"]);
    let warnings = body["report"]["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 2);
    assert!(warnings.iter().all(|w| w["kind"] == "id_mismatch"));
    assert_eq!(warnings[0]["idx"], 1);
}

#[tokio::test]
async fn test_blank_rule_name_is_rejected() {
    let storage = Arc::new(InMemoryStorage::new());
    let app = app(&storage);

    let (status, body) = create(&app, "rules.xml", json!({ "name": "  " })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_rule");
    assert!(storage.file("rules.xml").is_none());
}

#[tokio::test]
async fn test_rejected_upload_returns_local_export() {
    let storage = Arc::new(InMemoryStorage::new());
    let app = app(&storage);
    storage.reject_uploads(true);

    let (status, body) = create(&app, "rules.xml", json!({ "name": "Hall" })).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["outcome"], "local_export");
    assert!(body["content"].as_str().unwrap().contains("Hall"));
    assert!(storage.file("rules.xml").is_none());
}

#[tokio::test]
async fn test_unknown_rule_index_is_not_found() {
    let storage = Arc::new(InMemoryStorage::new());
    let app = app(&storage);
    create(&app, "rules.xml", json!({ "name": "Hall" })).await;

    let (status, body) = send(&app, "DELETE", "/api/files/rules.xml/rules/5", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = send(
        &app,
        "PUT",
        "/api/files/rules.xml/rules/0",
        Some(json!({ "name": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_arming_is_forwarded_to_runtime() {
    let storage = Arc::new(InMemoryStorage::new());
    let app = app(&storage);
    create(&app, "rules.xml", json!({ "name": "Hall" })).await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/rules/1/arming",
        Some(json!({ "armed": false })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, _) = send(
        &app,
        "POST",
        "/api/rules/1/acknowledgement",
        Some(json!({ "acknowledged": true })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let commands = storage.commands();
    assert!(commands.contains(&RuntimeCommand::SetArming { rule_id: 1, armed: false }));
    assert!(commands.contains(&RuntimeCommand::SetAcknowledgement {
        rule_id: 1,
        acknowledged: true
    }));

    let (status, _) = send(
        &app,
        "POST",
        "/api/rules/42/arming",
        Some(json!({ "armed": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_timeline() {
    let storage = Arc::new(InMemoryStorage::new());
    let (status, body) = send(&app(&storage), "GET", "/api/timeline", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "history": [], "scheduled": [] }));
}

#[tokio::test]
async fn test_catalog_options() {
    let storage = Arc::new(InMemoryStorage::new());
    let app = app(&storage);

    let (status, body) = send(
        &app,
        "POST",
        "/api/catalog/options",
        Some(json!({ "key": "device_room", "criteria": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            { "label": "Garage", "value": "2" },
            { "label": "Hall", "value": "1" }
        ])
    );

    let (_, body) = send(
        &app,
        "POST",
        "/api/catalog/options",
        Some(json!({ "key": "device_id", "criteria": { "device_room": "1" } })),
    )
    .await;
    assert_eq!(body, json!([{ "label": "Hall sensor", "value": "12" }]));

    let (status, body) = send(&app, "POST", "/api/catalog/refresh", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["generation"], 2);
}

#[tokio::test]
async fn test_fs_backend_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_path = dir.path().join("catalog.json");
    std::fs::write(
        &catalog_path,
        json!({ "devices": [], "rooms": [{ "id": "1", "name": "Hall" }] }).to_string(),
    )
    .unwrap();

    let config = ApiConfig {
        storage: StorageKind::Fs,
        rules_dir: dir.path().join("rules"),
        catalog_file: Some(catalog_path),
        ..ApiConfig::default()
    };
    let state = AppState::from_config(&config).await.unwrap();
    let app = create_router(Arc::new(state));

    let (status, body) = create(&app, "main.xml", json!({ "name": "Hall" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["rule_id"], 1);
    assert!(dir.path().join("rules/main.xml").exists());

    let (status, body) = send(&app, "GET", "/api/files/main.xml/rules", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&body), vec!["Hall"]);
}
