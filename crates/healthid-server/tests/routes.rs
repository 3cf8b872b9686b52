use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use core::time::Duration;
use healthid::{
    Durability, EngineConfig, HidEngine, IssuedBlock, MemoryStore, PoolEntry, SeriesConfig,
    SeriesRegistry, StaticDirectory, SystemClock, is_valid,
};
use healthid_server::server::service::handler::{HealthStatus, HidPage, HidService};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tower::ServiceExt;

const ORG: &str = "10000059";

fn service(store: MemoryStore) -> HidService {
    let registry = SeriesRegistry::new(SeriesConfig {
        mci_code: "MCI".to_string(),
        mci_range: 1000..3000,
        organizations: vec![(ORG.to_string(), 5000..7000), ("unlisted".to_string(), 8000..9000)],
        sub_block_size: 1000,
        max_hids_per_request: 2_000_000,
    })
    .unwrap();
    let engine = HidEngine::new(
        registry,
        store,
        StaticDirectory::new().with_facility(ORG, "District Hospital"),
        SystemClock,
        EngineConfig {
            durability: Durability::Synchronous,
            page_size: 25,
            ..EngineConfig::default()
        },
    );
    HidService::with_engine(engine, 2, Duration::from_secs(1))
}

async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-actor-id", "7")
        .header("x-actor-name", "Registrar")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

fn json<T: DeserializeOwned>(body: &[u8]) -> T {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let app = service(MemoryStore::new()).router();
    let (status, body) = send(&app, Method::GET, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json::<HealthStatus>(&body).status, "ok");
}

#[tokio::test]
async fn generates_an_mci_block() {
    let store = MemoryStore::new();
    let app = service(store.clone()).router();

    let (status, body) = send(&app, Method::POST, "/healthIds/generateBlock?start=1000&totalHIDs=100").await;
    assert_eq!(status, StatusCode::OK);
    let issued: IssuedBlock = json(&body);
    assert_eq!((issued.begins_at, issued.ends_at), (1000, 1100));
    assert_eq!(issued.remark, "Generated 100 HIDs.");
    assert_eq!(store.entry_count(), 100);

    let (status, body) = send(&app, Method::GET, "/healthIds/blocks?owner=MCI&seriesNo=1000").await;
    assert_eq!(status, StatusCode::OK);
    let blocks: Value = json(&body);
    assert_eq!(blocks.as_array().unwrap().len(), 1);
    assert_eq!(blocks[0]["remark"], r#"{"id":"7","name":"Registrar"}"#);
}

#[tokio::test]
async fn generate_issues_the_next_mci_sub_block() {
    let store = MemoryStore::new();
    let app = service(store.clone()).router();

    for begins_at in [1000, 2000] {
        let (status, body) = send(&app, Method::POST, "/healthIds/generate").await;
        assert_eq!(status, StatusCode::OK);
        let issued: IssuedBlock = json(&body);
        assert_eq!((issued.begins_at, issued.ends_at), (begins_at, begins_at + 1000));
        assert_eq!(issued.remark, "Generated 1000 HIDs.");
    }
    assert_eq!(store.entry_count(), 2000);

    let (status, body) = send(&app, Method::POST, "/healthIds/generate").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json::<Value>(&body)["error"], "validation");
}

#[tokio::test]
async fn org_blocks_report_partial_fulfillment() {
    let app = service(MemoryStore::new()).router();
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/healthIds/generateBlockForOrg?orgCode={ORG}&start=5000&totalHIDs=1500"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let issued: IssuedBlock = json(&body);
    assert_eq!(issued.actual_count, 1000);
    assert_eq!(
        issued.remark,
        "Can generate only 1000 HIDs, because series exhausted. Use another series."
    );
}

#[tokio::test]
async fn request_errors_map_to_statuses() {
    let app = service(MemoryStore::new()).router();

    let cases = [
        (Method::POST, "/healthIds/generateBlock?start=1500&totalHIDs=10", StatusCode::BAD_REQUEST, "validation"),
        (Method::POST, "/healthIds/generateBlock?start=1000&totalHIDs=2000001", StatusCode::BAD_REQUEST, "validation"),
        (Method::POST, "/healthIds/generateBlock?start=1000", StatusCode::BAD_REQUEST, "invalid_request"),
        (Method::POST, "/healthIds/generateBlock?start=abc&totalHIDs=1", StatusCode::BAD_REQUEST, "invalid_request"),
        (Method::POST, "/healthIds/generateBlockForOrg?orgCode=MCI&start=1000&totalHIDs=10", StatusCode::BAD_REQUEST, "validation"),
        (Method::POST, "/healthIds/generateBlockForOrg?orgCode=unlisted&start=8000&totalHIDs=10", StatusCode::BAD_REQUEST, "invalid_owner"),
        (Method::GET, "/healthIds/blocks?owner=nobody&seriesNo=1", StatusCode::BAD_REQUEST, "unknown_owner"),
        (Method::GET, "/healthIds/nextPage", StatusCode::NOT_FOUND, "pool_exhausted"),
        (Method::GET, "/healthIds/nextPage?size=0", StatusCode::BAD_REQUEST, "validation"),
        (Method::GET, "/healthIds/12345", StatusCode::BAD_REQUEST, "invalid_hid"),
        (Method::GET, "/healthIds/10009", StatusCode::NOT_FOUND, "hid_not_found"),
    ];

    for (method, uri, expected_status, expected_kind) in cases {
        let (status, body) = send(&app, method, uri).await;
        assert_eq!(status, expected_status, "{uri}");
        let error: Value = json(&body);
        assert_eq!(error["error"], expected_kind, "{uri}");
        assert!(error["message"].is_string(), "{uri}");
    }

    let (_, body) = send(
        &app,
        Method::POST,
        "/healthIds/generateBlockForOrg?orgCode=unlisted&start=8000&totalHIDs=10",
    )
    .await;
    assert_eq!(json::<Value>(&body)["message"], "Invalid Organization:- unlisted");

    let (_, body) = send(&app, Method::POST, "/healthIds/generateBlock?start=3500&totalHIDs=10").await;
    assert!(json::<Value>(&body)["message"].as_str().unwrap().contains("3500 not for MCI"));

    let (_, body) = send(
        &app,
        Method::POST,
        &format!("/healthIds/generateBlockForOrg?orgCode={ORG}&start=4000&totalHIDs=20"),
    )
    .await;
    assert!(json::<Value>(&body)["message"].as_str().unwrap().contains("4000 series is not valid."));
}

#[tokio::test]
async fn pages_through_the_pool_and_resets() {
    let app = service(MemoryStore::new()).router();
    send(&app, Method::POST, "/healthIds/generateBlock?start=1000&totalHIDs=60").await;

    let mut served = Vec::new();
    loop {
        let (status, body) = send(&app, Method::GET, "/healthIds/nextPage").await;
        if status == StatusCode::NOT_FOUND {
            break;
        }
        assert_eq!(status, StatusCode::OK);
        let page: HidPage = json(&body);
        assert!(page.hids.len() <= 25);
        served.extend(page.hids);
    }
    assert_eq!(served.len(), 60);
    assert!(served.iter().all(|hid| is_valid(hid.as_str())));

    let (status, _) = send(&app, Method::POST, "/healthIds/resetCursor").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = send(&app, Method::GET, "/healthIds/nextPage?size=100").await;
    assert_eq!(json::<HidPage>(&body).hids, served);
}

#[tokio::test]
async fn entry_lifecycle_over_http() {
    let app = service(MemoryStore::new()).router();
    send(&app, Method::POST, "/healthIds/generateBlock?start=1000&totalHIDs=5").await;
    let (_, body) = send(&app, Method::GET, "/healthIds/nextPage?size=1").await;
    let hid = json::<HidPage>(&body).hids.remove(0);
    let uri = format!("/healthIds/{hid}");

    let (status, body) = send(&app, Method::GET, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!json::<PoolEntry>(&body).is_used);

    let (status, _) = send(&app, Method::PUT, &format!("{uri}/used")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = send(&app, Method::GET, &uri).await;
    let entry: PoolEntry = json(&body);
    assert!(entry.is_used);
    assert!(entry.used_at.is_some());

    for _ in 0..2 {
        let (status, _) = send(&app, Method::DELETE, &uri).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    let (status, _) = send(&app, Method::GET, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::PUT, &format!("{uri}/used")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn store_outage_is_service_unavailable() {
    let store = MemoryStore::new();
    let app = service(store.clone()).router();
    store.set_available(false);

    let (status, body) = send(&app, Method::POST, "/healthIds/generateBlock?start=1000&totalHIDs=5").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json::<Value>(&body)["error"], "store_unavailable");
}

#[tokio::test]
async fn shutdown_refuses_new_requests() {
    let service = service(MemoryStore::new());
    let app = service.clone().router();
    service.shutdown().await;

    let (status, body) = send(&app, Method::POST, "/healthIds/generateBlock?start=1000&totalHIDs=5").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json::<Value>(&body)["error"], "service_shutdown");

    let (status, body) = send(&app, Method::GET, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json::<HealthStatus>(&body).status, "shutting_down");
}
