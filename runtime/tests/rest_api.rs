//! REST API served on an ephemeral port over a sample warehouse.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_json_diff::assert_json_include;
use imint_runtime::analyst::AnalystClient;
use imint_runtime::config::Config;
use imint_runtime::proxy::QueryProxy;
use imint_runtime::rest::{self, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestServer {
    base: String,
    client: reqwest::Client,
    state: Arc<AppState>,
    _dir: TempDir,
}

impl TestServer {
    async fn start(proxy: Option<QueryProxy>) -> Self {
        Self::start_with(proxy, &Config::default()).await
    }

    async fn start_with(proxy: Option<QueryProxy>, config: &Config) -> Self {
        let (dir, db) = common::sample_warehouse();
        let state = Arc::new(AppState::new(common::fetcher(&db), proxy, config));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(rest::serve(listener, state.clone()));
        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            state,
            _dir: dir,
        }
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self
            .client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn ask(&self, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}/api/v1/ask", self.base))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

async fn analyst_proxy(body: Value) -> (MockServer, QueryProxy) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;
    let client = AnalystClient::new(&server.uri(), "token", Duration::from_secs(5)).unwrap();
    let proxy = QueryProxy::new(Arc::new(client), "@stage/model.yaml");
    (server, proxy)
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start(None).await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_json_include!(
        actual: body,
        expected: json!({ "status": "ok", "analyst": false })
    );
}

#[tokio::test]
async fn test_overview_uses_default_filters() {
    let server = TestServer::start(None).await;
    let (status, body) = server.get("/api/v1/dashboard/overview").await;
    assert_eq!(status, 200);
    assert_json_include!(
        actual: body,
        expected: json!({
            "page": "overview",
            "total_images": 5,
            "filtered_images": 3,
            "view": { "kind": "overview", "pipeline_images": 5 }
        })
    );
}

#[tokio::test]
async fn test_dashboard_query_filters() {
    let server = TestServer::start(None).await;

    let (_, body) = server
        .get("/api/v1/dashboard/geo?sensors=Capella-SAR,PlanetScope&min_quality=0")
        .await;
    assert_json_include!(
        actual: body,
        expected: json!({
            "page": "geospatial",
            "filtered_images": 2,
            "view": { "kind": "geospatial" }
        })
    );

    // an empty selection selects nothing
    let (_, body) = server.get("/api/v1/dashboard/reports?sensors=").await;
    assert_eq!(body["filtered_images"], 0);

    // malformed threshold falls back to the default
    let (status, body) = server.get("/api/v1/dashboard/overview?min_quality=high").await;
    assert_eq!(status, 200);
    assert_eq!(body["filtered_images"], 3);
}

#[tokio::test]
async fn test_viewer_selection() {
    let server = TestServer::start(None).await;
    let (_, body) = server
        .get("/api/v1/dashboard/viewer?min_quality=0&selected=SEN2_20240502_EB_OAK_0003")
        .await;
    assert_json_include!(
        actual: body,
        expected: json!({
            "view": {
                "kind": "viewer",
                "selected": {
                    "image_id": "SEN2_20240502_EB_OAK_0003",
                    "urban_classification": "Urban"
                }
            }
        })
    );
    let url = body["view"]["presigned_url"].as_str().unwrap();
    assert!(url.starts_with(common::PRESIGN_BASE));
    assert!(url.contains("s2/20240502/0003.tif"));

    // nothing selected, nothing signed
    let (_, body) = server.get("/api/v1/dashboard/viewer").await;
    assert!(body["view"]["presigned_url"].is_null());
}

#[tokio::test]
async fn test_unknown_page() {
    let server = TestServer::start(None).await;
    let (status, body) = server.get("/api/v1/dashboard/timeline").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "E_UNKNOWN_PAGE");
}

#[tokio::test]
async fn test_image_detail_with_presigned_url() {
    let server = TestServer::start(None).await;
    let (status, body) = server.get("/api/v1/images/WV3_20240503_SF_FIDI_0001").await;
    assert_eq!(status, 200);
    assert_json_include!(
        actual: body.clone(),
        expected: json!({
            "detail": {
                "image_id": "WV3_20240503_SF_FIDI_0001",
                "urban_classification": "Dense Urban",
                "sensor_category": "WorldView-3"
            }
        })
    );
    let url = body["presigned_url"].as_str().unwrap();
    assert!(url.starts_with(common::PRESIGN_BASE));

    // no object key: detail without a URL
    let (status, body) = server.get("/api/v1/images/PLN_20240501_NB_SR_0005").await;
    assert_eq!(status, 200);
    assert!(body["presigned_url"].is_null());

    let (status, body) = server.get("/api/v1/images/missing").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "E_NOT_FOUND");
}

#[tokio::test]
async fn test_export_csv() {
    let server = TestServer::start(None).await;
    let resp = server
        .client
        .get(format!("{}/api/v1/export/filtered", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let headers = resp.headers().clone();
    assert!(headers[reqwest::header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    let disposition = headers[reqwest::header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.contains("nga_imagery_intelligence_"));
    assert!(disposition.ends_with(".csv\""));

    let csv = resp.text().await.unwrap();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("image_id,"));
    assert_eq!(lines.count(), 3);

    let (status, body) = server.get("/api/v1/export/everything").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "E_UNKNOWN_EXPORT");
}

#[tokio::test]
async fn test_loitering_thresholds() {
    let server = TestServer::start(None).await;
    let (status, body) = server.get("/api/v1/loitering").await;
    assert_eq!(status, 200);
    assert_json_include!(
        actual: body,
        expected: json!({
            "total": 1,
            "events": [{ "vessel_id": "MMSI-366999001" }]
        })
    );

    let (_, body) = server
        .get("/api/v1/loitering?max_gap_secs=60&max_distance_m=5000")
        .await;
    assert_eq!(body["total"], 2);
}

#[tokio::test]
async fn test_ask_without_analyst() {
    let server = TestServer::start(None).await;
    let (status, body) = server.ask(json!({ "question": "How many images?" })).await;
    assert_eq!(status, 503);
    assert_eq!(body["error"]["code"], "E_ANALYST_UNAVAILABLE");
}

#[tokio::test]
async fn test_ask_conversation() {
    let (_analyst, proxy) = analyst_proxy(common::analyst_body(
        "Images by sensor.",
        Some(
            "SELECT image_id, sensor_category, combined_quality_score, capture_date \
             FROM silver_imagery_metadata ORDER BY capture_timestamp DESC",
        ),
    ))
    .await;
    let server = TestServer::start(Some(proxy)).await;

    let (status, first) = server
        .ask(json!({
            "question": "Show WorldView-3 images",
            "filters": { "sensors": ["WorldView-3"] }
        }))
        .await;
    assert_eq!(status, 200);
    assert_json_include!(
        actual: first.clone(),
        expected: json!({
            "turns": 1,
            "reply": { "answer_text": "Images by sensor." },
            "sql_error": null
        })
    );
    assert_eq!(first["result"]["rows"].as_array().unwrap().len(), 2);

    let id = first["conversation_id"].as_str().unwrap().to_string();
    let (status, second) = server
        .ask(json!({ "question": "And all of them?", "conversation_id": id }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(second["conversation_id"], first["conversation_id"]);
    assert_eq!(second["turns"], 2);
    assert_eq!(second["result"]["rows"].as_array().unwrap().len(), 5);

    let (status, body) = server
        .ask(json!({
            "question": "Anything?",
            "conversation_id": "00000000-0000-4000-8000-000000000000"
        }))
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "E_NO_CONVERSATION");

    let (status, body) = server.ask(json!({ "question": "   " })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "E_INVALID_PARAMS");
}

#[tokio::test]
async fn test_ask_analyst_failure() {
    let server_mock = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server_mock)
        .await;
    let client = AnalystClient::new(&server_mock.uri(), "token", Duration::from_secs(5)).unwrap();
    let proxy = QueryProxy::new(Arc::new(client), "@stage/model.yaml");
    let server = TestServer::start(Some(proxy)).await;

    let (status, body) = server.ask(json!({ "question": "How many images?" })).await;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "E_ANALYST");
    assert!(body["conversation_id"].is_string());
}

#[tokio::test]
async fn test_rejected_questions_leave_no_conversation() {
    let (analyst, proxy) = analyst_proxy(common::analyst_body("Five images.", None)).await;
    let server = TestServer::start(Some(proxy)).await;

    for _ in 0..5 {
        let (status, body) = server.ask(json!({ "question": "   " })).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["code"], "E_INVALID_PARAMS");
    }
    assert_eq!(server.state.conversations.lock().await.len(), 0);
    assert!(analyst.received_requests().await.unwrap().is_empty());

    // a blank follow-up keeps the existing conversation
    let (_, first) = server.ask(json!({ "question": "How many images?" })).await;
    let id = first["conversation_id"].clone();
    let (status, _) = server
        .ask(json!({ "question": "", "conversation_id": id }))
        .await;
    assert_eq!(status, 400);
    let (status, second) = server
        .ask(json!({ "question": "And yesterday?", "conversation_id": id }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(second["turns"], 2);
    assert_eq!(server.state.conversations.lock().await.len(), 1);
}

#[tokio::test]
async fn test_conversation_store_is_bounded() {
    let (_analyst, proxy) = analyst_proxy(common::analyst_body("Five images.", None)).await;
    let config = Config {
        max_conversations: 2,
        ..Config::default()
    };
    let server = TestServer::start_with(Some(proxy), &config).await;

    let mut ids = Vec::new();
    for q in ["First?", "Second?", "Third?"] {
        let (status, body) = server.ask(json!({ "question": q })).await;
        assert_eq!(status, 200);
        ids.push(body["conversation_id"].clone());
    }
    assert_eq!(server.state.conversations.lock().await.len(), 2);

    // the least recently used conversation was evicted
    let (status, body) = server
        .ask(json!({ "question": "Still there?", "conversation_id": ids[0] }))
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "E_NO_CONVERSATION");

    let (status, body) = server
        .ask(json!({ "question": "Still there?", "conversation_id": ids[2] }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["turns"], 2);
}
