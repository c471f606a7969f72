use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use parking_tracker_rs::{
    BackendConfig, BackendError, BearerToken, Coordinates, Credentials, FixFeed, HttpSpotsBackend,
    ParkingClient, RawFix, ReportKind, SampleOutcome, SpotReport, SpotsBackend, TrackerConfig,
    TrackerError,
};

#[derive(Debug, Clone, PartialEq)]
struct Hit {
    path: String,
    authorization: Option<String>,
    query: HashMap<String, String>,
    body: Value,
}

#[derive(Clone, Default)]
struct Recorder {
    hits: Arc<Mutex<Vec<Hit>>>,
    /// Status every endpoint answers with instead of succeeding
    forced: Arc<Mutex<Option<StatusCode>>>,
}

impl Recorder {
    fn record(
        &self,
        path: String,
        headers: &HeaderMap,
        query: HashMap<String, String>,
        body: Value,
    ) -> Option<StatusCode> {
        let authorization = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.hits.lock().unwrap().push(Hit {
            path,
            authorization,
            query,
            body,
        });
        *self.forced.lock().unwrap()
    }

    fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }

    fn force(&self, status: StatusCode) {
        *self.forced.lock().unwrap() = Some(status);
    }
}

async fn nearby(
    State(rec): State<Recorder>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    if let Some(status) = rec.record("/nearby-spots".into(), &headers, query, Value::Null) {
        return (status, Json(json!({"error": "nope"})));
    }
    (
        StatusCode::OK,
        Json(json!([
            {"id": 7, "latitude": 40.4169, "longitude": -3.7035, "timestamp": "2024-03-01T10:15:30.123456", "distance": 12.5},
            {"id": 8, "latitude": 40.4172, "longitude": -3.7040, "timestamp": "2024-03-01T10:20:00Z", "distance": 48.0}
        ])),
    )
}

async fn post_body(
    State(rec): State<Recorder>,
    headers: HeaderMap,
    path: axum::http::Uri,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let status = rec
        .record(path.path().to_string(), &headers, HashMap::new(), body)
        .unwrap_or(StatusCode::CREATED);
    (status, Json(json!({"message": "ok"})))
}

async fn spot_action(
    State(rec): State<Recorder>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    path: axum::http::Uri,
) -> StatusCode {
    let mut query = HashMap::new();
    query.insert("id".to_string(), id.to_string());
    rec.record(path.path().to_string(), &headers, query, Value::Null)
        .unwrap_or(StatusCode::OK)
}

async fn spawn_server() -> (SocketAddr, Recorder) {
    let recorder = Recorder::default();
    let app = Router::new()
        .route("/nearby-spots", get(nearby))
        .route("/report-spot", post(post_body))
        .route("/parking-event", post(post_body))
        .route("/confirm-spot/:id", post(spot_action))
        .route("/report-fake/:id", post(spot_action))
        .with_state(recorder.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, recorder)
}

fn backend_config(addr: SocketAddr) -> BackendConfig {
    BackendConfig {
        base_url: format!("http://{}/", addr),
        timeout_secs: 5,
        ..BackendConfig::default()
    }
}

#[tokio::test]
async fn nearby_spots_query_and_decode() {
    let (addr, recorder) = spawn_server().await;
    let backend = HttpSpotsBackend::new(&backend_config(addr)).unwrap();

    let spots = backend
        .nearby_spots(&BearerToken::new("jwt-abc"), Coordinates::new(40.4168, -3.7038))
        .await
        .unwrap();

    assert_eq!(spots.len(), 2);
    assert_eq!(spots[0].id, 7);
    assert_eq!(spots[0].distance_m, Some(12.5));
    assert_eq!(spots[0].reported_at.to_rfc3339(), "2024-03-01T10:15:30.123456+00:00");
    assert_eq!(spots[1].coordinates(), Coordinates::new(40.4172, -3.7040));

    let hits = recorder.hits();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].authorization.as_deref(), Some("jwt-abc"));
    assert_eq!(hits[0].query.get("latitude").map(String::as_str), Some("40.4168"));
    assert_eq!(hits[0].query.get("longitude").map(String::as_str), Some("-3.7038"));
}

#[tokio::test]
async fn reports_go_to_their_endpoints() {
    let (addr, recorder) = spawn_server().await;
    let backend = HttpSpotsBackend::new(&backend_config(addr)).unwrap();
    let token = BearerToken::new("jwt-abc");
    let here = Coordinates::new(40.0, -3.0);

    backend
        .submit_report(&token, &SpotReport { kind: ReportKind::Manual, coordinates: here })
        .await
        .unwrap();
    backend
        .submit_report(&token, &SpotReport { kind: ReportKind::Parked, coordinates: here })
        .await
        .unwrap();

    let hits = recorder.hits();
    assert_eq!(hits[0].path, "/report-spot");
    assert_eq!(hits[0].body, json!({"latitude": 40.0, "longitude": -3.0}));
    assert_eq!(hits[1].path, "/parking-event");
    assert_eq!(
        hits[1].body,
        json!({"type": "parked", "latitude": 40.0, "longitude": -3.0})
    );
}

#[tokio::test]
async fn confirm_and_flag_paths() {
    let (addr, recorder) = spawn_server().await;
    let backend = HttpSpotsBackend::new(&backend_config(addr)).unwrap();
    let token = BearerToken::new("jwt-abc");

    backend.confirm_spot(&token, 7).await.unwrap();
    backend.flag_spot(&token, 8).await.unwrap();

    let paths: Vec<String> = recorder.hits().into_iter().map(|h| h.path).collect();
    assert_eq!(paths, vec!["/confirm-spot/7", "/report-fake/8"]);
}

#[tokio::test]
async fn status_codes_are_classified() {
    let (addr, recorder) = spawn_server().await;
    let backend = HttpSpotsBackend::new(&backend_config(addr)).unwrap();
    let token = BearerToken::new("expired");
    let here = Coordinates::new(40.0, -3.0);

    recorder.force(StatusCode::UNAUTHORIZED);
    assert_eq!(
        backend.nearby_spots(&token, here).await.unwrap_err(),
        BackendError::Unauthorized
    );

    recorder.force(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(backend.confirm_spot(&token, 1).await.unwrap_err(), BackendError::RateLimited);

    recorder.force(StatusCode::INTERNAL_SERVER_ERROR);
    let err = backend
        .submit_report(&token, &SpotReport { kind: ReportKind::Manual, coordinates: here })
        .await
        .unwrap_err();
    assert_eq!(err, BackendError::Http(500));
}

#[tokio::test]
async fn auth_scheme_prefixes_token() {
    let (addr, recorder) = spawn_server().await;
    let config = BackendConfig {
        auth_scheme: Some("Bearer".to_string()),
        ..backend_config(addr)
    };
    let backend = HttpSpotsBackend::new(&config).unwrap();

    backend.flag_spot(&BearerToken::new("jwt-abc"), 3).await.unwrap();
    assert_eq!(
        recorder.hits()[0].authorization.as_deref(),
        Some("Bearer jwt-abc")
    );
}

#[tokio::test]
async fn unreachable_backend_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = HttpSpotsBackend::new(&backend_config(addr)).unwrap();
    let err = backend
        .nearby_spots(&BearerToken::new("t"), Coordinates::new(0.0, 0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Network(_)));
}

#[tokio::test]
async fn client_end_to_end() {
    let (addr, recorder) = spawn_server().await;
    let config = TrackerConfig {
        backend: backend_config(addr),
        ..TrackerConfig::default()
    };
    let feed = FixFeed::new();
    let mut client =
        ParkingClient::connect(config, Arc::new(feed.clone()), Credentials::with_token("jwt-abc"))
            .unwrap();

    feed.push(RawFix::new(40.4168, -3.7038, None));
    assert_eq!(client.locate().await.unwrap().len(), 2);

    client.start_tracking().unwrap();
    feed.push(RawFix::new(40.4170, -3.7030, Some(11.0)));
    feed.push(RawFix::new(40.4171, -3.7031, Some(0.3)));

    let parked = loop {
        match client.next_event().await {
            Some(Ok(SampleOutcome::Parked { event, report })) => {
                report.await.unwrap().unwrap();
                break event;
            }
            Some(Ok(_)) => continue,
            other => panic!("unexpected event {:?}", other),
        }
    };
    assert_eq!(parked.coordinates, Coordinates::new(40.4171, -3.7031));
    assert!(!client.is_tracking());

    let events: Vec<Hit> = recorder
        .hits()
        .into_iter()
        .filter(|h| h.path == "/parking-event")
        .collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].body["type"], "parked");

    client.sign_out();
    assert_eq!(
        client.report_spot_at(parked.coordinates).await,
        Err(TrackerError::AuthRequired)
    );
}
