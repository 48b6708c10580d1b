//! HTTP router client against a mock backend.

use std::sync::Mutex;
use std::time::Duration;

use serde_json::json;
use velo_core::{CostProfile, LatLon, NoGoArea};
use velo_router::{
    HttpRouter, ProfileId, RetryPolicy, RouteRequest, RouterConfig, RoutingError, RoutingService,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn router_for(server: &MockServer) -> HttpRouter {
    let config = RouterConfig {
        retry: RetryPolicy::new(3, Duration::from_millis(10)),
        ..RouterConfig::new(server.uri())
    };
    HttpRouter::new(config).unwrap()
}

fn track() -> serde_json::Value {
    json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": { "times": [0, 40.0] },
            "geometry": {
                "type": "LineString",
                "coordinates": [[8.0, 47.0, 420.0], [8.002, 47.001, 431.0]]
            }
        }]
    })
}

fn request() -> RouteRequest {
    RouteRequest {
        from: LatLon::new(47.0, 8.0),
        to: LatLon::new(47.001, 8.002),
        no_go: vec![NoGoArea::new(47.0005, 8.001, 100.0)],
        profile: ProfileId("custom_42".into()),
    }
}

#[tokio::test]
async fn route_sends_profile_and_nogos() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/brouter"))
        .and(query_param("profile", "custom_42"))
        .and(query_param("nogos", "8.001000,47.000500,100"))
        .and(query_param("format", "geojson"))
        .respond_with(ResponseTemplate::new(200).set_body_json(track()))
        .expect(1)
        .mount(&server)
        .await;

    let router = router_for(&server);
    let samples = router.route(&request(), &|_| {}).await.unwrap();

    assert_eq!(samples.len(), 2);
    assert_eq!(samples[1].altitude_m, 431.0);
    assert_eq!(samples[1].time_s, 40.0);
}

#[tokio::test]
async fn transient_failure_is_retried_with_notice() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/brouter"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/brouter"))
        .respond_with(ResponseTemplate::new(200).set_body_json(track()))
        .expect(1)
        .mount(&server)
        .await;

    let router = router_for(&server);
    let attempts = Mutex::new(Vec::new());
    let samples = router
        .route(&request(), &|notice| attempts.lock().unwrap().push(notice.attempt))
        .await
        .unwrap();

    assert_eq!(samples.len(), 2);
    assert_eq!(*attempts.lock().unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn unroutable_target_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/brouter"))
        .respond_with(
            ResponseTemplate::new(500).set_body_string("target island detected for section 0"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let router = router_for(&server);
    let result = router.route(&request(), &|_| panic!("unexpected retry")).await;
    assert!(matches!(result, Err(RoutingError::Rejected(_))));
}

#[tokio::test]
async fn exhausted_retries_surface_the_last_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/brouter"))
        .respond_with(ResponseTemplate::new(502))
        .expect(4)
        .mount(&server)
        .await;

    let router = router_for(&server);
    let result = router.route(&request(), &|_| {}).await;
    assert!(matches!(result, Err(RoutingError::Status { status: 502, .. })));
}

#[tokio::test]
async fn locate_returns_the_snapped_position() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/brouter"))
        .and(query_param("profile", "trekking"))
        .respond_with(ResponseTemplate::new(200).set_body_json(track()))
        .mount(&server)
        .await;

    let router = router_for(&server);
    let sample = router.locate(LatLon::new(47.00001, 8.00002), &|_| {}).await.unwrap();
    assert_eq!((sample.lat, sample.lon), (47.0, 8.0));
    assert_eq!(sample.time_s, 0.0);
}

#[tokio::test]
async fn unchanged_profile_is_uploaded_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/brouter/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"profileid": "custom_7"})))
        .expect(1)
        .mount(&server)
        .await;

    let router = router_for(&server);
    let profile = CostProfile::default();
    let first = router.compile_profile(&profile).await.unwrap();
    let second = router.compile_profile(&profile).await.unwrap();

    assert_eq!(first, ProfileId("custom_7".into()));
    assert_eq!(first, second);
    assert_eq!(router.profiles().len(), 1);
}

#[tokio::test]
async fn profile_upload_error_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/brouter/profile"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"error": "syntax error at line 3"})),
        )
        .mount(&server)
        .await;

    let router = router_for(&server);
    let result = router.compile_profile(&CostProfile::default()).await;
    assert!(matches!(result, Err(RoutingError::Rejected(msg)) if msg.contains("line 3")));
}
