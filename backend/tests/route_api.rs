use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    http::Request,
};
use hyper::StatusCode;
use seaway::{
    AppState, create_router,
    channels::ChannelGraph,
    config::EngineConfig,
    engine::SafeRouteEngine,
    land::LandMask,
    models::SafeRouteResponse,
};
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_app() -> axum::Router {
    let mask = Arc::new(LandMask::bundled(0.2).expect("bundled land"));
    let channels = ChannelGraph::bundled(&mask).expect("bundled channels");
    let engine = SafeRouteEngine::new(mask, EngineConfig::default()).with_fallback(Arc::new(channels));
    create_router(AppState {
        engine: Arc::new(engine),
    })
}

fn post_json(payload: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/trips/safe-route")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn safe_route_endpoint_routes_every_leg() {
    let app = test_app();
    let payload = json!({
        "days": [
            {"day": 1, "from": "Split", "to": "Milna",
             "fromLat": 43.5081, "fromLng": 16.4402, "toLat": 43.3244, "toLng": 16.4522},
            {"day": 2, "from": "Offshore", "to": "Offshore",
             "fromLat": "43.0", "fromLng": 15.5, "toLat": 43.2, "toLng": 15.7},
            {"day": "rest", "from": "Nowhere", "to": "Milna",
             "fromLat": null, "fromLng": 16.0, "toLat": 43.3244, "toLng": 16.4522}
        ],
        "vessel": {"draft_m": 1.8, "type": "catamaran"},
        "includeGpx": true
    });

    let response = app.oneshot(post_json(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let body: SafeRouteResponse = serde_json::from_slice(&bytes).unwrap();
    assert!(body.success);
    assert_eq!(body.safe_route.len(), 3);

    let split_milna = &body.safe_route[0];
    assert_eq!(split_milna.from, "Split");
    assert!(!split_milna.failed);
    assert!(!split_milna.waypoints.is_empty());

    assert!(!body.safe_route[1].failed);
    assert!(body.safe_route[1].waypoints.len() <= 1);

    let broken = &body.safe_route[2];
    assert!(broken.failed);
    assert!(broken.waypoints.is_empty());
    assert_eq!(broken.day.to_string(), "rest");

    assert!(body.gpx_base64.is_some_and(|gpx| !gpx.is_empty()));
}

#[tokio::test]
async fn wire_format_uses_camel_case_and_omits_empty_notes() {
    let app = test_app();
    let payload = json!({"days": [
        {"day": 1, "from": "A", "to": "B",
         "fromLat": 43.0, "fromLng": 15.5, "toLat": 43.2, "toLng": 15.7}
    ]});

    let response = app.oneshot(post_json(&payload)).await.unwrap();
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();

    let leg = &body["safeRoute"][0];
    assert_eq!(leg["day"], 1);
    assert_eq!(leg["failed"], false);
    assert!(leg["distanceNm"].as_f64().unwrap() > 0.0);
    assert!(body.get("gpxBase64").is_none());
    for waypoint in leg["waypoints"].as_array().unwrap() {
        assert!(waypoint["lat"].is_f64());
        assert!(waypoint["lng"].is_f64());
    }
}

#[tokio::test]
async fn empty_itinerary_is_rejected() {
    let response = test_app().oneshot(post_json(&json!({"days": []}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_itinerary_is_rejected() {
    let leg = json!({"day": 1, "from": "A", "to": "B",
                     "fromLat": 43.0, "fromLng": 15.5, "toLat": 43.2, "toLng": 15.7});
    let days: Vec<Value> = std::iter::repeat(leg).take(91).collect();
    let response = test_app().oneshot(post_json(&json!({"days": days}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_the_loaded_mask() {
    let request = Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();
    let response = test_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["landPolygons"], 6);
    assert!((body["bufferKm"].as_f64().unwrap() - 0.2).abs() < 1e-9);
    assert_eq!(body["channelFallback"], true);
}

async fn post_and_read(payload: Value) -> (StatusCode, Value) {
    let response = test_app().oneshot(post_json(&payload)).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn null_days_and_labels_are_tolerated() {
    let (status, body) = post_and_read(json!({"days": [
        {"day": null, "from": null, "to": null,
         "fromLat": 43.0, "fromLng": 15.5, "toLat": 43.2, "toLng": 15.7}
    ]}))
    .await;
    assert_eq!(status, StatusCode::OK);
    let leg = &body["safeRoute"][0];
    assert_eq!(leg["day"], Value::Null);
    assert_eq!(leg["from"], "");
    assert_eq!(leg["failed"], false);
}

#[tokio::test]
async fn fractional_and_negative_days_are_echoed_as_labels() {
    let leg = |day: Value| {
        json!({"day": day, "from": "A", "to": "B",
               "fromLat": 43.0, "fromLng": 15.5, "toLat": 43.2, "toLng": 15.7})
    };
    let (status, body) = post_and_read(json!({"days": [leg(json!(1.5)), leg(json!(-2))]})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["safeRoute"][0]["day"], "1.5");
    assert_eq!(body["safeRoute"][1]["day"], "-2");
}

#[tokio::test]
async fn vessel_numbers_may_arrive_as_strings() {
    let (status, body) = post_and_read(json!({
        "days": [{"day": 1, "from": "A", "to": "B",
                  "fromLat": 43.0, "fromLng": 15.5, "toLat": 43.2, "toLng": 15.7}],
        "vessel": {"draft_m": "1.8", "type": "sailboat", "cruise_speed_kn": "6"}
    }))
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["safeRoute"][0]["estimatedHours"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn flat_vessel_fields_are_accepted() {
    let (status, body) = post_and_read(json!({
        "days": [{"day": 1, "from": "A", "to": "B",
                  "fromLat": 43.0, "fromLng": 15.5, "toLat": 43.2, "toLng": 15.7}],
        "vesselDraft": "1.8",
        "vesselType": "catamaran",
        "cruiseSpeedKn": "6"
    }))
    .await;
    assert_eq!(status, StatusCode::OK);
    let leg = &body["safeRoute"][0];
    let nm = leg["distanceNm"].as_f64().unwrap();
    let hours = leg["estimatedHours"].as_f64().unwrap();
    assert!((hours - nm / 6.0).abs() < 0.06);
}

#[tokio::test]
async fn non_object_legs_fail_on_their_own() {
    let (status, body) = post_and_read(json!({"days": [
        {"day": 1, "from": "A", "to": "B",
         "fromLat": 43.0, "fromLng": 15.5, "toLat": 43.2, "toLng": 15.7},
        "not a leg"
    ]}))
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["safeRoute"][0]["failed"], false);
    assert_eq!(body["safeRoute"][1]["failed"], true);
    assert_eq!(body["safeRoute"][1]["waypoints"], json!([]));
}
