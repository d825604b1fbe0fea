// [apps/controller/tests/http_flow.rs]
mod support;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use support::{multipart_body, test_app, ADMIN_KEY};
use tower::ServiceExt;
use uuid::Uuid;

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.expect("collect body").to_bytes();
    serde_json::from_slice(&bytes).expect("valid json body")
}

#[tokio::test]
async fn health_is_unauthenticated_and_ok() {
    let (router, _blobs) = support::test_app().await;
    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn submit_without_admin_key_is_rejected() {
    let (router, _blobs) = test_app().await;
    let boundary = "X-TEST-BOUNDARY";
    let body = multipart_body(boundary, &[("platform", b"ios"), ("source", b"fake ipa bytes")]);

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/builds")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Exercises the full lifecycle: submit -> register worker -> poll (gets
/// the dispatched job + its embedded OTP) -> authenticate -> certs-secure
/// -> worker reports success -> statistics reflect the completed build.
#[tokio::test]
async fn full_build_lifecycle_reaches_completed() {
    let (router, _blobs) = test_app().await;
    let boundary = "X-TEST-BOUNDARY";
    let submit_body = multipart_body(
        boundary,
        &[
            ("platform", b"ios"),
            ("source", b"fake ipa bytes"),
            ("certs", b"fake p12 bytes"),
        ],
    );

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/builds")
                .header("x-api-key", ADMIN_KEY)
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(submit_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let submitted = json_body(response).await;
    let build_id = submitted["id"].as_str().unwrap().to_string();
    let build_token = submitted["access_token"].as_str().unwrap().to_string();

    let worker_id = Uuid::new_v4();
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/workers/register")
                .header("x-api-key", ADMIN_KEY)
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "id": worker_id }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let registered = json_body(response).await;
    let worker_token = registered["access_token"].as_str().unwrap().to_string();

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/workers/poll")
                .header("x-worker-token", worker_token.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let polled = json_body(response).await;
    let assignment = polled["build"].clone();
    assert_eq!(assignment["id"].as_str().unwrap(), build_id);
    let otp = assignment["otp"].as_str().unwrap().to_string();
    let rotated_worker_token = polled["access_token"].as_str().unwrap().to_string();

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/builds/{build_id}/authenticate"))
                .header("x-build-token", build_token.clone())
                .header("content-type", "application/json")
                .body(Body::from(serde_json::json!({ "otp": otp }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let authenticated = json_body(response).await;
    let vm_token = authenticated["vm_token"].as_str().unwrap().to_string();

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/builds/{build_id}/certs-secure"))
                .header("x-vm-token", vm_token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result_boundary = "X-RESULT-BOUNDARY";
    let result_body = multipart_body(
        result_boundary,
        &[
            ("build_id", build_id.as_bytes()),
            ("success", b"true"),
            ("result", b"fake built artifact bytes"),
        ],
    );
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/workers/upload")
                .header("x-worker-token", rotated_worker_token)
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={result_boundary}"),
                )
                .body(Body::from(result_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/builds/{build_id}/download"))
                .header("x-build-token", build_token.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("content-disposition")
        .is_some());
    let downloaded = response.into_body().collect().await.expect("collect body").to_bytes();
    assert_eq!(&downloaded[..], b"fake built artifact bytes");

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/builds/{build_id}/download"))
                .header("x-build-token", "wrong-token-entirely")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/builds/statistics")
                .header("x-api-key", ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let stats = json_body(response).await;
    assert_eq!(stats["completed"], 1);
    assert_eq!(stats["pending"], 0);
}

#[tokio::test]
async fn retry_works_after_cancel_but_cancelling_twice_is_rejected() {
    let (router, _blobs) = test_app().await;
    let boundary = "X-TEST-BOUNDARY";
    let submit_body = multipart_body(boundary, &[("platform", b"android"), ("source", b"bytes")]);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/builds")
                .header("x-api-key", ADMIN_KEY)
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(submit_body))
                .unwrap(),
        )
        .await
        .unwrap();
    let submitted = json_body(response).await;
    let build_id = submitted["id"].as_str().unwrap().to_string();

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/builds/{build_id}/cancel"))
                .header("x-api-key", ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/builds/{build_id}/retry"))
                .header("x-api-key", ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/builds/{build_id}/cancel"))
                .header("x-api-key", ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
