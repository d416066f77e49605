//! Router assembly
//!
//! Static routes (health, metrics, auth, admin) are registered alongside
//! the bucket/key captures; axum gives static segments priority, so the
//! S3 wildcards are effectively matched last. Unmatched shapes fall
//! through to the NotImplemented responder.
//!
//! Middleware order matters: identity injection runs outermost so the
//! rate limiter can key on the resolved tenant; request accounting sits
//! between them.

use crate::auth_middleware::identity_layer;
use crate::metrics_middleware::metrics_layer;
use crate::ratelimit_middleware::ratelimit_layer;
use crate::s3::AppState;
use crate::{admin, health, s3};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the gateway router
pub fn build_router(state: Arc<AppState>) -> Router {
    let request_timeout = Duration::from_secs(state.config.network.read_timeout_secs);

    Router::new()
        // Health and metrics (no auth, no rate limit)
        .route("/health", get(health::health))
        .route("/health/live", get(health::health_live))
        .route("/health/ready", get(health::health_ready))
        .route("/health/backends", get(health::health_backends))
        .route("/metrics", get(health::metrics_endpoint))
        // Identity boundary
        .route("/auth/register", post(admin::register))
        .route("/auth/login", post(admin::login))
        .route("/auth/password-reset", post(admin::password_reset))
        .route(
            "/auth/password-reset/complete",
            post(admin::password_reset_complete),
        )
        // Administrative API
        .route("/api/v1/quota", get(admin::list_quotas))
        .route(
            "/api/v1/quota/{tenant_id}",
            get(admin::get_quota).put(admin::update_quota),
        )
        .route("/api/v1/usage/{tenant_id}", get(admin::usage_history))
        .route("/api/v1/usage/{tenant_id}/hot", get(admin::hot_keys))
        // S3 surface; static routes above always win over these captures
        .route("/", get(s3::list_buckets))
        .route(
            "/{bucket}",
            get(s3::list_objects)
                .put(s3::create_bucket)
                .delete(s3::delete_bucket)
                .head(s3::head_bucket),
        )
        .route(
            "/{bucket}/{*key}",
            get(s3::get_object_with_params)
                .put(s3::put_object_with_params)
                .delete(s3::delete_object_with_params)
                .head(s3::head_object)
                .post(s3::post_object),
        )
        // Anything outside the operation table
        .fallback(s3::not_implemented)
        .method_not_allowed_fallback(s3::not_implemented)
        // Innermost to outermost: rate limit -> accounting -> identity
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            ratelimit_layer,
        ))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            metrics_layer,
        ))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            identity_layer,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipart::MultipartRegistry;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use chrono::Utc;
    use http_body_util::BodyExt;
    use portico_auth::sigv4::{SignRequest, sign_headers};
    use portico_auth::{KeyStore, SigV4Verifier};
    use portico_common::{GatewayConfig, Plan, TenantId};
    use portico_events::{AccessPatternLog, EventPipeline};
    use portico_health::HealthRegistry;
    use portico_storage::{Engine, LocalFsDriver};
    use portico_tenant::{QuotaManager, RateLimiter, TenantDirectory};
    use std::sync::Arc;
    use std::time::Instant;
    use tower::ServiceExt;

    struct TestStack {
        _dir: tempfile::TempDir,
        state: Arc<AppState>,
        app: Router,
    }

    fn stack() -> TestStack {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new();
        engine.add_driver(Arc::new(LocalFsDriver::new("local", dir.path()).unwrap()));
        engine.set_primary("local").unwrap();

        let keys = Arc::new(KeyStore::new());
        let tenants = TenantDirectory::new(true);
        let quotas = QuotaManager::new();
        let test_tenant = TenantId::new_unchecked("test-tenant");
        quotas
            .create_tenant(
                test_tenant,
                Plan::Professional,
                Plan::Professional.storage_quota(),
            )
            .unwrap();

        let (events, rx) = EventPipeline::new(1000);
        // Tests leave the receiver in place so emits succeed.
        std::mem::forget(rx);

        let state = Arc::new(AppState {
            engine,
            tenants,
            quotas,
            keys: Arc::clone(&keys),
            verifier: SigV4Verifier::new(keys, "us-east-1"),
            limiter: RateLimiter::new(10_000),
            health: HealthRegistry::new(),
            events,
            patterns: Arc::new(AccessPatternLog::new()),
            uploads: MultipartRegistry::new(),
            config: GatewayConfig::default(),
            started_at: Instant::now(),
        });
        let app = build_router(Arc::clone(&state));
        TestStack {
            _dir: dir,
            state,
            app,
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, bytes::Bytes) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body)
    }

    fn req(method: &str, uri: &str, body: &'static [u8]) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if !body.is_empty() {
            builder = builder.header(header::CONTENT_LENGTH, body.len());
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let t = stack();
        let (status, headers, _) = send(&t.app, req("PUT", "/b/k.txt", b"hello")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.contains_key(header::ETAG));

        let (status, headers, body) = send(&t.app, req("GET", "/b/k.txt", b"")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"hello");
        assert_eq!(
            headers.get(header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );
        assert_eq!(headers.get("x-amz-version-id").unwrap(), "null");

        // ETag is stable across reads.
        let etag1 = headers.get(header::ETAG).unwrap().clone();
        let (_, headers, _) = send(&t.app, req("GET", "/b/k.txt", b"")).await;
        assert_eq!(headers.get(header::ETAG).unwrap(), &etag1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let t = stack();
        let (status, _, body) = send(&t.app, req("DELETE", "/b/missing", b"")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());

        send(&t.app, req("PUT", "/b/k.txt", b"data!")).await;
        let (status, _, _) = send(&t.app, req("DELETE", "/b/k.txt", b"")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _, _) = send(&t.app, req("DELETE", "/b/k.txt", b"")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_list_returns_all_keys() {
        let t = stack();
        for key in ["file1.txt", "file2.txt", "dir/file3.txt"] {
            let uri = format!("/b/{key}");
            let mut builder = Request::builder().method("PUT").uri(&uri);
            builder = builder.header(header::CONTENT_LENGTH, 1);
            let (status, _, _) =
                send(&t.app, builder.body(Body::from(&b"x"[..])).unwrap()).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, _, body) = send(&t.app, req("GET", "/b", b"")).await;
        assert_eq!(status, StatusCode::OK);
        let xml = String::from_utf8(body.to_vec()).unwrap();
        assert!(xml.contains("<Name>b</Name>"));
        assert_eq!(xml.matches("<Contents>").count(), 3);
        for key in ["file1.txt", "file2.txt", "dir/file3.txt"] {
            assert!(xml.contains(&format!("<Key>{key}</Key>")));
        }
    }

    #[tokio::test]
    async fn test_get_missing_key_is_no_such_key() {
        let t = stack();
        let (status, _, body) = send(&t.app, req("GET", "/b/none.txt", b"")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let xml = String::from_utf8(body.to_vec()).unwrap();
        assert!(xml.contains("<Code>NoSuchKey</Code>"));
        assert!(xml.contains("<Message>"));
    }

    #[tokio::test]
    async fn test_bucket_lifecycle() {
        let t = stack();
        let (status, _, _) = send(&t.app, req("PUT", "/photos", b"")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, _) = send(&t.app, req("HEAD", "/photos", b"")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, body) = send(&t.app, req("PUT", "/photos", b"")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(String::from_utf8_lossy(&body).contains("BucketAlreadyExists"));

        send(&t.app, req("PUT", "/photos/p.jpg", b"img")).await;
        let (status, _, body) = send(&t.app, req("DELETE", "/photos", b"")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(String::from_utf8_lossy(&body).contains("BucketNotEmpty"));

        send(&t.app, req("DELETE", "/photos/p.jpg", b"")).await;
        let (status, _, _) = send(&t.app, req("DELETE", "/photos", b"")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _, _) = send(&t.app, req("HEAD", "/photos", b"")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_bucket_name_rejected() {
        let t = stack();
        let (status, _, body) = send(&t.app, req("PUT", "/UPPER", b"")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8_lossy(&body).contains("InvalidBucketName"));
    }

    #[tokio::test]
    async fn test_unknown_operation_is_not_implemented() {
        let t = stack();
        // POST on an object without multipart hints is outside the table.
        let (status, _, body) = send(&t.app, req("POST", "/b/k.txt", b"")).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert!(String::from_utf8_lossy(&body).contains("NotImplemented"));

        // POST on a bucket has no route at all.
        let (status, _, _) = send(&t.app, req("POST", "/b", b"")).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_missing_content_length_rejected() {
        let t = stack();
        let request = Request::builder()
            .method("PUT")
            .uri("/b/k.txt")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&t.app, request).await;
        assert_eq!(status, StatusCode::LENGTH_REQUIRED);
        assert!(String::from_utf8_lossy(&body).contains("MissingContentLength"));
    }

    #[tokio::test]
    async fn test_range_request() {
        let t = stack();
        send(&t.app, req("PUT", "/b/k.bin", b"0123456789")).await;

        let request = Request::builder()
            .method("GET")
            .uri("/b/k.bin")
            .header(header::RANGE, "bytes=2-5")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(&t.app, request).await;
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(&body[..], b"2345");
        assert_eq!(
            headers.get(header::CONTENT_RANGE).unwrap(),
            "bytes 2-5/10"
        );
    }

    #[tokio::test]
    async fn test_head_object_matches_get_headers() {
        let t = stack();
        send(&t.app, req("PUT", "/b/k.txt", b"hello")).await;
        let (status, headers, body) = send(&t.app, req("HEAD", "/b/k.txt", b"")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert_eq!(headers.get(header::CONTENT_LENGTH).unwrap(), "5");
        assert!(headers.contains_key(header::ETAG));
        assert!(headers.contains_key(header::LAST_MODIFIED));
        assert_eq!(headers.get(header::ACCEPT_RANGES).unwrap(), "bytes");
    }

    #[tokio::test]
    async fn test_rate_limit_keys_on_tenant() {
        let t = stack();
        // The synthetic tenant runs at 100 rps => burst 200: the first
        // 200 requests always fit the bucket.
        for _ in 0..200 {
            let (status, _, _) = send(&t.app, req("HEAD", "/warm", b"")).await;
            assert_ne!(status, StatusCode::TOO_MANY_REQUESTS);
        }
        // Refill may admit a stray token while the loop runs; the limiter
        // must trip within a few more requests regardless.
        let mut denied_headers = None;
        for _ in 0..25 {
            let (status, headers, _) = send(&t.app, req("HEAD", "/warm", b"")).await;
            if status == StatusCode::TOO_MANY_REQUESTS {
                denied_headers = Some(headers);
                break;
            }
        }
        let headers = denied_headers.expect("rate limiter never tripped");
        assert!(headers.contains_key("X-RateLimit-Limit"));
        assert!(headers.contains_key("X-RateLimit-Remaining"));
        assert!(headers.contains_key("X-RateLimit-Reset"));

        // A different tenant with no prior traffic is untouched.
        let (_, _, body) = send(
            &t.app,
            Request::builder()
                .method("POST")
                .uri("/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"tenant_id":"fresh","plan":"professional"}"#))
                .unwrap(),
        )
        .await;
        let registered: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let signed = signed_request(
            "HEAD",
            "/warm",
            registered["access_key_id"].as_str().unwrap(),
            registered["secret_access_key"].as_str().unwrap(),
        );
        let (status, _, _) = send(&t.app, signed).await;
        assert_ne!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_quota_rejection_surfaces_as_invalid_request() {
        let t = stack();
        // Shrink the synthetic tenant's limit below the upload size.
        let tenant = TenantId::new_unchecked("test-tenant");
        t.state.quotas.update_quota(&tenant, 3).unwrap();

        let (status, _, body) = send(&t.app, req("PUT", "/b/k.txt", b"hello")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let xml = String::from_utf8_lossy(&body);
        assert!(xml.contains("<Code>InvalidRequest</Code>"));
        assert!(xml.contains("insufficient quota"));

        // Nothing was written and nothing stayed reserved.
        let usage = t.state.quotas.get_usage(&tenant).unwrap();
        assert_eq!(usage.used_bytes, 0);
        assert_eq!(usage.reserved_bytes, 0);
        let (status, _, _) = send(&t.app, req("GET", "/b/k.txt", b"")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_quota_commit_and_delete_accounting() {
        let t = stack();
        let tenant = TenantId::new_unchecked("test-tenant");
        send(&t.app, req("PUT", "/b/k.txt", b"hello")).await;
        let usage = t.state.quotas.get_usage(&tenant).unwrap();
        assert_eq!(usage.used_bytes, 5);
        assert_eq!(usage.reserved_bytes, 0);

        send(&t.app, req("DELETE", "/b/k.txt", b"")).await;
        let usage = t.state.quotas.get_usage(&tenant).unwrap();
        assert_eq!(usage.used_bytes, 0);
    }

    fn signed_request(method: &str, uri: &str, access_key: &str, secret: &str) -> Request<Body> {
        let sign = SignRequest {
            method,
            path: uri,
            query: &[],
            host: "gateway.test",
            payload_hash: None,
            access_key,
            secret_key: secret,
            region: "us-east-1",
            now: Utc::now(),
        };
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in sign_headers(&sign) {
            builder = builder.header(name, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_signed_request_round_trip_and_isolation() {
        let t = stack();

        // Register two tenants.
        let mut creds = Vec::new();
        for tenant in ["alpha", "beta"] {
            let (_, _, body) = send(
                &t.app,
                Request::builder()
                    .method("POST")
                    .uri("/auth/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(format!(
                        r#"{{"tenant_id":"{tenant}","plan":"starter"}}"#
                    )))
                    .unwrap(),
            )
            .await;
            let registered: serde_json::Value = serde_json::from_slice(&body).unwrap();
            creds.push((
                registered["access_key_id"].as_str().unwrap().to_string(),
                registered["secret_access_key"].as_str().unwrap().to_string(),
            ));
        }

        // Each tenant writes a different body under the SAME bucket/key.
        for (i, (ak, sk)) in creds.iter().enumerate() {
            let payload = format!("tenant-{i}-data");
            let sign = SignRequest {
                method: "PUT",
                path: "/shared/k.txt",
                query: &[],
                host: "gateway.test",
                payload_hash: None,
                access_key: ak,
                secret_key: sk,
                region: "us-east-1",
                now: Utc::now(),
            };
            let mut builder = Request::builder()
                .method("PUT")
                .uri("/shared/k.txt")
                .header(header::CONTENT_LENGTH, payload.len());
            for (name, value) in sign_headers(&sign) {
                builder = builder.header(name, value);
            }
            let (status, _, _) = send(&t.app, builder.body(Body::from(payload)).unwrap()).await;
            assert_eq!(status, StatusCode::OK);
        }

        // Each tenant reads back only its own bytes.
        for (i, (ak, sk)) in creds.iter().enumerate() {
            let (status, _, body) =
                send(&t.app, signed_request("GET", "/shared/k.txt", ak, sk)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(&body[..], format!("tenant-{i}-data").as_bytes());
        }

        // A tampered signature is rejected.
        let (ak, sk) = &creds[0];
        let mut bad = sk.clone();
        bad.replace_range(0..1, "?");
        let (status, _, body) =
            send(&t.app, signed_request("GET", "/shared/k.txt", ak, &bad)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(String::from_utf8_lossy(&body).contains("SignatureDoesNotMatch"));
    }

    #[tokio::test]
    async fn test_multipart_upload_flow() {
        let t = stack();

        let (status, _, body) = send(&t.app, req("POST", "/b/big.bin?uploads", b"")).await;
        assert_eq!(status, StatusCode::OK);
        let xml = String::from_utf8(body.to_vec()).unwrap();
        let upload_id = xml
            .split("<UploadId>")
            .nth(1)
            .and_then(|s| s.split("</UploadId>").next())
            .unwrap()
            .to_string();

        for (n, data) in [(1u32, &b"first-"[..]), (2u32, &b"second"[..])] {
            let uri = format!("/b/big.bin?partNumber={n}&uploadId={upload_id}");
            let builder = Request::builder()
                .method("PUT")
                .uri(&uri)
                .header(header::CONTENT_LENGTH, data.len());
            let (status, headers, _) =
                send(&t.app, builder.body(Body::from(data)).unwrap()).await;
            assert_eq!(status, StatusCode::OK);
            assert!(headers.contains_key(header::ETAG));
        }

        // List parts shows both.
        let (status, _, body) = send(
            &t.app,
            req_string("GET", &format!("/b/big.bin?uploadId={upload_id}")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let xml = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(xml.matches("<Part>").count(), 2);

        // Complete assembles in order.
        let complete = format!(
            "<CompleteMultipartUpload>\
             <Part><PartNumber>1</PartNumber><ETag>\"a\"</ETag></Part>\
             <Part><PartNumber>2</PartNumber><ETag>\"b\"</ETag></Part>\
             </CompleteMultipartUpload>"
        );
        let uri = format!("/b/big.bin?uploadId={upload_id}");
        let request = Request::builder()
            .method("POST")
            .uri(&uri)
            .header(header::CONTENT_LENGTH, complete.len())
            .body(Body::from(complete))
            .unwrap();
        let (status, _, body) = send(&t.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8_lossy(&body).contains("CompleteMultipartUploadResult"));

        let (status, _, body) = send(&t.app, req("GET", "/b/big.bin", b"")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"first-second");

        // Scratch parts are invisible in listings.
        let (_, _, body) = send(&t.app, req("GET", "/b", b"")).await;
        let xml = String::from_utf8(body.to_vec()).unwrap();
        assert!(!xml.contains(".mpu/"));
        assert_eq!(xml.matches("<Contents>").count(), 1);
    }

    #[tokio::test]
    async fn test_multipart_abort_reclaims_parts() {
        let t = stack();
        let tenant = TenantId::new_unchecked("test-tenant");

        let (_, _, body) = send(&t.app, req("POST", "/b/big.bin?uploads", b"")).await;
        let xml = String::from_utf8(body.to_vec()).unwrap();
        let upload_id = xml
            .split("<UploadId>")
            .nth(1)
            .and_then(|s| s.split("</UploadId>").next())
            .unwrap()
            .to_string();

        let uri = format!("/b/big.bin?partNumber=1&uploadId={upload_id}");
        let request = Request::builder()
            .method("PUT")
            .uri(&uri)
            .header(header::CONTENT_LENGTH, 4)
            .body(Body::from(&b"data"[..]))
            .unwrap();
        send(&t.app, request).await;
        assert_eq!(t.state.quotas.get_usage(&tenant).unwrap().used_bytes, 4);

        let (status, _, _) = send(
            &t.app,
            req_string("DELETE", &format!("/b/big.bin?uploadId={upload_id}")),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(t.state.quotas.get_usage(&tenant).unwrap().used_bytes, 0);
        assert_eq!(t.state.uploads.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let t = stack();
        t.state
            .health
            .record_probe("lyve", Ok(std::time::Duration::from_millis(5)));
        t.state
            .health
            .record_probe("quotaless", Err("connection refused".into()));

        let (status, _, body) = send(&t.app, req("GET", "/health", b"")).await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "degraded");
        assert_eq!(parsed["backends_healthy"], 1);
        assert_eq!(parsed["backends_total"], 2);

        t.state
            .health
            .record_probe("lyve", Err("connection refused".into()));
        let (status, _, body) = send(&t.app, req("GET", "/health", b"")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "unhealthy");

        let (status, _, body) = send(&t.app, req("GET", "/health/live", b"")).await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "alive");

        let (status, _, body) = send(&t.app, req("GET", "/health/ready", b"")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["ready"], false);

        let (status, _, body) = send(&t.app, req("GET", "/health/backends", b"")).await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(parsed["lyve"]["score"].is_number());
        assert_eq!(parsed["quotaless"]["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_metrics_endpoint_counts_requests() {
        let t = stack();
        send(&t.app, req("PUT", "/b/k.txt", b"hello")).await;
        send(&t.app, req("GET", "/b/k.txt", b"")).await;

        let (status, _, body) = send(&t.app, req("GET", "/metrics", b"")).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("portico_requests_total"));
        assert!(text.contains("operation=\"PutObject\""));
        assert!(text.contains("portico_rate_limiter_tracked"));
    }

    #[tokio::test]
    async fn test_admin_quota_endpoints() {
        let t = stack();
        send(&t.app, req("PUT", "/b/k.txt", b"hello")).await;

        let (status, _, body) =
            send(&t.app, req("GET", "/api/v1/quota/test-tenant", b"")).await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["used_bytes"], 5);

        let (status, _, body) =
            send(&t.app, req("GET", "/api/v1/usage/test-tenant", b"")).await;
        assert_eq!(status, StatusCode::OK);
        let history: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(history.as_array().unwrap().len() >= 2);

        let (status, _, body) =
            send(&t.app, req("GET", "/api/v1/usage/test-tenant/hot", b"")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with(b"["));
    }

    fn req_string(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }
}
