use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgb};
use poem::http::StatusCode;
use poem::test::TestClient;
use poem::Endpoint;
use serde_json::json;

use crate::config::{CommitOrder, OptimizerSettings};
use crate::controller::Optimizer;
use crate::locator::StorageLocator;
use crate::storage::{ObjectStoreGateway, StorageBackend, StoreError};

const TOKEN: &str = "top-secret";
const BASE_URL: &str = "https://s3.ap-south-1.amazonaws.com";
const SOURCE_BUCKET: &str = "originals";
const OPTIMIZED_BUCKET: &str = "optimised";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Fetch(String),
    Store(String),
    Delete(String),
}

/// An in-memory object store that records every call made against it.
#[derive(Default)]
struct RecordingBackend {
    objects: Mutex<HashMap<(String, String), Bytes>>,
    calls: Mutex<Vec<Call>>,
    fail_uploads: AtomicBool,
}

impl RecordingBackend {
    fn insert(&self, container: &str, key: &str, data: impl Into<Bytes>) {
        self.objects
            .lock()
            .unwrap()
            .insert((container.to_string(), key.to_string()), data.into());
    }

    fn get(&self, container: &str, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(&(container.to_string(), key.to_string()))
            .cloned()
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn slot(locator: &StorageLocator) -> (String, String) {
    (locator.container().to_string(), locator.key().to_string())
}

#[async_trait]
impl StorageBackend for RecordingBackend {
    async fn store(
        &self,
        locator: &StorageLocator,
        data: Bytes,
        _content_type: &str,
    ) -> Result<(), StoreError> {
        self.record(Call::Store(locator.to_string()));

        if self.fail_uploads.load(Ordering::Relaxed) {
            return Err(StoreError::Transport("connection reset".to_string()));
        }

        self.objects.lock().unwrap().insert(slot(locator), data);
        Ok(())
    }

    async fn fetch(&self, locator: &StorageLocator) -> Result<Option<Bytes>, StoreError> {
        self.record(Call::Fetch(locator.to_string()));
        Ok(self.objects.lock().unwrap().get(&slot(locator)).cloned())
    }

    async fn delete(&self, locator: &StorageLocator) -> Result<(), StoreError> {
        self.record(Call::Delete(locator.to_string()));
        self.objects.lock().unwrap().remove(&slot(locator));
        Ok(())
    }
}

fn sample_jpeg() -> Vec<u8> {
    let img = ImageBuffer::from_fn(40, 30, |x, y| Rgb([(x * 6) as u8, (y * 8) as u8, 200]));
    let mut buff = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buff, ImageOutputFormat::Jpeg(90))
        .unwrap();
    buff.into_inner()
}

fn setup_environment(
    commit_order: CommitOrder,
) -> (TestClient<impl Endpoint>, Arc<RecordingBackend>) {
    let backend = Arc::new(RecordingBackend::default());
    let gateway = ObjectStoreGateway::new(backend.clone());

    let settings = OptimizerSettings {
        optimized_bucket: OPTIMIZED_BUCKET.to_string(),
        public_base_url: BASE_URL.to_string(),
        commit_order,
    };

    let optimizer = Arc::new(Optimizer::new(gateway, settings));
    let app = crate::routes::app(optimizer, TOKEN.to_string());

    (TestClient::new(app), backend)
}

#[tokio::test]
async fn test_ping_needs_no_token() {
    let (app, _) = setup_environment(CommitOrder::DeleteFirst);

    let res = app.get("/").send().await;
    res.assert_status_is_ok();
    res.assert_json(json!({ "message": "pong" })).await;
}

#[tokio::test]
async fn test_missing_token_is_rejected_before_any_stage() {
    let (app, backend) = setup_environment(CommitOrder::DeleteFirst);
    backend.insert(SOURCE_BUCKET, "images/pic.jpg", sample_jpeg());

    let res = app
        .post("/optimize/")
        .body_json(&json!({ "S3_URL": "s3://originals/images/pic.jpg" }))
        .send()
        .await;

    res.assert_status(StatusCode::UNAUTHORIZED);
    res.assert_json(json!({ "error": "API token required" })).await;
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_wrong_token_is_rejected_before_any_stage() {
    let (app, backend) = setup_environment(CommitOrder::DeleteFirst);
    backend.insert(SOURCE_BUCKET, "images/pic.jpg", sample_jpeg());

    let res = app
        .post("/optimize/")
        .header("token", "not-the-token")
        .body_json(&json!({ "S3_URL": "s3://originals/images/pic.jpg" }))
        .send()
        .await;

    res.assert_status(StatusCode::UNAUTHORIZED);
    res.assert_json(json!({ "error": "Invalid API token" })).await;
    assert!(backend.calls().is_empty());
    assert!(backend.get(SOURCE_BUCKET, "images/pic.jpg").is_some());
}

#[tokio::test]
async fn test_token_is_checked_before_the_body() {
    let (app, _) = setup_environment(CommitOrder::DeleteFirst);

    let res = app
        .post("/optimize/")
        .body_json(&json!({ "wrong": 1 }))
        .send()
        .await;

    res.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_body_is_unprocessable() {
    let (app, backend) = setup_environment(CommitOrder::DeleteFirst);

    for mistyped in [json!(42), json!(true), json!(null), json!(["s3://originals/a.jpg"])] {
        let res = app
            .post("/optimize/")
            .header("token", TOKEN)
            .body_json(&json!({ "S3_URL": mistyped }))
            .send()
            .await;
        res.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let res = app
        .post("/optimize/")
        .header("token", TOKEN)
        .body_json(&json!({}))
        .send()
        .await;
    res.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_optimize_route_is_reachable_with_and_without_slash() {
    for path in ["/optimize/", "/optimize"] {
        let (app, backend) = setup_environment(CommitOrder::DeleteFirst);
        backend.insert(SOURCE_BUCKET, "pic.jpg", sample_jpeg());

        let res = app
            .post(path)
            .header("token", TOKEN)
            .body_json(&json!({ "S3_URL": "s3://originals/pic.jpg" }))
            .send()
            .await;

        res.assert_status_is_ok();
        assert_eq!(backend.calls().len(), 3);
        assert!(backend.get(OPTIMIZED_BUCKET, "pic").is_some());
    }
}

#[tokio::test]
async fn test_jpeg_is_optimised_and_replaced() {
    let (app, backend) = setup_environment(CommitOrder::DeleteFirst);
    backend.insert(SOURCE_BUCKET, "images/pic.jpg", sample_jpeg());

    let res = app
        .post("/optimize/")
        .header("token", TOKEN)
        .body_json(&json!({ "S3_URL": "s3://originals/images/pic.jpg" }))
        .send()
        .await;

    res.assert_status_is_ok();
    res.assert_json(json!({
        "message": "Image optimized successfully",
        "url": "https://s3.ap-south-1.amazonaws.com/optimised/images/pic",
    }))
    .await;

    assert!(backend.get(SOURCE_BUCKET, "images/pic.jpg").is_none());

    let stored = backend
        .get(OPTIMIZED_BUCKET, "images/pic")
        .expect("optimised image stored");
    assert_eq!(&stored[0..4], b"RIFF");
    assert_eq!(&stored[8..12], b"WEBP");

    assert_eq!(
        backend.calls(),
        vec![
            Call::Fetch("s3://originals/images/pic.jpg".to_string()),
            Call::Delete("s3://originals/images/pic.jpg".to_string()),
            Call::Store("s3://optimised/images/pic".to_string()),
        ],
    );
}

#[tokio::test]
async fn test_every_url_shape_is_accepted() {
    let shapes = [
        "s3://originals/images/pic.png",
        "https://s3.ap-south-1.amazonaws.com/originals/images/pic.png",
        "https://originals.s3.ap-south-1.amazonaws.com/images/pic.png",
    ];

    for shape in shapes {
        let (app, backend) = setup_environment(CommitOrder::DeleteFirst);
        backend.insert(SOURCE_BUCKET, "images/pic.png", sample_jpeg());

        let res = app
            .post("/optimize/")
            .header("token", TOKEN)
            .body_json(&json!({ "S3_URL": shape }))
            .send()
            .await;

        res.assert_status_is_ok();
        assert!(backend.get(OPTIMIZED_BUCKET, "images/pic").is_some());
    }
}

#[tokio::test]
async fn test_missing_object_stops_before_delete() {
    let (app, backend) = setup_environment(CommitOrder::DeleteFirst);
    backend.insert(SOURCE_BUCKET, "images/other.jpg", sample_jpeg());

    let res = app
        .post("/optimize/")
        .header("token", TOKEN)
        .body_json(&json!({ "S3_URL": "s3://originals/images/missing.jpg" }))
        .send()
        .await;

    res.assert_status(StatusCode::NOT_FOUND);
    res.assert_json(json!({
        "error": "object s3://originals/images/missing.jpg does not exist",
        "stage": "download",
    }))
    .await;

    assert_eq!(
        backend.calls(),
        vec![Call::Fetch("s3://originals/images/missing.jpg".to_string())],
    );
    assert!(backend.get(SOURCE_BUCKET, "images/other.jpg").is_some());
}

#[tokio::test]
async fn test_empty_object_is_rejected() {
    let (app, backend) = setup_environment(CommitOrder::DeleteFirst);
    backend.insert(SOURCE_BUCKET, "empty.png", Bytes::new());

    let res = app
        .post("/optimize/")
        .header("token", TOKEN)
        .body_json(&json!({ "S3_URL": "s3://originals/empty.png" }))
        .send()
        .await;

    res.assert_status(StatusCode::BAD_REQUEST);
    res.assert_json(json!({
        "error": "object s3://originals/empty.png is empty",
        "stage": "download",
    }))
    .await;
    assert!(backend.get(SOURCE_BUCKET, "empty.png").is_some());
}

#[tokio::test]
async fn test_corrupt_image_is_never_deleted_or_uploaded() {
    let (app, backend) = setup_environment(CommitOrder::DeleteFirst);
    backend.insert(SOURCE_BUCKET, "broken.jpg", Bytes::from_static(b"not really a jpeg"));

    let res = app
        .post("/optimize/")
        .header("token", TOKEN)
        .body_json(&json!({ "S3_URL": "s3://originals/broken.jpg" }))
        .send()
        .await;

    res.assert_status(StatusCode::BAD_REQUEST);
    let body = res.json().await;
    body.value().object().get("stage").assert_string("transcode");

    assert_eq!(backend.calls(), vec![Call::Fetch("s3://originals/broken.jpg".to_string())]);
    assert!(backend.get(SOURCE_BUCKET, "broken.jpg").is_some());
}

#[tokio::test]
async fn test_unsupported_scheme_fails_to_resolve() {
    let (app, backend) = setup_environment(CommitOrder::DeleteFirst);

    let res = app
        .post("/optimize/")
        .header("token", TOKEN)
        .body_json(&json!({ "S3_URL": "ftp://originals/pic.jpg" }))
        .send()
        .await;

    res.assert_status(StatusCode::BAD_REQUEST);
    let body = res.json().await;
    body.value().object().get("stage").assert_string("resolve");
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_failed_upload_after_delete_loses_the_original() {
    let (app, backend) = setup_environment(CommitOrder::DeleteFirst);
    backend.insert(SOURCE_BUCKET, "images/pic.jpg", sample_jpeg());
    backend.fail_uploads.store(true, Ordering::Relaxed);

    let res = app
        .post("/optimize/")
        .header("token", TOKEN)
        .body_json(&json!({ "S3_URL": "s3://originals/images/pic.jpg" }))
        .send()
        .await;

    res.assert_status(StatusCode::BAD_REQUEST);
    let body = res.json().await;
    body.value().object().get("stage").assert_string("upload");

    assert!(backend.get(SOURCE_BUCKET, "images/pic.jpg").is_none());
    assert!(backend.get(OPTIMIZED_BUCKET, "images/pic").is_none());
}

#[tokio::test]
async fn test_upload_first_keeps_the_original_on_failure() {
    let (app, backend) = setup_environment(CommitOrder::UploadFirst);
    backend.insert(SOURCE_BUCKET, "images/pic.jpg", sample_jpeg());
    backend.fail_uploads.store(true, Ordering::Relaxed);

    let res = app
        .post("/optimize/")
        .header("token", TOKEN)
        .body_json(&json!({ "S3_URL": "s3://originals/images/pic.jpg" }))
        .send()
        .await;

    res.assert_status(StatusCode::BAD_REQUEST);
    assert!(backend.get(SOURCE_BUCKET, "images/pic.jpg").is_some());
    assert_eq!(
        backend.calls(),
        vec![
            Call::Fetch("s3://originals/images/pic.jpg".to_string()),
            Call::Store("s3://optimised/images/pic".to_string()),
        ],
    );
}

#[tokio::test]
async fn test_upload_first_deletes_after_upload() {
    let (app, backend) = setup_environment(CommitOrder::UploadFirst);
    backend.insert(SOURCE_BUCKET, "images/pic.png", sample_jpeg());

    let res = app
        .post("/optimize/")
        .header("token", TOKEN)
        .body_json(&json!({ "S3_URL": "s3://originals/images/pic.png" }))
        .send()
        .await;

    res.assert_status_is_ok();
    assert!(backend.get(SOURCE_BUCKET, "images/pic.png").is_none());
    assert!(backend.get(OPTIMIZED_BUCKET, "images/pic").is_some());
    assert_eq!(
        backend.calls(),
        vec![
            Call::Fetch("s3://originals/images/pic.png".to_string()),
            Call::Store("s3://optimised/images/pic".to_string()),
            Call::Delete("s3://originals/images/pic.png".to_string()),
        ],
    );
}

#[tokio::test]
async fn test_upload_first_in_place_skips_delete() {
    let (app, backend) = setup_environment(CommitOrder::UploadFirst);
    backend.insert(OPTIMIZED_BUCKET, "images/pic", sample_jpeg());

    let res = app
        .post("/optimize/")
        .header("token", TOKEN)
        .body_json(&json!({ "S3_URL": "s3://optimised/images/pic" }))
        .send()
        .await;

    res.assert_status_is_ok();
    let stored = backend.get(OPTIMIZED_BUCKET, "images/pic").unwrap();
    assert_eq!(&stored[8..12], b"WEBP");
    assert!(!backend.calls().iter().any(|call| matches!(call, Call::Delete(_))));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (app, _) = setup_environment(CommitOrder::DeleteFirst);

    let res = app.get("/nothing-here").header("token", TOKEN).send().await;
    res.assert_status(StatusCode::NOT_FOUND);
    res.assert_json(json!({ "error": "Page not found" })).await;

    let res = app.get("/nothing-here").send().await;
    res.assert_status(StatusCode::UNAUTHORIZED);
}
