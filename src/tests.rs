use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use serde_json::{json, Value};
use crate::core::*;

struct StaticBroker;

#[async_trait]
impl SignatureBroker for StaticBroker {
    async fn request_ticket(&self, _resource_type: ResourceType) -> Result<UploadTicket> {
        Ok(UploadTicket {
            signature: "sig".into(),
            timestamp: "1".into(),
            api_key: "key".into(),
            folder: None,
        })
    }
}

/// Replies with a fixed body and reports the whole payload as sent
struct EchoTransport {
    body: Value,
}

#[async_trait]
impl StorageTransport for EchoTransport {
    async fn send(&self, request: TransferRequest, progress: ProgressCallback) -> Result<ProviderResponse> {
        progress(ProgressInfo {
            bytes_loaded: request.payload_len,
            bytes_total: request.payload_len,
        });
        Ok(ProviderResponse::from_body(self.body.clone()))
    }
}

struct AcceptingCatalog;

#[async_trait]
impl ContentCatalog for AcceptingCatalog {
    async fn register(&self, payload: &Value) -> Result<Value> {
        Ok(json!({ "title": payload["title"] }))
    }
}

fn manager(body: Value, cache_dir: &std::path::Path) -> UploadManager {
    let config = TransferConfig {
        chunk_size: 8,
        chunk_threshold: 16,
        request_timeout: Duration::from_secs(1),
        cache_dir: cache_dir.to_path_buf(),
    };

    UploadManager::new(
        Arc::new(StaticBroker),
        Arc::new(EchoTransport { body }),
        Arc::new(AcceptingCatalog),
        config,
    )
}

// 创建测试文件
async fn create_test_asset(dir: &std::path::Path, name: &str, size: usize, mime: &str) -> SourceAsset {
    let path = dir.join(name);
    tokio::fs::write(&path, vec![7u8; size]).await.unwrap();
    SourceAsset::new(path, size as u64, mime, name)
}

fn stored() -> Value {
    json!({ "public_id": "p1", "secure_url": "https://cdn.example/p1" })
}

#[tokio::test]
async fn test_filtered_receiver_only_yields_matching_events() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(stored(), dir.path());
    let mut completions = manager.subscribe_filtered(|event| matches!(event, UploadEvent::Completed { .. }));

    let asset = create_test_asset(dir.path(), "a.png", 4, "image/png").await;
    let handle = manager.submit(UploadRequest::image(asset).with_metadata(ContentMetadata::new("Clip"))).await.unwrap();
    let id = handle.id();

    let event = tokio::time::timeout(Duration::from_secs(5), completions.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        UploadEvent::Completed { upload_id, result } => {
            assert_eq!(upload_id, id);
            assert_eq!(result.remote_id, "p1");
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_dropped_handle_does_not_stop_job() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(stored(), dir.path());
    let mut events = manager.subscribe_filtered(|event| {
        matches!(event, UploadEvent::Completed { .. } | UploadEvent::Failed { .. })
    });

    let asset = create_test_asset(dir.path(), "a.mp4", 20, "video/mp4").await;
    let id = manager.submit(UploadRequest::video(asset).with_metadata(ContentMetadata::new("Clip"))).await.unwrap().id();

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, UploadEvent::Completed { .. }));
    assert_eq!(manager.registry().get(id).unwrap().status, UploadState::Completed);
}

#[tokio::test]
async fn test_missing_identifiers_fail_the_transfer() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(json!({ "done": true }), dir.path());

    let asset = create_test_asset(dir.path(), "a.mp4", 20, "video/mp4").await;
    let err = manager.upload(UploadRequest::video(asset).with_metadata(ContentMetadata::new("Clip"))).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transfer);
    assert!(err.to_string().contains("public_id"));
}

#[tokio::test]
async fn test_outcome_includes_catalog_entry() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(stored(), dir.path());

    let asset = create_test_asset(dir.path(), "a.mp4", 4, "video/mp4").await;
    let outcome = manager
        .upload(UploadRequest::video(asset).with_metadata(ContentMetadata::new("Hello")))
        .await
        .unwrap();

    assert_eq!(outcome.catalog_entry, json!({ "title": "Hello" }));
    assert_eq!(manager.registry().active_count(), 0);
    assert_eq!(manager.clear_terminal(), 1);
}
