// End-to-end S3 store tests with LocalStack
// Require Docker: cargo test --test integration_tests -- --ignored

use std::sync::Arc;
use std::time::Duration;

use kagami::blob::Blob;
use kagami::config::S3StoreConfig;
use kagami::engine::EngineBuilder;
use kagami::loader::{Loader, LoaderError};
use kagami::storage::Storage;
use kagami::store::s3::S3Store;
use testcontainers::{clients::Cli, RunnableImage};
use testcontainers_modules::localstack::LocalStack;

use super::test_harness::fixture_png;

const BUCKET: &str = "kagami-test";

fn store_config(endpoint: &str) -> S3StoreConfig {
    S3StoreConfig {
        bucket: BUCKET.to_string(),
        region: "us-east-1".to_string(),
        endpoint: Some(endpoint.to_string()),
        access_key: "test".to_string(),
        secret_key: "test".to_string(),
        base_dir: "images".to_string(),
        force_path_style: true,
        ..Default::default()
    }
}

async fn create_bucket(endpoint: &str) {
    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .endpoint_url(endpoint)
        .region(aws_config::Region::new("us-east-1"))
        .credentials_provider(aws_credential_types::Credentials::new(
            "test", "test", None, None, "test",
        ))
        .load()
        .await;
    let s3_config = aws_sdk_s3::config::Builder::from(&config)
        .force_path_style(true)
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
        .create_bucket()
        .bucket(BUCKET)
        .send()
        .await
        .expect("Should be able to create bucket");
}

#[test]
#[ignore] // Requires Docker
fn test_s3_store_put_then_fetch() {
    let docker = Cli::default();
    let container =
        docker.run(RunnableImage::from(LocalStack::default()).with_env_var(("SERVICES", "s3")));
    let endpoint = format!("http://127.0.0.1:{}", container.get_host_port_ipv4(4566));

    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        create_bucket(&endpoint).await;
        let store = S3Store::connect(&store_config(&endpoint)).await;

        let png = fixture_png(16, 16);
        Storage::put(&store, "cats/cat.png", &Blob::new(png.clone(), "image/png"))
            .await
            .expect("put should succeed");

        let blob = Loader::fetch(&store, "cats/cat.png").await.unwrap();
        assert_eq!(blob.bytes().as_ref(), png.as_slice());
        assert_eq!(blob.content_type(), "image/png");

        assert_eq!(
            Loader::fetch(&store, "cats/missing.png").await.unwrap_err(),
            LoaderError::NotFound
        );
    });
}

#[test]
#[ignore] // Requires Docker
fn test_engine_with_s3_loader_and_storage() {
    let docker = Cli::default();
    let container =
        docker.run(RunnableImage::from(LocalStack::default()).with_env_var(("SERVICES", "s3")));
    let endpoint = format!("http://127.0.0.1:{}", container.get_host_port_ipv4(4566));

    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        create_bucket(&endpoint).await;
        let store = Arc::new(S3Store::connect(&store_config(&endpoint)).await);
        Storage::put(
            store.as_ref(),
            "cat.png",
            &Blob::new(fixture_png(40, 20), "image/png"),
        )
        .await
        .unwrap();

        let engine = EngineBuilder::new()
            .with_loaders(vec![store.clone() as Arc<dyn Loader>])
            .with_storages(vec![store.clone() as Arc<dyn Storage>])
            .build();

        let blob = engine.process("unsafe/20x10/cat.png", true).await.unwrap();
        assert_eq!(blob.content_type(), "image/png");

        // No processor registered, so the source is written back under the fingerprint
        tokio::time::sleep(Duration::from_millis(500)).await;
        let saved = Loader::fetch(store.as_ref(), "20x10/cat.png").await.unwrap();
        assert_eq!(saved.bytes(), blob.bytes());
    });
}
