// HTTP loader tests against a local mock origin

use std::sync::Arc;
use std::time::Duration;

use kagami::config::HttpLoaderConfig;
use kagami::engine::EngineBuilder;
use kagami::error::GatewayError;
use kagami::loader::http::HttpLoader;
use kagami::loader::{Loader, LoaderError};
use kagami::processor::image::{ImageOptions, ImageProcessor};
use kagami::processor::Processor;

use super::test_harness::{dimensions_of, fixture_png, MockOrigin};

fn loader(config: HttpLoaderConfig) -> HttpLoader {
    HttpLoader::new(&config).expect("client should build")
}

#[tokio::test]
async fn test_fetch_success_sniffs_content_type() {
    let png = fixture_png(8, 8);
    let origin = MockOrigin::builder()
        .route("/cat.png", 200, "application/octet-stream", &png)
        .start()
        .await;

    let blob = loader(HttpLoaderConfig::default())
        .fetch(&origin.url("/cat.png"))
        .await
        .unwrap();
    assert_eq!(blob.bytes().as_ref(), png.as_slice());
    assert_eq!(blob.content_type(), "image/png");
}

#[tokio::test]
async fn test_status_mapping() {
    let origin = MockOrigin::builder()
        .route("/gone.png", 410, "text/plain", b"gone")
        .route("/private.png", 403, "text/plain", b"no")
        .route("/broken.png", 500, "text/plain", b"oops")
        .start()
        .await;
    let loader = loader(HttpLoaderConfig::default());

    assert_eq!(
        loader.fetch(&origin.url("/missing.png")).await.unwrap_err(),
        LoaderError::NotFound
    );
    assert_eq!(
        loader.fetch(&origin.url("/gone.png")).await.unwrap_err(),
        LoaderError::NotFound
    );
    assert!(matches!(
        loader.fetch(&origin.url("/private.png")).await.unwrap_err(),
        LoaderError::Forbidden(_)
    ));
    assert!(matches!(
        loader.fetch(&origin.url("/broken.png")).await.unwrap_err(),
        LoaderError::Transport(_)
    ));
}

#[tokio::test]
async fn test_size_limit_uses_content_length() {
    let origin = MockOrigin::builder()
        .route("/big.png", 200, "image/png", &[0u8; 2048])
        .start()
        .await;
    let loader = loader(HttpLoaderConfig {
        max_allowed_size: 1024,
        ..Default::default()
    });

    assert_eq!(
        loader.fetch(&origin.url("/big.png")).await.unwrap_err(),
        LoaderError::SizeExceeded {
            size: 2048,
            limit: 1024
        }
    );
}

#[tokio::test]
async fn test_size_limit_stops_reading_chunked_body() {
    const CHUNK: usize = 16 * 1024;
    const CHUNKS: usize = 4096;
    let origin = MockOrigin::builder()
        .chunked_route("/endless.png", &[0u8; CHUNK], CHUNKS)
        .start()
        .await;
    let loader = loader(HttpLoaderConfig {
        max_allowed_size: 1024,
        ..Default::default()
    });

    let err = loader.fetch(&origin.url("/endless.png")).await.unwrap_err();
    let LoaderError::SizeExceeded { size, limit } = err else {
        panic!("expected SizeExceeded, got {err:?}");
    };
    assert_eq!(limit, 1024);
    assert!(size <= (2 * CHUNK) as u64, "read {size} bytes before stopping");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(
        origin.bytes_sent() < CHUNK * CHUNKS / 2,
        "origin kept streaming: {} bytes",
        origin.bytes_sent()
    );
}

#[tokio::test]
async fn test_redirect_outside_allow_list_is_refused() {
    let origin = MockOrigin::builder()
        .redirect_route("/hop.png", "localhost", "/internal")
        .route("/internal", 200, "text/plain", b"secret")
        .start()
        .await;
    let loader = loader(HttpLoaderConfig {
        allowed_sources: vec!["127.0.0.1".to_string()],
        ..Default::default()
    });

    let err = loader.fetch(&origin.url("/hop.png")).await.unwrap_err();
    assert!(matches!(err, LoaderError::Forbidden(_)), "got {err:?}");
    assert_eq!(origin.hits("/hop.png"), 1);
    assert_eq!(origin.hits("/internal"), 0);
}

#[tokio::test]
async fn test_redirect_inside_allow_list_is_followed() {
    let png = fixture_png(4, 4);
    let origin = MockOrigin::builder()
        .redirect_route("/old.png", "127.0.0.1", "/new.png")
        .route("/new.png", 200, "image/png", &png)
        .start()
        .await;
    let loader = loader(HttpLoaderConfig {
        allowed_sources: vec!["127.0.0.1".to_string()],
        ..Default::default()
    });

    let blob = loader.fetch(&origin.url("/old.png")).await.unwrap();
    assert_eq!(blob.bytes().as_ref(), png.as_slice());
    assert_eq!(origin.hits("/new.png"), 1);
}

#[tokio::test]
async fn test_allow_list_rejects_other_hosts() {
    let origin = MockOrigin::builder()
        .route("/cat.png", 200, "image/png", &fixture_png(4, 4))
        .start()
        .await;
    let loader = loader(HttpLoaderConfig {
        allowed_sources: vec!["*.example.com".to_string()],
        ..Default::default()
    });

    let err = loader.fetch(&origin.url("/cat.png")).await.unwrap_err();
    assert!(matches!(err, LoaderError::Forbidden(_)));
    assert_eq!(origin.hits("/cat.png"), 0, "origin must not be contacted");
}

#[tokio::test]
async fn test_slow_origin_hits_client_timeout() {
    let origin = MockOrigin::builder()
        .slow_route("/slow.png", &fixture_png(4, 4), Duration::from_millis(500))
        .start()
        .await;
    let loader = loader(HttpLoaderConfig {
        timeout_ms: 50,
        ..Default::default()
    });

    assert!(matches!(
        loader.fetch(&origin.url("/slow.png")).await.unwrap_err(),
        LoaderError::Transport(_)
    ));
}

#[tokio::test]
async fn test_engine_coalesces_http_fetches() {
    let origin = MockOrigin::builder()
        .slow_route("/cat.png", &fixture_png(64, 32), Duration::from_millis(100))
        .start()
        .await;
    let engine = EngineBuilder::new()
        .with_loaders(vec![
            Arc::new(loader(HttpLoaderConfig::default())) as Arc<dyn Loader>
        ])
        .with_processors(vec![
            Arc::new(ImageProcessor::new(ImageOptions::default())) as Arc<dyn Processor>
        ])
        .build();
    let path = format!("unsafe/32x16/{}", origin.url("/cat.png"));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = engine.clone();
        let path = path.clone();
        handles.push(tokio::spawn(async move { engine.process(&path, true).await }));
    }

    let mut outputs = Vec::new();
    for handle in handles {
        outputs.push(handle.await.unwrap().unwrap());
    }
    assert_eq!(origin.hits("/cat.png"), 1);
    assert!(outputs.windows(2).all(|w| w[0].bytes() == w[1].bytes()));
    assert_eq!(dimensions_of(outputs[0].bytes()), (32, 16));
}

#[tokio::test]
async fn test_engine_maps_origin_404() {
    let origin = MockOrigin::builder().start().await;
    let engine = EngineBuilder::new()
        .with_loaders(vec![
            Arc::new(loader(HttpLoaderConfig::default())) as Arc<dyn Loader>
        ])
        .build();
    let url = origin.url("/nothing.png");

    let err = engine
        .process(&format!("unsafe/{url}"), true)
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::NotFound(url));
}
