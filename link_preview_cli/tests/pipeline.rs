use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Redirect};
use axum::routing::get;
use axum::Router;
use futures::future::join_all;
use link_preview_cli::{
    ErrorKind, FetchBudget, MemoryOutcomeSink, OutcomeStatus, Pipeline, PipelineConfig,
    PoolConfig, PreviewRequest, RatePolicy, SourceTag,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

const CAP: usize = 4096;

fn fixture_routes() -> Router {
    Router::new()
        .route(
            "/og",
            get(|| async {
                Html(
                    r#"<!doctype html><html><head>
                    <title>Document Title</title>
                    <meta property="og:title" content="Open Graph Title">
                    <meta property="og:description" content="Shared description">
                    </head><body></body></html>"#,
                )
            }),
        )
        .route("/plain", get(|| async { Html("nothing to see here") }))
        .route(
            "/big",
            get(|| async {
                let mut page = String::from(
                    r#"<html><head><meta property="og:title" content="Big Page"></head><body>"#,
                );
                page.push_str(&"filler ".repeat(20_000));
                page.push_str(r#"<meta name="description" content="Beyond the cap">"#);
                Html(page)
            }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Html("<title>Too late</title>")
            }),
        )
        .route(
            "/json",
            get(|| async { ([(header::CONTENT_TYPE, "application/json")], "{\"title\":\"no\"}") }),
        )
        .route(
            "/missing",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Html("<title>Page Not Found</title>"),
                )
                    .into_response()
            }),
        )
        .route(
            "/loop/{n}",
            get(|Path(n): Path<u32>| async move { Redirect::temporary(&format!("/loop/{}", n + 1)) }),
        )
        .route("/hop", get(|| async { Redirect::permanent("/og") }))
        .route(
            "/latin1",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "text/html; charset=iso-8859-1")],
                    &b"<html><head><title>Caf\xE9 Cr\xE8me</title></head></html>"[..],
                )
            }),
        )
}

async fn spawn(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn pipeline_with(rate: RatePolicy, pool: PoolConfig) -> (Arc<Pipeline>, Arc<MemoryOutcomeSink>) {
    let sink = Arc::new(MemoryOutcomeSink::new(100));
    let config = PipelineConfig {
        budget: FetchBudget {
            timeout: Duration::from_secs(2),
            max_bytes: CAP,
            max_redirects: 5,
        },
        rate,
        pool,
        outcome_capacity: 100,
    };
    let pipeline = Pipeline::new(&config, sink.clone()).unwrap();
    (Arc::new(pipeline), sink)
}

fn pipeline() -> (Arc<Pipeline>, Arc<MemoryOutcomeSink>) {
    pipeline_with(
        RatePolicy {
            limit: 100,
            window: Duration::from_secs(60),
        },
        PoolConfig::default(),
    )
}

#[tokio::test]
async fn open_graph_title_wins_over_title_tag() {
    let addr = spawn(fixture_routes()).await;
    let (pipeline, sink) = pipeline();

    let response = pipeline
        .preview(&PreviewRequest::new(format!("http://{}/og", addr), "alice"))
        .await
        .unwrap();

    assert_eq!(response.preview.title, "Open Graph Title");
    assert_eq!(response.preview.source_tag, SourceTag::OpenGraph);
    assert_eq!(response.preview.description.as_deref(), Some("Shared description"));
    assert_eq!(response.outcome.status, OutcomeStatus::Success);
    assert_eq!(response.outcome.http_status, Some(200));
    assert_eq!(sink.get(&response.outcome.id), Some(response.outcome));
}

#[tokio::test]
async fn page_without_metadata_uses_url_title() {
    let addr = spawn(fixture_routes()).await;
    let (pipeline, _sink) = pipeline();

    let response = pipeline
        .preview(&PreviewRequest::new(format!("http://{}/plain", addr), "alice"))
        .await
        .unwrap();

    assert_eq!(response.preview.title, "127.0.0.1/plain");
    assert_eq!(response.preview.source_tag, SourceTag::None);
}

#[tokio::test]
async fn oversized_body_is_truncated_at_cap() {
    let addr = spawn(fixture_routes()).await;
    let (pipeline, _sink) = pipeline();

    let response = pipeline
        .preview(&PreviewRequest::new(format!("http://{}/big", addr), "alice"))
        .await
        .unwrap();

    assert_eq!(response.outcome.byte_size, Some(CAP as u64));
    assert!(response.outcome.truncated);
    assert_eq!(response.preview.title, "Big Page");
    // the description meta sits past the cap
    assert!(response.preview.description.is_none());
}

#[tokio::test]
async fn slow_server_times_out_within_budget() {
    let addr = spawn(fixture_routes()).await;
    let (pipeline, sink) = pipeline();
    let timeout = Duration::from_millis(300);

    let started = Instant::now();
    let err = pipeline
        .preview(&PreviewRequest::new(format!("http://{}/slow", addr), "alice").with_timeout(timeout))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(elapsed < timeout + Duration::from_millis(700), "took {:?}", elapsed);

    let recorded = sink.recent();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].status, OutcomeStatus::Error);
    assert_eq!(recorded[0].error.as_deref(), Some("Timeout"));
}

#[tokio::test]
async fn redirect_loop_is_cut_off() {
    let addr = spawn(fixture_routes()).await;
    let (pipeline, sink) = pipeline();

    let err = pipeline
        .preview(&PreviewRequest::new(format!("http://{}/loop/0", addr), "alice"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TooManyRedirects);
    assert_eq!(sink.recent()[0].error.as_deref(), Some("TooManyRedirects"));
}

#[tokio::test]
async fn short_redirect_chain_is_followed() {
    let addr = spawn(fixture_routes()).await;
    let (pipeline, _sink) = pipeline();

    let response = pipeline
        .preview(&PreviewRequest::new(format!("http://{}/hop", addr), "alice"))
        .await
        .unwrap();

    assert_eq!(response.preview.title, "Open Graph Title");
    assert_eq!(response.preview.url, format!("http://{}/og", addr));
}

#[tokio::test]
async fn relative_og_image_resolves_against_final_url() {
    let target = spawn(Router::new().route(
        "/articles/page",
        get(|| async { Html(r#"<meta property="og:image" content="/img/thumb.png"><title>Target</title>"#) }),
    ))
    .await;
    let origin = spawn(Router::new().route(
        "/go",
        get(move || async move { Redirect::temporary(&format!("http://{}/articles/page", target)) }),
    ))
    .await;
    let (pipeline, _sink) = pipeline();

    let response = pipeline
        .preview(&PreviewRequest::new(format!("http://{}/go", origin), "alice"))
        .await
        .unwrap();

    assert_eq!(
        response.preview.image_url,
        Some(format!("http://{}/img/thumb.png", target))
    );
}

#[tokio::test]
async fn non_html_content_is_rejected() {
    let addr = spawn(fixture_routes()).await;
    let (pipeline, sink) = pipeline();

    let err = pipeline
        .preview(&PreviewRequest::new(format!("http://{}/json", addr), "alice"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnsupportedContentType);
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn error_status_still_yields_preview() {
    let addr = spawn(fixture_routes()).await;
    let (pipeline, _sink) = pipeline();

    let response = pipeline
        .preview(&PreviewRequest::new(format!("http://{}/missing", addr), "alice"))
        .await
        .unwrap();

    assert_eq!(response.outcome.http_status, Some(404));
    assert_eq!(response.preview.title, "Page Not Found");
}

#[tokio::test]
async fn invalid_url_is_recorded_as_error() {
    let (pipeline, sink) = pipeline();

    let err = pipeline
        .preview(&PreviewRequest::new("ftp://example.com/file", "alice"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidUrl);
    assert_eq!(sink.recent()[0].error.as_deref(), Some("InvalidUrl"));
}

#[tokio::test]
async fn unreachable_host_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let (pipeline, _sink) = pipeline();

    let err = pipeline
        .preview(&PreviewRequest::new(format!("http://{}/", addr), "alice"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NetworkError);
}

#[tokio::test]
async fn concurrent_requests_respect_rate_limit() {
    let addr = spawn(fixture_routes()).await;
    let (pipeline, sink) = pipeline_with(
        RatePolicy {
            limit: 3,
            window: Duration::from_secs(60),
        },
        PoolConfig::default(),
    );
    let url = format!("http://{}/og", addr);

    let results = join_all((0..10).map(|_| {
        let pipeline = pipeline.clone();
        let url = url.clone();
        tokio::spawn(async move { pipeline.preview(&PreviewRequest::new(url, "busy")).await })
    }))
    .await;

    let mut allowed = 0;
    let mut limited = 0;
    for result in results {
        match result.unwrap() {
            Ok(_) => allowed += 1,
            Err(rejection) => {
                assert_eq!(rejection.kind(), ErrorKind::RateLimited);
                assert!(rejection.retry_after().unwrap() > Duration::ZERO);
                limited += 1;
            }
        }
    }

    assert_eq!(allowed, 3);
    assert_eq!(limited, 7);
    // denials never start a fetch
    assert_eq!(sink.len(), 3);
}

#[tokio::test]
async fn saturated_pool_rejects_instead_of_waiting() {
    let addr = spawn(fixture_routes()).await;
    let (pipeline, sink) = pipeline_with(
        RatePolicy::default(),
        PoolConfig {
            max_concurrent: 1,
            max_queued: 0,
        },
    );

    let slow = {
        let pipeline = pipeline.clone();
        let url = format!("http://{}/slow", addr);
        tokio::spawn(async move {
            pipeline
                .preview(&PreviewRequest::new(url, "a").with_timeout(Duration::from_millis(500)))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = pipeline
        .preview(&PreviewRequest::new(format!("http://{}/og", addr), "b"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Overloaded);

    assert_eq!(slow.await.unwrap().unwrap_err().kind(), ErrorKind::Timeout);
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn latin1_page_keeps_its_accents() {
    let addr = spawn(fixture_routes()).await;
    let (pipeline, _sink) = pipeline();

    let response = pipeline
        .preview(&PreviewRequest::new(format!("http://{}/latin1", addr), "alice"))
        .await
        .unwrap();

    assert_eq!(response.preview.title, "Café Crème");
    assert_eq!(response.preview.source_tag, SourceTag::HtmlMeta);
}

#[tokio::test]
async fn queue_wait_counts_against_request_timeout() {
    let addr = spawn(fixture_routes()).await;
    let (pipeline, sink) = pipeline_with(
        RatePolicy::default(),
        PoolConfig {
            max_concurrent: 1,
            max_queued: 4,
        },
    );

    let slow = {
        let pipeline = pipeline.clone();
        let url = format!("http://{}/slow", addr);
        tokio::spawn(async move { pipeline.preview(&PreviewRequest::new(url, "a")).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let timeout = Duration::from_millis(200);
    let started = Instant::now();
    let err = pipeline
        .preview(&PreviewRequest::new(format!("http://{}/og", addr), "b").with_timeout(timeout))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.kind(), ErrorKind::Overloaded);
    assert!(elapsed < timeout + Duration::from_millis(300), "took {:?}", elapsed);

    // the queued request never began a fetch
    assert_eq!(slow.await.unwrap().unwrap_err().kind(), ErrorKind::Timeout);
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn raw_content_is_returned_decoded_with_status() {
    let addr = spawn(fixture_routes()).await;
    let (pipeline, sink) = pipeline();

    let content = pipeline
        .fetch_content(&PreviewRequest::new(format!("http://{}/latin1", addr), "alice"))
        .await
        .unwrap();
    assert!(content.success);
    assert_eq!(content.status_code, 200);
    assert!(content.content.contains("Café Crème"));
    assert_eq!(sink.get(&content.outcome.id), Some(content.outcome));

    let missing = pipeline
        .fetch_content(&PreviewRequest::new(format!("http://{}/missing", addr), "alice"))
        .await
        .unwrap();
    assert!(!missing.success);
    assert_eq!(missing.status_code, 404);
    assert_eq!(sink.len(), 2);
}
