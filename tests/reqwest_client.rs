use httpmock::prelude::*;
use httpmock::Method::HEAD;
use image::{DynamicImage, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use ting_sdk::cache::{CacheError, HttpClient, ImageCache, ReqwestClient, Validators};
use ting_sdk::clock::ManualClock;

fn png(w: u32, h: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(RgbaImage::new(w, h))
        .write_to(&mut out, image::ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

fn client() -> ReqwestClient {
    ReqwestClient::new(Duration::from_secs(5), "ting_sdk-tests").unwrap()
}

#[test]
fn get_returns_body_and_cache_headers() {
    let server = MockServer::start();
    let body = png(3, 2);
    let m = server.mock(|when, then| {
        when.method(GET).path("/logo.png");
        then.status(200)
            .header("etag", "\"abc\"")
            .header("cache-control", "max-age=120")
            .body(&body);
    });

    let resp = client().get(&server.url("/logo.png")).unwrap();
    m.assert();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, body);
    assert_eq!(
        ting_sdk::cache::headers::etag_from_headers(&resp.headers).as_deref(),
        Some("\"abc\"")
    );
}

#[test]
fn get_error_status_is_reported() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/gone.png");
        then.status(404);
    });
    let err = client().get(&server.url("/gone.png")).unwrap_err();
    assert!(matches!(err, CacheError::Http { status: 404, .. }));
}

#[test]
fn head_sends_conditional_validators() {
    let server = MockServer::start();
    let m = server.mock(|when, then| {
        when.method(HEAD)
            .path("/logo.png")
            .header("if-none-match", "\"abc\"")
            .header("if-modified-since", "Sun, 06 Nov 1994 08:49:37 GMT");
        then.status(304);
    });
    let validators = Validators {
        etag: Some("\"abc\"".into()),
        last_modified: Some(784111777),
    };
    let resp = client().head(&server.url("/logo.png"), &validators).unwrap();
    m.assert();
    assert!(resp.is_not_modified());
}

#[test]
fn unreachable_host_is_a_transport_error() {
    let err = client()
        .get("http://127.0.0.1:1/logo.png")
        .unwrap_err();
    assert!(matches!(err, CacheError::Transport { .. }));
}

#[test]
fn cache_revalidates_against_a_real_server() {
    let server = MockServer::start();
    let body = png(4, 4);
    let get = server.mock(|when, then| {
        when.method(GET).path("/logo.png");
        then.status(200)
            .header("etag", "\"v1\"")
            .header("cache-control", "max-age=0")
            .body(&body);
    });
    let head = server.mock(|when, then| {
        when.method(HEAD)
            .path("/logo.png")
            .header("if-none-match", "\"v1\"");
        then.status(304);
    });

    let clock = Arc::new(ManualClock::new(1_000.0));
    let cache = ImageCache::new(1 << 20, Arc::new(client()), clock.clone());
    let url = server.url("/logo.png");

    let first = cache.get_image(&url).unwrap();
    clock.advance(1.0);
    let second = cache.get_image(&url).unwrap();

    assert!(first.ptr_eq(&second));
    get.assert_hits(1);
    head.assert_hits(1);
}
