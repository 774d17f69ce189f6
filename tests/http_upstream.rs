//! Live forwarding through `HttpUpstream` against an in-process server

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tempfile::TempDir;
use tokio::net::TcpListener;

use tapedeck::{
    Config, HttpUpstream, InsertOptions, Interceptor, Outcome, Request, Session, TapeMode,
    TapedeckError,
};

/// Start a server that echoes method, path and body, counting every hit
async fn spawn_server(hits: Arc<AtomicUsize>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let hits = Arc::clone(&hits);

            tokio::spawn(async move {
                let service = service_fn(move |req: hyper::Request<Incoming>| {
                    let hits = Arc::clone(&hits);
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        let method = req.method().to_string();
                        let path = req.uri().path().to_string();
                        let body = req.into_body().collect().await?.to_bytes();

                        let mut text = format!("{method} {path}").into_bytes();
                        text.extend_from_slice(&body);
                        Ok::<_, hyper::Error>(
                            hyper::Response::builder()
                                .status(201)
                                .header("X-Echo", "yes")
                                .body(Full::new(Bytes::from(text)))
                                .unwrap(),
                        )
                    }
                });

                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

#[tokio::test]
async fn test_record_live_then_replay_offline() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = spawn_server(Arc::clone(&hits)).await;
    let uri = format!("http://{addr}/widgets");

    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        tape_root: temp_dir.path().to_path_buf(),
        ..Config::default()
    };

    // Phase 1: record against the live server
    {
        let mut session = Session::new(&config).unwrap();
        let interceptor = Interceptor::new(HttpUpstream::new(), session.host_filter().clone());
        let tape = session.insert("widgets", InsertOptions::default()).unwrap();

        let dispatched = interceptor
            .handle(
                Some(&tape),
                Request::new("POST", uri.as_str()).with_body(" payload"),
            )
            .await
            .unwrap();

        assert_eq!(dispatched.outcome, Outcome::Recorded);
        assert_eq!(dispatched.response.status, 201);
        assert_eq!(dispatched.response.header("x-echo"), Some("yes"));
        assert_eq!(&dispatched.response.body[..], b"POST /widgets payload");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        session.eject().await.unwrap();
    }

    // Phase 2: replay read-only, the server is not contacted
    {
        let mut session = Session::new(&config).unwrap();
        let interceptor = Interceptor::new(HttpUpstream::new(), session.host_filter().clone());
        let tape = session
            .insert("widgets", InsertOptions::default().mode(TapeMode::ReadOnly))
            .unwrap();

        let dispatched = interceptor
            .handle(Some(&tape), Request::new("POST", uri.as_str()))
            .await
            .unwrap();
        assert_eq!(dispatched.outcome, Outcome::Replayed);
        assert_eq!(&dispatched.response.body[..], b"POST /widgets payload");

        let err = interceptor
            .handle(Some(&tape), Request::new("GET", uri.as_str()))
            .await
            .unwrap_err();
        assert!(matches!(err, TapedeckError::NoMatchFound { .. }));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        session.eject().await.unwrap();
    }
}

#[tokio::test]
async fn test_ignored_localhost_goes_live() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = spawn_server(Arc::clone(&hits)).await;

    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        tape_root: temp_dir.path().to_path_buf(),
        ignore_localhost: true,
        ..Config::default()
    };

    let mut session = Session::new(&config).unwrap();
    let interceptor = Interceptor::new(HttpUpstream::new(), session.host_filter().clone());
    let tape = session
        .insert("local", InsertOptions::default().mode(TapeMode::ReadOnly))
        .unwrap();

    for _ in 0..2 {
        let dispatched = interceptor
            .handle(Some(&tape), Request::new("GET", format!("http://{addr}/ping")))
            .await
            .unwrap();
        assert_eq!(dispatched.outcome, Outcome::Bypassed);
    }

    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(tape.lock().await.is_empty());
    session.eject().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_upstream_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let upstream = HttpUpstream::new();
    let interceptor = Interceptor::new(upstream, Config::default().host_filter());

    let err = interceptor
        .handle(None, Request::new("GET", format!("http://{addr}/")))
        .await
        .unwrap_err();
    assert!(matches!(err, TapedeckError::Upstream(_)));
}
