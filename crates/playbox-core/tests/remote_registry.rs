//! Remote module loading against an in-process registry.
//!
//! An axum server on its own thread stands in for the CDN; the bundler talks
//! to it through the real HTTP fetcher.

use axum::{http::header::CONTENT_TYPE, response::Redirect, routing::get, Router};
use playbox_core::bundler::plugins::default_plugins;
use playbox_core::bundler::{BundleEngine, BundleOptions, Bundler};
use playbox_core::compiler::SfcCompiler;
use playbox_core::fetch::FetchCache;
use playbox_core::Vfs;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

const JS: &str = "application/javascript";

/// Start the registry; returns its address and the hit counter for `/react`.
fn spawn_registry() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let (tx, rx) = std::sync::mpsc::channel();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let app = Router::new()
                .route(
                    "/react",
                    get(move || {
                        let counter = Arc::clone(&counter);
                        async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            (
                                [(CONTENT_TYPE, JS)],
                                "import { jsx } from \"/react@18/jsx.mjs\";\nexport default { jsx };\n",
                            )
                        }
                    }),
                )
                .route(
                    "/react@18/jsx.mjs",
                    get(|| async { ([(CONTENT_TYPE, JS)], "export const jsx = 'jsx';\n") }),
                )
                .route(
                    "/theme.css",
                    get(|| async { ([(CONTENT_TYPE, "text/css")], "h1{color:blue}") }),
                )
                .route(
                    "/moved",
                    get(|| async { Redirect::temporary("/pkg@2/index.mjs") }),
                )
                .route(
                    "/pkg@2/index.mjs",
                    get(|| async { ([(CONTENT_TYPE, JS)], "export * from './util.mjs';\n") }),
                )
                .route(
                    "/pkg@2/util.mjs",
                    get(|| async { ([(CONTENT_TYPE, JS)], "export const util = 2;\n") }),
                );
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });

    (rx.recv().unwrap(), hits)
}

fn bundler(addr: SocketAddr, fetch: &Arc<FetchCache>) -> Bundler {
    Bundler::new(default_plugins(
        Arc::new(SfcCompiler::new()),
        "ripple",
        Url::parse(&format!("http://{addr}/")).unwrap(),
        fetch,
    ))
}

fn workspace(main: &str) -> Vfs {
    let fs = Vfs::new();
    fs.write("/main.ts", main).unwrap();
    fs
}

#[test]
fn test_bare_imports_come_from_the_registry() {
    let (addr, _) = spawn_registry();
    let fetch = Arc::new(FetchCache::http().unwrap());
    let chunk = bundler(addr, &fetch)
        .build(
            "/main.ts",
            &workspace("import React from 'react';\nconsole.log(React.jsx);"),
            &BundleOptions::default(),
        )
        .unwrap();

    assert_eq!(
        chunk.modules,
        vec![
            format!("http://{addr}/react@18/jsx.mjs"),
            format!("http://{addr}/react?external=*"),
            "/main.ts".to_string(),
        ]
    );
    assert!(chunk.code.contains("const jsx = 'jsx';"));
}

#[test]
fn test_each_url_is_fetched_once() {
    let (addr, hits) = spawn_registry();
    let fetch = Arc::new(FetchCache::http().unwrap());
    let bundler = bundler(addr, &fetch);
    let fs = workspace("import React from 'react';\nimport { jsx } from 'react';\nconsole.log(React, jsx);");

    bundler.build("/main.ts", &fs, &BundleOptions::default()).unwrap();
    bundler.build("/main.ts", &fs, &BundleOptions::default()).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_requesters_share_one_request() {
    let (addr, hits) = spawn_registry();
    let fetch = Arc::new(FetchCache::http().unwrap());
    let url = format!("http://{addr}/react?external=*");

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                let fetched = fetch.get(&url).unwrap();
                assert!(fetched.body.contains("export default"));
            });
        }
    });
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_redirected_modules_resolve_against_final_url() {
    let (addr, _) = spawn_registry();
    let fetch = Arc::new(FetchCache::http().unwrap());
    let chunk = bundler(addr, &fetch)
        .build(
            "/main.ts",
            &workspace("import { util } from 'moved';\nconsole.log(util);"),
            &BundleOptions::default(),
        )
        .unwrap();
    assert!(chunk
        .modules
        .contains(&format!("http://{addr}/pkg@2/util.mjs")));
}

#[test]
fn test_remote_stylesheets_are_injected() {
    let (addr, _) = spawn_registry();
    let fetch = Arc::new(FetchCache::http().unwrap());
    let chunk = bundler(addr, &fetch)
        .build(
            "/main.ts",
            &workspace(&format!("import 'http://{addr}/theme.css';")),
            &BundleOptions::default(),
        )
        .unwrap();
    assert!(chunk.code.contains("style.textContent = `h1{color:blue}`;"));
}

#[test]
fn test_missing_package_is_a_network_error() {
    let (addr, _) = spawn_registry();
    let fetch = Arc::new(FetchCache::http().unwrap());
    let err = bundler(addr, &fetch)
        .build(
            "/main.ts",
            &workspace("import x from 'nope';"),
            &BundleOptions::default(),
        )
        .unwrap_err();
    assert_eq!(err.code(), "NETWORK_ERROR");
    assert_eq!(err.module_id(), Some(format!("http://{addr}/nope?external=*").as_str()));
    assert!(err.to_string().contains("404"));
}
