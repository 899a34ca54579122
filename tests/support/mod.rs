#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use portal_crawlers::http::{HttpConfig, ReqwestFetcher};

/// Canned JSON responses keyed by request path and query.
pub type Routes = HashMap<String, (u16, String)>;

pub struct StubServer {
    pub base_url: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StubServer {
    /// Starts a server answering the routes built from its own base URL.
    /// Unknown paths answer 404.
    pub fn start(build_routes: impl FnOnce(&str) -> Routes) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind stub server");
        let addr = server.server_addr().to_ip().expect("stub server ip addr");
        let base_url = format!("http://{addr}");
        let routes = build_routes(&base_url);

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_owned();
                let Some((status, body)) = routes.get(&url) else {
                    let _ = request.respond(
                        tiny_http::Response::from_string(format!("no route: {url}"))
                            .with_status_code(404),
                    );
                    continue;
                };

                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                let response = tiny_http::Response::from_string(body.clone())
                    .with_status_code(*status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn ok(body: serde_json::Value) -> (u16, String) {
    (200, body.to_string())
}

pub fn fetcher() -> Arc<ReqwestFetcher> {
    Arc::new(ReqwestFetcher::new(HttpConfig::default()).expect("build fetcher"))
}
