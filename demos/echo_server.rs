// demos/echo_server.rs
//
// Minimal demonstration binary for ringserve-core, covering the end-to-end
// scenarios spec.md §8 lists: body echo, query echo, a wildcard-captured
// segment, 404, and a bad request.
use ringserve_core::{Method, RequestData, ResponseData, Router, Server};

fn echo(req: RequestData) -> ResponseData {
    if let Some(msg) = req.query.get("msg") {
        return ResponseData::with_body(200, msg.clone().into_bytes());
    }
    if !req.body.is_empty() {
        return ResponseData::with_body(200, req.body);
    }
    if let Some(captured) = req.url_variables.first() {
        return ResponseData::with_body(200, captured.clone().into_bytes());
    }
    ResponseData::with_body(200, b"".to_vec())
}

fn main() {
    tracing_subscriber::fmt::init();

    let mut router = Router::new();
    router.add_request(Method::Post, "/echo", std::sync::Arc::new(echo));
    router.add_request(Method::Get, "/echo", std::sync::Arc::new(echo));
    router.add_request(Method::Get, "/echo/*/echo", std::sync::Arc::new(echo));

    tracing::info!("starting echo server on 0.0.0.0:8080");
    Server::bind("0.0.0.0:8080")
        .threads(1)
        .serve(router)
        .expect("server failed");
}
