//! The per-connection request loop (spec.md §4.4): parse one request, invoke
//! its handler, frame and write the response, then decide whether to keep
//! the connection open for another request.
//!
//! Grounded in the teacher's inline per-connection handling in `worker.rs`
//! (parse → route → format response → write → keep-alive decision), rebuilt
//! as its own suspendable task instead of a state stashed on a `ConnState`
//! slab entry, since every step here may itself suspend on a reactor
//! awaitable.

use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;

use crate::buffered_reader::BufferedReader;
use crate::error::CoreError;
use crate::http::{Handler, RequestData, ResponseData};
use crate::metrics::WorkerMetrics;
use crate::parser::parse_request;
use crate::reactor::Reactor;
use crate::reactor_future::WriteFuture;
use crate::router::Router;
use crate::syscalls;

/// Drives one accepted connection from its first byte to close. Spawned by
/// the accept task (spec.md §4.5) immediately after `accept()` resumes.
pub async fn run(reactor: Rc<Reactor>, fd: i32, router: Arc<Router>, metrics: Arc<WorkerMetrics>) {
    let mut reader = BufferedReader::new(reactor.clone(), fd);

    loop {
        match parse_request(&mut reader, &router).await {
            Ok((data, handler)) => {
                let keep_alive = connection_keep_alive(&data);
                metrics.inc_requests();
                let response = invoke_handler(&handler, data);
                let wire = Rc::new(response.framed(keep_alive));
                let wrote_ok = write_all(&reactor, fd, wire, &metrics).await;
                if !wrote_ok || !keep_alive {
                    break;
                }
            }
            // Client idle-closed before any byte of a new request arrived;
            // silently close, no response written (spec.md §4.4 step 2).
            Err(CoreError::ClientClosed) => break,
            Err(err) => {
                let response = ResponseData::with_body(err.status(), err.message().into_bytes());
                let wire = Rc::new(response.framed(false));
                let _ = write_all(&reactor, fd, wire, &metrics).await;
                break;
            }
        }
    }

    metrics.dec_connections();
    syscalls::close_fd(fd);
}

/// True unless the `Connection` header (case-insensitive, trimmed,
/// lower-cased) contains the token `close`. Absent header defaults to
/// keep-alive per the HTTP/1.1 default (spec.md §4.4 step 3).
fn connection_keep_alive(data: &RequestData) -> bool {
    match data.header_ci("connection") {
        Some(value) => !value.contains("close"),
        None => true,
    }
}

/// Handlers are pure synchronous functions that may panic to signal a
/// server error (spec.md §3); a panic here is caught and mapped to 500
/// rather than unwinding into the worker's reactor loop.
fn invoke_handler(handler: &Handler, data: RequestData) -> ResponseData {
    match panic::catch_unwind(AssertUnwindSafe(|| handler(data))) {
        Ok(response) => response,
        Err(_) => ResponseData::with_body(500, b"Internal Server Error".to_vec()),
    }
}

/// Writes `buf` in full, looping on short writes, until every byte lands or
/// a short/zero write signals connection loss (spec.md §4.4 step 5).
async fn write_all(reactor: &Rc<Reactor>, fd: i32, buf: Rc<Vec<u8>>, metrics: &WorkerMetrics) -> bool {
    let total = buf.len();
    let mut offset = 0;
    while offset < total {
        let n = WriteFuture::new(reactor.clone(), fd, buf.clone(), offset, total - offset).await;
        if n == 0 {
            return false;
        }
        metrics.add_bytes(n);
        offset += n;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RequestData;
    use crate::method::Method;

    #[test]
    fn keep_alive_is_default_when_header_absent() {
        let data = RequestData::new(Method::Get);
        assert!(connection_keep_alive(&data));
    }

    #[test]
    fn close_token_disables_keep_alive_case_insensitively() {
        let mut data = RequestData::new(Method::Get);
        data.headers.insert("Connection".to_string(), "Close".to_string());
        assert!(!connection_keep_alive(&data));
    }

    #[test]
    fn unrelated_connection_value_keeps_alive() {
        let mut data = RequestData::new(Method::Get);
        data.headers
            .insert("Connection".to_string(), "keep-alive".to_string());
        assert!(connection_keep_alive(&data));
    }

    #[test]
    fn panicking_handler_maps_to_500() {
        let handler: Handler = Arc::new(|_req| panic!("boom"));
        let data = RequestData::new(Method::Get);
        let response = invoke_handler(&handler, data);
        assert_eq!(response.status, 500);
    }
}
