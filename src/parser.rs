//! The per-connection HTTP/1.1 parser (spec.md §4.3): a 7-stage suspendable
//! state machine over one [`BufferedReader`], grounded byte-for-byte in
//! `examples/original_source/coro_server/read_iterator.cpp`'s
//! `ParseMethod`/`ParseVariables`/`ParseHeaders`/`ParseBody`.

use crate::buffered_reader::BufferedReader;
use crate::error::{CoreError, CoreResult};
use crate::http::{Handler, RequestData};
use crate::method::Method;
use crate::router::Router;

/// Parses one request off `reader` and resolves it against `router`.
/// Returns [`CoreError::ClientClosed`] if the connection was idle-closed
/// before any byte of a new request arrived; callers must treat that as a
/// silent close, not a framed error response (spec.md §4.4 step 2).
pub async fn parse_request(
    reader: &mut BufferedReader,
    router: &Router,
) -> CoreResult<(RequestData, Handler)> {
    skip_leading_whitespace(reader).await?;

    let method = parse_method(reader).await?;
    let mut data = RequestData::new(method);

    // The method stage stops at the space without consuming it (spec.md
    // §4.3 step 2); consuming it here is the path stage's job.
    reader.advance().await;
    reader.ensure().await;
    if reader.peek() != b'/' {
        return Err(CoreError::BadRequest("path must start with '/'"));
    }
    let (handler, captures) = router.resolve_async(method, reader).await?;
    data.url_variables = captures;

    parse_query(reader, &mut data).await?;
    parse_protocol_line(reader).await?;
    parse_headers(reader, &mut data).await?;
    parse_body(reader, &mut data).await;

    Ok((data, handler))
}

async fn skip_leading_whitespace(reader: &mut BufferedReader) -> CoreResult<()> {
    reader.ensure().await;
    if !reader.is_valid() {
        return Err(CoreError::ClientClosed);
    }
    loop {
        let c = reader.peek();
        if c != b'\r' && c != b'\n' {
            break;
        }
        reader.advance().await;
        reader.ensure().await;
        if !reader.is_valid() {
            return Err(CoreError::ClientClosed);
        }
    }
    Ok(())
}

async fn parse_method(reader: &mut BufferedReader) -> CoreResult<Method> {
    let mut bytes = Vec::with_capacity(6);
    loop {
        reader.ensure().await;
        if !reader.is_valid() {
            return Err(CoreError::BadRequest("invalid request"));
        }
        let c = reader.peek();
        if c == b' ' {
            break;
        }
        if bytes.len() >= 6 {
            return Err(CoreError::BadRequest("invalid request"));
        }
        bytes.push(c);
        reader.advance().await;
    }
    Method::from_bytes(&bytes).ok_or(CoreError::BadRequest("invalid request"))
}

enum QueryState {
    Name,
    Value,
}

async fn parse_query(reader: &mut BufferedReader, data: &mut RequestData) -> CoreResult<()> {
    reader.ensure().await;
    if reader.peek() != b'?' {
        return Ok(());
    }
    reader.advance().await;

    let mut state = QueryState::Name;
    let mut name = String::new();
    let mut value = String::new();

    loop {
        reader.ensure().await;
        let c = reader.peek();
        if c == b' ' {
            break;
        }
        match state {
            QueryState::Name => {
                if c == b'=' {
                    if name.is_empty() {
                        return Err(CoreError::BadRequest("empty query parameter name"));
                    }
                    value.clear();
                    state = QueryState::Value;
                } else {
                    name.push(c as char);
                }
            }
            QueryState::Value => {
                if c == b'&' {
                    data.query.insert(std::mem::take(&mut name), std::mem::take(&mut value));
                    state = QueryState::Name;
                } else {
                    value.push(c as char);
                }
            }
        }
        reader.advance().await;
    }

    // Flag-style params (a name with no '=') are intentionally discarded.
    if matches!(state, QueryState::Value) {
        data.query.insert(name, value);
    }
    Ok(())
}

async fn parse_protocol_line(reader: &mut BufferedReader) -> CoreResult<()> {
    reader.advance().await; // the space left unconsumed by query/path stage
    let mut protocol = String::new();
    loop {
        reader.ensure().await;
        if !reader.is_valid() {
            return Err(CoreError::BadRequest("invalid request line"));
        }
        let c = reader.peek();
        if c == b'\n' {
            break;
        }
        if c != b'\r' {
            protocol.push(c as char);
        }
        reader.advance().await;
    }
    if protocol != "HTTP/1.1" {
        return Err(CoreError::BadRequest("unsupported protocol version"));
    }
    Ok(())
}

enum HeaderState {
    Name,
    Value,
}

async fn parse_headers(reader: &mut BufferedReader, data: &mut RequestData) -> CoreResult<()> {
    reader.advance().await; // the '\n' that ended the protocol line

    let mut state = HeaderState::Name;
    let mut name = String::new();
    let mut value = String::new();
    // Seeded as though the request line itself were a "previous header
    // line" ending in '\n': a request with zero headers is still exactly
    // one blank line away from its terminator, and the double-`\n` check
    // needs a line to have ended for that to fire.
    let mut last: u8 = b'\n';

    loop {
        reader.ensure().await;
        if !reader.is_valid() {
            return Err(CoreError::BadRequest("invalid message"));
        }
        let c = reader.peek();
        if c == b'\r' {
            reader.advance().await;
            continue;
        }
        if last == c && last == b'\n' {
            break;
        }
        match state {
            HeaderState::Name => {
                if c == b':' {
                    if name.is_empty() {
                        return Err(CoreError::BadRequest("empty header name"));
                    }
                    value.clear();
                    state = HeaderState::Value;
                } else {
                    name.push(c as char);
                }
            }
            HeaderState::Value => {
                if c == b'\n' {
                    data.headers.insert(std::mem::take(&mut name), std::mem::take(&mut value));
                    state = HeaderState::Name;
                } else {
                    value.push(c as char);
                }
            }
        }
        last = c;
        reader.advance().await;
    }
    Ok(())
}

async fn consume_terminator_crlf(reader: &mut BufferedReader) {
    reader.ensure().await;
    if reader.is_valid() && (reader.peek() == b'\n' || reader.peek() == b'\r') {
        reader.advance().await;
        reader.ensure().await;
        if reader.is_valid() && (reader.peek() == b'\n' || reader.peek() == b'\r') {
            reader.advance().await;
        }
    }
}

async fn parse_body(reader: &mut BufferedReader, data: &mut RequestData) {
    if let Some(cl) = data.headers.get("Content-Length").cloned() {
        // An unparsable Content-Length leaves the body empty, silently.
        // Matches the original's `try { ... } catch (...) {}` around
        // `std::stoul`.
        let Ok(length) = cl.trim().parse::<usize>() else {
            return;
        };
        data.body.clear();
        data.body.reserve(length);
        consume_terminator_crlf(reader).await;

        let mut remaining = length;
        while remaining > 0 {
            reader.ensure().await;
            if !reader.is_valid() {
                break;
            }
            let avail = reader.available();
            if avail == 0 {
                continue;
            }
            let take = avail.min(remaining);
            data.body.extend_from_slice(&reader.current_slice()[..take]);
            reader.advance_n(take);
            remaining -= take;
        }
        return;
    }

    if data
        .headers
        .get("Transfer-Encoding")
        .map(|v| v == "chunked")
        .unwrap_or(false)
    {
        return;
    }

    if data.method.map(|m| m.body_defaults_empty()).unwrap_or(true) {
        return;
    }

    consume_terminator_crlf(reader).await;
    loop {
        reader.ensure().await;
        if !reader.is_valid() {
            break;
        }
        data.body.push(reader.peek());
        reader.advance().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ResponseData;
    use std::sync::Arc;

    fn router_with(method: Method, path: &str) -> Router {
        let mut router = Router::new();
        router.add_request(
            method,
            path,
            Arc::new(|_req| ResponseData::new(200)),
        );
        router
    }

    fn block_on<F: std::future::Future>(fut: F) -> F::Output {
        // Every future in this parser only ever returns `Pending` while
        // waiting on a fixed-EOF `BufferedReader`'s reactor future, which
        // never happens for `BufferedReader::for_test` fixtures: `ensure`
        // short-circuits before ever touching the reactor. So the state
        // machine always resolves on first poll, and a no-op waker is
        // sufficient to drive it to completion.
        use std::task::{Context, RawWaker, RawWakerVTable, Waker};
        fn noop(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        let raw = RawWaker::new(std::ptr::null(), &VTABLE);
        let waker = unsafe { Waker::from_raw(raw) };
        let mut cx = Context::from_waker(&waker);
        let mut fut = Box::pin(fut);
        match fut.as_mut().poll(&mut cx) {
            std::task::Poll::Ready(v) => v,
            std::task::Poll::Pending => panic!("test fixture future did not resolve synchronously"),
        }
    }

    #[test]
    fn parses_a_minimal_get_request() {
        let router = router_with(Method::Get, "/health");
        let mut reader = BufferedReader::for_test(b"GET /health HTTP/1.1\r\nHost: x\r\n\r\n");
        let (data, _handler) = block_on(parse_request(&mut reader, &router)).unwrap();
        assert_eq!(data.method, Some(Method::Get));
        // Header values are stored verbatim, with no trimming (spec.md
        // §4.3 step 6); the space after ':' lands in the value.
        assert_eq!(data.headers.get("Host"), Some(&" x".to_string()));
        assert!(data.body.is_empty());
    }

    #[test]
    fn parses_query_parameters() {
        let router = router_with(Method::Get, "/search");
        let mut reader =
            BufferedReader::for_test(b"GET /search?q=rust&empty= HTTP/1.1\r\n\r\n");
        let (data, _handler) = block_on(parse_request(&mut reader, &router)).unwrap();
        assert_eq!(data.query.get("q"), Some(&"rust".to_string()));
        assert_eq!(data.query.get("empty"), Some(&"".to_string()));
    }

    #[test]
    fn captures_wildcard_segment() {
        // Capturing routes must end at the `*` itself (see the matching note
        // in router.rs's test module): "/users/*" is the live route, not
        // "/users/*id".
        let router = router_with(Method::Get, "/users/*");
        let mut reader = BufferedReader::for_test(b"GET /users/17 HTTP/1.1\r\n\r\n");
        let (data, _handler) = block_on(parse_request(&mut reader, &router)).unwrap();
        assert_eq!(data.url_variables, vec!["17".to_string()]);
    }

    #[test]
    fn reads_body_by_content_length() {
        let router = router_with(Method::Post, "/echo");
        let mut reader = BufferedReader::for_test(
            b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello",
        );
        let (data, _handler) = block_on(parse_request(&mut reader, &router)).unwrap();
        assert_eq!(data.body, b"hello");
    }

    #[test]
    fn rejects_unsupported_protocol() {
        let router = router_with(Method::Get, "/x");
        let mut reader = BufferedReader::for_test(b"GET /x HTTP/1.0\r\n\r\n");
        let err = block_on(parse_request(&mut reader, &router)).unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(_)));
    }

    #[test]
    fn rejects_unknown_method() {
        let router = Router::new();
        let mut reader = BufferedReader::for_test(b"HEAD / HTTP/1.1\r\n\r\n");
        let err = block_on(parse_request(&mut reader, &router)).unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(_)));
    }

    #[test]
    fn empty_buffer_is_client_closed() {
        let router = Router::new();
        let mut reader = BufferedReader::for_test(b"");
        let err = block_on(parse_request(&mut reader, &router)).unwrap_err();
        assert!(matches!(err, CoreError::ClientClosed));
    }

    #[test]
    fn unmatched_route_is_not_found() {
        let router = Router::new();
        let mut reader = BufferedReader::for_test(b"GET /nope HTTP/1.1\r\n\r\n");
        let err = block_on(parse_request(&mut reader, &router)).unwrap_err();
        assert!(matches!(err, CoreError::NotFound));
    }
}
