//! A multi-threaded HTTP/1.1 server core on a completion-based (io_uring)
//! reactor (spec.md §1): N single-threaded workers, each with its own
//! submission/completion ring, a byte-level trie router shared read-only
//! after `Server::serve` starts, and a per-connection suspendable parser
//! that never blocks a worker thread on an individual socket.

pub mod accept_task;
pub mod buffered_reader;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod method;
pub mod parser;
pub mod reactor;
pub mod reactor_future;
pub mod request_task;
pub mod router;
pub mod server;
pub mod slab;
pub mod syscalls;
pub mod task;
pub mod worker;

pub use error::{CoreError, CoreResult};
pub use http::{Handler, RequestData, ResponseData};
pub use method::Method;
pub use router::Router;
pub use server::Server;
