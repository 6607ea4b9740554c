//! Lantern daemon: cache store, staleness-guarded request router and the
//! socket server that connects UI sessions to the render engine.

mod error;
pub mod cache;
pub mod paths;
pub mod protocol;
pub mod router;
mod runtime;

pub use cache::{CacheStore, CachedPlugins};
pub use error::DaemonError;
pub use protocol::{request_status, request_stop, send_request, Request, Response, Status};
pub use router::{AnswerToken, EngineHandle, RequestKind, Router, StalenessGuard};
pub use runtime::{run, start_blocking};
