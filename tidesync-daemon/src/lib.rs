//! tidesync daemon: engine actor, poll timer and socket server.

mod error;
pub mod events;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    parse_origin, request_register, request_resync, request_set_enabled, request_status,
    request_stop, request_sync, request_unregister, send_request, DaemonRequest, DaemonResponse,
    StatusPayload,
};
pub use runtime::{build_service, execute_offline, run, start_blocking, SyncSummary};
