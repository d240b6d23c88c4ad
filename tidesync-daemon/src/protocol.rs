use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tidesync_core::types::Origin;
use tidesync_sync::ServiceStatus;

use crate::error::{io_err, DaemonError};
use crate::events::EventStats;
use crate::paths::socket_path;

/// JSON newline-delimited request.
///
/// `cmd` is one of `status`, `sync`, `register`, `unregister`, `resync`,
/// `enable`, `disable`, `stop`. The origin commands require `origin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl DaemonRequest {
    pub fn new(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            origin: None,
        }
    }

    pub fn for_origin(cmd: &str, origin: &Origin) -> Self {
        Self {
            cmd: cmd.to_string(),
            origin: Some(origin.0.clone()),
        }
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Payload of a `status` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub running: bool,
    pub pid: u32,
    pub started_at_unix: u64,
    #[serde(flatten)]
    pub service: ServiceStatus,
    pub stats: EventStats,
}

/// Accept either a full origin (`app://notes/`) or a bare app id (`notes`).
pub fn parse_origin(raw: &str) -> Origin {
    if raw.contains("://") {
        let mut origin = raw.to_string();
        if !origin.ends_with('/') {
            origin.push('/');
        }
        Origin(origin)
    } else {
        Origin::for_app(raw)
    }
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(&socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    Ok(serde_json::from_str(line.trim_end())?)
}

/// Status with a short retry window, for use right after `daemon start`.
pub fn request_status(home: &Path) -> Result<StatusPayload, DaemonError> {
    let request = DaemonRequest::new("status");
    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..5 {
        match send_request(home, &request) {
            Ok(response) => return Ok(serde_json::from_value(response_into_data(response)?)?),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                }
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_not_running.unwrap_or_else(|| {
        DaemonError::Protocol("daemon status retry loop exited unexpectedly".to_string())
    }))
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    request(home, &DaemonRequest::new("stop")).map(|_| ())
}

pub fn request_sync(home: &Path) -> Result<Value, DaemonError> {
    request(home, &DaemonRequest::new("sync"))
}

pub fn request_register(home: &Path, origin: &Origin) -> Result<Value, DaemonError> {
    request(home, &DaemonRequest::for_origin("register", origin))
}

pub fn request_unregister(home: &Path, origin: &Origin) -> Result<Value, DaemonError> {
    request(home, &DaemonRequest::for_origin("unregister", origin))
}

pub fn request_resync(home: &Path, origin: &Origin) -> Result<Value, DaemonError> {
    request(home, &DaemonRequest::for_origin("resync", origin))
}

pub fn request_set_enabled(home: &Path, enabled: bool) -> Result<Value, DaemonError> {
    let cmd = if enabled { "enable" } else { "disable" };
    request(home, &DaemonRequest::new(cmd))
}

fn request(home: &Path, request: &DaemonRequest) -> Result<Value, DaemonError> {
    response_into_data(send_request(home, request)?)
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}
