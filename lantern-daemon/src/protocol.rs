//! Newline-delimited JSON messages exchanged over the daemon socket.
//!
//! Every message is an object tagged by its `command` field, e.g.
//! `{"command":"HostListRequestMessage","profile":"default","cacheOnly":false}`.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use lantern_core::{FilterPlugin, ProfileKey, RenderRequest, RenderResult};

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all_fields = "camelCase")]
pub enum Request {
    #[serde(rename = "TemplateResultRequestMessage")]
    Render(RenderRequest),
    #[serde(rename = "HostListRequestMessage")]
    HostList {
        profile: ProfileKey,
        #[serde(default)]
        cache_only: bool,
    },
    #[serde(rename = "HostVarsRequestMessage")]
    HostVars {
        profile: ProfileKey,
        host: String,
        #[serde(default)]
        role: String,
        #[serde(default)]
        cache_only: bool,
    },
    #[serde(rename = "RolesRequestMessage")]
    Roles {
        profile: ProfileKey,
        #[serde(default)]
        cache_only: bool,
    },
    #[serde(rename = "AnsiblePluginsRequestMessage")]
    Plugins {
        profile: ProfileKey,
        #[serde(default)]
        cache_only: bool,
    },
    #[serde(rename = "PreferenceRequestMessage")]
    Preference,
    #[serde(rename = "StatusRequestMessage")]
    Status,
    #[serde(rename = "StopRequestMessage")]
    Stop,
}

/// Where a list response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Successful,
    Failed,
    Cache,
}

impl Status {
    pub fn live(successful: bool) -> Self {
        if successful {
            Status::Successful
        } else {
            Status::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all_fields = "camelCase")]
pub enum Response {
    #[serde(rename = "TemplateResultResponseMessage")]
    Render(RenderResult),
    #[serde(rename = "HostListResponseMessage")]
    HostList {
        status: Status,
        hosts: Vec<String>,
        probe_request: RenderRequest,
    },
    #[serde(rename = "HostVarsResponseMessage")]
    HostVars {
        status: Status,
        host: String,
        role: String,
        vars: Vec<String>,
        probe_request: RenderRequest,
    },
    #[serde(rename = "RolesResponseMessage")]
    Roles { status: Status, roles: Vec<String> },
    #[serde(rename = "AnsiblePluginsResponseMessage")]
    Plugins {
        status: Status,
        filters: Vec<FilterPlugin>,
        roles: Vec<String>,
    },
    #[serde(rename = "PreferenceResponseMessage")]
    Preference {
        /// Profile key to the profile pretty-printed as JSON.
        profiles: BTreeMap<String, String>,
        tab_size: usize,
    },
    #[serde(rename = "StatusResponseMessage")]
    Status {
        running: bool,
        started_at_unix: u64,
        profiles: Vec<String>,
        socket: String,
    },
    #[serde(rename = "StopResponseMessage")]
    Stop { stopping: bool },
}

/// Send one request to the daemon socket and return the first response line.
///
/// Meant for control messages; UI requests may produce more than one response.
pub fn send_request(home: &Path, request: &Request) -> Result<Response, DaemonError> {
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

/// Ask for the daemon status, retrying briefly while the socket comes up.
pub fn request_status(home: &Path) -> Result<Response, DaemonError> {
    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..5 {
        match send_request(home, &Request::Status) {
            Ok(response @ Response::Status { .. }) => return Ok(response),
            Ok(other) => return Err(unexpected(&other)),
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
    match send_request(home, &Request::Stop)? {
        Response::Stop { .. } => Ok(()),
        other => Err(unexpected(&other)),
    }
}

fn unexpected(response: &Response) -> DaemonError {
    DaemonError::Protocol(format!("unexpected daemon response: {response:?}"))
}
