//! Command dispatch: one decoded request in, one wire response out.
//!
//! Every failure becomes a `Status` response here; nothing propagates past
//! [`Dispatcher::dispatch`]. Message wording is part of the client contract.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Registry and validation errors map to `Error:` statuses

use std::path::PathBuf;

use tracing::{debug, warn};

use pm_core::{format_uptime, ProcessName, ProcessSpec};
use pm_protocol::{
    encode_list, encode_records, AddRequest, ListEntry, Metric, Record, Request, RequestError,
    Response, Stream, Value,
};

use crate::registry::{BulkOutcome, MetricValue, RegistryError, RegistryHandle};

/// Pid reported for a stopped process.
pub const STOPPED_PID: i32 = -1;

/// Outcome of one dispatched request.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// Reply to write back to the client
    pub response: Response,
    /// Set by `stop`: shut the daemon down once the reply is sent
    pub shutdown: bool,
}

impl Dispatch {
    fn reply(response: Response) -> Self {
        Self {
            response,
            shutdown: false,
        }
    }
}

/// Executes requests against the registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: RegistryHandle,
    /// Workdir for `add` requests that don't name one
    default_workdir: PathBuf,
    /// `HOST:PORT` quoted in the `stop` reply
    address: String,
}

impl Dispatcher {
    pub fn new(
        registry: RegistryHandle,
        default_workdir: impl Into<PathBuf>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            default_workdir: default_workdir.into(),
            address: address.into(),
        }
    }

    /// Sets the address quoted in the `stop` reply.
    pub fn set_address(&mut self, address: impl Into<String>) {
        self.address = address.into();
    }

    /// Decodes raw request bytes and dispatches them.
    pub async fn dispatch_bytes(&self, bytes: &[u8]) -> Dispatch {
        match std::str::from_utf8(bytes) {
            Ok(line) => self.dispatch_line(line).await,
            Err(_) => {
                debug!(len = bytes.len(), "Request is not valid UTF-8");
                Dispatch::reply(Response::error(RequestError::Unrecognized { verb: None }))
            }
        }
    }

    /// Parses one command line and dispatches it.
    pub async fn dispatch_line(&self, line: &str) -> Dispatch {
        match Request::parse(line) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                debug!(line = %line.trim_end(), error = %e, "Rejected request");
                Dispatch::reply(Response::error(e))
            }
        }
    }

    /// Executes a decoded request.
    pub async fn dispatch(&self, request: Request) -> Dispatch {
        let verb = request.verb();
        debug!(verb = verb, "Dispatching request");

        let response = match request {
            Request::Add(add) => self.add(add).await,
            Request::Start { name: Some(name) } => self.start(&name).await,
            Request::Start { name: None } => bulk(Bulk::Start, self.registry.start_all().await),
            Request::Stop => {
                return Dispatch {
                    response: Response::success(format!("Stopped pmd running on {}", self.address)),
                    shutdown: true,
                };
            }
            Request::Restart { name: Some(name) } => self.restart(&name).await,
            Request::Restart { name: None } => {
                bulk(Bulk::Restart, self.registry.restart_all().await)
            }
            Request::Remove { name } => self.remove(&name).await,
            Request::Kill { name } => self.kill(&name).await,
            Request::List => self.list().await,
            Request::Query { metric, name } => self.query(metric, name.as_deref()).await,
            Request::Output { stream, name } => self.output(stream, &name).await,
        };

        Dispatch::reply(response)
    }

    async fn add(&self, add: AddRequest) -> Response {
        let name = match ProcessName::parse(add.name) {
            Ok(name) => name,
            Err(e) => return Response::error(e),
        };
        // Relative directories resolve against the daemon's working directory
        let workdir = match add.workdir {
            Some(dir) => self.default_workdir.join(dir),
            None => self.default_workdir.clone(),
        };
        let spec = match ProcessSpec::new(name.clone(), add.command, workdir) {
            Ok(spec) => spec,
            Err(e) => return Response::error(e),
        };

        match self.registry.add(spec, add.log_cpu, add.log_memory).await {
            Ok(()) => Response::success(format!("Successfully added process '{name}'")),
            Err(e) => failure("add", name.as_str(), e),
        }
    }

    async fn start(&self, name: &str) -> Response {
        match self.registry.start(name).await {
            Ok(_) => Response::success(format!("Successfully started process '{name}'")),
            Err(e) => failure("start", name, e),
        }
    }

    async fn restart(&self, name: &str) -> Response {
        match self.registry.restart(name).await {
            Ok(_) => Response::success(format!("Successfully restarted process '{name}'")),
            Err(e) => failure("restart", name, e),
        }
    }

    async fn remove(&self, name: &str) -> Response {
        match self.registry.remove(name).await {
            Ok(()) => Response::success(format!("Successfully removed process '{name}'")),
            Err(e) => failure("remove", name, e),
        }
    }

    async fn kill(&self, name: &str) -> Response {
        match self.registry.kill(name).await {
            Ok(()) => Response::success(format!("Successfully killed process '{name}'")),
            Err(e) => failure("kill", name, e),
        }
    }

    async fn list(&self) -> Response {
        match self.registry.list().await {
            Ok(views) => {
                let entries: Vec<ListEntry> = views
                    .into_iter()
                    .map(|view| ListEntry::new(view.name.as_str(), view.command))
                    .collect();
                Response::data(encode_list(&entries))
            }
            Err(e) => failure("list", "", e),
        }
    }

    async fn query(&self, metric: Metric, name: Option<&str>) -> Response {
        match self.registry.metrics(name, metric).await {
            Ok(values) => {
                let records: Vec<Record> = values
                    .into_iter()
                    .map(|(name, value)| Record::new(name.as_str(), record_value(value)))
                    .collect();
                Response::data(encode_records(&records))
            }
            Err(e) => failure("query", name.unwrap_or_default(), e),
        }
    }

    async fn output(&self, stream: Stream, name: &str) -> Response {
        match self.registry.output(name, stream).await {
            Ok(bytes) => Response::data(bytes),
            Err(e) => failure("read output of", name, e),
        }
    }
}

fn record_value(value: MetricValue) -> Value {
    match value {
        MetricValue::Memory(bytes) => Value::Float(bytes),
        MetricValue::Cpu(percent) => Value::Float(percent),
        MetricValue::Pid(pid) => Value::Pid(
            pid.and_then(|pid| i32::try_from(pid).ok())
                .unwrap_or(STOPPED_PID),
        ),
        MetricValue::Uptime(uptime) => Value::Text(format_uptime(uptime)),
    }
}

#[derive(Debug, Clone, Copy)]
enum Bulk {
    Start,
    Restart,
}

impl Bulk {
    fn verb(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Restart => "restart",
        }
    }

    fn past(self) -> &'static str {
        match self {
            Self::Start => "started",
            Self::Restart => "restarted",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::Start => "Started",
            Self::Restart => "Restarted",
        }
    }
}

/// Formats a bulk start/restart outcome.
fn bulk(kind: Bulk, outcome: Result<BulkOutcome, RegistryError>) -> Response {
    match outcome {
        Ok(BulkOutcome { total: 0, .. }) => {
            Response::warning(format!("No processes to {}", kind.verb()))
        }
        Ok(BulkOutcome { succeeded: 0, .. }) => {
            Response::warning(format!("No processes were {}", kind.past()))
        }
        Ok(BulkOutcome { succeeded, total }) => {
            if succeeded < total {
                warn!(
                    verb = kind.verb(),
                    succeeded = succeeded,
                    total = total,
                    "Bulk operation incomplete"
                );
            }
            Response::success(format!("{} {succeeded} out of {total} processes", kind.title()))
        }
        Err(e) => {
            warn!(verb = kind.verb(), error = %e, "Bulk operation failed");
            Response::error(format!("Couldn't {} processes", kind.verb()))
        }
    }
}

/// Maps a registry error to its wire status.
fn failure(action: &str, name: &str, err: RegistryError) -> Response {
    match err {
        RegistryError::NotFound(name) => Response::not_found(&name),
        RegistryError::AlreadyExists(name) => {
            Response::error(format!("There is already a process named '{name}'"))
        }
        RegistryError::AlreadyActive(name) => {
            Response::error(format!("Process '{name}' is already active"))
        }
        RegistryError::NotActive(name) => {
            Response::error(format!("Process '{name}' is not active"))
        }
        err @ (RegistryError::Process(_) | RegistryError::ChannelClosed) => {
            warn!(action = action, name = %name, error = %err, "Command failed");
            Response::error(format!("Couldn't {action} process"))
        }
    }
}
