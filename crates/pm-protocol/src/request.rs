//! Command line requests.
//!
//! A request is a single UTF-8 line, split with POSIX shell quoting rules so
//! arguments may contain spaces: `add web "python -m http.server"`.

use thiserror::Error;

// ============================================================================
// Command Verbs
// ============================================================================

pub const CMD_ADD: &str = "add";
pub const CMD_START: &str = "start";
pub const CMD_STOP: &str = "stop";
pub const CMD_RESTART: &str = "restart";
pub const CMD_REMOVE: &str = "rem";
pub const CMD_KILL: &str = "kill";
pub const CMD_LIST: &str = "list";
pub const CMD_GET_MEMORY: &str = "get_memory";
pub const CMD_GET_CPU: &str = "get_cpu";
pub const CMD_GET_PID: &str = "get_pid";
pub const CMD_GET_UPTIME: &str = "get_uptime";
pub const CMD_GET_STDOUT: &str = "get_stdout";
pub const CMD_GET_STDERR: &str = "get_stderr";

/// Boolean argument spellings accepted as true.
const TRUE_SPELLINGS: [&str; 2] = ["True", "true"];

// ============================================================================
// Request Types
// ============================================================================

/// Per-process metric served by the `get_*` verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Resident memory in bytes (f64 record)
    Memory,
    /// CPU usage percentage (f64 record)
    Cpu,
    /// OS process id, -1 when stopped (i32 record)
    Pid,
    /// Uptime text (NUL-terminated record)
    Uptime,
}

impl Metric {
    /// Returns the command verb for this metric.
    pub fn verb(self) -> &'static str {
        match self {
            Self::Memory => CMD_GET_MEMORY,
            Self::Cpu => CMD_GET_CPU,
            Self::Pid => CMD_GET_PID,
            Self::Uptime => CMD_GET_UPTIME,
        }
    }

    /// Returns the record layout used to encode this metric.
    pub fn record_kind(self) -> crate::RecordKind {
        match self {
            Self::Memory | Self::Cpu => crate::RecordKind::Float,
            Self::Pid => crate::RecordKind::Pid,
            Self::Uptime => crate::RecordKind::Text,
        }
    }
}

/// Captured output stream served by `get_stdout` / `get_stderr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    /// Returns the command verb for this stream.
    pub fn verb(self) -> &'static str {
        match self {
            Self::Stdout => CMD_GET_STDOUT,
            Self::Stderr => CMD_GET_STDERR,
        }
    }
}

/// Arguments of the `add` verb.
///
/// Fields are raw text; the daemon validates name and command so that it
/// can answer with the matching error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    pub name: String,
    pub command: String,
    pub log_cpu: bool,
    pub log_memory: bool,
    /// Working directory, defaults to the daemon's own
    pub workdir: Option<String>,
}

/// A decoded client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `add NAME COMMAND [LOG_CPU [LOG_MEMORY [WORKDIR]]]`
    Add(AddRequest),
    /// `start [NAME]`
    Start { name: Option<String> },
    /// `stop`
    Stop,
    /// `restart [NAME]`
    Restart { name: Option<String> },
    /// `rem NAME`
    Remove { name: String },
    /// `kill NAME`
    Kill { name: String },
    /// `list`
    List,
    /// `get_memory|get_cpu|get_pid|get_uptime [NAME]`
    Query { metric: Metric, name: Option<String> },
    /// `get_stdout|get_stderr NAME`
    Output { stream: Stream, name: String },
}

/// Errors produced while decoding a command line.
///
/// `Display` text is what follows `Error: ` on the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Unrecognized command")]
    Unrecognized { verb: Option<String> },

    #[error("Invalid number of arguments")]
    InvalidArgumentCount { verb: &'static str, got: usize },

    #[error("Malformed command line: {reason}")]
    Malformed { reason: String },
}

impl Request {
    /// Parses one command line.
    pub fn parse(line: &str) -> Result<Self, RequestError> {
        let words = shell_words::split(line).map_err(|e| RequestError::Malformed {
            reason: e.to_string(),
        })?;

        let mut words = words.into_iter();
        let verb = match words.next() {
            Some(v) => v,
            None => return Err(RequestError::Unrecognized { verb: None }),
        };
        let args: Vec<String> = words.collect();

        match verb.as_str() {
            CMD_ADD => parse_add(args),
            CMD_START => Ok(Self::Start {
                name: optional_name(CMD_START, args)?,
            }),
            CMD_STOP => {
                exact_args(CMD_STOP, args, 0)?;
                Ok(Self::Stop)
            }
            CMD_RESTART => Ok(Self::Restart {
                name: optional_name(CMD_RESTART, args)?,
            }),
            CMD_REMOVE => Ok(Self::Remove {
                name: required_name(CMD_REMOVE, args)?,
            }),
            CMD_KILL => Ok(Self::Kill {
                name: required_name(CMD_KILL, args)?,
            }),
            CMD_LIST => {
                exact_args(CMD_LIST, args, 0)?;
                Ok(Self::List)
            }
            CMD_GET_MEMORY => query(Metric::Memory, args),
            CMD_GET_CPU => query(Metric::Cpu, args),
            CMD_GET_PID => query(Metric::Pid, args),
            CMD_GET_UPTIME => query(Metric::Uptime, args),
            CMD_GET_STDOUT => output(Stream::Stdout, args),
            CMD_GET_STDERR => output(Stream::Stderr, args),
            _ => Err(RequestError::Unrecognized { verb: Some(verb) }),
        }
    }

    /// Returns the command verb.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Add(_) => CMD_ADD,
            Self::Start { .. } => CMD_START,
            Self::Stop => CMD_STOP,
            Self::Restart { .. } => CMD_RESTART,
            Self::Remove { .. } => CMD_REMOVE,
            Self::Kill { .. } => CMD_KILL,
            Self::List => CMD_LIST,
            Self::Query { metric, .. } => metric.verb(),
            Self::Output { stream, .. } => stream.verb(),
        }
    }

    /// Encodes the request as a shell-quoted command line.
    pub fn to_line(&self) -> String {
        let mut words: Vec<String> = vec![self.verb().to_string()];

        match self {
            Self::Add(add) => {
                words.push(add.name.clone());
                words.push(add.command.clone());
                words.push(flag(add.log_cpu));
                words.push(flag(add.log_memory));
                if let Some(dir) = &add.workdir {
                    words.push(dir.clone());
                }
            }
            Self::Start { name } | Self::Restart { name } | Self::Query { name, .. } => {
                words.extend(name.iter().cloned());
            }
            Self::Remove { name } | Self::Kill { name } | Self::Output { name, .. } => {
                words.push(name.clone());
            }
            Self::Stop | Self::List => {}
        }

        shell_words::join(words)
    }
}

fn flag(value: bool) -> String {
    let text = if value { "True" } else { "False" };
    text.to_string()
}

fn parse_flag(value: &str) -> bool {
    TRUE_SPELLINGS.contains(&value)
}

fn parse_add(args: Vec<String>) -> Result<Request, RequestError> {
    if !(2..=5).contains(&args.len()) {
        return Err(RequestError::InvalidArgumentCount {
            verb: CMD_ADD,
            got: args.len(),
        });
    }

    let mut args = args.into_iter();
    let name = args.next().unwrap_or_default();
    let command = args.next().unwrap_or_default();
    let log_cpu = args.next().is_some_and(|s| parse_flag(&s));
    let log_memory = args.next().is_some_and(|s| parse_flag(&s));
    let workdir = args.next();

    Ok(Request::Add(AddRequest {
        name,
        command,
        log_cpu,
        log_memory,
        workdir,
    }))
}

fn exact_args(verb: &'static str, args: Vec<String>, n: usize) -> Result<Vec<String>, RequestError> {
    if args.len() == n {
        Ok(args)
    } else {
        Err(RequestError::InvalidArgumentCount {
            verb,
            got: args.len(),
        })
    }
}

fn optional_name(verb: &'static str, args: Vec<String>) -> Result<Option<String>, RequestError> {
    if args.len() > 1 {
        return Err(RequestError::InvalidArgumentCount {
            verb,
            got: args.len(),
        });
    }
    Ok(args.into_iter().next())
}

fn required_name(verb: &'static str, args: Vec<String>) -> Result<String, RequestError> {
    exact_args(verb, args, 1)?
        .into_iter()
        .next()
        .ok_or(RequestError::InvalidArgumentCount { verb, got: 0 })
}

fn query(metric: Metric, args: Vec<String>) -> Result<Request, RequestError> {
    Ok(Request::Query {
        metric,
        name: optional_name(metric.verb(), args)?,
    })
}

fn output(stream: Stream, args: Vec<String>) -> Result<Request, RequestError> {
    Ok(Request::Output {
        stream,
        name: required_name(stream.verb(), args)?,
    })
}
