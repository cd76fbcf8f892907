//! The message envelope exchanged over the channel.
//!
//! On the wire every datagram is a JSON object tagged by `t` (`type` is
//! accepted when decoding). `call` datagrams carry a positional list whose
//! first element names the operation; decoding maps that list onto the closed
//! [`Command`] enum and rejects anything outside the operation table.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{DatagramError, Result};
use crate::view::ResizeHint;

const KIND_CALL: &str = "call";
const KIND_CREATE: &str = "create";
const KIND_KILL: &str = "kill";
const KIND_BIND_CALL: &str = "bind_call";
const KIND_READY: &str = "ready";

/// One discrete message on the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Datagram {
    /// Parent -> worker: run one operation on the native view.
    Call(Command),
    /// Parent -> worker: create the native view and enter its run loop.
    Create(CreateOptions),
    /// Parent -> worker: tear down and exit.
    Kill,
    /// Worker -> parent: a bound function fired or an eval resolved.
    BindCall(BindCall),
    /// Worker -> parent: first datagram after startup.
    Ready(ReadyInfo),
}

/// Operations a `call` datagram may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Navigate,
    SetTitle,
    SetSize,
    Run,
    Bind,
    Init,
    Eval,
    EvalValue,
    Terminate,
}

impl Operation {
    /// Every operation, in wire-name order.
    pub const ALL: [Operation; 9] = [
        Operation::Navigate,
        Operation::SetTitle,
        Operation::SetSize,
        Operation::Run,
        Operation::Bind,
        Operation::Init,
        Operation::Eval,
        Operation::EvalValue,
        Operation::Terminate,
    ];

    /// Wire name of the operation.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Navigate => "navigate",
            Operation::SetTitle => "set_title",
            Operation::SetSize => "set_size",
            Operation::Run => "run",
            Operation::Bind => "bind",
            Operation::Init => "init",
            Operation::Eval => "eval",
            Operation::EvalValue => "eval_value",
            Operation::Terminate => "terminate",
        }
    }

    /// Look up an operation by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }

    fn arity(self) -> usize {
        match self {
            Operation::Run | Operation::Terminate => 0,
            Operation::Navigate
            | Operation::SetTitle
            | Operation::Bind
            | Operation::Init
            | Operation::Eval => 1,
            Operation::EvalValue => 2,
            Operation::SetSize => 3,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed `call` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Navigate { url: String },
    SetTitle { title: String },
    SetSize { width: u32, height: u32, hint: ResizeHint },
    Run,
    Bind { name: String },
    Init { source: String },
    Eval { source: String },
    EvalValue { source: String, id: String },
    Terminate,
}

impl Command {
    /// The operation this command invokes.
    pub fn operation(&self) -> Operation {
        match self {
            Command::Navigate { .. } => Operation::Navigate,
            Command::SetTitle { .. } => Operation::SetTitle,
            Command::SetSize { .. } => Operation::SetSize,
            Command::Run => Operation::Run,
            Command::Bind { .. } => Operation::Bind,
            Command::Init { .. } => Operation::Init,
            Command::Eval { .. } => Operation::Eval,
            Command::EvalValue { .. } => Operation::EvalValue,
            Command::Terminate => Operation::Terminate,
        }
    }

    fn to_args(&self) -> Vec<Value> {
        let mut args = vec![Value::from(self.operation().as_str())];
        match self {
            Command::Navigate { url } => args.push(url.as_str().into()),
            Command::SetTitle { title } => args.push(title.as_str().into()),
            Command::SetSize {
                width,
                height,
                hint,
            } => {
                args.push((*width).into());
                args.push((*height).into());
                args.push(hint.as_u8().into());
            }
            Command::Bind { name } => args.push(name.as_str().into()),
            Command::Init { source } | Command::Eval { source } => {
                args.push(source.as_str().into())
            }
            Command::EvalValue { source, id } => {
                args.push(source.as_str().into());
                args.push(id.as_str().into());
            }
            Command::Run | Command::Terminate => {}
        }
        args
    }

    fn from_args(args: &[Value]) -> std::result::Result<Self, DatagramError> {
        let (head, rest) = args
            .split_first()
            .ok_or_else(|| DatagramError::malformed(KIND_CALL, "empty argument list"))?;
        let name = head
            .as_str()
            .ok_or_else(|| DatagramError::malformed(KIND_CALL, "operation name is not a string"))?;
        let op = Operation::from_name(name)
            .ok_or_else(|| DatagramError::UnknownOperation(name.to_string()))?;

        if rest.len() != op.arity() {
            return Err(DatagramError::malformed(
                KIND_CALL,
                format!(
                    "{op} takes {} argument(s), got {}",
                    op.arity(),
                    rest.len()
                ),
            ));
        }

        Ok(match op {
            Operation::Navigate => Command::Navigate {
                url: string_arg(op, rest, 0)?,
            },
            Operation::SetTitle => Command::SetTitle {
                title: string_arg(op, rest, 0)?,
            },
            Operation::SetSize => {
                let raw_hint = u32_arg(op, rest, 2)?;
                let hint = u8::try_from(raw_hint)
                    .ok()
                    .and_then(ResizeHint::from_u8)
                    .ok_or_else(|| {
                        DatagramError::malformed(
                            KIND_CALL,
                            format!("set_size: unknown resize hint {raw_hint}"),
                        )
                    })?;
                Command::SetSize {
                    width: u32_arg(op, rest, 0)?,
                    height: u32_arg(op, rest, 1)?,
                    hint,
                }
            }
            Operation::Run => Command::Run,
            Operation::Bind => Command::Bind {
                name: string_arg(op, rest, 0)?,
            },
            Operation::Init => Command::Init {
                source: string_arg(op, rest, 0)?,
            },
            Operation::Eval => Command::Eval {
                source: string_arg(op, rest, 0)?,
            },
            Operation::EvalValue => Command::EvalValue {
                source: string_arg(op, rest, 0)?,
                id: string_arg(op, rest, 1)?,
            },
            Operation::Terminate => Command::Terminate,
        })
    }
}

fn string_arg(
    op: Operation,
    args: &[Value],
    index: usize,
) -> std::result::Result<String, DatagramError> {
    args[index].as_str().map(str::to_string).ok_or_else(|| {
        DatagramError::malformed(KIND_CALL, format!("{op}: argument {index} must be a string"))
    })
}

fn u32_arg(op: Operation, args: &[Value], index: usize) -> std::result::Result<u32, DatagramError> {
    args[index]
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| {
            DatagramError::malformed(
                KIND_CALL,
                format!("{op}: argument {index} must be a non-negative integer"),
            )
        })
}

/// Options carried by a `create` datagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateOptions {
    /// Script installed with `init` before anything else.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_code: Option<String>,
    /// HTML loaded as a `data:` URL once the view exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigate_dom: Option<String>,
    /// Window title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Window size as `[width, height]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<(u32, u32)>,
    /// Whether the user may resize the window.
    pub resizeable: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            init_code: None,
            navigate_dom: None,
            title: None,
            size: None,
            resizeable: true,
        }
    }
}

/// Outcome tag of an evaluated script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalStatus {
    Success,
    Error,
}

impl EvalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EvalStatus::Success => "success",
            EvalStatus::Error => "error",
        }
    }
}

/// Worker -> parent event payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum BindCall {
    /// A bound JS function was invoked with `args`.
    Invoke { name: String, args: Vec<Value> },
    /// An `eval_value` request resolved; `value` is the error message when
    /// `result` is [`EvalStatus::Error`].
    EvalResult {
        result: EvalStatus,
        id: String,
        value: Value,
    },
}

/// Contents of the worker's `ready` datagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyInfo {
    pub protocol: String,
    pub version: String,
    pub pid: u32,
}

impl Datagram {
    /// Shorthand for a `call` datagram.
    pub fn call(command: Command) -> Self {
        Datagram::Call(command)
    }

    /// Wire kind tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Datagram::Call(_) => KIND_CALL,
            Datagram::Create(_) => KIND_CREATE,
            Datagram::Kill => KIND_KILL,
            Datagram::BindCall(_) => KIND_BIND_CALL,
            Datagram::Ready(_) => KIND_READY,
        }
    }

    /// Build the JSON envelope.
    pub fn to_value(&self) -> Value {
        match self {
            Datagram::Call(command) => json!({ "t": KIND_CALL, "args": command.to_args() }),
            Datagram::Create(options) => json!({ "t": KIND_CREATE, "args": options }),
            Datagram::Kill => json!({ "t": KIND_KILL }),
            Datagram::BindCall(BindCall::Invoke { name, args }) => {
                json!({ "t": KIND_BIND_CALL, "name": name, "args": args })
            }
            Datagram::BindCall(BindCall::EvalResult { result, id, value }) => json!({
                "t": KIND_BIND_CALL,
                "result": result,
                "id": id,
                "value": value,
            }),
            Datagram::Ready(info) => json!({
                "t": KIND_READY,
                "protocol": info.protocol,
                "version": info.version,
                "pid": info.pid,
            }),
        }
    }

    /// Serialize to frame payload bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.to_value())?)
    }

    /// Parse frame payload bytes.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(payload)?;
        Ok(Self::from_value(value)?)
    }

    /// Interpret a JSON envelope.
    pub fn from_value(value: Value) -> std::result::Result<Self, DatagramError> {
        let Value::Object(mut obj) = value else {
            return Err(DatagramError::NotAnObject);
        };

        let kind = match obj.get("t").or_else(|| obj.get("type")) {
            Some(Value::String(kind)) => kind.clone(),
            Some(_) | None => return Err(DatagramError::MissingKind),
        };

        match kind.as_str() {
            KIND_CALL => match obj.remove("args") {
                Some(Value::Array(args)) => Ok(Datagram::Call(Command::from_args(&args)?)),
                _ => Err(DatagramError::malformed(KIND_CALL, "args must be a list")),
            },
            KIND_CREATE => {
                let options = match obj.remove("args") {
                    None | Some(Value::Null) => CreateOptions::default(),
                    Some(args @ Value::Object(_)) => serde_json::from_value(args)
                        .map_err(|err| DatagramError::malformed(KIND_CREATE, err.to_string()))?,
                    Some(_) => {
                        return Err(DatagramError::malformed(KIND_CREATE, "args must be an object"))
                    }
                };
                Ok(Datagram::Create(options))
            }
            KIND_KILL => Ok(Datagram::Kill),
            KIND_BIND_CALL => decode_bind_call(obj).map(Datagram::BindCall),
            KIND_READY => serde_json::from_value(Value::Object(obj))
                .map(Datagram::Ready)
                .map_err(|err| DatagramError::malformed(KIND_READY, err.to_string())),
            _ => Err(DatagramError::UnknownKind(kind)),
        }
    }
}

fn decode_bind_call(mut obj: Map<String, Value>) -> std::result::Result<BindCall, DatagramError> {
    if let Some(result) = obj.remove("result") {
        let result: EvalStatus = serde_json::from_value(result)
            .map_err(|_| DatagramError::malformed(KIND_BIND_CALL, "result must be success or error"))?;
        let id = match obj.remove("id") {
            Some(Value::String(id)) => id,
            _ => return Err(DatagramError::malformed(KIND_BIND_CALL, "id must be a string")),
        };
        let value = obj.remove("value").unwrap_or(Value::Null);
        return Ok(BindCall::EvalResult { result, id, value });
    }

    let name = match obj.remove("name") {
        Some(Value::String(name)) => name,
        _ => {
            return Err(DatagramError::malformed(
                KIND_BIND_CALL,
                "expected a name or a result field",
            ))
        }
    };
    let args = match obj.remove("args") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(args)) => args,
        Some(_) => return Err(DatagramError::malformed(KIND_BIND_CALL, "args must be a list")),
    };
    Ok(BindCall::Invoke { name, args })
}
