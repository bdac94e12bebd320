//! Request/response envelopes for the JSON command protocol.
//!
//! The transport hands raw text to [`submit`], which normalises it into a
//! [`CommandRecord`] and enqueues it for the worker without blocking.
//! Replies travel back on a one-shot [`ReplySender`] carried inside the
//! record; notifications are rendered with [`Notification::to_json`].
//!
//! ```text
//!   { "id"?: u32, "method": str, "params": {..} }      (inbound)
//!   { "jsonrpc": "2.0", "result": {..}, "id": .. }      (reply)
//!   { "jsonrpc": "2.0", "error": {code, message}, "id": .. }
//!   { "jsonrpc": "2.0", "method": str, "params": .. }   (notification)
//! ```

use core::fmt;
use std::sync::Arc;
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::warn;
use serde_json::{Map, Value, json};

use crate::ipc::BinarySemaphore;
use crate::ipc::channels::{Channels, METHOD_MAX, PARAMS_MAX, StateMessage};

pub type MethodName = heapless::String<METHOD_MAX>;
pub type Params = heapless::String<PARAMS_MAX>;

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Structured error returned to the originating client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn method_not_found() -> Self {
        Self::new(METHOD_NOT_FOUND, "Method not found")
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

// ---------------------------------------------------------------------------
// Response / notification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: Option<u32>,
    pub body: Result<Value, RpcError>,
}

impl Response {
    pub fn ok(id: Option<u32>, result: Value) -> Self {
        Self {
            id,
            body: Ok(result),
        }
    }

    pub fn err(id: Option<u32>, error: RpcError) -> Self {
        Self {
            id,
            body: Err(error),
        }
    }

    pub fn to_value(&self) -> Value {
        match &self.body {
            Ok(result) => json!({ "jsonrpc": "2.0", "result": result, "id": self.id }),
            Err(e) => json!({
                "jsonrpc": "2.0",
                "error": { "code": e.code, "message": e.message },
                "id": self.id,
            }),
        }
    }

    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }
}

/// A message with no id, pushed to every attached peer.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: &'static str,
    pub params: Value,
}

impl Notification {
    pub fn new(method: &'static str, params: Value) -> Self {
        Self { method, params }
    }

    pub fn to_json(&self) -> String {
        json!({ "jsonrpc": "2.0", "method": self.method, "params": self.params }).to_string()
    }

    /// Render into a state-queue slot. `None` if it does not fit.
    pub fn to_state_message(&self) -> Option<StateMessage> {
        crate::util::exact(&self.to_json())
    }
}

// ---------------------------------------------------------------------------
// One-shot reply path
// ---------------------------------------------------------------------------

struct ReplySlot {
    value: Signal<CriticalSectionRawMutex, Response>,
    ready: BinarySemaphore,
}

/// Sending half of a one-shot reply slot. Consumed by [`ReplySender::send`].
pub struct ReplySender {
    slot: Arc<ReplySlot>,
}

/// Receiving half, held by the transport for the originating client.
pub struct ReplyReceiver {
    slot: Arc<ReplySlot>,
}

pub fn reply_channel() -> (ReplySender, ReplyReceiver) {
    let slot = Arc::new(ReplySlot {
        value: Signal::new(),
        ready: BinarySemaphore::new(),
    });
    (
        ReplySender {
            slot: Arc::clone(&slot),
        },
        ReplyReceiver { slot },
    )
}

impl ReplySender {
    /// Deliver the reply. Returns `false` if the receiver is gone.
    pub fn send(self, response: Response) -> bool {
        if Arc::strong_count(&self.slot) < 2 {
            return false;
        }
        self.slot.value.signal(response);
        self.slot.ready.give();
        true
    }
}

impl ReplyReceiver {
    pub fn try_recv(&self) -> Option<Response> {
        self.slot.value.try_take()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Response> {
        if let Some(response) = self.try_recv() {
            return Some(response);
        }
        self.slot.ready.take_timeout(timeout);
        self.try_recv()
    }
}

impl fmt::Debug for ReplySender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReplySender")
    }
}

// ---------------------------------------------------------------------------
// Command record
// ---------------------------------------------------------------------------

/// One queued request. Lives for a single dequeue-and-dispatch cycle.
#[derive(Debug)]
pub struct CommandRecord {
    pub id: Option<u32>,
    pub client_id: u32,
    pub method: MethodName,
    pub params: Params,
    pub reply: Option<ReplySender>,
}

impl CommandRecord {
    /// Build a record, refusing method or params that exceed their bounds.
    pub fn new(client_id: u32, method: &str, params: &str) -> Option<Self> {
        Some(Self {
            id: None,
            client_id,
            method: crate::util::exact(method)?,
            params: crate::util::exact(params)?,
            reply: None,
        })
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_reply(mut self, reply: ReplySender) -> Self {
        self.reply = Some(reply);
        self
    }

    /// Parse the pre-serialised params. An empty string reads as `{}`.
    pub fn params_value(&self) -> Result<Value, RpcError> {
        if self.params.is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_str(&self.params)
            .map_err(|_| RpcError::invalid_params("params are not valid JSON"))
    }

    /// Route `response` back to the originator, if it asked for one.
    pub fn respond(&mut self, body: Result<Value, RpcError>) {
        let response = Response {
            id: self.id,
            body,
        };
        match self.reply.take() {
            Some(reply) => {
                if !reply.send(response) {
                    warn!(
                        "rpc: client {} went away before reply to '{}'",
                        self.client_id, self.method
                    );
                }
            }
            None => {
                if let Err(e) = &response.body {
                    warn!("rpc: '{}' failed without reply path: {}", self.method, e);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound normalisation
// ---------------------------------------------------------------------------

/// Why an inbound request never reached the command queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// Text is not JSON.
    Parse,
    /// JSON is not a request object.
    InvalidRequest { id: Option<u32> },
    /// Method or params exceed the record bounds.
    TooLarge { id: Option<u32> },
    /// The command queue is full; the request was dropped.
    QueueFull { id: Option<u32> },
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse => write!(f, "parse error"),
            Self::InvalidRequest { .. } => write!(f, "invalid request"),
            Self::TooLarge { .. } => write!(f, "request too large"),
            Self::QueueFull { .. } => write!(f, "command queue full"),
        }
    }
}

impl SubmitError {
    pub fn to_response(self) -> Response {
        match self {
            Self::Parse => Response::err(None, RpcError::new(PARSE_ERROR, "Parse error")),
            Self::InvalidRequest { id } => {
                Response::err(id, RpcError::new(INVALID_REQUEST, "Invalid Request"))
            }
            Self::TooLarge { id } => {
                Response::err(id, RpcError::new(INVALID_REQUEST, "Request too large"))
            }
            Self::QueueFull { id } => Response::err(id, RpcError::internal("Server busy")),
        }
    }
}

/// Parse `text` from `client_id` and try-enqueue it. Never blocks.
pub fn submit(
    channels: &Channels,
    client_id: u32,
    text: &str,
    reply: Option<ReplySender>,
) -> Result<(), SubmitError> {
    let value: Value = serde_json::from_str(text).map_err(|_| SubmitError::Parse)?;
    let Value::Object(mut obj) = value else {
        return Err(SubmitError::InvalidRequest { id: None });
    };

    let id = match obj.get("id") {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_u64().and_then(|n| u32::try_from(n).ok()) {
            Some(n) => Some(n),
            None => return Err(SubmitError::InvalidRequest { id: None }),
        },
    };

    let Some(Value::String(method)) = obj.remove("method") else {
        return Err(SubmitError::InvalidRequest { id });
    };

    let params = match obj.remove("params") {
        None | Some(Value::Null) => String::new(),
        Some(p @ (Value::Object(_) | Value::Array(_))) => p.to_string(),
        Some(_) => return Err(SubmitError::InvalidRequest { id }),
    };

    let mut record =
        CommandRecord::new(client_id, &method, &params).ok_or(SubmitError::TooLarge { id })?;
    record.id = id;
    record.reply = reply;

    channels.commands.try_send(record).map_err(|rejected| {
        warn!(
            "rpc: command queue full, dropping '{}' from client {}",
            rejected.method, client_id
        );
        SubmitError::QueueFull { id }
    })
}
