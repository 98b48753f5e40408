//! Worker request and response types and their JSON wire format
//!
//! Requests are JSON objects tagged by `type` (kebab-case) and carrying a
//! caller-assigned `id` (number or string). Every response echoes the `id`
//! unchanged and is typed
//! `<kind>-response` or `<kind>-error`. `init` and `process-frame` report
//! failures as a `-response` with `success: false`.

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::config::ConfigPatch;
use crate::error::{ScanError, ScanResult};
use crate::models::{DetectionResult, Frame};
use crate::mrz::MrzResult;
use crate::pipeline::FrameOutcome;
use crate::stats::PerformanceSnapshot;

/// Caller-assigned correlation id, echoed back unchanged
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestId {
    Number(u64),
    Text(String),
    /// Absent or not a non-negative integer or string; answered as `null`
    Unset,
}

impl RequestId {
    fn from_wire(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) => RequestId::Text(s.clone()),
            Some(v) => v.as_u64().map_or(RequestId::Unset, RequestId::Number),
            None => RequestId::Unset,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            RequestId::Number(n) => json!(n),
            RequestId::Text(s) => Value::String(s.clone()),
            RequestId::Unset => Value::Null,
        }
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        RequestId::Number(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::Text(id.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::Text(s) => write!(f, "{s:?}"),
            RequestId::Unset => f.write_str("null"),
        }
    }
}

/// Request kinds understood by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Init,
    UpdateConfig,
    ProcessFrame,
    GetPerformanceStats,
    ResetPerformanceStats,
    Decode,
    ClearBuffer,
    Terminate,
    ParseMrz,
}

impl RequestType {
    pub const ALL: [RequestType; 9] = [
        RequestType::Init,
        RequestType::UpdateConfig,
        RequestType::ProcessFrame,
        RequestType::GetPerformanceStats,
        RequestType::ResetPerformanceStats,
        RequestType::Decode,
        RequestType::ClearBuffer,
        RequestType::Terminate,
        RequestType::ParseMrz,
    ];

    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            RequestType::Init => "init",
            RequestType::UpdateConfig => "update-config",
            RequestType::ProcessFrame => "process-frame",
            RequestType::GetPerformanceStats => "get-performance-stats",
            RequestType::ResetPerformanceStats => "reset-performance-stats",
            RequestType::Decode => "decode",
            RequestType::ClearBuffer => "clear-buffer",
            RequestType::Terminate => "terminate",
            RequestType::ParseMrz => "parse-mrz",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Kinds whose failures are sent as `-response` with `success: false`
    fn fails_inline(self) -> bool {
        matches!(self, RequestType::Init | RequestType::ProcessFrame)
    }
}

/// Scaling surface dimensions requested through `update-config`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

/// RGBA frame on the wire: dimensions plus base64 pixel data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramePayload {
    pub width: u32,
    pub height: u32,
    pub data: String,
}

impl FramePayload {
    pub fn encode(frame: &Frame) -> Self {
        Self {
            width: frame.width(),
            height: frame.height(),
            data: BASE64_STANDARD.encode(frame.data()),
        }
    }

    pub fn into_frame(self) -> ScanResult<Frame> {
        let bytes = BASE64_STANDARD
            .decode(self.data.as_bytes())
            .map_err(|e| ScanError::Protocol(format!("invalid frame data: {e}")))?;
        Frame::new(self.width, self.height, bytes)
    }
}

/// Typed request payload
#[derive(Debug, Clone)]
pub enum RequestKind {
    /// Load the decode primitive; idempotent
    Init { config: Option<ConfigPatch> },
    /// Overlay a partial config and optionally create or resize the surface
    UpdateConfig {
        config: ConfigPatch,
        surface: Option<SurfaceSize>,
    },
    /// Run one frame through the staged scheduler
    ProcessFrame { frame: Frame },
    GetPerformanceStats,
    ResetPerformanceStats,
    /// Single-shot decode bypassing the stages
    Decode { frame: Frame },
    ClearBuffer,
    /// Drop all state and end the worker loop
    Terminate,
    /// Parse MRZ text
    ParseMrz { text: String },
}

impl RequestKind {
    pub fn request_type(&self) -> RequestType {
        match self {
            RequestKind::Init { .. } => RequestType::Init,
            RequestKind::UpdateConfig { .. } => RequestType::UpdateConfig,
            RequestKind::ProcessFrame { .. } => RequestType::ProcessFrame,
            RequestKind::GetPerformanceStats => RequestType::GetPerformanceStats,
            RequestKind::ResetPerformanceStats => RequestType::ResetPerformanceStats,
            RequestKind::Decode { .. } => RequestType::Decode,
            RequestKind::ClearBuffer => RequestType::ClearBuffer,
            RequestKind::Terminate => RequestType::Terminate,
            RequestKind::ParseMrz { .. } => RequestType::ParseMrz,
        }
    }
}

/// A correlated request
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub kind: RequestKind,
}

impl Request {
    pub fn new(id: impl Into<RequestId>, kind: RequestKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitBody {
    #[serde(default)]
    config: Option<ConfigPatch>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateConfigBody {
    #[serde(default)]
    config: ConfigPatch,
    #[serde(default)]
    surface: Option<SurfaceSize>,
}

#[derive(Deserialize)]
struct FrameBody {
    frame: FramePayload,
}

#[derive(Deserialize)]
struct MrzBody {
    text: String,
}

/// Outcome of parsing one wire message
#[derive(Debug)]
pub enum Decoded {
    /// Well-formed request
    Request(Request),
    /// Known kind with a payload or id that failed to parse
    Malformed {
        id: RequestId,
        request: RequestType,
        error: ScanError,
    },
    /// Not JSON, or no known `type`; never answered
    Ignored(String),
}

/// Parse one JSON message
pub fn decode_request(text: &str) -> Decoded {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return Decoded::Ignored(format!("not JSON: {e}")),
    };
    let Some(name) = value.get("type").and_then(Value::as_str) else {
        return Decoded::Ignored("missing type".into());
    };
    let Some(request) = RequestType::from_wire(name) else {
        return Decoded::Ignored(format!("unknown message type {name:?}"));
    };
    let id = RequestId::from_wire(value.get("id"));
    if id == RequestId::Unset {
        return Decoded::Malformed {
            id,
            request,
            error: ScanError::Protocol(format!("{name} without a usable id")),
        };
    }

    match parse_kind(request, value) {
        Ok(kind) => Decoded::Request(Request { id, kind }),
        Err(error) => Decoded::Malformed { id, request, error },
    }
}

fn parse_kind(request: RequestType, value: Value) -> ScanResult<RequestKind> {
    Ok(match request {
        RequestType::Init => {
            let body: InitBody = serde_json::from_value(value)?;
            RequestKind::Init {
                config: body.config,
            }
        }
        RequestType::UpdateConfig => {
            let body: UpdateConfigBody = serde_json::from_value(value)?;
            RequestKind::UpdateConfig {
                config: body.config,
                surface: body.surface,
            }
        }
        RequestType::ProcessFrame => {
            let body: FrameBody = serde_json::from_value(value)?;
            RequestKind::ProcessFrame {
                frame: body.frame.into_frame()?,
            }
        }
        RequestType::Decode => {
            let body: FrameBody = serde_json::from_value(value)?;
            RequestKind::Decode {
                frame: body.frame.into_frame()?,
            }
        }
        RequestType::ParseMrz => {
            let body: MrzBody = serde_json::from_value(value)?;
            RequestKind::ParseMrz { text: body.text }
        }
        RequestType::GetPerformanceStats => RequestKind::GetPerformanceStats,
        RequestType::ResetPerformanceStats => RequestKind::ResetPerformanceStats,
        RequestType::ClearBuffer => RequestKind::ClearBuffer,
        RequestType::Terminate => RequestKind::Terminate,
    })
}

/// Success payloads
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Initialized { already_initialized: bool },
    ConfigUpdated {
        config: crate::config::ProcessingConfig,
        surface: Option<SurfaceSize>,
    },
    Frame(FrameOutcome),
    Stats(PerformanceSnapshot),
    Decoded(Vec<DetectionResult>),
    Mrz(MrzResult),
    Ack,
    Terminated,
}

/// Exactly one per request
#[derive(Debug)]
pub struct Response {
    pub id: RequestId,
    pub request: RequestType,
    pub outcome: ScanResult<ResponseBody>,
}

impl Response {
    pub fn ok(id: impl Into<RequestId>, request: RequestType, body: ResponseBody) -> Self {
        Self {
            id: id.into(),
            request,
            outcome: Ok(body),
        }
    }

    pub fn err(id: impl Into<RequestId>, request: RequestType, error: ScanError) -> Self {
        Self {
            id: id.into(),
            request,
            outcome: Err(error),
        }
    }

    /// Wire `type` of this response
    pub fn wire_type(&self) -> String {
        match &self.outcome {
            Err(_) if !self.request.fails_inline() => format!("{}-error", self.request.as_str()),
            _ => format!("{}-response", self.request.as_str()),
        }
    }

    /// Serialize to the JSON wire format
    pub fn to_json(&self) -> ScanResult<String> {
        let mut obj = Map::new();
        obj.insert("type".into(), Value::String(self.wire_type()));
        obj.insert("id".into(), self.id.to_value());
        match &self.outcome {
            Ok(body) => {
                obj.insert("success".into(), Value::Bool(true));
                if let Value::Object(fields) = body_value(body)? {
                    obj.extend(fields);
                }
            }
            Err(err) => {
                if self.request.fails_inline() {
                    obj.insert("success".into(), Value::Bool(false));
                }
                obj.insert("error".into(), Value::String(err.to_string()));
            }
        }
        Ok(serde_json::to_string(&Value::Object(obj))?)
    }
}

fn body_value(body: &ResponseBody) -> ScanResult<Value> {
    Ok(match body {
        ResponseBody::Initialized {
            already_initialized,
        } => json!({ "alreadyInitialized": already_initialized }),
        ResponseBody::ConfigUpdated { config, surface } => {
            json!({ "config": serde_json::to_value(config)?, "surface": surface })
        }
        ResponseBody::Frame(outcome) => serde_json::to_value(outcome)?,
        ResponseBody::Stats(snapshot) => json!({ "stats": serde_json::to_value(snapshot)? }),
        ResponseBody::Decoded(results) => json!({ "results": results }),
        ResponseBody::Mrz(mrz) => json!({ "mrz": serde_json::to_value(mrz)? }),
        ResponseBody::Ack | ResponseBody::Terminated => json!({}),
    })
}
