use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tag identifying who produced an [`Envelope`].
///
/// An unrecognized tag on an inbound frame is coerced to `Editor` rather than
/// rejected — see [`Envelope::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Editor,
    Caller,
    Aux,
}

impl Source {
    fn from_wire(raw: &str) -> Self {
        match raw {
            "editor" => Source::Editor,
            "caller" => Source::Caller,
            "aux" => Source::Aux,
            _ => Source::Editor,
        }
    }

    fn as_wire(self) -> &'static str {
        match self {
            Source::Editor => "editor",
            Source::Caller => "caller",
            Source::Aux => "aux",
        }
    }
}

/// The wire unit exchanged between the hub and an editor peer.
///
/// `version`, `source`, `ty`, `ts` and `id` are always present on the wire;
/// `body` defaults to an empty object when absent; `session` is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "v")]
    pub version: u32,
    pub source: Source,
    #[serde(rename = "type")]
    pub ty: String,
    pub ts: i64,
    pub id: String,
    #[serde(default)]
    pub body: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session: Option<String>,
}

/// Errors that can occur decoding a frame off the wire.
///
/// A [`CodecError`] never reaches a caller of the hub: per the router
/// contract, a malformed frame is logged and dropped, and the peer survives.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("frame is not a json object")]
    NotAnObject,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("field {field} has the wrong type")]
    WrongType { field: &'static str },
}

impl Envelope {
    /// Build a new outbound envelope with protocol version 1.
    pub fn new(source: Source, ty: impl Into<String>, id: impl Into<String>, ts: i64) -> Self {
        Self {
            version: 1,
            source,
            ty: ty.into(),
            ts,
            id: id.into(),
            body: Map::new(),
            session: None,
        }
    }

    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = body;
        self
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// Parse raw wire bytes into an [`Envelope`].
    ///
    /// Required fields: `source`, `type`, `ts`, `id`. `body` defaults to an
    /// empty object when absent. `v` defaults to 1 when absent. An
    /// unrecognized `source` tag is coerced to `editor` rather than
    /// rejected.
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let Value::Object(mut obj) = value else {
            return Err(CodecError::NotAnObject);
        };

        let source_raw = obj
            .remove("source")
            .ok_or(CodecError::MissingField("source"))?;
        let source = match source_raw {
            Value::String(s) => Source::from_wire(&s),
            _ => {
                return Err(CodecError::WrongType { field: "source" });
            }
        };

        let ty = match obj.remove("type").ok_or(CodecError::MissingField("type"))? {
            Value::String(s) => s,
            _ => return Err(CodecError::WrongType { field: "type" }),
        };

        let ts = match obj.remove("ts").ok_or(CodecError::MissingField("ts"))? {
            Value::Number(n) => n.as_i64().ok_or(CodecError::WrongType { field: "ts" })?,
            _ => return Err(CodecError::WrongType { field: "ts" }),
        };

        let id = match obj.remove("id").ok_or(CodecError::MissingField("id"))? {
            Value::String(s) => s,
            _ => return Err(CodecError::WrongType { field: "id" }),
        };

        let version = match obj.remove("v") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(1) as u32,
            Some(_) => return Err(CodecError::WrongType { field: "v" }),
            None => 1,
        };

        let body = match obj.remove("body") {
            Some(Value::Object(map)) => map,
            Some(_) => return Err(CodecError::WrongType { field: "body" }),
            None => Map::new(),
        };

        let session = match obj.remove("session") {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(_) => return Err(CodecError::WrongType { field: "session" }),
        };

        Ok(Envelope {
            version,
            source,
            ty,
            ts,
            id,
            body,
            session,
        })
    }

    /// Serialize to the canonical wire form: `v,source,type,ts,id,body[,session]`.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut obj = Map::new();
        obj.insert("v".into(), Value::Number(self.version.into()));
        obj.insert("source".into(), Value::String(self.source.as_wire().into()));
        obj.insert("type".into(), Value::String(self.ty.clone()));
        obj.insert("ts".into(), Value::Number(self.ts.into()));
        obj.insert("id".into(), Value::String(self.id.clone()));
        obj.insert("body".into(), Value::Object(self.body.clone()));
        if let Some(session) = &self.session {
            obj.insert("session".into(), Value::String(session.clone()));
        }
        serde_json::to_vec(&Value::Object(obj)).expect("envelope is always valid json")
    }
}

/// Types that the hub acknowledges with an `ack` envelope when they are not
/// resolving a pending correlation, signaling durable receipt upstream.
pub const ACK_REQUIRED_TYPES: &[&str] = &[
    "hello",
    "assets_imported",
    "assets_deleted",
    "assets_moved",
    "scene_saved",
    "project_changed",
    "compile_started",
    "compile_finished",
    "will_save_assets",
    "hierarchy_changed",
    "selection_changed",
];
