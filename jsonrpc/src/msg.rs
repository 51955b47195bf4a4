use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;
use std::collections::HashMap;

pub(crate) const CODE_PARSE_ERROR: i32 = -32700;
pub(crate) const CODE_INVALID_REQ: i32 = -32600;
pub(crate) const CODE_METHOD_NOT_FOUND: i32 = -32601;
pub(crate) const CODE_INVALID_PARAMS: i32 = -32602;
#[allow(dead_code)]
pub(crate) const CODE_INTERNAL_ERROR: i32 = -32603;
pub(crate) const CODE_GENERAL_ERROR: i32 = -1;

pub(crate) const MSG_PARSE_ERROR: &str = "Parse error";
pub(crate) const MSG_INVALID_REQ: &str = "Invalid request";
pub(crate) const MSG_METHOD_NOT_FOUND: &str = "Method not found";
pub(crate) const MSG_INVALID_PARAMS: &str = "Invalid params";
pub(crate) const MSG_GENERAL_ERROR: &str = "General error";

pub(crate) const DATA_MISSING_ID: &str = "Missing field 'id'";
pub(crate) const DATA_BAD_ID_VALUE: &str = "Field 'id' should be string or number";
pub(crate) const DATA_BAD_PARAM_VALUE: &str = "Field 'param' should be object or array";
pub(crate) const DATA_MISSING_METHOD: &str = "Missing field 'method'";

/// The `"jsonrpc": "2.0"` marker. Always emitted, never validated on parse.
pub(crate) struct Ver20;

impl Serialize for Ver20 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("2.0")
    }
}

/// Request as parsed by the server. `params` and `id` stay raw: `id` is only
/// shape-checked and echoed back verbatim, `params` is decoded later against
/// the method's input carrier.
#[derive(Deserialize)]
pub(crate) struct ReqParse {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Box<RawValue>>,
    #[serde(default)]
    pub id: Option<Box<RawValue>>,
    #[serde(default)]
    pub ctx: Option<HashMap<String, String>>,
}

/// Request as written by the client.
#[derive(Serialize)]
pub(crate) struct ReqFrame<'a> {
    pub jsonrpc: Ver20,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ctx: Option<&'a HashMap<String, String>>,
}

/// Response as written by the server. `id` is serialised unconditionally so
/// an unknown request id becomes `"id":null`.
#[derive(Serialize)]
pub(crate) struct RespFrame<'a> {
    pub jsonrpc: Ver20,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RespErrFrame<'a>>,
    pub id: Option<&'a RawValue>,
}

#[derive(Serialize)]
pub(crate) struct RespErrFrame<'a> {
    pub code: i32,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Response as parsed by the client.
#[derive(Deserialize)]
pub(crate) struct RespParse {
    #[serde(default)]
    pub result: Option<Box<RawValue>>,
    #[serde(default)]
    pub error: Option<RespErrParse>,
    #[serde(default)]
    pub id: Option<Box<RawValue>>,
}

/// `code` is optional so that "error object present" and "error object with a
/// code" can be told apart, the way the wire contract requires.
#[derive(Deserialize)]
pub(crate) struct RespErrParse {
    #[serde(default)]
    pub code: Option<i32>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
}
