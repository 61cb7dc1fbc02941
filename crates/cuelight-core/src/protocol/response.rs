//! Outbound responses and notifications, rendered as page scripts

use serde_json::{json, Value};

use super::request::RequestId;

/// Page function receiving request responses
pub const CALLBACK_FUNCTION: &str = "cueSDKCallback";
/// Page function receiving uncorrelated notifications
pub const NOTIFICATION_FUNCTION: &str = "cueSDKNotification";

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Success; `Value::Null` means "no payload"
    Result(Value),
    Error(String),
}

impl Outcome {
    fn push_into(&self, params: &mut Vec<Value>) {
        match self {
            Outcome::Result(value) => params.push(value.clone()),
            Outcome::Error(message) => {
                params.push(Value::Null);
                params.push(Value::String(message.clone()));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub request_id: RequestId,
    pub outcome: Outcome,
}

impl Response {
    pub fn ok(request_id: RequestId, result: impl Into<Value>) -> Self {
        Self { request_id, outcome: Outcome::Result(result.into()) }
    }

    pub fn error(request_id: RequestId, message: impl Into<String>) -> Self {
        Self { request_id, outcome: Outcome::Error(message.into()) }
    }

    /// `[requestId, result]` or `[requestId, null, error]`
    pub fn to_params(&self) -> Value {
        let mut params = vec![json!(self.request_id)];
        self.outcome.push_into(&mut params);
        Value::Array(params)
    }

    pub fn to_script(&self) -> String {
        script(CALLBACK_FUNCTION, &self.to_params())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub channel: String,
    pub outcome: Outcome,
}

impl Notification {
    pub fn new(channel: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self { channel: channel.into(), outcome: Outcome::Result(payload.into()) }
    }

    pub fn error(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self { channel: channel.into(), outcome: Outcome::Error(message.into()) }
    }

    pub fn to_params(&self) -> Value {
        let mut params = vec![Value::String(self.channel.clone())];
        self.outcome.push_into(&mut params);
        Value::Array(params)
    }

    pub fn to_script(&self) -> String {
        script(NOTIFICATION_FUNCTION, &self.to_params())
    }
}

fn script(function: &str, params: &Value) -> String {
    // JSON is a JS literal except for raw line/paragraph separators
    let literal = params
        .to_string()
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029");
    format!("{function}(JSON.stringify({literal}))")
}

/// Split an evaluated script back into its function name and params array
pub fn decode_script(script: &str) -> Option<(&str, Value)> {
    let (function, rest) = script.split_once("(JSON.stringify(")?;
    let literal = rest.strip_suffix("))")?;
    let params = serde_json::from_str(literal).ok()?;
    Some((function, params))
}
