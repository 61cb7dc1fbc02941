//! Inbound request decoding

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::platform::{CameraLayout, Permission};

/// Caller-assigned correlation token binding one call to one response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub i64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub call: Call,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Torch(TorchCall),
    Vibrate { duration: Duration },
    Storage(StorageCall),
    Permissions(PermissionCall),
    OpenCamera(CameraLayout),
    NetworkState,
    Timeline { active: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TorchCall {
    /// `level` is a normalized intensity; `None` means full on
    On { level: Option<f32> },
    Off,
    IsOn,
    Sparkle { duration: Duration },
    AdvancedSparkle(Envelope),
    TestError,
}

/// Three-phase torch intensity envelope
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub ramp_up: Duration,
    pub sustain: Duration,
    pub ramp_down: Duration,
    pub intensity: f32,
}

impl Envelope {
    pub fn total(&self) -> Duration {
        self.ramp_up + self.sustain + self.ramp_down
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageCall {
    /// Base64 payload for the public media store
    SaveMedia { data: String, filename: String },
    SaveCacheFile { filename: String, data: String },
    GetCacheFile { filename: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionCall {
    /// Prompt if needed; the answer may arrive later
    Request(Permission),
    /// Check only, never prompt
    Check(Permission),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("Message is not a JSON array: {0}")]
    Malformed(String),

    #[error("No correct requestId was passed")]
    MissingRequestId,

    #[error("No correct serviceName or/and methodName were passed")]
    MissingRoute { request_id: RequestId },

    #[error("Unsupported service: '{service}'")]
    UnsupportedService { request_id: RequestId, service: String },

    #[error("Unsupported method '{method}' for service '{service}'")]
    UnsupportedMethod { request_id: RequestId, service: String, method: String },

    #[error("{message}")]
    InvalidArguments { request_id: RequestId, message: String },
}

impl DecodeError {
    /// The id to answer with, or `None` when the message must be dropped
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            DecodeError::Malformed(_) | DecodeError::MissingRequestId => None,
            DecodeError::MissingRoute { request_id }
            | DecodeError::UnsupportedService { request_id, .. }
            | DecodeError::UnsupportedMethod { request_id, .. }
            | DecodeError::InvalidArguments { request_id, .. } => Some(*request_id),
        }
    }
}

/// Positional arguments following `[requestId, service, method]`
struct Args<'a> {
    request_id: RequestId,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    fn len(&self) -> usize {
        self.values.len()
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn integer(&self, index: usize) -> Option<i64> {
        self.values.get(index).and_then(Value::as_i64)
    }

    /// JSON.stringify turns 1.0 into 1, so integers count as numbers too
    fn number(&self, index: usize) -> Option<f64> {
        self.values.get(index).and_then(Value::as_f64)
    }

    fn string(&self, index: usize) -> Option<String> {
        self.values.get(index).and_then(Value::as_str).map(str::to_owned)
    }

    fn millis(&self, index: usize) -> Option<Duration> {
        self.integer(index)
            .and_then(|ms| u64::try_from(ms).ok())
            .map(Duration::from_millis)
    }

    fn raw(&self, index: usize) -> String {
        self.values
            .get(index)
            .map(Value::to_string)
            .unwrap_or_else(|| "null".to_string())
    }

    fn invalid(&self, message: impl Into<String>) -> DecodeError {
        DecodeError::InvalidArguments {
            request_id: self.request_id,
            message: message.into(),
        }
    }
}

/// Parse one bridge message into a typed request
pub fn decode(message: &str) -> Result<Request, DecodeError> {
    let params: Vec<Value> =
        serde_json::from_str(message).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let id = params
        .first()
        .and_then(Value::as_i64)
        .map(RequestId)
        .ok_or(DecodeError::MissingRequestId)?;

    let service = params.get(1).and_then(Value::as_str);
    let method = params.get(2).and_then(Value::as_str);
    let (service, method) = match (service, method) {
        (Some(service), Some(method)) => (service, method),
        _ => return Err(DecodeError::MissingRoute { request_id: id }),
    };

    let args = Args { request_id: id, values: &params[3..] };
    let unsupported_method = || DecodeError::UnsupportedMethod {
        request_id: id,
        service: service.to_string(),
        method: method.to_string(),
    };

    let call = match service {
        "torch" => Call::Torch(decode_torch(method, &args).ok_or_else(unsupported_method)??),
        "vibration" => match method {
            "vibrate" => Call::Vibrate { duration: duration_arg(&args, 0)? },
            _ => return Err(unsupported_method()),
        },
        "storage" => Call::Storage(decode_storage(method, &args).ok_or_else(unsupported_method)??),
        "permissions" => {
            Call::Permissions(decode_permissions(method).ok_or_else(unsupported_method)?)
        }
        "camera" => match method {
            "openCamera" => Call::OpenCamera(CameraLayout::Both),
            "openPhotoCamera" => Call::OpenCamera(CameraLayout::PhotoOnly),
            "openVideoCamera" => Call::OpenCamera(CameraLayout::VideoOnly),
            _ => return Err(unsupported_method()),
        },
        "network" => match method {
            "getState" => Call::NetworkState,
            _ => return Err(unsupported_method()),
        },
        "timeline" => match method {
            "start" => Call::Timeline { active: true },
            "stop" => Call::Timeline { active: false },
            _ => return Err(unsupported_method()),
        },
        other => {
            return Err(DecodeError::UnsupportedService {
                request_id: id,
                service: other.to_string(),
            })
        }
    };

    Ok(Request { id, call })
}

fn duration_arg(args: &Args<'_>, index: usize) -> Result<Duration, DecodeError> {
    args.millis(index)
        .ok_or_else(|| args.invalid(format!("Duration: {} is not valid value", args.raw(index))))
}

/// `None` for an unknown method, `Some(Err)` for bad arguments
fn decode_torch(method: &str, args: &Args<'_>) -> Option<Result<TorchCall, DecodeError>> {
    let call = match method {
        "on" => {
            if !args.is_empty() {
                match args.number(0) {
                    Some(level) => Ok(TorchCall::On { level: Some(level as f32) }),
                    None => Err(args.invalid("Level cannot be null")),
                }
            } else {
                Ok(TorchCall::On { level: None })
            }
        }
        "off" => Ok(TorchCall::Off),
        "isOn" => Ok(TorchCall::IsOn),
        "sparkle" => duration_arg(args, 0).map(|duration| TorchCall::Sparkle { duration }),
        "advancedSparkle" => decode_envelope(args).map(TorchCall::AdvancedSparkle),
        "testError" => Ok(TorchCall::TestError),
        _ => return None,
    };
    Some(call)
}

fn decode_envelope(args: &Args<'_>) -> Result<Envelope, DecodeError> {
    if args.len() < 4 {
        return Err(args.invalid(
            "Needed more params for advancedSparkle: rampUpMs: Int, sustainMs: Int, rampDownMs: Int, intensity: Float",
        ));
    }

    match (args.millis(0), args.millis(1), args.millis(2), args.number(3)) {
        (Some(ramp_up), Some(sustain), Some(ramp_down), Some(intensity)) => Ok(Envelope {
            ramp_up,
            sustain,
            ramp_down,
            intensity: intensity as f32,
        }),
        _ => Err(args.invalid(format!(
            "Cannot be null rampUpMs: {}, sustainMs: {}, rampDownMs: {}, intensity: {}",
            args.raw(0),
            args.raw(1),
            args.raw(2),
            args.raw(3)
        ))),
    }
}

fn decode_storage(method: &str, args: &Args<'_>) -> Option<Result<StorageCall, DecodeError>> {
    let call = match method {
        "saveMedia" => match (args.string(0), args.string(1)) {
            (None, _) => Err(args.invalid("Data are null")),
            (Some(_), None) => Err(args.invalid("Filename is null")),
            (Some(data), Some(filename)) => Ok(StorageCall::SaveMedia { data, filename }),
        },
        "saveCacheFile" => match (args.string(0), args.string(1)) {
            (_, None) => Err(args.invalid("Data are null")),
            (None, Some(_)) => Err(args.invalid("Filename is null")),
            (Some(filename), Some(data)) => Ok(StorageCall::SaveCacheFile { filename, data }),
        },
        "getCacheFile" => match args.string(0) {
            Some(filename) => Ok(StorageCall::GetCacheFile { filename }),
            None => Err(args.invalid("Filename is null")),
        },
        _ => return None,
    };
    Some(call)
}

fn decode_permissions(method: &str) -> Option<PermissionCall> {
    let call = match method {
        "getMicPermission" => PermissionCall::Request(Permission::Microphone),
        "getCameraPermission" => PermissionCall::Request(Permission::Camera),
        "getSavePhotoPermission" => PermissionCall::Request(Permission::SavePhoto),
        "hasMicPermission" => PermissionCall::Check(Permission::Microphone),
        "hasCameraPermission" => PermissionCall::Check(Permission::Camera),
        "hasSavePhotoPermission" => PermissionCall::Check(Permission::SavePhoto),
        _ => return None,
    };
    Some(call)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(message: &str) -> DecodeError {
        decode(message).expect_err("message should be rejected")
    }

    #[test]
    fn test_decode_torch_on_without_level() {
        let request = decode(r#"[7, "torch", "on"]"#).unwrap();
        assert_eq!(request.id, RequestId(7));
        assert_eq!(request.call, Call::Torch(TorchCall::On { level: None }));
    }

    #[test]
    fn test_decode_torch_on_accepts_integer_level() {
        let request = decode(r#"[1, "torch", "on", 1]"#).unwrap();
        assert_eq!(request.call, Call::Torch(TorchCall::On { level: Some(1.0) }));

        let request = decode(r#"[1, "torch", "on", 0.25]"#).unwrap();
        assert_eq!(request.call, Call::Torch(TorchCall::On { level: Some(0.25) }));
    }

    #[test]
    fn test_decode_torch_on_rejects_non_numeric_level() {
        let err = rejected(r#"[1, "torch", "on", "bright"]"#);
        assert_eq!(err.request_id(), Some(RequestId(1)));
        assert_eq!(err.to_string(), "Level cannot be null");

        let err = rejected(r#"[1, "torch", "on", null]"#);
        assert_eq!(err.to_string(), "Level cannot be null");
    }

    #[test]
    fn test_garbage_is_dropped() {
        assert!(matches!(rejected("not json"), DecodeError::Malformed(_)));
        assert!(matches!(rejected(r#"{"id": 1}"#), DecodeError::Malformed(_)));
        assert_eq!(rejected("[]"), DecodeError::MissingRequestId);
        assert_eq!(rejected(r#"["1", "torch", "on"]"#), DecodeError::MissingRequestId);
        assert_eq!(rejected(r#"[1.5, "torch", "on"]"#), DecodeError::MissingRequestId);
        assert_eq!(rejected("[]").request_id(), None);
    }

    #[test]
    fn test_missing_route_keeps_request_id() {
        let err = rejected("[3]");
        assert_eq!(err, DecodeError::MissingRoute { request_id: RequestId(3) });
        assert!(err.to_string().contains("serviceName"));

        let err = rejected(r#"[4, "torch"]"#);
        assert_eq!(err.request_id(), Some(RequestId(4)));
    }

    #[test]
    fn test_unsupported_service_names_it() {
        let err = rejected(r#"[9, "foo", "bar"]"#);
        assert_eq!(err.request_id(), Some(RequestId(9)));
        assert!(err.to_string().contains("foo"));
    }

    #[test]
    fn test_unsupported_method_is_an_error() {
        let err = rejected(r#"[9, "torch", "explode"]"#);
        assert_eq!(
            err.to_string(),
            "Unsupported method 'explode' for service 'torch'"
        );
    }

    #[test]
    fn test_decode_advanced_sparkle() {
        let request = decode(r#"[2, "torch", "advancedSparkle", 100, 200, 100, 1]"#).unwrap();
        let Call::Torch(TorchCall::AdvancedSparkle(envelope)) = request.call else {
            panic!("expected advancedSparkle");
        };
        assert_eq!(envelope.ramp_up, Duration::from_millis(100));
        assert_eq!(envelope.sustain, Duration::from_millis(200));
        assert_eq!(envelope.total(), Duration::from_millis(400));
        assert_eq!(envelope.intensity, 1.0);
    }

    #[test]
    fn test_advanced_sparkle_names_invalid_params() {
        let err = rejected(r#"[2, "torch", "advancedSparkle", 100, null, 100, 0.5]"#);
        assert_eq!(
            err.to_string(),
            "Cannot be null rampUpMs: 100, sustainMs: null, rampDownMs: 100, intensity: 0.5"
        );

        let err = rejected(r#"[2, "torch", "advancedSparkle", 100]"#);
        assert!(err.to_string().starts_with("Needed more params for advancedSparkle"));
    }

    #[test]
    fn test_vibrate_requires_duration() {
        let err = rejected(r#"[5, "vibration", "vibrate"]"#);
        assert_eq!(err.to_string(), "Duration: null is not valid value");

        let err = rejected(r#"[5, "vibration", "vibrate", -20]"#);
        assert_eq!(err.request_id(), Some(RequestId(5)));

        let request = decode(r#"[5, "vibration", "vibrate", 300]"#).unwrap();
        assert_eq!(request.call, Call::Vibrate { duration: Duration::from_millis(300) });
    }

    #[test]
    fn test_decode_storage_argument_order() {
        let request = decode(r#"[1, "storage", "saveCacheFile", "state.json", "{}"]"#).unwrap();
        assert_eq!(
            request.call,
            Call::Storage(StorageCall::SaveCacheFile {
                filename: "state.json".into(),
                data: "{}".into()
            })
        );

        let request = decode(r#"[1, "storage", "saveMedia", "aGk=", "pic.png"]"#).unwrap();
        assert_eq!(
            request.call,
            Call::Storage(StorageCall::SaveMedia {
                data: "aGk=".into(),
                filename: "pic.png".into()
            })
        );

        assert_eq!(
            rejected(r#"[1, "storage", "saveMedia", "aGk="]"#).to_string(),
            "Filename is null"
        );
        assert_eq!(
            rejected(r#"[1, "storage", "getCacheFile"]"#).to_string(),
            "Filename is null"
        );
    }

    #[test]
    fn test_decode_routes_without_args() {
        assert_eq!(
            decode(r#"[1, "camera", "openVideoCamera"]"#).unwrap().call,
            Call::OpenCamera(CameraLayout::VideoOnly)
        );
        assert_eq!(
            decode(r#"[1, "permissions", "hasSavePhotoPermission"]"#).unwrap().call,
            Call::Permissions(PermissionCall::Check(Permission::SavePhoto))
        );
        assert_eq!(
            decode(r#"[1, "timeline", "stop"]"#).unwrap().call,
            Call::Timeline { active: false }
        );
        assert_eq!(decode(r#"[1, "network", "getState"]"#).unwrap().call, Call::NetworkState);
    }
}
