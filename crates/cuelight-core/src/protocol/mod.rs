//! Wire protocol between the page and native code.
//!
//! ## JS -> native
//! A JSON array passed to `cueSDK.postMessage`:
//! ```json
//! [requestId, "serviceName", "methodName", arg0, arg1, ...]
//! ```
//!
//! ## Native -> JS
//! Responses and notifications are scripts evaluated in the page:
//! ```text
//! cueSDKCallback(JSON.stringify([requestId, result]))
//! cueSDKCallback(JSON.stringify([requestId, null, "error message"]))
//! cueSDKNotification(JSON.stringify(["channel", payload]))
//! ```
//!
//! Positional arguments are decoded once, here, into a typed [`Call`].

pub mod request;
pub mod response;

pub use request::{
    decode, Call, DecodeError, Envelope, PermissionCall, Request, RequestId, StorageCall, TorchCall,
};
pub use response::{
    decode_script, Notification, Outcome, Response, CALLBACK_FUNCTION, NOTIFICATION_FUNCTION,
};
