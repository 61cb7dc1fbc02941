//! Delivery of responses and notifications into the page.
//!
//! Scripts are queued on a single channel; one consumer ([`run_script_pump`]
//! or the host's own UI loop) evaluates them in order on its own context.

use std::sync::Arc;

use log::{trace, warn};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::platform::ScriptHost;
use crate::protocol::{Notification, RequestId, Response};

#[derive(Clone)]
pub struct Messenger {
    tx: mpsc::UnboundedSender<String>,
}

impl Messenger {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, script: String) {
        trace!("[CueSDK] Sent to JavaScript: {}", script);
        if self.tx.send(script).is_err() {
            warn!("[CueSDK] Page is gone, script discarded");
        }
    }

    pub fn send_response(&self, response: &Response) {
        self.send(response.to_script());
    }

    pub fn send_notification(&self, notification: &Notification) {
        self.send(notification.to_script());
    }

    /// Per-call context for answering `request_id`
    pub fn responder(&self, request_id: RequestId) -> Responder {
        Responder { request_id, messenger: self.clone(), answered: false }
    }
}

/// Evaluate queued scripts in the page, one at a time, until every sender is gone
pub async fn run_script_pump(mut rx: mpsc::UnboundedReceiver<String>, host: Arc<dyn ScriptHost>) {
    while let Some(script) = rx.recv().await {
        host.evaluate_javascript(&script);
    }
}

/// Answers one request exactly once.
///
/// Consumed by [`Responder::resolve`] or [`Responder::reject`]; a responder
/// dropped unanswered sends an error so the page never waits forever.
pub struct Responder {
    request_id: RequestId,
    messenger: Messenger,
    answered: bool,
}

impl Responder {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn resolve(mut self, result: impl Into<Value>) {
        self.answer(Response::ok(self.request_id, result));
    }

    pub fn reject(mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("[CueSDK] Request {} failed: {}", self.request_id, message);
        self.answer(Response::error(self.request_id, message));
    }

    fn answer(&mut self, response: Response) {
        self.answered = true;
        self.messenger.send_response(&response);
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if !self.answered {
            warn!("[CueSDK] Request {} dropped without a response", self.request_id);
            let response = Response::error(
                self.request_id,
                format!("Request {} was dropped without a response", self.request_id),
            );
            self.messenger.send_response(&response);
        }
    }
}
