//! Per-service request handlers

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use serde_json::Value;

use super::{CueBridge, Responder};
use crate::effects::FlashSession;
use crate::platform::Permission;
use crate::protocol::{PermissionCall, StorageCall, TorchCall};

const TEST_ERROR_MESSAGE: &str = "This is the test error message";

impl CueBridge {
    pub(super) async fn handle_torch(&self, call: TorchCall, responder: Responder) {
        let result = match call {
            TorchCall::On { level: None } => self.torch.turn_torch(true),
            TorchCall::On { level: Some(level) } => self.torch.turn_torch_to_level(level),
            TorchCall::Off => self.torch.turn_torch(false),
            TorchCall::IsOn => return responder.resolve(self.torch.is_on()),
            TorchCall::Sparkle { duration } => {
                return answer_session(self.effects.sparkle(duration), responder).await
            }
            TorchCall::AdvancedSparkle(envelope) => {
                return answer_session(self.effects.advanced_sparkle(envelope), responder).await
            }
            TorchCall::TestError => return responder.reject(TEST_ERROR_MESSAGE),
        };

        match result {
            Ok(()) => responder.resolve(Value::Null),
            Err(e) => {
                error!("[CueSDK] {}", e);
                responder.reject(e.to_string());
            }
        }
    }

    pub(super) fn handle_vibrate(&self, duration: Duration, responder: Responder) {
        match self.platform.vibrator.vibrate(duration) {
            Ok(()) => responder.resolve(Value::Null),
            Err(e) => responder.reject(e.to_string()),
        }
    }

    pub(super) async fn handle_storage(&self, call: StorageCall, responder: Responder) {
        match call {
            StorageCall::SaveMedia { data, filename } => {
                let bytes = match base64_simd::STANDARD.decode_to_vec(data.as_bytes()) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        return responder.reject(format!("Invalid base64 data for {filename}: {e}"))
                    }
                };

                // Media stores write synchronously; keep that off the runtime workers
                let media = Arc::clone(&self.platform.media);
                let saved = tokio::task::spawn_blocking(move || {
                    media.save_media(&filename, &bytes).map(|()| filename)
                })
                .await;

                match saved {
                    Ok(Ok(filename)) => {
                        info!("[CueSDK] Saved media {}", filename);
                        responder.resolve(Value::Null);
                    }
                    Ok(Err(e)) => responder.reject(e.to_string()),
                    Err(e) => responder.reject(format!("Saving media failed: {e}")),
                }
            }
            StorageCall::SaveCacheFile { filename, data } => {
                let status = self.cache.save_named(&filename, data.as_bytes()).await;
                info!("[FileCache] {}", status);
                if status.is_success() {
                    responder.resolve(Value::Null);
                } else {
                    responder.reject(format!("Error with file {filename}: {status}"));
                }
            }
            StorageCall::GetCacheFile { filename } => {
                match self.cache.load_named(&filename).await {
                    (Some(bytes), status) => {
                        info!("[FileCache] {}", status);
                        responder.resolve(String::from_utf8_lossy(&bytes).into_owned());
                    }
                    (None, status) => {
                        responder.reject(format!("Error with file {filename}: {status}"))
                    }
                }
            }
        }
    }

    /// Save-photo needs no runtime permission with scoped storage
    fn granted_by_policy(&self, permission: Permission) -> bool {
        permission == Permission::SavePhoto
            && self.platform.permissions.api_level() > self.scoped_storage_api_level
    }

    pub(super) fn handle_permissions(&self, call: PermissionCall, responder: Responder) {
        let permissions = &self.platform.permissions;
        match call {
            PermissionCall::Check(permission) => {
                if self.granted_by_policy(permission) {
                    return responder.resolve(true);
                }
                match permissions.check(permission) {
                    Ok(granted) => responder.resolve(granted),
                    Err(e) => responder.reject(e.to_string()),
                }
            }
            PermissionCall::Request(permission) => {
                if self.granted_by_policy(permission) {
                    return responder.resolve(true);
                }
                match permissions.check(permission) {
                    Ok(true) => return responder.resolve(true),
                    Ok(false) => {}
                    Err(e) => return responder.reject(e.to_string()),
                }

                // Park the responder before prompting: the host may answer from inside `request`
                let request_id = responder.request_id();
                self.pending_permissions
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(request_id, responder);

                info!("[CueSDK] Requesting {} permission ({})", permission, request_id);
                if let Err(e) = permissions.request(permission, request_id) {
                    let parked = self
                        .pending_permissions
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&request_id);
                    if let Some(responder) = parked {
                        responder.reject(e.to_string());
                    }
                }
            }
        }
    }
}

async fn answer_session(session: FlashSession, responder: Responder) {
    match session.finished().await {
        Ok(()) => responder.resolve(Value::Null),
        Err(e) => responder.reject(e.to_string()),
    }
}
