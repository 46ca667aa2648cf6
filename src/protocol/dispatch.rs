use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{
    CleanerIdRequest, GetFileRequest, Operation, ReplyBody, SendFileRequest, SetIdleRequest,
    StorageService,
};
use crate::error::{RemoteError, Result};

fn decode<T: DeserializeOwned>(payload: Value) -> Result<T> {
    Ok(serde_json::from_value(payload)?)
}

/// Decode a request payload, run it against `service` and encode the reply
pub async fn dispatch(service: &dyn StorageService, operation: Operation, payload: Value) -> ReplyBody {
    match execute(service, operation, payload).await {
        Ok(value) => ReplyBody::Ok { value },
        Err(err) => ReplyBody::Error {
            error: RemoteError::from(&err),
        },
    }
}

async fn execute(service: &dyn StorageService, operation: Operation, payload: Value) -> Result<Value> {
    let value = match operation {
        Operation::RegisterCleaner => {
            let req: CleanerIdRequest = decode(payload)?;
            Value::Bool(service.register_cleaner(&req.cleaner_id).await?)
        }
        Operation::GetCleanerIdle => {
            let req: CleanerIdRequest = decode(payload)?;
            Value::Bool(service.get_cleaner_idle(&req.cleaner_id).await?)
        }
        Operation::SetCleanerIdle => {
            let req: SetIdleRequest = decode(payload)?;
            service.set_cleaner_idle(&req.cleaner_id, req.idle).await?;
            Value::Null
        }
        Operation::IsCleaningMode => Value::Bool(service.is_cleaning_mode().await?),
        Operation::GetFileCount => Value::from(service.get_file_count().await?),
        Operation::TrySendFile => {
            let req: SendFileRequest = decode(payload)?;
            Value::Bool(service.try_send_file(&req.name, req.size).await?)
        }
        Operation::TryGetFile => {
            let req: GetFileRequest = decode(payload)?;
            match req.position() {
                Some(index) => serde_json::to_value(service.try_get_file(index).await?)?,
                None => Value::Null,
            }
        }
        Operation::TryRemoveOldestFile => {
            let req: CleanerIdRequest = decode(payload)?;
            Value::Bool(service.try_remove_oldest_file(&req.cleaner_id).await?)
        }
    };
    Ok(value)
}
