use crate::services::name_codec;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One entry of the storage directory, as shown to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    /// On-disk name: `<uploadTimestampMillis>-<sanitizedOriginalName>`
    pub stored_name: String,
    /// Display name recovered from the stored name
    pub original_name: String,
}

impl StoredFile {
    pub fn from_stored_name(stored_name: impl Into<String>) -> Self {
        let stored_name = stored_name.into();
        let original_name = name_codec::decode(&stored_name).to_string();
        Self {
            stored_name,
            original_name,
        }
    }

    pub fn uploaded_at_millis(&self) -> Option<u64> {
        name_codec::timestamp_of(&self.stored_name)
    }
}
