use serde_json::Value;

/// One logical inventory lookup: `{subject}/{category}/{subcategory}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRequest {
    /// SteamID64 of the inventory owner
    pub steam_id: String,
    /// Application id; selects the page size
    pub app_id: u32,
    /// Context id within the application
    pub context_id: u64,
}

impl InventoryRequest {
    pub fn new(steam_id: impl Into<String>, app_id: u32, context_id: u64) -> Self {
        Self {
            steam_id: steam_id.into(),
            app_id,
            context_id,
        }
    }

    /// Tag a successful payload with the identifiers it was fetched for
    pub fn annotate(&self, mut payload: Value) -> Value {
        if let Value::Object(map) = &mut payload {
            map.insert("steamID".into(), Value::from(self.steam_id.clone()));
            map.insert("appID".into(), Value::from(self.app_id));
            map.insert("contextID".into(), Value::from(self.context_id));
        }
        payload
    }
}

impl std::fmt::Display for InventoryRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.steam_id, self.app_id, self.context_id)
    }
}
