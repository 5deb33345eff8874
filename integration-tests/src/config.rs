use std::fs;
use std::path::Path;

use serde::Deserialize;

use powerplatform_admin_tools::auth::ClientCredentials;

#[derive(Debug, Deserialize)]
pub struct Secrets {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    /// Environment whose flows are listed.
    pub environment_id: String,
    /// Dataverse URL of the failure table's environment.
    pub dataverse_url: String,
    pub failure_entity_set: String,
    pub failure_table_prefix: String,
}

impl Secrets {
    pub fn credentials(&self) -> ClientCredentials {
        ClientCredentials {
            tenant_id: self.tenant_id.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }
}

pub fn load_secrets() -> Result<Secrets, String> {
    let mut path = std::env::current_dir().map_err(|e| e.to_string())?;
    path.push("secrets.json");
    read_secrets(&path)
}

fn read_secrets(path: &Path) -> Result<Secrets, String> {
    let contents =
        fs::read_to_string(path).map_err(|e| format!("Failed to read secrets.json: {e}"))?;
    serde_json::from_str(&contents).map_err(|e| format!("Invalid secrets.json: {e}"))
}
