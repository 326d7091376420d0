use std::path::PathBuf;

use serde::Deserialize;

use crate::protect::MarksProtection;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub protection: Option<MarksProtection>,
}
