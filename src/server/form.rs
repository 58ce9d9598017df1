//! Server-side form descriptor, ported field-for-field from the original's
//! `chatterlang_serve.py` `FormConfig`/`FormField` pydantic models (spec
//! §4.9's `GET /form-config`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u32>,
    #[serde(default)]
    pub persist: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormConfig {
    pub title: String,
    pub fields: Vec<FormField>,
    #[serde(default = "default_position")]
    pub position: String,
    #[serde(default = "default_height")]
    pub height: String,
    #[serde(default = "default_theme")]
    pub theme: String,
}

fn default_position() -> String {
    "top".to_string()
}

fn default_height() -> String {
    "auto".to_string()
}

fn default_theme() -> String {
    "light".to_string()
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            title: "ChatterLang".to_string(),
            fields: vec![FormField {
                name: "input".to_string(),
                field_type: "text".to_string(),
                label: "Input".to_string(),
                placeholder: Some("Type a message...".to_string()),
                required: true,
                default: None,
                options: None,
                min: None,
                max: None,
                rows: None,
                persist: false,
            }],
            position: default_position(),
            height: default_height(),
            theme: default_theme(),
        }
    }
}
