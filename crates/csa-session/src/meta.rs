//! `session.meta`: written once at session construction, never mutated.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SessionMeta {
    pub session_id: String,
    pub pattern_name: String,
    pub working_dir: String,
    pub default_model: Option<String>,
    pub created: String,
}
