use std::path::{Path, PathBuf};

use anyhow::Context;
use wren_core::Session;

/// Write the session to `<dir>/conversation_<session_id>.json`.
pub fn write_conversation(session: &Session, dir: &Path) -> anyhow::Result<PathBuf> {
    let path = dir.join(format!("conversation_{}.json", session.id()));
    let json = serde_json::to_string_pretty(&session.export())?;
    std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
