//! Search envelopes and local file trees used by integration tests

use std::path::Path;

use serde_json::{Value, json};
use sha1::{Digest, Sha1};

/// One search result entry as the repository service returns it
pub fn entry(path: &str, name: &str, item_type: &str, content: &[u8]) -> Value {
    json!({
        "repo": "libs",
        "path": path,
        "name": name,
        "type": item_type,
        "size": content.len(),
        "actual_md5": format!("{:x}", md5::compute(content)),
        "actual_sha1": sha1_hex(content),
        "properties": [],
    })
}

/// `{"results": [...], "range": {...}}` envelope around `entries`
pub fn search_envelope(entries: Vec<Value>) -> String {
    let total = entries.len();
    json!({
        "results": entries,
        "range": { "start_pos": 0, "end_pos": total, "total": total },
    })
    .to_string()
}

/// Hex SHA-1 of `content`
pub fn sha1_hex(content: &[u8]) -> String {
    hex::encode(Sha1::digest(content))
}

/// Write `files` (relative path, content) under `root`, creating directories
pub fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (relative, content) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
}
