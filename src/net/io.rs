//! 快照文件读写：按扩展名选择 JSON 或 RON。
use std::fs;
use std::path::Path;

use ron::ser::PrettyConfig;
use thiserror::Error;

use crate::net::core::Net;
use crate::net::snapshot::{NetSnapshot, SnapshotError};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ron error: {0}")]
    Ron(#[from] ron::Error),
    #[error("ron syntax error: {0}")]
    RonSyntax(#[from] ron::error::SpannedError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Ron,
}

impl Format {
    /// `.ron` selects RON, anything else JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("ron") => Format::Ron,
            _ => Format::Json,
        }
    }
}

pub fn to_string(snapshot: &NetSnapshot, format: Format) -> Result<String, IoError> {
    Ok(match format {
        Format::Json => serde_json::to_string_pretty(snapshot)?,
        Format::Ron => {
            let mut pretty = PrettyConfig::default();
            pretty.new_line = "\n".into();
            ron::ser::to_string_pretty(snapshot, pretty)?
        }
    })
}

pub fn from_str(content: &str, format: Format) -> Result<NetSnapshot, IoError> {
    Ok(match format {
        Format::Json => serde_json::from_str(content)?,
        Format::Ron => ron::from_str(content)?,
    })
}

pub fn save_net<P: AsRef<Path>>(net: &Net, path: P) -> Result<(), IoError> {
    let path = path.as_ref();
    let content = to_string(&net.to_snapshot(), Format::from_path(path))?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

pub fn read_snapshot<P: AsRef<Path>>(path: P) -> Result<NetSnapshot, IoError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    from_str(&content, Format::from_path(path))
}

/// Strict load of a snapshot file.
pub fn load_net<P: AsRef<Path>>(path: P) -> Result<Net, IoError> {
    let snapshot = read_snapshot(path)?;
    Ok(Net::from_snapshot(&snapshot)?)
}

/// Best-effort load; skipped elements are returned next to the net.
pub fn load_net_lenient<P: AsRef<Path>>(path: P) -> Result<(Net, Vec<SnapshotError>), IoError> {
    let snapshot = read_snapshot(path)?;
    Ok(Net::from_snapshot_lenient(&snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::structure::{Place, Transition};

    #[test]
    fn format_follows_extension() {
        assert_eq!(Format::from_path(Path::new("net.RON")), Format::Ron);
        assert_eq!(Format::from_path(Path::new("net.json")), Format::Json);
        assert_eq!(Format::from_path(Path::new("net")), Format::Json);
    }

    #[test]
    fn ron_text_reads_back() {
        let mut net = Net::empty();
        let p = net.add_place(Place::with_tokens("P1", 3)).unwrap();
        let t = net.add_transition(Transition::new("T1")).unwrap();
        net.add_arc(p, t, 2).unwrap();
        let snapshot = net.to_snapshot();
        let text = to_string(&snapshot, Format::Ron).unwrap();
        assert_eq!(from_str(&text, Format::Ron).unwrap(), snapshot);
    }

    #[test]
    fn files_round_trip() {
        let dir = std::env::temp_dir().join(format!("smart-petri-io-{}", std::process::id()));
        let path = dir.join("net.json");
        let mut net = Net::empty();
        net.add_place(Place::with_tokens("P1", 1)).unwrap();
        save_net(&net, &path).unwrap();
        let loaded = load_net(&path).unwrap();
        assert_eq!(loaded.to_snapshot(), net.to_snapshot());
        let _ = fs::remove_dir_all(dir);
    }
}
