use axum::extract::State;
use axum::Json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tourforge_core::instance::Instance;
use tourforge_core::protocol::InstanceEntry;
use tourforge_core::util::calculate_file_hash;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Resolves an instance name to a file directly inside `root`. Names that
/// could climb out of the directory are rejected.
pub fn resolve(root: &Path, name: &str) -> AppResult<PathBuf> {
    let plain = Path::new(name).file_name().and_then(|f| f.to_str()) == Some(name);
    if name.is_empty() || !plain || name.starts_with('.') {
        return Err(AppError::Validation(format!("invalid instance name '{}'", name)));
    }
    let path = root.join(name);
    if !path.is_file() {
        return Err(AppError::NotFound(format!("instance '{}'", name)));
    }
    Ok(path)
}

/// Resolves and parses an instance. Blocking; call it off the runtime.
pub fn load(root: &Path, name: &str) -> AppResult<Instance> {
    let path = resolve(root, name)?;
    Ok(Instance::load(&path)?)
}

fn scan(root: &Path) -> Vec<InstanceEntry> {
    debug!("📂 Scanning instances at {:?}", root);

    // Symlinks are not followed so the listing stays inside the directory.
    let mut entries: Vec<InstanceEntry> = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let name = e.file_name().to_str()?.to_string();
            let sha256 = calculate_file_hash(e.path()).ok()?;
            Some(InstanceEntry { name, sha256 })
        })
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

pub async fn list(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<InstanceEntry>>> {
    let root = state.instances.clone();
    let entries = tokio::task::spawn_blocking(move || scan(&root))
        .await
        .map_err(anyhow::Error::from)?;
    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("five.txt"), "x").unwrap();

        assert!(resolve(dir.path(), "five.txt").is_ok());
        assert!(matches!(resolve(dir.path(), "missing.txt"), Err(AppError::NotFound(_))));
        for bad in ["../five.txt", "sub/five.txt", "..", ".hidden", ""] {
            assert!(
                matches!(resolve(dir.path(), bad), Err(AppError::Validation(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_load_and_scan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gr2.txt"), "gr2\n2\n0 3\n3 0\n6\n").unwrap();
        std::fs::write(dir.path().join("broken.txt"), "not an instance").unwrap();

        let inst = load(dir.path(), "gr2.txt").unwrap();
        assert_eq!(inst.city_count, 2);
        assert_eq!(inst.optimal_value, 6);
        assert!(matches!(load(dir.path(), "broken.txt"), Err(AppError::Tour(_))));
        assert!(matches!(load(dir.path(), "nope.txt"), Err(AppError::NotFound(_))));

        let names: Vec<String> = scan(dir.path()).into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["broken.txt", "gr2.txt"]);
    }
}
