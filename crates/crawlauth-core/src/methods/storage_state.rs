//! Session restore and capture through storage-state snapshot files.

use crate::error::{AuthError, RedactedCause};
use crawlauth_browser::{BrowserContext, StorageState};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const ORIGIN_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Clone, Copy)]
pub struct StorageStateMethod;

impl StorageStateMethod {
    pub fn new() -> Self {
        Self
    }

    /// Restore a snapshot into `context`: cookies first, then each origin's
    /// local storage by visiting that origin on a scratch page.
    pub async fn apply(&self, context: &dyn BrowserContext, path: &Path) -> Result<(), AuthError> {
        let state = read_snapshot(path).await?;

        context
            .add_cookies(&state.cookies)
            .await
            .map_err(|e| io_failure(path, "restoring cookies", e))?;

        for origin in state.origins.iter().filter(|o| !o.local_storage.is_empty()) {
            let page = context
                .new_page()
                .await
                .map_err(|e| io_failure(path, "opening origin page", e))?;
            let restored = async {
                page.goto(&origin.origin, ORIGIN_NAVIGATION_TIMEOUT).await?;
                page.set_local_storage(&origin.local_storage).await
            }
            .await;
            if let Err(e) = page.close().await {
                tracing::debug!(origin = %origin.origin, error = %e, "Failed to close origin page");
            }
            restored.map_err(|e| io_failure(path, "restoring local storage", e))?;
        }

        tracing::info!(
            path = %path.display(),
            cookies = state.cookies.len(),
            origins = state.origins.len(),
            "Storage state applied"
        );
        Ok(())
    }

    /// Capture the context's storage state and write it with owner-only
    /// permissions. Only directories created here are made owner-only.
    pub async fn save(&self, context: &dyn BrowserContext, path: &Path) -> Result<(), AuthError> {
        let state = context
            .storage_state()
            .await
            .map_err(|e| io_failure(path, "capturing storage state", e))?;
        let json = state
            .to_json_pretty()
            .map_err(|e| io_failure(path, "serializing storage state", e))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_private_dirs(parent)
                .await
                .map_err(|e| io_failure(path, "creating storage state directory", e))?;
        }

        let mut file = open_private_file(path)
            .await
            .map_err(|e| io_failure(path, "opening storage state file", e))?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| io_failure(path, "writing storage state", e))?;
        file.flush()
            .await
            .map_err(|e| io_failure(path, "writing storage state", e))?;

        tracing::info!(path = %path.display(), "Storage state saved");
        Ok(())
    }

    /// Whether `path` exists and looks like a snapshot. No side effects.
    pub async fn validate(&self, path: &Path) -> bool {
        let Ok(raw) = tokio::fs::read_to_string(path).await else {
            return false;
        };
        serde_json::from_str::<serde_json::Value>(&raw)
            .map(|value| StorageState::has_snapshot_shape(&value))
            .unwrap_or(false)
    }
}

async fn read_snapshot(path: &Path) -> Result<StorageState, AuthError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AuthError::StorageStateNotFound {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(io_failure(path, "reading storage state", e)),
    };
    StorageState::from_json(&raw).map_err(|e| io_failure(path, "parsing storage state", e))
}

/// Create whatever part of `dir` is missing as owner-only directories.
/// Directories that already exist keep their permissions.
async fn create_private_dirs(dir: &Path) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(dir).await
}

/// Open `path` for writing as an owner-only file. A file that already
/// existed is tightened before any content is written.
async fn open_private_file(path: &Path) -> std::io::Result<tokio::fs::File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let file = options.open(path).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await?;
    }
    Ok(file)
}

/// The role is filled in by the caller through [`AuthError::for_role`].
fn io_failure(path: &Path, step: &str, error: impl std::fmt::Display) -> AuthError {
    AuthError::Authentication {
        role: String::new(),
        message: format!("{step} failed for {}", path.display()),
        cause: Some(RedactedCause::new(error.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlauth_browser::fake::{FakeBrowser, FakeSite};
    use crawlauth_browser::{
        BrowserDriver, ContextOptions, Cookie, LocalStorageEntry, OriginStorage,
    };

    const ORIGIN: &str = "https://app.example.com";

    fn snapshot() -> StorageState {
        StorageState {
            cookies: vec![Cookie::new("sid", "s3ss10n", "app.example.com")],
            origins: vec![OriginStorage {
                origin: ORIGIN.to_string(),
                local_storage: vec![LocalStorageEntry {
                    name: "token".to_string(),
                    value: "t0k3n".to_string(),
                }],
            }],
        }
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let browser = FakeBrowser::new(FakeSite::new());
        let context = browser.new_context(ContextOptions::default()).await.unwrap();

        let err = StorageStateMethod::new()
            .apply(context.as_ref(), &path)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::StorageStateNotFound { path: p } if p == path));
    }

    #[tokio::test]
    async fn apply_restores_cookies_and_local_storage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.json");
        std::fs::write(&path, snapshot().to_json_pretty().unwrap()).unwrap();

        let browser = FakeBrowser::new(FakeSite::new().page(ORIGIN, &[]));
        let context = browser.new_context(ContextOptions::default()).await.unwrap();
        StorageStateMethod::new()
            .apply(context.as_ref(), &path)
            .await
            .unwrap();

        assert_eq!(context.cookies().await.unwrap()[0].name, "sid");
        let fake = &browser.contexts()[0];
        assert_eq!(fake.local_storage(ORIGIN)[0].value, "t0k3n");
        assert!(context.pages().await.is_empty());
    }

    #[tokio::test]
    async fn save_writes_owner_only_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("admin.json");

        let browser = FakeBrowser::new(FakeSite::new());
        let context = browser.new_context(ContextOptions::default()).await.unwrap();
        context.add_cookies(&snapshot().cookies).await.unwrap();

        let method = StorageStateMethod::new();
        method.save(context.as_ref(), &path).await.unwrap();

        let saved = StorageState::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.cookies.len(), 1);
        assert!(method.validate(&path).await);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let file_mode = std::fs::metadata(&path).unwrap().permissions().mode();
            let dir_mode = std::fs::metadata(path.parent().unwrap())
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(file_mode & 0o777, 0o600);
            assert_eq!(dir_mode & 0o777, 0o700);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn save_leaves_existing_directory_permissions_alone() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let shared = dir.path().join("shared");
        std::fs::create_dir(&shared).unwrap();
        std::fs::set_permissions(&shared, std::fs::Permissions::from_mode(0o755)).unwrap();

        let browser = FakeBrowser::new(FakeSite::new());
        let context = browser.new_context(ContextOptions::default()).await.unwrap();
        let path = shared.join("state.json");
        StorageStateMethod::new()
            .save(context.as_ref(), &path)
            .await
            .unwrap();

        let dir_mode = std::fs::metadata(&shared).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o755);
        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn save_tightens_an_existing_readable_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.json");
        std::fs::write(&path, "stale").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let browser = FakeBrowser::new(FakeSite::new());
        let context = browser.new_context(ContextOptions::default()).await.unwrap();
        context.add_cookies(&snapshot().cookies).await.unwrap();
        StorageStateMethod::new()
            .save(context.as_ref(), &path)
            .await
            .unwrap();

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o600);
        let saved = StorageState::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.cookies[0].value, "s3ss10n");
    }

    #[tokio::test]
    async fn validate_checks_shape_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let method = StorageStateMethod::new();

        let good = dir.path().join("good.json");
        std::fs::write(&good, r#"{"origins": []}"#).unwrap();
        assert!(method.validate(&good).await);

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"session": "x"}"#).unwrap();
        assert!(!method.validate(&bad).await);

        assert!(!method.validate(&dir.path().join("missing.json")).await);
    }
}
