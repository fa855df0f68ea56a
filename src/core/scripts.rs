/// Allow-listed maintenance scripts
///
/// Operators pick a script by name. The path always comes from
/// configuration, never from the caller.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use super::backup::ActionResult;
use super::error::{BackupError, BackupResult};
use super::process::{CancellationToken, ToolCommand, ToolOutput};
use super::tool_locator::ToolPath;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptEntry {
    pub name: String,
    pub path: PathBuf,
    pub available: bool,
}

#[derive(Debug, Clone)]
pub struct ScriptGateway {
    scripts: BTreeMap<String, PathBuf>,
    timeout: Duration,
}

impl ScriptGateway {
    pub fn new(scripts: BTreeMap<String, PathBuf>, timeout: Duration) -> Self {
        Self { scripts, timeout }
    }

    pub fn list(&self) -> Vec<ScriptEntry> {
        self.scripts
            .iter()
            .map(|(name, path)| ScriptEntry {
                name: name.clone(),
                path: path.clone(),
                available: path.is_file(),
            })
            .collect()
    }

    /// Run a script by name; `action` is recorded in the logs
    pub async fn run(
        &self,
        action: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> BackupResult<ToolOutput> {
        let path = self
            .scripts
            .get(name)
            .ok_or_else(|| BackupError::UnknownScript(name.to_string()))?;

        info!(action, script = name, path = %path.display(), "Running maintenance script");
        ToolCommand::new(name, &ToolPath::Found(path.clone()))
            .run(self.timeout, cancel)
            .await
    }

    pub async fn run_action(&self, action: &str, name: &str, cancel: &CancellationToken) -> ActionResult {
        match self.run(action, name, cancel).await {
            Ok(out) => ActionResult::ok(format!("Script '{}' completed", name), Some(out.output)),
            Err(e) => ActionResult::failed(&e),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn gateway(dir: &TempDir) -> ScriptGateway {
        let script = dir.path().join("reindex.sh");
        std::fs::write(&script, "#!/bin/sh\necho \"reindexed ${1:-all}\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut scripts = BTreeMap::new();
        scripts.insert("reindex".to_string(), script);
        scripts.insert("missing".to_string(), dir.path().join("missing.sh"));
        ScriptGateway::new(scripts, Duration::from_secs(10))
    }

    #[test]
    fn test_list() {
        let dir = TempDir::new().unwrap();
        let entries = gateway(&dir).list();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "missing");
        assert!(!entries[0].available);
        assert_eq!(entries[1].name, "reindex");
        assert!(entries[1].available);
    }

    #[tokio::test]
    async fn test_runs_allow_listed_script() {
        let dir = TempDir::new().unwrap();
        let result = gateway(&dir)
            .run_action("manual", "reindex", &CancellationToken::new())
            .await;

        assert!(result.success);
        assert_eq!(result.output.as_deref(), Some("reindexed all"));
    }

    #[tokio::test]
    async fn test_rejects_unknown_names_and_paths() {
        let dir = TempDir::new().unwrap();
        let gateway = gateway(&dir);

        for name in ["drop-everything", "/bin/sh", "../reindex.sh"] {
            let err = gateway
                .run("manual", name, &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, BackupError::UnknownScript(_)), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_missing_script_file() {
        let dir = TempDir::new().unwrap();
        let result = gateway(&dir)
            .run_action("manual", "missing", &CancellationToken::new())
            .await;
        assert!(!result.success);
    }
}
