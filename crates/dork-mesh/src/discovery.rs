//! Filesystem discovery: breadth-first walk producing candidate agent
//! projects, recognised by marker files/directories.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::registry::Runtime;

/// Directories whose presence marks a project as agent-bearing.
const AGENT_MARKER_DIRS: &[&str] = &[".claude", ".tron", ".agent", ".codex", ".cursor"];

/// Standalone files whose presence marks a project as agent-bearing.
const AGENT_MARKER_FILES: &[&str] = &["AGENTS.md", "CLAUDE.md"];

/// Directories never descended into.
const SKIP_DIRS: &[&str] = &["node_modules", ".git", "dist", "target", "coverage", "__pycache__"];

/// Default breadth-first depth limit for [`discover`].
pub const DEFAULT_MAX_DEPTH: u32 = 3;

/// A directory recognised as a plausible agent project during discovery.
#[derive(Clone, Debug, Serialize)]
pub struct Candidate {
    /// Absolute path to the project root.
    pub project_path: String,
    /// Directory name, offered as a starting point for the manifest name.
    pub suggested_name: String,
    /// Best-guess runtime inferred from which marker matched.
    pub detected_runtime: Runtime,
    /// Marker paths that triggered recognition, relative to `project_path`.
    pub hints: Vec<String>,
}

pub(crate) fn detect_runtime(hints: &[String]) -> Runtime {
    if hints.iter().any(|h| h.contains(".claude") || h == "CLAUDE.md") {
        Runtime::ClaudeCode
    } else if hints.iter().any(|h| h.contains(".cursor")) {
        Runtime::Cursor
    } else if hints.iter().any(|h| h.contains(".codex")) {
        Runtime::Codex
    } else {
        Runtime::Other
    }
}

pub(crate) fn markers_in(dir: &Path) -> Vec<String> {
    let mut hints = Vec::new();
    for marker in AGENT_MARKER_DIRS {
        if dir.join(marker).is_dir() {
            hints.push((*marker).to_owned());
        }
    }
    for marker in AGENT_MARKER_FILES {
        if dir.join(marker).is_file() {
            hints.push((*marker).to_owned());
        }
    }
    hints
}

/// Breadth-first walk of `roots` up to `max_depth`, skipping `denied` paths
/// and emitting a [`Candidate`] for every directory bearing an agent
/// marker. Yields control between directories so a cancelled `token`
/// aborts promptly rather than running the walk to completion.
pub fn discover(
    roots: Vec<PathBuf>,
    max_depth: u32,
    denied: std::collections::HashSet<String>,
    token: CancellationToken,
) -> impl futures::Stream<Item = Candidate> {
    async_stream::stream! {
        let mut queue: VecDeque<(PathBuf, u32)> = roots.into_iter().map(|r| (r, 0)).collect();

        while let Some((dir, depth)) = queue.pop_front() {
            if token.is_cancelled() {
                return;
            }
            tokio::task::yield_now().await;

            let dir_str = dir.to_string_lossy().into_owned();
            if denied.contains(&dir_str) {
                continue;
            }

            let Ok(canonical) = tokio::fs::canonicalize(&dir).await else { continue };
            let hints = markers_in(&canonical);
            if !hints.is_empty() {
                let suggested_name = canonical
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| dir_str.clone());
                yield Candidate {
                    project_path: canonical.to_string_lossy().into_owned(),
                    suggested_name,
                    detected_runtime: detect_runtime(&hints),
                    hints,
                };
            }

            if depth >= max_depth {
                continue;
            }

            let Ok(mut entries) = tokio::fs::read_dir(&dir).await else { continue };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let Ok(file_type) = entry.file_type().await else { continue };
                if !file_type.is_dir() {
                    continue;
                }
                let name = entry.file_name();
                let name_str = name.to_string_lossy();
                if name_str.starts_with('.') || SKIP_DIRS.contains(&name_str.as_ref()) {
                    continue;
                }
                queue.push_back((entry.path(), depth + 1));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::collections::HashSet;

    async fn collect(roots: Vec<PathBuf>, max_depth: u32, denied: HashSet<String>) -> Vec<Candidate> {
        let stream = discover(roots, max_depth, denied, CancellationToken::new());
        tokio::pin!(stream);
        let mut out = Vec::new();
        while let Some(c) = stream.next().await {
            out.push(c);
        }
        out
    }

    #[tokio::test]
    async fn finds_project_with_claude_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("backend/.claude")).unwrap();
        let found = collect(vec![dir.path().to_path_buf()], DEFAULT_MAX_DEPTH, HashSet::new()).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].detected_runtime, Runtime::ClaudeCode);
    }

    #[tokio::test]
    async fn finds_project_with_agents_md() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("svc")).unwrap();
        std::fs::write(dir.path().join("svc/AGENTS.md"), "# agents").unwrap();
        let found = collect(vec![dir.path().to_path_buf()], DEFAULT_MAX_DEPTH, HashSet::new()).await;
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn denied_path_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("backend");
        std::fs::create_dir_all(project.join(".claude")).unwrap();
        let canonical = tokio::fs::canonicalize(&project).await.unwrap().to_string_lossy().into_owned();

        let mut denied = HashSet::new();
        denied.insert(canonical);
        let found = collect(vec![dir.path().to_path_buf()], DEFAULT_MAX_DEPTH, denied).await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn respects_max_depth() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        std::fs::write(dir.path().join("a/b/c/AGENTS.md"), "# agents").unwrap();
        let found = collect(vec![dir.path().to_path_buf()], 1, HashSet::new()).await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_the_walk() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            std::fs::create_dir_all(dir.path().join(format!("proj{i}/.claude"))).unwrap();
        }
        let token = CancellationToken::new();
        token.cancel();
        let stream = discover(vec![dir.path().to_path_buf()], DEFAULT_MAX_DEPTH, HashSet::new(), token);
        tokio::pin!(stream);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn hidden_directories_are_not_descended() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".hidden/nested")).unwrap();
        std::fs::write(dir.path().join(".hidden/nested/AGENTS.md"), "# agents").unwrap();
        let found = collect(vec![dir.path().to_path_buf()], DEFAULT_MAX_DEPTH, HashSet::new()).await;
        assert!(found.is_empty());
    }
}
