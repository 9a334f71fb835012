//! Best-effort debug artifacts.
//!
//! When the board renders no items we keep a full-page screenshot and the
//! rendered markup for later inspection. Nothing here can fail the caller:
//! each step runs through [`attempt`], which logs and discards errors.
//! Older captures are pruned so only the newest few per label remain.

use crate::surface::RenderSurface;
use crate::types::SurfaceError;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What was written, if anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticsReport {
    pub screenshot: Option<PathBuf>,
    pub html: Option<PathBuf>,
}

impl DiagnosticsReport {
    pub fn is_empty(&self) -> bool {
        self.screenshot.is_none() && self.html.is_none()
    }
}

/// Run `step`, keep its value on success, log and drop its error otherwise
pub async fn attempt<T, E, F>(what: &str, step: F) -> Option<T>
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    match step.await {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Diagnostic step '{}' failed (ignored): {}", what, e);
            None
        }
    }
}

/// Timestamped artifact paths for one capture
pub fn artifact_paths(dir: &Path, label: &str) -> (PathBuf, PathBuf) {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    (
        dir.join(format!("{}_{}.png", label, stamp)),
        dir.join(format!("{}_{}.html", label, stamp)),
    )
}

const ARTIFACT_EXTENSIONS: [&str; 2] = ["png", "html"];

/// Delete all but the newest `keep` captures for `label` in `dir`.
///
/// A capture is every artifact sharing one `label_<stamp>` stem; stamps sort
/// chronologically. `keep == 0` disables pruning. Returns the number of
/// files removed.
pub fn prune(dir: &Path, label: &str, keep: usize) -> io::Result<usize> {
    if keep == 0 {
        return Ok(0);
    }

    let prefix = format!("{}_", label);
    let mut artifacts = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_artifact = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ARTIFACT_EXTENSIONS.contains(&ext));
        let stem = match path.file_stem().and_then(|stem| stem.to_str()) {
            Some(stem) if is_artifact && stem.starts_with(&prefix) => stem.to_string(),
            _ => continue,
        };
        artifacts.push((stem, path));
    }

    let stems: BTreeSet<&str> = artifacts.iter().map(|(stem, _)| stem.as_str()).collect();
    if stems.len() <= keep {
        return Ok(0);
    }
    let stale: BTreeSet<&str> = stems.iter().take(stems.len() - keep).copied().collect();

    let mut removed = 0;
    for (stem, path) in &artifacts {
        if stale.contains(stem.as_str()) {
            fs::remove_file(path)?;
            removed += 1;
        }
    }
    if removed > 0 {
        debug!("Pruned {} old '{}' debug artifacts from {:?}", removed, label, dir);
    }
    Ok(removed)
}

/// Capture a screenshot and an HTML snapshot into `dir`, then keep only the
/// newest `keep` captures for `label`
pub async fn capture(
    surface: &mut dyn RenderSurface,
    dir: &Path,
    label: &str,
    keep: usize,
) -> DiagnosticsReport {
    let mut report = DiagnosticsReport::default();

    if attempt("create debug dir", tokio::fs::create_dir_all(dir))
        .await
        .is_none()
    {
        return report;
    }

    let (png_path, html_path) = artifact_paths(dir, label);

    report.screenshot = attempt("screenshot", surface.screenshot(&png_path))
        .await
        .map(|_| png_path.clone());

    report.html = attempt("html snapshot", async {
        let html = surface.html_content().await?;
        tokio::fs::write(&html_path, html).await?;
        Ok::<_, SurfaceError>(())
    })
    .await
    .map(|_| html_path.clone());

    if !report.is_empty() {
        info!(
            screenshot = ?report.screenshot,
            html = ?report.html,
            "Saved debug artifacts"
        );
    }

    attempt("prune old artifacts", async { prune(dir, label, keep) }).await;

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch_capture(dir: &Path, stem: &str) {
        fs::write(dir.join(format!("{}.png", stem)), b"png").unwrap();
        fs::write(dir.join(format!("{}.html", stem)), b"<html/>").unwrap();
    }

    #[tokio::test]
    async fn test_attempt_swallows_errors() {
        let ok = attempt("ok", async { Ok::<_, SurfaceError>(5) }).await;
        assert_eq!(ok, Some(5));

        let failed = attempt("fail", async {
            Err::<u32, _>(SurfaceError::Operation("boom".to_string()))
        })
        .await;
        assert_eq!(failed, None);
    }

    #[test]
    fn test_artifact_paths_share_stamp() {
        let (png, html) = artifact_paths(Path::new("debug"), "no_items");
        assert_eq!(png.extension().unwrap(), "png");
        assert_eq!(html.extension().unwrap(), "html");
        assert_eq!(png.file_stem(), html.file_stem());
        assert!(png.starts_with("debug"));
    }

    #[test]
    fn test_prune_keeps_newest_captures() {
        let dir = tempdir().unwrap();
        for stamp in [
            "20260101_090000",
            "20260101_100000",
            "20260102_080000",
            "20260103_120000",
            "20260103_120001",
        ] {
            touch_capture(dir.path(), &format!("no_items_{}", stamp));
        }
        fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();
        fs::write(dir.path().join("other_20250101_000000.png"), b"png").unwrap();

        assert_eq!(prune(dir.path(), "no_items", 2).unwrap(), 6);

        let mut left: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(
            left,
            vec![
                "no_items_20260103_120000.html",
                "no_items_20260103_120000.png",
                "no_items_20260103_120001.html",
                "no_items_20260103_120001.png",
                "notes.txt",
                "other_20250101_000000.png",
            ]
        );
    }

    #[test]
    fn test_prune_zero_keeps_everything() {
        let dir = tempdir().unwrap();
        touch_capture(dir.path(), "no_items_20260101_090000");
        touch_capture(dir.path(), "no_items_20260101_100000");

        assert_eq!(prune(dir.path(), "no_items", 0).unwrap(), 0);
        assert_eq!(prune(dir.path(), "no_items", 5).unwrap(), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 4);
    }
}
