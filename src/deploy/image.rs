//! Image builds
//!
//! A repository with a root-level Dockerfile is built through the runtime's
//! native builder; anything else goes through the buildpack tool. Build
//! output is line-streamed into the deployment log as it happens.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::info;

use crate::deploy::DeployLogger;
use crate::errors::CoreError;

/// Builder image used for repositories without a Dockerfile.
const BUILDPACK_BUILDER: &str = "paketobuildpacks/builder-jammy-base";

/// How the image for a checkout gets built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildKind {
    Dockerfile,
    Buildpack,
}

/// A Dockerfile at the repository root wins; everything else is handed to
/// the buildpack tool, which does its own runtime fingerprinting.
pub fn detect_build_kind(work_dir: &Path) -> BuildKind {
    if work_dir.join("Dockerfile").is_file() {
        BuildKind::Dockerfile
    } else {
        BuildKind::Buildpack
    }
}

/// Image tag for a build: `renderlite-<subdomain>:<short-commit>`.
pub fn image_tag(subdomain: &str, commit_sha: &str) -> String {
    let short = &commit_sha[..commit_sha.len().min(7)];
    format!("renderlite-{subdomain}:{short}")
}

/// Build the image for a checked-out work tree, streaming progress into the
/// deployment log. Bounded by the build budget.
pub async fn build_image(
    work_dir: &Path,
    tag: &str,
    timeout: Duration,
    logger: &DeployLogger,
) -> Result<(), CoreError> {
    let kind = detect_build_kind(work_dir);

    let mut cmd = match kind {
        BuildKind::Dockerfile => {
            logger.log("Dockerfile detected, building with docker").await;
            let mut cmd = Command::new("docker");
            cmd.args(["build", "-t", tag, "."]).current_dir(work_dir);
            cmd
        }
        BuildKind::Buildpack => {
            logger
                .log("no Dockerfile found, building with buildpacks")
                .await;
            let mut cmd = Command::new("pack");
            cmd.args(["build", tag, "--path", ".", "--builder", BUILDPACK_BUILDER])
                .current_dir(work_dir);
            cmd
        }
    };

    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CoreError::Deploy(format!("failed to start image build: {e}")))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let drive = async {
        if let (Some(out), Some(err)) = (stdout, stderr) {
            tokio::join!(forward_lines(out, logger), forward_lines(err, logger));
        }
        child.wait().await
    };

    let outcome = tokio::time::timeout(timeout, drive).await;
    let status = match outcome {
        Ok(result) => result.map_err(|e| CoreError::Deploy(format!("image build failed: {e}")))?,
        Err(_) => {
            child.kill().await.ok();
            return Err(CoreError::Timeout {
                operation: format!("build of {tag}"),
                seconds: timeout.as_secs(),
            });
        }
    };

    if !status.success() {
        return Err(CoreError::Deploy(format!(
            "image build exited with {}",
            status.code().map_or("signal".to_string(), |c| c.to_string())
        )));
    }

    info!(tag, ?kind, "Image built");
    Ok(())
}

/// Forward every non-empty output line into the deployment log.
async fn forward_lines<R: AsyncRead + Unpin>(reader: R, logger: &DeployLogger) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end();
        if !line.trim().is_empty() {
            logger.log(line).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_tag_uses_short_sha() {
        assert_eq!(
            image_tag("api-x-ab12cd", "a1b2c3d4e5f67890"),
            "renderlite-api-x-ab12cd:a1b2c3d"
        );
    }

    #[test]
    fn test_image_tag_tolerates_short_input() {
        assert_eq!(image_tag("web", "abc"), "renderlite-web:abc");
    }

    #[test]
    fn test_detect_dockerfile() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_build_kind(dir.path()), BuildKind::Buildpack);
        std::fs::write(dir.path().join("Dockerfile"), "FROM scratch").unwrap();
        assert_eq!(detect_build_kind(dir.path()), BuildKind::Dockerfile);
    }
}
