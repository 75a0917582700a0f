//! Pipeline policy and build-step helper tests

use std::time::Duration;

use renderlite::deploy::git::{inject_token, redact_url};
use renderlite::deploy::image::{detect_build_kind, image_tag, BuildKind};
use renderlite::deploy::{plan_strategy, RunStrategy};
use renderlite::docker::health::health_backoff;

#[test]
fn test_blue_green_only_with_live_container_and_health_check() {
    // First deploy of a service never goes blue/green, even with a check.
    assert_eq!(plan_strategy(false, true), RunStrategy::Traditional);
    // A running service without a health check cannot gate a swap.
    assert_eq!(plan_strategy(true, false), RunStrategy::Traditional);
    // Both present: swap behind the health gate.
    assert_eq!(plan_strategy(true, true), RunStrategy::BlueGreen);
}

#[test]
fn test_image_tag_shape() {
    let tag = image_tag("api-x-ab12cd", "deadbeefcafe0123456789");
    assert_eq!(tag, "renderlite-api-x-ab12cd:deadbee");

    let (repo, version) = tag.split_once(':').unwrap();
    assert!(repo.starts_with("renderlite-"));
    assert_eq!(version.len(), 7);
}

#[test]
fn test_build_kind_detection() {
    let dir = tempfile::tempdir().unwrap();

    // Empty checkout (or any fingerprint git can produce) goes to buildpacks.
    assert_eq!(detect_build_kind(dir.path()), BuildKind::Buildpack);

    // A Dockerfile in a subdirectory does not count.
    std::fs::create_dir(dir.path().join("deploy")).unwrap();
    std::fs::write(dir.path().join("deploy/Dockerfile"), "FROM scratch").unwrap();
    assert_eq!(detect_build_kind(dir.path()), BuildKind::Buildpack);

    // Root-level Dockerfile wins.
    std::fs::write(dir.path().join("Dockerfile"), "FROM scratch").unwrap();
    assert_eq!(detect_build_kind(dir.path()), BuildKind::Dockerfile);
}

#[test]
fn test_clone_url_token_handling() {
    let public = "https://github.com/acme/api";
    let authed = inject_token(public, "ghp_secret123").unwrap();

    // The rewritten URL carries the token for the subprocess only.
    assert!(authed.contains("ghp_secret123"));
    // Its public rendering never does.
    let redacted = redact_url(&authed);
    assert_eq!(redacted, public);
    assert!(!redacted.contains("ghp_secret123"));
}

#[test]
fn test_health_backoff_caps_at_ten_seconds() {
    let schedule: Vec<u64> = (0..6).map(|a| health_backoff(a).as_secs()).collect();
    assert_eq!(schedule, vec![1, 2, 4, 8, 10, 10]);
    assert_eq!(health_backoff(100), Duration::from_secs(10));
}
