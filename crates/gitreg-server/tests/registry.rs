//! End-to-end tests against a real local git remote
//!
//! Builds a throwaway repository with tagged package manifests, mounts
//! it in a registry service and drives the router in-process.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use sha1::{Digest, Sha1};
use tempfile::TempDir;
use tower::ServiceExt;

use gitreg_core::config::RemoteConfig;
use gitreg_server::http::build_router;
use gitreg_server::service::RegistryService;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_DATE", "2024-01-01T00:00:00Z")
        .env("GIT_COMMITTER_DATE", "2024-01-01T00:00:00Z")
        .output()
        .expect("failed to run git");
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
}

fn git_stdout(dir: &Path, args: &[&str]) -> Vec<u8> {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(out.status.success(), "git {:?} failed", args);
    out.stdout
}

/// Two tagged revisions: v1.0.0 ships pkg-a@1.0.0, v2.0.0 ships
/// pkg-a@2.0.0 and pkg-b@1.0.0
fn fixture_repo() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path();
    git(path, &["init", "-q"]);
    git(path, &["config", "user.email", "test@example.com"]);
    git(path, &["config", "user.name", "Test"]);

    std::fs::create_dir_all(path.join("pkg-a")).unwrap();
    std::fs::write(
        path.join("pkg-a/package.json"),
        r#"{"name":"pkg-a","version":"1.0.0","description":"alpha package"}"#,
    )
    .unwrap();
    git(path, &["add", "-A"]);
    git(path, &["commit", "-q", "-m", "pkg-a 1.0.0"]);
    git(path, &["tag", "v1.0.0"]);

    std::fs::write(
        path.join("pkg-a/package.json"),
        r#"{"name":"pkg-a","version":"2.0.0","description":"alpha package","keywords":["alpha"]}"#,
    )
    .unwrap();
    std::fs::create_dir_all(path.join("pkg-b")).unwrap();
    std::fs::write(
        path.join("pkg-b/package.json"),
        r#"{"name":"pkg-b","version":"1.0.0","description":"beta package"}"#,
    )
    .unwrap();
    git(path, &["add", "-A"]);
    git(path, &["commit", "-q", "-m", "pkg-a 2.0.0, pkg-b 1.0.0"]);
    git(path, &["tag", "v2.0.0"]);

    dir
}

fn registry_for(repo: &TempDir) -> Router {
    let remote = RemoteConfig::new("r", repo.path().to_string_lossy());
    let service = Arc::new(RegistryService::from_configs([remote]));
    build_router(service).expect("router")
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> serde_json::Value {
    let (status, body) = get(app, uri).await;
    assert_eq!(status, StatusCode::OK, "GET {}", uri);
    serde_json::from_slice(&body).expect("json body")
}

#[tokio::test(flavor = "multi_thread")]
async fn registry_end_to_end() {
    if !git_available() {
        eprintln!("skipping: git not available");
        return;
    }
    let repo = fixture_repo();
    let app = registry_for(&repo);

    // liveness: known mount is 200 empty, unknown is 404
    let (status, body) = get(&app, "/r").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    let (status, _) = get(&app, "/other").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // packument
    let doc = get_json(&app, "/r/pkg-a").await;
    assert_eq!(doc["name"], "pkg-a");
    assert_eq!(doc["dist-tags"]["latest"], "2.0.0");
    assert!(doc["versions"]["1.0.0"].is_object());
    assert!(doc["versions"]["2.0.0"].is_object());
    assert_eq!(doc["versions"]["1.0.0"]["gitHead"], "refs/tags/v1.0.0");
    assert_eq!(doc["versions"]["1.0.0"]["repoPackagePath"], "pkg-a");
    assert_eq!(
        doc["versions"]["1.0.0"]["dist"]["tarball"],
        "/r/pkg-a/1.0.0/download.tgz"
    );
    assert_eq!(doc["repository"]["type"], "git");

    // version document wraps the manifest verbatim
    let doc = get_json(&app, "/r/pkg-a/1.0.0").await;
    assert_eq!(doc["description"], "alpha package");
    assert_eq!(doc["_id"], "pkg-a@1.0.0");
    assert_eq!(doc["repository"]["revision"], "refs/tags/v1.0.0");

    // absent version
    let (status, _) = get(&app, "/r/pkg-a/9.9.9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // abbreviated catalog
    let doc = get_json(&app, "/r/-/all").await;
    assert_eq!(doc["_updated"], 99999);
    assert_eq!(doc["pkg-a"]["versions"], serde_json::json!({"2.0.0": "latest"}));
    assert_eq!(doc["pkg-b"]["versions"], serde_json::json!({"1.0.0": "latest"}));

    // search
    let doc = get_json(&app, "/r/-/v1/search").await;
    assert_eq!(doc["objects"].as_array().unwrap().len(), 3);
    let doc = get_json(&app, "/r/-/v1/search?text=beta").await;
    let objects = doc["objects"].as_array().unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0]["package"]["name"], "pkg-b");
    let doc = get_json(&app, "/r/-/v1/search?size=1").await;
    assert_eq!(doc["objects"].as_array().unwrap().len(), 1);
    let (status, _) = get(&app, "/r/-/v1/search?size=lots").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // download streams the exact archive git produces
    let expected = git_stdout(
        repo.path(),
        &[
            "archive",
            "--format=tgz",
            "--prefix=package/",
            "refs/tags/v1.0.0:pkg-a",
        ],
    );
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/r/pkg-a/1.0.0/download.tgz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/tgz"
    );
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(body.as_ref(), expected.as_slice());

    // the archive carries the fixed package/ prefix
    let decoder = flate2::read::GzDecoder::new(body.as_ref());
    let mut archive = tar::Archive::new(decoder);
    let mut saw_manifest = false;
    for entry in archive.entries().unwrap() {
        let entry = entry.unwrap();
        let path = entry.path().unwrap().to_string_lossy().into_owned();
        assert!(path.starts_with("package/"), "unexpected entry {}", path);
        saw_manifest |= path == "package/package.json";
    }
    assert!(saw_manifest);

    // the packument's shasum matches the archive bytes
    let doc = get_json(&app, "/r/pkg-a").await;
    let shasum = doc["versions"]["1.0.0"]["dist"]["shasum"].as_str().unwrap();
    let mut hasher = Sha1::new();
    hasher.update(&expected);
    assert_eq!(shasum, hex::encode(hasher.finalize()));
}

#[tokio::test(flavor = "multi_thread")]
async fn ref_filter_override_from_repository() {
    if !git_available() {
        eprintln!("skipping: git not available");
        return;
    }
    let repo = fixture_repo();
    // restrict the registry to v1.x tags via .upm-git.json at HEAD
    std::fs::write(
        repo.path().join(".upm-git.json"),
        r#"{"refFilter":"^refs/tags/v1\\."}"#,
    )
    .unwrap();
    git(repo.path(), &["add", "-A"]);
    git(repo.path(), &["commit", "-q", "-m", "add registry config"]);

    let app = registry_for(&repo);
    let doc = get_json(&app, "/r/pkg-a").await;
    assert_eq!(doc["dist-tags"]["latest"], "1.0.0");
    assert!(doc["versions"]["2.0.0"].is_null());

    // pkg-b only exists at v2.0.0, which the filter excludes
    let (status, _) = get(&app, "/r/pkg-b").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_repository_config_fails_hard() {
    if !git_available() {
        eprintln!("skipping: git not available");
        return;
    }
    let repo = fixture_repo();
    std::fs::write(repo.path().join(".upm-git.json"), r#"{"wrongKey":true}"#).unwrap();
    git(repo.path(), &["add", "-A"]);
    git(repo.path(), &["commit", "-q", "-m", "broken registry config"]);

    let app = registry_for(&repo);
    // malformed presence is an operator error, not a silent fallback
    let (status, _) = get(&app, "/r/pkg-a").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_remote_is_internal_error() {
    if !git_available() {
        eprintln!("skipping: git not available");
        return;
    }
    let remote = RemoteConfig::new("r", "/nonexistent/repo.git");
    let service = Arc::new(RegistryService::from_configs([remote]));
    let app = build_router(service).unwrap();

    // never an empty catalog: the failure surfaces
    let (status, _) = get(&app, "/r/-/all").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    // liveness does not touch the remote
    let (status, _) = get(&app, "/r").await;
    assert_eq!(status, StatusCode::OK);
}
