//! End-to-end URL and hub downloads against a local HTTP server.

mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use benchpack::acquire::{AcquireError, HttpClient};
use benchpack::paths::PartialStore;
use benchpack::{DownloadOptions, Engine, EngineConfig, EngineError, HfToken, StatusReason};
use common::{payload, sha256_hex, snapshot, write_manifest, FakeSystem, FileServer, Route};
use tempfile::TempDir;

const MODEL_PATH: &str = "models/checkpoints/base.safetensors";

fn config(root: &std::path::Path) -> EngineConfig {
    EngineConfig::new(root).with_http_timeout(Duration::from_secs(10))
}

fn engine(manifest: &std::path::Path, config: EngineConfig) -> Engine {
    Engine::load(manifest, config).unwrap().with_system(FakeSystem::new())
}

fn url_model(server: &FileServer, sha: &str) -> serde_json::Value {
    serde_json::json!([{
        "name": "base-model",
        "type": "model",
        "source": "url",
        "url": server.url("files/base.safetensors"),
        "path": MODEL_PATH,
        "sha256": sha,
        "required": true,
        "size_mb": 0.1
    }])
}

#[test]
fn test_download_then_idempotent_rerun() {
    let server = FileServer::start();
    let body = payload(96 * 1024);
    server.route("files/base.safetensors", Route::file(body.clone()));

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("comfy");
    let manifest = write_manifest(temp.path(), url_model(&server, &sha256_hex(&body)));

    let first = engine(&manifest, config(&root));
    assert_eq!(first.check_existing_files(false)["base-model"].reason, StatusReason::Missing);
    first.download_items(&DownloadOptions::default()).unwrap();

    assert_eq!(fs::read(root.join(MODEL_PATH)).unwrap(), body);
    assert_eq!(first.downloaded_items().len(), 1);
    assert!(!PartialStore::new(&root).partial_path_for(MODEL_PATH).exists());
    assert_eq!(server.gets("files/base.safetensors"), 1);

    let second = engine(&manifest, config(&root));
    assert_eq!(
        second.check_existing_files(false)["base-model"].reason,
        StatusReason::ExistsAndValid
    );
    let report = second.download_items(&DownloadOptions::default()).unwrap();
    assert!(report.planned.is_empty());
    assert_eq!(server.gets("files/base.safetensors"), 1);
}

#[test]
fn test_corrupted_file_is_downloaded_again() {
    let server = FileServer::start();
    let body = payload(32 * 1024);
    server.route("files/base.safetensors", Route::file(body.clone()));

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("comfy");
    let manifest = write_manifest(temp.path(), url_model(&server, &sha256_hex(&body)));

    engine(&manifest, config(&root))
        .download_items(&DownloadOptions::default())
        .unwrap();

    let mut corrupted = body.clone();
    corrupted[100] ^= 0xff;
    fs::write(root.join(MODEL_PATH), &corrupted).unwrap();

    let rerun = engine(&manifest, config(&root));
    assert_eq!(
        rerun.check_existing_files(false)["base-model"].reason,
        StatusReason::ChecksumMismatch
    );
    rerun.download_items(&DownloadOptions::default()).unwrap();

    assert_eq!(server.gets("files/base.safetensors"), 2);
    assert_eq!(
        rerun.check_existing_files(true)["base-model"].reason,
        StatusReason::ExistsAndValid
    );
}

#[test]
fn test_partial_download_is_resumed() {
    let server = FileServer::start();
    let body = payload(64 * 1024);
    server.route("files/base.safetensors", Route::file(body.clone()));

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("comfy");
    let manifest = write_manifest(temp.path(), url_model(&server, &sha256_hex(&body)));

    let partials = PartialStore::new(&root);
    partials.ensure_dir().unwrap();
    fs::write(partials.partial_path_for(MODEL_PATH), &body[..20_000]).unwrap();

    let e = engine(&manifest, config(&root));
    let status = &e.check_existing_files(false)["base-model"];
    assert!(status.partial_exists);
    assert_eq!(status.partial_size, 20_000);

    e.download_items(&DownloadOptions::default()).unwrap();

    assert_eq!(server.ranges(), vec!["bytes=20000-".to_string()]);
    assert_eq!(fs::read(root.join(MODEL_PATH)).unwrap(), body);
    assert!(!partials.partial_path_for(MODEL_PATH).exists());
}

#[test]
fn test_wrong_checksum_fails_required_item_and_keeps_destination_clean() {
    let server = FileServer::start();
    server.route("files/base.safetensors", Route::file(payload(1024)));

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("comfy");
    let manifest = write_manifest(temp.path(), url_model(&server, &sha256_hex(b"something else")));

    let err = engine(&manifest, config(&root))
        .download_items(&DownloadOptions::default())
        .unwrap_err();

    assert!(matches!(err, EngineError::RequiredItemFailed { ref item, .. } if item == "base-model"));
    assert!(!root.join(MODEL_PATH).exists());
}

#[test]
fn test_dry_run_leaves_tree_untouched() {
    let server = FileServer::start();
    server.route("files/base.safetensors", Route::file(payload(1024)));

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("comfy");
    fs::create_dir_all(root.join("models")).unwrap();
    fs::write(root.join("models/readme.txt"), b"keep me").unwrap();
    let manifest = write_manifest(temp.path(), url_model(&server, &sha256_hex(b"x")));

    let before = snapshot(temp.path());
    let report = engine(&manifest, config(&root))
        .download_items(&DownloadOptions {
            dry_run: true,
            ..Default::default()
        })
        .unwrap();

    assert_eq!(report.planned, vec!["base-model"]);
    assert_eq!(snapshot(temp.path()), before);
    assert_eq!(server.total_gets(), 0);
}

#[test]
fn test_required_failure_stops_unstarted_parallel_items() {
    let server = FileServer::start();
    server.route("files/broken.bin", Route::status(500));
    server.route(
        "files/slow.bin",
        Route::file(payload(1024)).delayed(Duration::from_millis(400)),
    );
    server.route("files/late.bin", Route::file(payload(1024)));

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("comfy");
    let item = |name: &str, file: &str, required: bool| {
        serde_json::json!({
            "name": name, "type": "file", "source": "url", "required": required,
            "url": server.url(&format!("files/{}", file)), "path": format!("input/{}", file)
        })
    };
    let manifest = write_manifest(
        temp.path(),
        serde_json::json!([
            item("broken", "broken.bin", true),
            item("slow", "slow.bin", false),
            item("late", "late.bin", false)
        ]),
    );

    let e = engine(&manifest, config(&root).with_max_workers(2));
    let err = e.download_items(&DownloadOptions::default()).unwrap_err();

    assert!(matches!(err, EngineError::RequiredItemFailed { ref item, .. } if item == "broken"));
    assert_eq!(server.gets("files/late.bin"), 0);
    assert!(!root.join("input/late.bin").exists());
    assert!(root.join("input/slow.bin").exists());
}

#[test]
fn test_gated_hub_file_needs_token() {
    let server = FileServer::start();
    let body = payload(8 * 1024);
    let digest = sha256_hex(&body);
    server.route(
        "black-forest-labs/FLUX.1-dev/resolve/main/ae.safetensors",
        Route::file(body.clone())
            .gated("hf_0123456789abcdefghijklmnopqrstuv")
            .with_etag(&digest),
    );

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("comfy");
    let manifest = write_manifest(
        temp.path(),
        serde_json::json!([{
            "name": "flux-vae", "type": "model", "source": "huggingface", "gated": true,
            "repo": "black-forest-labs/FLUX.1-dev", "file": "ae.safetensors",
            "path": "models/vae/ae.safetensors"
        }]),
    );

    let mut e = engine(&manifest, config(&root).with_hub_endpoint(server.base()));
    assert_eq!(e.download_summary().gated_items, vec!["flux-vae".to_string()]);

    let err = e.download_items(&DownloadOptions::default()).unwrap_err();
    assert!(err.is_authentication());
    assert!(!root.join("models/vae/ae.safetensors").exists());
    assert_eq!(hub_leftovers(&root.join("models/vae")), 0);

    e.set_hf_token(HfToken::parse("hf_0123456789abcdefghijklmnopqrstuv").unwrap());
    e.download_items(&DownloadOptions::default()).unwrap();

    assert_eq!(fs::read(root.join("models/vae/ae.safetensors")).unwrap(), body);
    let leftovers: Vec<_> = fs::read_dir(root.join("models/vae"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp_hub_"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_hub_subfolder_from_remote_path() {
    let server = FileServer::start();
    let body = payload(2048);
    server.route(
        "Comfy-Org/flux1/resolve/v2/split_files/vae/ae.safetensors",
        Route::file(body.clone()),
    );

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("comfy");
    let manifest = write_manifest(
        temp.path(),
        serde_json::json!([{
            "name": "vae", "type": "model", "source": "huggingface",
            "repo": "Comfy-Org/flux1", "file": "ae.safetensors",
            "remote_path": "https://huggingface.co/Comfy-Org/flux1/tree/v2/split_files/vae",
            "path": "models/vae/ae.safetensors", "sha256": sha256_hex(&body)
        }]),
    );

    let e = Engine::load(&manifest, config(&root).with_hub_endpoint(server.base()))
        .unwrap()
        .with_system(Arc::new(benchpack::system::HostSystem));
    e.download_items(&DownloadOptions::default()).unwrap();

    assert_eq!(fs::read(root.join("models/vae/ae.safetensors")).unwrap(), body);
}

fn url_item(server: &FileServer, sha: Option<&str>) -> serde_json::Value {
    let mut item = serde_json::json!({
        "name": "base-model", "type": "model", "source": "url", "required": true,
        "url": server.url("files/base.safetensors"), "path": MODEL_PATH
    });
    if let Some(sha) = sha {
        item["sha256"] = serde_json::json!(sha);
    }
    serde_json::json!([item])
}

fn seed_partial(root: &std::path::Path, data: &[u8]) {
    let partials = PartialStore::new(root);
    partials.ensure_dir().unwrap();
    fs::write(partials.partial_path_for(MODEL_PATH), data).unwrap();
}

fn hub_leftovers(dir: &std::path::Path) -> usize {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp_hub_"))
                .count()
        })
        .unwrap_or(0)
}

#[test]
fn test_complete_partial_without_length_restarts_after_416() {
    let server = FileServer::start();
    let body = payload(48 * 1024);
    server.route(
        "files/base.safetensors",
        Route::file(body.clone()).without_length(),
    );

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("comfy");
    let manifest = write_manifest(temp.path(), url_item(&server, Some(&sha256_hex(&body))));
    seed_partial(&root, &body);

    engine(&manifest, config(&root))
        .download_items(&DownloadOptions::default())
        .unwrap();

    assert_eq!(server.ranges(), vec![format!("bytes={}-", body.len())]);
    assert_eq!(server.gets("files/base.safetensors"), 2);
    assert_eq!(fs::read(root.join(MODEL_PATH)).unwrap(), body);
}

#[test]
fn test_full_length_partial_without_checksum_is_downloaded_again() {
    let server = FileServer::start();
    let body = payload(4096);
    server.route("files/base.safetensors", Route::file(body.clone()));

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("comfy");
    let manifest = write_manifest(temp.path(), url_item(&server, None));
    seed_partial(&root, &vec![0xaa; body.len()]);

    engine(&manifest, config(&root))
        .download_items(&DownloadOptions::default())
        .unwrap();

    assert!(server.ranges().is_empty());
    assert_eq!(server.gets("files/base.safetensors"), 1);
    assert_eq!(fs::read(root.join(MODEL_PATH)).unwrap(), body);
}

#[test]
fn test_verified_full_length_partial_is_placed_without_transfer() {
    let server = FileServer::start();
    let body = payload(4096);
    server.route("files/base.safetensors", Route::file(body.clone()));

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("comfy");
    let manifest = write_manifest(temp.path(), url_item(&server, Some(&sha256_hex(&body))));
    seed_partial(&root, &body);

    engine(&manifest, config(&root))
        .download_items(&DownloadOptions::default())
        .unwrap();

    assert_eq!(server.total_gets(), 0);
    assert_eq!(fs::read(root.join(MODEL_PATH)).unwrap(), body);
    assert!(!PartialStore::new(&root).partial_path_for(MODEL_PATH).exists());
}

#[test]
fn test_linked_digest_is_read_from_hub_redirect() {
    let server = FileServer::start();
    server.route(
        "org/m/resolve/main/w.bin",
        Route::redirect(&server.url("cdn/blob")).with_etag("abc123"),
    );
    server.route("cdn/blob", Route::file(payload(4096)));

    let info = HttpClient::new(Duration::from_secs(10))
        .unwrap()
        .probe(&server.url("org/m/resolve/main/w.bin"), None)
        .unwrap();

    assert_eq!(info.linked_etag.as_deref(), Some("abc123"));
    assert_eq!(info.content_length, Some(4096));
    assert!(info.accepts_ranges);
}

fn redirected_hub_model(server: &FileServer, remote_digest: &str, body: &[u8]) -> serde_json::Value {
    server.route(
        "Comfy-Org/flux1/resolve/main/ae.safetensors",
        Route::redirect(&server.url("cdn/ae")).with_etag(remote_digest),
    );
    server.route("cdn/ae", Route::file(body.to_vec()));
    serde_json::json!({
        "name": "vae", "type": "model", "source": "huggingface", "required": true,
        "repo": "Comfy-Org/flux1", "file": "ae.safetensors",
        "path": "models/vae/ae.safetensors"
    })
}

#[test]
fn test_hub_remote_digest_verifies_when_manifest_has_none() {
    let server = FileServer::start();
    let body = payload(4096);
    let item = redirected_hub_model(&server, &sha256_hex(b"another revision"), &body);

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("comfy");
    let manifest = write_manifest(temp.path(), serde_json::json!([item]));

    let err = engine(&manifest, config(&root).with_hub_endpoint(server.base()))
        .download_items(&DownloadOptions::default())
        .unwrap_err();

    match err {
        EngineError::RequiredItemFailed { item, source } => {
            assert_eq!(item, "vae");
            assert!(matches!(source, AcquireError::ChecksumMismatch { .. }));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_hub_manifest_digest_wins_over_remote() {
    let server = FileServer::start();
    let body = payload(4096);
    let mut item = redirected_hub_model(&server, &sha256_hex(b"another revision"), &body);
    item["sha256"] = serde_json::json!(sha256_hex(&body));

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("comfy");
    let manifest = write_manifest(temp.path(), serde_json::json!([item]));

    engine(&manifest, config(&root).with_hub_endpoint(server.base()))
        .download_items(&DownloadOptions::default())
        .unwrap();

    assert_eq!(fs::read(root.join("models/vae/ae.safetensors")).unwrap(), body);
}

#[test]
fn test_failed_hub_transfer_leaves_no_scratch_directory() {
    let server = FileServer::start();
    server.route("Comfy-Org/flux1/resolve/main/ae.safetensors", Route::status(500));

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("comfy");
    let manifest = write_manifest(
        temp.path(),
        serde_json::json!([{
            "name": "vae", "type": "model", "source": "huggingface", "required": true,
            "repo": "Comfy-Org/flux1", "file": "ae.safetensors",
            "path": "models/vae/ae.safetensors"
        }]),
    );

    let err = engine(&manifest, config(&root).with_hub_endpoint(server.base()))
        .download_items(&DownloadOptions::default())
        .unwrap_err();

    assert!(matches!(err, EngineError::RequiredItemFailed { .. }));
    assert!(root.join("models/vae").is_dir());
    assert_eq!(hub_leftovers(&root.join("models/vae")), 0);
    assert!(!root.join("models/vae/ae.safetensors").exists());
}
