// ABOUTME: Auto-route resolver tests: label extraction, route upserts, env files.
// ABOUTME: Manifests and config blobs are served from in-memory fakes.

mod support;

use bytes::Bytes;
use gordon::manager::AutoRouteResolver;
use support::fake::{FakeBlobStore, FakeEnvFileExtractor, FakeRouteStore};
use support::{fast_settings, harness};
use tokio_util::sync::CancellationToken;

const CONFIG_DIGEST: &str = "sha256:cfgblob";

fn manifest() -> Bytes {
    Bytes::from(format!(
        r#"{{"schemaVersion":2,"config":{{"digest":"{CONFIG_DIGEST}","mediaType":"application/vnd.oci.image.config.v1+json"}}}}"#
    ))
}

fn config_blob(labels_json: &str) -> Bytes {
    Bytes::from(format!(r#"{{"architecture":"amd64","config":{{"Labels":{labels_json}}}}}"#))
}

/// S6: labels declaring three domains create three routes, each deployed.
#[tokio::test(start_paused = true)]
async fn labels_create_routes_and_deploy() {
    let h = harness(fast_settings());
    let store = FakeRouteStore::new(h.log.clone(), true);
    let blobs = FakeBlobStore::new();
    blobs.insert(
        CONFIG_DIGEST,
        config_blob(
            r#"{"gordon.domain":"app.example.com","gordon.domains":"api.example.com, www.example.com"}"#,
        ),
    );

    let resolver = AutoRouteResolver::new(h.manager.clone(), store.clone(), blobs, None);
    let touched = resolver
        .process_push("myapp", "latest", &manifest(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(touched.len(), 3);
    assert_eq!(h.log.count("add_route app.example.com myapp:latest"), 1);
    assert_eq!(h.log.count("add_route api.example.com myapp:latest"), 1);
    assert_eq!(h.log.count("add_route www.example.com myapp:latest"), 1);

    assert_eq!(h.log.count("create gordon-app.example.com"), 1);
    assert_eq!(h.log.count("create gordon-api.example.com"), 1);
    assert_eq!(h.log.count("create gordon-www.example.com"), 1);
}

/// An existing route with a different image is updated, not re-added.
#[tokio::test(start_paused = true)]
async fn existing_route_is_updated() {
    let h = harness(fast_settings());
    let store = FakeRouteStore::new(h.log.clone(), true);
    store.insert("app.example.com", "myapp:v1");
    let blobs = FakeBlobStore::new();
    blobs.insert(
        CONFIG_DIGEST,
        config_blob(r#"{"gordon.domain":"app.example.com"}"#),
    );

    let resolver = AutoRouteResolver::new(h.manager.clone(), store.clone(), blobs, None);
    resolver
        .process_push("myapp", "v2", &manifest(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(h.log.count("add_route"), 0);
    assert_eq!(h.log.count("update_route app.example.com myapp:v2"), 1);
    assert_eq!(store.image_of("app.example.com").as_deref(), Some("myapp:v2"));
}

/// A route already pointing at the pushed image is a no-op.
#[tokio::test(start_paused = true)]
async fn identical_route_is_untouched() {
    let h = harness(fast_settings());
    let store = FakeRouteStore::new(h.log.clone(), true);
    store.insert("app.example.com", "myapp:latest");
    let blobs = FakeBlobStore::new();
    blobs.insert(
        CONFIG_DIGEST,
        config_blob(r#"{"gordon.domain":"app.example.com"}"#),
    );

    let resolver = AutoRouteResolver::new(h.manager.clone(), store.clone(), blobs, None);
    let touched = resolver
        .process_push("myapp", "latest", &manifest(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(touched.is_empty());
    assert_eq!(h.log.count("add_route"), 0);
    assert_eq!(h.log.count("update_route"), 0);
    assert_eq!(h.log.count("create"), 0);
}

/// Digest references produce `name@digest` routes.
#[tokio::test(start_paused = true)]
async fn digest_reference_builds_digest_route() {
    let h = harness(fast_settings());
    let store = FakeRouteStore::new(h.log.clone(), true);
    let blobs = FakeBlobStore::new();
    blobs.insert(
        CONFIG_DIGEST,
        config_blob(r#"{"gordon.domain":"app.example.com"}"#),
    );

    let resolver = AutoRouteResolver::new(h.manager.clone(), store.clone(), blobs, None);
    resolver
        .process_push(
            "myapp",
            "sha256:feedface",
            &manifest(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        store.image_of("app.example.com").as_deref(),
        Some("myapp@sha256:feedface")
    );
}

/// Images without gordon labels do nothing.
#[tokio::test(start_paused = true)]
async fn unlabeled_image_is_ignored() {
    let h = harness(fast_settings());
    let store = FakeRouteStore::new(h.log.clone(), true);
    let blobs = FakeBlobStore::new();
    blobs.insert(CONFIG_DIGEST, config_blob(r#"{"maintainer":"nobody"}"#));

    let resolver = AutoRouteResolver::new(h.manager.clone(), store, blobs, None);
    let touched = resolver
        .process_push("myapp", "latest", &manifest(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(touched.is_empty());
    assert_eq!(h.log.count("create"), 0);
}

/// P8 end to end: the in-image env file seeds defaults, existing values win,
/// and the result is written sorted.
#[tokio::test(start_paused = true)]
async fn env_file_merges_with_existing_values_winning() {
    let env_dir = tempfile::tempdir().unwrap();
    let mut settings = fast_settings();
    settings.env_dir = env_dir.path().to_path_buf();
    let h = harness(settings);

    let existing_path = env_dir.path().join("app_example_com.env");
    tokio::fs::write(&existing_path, "A=user\nC=user\n").await.unwrap();

    let store = FakeRouteStore::new(h.log.clone(), true);
    let blobs = FakeBlobStore::new();
    blobs.insert(
        CONFIG_DIGEST,
        config_blob(r#"{"gordon.domain":"app.example.com","gordon.env-file":"/app/.env"}"#),
    );
    let extractor = FakeEnvFileExtractor::new();
    extractor.insert("/app/.env", Bytes::from_static(b"A=img\nB=img\n"));

    let resolver =
        AutoRouteResolver::new(h.manager.clone(), store, blobs, Some(extractor));
    resolver
        .process_push("myapp", "latest", &manifest(), &CancellationToken::new())
        .await
        .unwrap();

    let written = tokio::fs::read_to_string(&existing_path).await.unwrap();
    assert_eq!(written, "A=user\nB=img\nC=user\n");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = tokio::fs::metadata(&existing_path)
            .await
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

/// The push handler does not deploy a domain twice when auto-route already
/// handled it.
#[tokio::test(start_paused = true)]
async fn push_handler_skips_domains_autoroute_deployed() {
    let h = harness(fast_settings());
    let store = FakeRouteStore::new(h.log.clone(), true);
    store.insert("app.example.com", "myapp:latest");
    let blobs = FakeBlobStore::new();
    blobs.insert(
        CONFIG_DIGEST,
        config_blob(r#"{"gordon.domain":"app.example.com"}"#),
    );

    let resolver = AutoRouteResolver::new(h.manager.clone(), store.clone(), blobs, None);
    let handler = gordon::manager::ImagePushedHandler::new(
        h.manager.clone(),
        store,
        Some(resolver),
    );

    use gordon::events::{Event, EventHandler};
    handler
        .handle(
            Event::ImagePushed {
                name: "myapp".to_string(),
                reference: "v2".to_string(),
                manifest: manifest(),
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();

    // Auto-route updated the route to v2 and deployed once; the matching pass
    // must not deploy the same domain again.
    assert_eq!(h.log.count("create gordon-app.example.com"), 1);
}
