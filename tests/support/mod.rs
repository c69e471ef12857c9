// ABOUTME: Shared test fixtures: fakes and a wired-up manager harness.
// ABOUTME: Keeps individual test files focused on scenario assertions.

// Each test binary compiles this module; not every binary uses every helper.
#![allow(dead_code)]

pub mod fake;

use fake::{CallLog, FakeEnvLoader, FakeInvalidator, FakeRuntime};
use gordon::config::Settings;
use gordon::manager::ContainerManager;
use gordon::routes::Route;
use gordon::types::Domain;
use std::sync::Arc;
use std::time::Duration;

/// A manager wired to fakes, with the shared call log.
pub struct Harness {
    pub runtime: Arc<FakeRuntime>,
    pub manager: Arc<ContainerManager>,
    pub invalidator: Arc<FakeInvalidator>,
    pub env_loader: Arc<FakeEnvLoader>,
    pub log: CallLog,
}

/// Settings tuned for tests: no readiness or drain sleeps.
pub fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.readiness_delay = Duration::ZERO;
    settings.drain_delay = Duration::ZERO;
    settings
}

pub fn harness(settings: Settings) -> Harness {
    let log = CallLog::new();
    let runtime = FakeRuntime::new(log.clone());
    let env_loader = FakeEnvLoader::new();
    let manager = ContainerManager::new(runtime.clone(), settings, env_loader.clone());

    let invalidator = FakeInvalidator::new(log.clone());
    invalidator.attach(&manager);
    manager.set_proxy_cache_invalidator(invalidator.clone());

    Harness {
        runtime,
        manager,
        invalidator,
        env_loader,
        log,
    }
}

pub fn domain(s: &str) -> Domain {
    Domain::new(s).unwrap()
}

pub fn route(domain_str: &str, image: &str) -> Route {
    Route {
        domain: domain(domain_str),
        image: image.to_string(),
    }
}
