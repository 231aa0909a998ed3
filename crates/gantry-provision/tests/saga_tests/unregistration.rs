//! Unregistration and lookup stories

use std::sync::atomic::Ordering;

use gantry_cluster::ResourceKind;
use gantry_common::{Dependency, Error};
use gantry_gateway::EntityKind;

use super::fakes::{register_request, Harness};

/// Story: a wrong secret cannot remove a tenant
#[tokio::test]
async fn story_wrong_secret_deletes_nothing() {
    let h = Harness::new();
    h.orchestrator
        .register(register_request("acme", "s3cret"))
        .await
        .expect("register");

    let err = h
        .orchestrator
        .unregister("acme", "guess")
        .await
        .expect_err("wrong secret");
    assert!(matches!(err, Error::InvalidCredentials));

    assert!(h.cluster.deleted().is_empty());
    assert_eq!(h.gateway.count(EntityKind::Consumer), 1);
    assert_eq!(h.buckets.names().len(), 3);
    assert!(h.orchestrator.login("acme", "s3cret").await.is_ok());
}

/// Story: an unknown tenant looks exactly like a wrong secret
#[tokio::test]
async fn story_unknown_tenant_is_invalid_credentials() {
    let h = Harness::new();
    let err = h
        .orchestrator
        .unregister("nobody", "s3cret")
        .await
        .expect_err("unknown");
    assert_eq!(err.code(), "INVALID_CREDENTIALS");
}

/// Story: acme leaves while globex stays; only acme's objects go
#[tokio::test]
async fn story_unregister_removes_only_that_tenant() {
    let h = Harness::new();
    h.orchestrator
        .register(register_request("acme", "s3cret"))
        .await
        .expect("acme");
    let globex = h
        .orchestrator
        .register(register_request("globex", "hunter2"))
        .await
        .expect("globex");

    h.orchestrator
        .unregister("acme", "s3cret")
        .await
        .expect("unregister acme");

    assert_eq!(
        h.cluster.names(ResourceKind::NetworkEndpoint),
        vec!["globex-dc", "globex-dp"]
    );
    assert_eq!(
        h.cluster.names(ResourceKind::ConfigObject),
        vec!["globex-register-info"]
    );
    assert_eq!(
        h.buckets.names(),
        vec!["globex", "globex-warning_detect", "globex-warnings"]
    );
    assert_eq!(h.gateway.count(EntityKind::Consumer), 1);
    assert!(h
        .gateway
        .names(EntityKind::Route)
        .iter()
        .all(|name| name.starts_with("globex")));
    assert_eq!(
        h.orchestrator.login("globex", "hunter2").await.expect("login"),
        globex
    );
}

/// Story: the gateway cannot list acme's objects during unregistration.
/// The other cleanups still run and the error names the gateway step.
#[tokio::test]
async fn story_partial_unregister_failure_still_cleans_the_rest() {
    let h = Harness::new();
    h.orchestrator
        .register(register_request("acme", "s3cret"))
        .await
        .expect("register");
    h.gateway.fail_listing.store(true, Ordering::SeqCst);

    let err = h
        .orchestrator
        .unregister("acme", "s3cret")
        .await
        .expect_err("gateway listing fails");
    assert_eq!(err.step(), Some("unregister_gateway"));
    assert_eq!(err.dependency_kind(), Some(Dependency::Gateway));

    assert!(h.cluster.is_empty(), "cluster objects removed");
    assert!(h.buckets.names().is_empty(), "buckets removed");
    assert!(matches!(
        h.orchestrator.login("acme", "s3cret").await,
        Err(Error::InvalidCredentials)
    ));
    assert_eq!(h.gateway.count(EntityKind::Consumer), 1);
}

/// Story: a tenant that registered and left can register again
#[tokio::test]
async fn story_tenant_can_return_after_leaving() {
    let h = Harness::new();
    let first = h
        .orchestrator
        .register(register_request("acme", "s3cret"))
        .await
        .expect("first");
    h.orchestrator
        .unregister("acme", "s3cret")
        .await
        .expect("leave");

    let second = h
        .orchestrator
        .register(register_request("acme", "n3w"))
        .await
        .expect("return");
    assert_ne!(first, second);
    assert!(matches!(
        h.orchestrator.register_info(&first).await,
        Err(Error::NotFound { .. })
    ));
    assert_eq!(
        h.orchestrator.register_info(&second).await.expect("info").tenant,
        "acme"
    );
}

/// Story: the client archive is served once the build pipeline stores it
#[tokio::test]
async fn story_client_artifact_download() {
    let h = Harness::new();
    h.orchestrator
        .register(register_request("acme", "s3cret"))
        .await
        .expect("register");

    assert!(matches!(
        h.orchestrator.client_artifact("acme").await,
        Err(Error::NotFound { .. })
    ));

    h.store
        .put("acme", "client_code", &hex::encode(b"PK\x03\x04zip"))
        .await;
    let artifact = h
        .orchestrator
        .client_artifact("acme")
        .await
        .expect("artifact");
    assert_eq!(artifact.content, b"PK\x03\x04zip");
    assert_eq!(artifact.file_name, "client_code.zip");
}
