//! Registration stories

use std::sync::atomic::Ordering;
use std::time::Duration;

use gantry_cluster::{ClusterObject, ResourceKind};
use gantry_common::{Dependency, Error};
use gantry_gateway::EntityKind;

use super::fakes::{register_request, Harness};

/// Story: acme registers and gets a token, two running workloads with their
/// endpoints, three buckets and a gateway route set
#[tokio::test]
async fn story_acme_registration_provisions_everything() {
    let h = Harness::new();

    let token = h
        .orchestrator
        .register(register_request("acme", "s3cret"))
        .await
        .expect("acme registers");

    // Cluster: config object, both workloads, one endpoint each
    assert_eq!(
        h.cluster.names(ResourceKind::ConfigObject),
        vec!["acme-register-info"]
    );
    assert_eq!(h.cluster.names(ResourceKind::StatefulWorkload), vec!["acme-dc"]);
    assert_eq!(h.cluster.names(ResourceKind::StatelessWorkload), vec!["acme-dp"]);
    assert_eq!(
        h.cluster.names(ResourceKind::NetworkEndpoint),
        vec!["acme-dc", "acme-dp"]
    );

    match h.cluster.get(ResourceKind::StatefulWorkload, "acme-dc") {
        Some(ClusterObject::StatefulSet(sts)) => {
            assert_eq!(sts.spec.and_then(|s| s.replicas), Some(2));
        }
        other => panic!("expected acme-dc StatefulSet, got {other:?}"),
    }
    match h.cluster.get(ResourceKind::ConfigObject, "acme-register-info") {
        Some(ClusterObject::ConfigMap(cm)) => {
            let data = cm.data.unwrap_or_default();
            let info = data.get("register_info.json").expect("register info key");
            assert!(info.contains("\"tenant\": \"acme\""));
            assert!(!info.contains("s3cret"));
        }
        other => panic!("expected ConfigMap, got {other:?}"),
    }

    // Storage: three buckets with their retentions
    assert_eq!(
        h.buckets.names(),
        vec!["acme", "acme-warning_detect", "acme-warnings"]
    );
    assert_eq!(
        h.buckets.retention("acme-warning_detect"),
        Some(Duration::from_secs(24 * 60 * 60))
    );

    // Gateway: one consumer, collection (2 services, 2 routes, 2 plugins)
    // plus processing (1 service, 2 routes, 1 plugin)
    assert_eq!(h.gateway.count(EntityKind::Consumer), 1);
    assert_eq!(h.gateway.count(EntityKind::Service), 3);
    assert_eq!(h.gateway.count(EntityKind::Route), 4);
    assert_eq!(h.gateway.count(EntityKind::Plugin), 3);

    // The token logs in and resolves back to the registration
    assert_eq!(
        h.orchestrator.login("acme", "s3cret").await.expect("login"),
        token
    );
    let info = h
        .orchestrator
        .register_info(&token)
        .await
        .expect("register info");
    assert_eq!(info.tenant, "acme");
    assert_eq!(info.device_state_register_infos.len(), 1);
}

/// Story: a registration followed by an unregistration leaves nothing behind
#[tokio::test]
async fn story_register_then_unregister_round_trip() {
    let h = Harness::new();
    h.orchestrator
        .register(register_request("acme", "s3cret"))
        .await
        .expect("register");

    h.orchestrator
        .unregister("acme", "s3cret")
        .await
        .expect("unregister");

    h.assert_empty();
    assert!(matches!(
        h.orchestrator.login("acme", "s3cret").await,
        Err(Error::InvalidCredentials)
    ));
}

/// Story: a second registration of acme is refused and the first one keeps
/// every object it owns
#[tokio::test]
async fn story_duplicate_registration_keeps_the_original() {
    let h = Harness::new();
    let token = h
        .orchestrator
        .register(register_request("acme", "s3cret"))
        .await
        .expect("first registration");

    let err = h
        .orchestrator
        .register(register_request("acme", "other"))
        .await
        .expect_err("second registration");
    assert!(matches!(err, Error::DuplicateTenant { ref tenant } if tenant == "acme"));
    assert_eq!(err.code(), "DUPLICATE_TENANT");

    assert_eq!(h.gateway.count(EntityKind::Consumer), 1);
    assert_eq!(h.gateway.count(EntityKind::Service), 3);
    assert_eq!(h.buckets.names().len(), 3);
    assert_eq!(h.cluster.names(ResourceKind::NetworkEndpoint).len(), 2);
    assert!(h.cluster.deleted().is_empty());
    assert_eq!(
        h.orchestrator.login("acme", "s3cret").await.expect("login"),
        token
    );
    assert!(h.orchestrator.register_info(&token).await.is_ok());
}

/// Story: a request with no time field is rejected before any collaborator
/// is called
#[tokio::test]
async fn story_invalid_request_touches_nothing() {
    let h = Harness::new();
    let mut request = register_request("acme", "s3cret");
    request.device_state_register_infos[0]
        .fields
        .retain(|f| f.name != "time");

    let err = h
        .orchestrator
        .register(request)
        .await
        .expect_err("validation");
    match err {
        Error::Validation { rule, .. } => assert_eq!(rule, "missing_time_field"),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(h.total_calls(), 0);
}

/// Story: the processing workload never becomes ready. Registration reports
/// the timeout and everything, including the healthy collection workload,
/// is removed newest first.
#[tokio::test(start_paused = true)]
async fn story_readiness_timeout_unwinds_everything() {
    let h = Harness::new();
    h.cluster.stall("acme-dp");

    let err = h
        .orchestrator
        .register(register_request("acme", "s3cret"))
        .await
        .expect_err("timeout");
    match &err {
        Error::ProvisionTimeout { kind, name, timeout } => {
            assert_eq!(kind, "Deployment");
            assert_eq!(name, "acme-dp");
            assert_eq!(*timeout, Duration::from_secs(300));
        }
        other => panic!("expected timeout, got {other:?}"),
    }

    let deleted = h.cluster.deleted();
    assert_eq!(
        deleted.first(),
        Some(&(ResourceKind::StatelessWorkload, "acme-dp".to_string())),
        "the timed out workload removes itself first"
    );
    assert_eq!(
        deleted[1..].to_vec(),
        vec![
            (ResourceKind::StatelessWorkload, "acme-dp".to_string()),
            (ResourceKind::NetworkEndpoint, "acme-dp".to_string()),
            (ResourceKind::StatefulWorkload, "acme-dc".to_string()),
            (ResourceKind::NetworkEndpoint, "acme-dc".to_string()),
            (ResourceKind::ConfigObject, "acme-register-info".to_string()),
        ]
    );

    h.assert_empty();
    assert!(matches!(
        h.orchestrator.login("acme", "s3cret").await,
        Err(Error::InvalidCredentials)
    ));
}

/// Story: the gateway fails while publishing routes; the error names the
/// step and the whole registration is undone
#[tokio::test]
async fn story_route_failure_is_tagged_and_unwound() {
    let h = Harness::new();
    h.gateway.fail_plugins.store(true, Ordering::SeqCst);

    let err = h
        .orchestrator
        .register(register_request("acme", "s3cret"))
        .await
        .expect_err("plugins fail");
    assert_eq!(err.step(), Some("create_routes"));
    assert_eq!(err.dependency_kind(), Some(Dependency::Gateway));
    assert_eq!(err.code(), "EXTERNAL_DEPENDENCY_ERROR");

    h.assert_empty();
}

/// Story: two clients register acme at the same moment. Exactly one wins;
/// the loser removes only the gateway identity it created.
#[tokio::test]
async fn story_concurrent_same_name_registration() {
    let h = Harness::new();

    let (first, second) = tokio::join!(
        h.orchestrator.register(register_request("acme", "one")),
        h.orchestrator.register(register_request("acme", "two")),
    );

    let (winner_secret, loser) = match (&first, &second) {
        (Ok(_), Err(e)) => ("one", e),
        (Err(e), Ok(_)) => ("two", e),
        other => panic!("expected exactly one winner, got {other:?}"),
    };
    assert!(matches!(loser, Error::DuplicateTenant { .. }));

    assert_eq!(h.gateway.count(EntityKind::Consumer), 1);
    assert_eq!(h.gateway.count(EntityKind::Service), 3);
    assert_eq!(h.buckets.names().len(), 3);
    assert_eq!(h.cluster.names(ResourceKind::StatefulWorkload), vec!["acme-dc"]);
    assert!(h.orchestrator.login("acme", winner_secret).await.is_ok());
}

/// Story: different tenants register concurrently without interfering
#[tokio::test]
async fn story_distinct_tenants_register_side_by_side() {
    let h = Harness::new();

    let (acme, globex) = tokio::join!(
        h.orchestrator.register(register_request("acme", "s3cret")),
        h.orchestrator.register(register_request("globex", "hunter2")),
    );
    let acme = acme.expect("acme");
    let globex = globex.expect("globex");
    assert_ne!(acme, globex);

    assert_eq!(h.gateway.count(EntityKind::Consumer), 2);
    assert_eq!(h.buckets.names().len(), 6);
    assert_eq!(
        h.cluster.names(ResourceKind::StatelessWorkload),
        vec!["acme-dp", "globex-dp"]
    );
    assert_eq!(
        h.orchestrator
            .register_info(&globex)
            .await
            .expect("info")
            .tenant,
        "globex"
    );
}

/// Story: the caller gives up while the processing workload is still
/// starting. The registration carries on without it, times out and is
/// fully undone, so acme can register again later.
#[tokio::test(start_paused = true)]
async fn story_abandoned_registration_still_unwinds() {
    let h = Harness::new();
    h.cluster.stall("acme-dp");

    let abandoned = tokio::time::timeout(
        Duration::from_secs(60),
        h.orchestrator.register(register_request("acme", "s3cret")),
    )
    .await;
    assert!(abandoned.is_err(), "caller gave up before the readiness deadline");

    tokio::time::sleep(Duration::from_secs(600)).await;

    h.assert_empty();
    assert!(matches!(
        h.orchestrator.login("acme", "s3cret").await,
        Err(Error::InvalidCredentials)
    ));
}

/// Story: `x-warnings` would name its state bucket after x's warning
/// history. It is refused up front and x keeps all three buckets.
#[tokio::test]
async fn story_bucket_suffix_tenant_cannot_shadow_another() {
    let h = Harness::new();
    h.orchestrator
        .register(register_request("x", "s3cret"))
        .await
        .expect("x registers");

    let err = h
        .orchestrator
        .register(register_request("x-warnings", "s3cret"))
        .await
        .expect_err("reserved suffix");
    match err {
        Error::Validation { rule, .. } => assert_eq!(rule, "invalid_tenant_name"),
        other => panic!("expected validation error, got {other:?}"),
    }

    assert_eq!(h.buckets.names(), vec!["x", "x-warning_detect", "x-warnings"]);
    assert!(h.cluster.deleted().is_empty());
    assert!(h.orchestrator.login("x", "s3cret").await.is_ok());
}

/// Story: `a_b` would share every cluster name with `a-b`. It is refused
/// and a-b's workloads keep running.
#[tokio::test]
async fn story_underscore_twin_is_refused() {
    let h = Harness::new();
    h.orchestrator
        .register(register_request("a-b", "s3cret"))
        .await
        .expect("a-b registers");
    let calls = h.total_calls();

    let err = h
        .orchestrator
        .register(register_request("a_b", "s3cret"))
        .await
        .expect_err("underscore");
    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert_eq!(h.total_calls(), calls, "nothing touched");

    assert_eq!(h.cluster.names(ResourceKind::StatefulWorkload), vec!["a-b-dc"]);
    assert_eq!(h.cluster.names(ResourceKind::StatelessWorkload), vec!["a-b-dp"]);
    assert!(h.cluster.deleted().is_empty());
    assert!(h.orchestrator.login("a-b", "s3cret").await.is_ok());
}
