//! Declarative workload and endpoint specs and their Kubernetes rendering

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use serde_json::{json, Value};

use gantry_common::{Dependency, Error, Result};

use crate::resource::ClusterObject;

/// A named container port
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortSpec {
    /// Port name (e.g. "grpc", "http")
    pub name: String,
    /// Port number
    pub port: i32,
}

impl PortSpec {
    /// Create a port spec
    pub fn new(name: impl Into<String>, port: i32) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }
}

/// A config or secret source mounted into the workload's container
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigMount {
    /// Mount every key of a ConfigMap as a file under `mount_path`
    ConfigMap {
        /// ConfigMap name
        name: String,
        /// Directory inside the container
        mount_path: String,
    },
    /// Mount every key of a Secret as a file under `mount_path`
    Secret {
        /// Secret name
        name: String,
        /// Directory inside the container
        mount_path: String,
    },
}

/// An environment variable bound into the workload's container
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvBinding {
    /// Fixed value
    Literal {
        /// Variable name
        name: String,
        /// Value
        value: String,
    },
    /// Value read from a Secret key
    SecretKey {
        /// Variable name
        name: String,
        /// Secret name
        secret: String,
        /// Key inside the Secret
        key: String,
    },
    /// Value read from the pod's own metadata (downward API)
    FieldPath {
        /// Variable name
        name: String,
        /// Field path, e.g. `metadata.name`
        path: String,
    },
}

impl EnvBinding {
    /// Shorthand for a literal binding
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        EnvBinding::Literal {
            name: name.into(),
            value: value.into(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            EnvBinding::Literal { name, value } => json!({ "name": name, "value": value }),
            EnvBinding::SecretKey { name, secret, key } => json!({
                "name": name,
                "valueFrom": { "secretKeyRef": { "name": secret, "key": key } }
            }),
            EnvBinding::FieldPath { name, path } => json!({
                "name": name,
                "valueFrom": { "fieldRef": { "fieldPath": path } }
            }),
        }
    }
}

/// Desired state of a tenant workload.
///
/// Consumed by value when submitted; the rendered object is the only copy
/// that reaches the cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentSpec {
    /// Desired replica count
    pub replicas: i32,
    /// Container image
    pub image: String,
    /// Mounted config and secret sources
    pub mounts: Vec<ConfigMount>,
    /// Environment bindings
    pub env: Vec<EnvBinding>,
    /// Exposed container ports
    pub ports: Vec<PortSpec>,
    /// Port probed for readiness over TCP
    pub health_check_port: Option<i32>,
}

/// Desired state of a network endpoint in front of a workload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointSpec {
    /// Pod labels the endpoint routes to
    pub selector: BTreeMap<String, String>,
    /// Exposed ports; target port equals the service port
    pub ports: Vec<PortSpec>,
}

/// Render a ConfigMap
pub fn render_config_map(
    name: &str,
    labels: &BTreeMap<String, String>,
    data: BTreeMap<String, String>,
) -> ClusterObject {
    ClusterObject::ConfigMap(ConfigMap {
        metadata: metadata(name, labels),
        data: Some(data),
        ..Default::default()
    })
}

/// Render a Service
pub fn render_service(
    name: &str,
    labels: &BTreeMap<String, String>,
    spec: &EndpointSpec,
) -> ClusterObject {
    let ports = spec
        .ports
        .iter()
        .map(|p| ServicePort {
            name: Some(p.name.clone()),
            port: p.port,
            target_port: Some(IntOrString::Int(p.port)),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        })
        .collect();

    ClusterObject::Service(Service {
        metadata: metadata(name, labels),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(spec.selector.clone()),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Render a Deployment
pub fn render_deployment(
    name: &str,
    labels: &BTreeMap<String, String>,
    spec: DeploymentSpec,
) -> Result<ClusterObject> {
    let manifest = json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": { "name": name, "labels": labels },
        "spec": {
            "replicas": spec.replicas,
            "selector": { "matchLabels": labels },
            "template": pod_template(name, labels, &spec),
        }
    });
    let deployment: Deployment = serde_json::from_value(manifest)
        .map_err(|e| render_error("deployment", name, e))?;
    Ok(ClusterObject::Deployment(deployment))
}

/// Render a StatefulSet governed by the endpoint of the same name
pub fn render_stateful_set(
    name: &str,
    labels: &BTreeMap<String, String>,
    spec: DeploymentSpec,
) -> Result<ClusterObject> {
    let manifest = json!({
        "apiVersion": "apps/v1",
        "kind": "StatefulSet",
        "metadata": { "name": name, "labels": labels },
        "spec": {
            "replicas": spec.replicas,
            "serviceName": name,
            "podManagementPolicy": "Parallel",
            "selector": { "matchLabels": labels },
            "template": pod_template(name, labels, &spec),
        }
    });
    let stateful_set: StatefulSet = serde_json::from_value(manifest)
        .map_err(|e| render_error("statefulset", name, e))?;
    Ok(ClusterObject::StatefulSet(stateful_set))
}

fn render_error(kind: &str, name: &str, e: serde_json::Error) -> Error {
    Error::dependency_permanent(Dependency::Cluster, format!("failed to render {kind} {name}: {e}"))
}

fn metadata(name: &str, labels: &BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        labels: Some(labels.clone()),
        ..Default::default()
    }
}

fn pod_template(name: &str, labels: &BTreeMap<String, String>, spec: &DeploymentSpec) -> Value {
    let mut volumes = Vec::new();
    let mut volume_mounts = Vec::new();
    for (i, mount) in spec.mounts.iter().enumerate() {
        let volume_name = format!("config-{i}");
        let (volume, mount_path) = match mount {
            ConfigMount::ConfigMap { name, mount_path } => (
                json!({ "name": volume_name, "configMap": { "name": name } }),
                mount_path,
            ),
            ConfigMount::Secret { name, mount_path } => (
                json!({ "name": volume_name, "secret": { "secretName": name } }),
                mount_path,
            ),
        };
        volumes.push(volume);
        volume_mounts.push(json!({
            "name": volume_name,
            "mountPath": mount_path,
            "readOnly": true,
        }));
    }

    let ports: Vec<Value> = spec
        .ports
        .iter()
        .map(|p| json!({ "name": p.name, "containerPort": p.port, "protocol": "TCP" }))
        .collect();
    let env: Vec<Value> = spec.env.iter().map(EnvBinding::to_json).collect();

    let mut container = json!({
        "name": name,
        "image": spec.image,
        "ports": ports,
        "env": env,
        "volumeMounts": volume_mounts,
    });
    if let (Some(port), Some(c)) = (spec.health_check_port, container.as_object_mut()) {
        c.insert(
            "readinessProbe".to_string(),
            json!({
                "tcpSocket": { "port": port },
                "initialDelaySeconds": 5,
                "periodSeconds": 5,
                "failureThreshold": 3,
            }),
        );
    }

    json!({
        "metadata": { "labels": labels },
        "spec": {
            "containers": [container],
            "volumes": volumes,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> BTreeMap<String, String> {
        gantry_common::kube_utils::tenant_labels("acme", "acme-dc")
    }

    fn collection_spec() -> DeploymentSpec {
        DeploymentSpec {
            replicas: 2,
            image: "registry.local/data-collection:1.0".to_string(),
            mounts: vec![ConfigMount::ConfigMap {
                name: "acme-register-info".to_string(),
                mount_path: "/etc/gantry/register-info".to_string(),
            }],
            env: vec![
                EnvBinding::literal("USERNAME", "acme"),
                EnvBinding::FieldPath {
                    name: "POD_NAME".to_string(),
                    path: "metadata.name".to_string(),
                },
            ],
            ports: vec![PortSpec::new("grpc", 9000), PortSpec::new("http", 8000)],
            health_check_port: Some(8000),
        }
    }

    #[test]
    fn stateful_set_renders_replicas_ports_and_probe() {
        let ClusterObject::StatefulSet(sts) =
            render_stateful_set("acme-dc", &labels(), collection_spec()).expect("render")
        else {
            panic!("Expected StatefulSet");
        };
        let value = serde_json::to_value(&sts).expect("serialize");
        assert_eq!(value["spec"]["replicas"], 2);
        assert_eq!(value["spec"]["serviceName"], "acme-dc");
        let container = &value["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["image"], "registry.local/data-collection:1.0");
        assert_eq!(container["ports"][0]["containerPort"], 9000);
        assert_eq!(container["readinessProbe"]["tcpSocket"]["port"], 8000);
        assert_eq!(container["env"][1]["valueFrom"]["fieldRef"]["fieldPath"], "metadata.name");
        assert_eq!(
            value["spec"]["template"]["spec"]["volumes"][0]["configMap"]["name"],
            "acme-register-info"
        );
    }

    #[test]
    fn deployment_selector_matches_template_labels() {
        let mut spec = collection_spec();
        spec.replicas = 1;
        spec.health_check_port = None;
        let ClusterObject::Deployment(deploy) =
            render_deployment("acme-dp", &labels(), spec).expect("render")
        else {
            panic!("Expected Deployment");
        };
        let value = serde_json::to_value(&deploy).expect("serialize");
        assert_eq!(value["kind"], "Deployment");
        assert_eq!(
            value["spec"]["selector"]["matchLabels"],
            value["spec"]["template"]["metadata"]["labels"]
        );
        assert!(value["spec"]["template"]["spec"]["containers"][0]
            .get("readinessProbe")
            .is_none());
    }

    #[test]
    fn service_targets_its_own_ports() {
        let endpoint = EndpointSpec {
            selector: labels(),
            ports: vec![PortSpec::new("http", 8000)],
        };
        let ClusterObject::Service(svc) = render_service("acme-dp", &labels(), &endpoint) else {
            panic!("Expected Service");
        };
        let ports = svc.spec.and_then(|s| s.ports).unwrap_or_default();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].port, 8000);
        assert_eq!(ports[0].target_port, Some(IntOrString::Int(8000)));
    }
}
