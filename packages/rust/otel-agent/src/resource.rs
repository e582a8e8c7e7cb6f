//! Resource construction from [`AgentConfig`].
//!
//! Every signal shares one resource describing the service:
//!
//! - `service.name`, `service.version`, `service.namespace`, `environment` and
//!   `service.instance.id` always
//! - `deployment.environment` when an environment is configured
//! - Kubernetes (`k8s.pod.name`, `k8s.pod.ip`, `k8s.namespace.name`, `k8s.node.name`,
//!   `k8s.cluster.name`) and container (`container.name`, `container.id`) identity
//!   when known
//! - custom attributes, which may not override the identity attributes above
//! - `process.runtime.name` and `telemetry.agent.*` describing this crate
//!
//! The resource is built from configuration only. Environment lookups happen in
//! [`AgentConfig::from_env`] before the agent is created.

use crate::config::AgentConfig;
use crate::constants::attributes;

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use std::collections::HashSet;

/// Builds the resource shared by all providers.
pub fn build_resource(config: &AgentConfig) -> Resource {
    let mut attrs = vec![
        KeyValue::new(SERVICE_NAME, config.service_name.clone()),
        KeyValue::new(SERVICE_VERSION, config.service_version.clone()),
        KeyValue::new(attributes::SERVICE_NAMESPACE, config.service_namespace.clone()),
        KeyValue::new(attributes::ENVIRONMENT, config.environment.clone()),
        KeyValue::new(
            attributes::SERVICE_INSTANCE_ID,
            config.resource.service_instance.clone(),
        ),
    ];

    if !config.environment.is_empty() {
        attrs.push(KeyValue::new(
            attributes::DEPLOYMENT_ENVIRONMENT,
            config.environment.clone(),
        ));
    }

    let resource = &config.resource;
    let optional = [
        (attributes::K8S_POD_NAME, &resource.k8s_pod_name),
        (attributes::K8S_POD_IP, &resource.k8s_pod_ip),
        (attributes::K8S_NAMESPACE_NAME, &resource.k8s_namespace),
        (attributes::K8S_NODE_NAME, &resource.k8s_node_name),
        (attributes::K8S_CLUSTER_NAME, &resource.k8s_cluster_name),
        (attributes::CONTAINER_NAME, &resource.container_name),
        (attributes::CONTAINER_ID, &resource.container_id),
    ];
    attrs.extend(
        optional
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| KeyValue::new(key, value.clone())),
    );

    let reserved: HashSet<String> = attrs.iter().map(|kv| kv.key.as_str().to_string()).collect();
    let mut custom: Vec<_> = resource
        .custom_attributes
        .iter()
        .filter(|(key, _)| !key.is_empty() && !reserved.contains(key.as_str()))
        .collect();
    custom.sort();
    attrs.extend(
        custom
            .into_iter()
            .map(|(key, value)| KeyValue::new(key.clone(), value.clone())),
    );

    attrs.push(KeyValue::new(attributes::PROCESS_RUNTIME_NAME, "rust"));
    attrs.push(KeyValue::new(
        attributes::TELEMETRY_AGENT_NAME,
        env!("CARGO_PKG_NAME"),
    ));
    attrs.push(KeyValue::new(
        attributes::TELEMETRY_AGENT_VERSION,
        env!("CARGO_PKG_VERSION"),
    ));

    Resource::builder_empty().with_attributes(attrs).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use opentelemetry::{Key, Value};
    use std::collections::HashMap;

    fn get(resource: &Resource, key: &'static str) -> Option<Value> {
        resource.get(&Key::from_static_str(key))
    }

    #[test]
    fn test_identity_attributes() {
        let config = AgentConfig::builder()
            .service_name("orders")
            .service_version("1.4.2")
            .service_namespace("shop")
            .environment("production")
            .build();

        let resource = build_resource(&config);

        assert_eq!(get(&resource, "service.name"), Some(Value::from("orders")));
        assert_eq!(get(&resource, "service.version"), Some(Value::from("1.4.2")));
        assert_eq!(get(&resource, "service.namespace"), Some(Value::from("shop")));
        assert_eq!(
            get(&resource, "deployment.environment"),
            Some(Value::from("production"))
        );
        assert_eq!(get(&resource, "process.runtime.name"), Some(Value::from("rust")));
        assert_eq!(
            get(&resource, "telemetry.agent.name"),
            Some(Value::from("otel-agent"))
        );
    }

    #[test]
    fn test_kubernetes_attributes_only_when_known() {
        let config = AgentConfig::builder()
            .service_name("orders")
            .resource(ResourceConfig {
                k8s_pod_name: "orders-7d9f".to_string(),
                k8s_namespace: "prod".to_string(),
                ..ResourceConfig::default()
            })
            .build();

        let resource = build_resource(&config);

        assert_eq!(get(&resource, "k8s.pod.name"), Some(Value::from("orders-7d9f")));
        assert_eq!(get(&resource, "k8s.namespace.name"), Some(Value::from("prod")));
        assert_eq!(get(&resource, "k8s.node.name"), None);
        assert_eq!(get(&resource, "container.id"), None);
    }

    #[test]
    fn test_custom_attributes_cannot_override_identity() {
        let config = AgentConfig::builder()
            .service_name("orders")
            .resource(ResourceConfig {
                custom_attributes: HashMap::from([
                    ("service.name".to_string(), "spoofed".to_string()),
                    ("team".to_string(), "payments".to_string()),
                ]),
                ..ResourceConfig::default()
            })
            .build();

        let resource = build_resource(&config);

        assert_eq!(get(&resource, "service.name"), Some(Value::from("orders")));
        assert_eq!(get(&resource, "team"), Some(Value::from("payments")));
    }
}
