//! Reverse-proxy label contract
//!
//! The proxy builds its routing table from container labels. One router is
//! emitted for the subdomain and one per verified custom domain, all pointing
//! at a single loadbalancer service so they share one upstream.

use std::collections::HashMap;

/// Label marking a container as platform-owned. The reconciler only ever
/// touches containers carrying it.
pub const MANAGED_LABEL: &str = "renderlite.managed";
/// Label recording which subdomain a managed container serves.
pub const SUBDOMAIN_LABEL: &str = "renderlite.subdomain";

/// Inputs for one container's routing labels.
#[derive(Debug, Clone)]
pub struct RouteSpec<'a> {
    /// Router/service names derive from the container name, so the staging
    /// container gets distinct router names while matching the same hosts.
    pub container_name: &'a str,
    pub subdomain: &'a str,
    pub base_domain: &'a str,
    pub custom_domains: &'a [String],
    pub container_port: u16,
    pub network: &'a str,
    pub enable_tls: bool,
}

/// Build the full label set for a managed container.
pub fn routing_labels(spec: &RouteSpec<'_>) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    let name = spec.container_name;
    let entrypoint = if spec.enable_tls { "websecure" } else { "web" };

    labels.insert("traefik.enable".to_string(), "true".to_string());
    labels.insert("traefik.docker.network".to_string(), spec.network.to_string());

    // Subdomain router.
    insert_router(
        &mut labels,
        name,
        &format!("{}.{}", spec.subdomain, spec.base_domain),
        entrypoint,
        spec.enable_tls,
    );

    // One extra router per verified custom domain, sharing the service.
    for (i, hostname) in spec.custom_domains.iter().enumerate() {
        insert_router(
            &mut labels,
            &format!("{name}-domain-{i}"),
            hostname,
            entrypoint,
            spec.enable_tls,
        );
        labels.insert(
            format!("traefik.http.routers.{name}-domain-{i}.service"),
            name.to_string(),
        );
    }

    labels.insert(
        format!("traefik.http.services.{name}.loadbalancer.server.port"),
        spec.container_port.to_string(),
    );

    labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
    labels.insert(SUBDOMAIN_LABEL.to_string(), spec.subdomain.to_string());

    labels
}

fn insert_router(
    labels: &mut HashMap<String, String>,
    router: &str,
    host: &str,
    entrypoint: &str,
    tls: bool,
) {
    labels.insert(
        format!("traefik.http.routers.{router}.rule"),
        format!("Host(`{host}`)"),
    );
    labels.insert(
        format!("traefik.http.routers.{router}.entrypoints"),
        entrypoint.to_string(),
    );
    if tls {
        labels.insert(format!("traefik.http.routers.{router}.tls"), "true".to_string());
        labels.insert(
            format!("traefik.http.routers.{router}.tls.certresolver"),
            "letsencrypt".to_string(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec<'a>(custom_domains: &'a [String], tls: bool) -> RouteSpec<'a> {
        RouteSpec {
            container_name: "renderlite-api-x-ab12cd",
            subdomain: "api-x-ab12cd",
            base_domain: "renderlite.local",
            custom_domains,
            container_port: 3000,
            network: "renderlite",
            enable_tls: tls,
        }
    }

    #[test]
    fn test_subdomain_router() {
        let labels = routing_labels(&spec(&[], false));
        assert_eq!(labels["traefik.enable"], "true");
        assert_eq!(labels["traefik.docker.network"], "renderlite");
        assert_eq!(
            labels["traefik.http.routers.renderlite-api-x-ab12cd.rule"],
            "Host(`api-x-ab12cd.renderlite.local`)"
        );
        assert_eq!(
            labels["traefik.http.routers.renderlite-api-x-ab12cd.entrypoints"],
            "web"
        );
        assert_eq!(
            labels["traefik.http.services.renderlite-api-x-ab12cd.loadbalancer.server.port"],
            "3000"
        );
        assert_eq!(labels[MANAGED_LABEL], "true");
        assert_eq!(labels[SUBDOMAIN_LABEL], "api-x-ab12cd");
        assert!(!labels.contains_key("traefik.http.routers.renderlite-api-x-ab12cd.tls"));
    }

    #[test]
    fn test_tls_labels() {
        let labels = routing_labels(&spec(&[], true));
        assert_eq!(
            labels["traefik.http.routers.renderlite-api-x-ab12cd.entrypoints"],
            "websecure"
        );
        assert_eq!(labels["traefik.http.routers.renderlite-api-x-ab12cd.tls"], "true");
        assert_eq!(
            labels["traefik.http.routers.renderlite-api-x-ab12cd.tls.certresolver"],
            "letsencrypt"
        );
    }

    #[test]
    fn test_custom_domain_routers_share_service() {
        let domains = vec!["app.example.com".to_string(), "www.example.com".to_string()];
        let labels = routing_labels(&spec(&domains, false));
        assert_eq!(
            labels["traefik.http.routers.renderlite-api-x-ab12cd-domain-0.rule"],
            "Host(`app.example.com`)"
        );
        assert_eq!(
            labels["traefik.http.routers.renderlite-api-x-ab12cd-domain-1.rule"],
            "Host(`www.example.com`)"
        );
        assert_eq!(
            labels["traefik.http.routers.renderlite-api-x-ab12cd-domain-1.service"],
            "renderlite-api-x-ab12cd"
        );
        // Exactly one loadbalancer service regardless of router count.
        let services: Vec<_> = labels
            .keys()
            .filter(|k| k.contains(".loadbalancer.server.port"))
            .collect();
        assert_eq!(services.len(), 1);
    }

    #[test]
    fn test_staging_container_keeps_canonical_host() {
        let staging = RouteSpec {
            container_name: "renderlite-api-x-ab12cd-new",
            ..spec(&[], false)
        };
        let labels = routing_labels(&staging);
        // Router name follows the staging container, the host does not.
        assert_eq!(
            labels["traefik.http.routers.renderlite-api-x-ab12cd-new.rule"],
            "Host(`api-x-ab12cd.renderlite.local`)"
        );
    }
}
