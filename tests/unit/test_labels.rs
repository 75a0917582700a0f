//! Proxy label contract tests

use renderlite::docker::labels::{routing_labels, RouteSpec, MANAGED_LABEL, SUBDOMAIN_LABEL};
use renderlite::docker::{container_name, staging_name};

fn base_spec<'a>(name: &'a str, domains: &'a [String]) -> RouteSpec<'a> {
    RouteSpec {
        container_name: name,
        subdomain: "web-1a2b3c",
        base_domain: "paas.example.com",
        custom_domains: domains,
        container_port: 8080,
        network: "renderlite",
        enable_tls: false,
    }
}

#[test]
fn test_container_names_are_deterministic() {
    assert_eq!(container_name("web-1a2b3c"), "renderlite-web-1a2b3c");
    assert_eq!(staging_name("web-1a2b3c"), "renderlite-web-1a2b3c-new");
}

#[test]
fn test_minimal_label_set() {
    let name = container_name("web-1a2b3c");
    let labels = routing_labels(&base_spec(&name, &[]));

    assert_eq!(labels["traefik.enable"], "true");
    assert_eq!(labels["traefik.docker.network"], "renderlite");
    assert_eq!(
        labels[&format!("traefik.http.routers.{name}.rule")],
        "Host(`web-1a2b3c.paas.example.com`)"
    );
    assert_eq!(labels[&format!("traefik.http.routers.{name}.entrypoints")], "web");
    assert_eq!(
        labels[&format!("traefik.http.services.{name}.loadbalancer.server.port")],
        "8080"
    );
    assert_eq!(labels[MANAGED_LABEL], "true");
    assert_eq!(labels[SUBDOMAIN_LABEL], "web-1a2b3c");
}

#[test]
fn test_tls_mode_switches_entrypoint_and_adds_resolver() {
    let name = container_name("web-1a2b3c");
    let spec = RouteSpec { enable_tls: true, ..base_spec(&name, &[]) };
    let labels = routing_labels(&spec);

    assert_eq!(labels[&format!("traefik.http.routers.{name}.entrypoints")], "websecure");
    assert_eq!(labels[&format!("traefik.http.routers.{name}.tls")], "true");
    assert_eq!(
        labels[&format!("traefik.http.routers.{name}.tls.certresolver")],
        "letsencrypt"
    );
}

#[test]
fn test_one_router_per_custom_domain() {
    let name = container_name("web-1a2b3c");
    let domains = vec!["shop.acme.io".to_string(), "acme.io".to_string()];
    let labels = routing_labels(&base_spec(&name, &domains));

    let rules: Vec<&String> = labels
        .iter()
        .filter(|(k, _)| k.ends_with(".rule"))
        .map(|(_, v)| v)
        .collect();
    assert_eq!(rules.len(), 3);
    assert!(rules.contains(&&"Host(`shop.acme.io`)".to_string()));
    assert!(rules.contains(&&"Host(`acme.io`)".to_string()));

    // Custom-domain routers point back at the subdomain's service.
    assert_eq!(
        labels[&format!("traefik.http.routers.{name}-domain-0.service")],
        name
    );
}

#[test]
fn test_staging_labels_route_the_same_host() {
    let canonical = container_name("web-1a2b3c");
    let staging = staging_name("web-1a2b3c");

    let canonical_labels = routing_labels(&base_spec(&canonical, &[]));
    let staging_labels = routing_labels(&base_spec(&staging, &[]));

    // Both containers match the same Host rule during the swap overlap; the
    // proxy load-balances across them.
    assert_eq!(
        canonical_labels[&format!("traefik.http.routers.{canonical}.rule")],
        staging_labels[&format!("traefik.http.routers.{staging}.rule")]
    );
    // But router names never collide.
    assert!(!staging_labels.contains_key(&format!("traefik.http.routers.{canonical}.rule")));
}
