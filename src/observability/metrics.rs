//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_requests_total` (counter): requests by topology, status
//! - `bridge_https_redirects_total` (counter): plain-listener redirects
//! - `bridge_client_certificates_total` (counter): connections presenting
//!   a certificate, by topology
//! - `bridge_identity_rejected_total` (counter): forwarded identity headers
//!   discarded by the backend, by reason
//! - `bridge_upstream_errors_total` (counter): failed loopback forwards

use std::net::SocketAddr;

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::TopologyMode;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe();
            tracing::info!(address = %addr, "Metrics exporter listening");
        }
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

fn describe() {
    describe_counter!("bridge_requests_total", "Requests handled by the front end");
    describe_counter!(
        "bridge_https_redirects_total",
        "Plain-listener requests redirected to https"
    );
    describe_counter!(
        "bridge_client_certificates_total",
        "Requests on connections that presented a client certificate"
    );
    describe_counter!(
        "bridge_identity_rejected_total",
        "Forwarded identity headers ignored by the backend"
    );
    describe_counter!(
        "bridge_upstream_errors_total",
        "Requests that could not be forwarded to the backend"
    );
}

pub fn record_request(topology: TopologyMode, status: u16) {
    counter!(
        "bridge_requests_total",
        "topology" => topology.as_str(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_redirect() {
    counter!("bridge_https_redirects_total").increment(1);
}

pub fn record_client_certificate(topology: TopologyMode) {
    counter!("bridge_client_certificates_total", "topology" => topology.as_str()).increment(1);
}

pub fn record_identity_rejected(reason: &'static str) {
    counter!("bridge_identity_rejected_total", "reason" => reason).increment(1);
}

pub fn record_upstream_error() {
    counter!("bridge_upstream_errors_total").increment(1);
}
