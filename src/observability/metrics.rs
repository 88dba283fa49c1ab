use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub offers_received_total: IntCounterVec,
    pub offers_resolved_total: IntCounterVec,
    pub handoff_reads_total: IntCounterVec,
    pub socket_connects_total: IntCounter,
    pub location_samples_total: IntCounter,
    pub active_orders: IntGauge,
    pub windows_open: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let offers_received_total = IntCounterVec::new(
            Opts::new("offers_received_total", "Offers surfaced to a window by delivery path"),
            &["source"],
        )
        .expect("valid offers_received_total metric");

        let offers_resolved_total = IntCounterVec::new(
            Opts::new("offers_resolved_total", "Pending offers resolved by outcome"),
            &["outcome"],
        )
        .expect("valid offers_resolved_total metric");

        let handoff_reads_total = IntCounterVec::new(
            Opts::new("handoff_reads_total", "Handoff store reads by result"),
            &["result"],
        )
        .expect("valid handoff_reads_total metric");

        let socket_connects_total =
            IntCounter::new("socket_connects_total", "Successful realtime connections")
                .expect("valid socket_connects_total metric");

        let location_samples_total = IntCounter::new(
            "location_samples_total",
            "Position samples forwarded for an active order",
        )
        .expect("valid location_samples_total metric");

        let active_orders = IntGauge::new("active_orders", "Orders currently in progress")
            .expect("valid active_orders metric");

        let windows_open = IntGauge::new("windows_open", "Open foreground windows")
            .expect("valid windows_open metric");

        registry
            .register(Box::new(offers_received_total.clone()))
            .expect("register offers_received_total");
        registry
            .register(Box::new(offers_resolved_total.clone()))
            .expect("register offers_resolved_total");
        registry
            .register(Box::new(handoff_reads_total.clone()))
            .expect("register handoff_reads_total");
        registry
            .register(Box::new(socket_connects_total.clone()))
            .expect("register socket_connects_total");
        registry
            .register(Box::new(location_samples_total.clone()))
            .expect("register location_samples_total");
        registry
            .register(Box::new(active_orders.clone()))
            .expect("register active_orders");
        registry
            .register(Box::new(windows_open.clone()))
            .expect("register windows_open");

        Self {
            registry,
            offers_received_total,
            offers_resolved_total,
            handoff_reads_total,
            socket_connects_total,
            location_samples_total,
            active_orders,
            windows_open,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
