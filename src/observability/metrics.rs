use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_cycles_total: IntCounterVec,
    pub dispatch_cycle_seconds: HistogramVec,
    pub orders_dispatched_total: IntCounterVec,
    pub pending_orders: IntGauge,
    pub courier_bindings_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_cycles_total = IntCounterVec::new(
            Opts::new("dispatch_cycles_total", "Dispatch cycles by outcome"),
            &["outcome"],
        )
        .expect("valid dispatch_cycles_total metric");

        let dispatch_cycle_seconds = HistogramVec::new(
            HistogramOpts::new(
                "dispatch_cycle_seconds",
                "Duration of a dispatch cycle in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_cycle_seconds metric");

        let orders_dispatched_total = IntCounterVec::new(
            Opts::new(
                "orders_dispatched_total",
                "Orders handled by the dispatcher, by decision",
            ),
            &["decision"],
        )
        .expect("valid orders_dispatched_total metric");

        let pending_orders = IntGauge::new(
            "pending_orders",
            "Pending orders seen at the start of the last cycle",
        )
        .expect("valid pending_orders metric");

        let courier_bindings_total = IntCounterVec::new(
            Opts::new("courier_bindings_total", "Courier bind/unbind operations"),
            &["action"],
        )
        .expect("valid courier_bindings_total metric");

        registry
            .register(Box::new(dispatch_cycles_total.clone()))
            .expect("register dispatch_cycles_total");
        registry
            .register(Box::new(dispatch_cycle_seconds.clone()))
            .expect("register dispatch_cycle_seconds");
        registry
            .register(Box::new(orders_dispatched_total.clone()))
            .expect("register orders_dispatched_total");
        registry
            .register(Box::new(pending_orders.clone()))
            .expect("register pending_orders");
        registry
            .register(Box::new(courier_bindings_total.clone()))
            .expect("register courier_bindings_total");

        Self {
            registry,
            dispatch_cycles_total,
            dispatch_cycle_seconds,
            orders_dispatched_total,
            pending_orders,
            courier_bindings_total,
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
