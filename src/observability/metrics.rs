use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub location_updates_total: IntCounterVec,
    pub durable_writes_total: IntCounterVec,
    pub ingest_latency_seconds: HistogramVec,
    pub open_connections: IntGaugeVec,
    pub chat_messages_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let location_updates_total = IntCounterVec::new(
            Opts::new("location_updates_total", "Inbound location messages by outcome"),
            &["outcome"],
        )
        .expect("valid location_updates_total metric");

        let durable_writes_total = IntCounterVec::new(
            Opts::new("durable_writes_total", "Durable store writes by sink and outcome"),
            &["sink", "outcome"],
        )
        .expect("valid durable_writes_total metric");

        let ingest_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "ingest_latency_seconds",
                "Latency of location ingestion in seconds",
            ),
            &["outcome"],
        )
        .expect("valid ingest_latency_seconds metric");

        let open_connections = IntGaugeVec::new(
            Opts::new("open_connections", "Open websocket connections by stream"),
            &["stream"],
        )
        .expect("valid open_connections metric");

        let chat_messages_total = IntCounterVec::new(
            Opts::new("chat_messages_total", "Persisted chat messages by sender role"),
            &["sender_role"],
        )
        .expect("valid chat_messages_total metric");

        registry
            .register(Box::new(location_updates_total.clone()))
            .expect("register location_updates_total");
        registry
            .register(Box::new(durable_writes_total.clone()))
            .expect("register durable_writes_total");
        registry
            .register(Box::new(ingest_latency_seconds.clone()))
            .expect("register ingest_latency_seconds");
        registry
            .register(Box::new(open_connections.clone()))
            .expect("register open_connections");
        registry
            .register(Box::new(chat_messages_total.clone()))
            .expect("register chat_messages_total");

        Self {
            registry,
            location_updates_total,
            durable_writes_total,
            ingest_latency_seconds,
            open_connections,
            chat_messages_total,
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
