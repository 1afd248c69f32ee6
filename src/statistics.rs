use std::sync::atomic::{AtomicUsize, Ordering};

/// Integrated Prometheus metrics exporter, mirroring the counters this
/// module tracks with plain atomics. Only compiled in with the
/// `prometheus-metrics` feature.
#[cfg(feature = "prometheus-metrics")]
pub mod prometheus {
    use std::sync::LazyLock;

    use anyhow::Result;
    use prometheus::{Encoder, IntCounter, IntGauge, TextEncoder, register_int_counter, register_int_gauge};

    pub static METRICS: LazyLock<Metrics> = LazyLock::new(|| Metrics::new().expect("failed to register metrics"));

    pub struct Metrics {
        pub num_clients: IntGauge,
        pub client_connections: IntCounter,
        pub rejected_connections: IntCounter,
        pub bad_requests: IntCounter,
    }

    impl Metrics {
        pub fn new() -> Result<Self> {
            Ok(Self {
                num_clients: register_int_gauge!("ntrip_caster_num_clients", "currently admitted clients")?,
                client_connections: register_int_counter!(
                    "ntrip_caster_client_connections_total",
                    "total admitted connections"
                )?,
                rejected_connections: register_int_counter!(
                    "ntrip_caster_rejected_connections_total",
                    "total connections rejected during admission"
                )?,
                bad_requests: register_int_counter!(
                    "ntrip_caster_bad_requests_total",
                    "total connections closed for a malformed handshake"
                )?,
            })
        }
    }

    pub fn generate_metrics(buf: &mut Vec<u8>) -> Result<()> {
        TextEncoder::new().encode(&prometheus::gather(), buf)?;
        Ok(())
    }
}

/// Process-wide counters (spec's Global State: `num_clients` plus the
/// per-hour connection/rejection tallies), always maintained regardless of
/// whether the `prometheus-metrics` feature is compiled in.
#[derive(Default)]
pub struct Statistics {
    num_clients: AtomicUsize,
    client_connections: AtomicUsize,
    rejected_connections: AtomicUsize,
    bad_requests: AtomicUsize,
}

impl Statistics {
    pub fn client_admitted(&self) {
        self.num_clients.fetch_add(1, Ordering::Relaxed);
        self.client_connections.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "prometheus-metrics")]
        {
            self::prometheus::METRICS.num_clients.inc();
            self::prometheus::METRICS.client_connections.inc();
        }
    }

    pub fn client_released(&self) {
        self.num_clients.fetch_sub(1, Ordering::Relaxed);

        #[cfg(feature = "prometheus-metrics")]
        {
            self::prometheus::METRICS.num_clients.dec();
        }
    }

    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "prometheus-metrics")]
        {
            self::prometheus::METRICS.rejected_connections.inc();
        }
    }

    pub fn bad_request(&self) {
        self.bad_requests.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "prometheus-metrics")]
        {
            self::prometheus::METRICS.bad_requests.inc();
        }
    }

    pub fn num_clients(&self) -> usize {
        self.num_clients.load(Ordering::Relaxed)
    }

    pub fn client_connections(&self) -> usize {
        self.client_connections.load(Ordering::Relaxed)
    }

    pub fn rejected_connections(&self) -> usize {
        self.rejected_connections.load(Ordering::Relaxed)
    }
}
