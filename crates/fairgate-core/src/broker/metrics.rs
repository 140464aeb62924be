use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::KeyValue;

/// OTel instruments for the gateway and scheduler. Created once at startup
/// and shared by the broker and the HTTP gates.
pub struct Metrics {
    pub items_enqueued: Counter<u64>,
    pub items_dequeued: Counter<u64>,
    pub items_dead_lettered: Counter<u64>,
    pub scheduler_rounds: Counter<u64>,
    pub scheduler_empty_rounds: Counter<u64>,
    pub queue_depth: Gauge<u64>,
    pub deficit: Gauge<u64>,
    pub requests_deferred: Counter<u64>,
    pub admission_fail_open: Counter<u64>,
    pub idempotency_replays: Counter<u64>,
    pub integrity_failures: Counter<u64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create metrics from the global meter provider. If no meter provider
    /// is installed, the instruments are no-op.
    pub fn new() -> Self {
        let meter = opentelemetry::global::meter("fairgate");
        Self::from_meter(&meter)
    }

    /// Create metrics from a specific meter.
    pub fn from_meter(meter: &Meter) -> Self {
        Self {
            items_enqueued: meter
                .u64_counter("fairgate.items.enqueued")
                .with_description("Total items appended to queues")
                .build(),
            items_dequeued: meter
                .u64_counter("fairgate.items.dequeued")
                .with_description("Total items handed out by the scheduler")
                .build(),
            items_dead_lettered: meter
                .u64_counter("fairgate.items.dead_lettered")
                .with_description("Undecodable items moved out of their queue")
                .build(),
            scheduler_rounds: meter
                .u64_counter("fairgate.scheduler.rounds")
                .with_description("Dequeue rounds executed")
                .build(),
            scheduler_empty_rounds: meter
                .u64_counter("fairgate.scheduler.empty_rounds")
                .with_description("Dequeue rounds where no queue could afford its head item")
                .build(),
            queue_depth: meter
                .u64_gauge("fairgate.queue.depth")
                .with_description("Items currently resident in a queue")
                .build(),
            deficit: meter
                .u64_gauge("fairgate.scheduler.deficit")
                .with_description("Current DRR deficit per queue")
                .build(),
            requests_deferred: meter
                .u64_counter("fairgate.requests.deferred")
                .with_description("Requests deferred by backpressure")
                .build(),
            admission_fail_open: meter
                .u64_counter("fairgate.admission.fail_open")
                .with_description("Admission checks accepted because the store was unreachable")
                .build(),
            idempotency_replays: meter
                .u64_counter("fairgate.idempotency.replays")
                .with_description("Responses replayed from idempotency records")
                .build(),
            integrity_failures: meter
                .u64_counter("fairgate.integrity.failures")
                .with_description("Requests rejected by the integrity check")
                .build(),
        }
    }

    pub fn record_enqueue(&self, queue: &str) {
        self.items_enqueued.add(1, &[queue_attr(queue)]);
    }

    pub fn record_dequeue(&self, queue: &str, deficit: u64) {
        self.items_dequeued.add(1, &[queue_attr(queue)]);
        self.deficit.record(deficit, &[queue_attr(queue)]);
    }

    pub fn record_dead_letter(&self, queue: &str) {
        self.items_dead_lettered.add(1, &[queue_attr(queue)]);
    }

    pub fn record_round(&self, served: bool) {
        self.scheduler_rounds.add(1, &[]);
        if !served {
            self.scheduler_empty_rounds.add(1, &[]);
        }
    }

    pub fn set_queue_depth(&self, queue: &str, depth: u64) {
        self.queue_depth.record(depth, &[queue_attr(queue)]);
    }

    pub fn set_deficit(&self, queue: &str, deficit: u64) {
        self.deficit.record(deficit, &[queue_attr(queue)]);
    }

    pub fn record_deferred(&self, queue: &str) {
        self.requests_deferred.add(1, &[queue_attr(queue)]);
    }

    pub fn record_fail_open(&self, queue: &str) {
        self.admission_fail_open.add(1, &[queue_attr(queue)]);
    }

    pub fn record_replay(&self) {
        self.idempotency_replays.add(1, &[]);
    }

    pub fn record_integrity_failure(&self, reason: &'static str) {
        self.integrity_failures
            .add(1, &[KeyValue::new("reason", reason)]);
    }
}

fn queue_attr(queue: &str) -> KeyValue {
    KeyValue::new("queue", queue.to_string())
}
