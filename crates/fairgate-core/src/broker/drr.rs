use std::collections::HashMap;

/// Deficit Round Robin bookkeeping across named queues.
///
/// Each tracked queue carries a non-negative deficit ("service credit").
/// A visit by the round-robin pass credits the queue with `quantum`; serving
/// an item of weight `w` requires a deficit of at least `w` and consumes
/// exactly `w`. The pass starts at the queue after the last one served, so
/// with `n` tracked queues every queue is visited at least once every `n`
/// passes.
///
/// Owned by the single scheduler task; no internal synchronization.
pub struct DeficitTable {
    /// Tracked queues in round-robin order (first-observation order).
    order: Vec<String>,
    deficits: HashMap<String, u64>,
    /// Index in `order` where the next pass begins.
    cursor: usize,
    quantum: u32,
}

impl DeficitTable {
    pub fn new(quantum: u32) -> Self {
        assert!(quantum > 0, "DRR quantum must be > 0");
        Self {
            order: Vec::new(),
            deficits: HashMap::new(),
            cursor: 0,
            quantum,
        }
    }

    pub fn quantum(&self) -> u32 {
        self.quantum
    }

    /// Start tracking a queue with zero deficit. Returns `false` (and leaves
    /// the deficit untouched) if the queue is already tracked.
    pub fn track(&mut self, queue: &str) -> bool {
        if self.deficits.contains_key(queue) {
            return false;
        }
        self.deficits.insert(queue.to_string(), 0);
        self.order.push(queue.to_string());
        true
    }

    pub fn is_tracked(&self, queue: &str) -> bool {
        self.deficits.contains_key(queue)
    }

    /// Tracked queues in the order the next pass visits them.
    pub fn round_order(&self) -> Vec<String> {
        let len = self.order.len();
        (0..len)
            .map(|i| self.order[(self.cursor + i) % len].clone())
            .collect()
    }

    /// Grant one quantum of credit. Returns the new deficit, or 0 for an
    /// untracked queue.
    pub fn credit(&mut self, queue: &str) -> u64 {
        match self.deficits.get_mut(queue) {
            Some(d) => {
                *d = d.saturating_add(u64::from(self.quantum));
                *d
            }
            None => 0,
        }
    }

    /// Serve an item of `weight` from `queue` if its deficit covers it:
    /// subtracts the weight and moves the cursor past the queue. Returns
    /// `false` without changes otherwise.
    pub fn try_consume(&mut self, queue: &str, weight: u32) -> bool {
        let Some(d) = self.deficits.get_mut(queue) else {
            return false;
        };
        let weight = u64::from(weight);
        if *d < weight {
            return false;
        }
        *d -= weight;

        if let Some(idx) = self.order.iter().position(|q| q == queue) {
            self.cursor = (idx + 1) % self.order.len();
        }
        true
    }

    /// Give back `weight` consumed by an item that was never delivered.
    pub fn refund(&mut self, queue: &str, weight: u32) {
        if let Some(d) = self.deficits.get_mut(queue) {
            *d = d.saturating_add(u64::from(weight));
        }
    }

    /// Drop accumulated credit, e.g. when the queue is found empty.
    pub fn reset(&mut self, queue: &str) {
        if let Some(d) = self.deficits.get_mut(queue) {
            *d = 0;
        }
    }

    pub fn deficit(&self, queue: &str) -> Option<u64> {
        self.deficits.get(queue).copied()
    }

    /// Tracked queues in first-observation order.
    pub fn queue_names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
