use std::sync::Arc;
use std::time::Instant;

use crate::data::{Order, Shelf};

/// One stay on one shelf. `removed_at` and `current_value` are set once,
/// when the segment closes.
#[derive(Debug, Clone)]
pub struct ShelfHistory {
    pub shelf: Shelf,
    pub added_at: Instant,
    pub removed_at: Option<Instant>,
    pub current_value: Option<f64>,
}

impl ShelfHistory {
    pub fn new(shelf: Shelf) -> Self {
        Self::at(shelf, Instant::now())
    }

    fn at(shelf: Shelf, added_at: Instant) -> Self {
        Self {
            shelf,
            added_at,
            removed_at: None,
            current_value: None,
        }
    }
}

/// Per-order mutable state: the order itself, where it has been shelved so
/// far, and the pickup delay drawn once at intake.
#[derive(Debug)]
pub struct OrderState {
    pub order: Arc<Order>,
    pub history: Vec<ShelfHistory>,
    pub pickup_sec: u64,
    pub last_value: Option<f64>,
}

impl OrderState {
    pub fn new(order: Arc<Order>, shelf: Shelf, pickup_sec: u64) -> Self {
        Self {
            order,
            history: vec![ShelfHistory::new(shelf)],
            pickup_sec,
            last_value: None,
        }
    }

    fn last(&self) -> &ShelfHistory {
        self.history.last().expect("order history is never empty")
    }

    fn last_mut(&mut self) -> &mut ShelfHistory {
        self.history.last_mut().expect("order history is never empty")
    }

    pub fn current_shelf(&self) -> Shelf {
        self.last().shelf
    }

    pub fn closed(&self) -> bool {
        self.last().removed_at.is_some()
    }

    /// Close the last history segment. Idempotent: a second call leaves the
    /// recorded timestamp and value untouched. Defaults to `now` and the
    /// freshly computed value. Returns the recorded value.
    pub fn close(&mut self, value: Option<f64>, removed_at: Option<Instant>) -> f64 {
        if self.closed() {
            return self.last_value.unwrap_or_else(|| self.value());
        }

        let ts = removed_at.unwrap_or_else(Instant::now);
        self.last_mut().removed_at = Some(ts);

        // value() reads the removed_at just stored, so the recorded value
        // matches the recorded timestamp
        let val = value.unwrap_or_else(|| self.value());

        let seg = self.last_mut();
        seg.current_value = Some(val);
        self.last_value = Some(val);
        val
    }

    /// Close the current segment and open the next one. A single timestamp
    /// read serves both ends of the transition, so adjacent segments line up
    /// exactly.
    pub fn move_to(&mut self, shelf: Shelf, value: Option<f64>) -> Instant {
        let now = Instant::now();
        self.close(value, Some(now));
        self.history.push(ShelfHistory::at(shelf, now));
        now
    }

    /// Move to the waste shelf and close the new segment immediately. The
    /// zero-length waste segment inherits the value recorded when the prior
    /// segment closed. No-op if the order already sits on waste.
    pub fn move_to_waste(&mut self, value: Option<f64>) {
        if self.current_shelf() == Shelf::Waste {
            return;
        }

        let now = self.move_to(Shelf::Waste, value);
        let inherited = self.history[self.history.len() - 2].current_value;

        let seg = self.last_mut();
        seg.removed_at = Some(now);
        seg.current_value = inherited;
        self.last_value = inherited;
    }

    fn age_of(&self, seg: &ShelfHistory, now: Instant) -> f64 {
        seg.removed_at
            .unwrap_or(now)
            .duration_since(seg.added_at)
            .as_secs_f64()
    }

    /// Decay is 1x on the order's home shelf, 2x anywhere else (overflow and
    /// waste included).
    fn rate_on(&self, shelf: Shelf) -> f64 {
        let modifier = if shelf == self.order.temp.shelf() {
            1.0
        } else {
            2.0
        };
        self.order.decay_rate * modifier
    }

    pub fn total_age(&self) -> f64 {
        let now = Instant::now();
        self.history.iter().map(|seg| self.age_of(seg, now)).sum()
    }

    /// Order value over the whole shelf history. May go negative; callers
    /// treat <= 0 as perished.
    pub fn value(&self) -> f64 {
        let now = Instant::now();
        let decayed: f64 = self
            .history
            .iter()
            .map(|seg| self.age_of(seg, now) * self.rate_on(seg.shelf))
            .sum();

        1.0 - decayed / f64::from(self.order.shelf_life)
    }

    /// Seconds left on the current shelf before the value reaches zero.
    ///
    /// a1*d1 + a2*d2 + a3*d3 == shelfLife, so
    /// a3 (the ttl) = (shelfLife - a1*d1 - a2*d2) / d3
    pub fn ttl(&self) -> f64 {
        let now = Instant::now();
        let (last, prior) = self
            .history
            .split_last()
            .expect("order history is never empty");

        let spent: f64 = prior
            .iter()
            .map(|seg| self.age_of(seg, now) * self.rate_on(seg.shelf))
            .sum();

        (f64::from(self.order.shelf_life) - spent) / self.rate_on(last.shelf)
    }

    /// Margin between the order's time-to-die and the worst-case remaining
    /// pickup time. Negative means the courier will be too late.
    pub fn pickup_ttl(&self) -> f64 {
        let time_to_pickup = self.pickup_sec as f64 - self.total_age();
        self.ttl() - time_to_pickup
    }
}
