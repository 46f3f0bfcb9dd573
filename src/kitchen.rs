use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::data::{ALL_SHELVES, Config, Order, Shelf, Temp};
use crate::signal::Signal;
use crate::state::OrderState;

// Transition kinds carried in the `status` field of the event stream.
pub const NEW: &str = "new";
pub const DELIVERED: &str = "delivered";
pub const PICKUP_CANCELED: &str = "pickup_canceled";
pub const UNHEALTHY: &str = "unhealthy";
pub const RECOVERED: &str = "recovered";
pub const DISCARDED: &str = "discarded";

/// Entry with the smallest metric. Ties go to the first entry seen, which is
/// the smallest order number since callers iterate the order table in order.
fn min_value(entries: impl IntoIterator<Item = (usize, f64)>) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;

    for (num, val) in entries {
        match best {
            Some((_, min)) if val >= min => {}
            _ => best = Some((num, val)),
        }
    }

    best
}

/// Live occupancy per shelf, derived from the order table on every use.
struct ShelfCounts(HashMap<Shelf, usize>);

impl ShelfCounts {
    fn of(&self, shelf: Shelf) -> usize {
        self.0.get(&shelf).copied().unwrap_or(0)
    }

    fn has_room(&self, shelf: Shelf, config: &Config) -> bool {
        self.of(shelf) < config.capacity.of(shelf)
    }
}

/// Everything the global lock protects: the order table and the per-order
/// courier cancellation signals.
#[derive(Default)]
struct KitchenState {
    orders: BTreeMap<usize, OrderState>,
    signals: HashMap<usize, Arc<Signal>>,
}

impl KitchenState {
    /// Open orders on any shelf except waste.
    fn active_orders(&self) -> Vec<usize> {
        self.orders
            .iter()
            .filter(|(_, state)| !state.closed() && state.current_shelf() != Shelf::Waste)
            .map(|(num, _)| *num)
            .collect()
    }

    /// Open orders sitting on overflow, with the eviction metric.
    fn overflow_candidates(&self) -> Vec<(usize, f64)> {
        self.orders
            .iter()
            .filter(|(_, state)| state.current_shelf() == Shelf::Overflow && !state.closed())
            .map(|(num, state)| (*num, state.pickup_ttl()))
            .collect()
    }

    /// Snapshot of shelf occupancy. Open orders count toward their current
    /// shelf; wasted orders count toward waste forever.
    fn counts(&self) -> ShelfCounts {
        let mut counts: HashMap<Shelf, usize> = HashMap::new();

        for state in self.orders.values() {
            let shelf = state.current_shelf();
            if shelf == Shelf::Waste {
                *counts.entry(Shelf::Waste).or_default() += 1;
            } else if !state.closed() {
                *counts.entry(shelf).or_default() += 1;
            }
        }

        ShelfCounts(counts)
    }

    /// Wake the order's courier so it stops waiting for a pickup that will
    /// never happen.
    fn terminate_delivery(&self, order_num: usize) {
        if let Some(signal) = self.signals.get(&order_num) {
            signal.set();
            debug!(order = order_num, "sent cancellation to courier");
        }
    }

    /// Overflow orders whose home shelf has room, keyed by how utilized that
    /// home shelf is.
    fn find_recoverable(
        &self,
        config: &Config,
        counts: &ShelfCounts,
        order_nums: impl IntoIterator<Item = usize>,
    ) -> Vec<(usize, f64)> {
        order_nums
            .into_iter()
            .filter_map(|num| {
                let home = self.orders[&num].order.temp.shelf();
                let capacity = config.capacity.of(home);
                if counts.of(home) < capacity {
                    Some((num, counts.of(home) as f64 / capacity as f64))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Move at most one overflow order back to its home shelf, preferring
    /// the home shelf with the most free space. Returns how many moved.
    fn recover_from_overflow(&mut self, config: &Config) -> usize {
        let counts = self.counts();
        let overflow_orders = self.overflow_candidates().into_iter().map(|(num, _)| num);
        let recoverable = self.find_recoverable(config, &counts, overflow_orders);

        match min_value(recoverable) {
            Some((order_num, _)) => {
                let state = self
                    .orders
                    .get_mut(&order_num)
                    .expect("recoverable order vanished");
                let home = state.order.temp.shelf();
                state.move_to(home, None);
                warn!(
                    order = order_num,
                    status = RECOVERED,
                    shelf = %home,
                    "moved back from overflow to home shelf"
                );
                1
            }
            None => 0,
        }
    }

    /// Pick the shelf for a new order of the desired temperature. When every
    /// shelf is full this mutates other orders to free an overflow slot:
    /// recovery first, otherwise eviction of the least viable order.
    fn make_room(&mut self, config: &Config, desired: Temp) -> Shelf {
        let counts = self.counts();
        let desired_shelf = desired.shelf();

        if counts.has_room(desired_shelf, config) {
            return desired_shelf;
        }

        if counts.has_room(Shelf::Overflow, config) {
            warn!(
                shelf = %desired_shelf,
                used = counts.of(desired_shelf),
                capacity = config.capacity.of(desired_shelf),
                "shelf is full; using overflow"
            );
            return Shelf::Overflow;
        }

        warn!(
            used = counts.of(Shelf::Overflow),
            capacity = config.capacity.of(Shelf::Overflow),
            "overflow shelf is full"
        );

        if self.recover_from_overflow(config) == 0 {
            let Some((order_num, pickup_ttl)) = min_value(self.overflow_candidates()) else {
                // counts said overflow is full, yet nothing there can move
                panic!("overflow shelf reads full but holds no open orders");
            };

            error!(
                order = order_num,
                status = DISCARDED,
                pickup_ttl,
                "no space anywhere; discarding the least viable overflow order"
            );

            let state = self
                .orders
                .get_mut(&order_num)
                .expect("eviction candidate vanished");
            state.move_to_waste(None);
            self.terminate_delivery(order_num);
        }

        Shelf::Overflow
    }

    /// Waste every open order whose value dropped to zero or below. Returns
    /// (orders checked, orders wasted).
    fn remove_unhealthy(&mut self) -> (usize, usize) {
        let active = self.active_orders();
        let checked = active.len();
        let mut expired = 0;

        for order_num in active {
            let state = self
                .orders
                .get_mut(&order_num)
                .expect("active order vanished");
            let val = state.value();

            if val <= 0.0 {
                error!(
                    order = order_num,
                    status = UNHEALTHY,
                    age = state.total_age(),
                    value = val,
                    "order perished on the shelf"
                );
                state.move_to_waste(Some(val));
                expired += 1;
                self.terminate_delivery(order_num);
            }
        }

        (checked, expired)
    }

    /// Dump current shelf occupancy at debug level.
    fn snapshot(&self, config: &Config) {
        let counts = self.counts();

        for shelf in ALL_SHELVES {
            let count = counts.of(shelf);
            if shelf == Shelf::Waste {
                debug!("SNAPSHOT: shelf {:<9} {:<4} {}/UNLIMITED", shelf, "--->", count);
            } else {
                let capacity = config.capacity.of(shelf);
                let status = if count == capacity { "FULL" } else { "OK" };
                debug!("SNAPSHOT: shelf {:<9} {:<4} {}/{}", shelf, status, count, capacity);
            }
        }
    }
}

/// Final counters for one simulation run.
#[derive(Debug)]
pub struct Summary {
    pub total: usize,
    pub delivered: usize,
    pub wasted: usize,
    pub unfinished: usize,
}

/// Drives the whole simulation: intake at a fixed rate, one fulfillment
/// thread per order, one courier thread per order, and a background cleanup
/// sweeper, all sharing one lock over the order table.
pub struct Kitchen {
    orders: Vec<Arc<Order>>,
    config: Config,
    state: Mutex<KitchenState>,
    couriers: Mutex<Vec<JoinHandle<()>>>,
    cleanup_signal: Signal,
}

impl Kitchen {
    pub fn new(orders: Vec<Order>, config: Config) -> Self {
        Self {
            orders: orders.into_iter().map(Arc::new).collect(),
            config,
            state: Mutex::new(KitchenState::default()),
            couriers: Mutex::new(Vec::new()),
            cleanup_signal: Signal::new(),
        }
    }

    /// Delay between two consecutive intake submissions.
    fn input_delay(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.config.intake_orders_per_sec))
    }

    /// Submit every order at the configured rate, one fulfillment thread per
    /// order. Returns without waiting for fulfillment to finish.
    fn accept_orders(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let delay = self.input_delay();
        info!(delay_sec = delay.as_secs_f64(), "start accepting orders");

        let mut handles = Vec::with_capacity(self.orders.len());

        for (order_num, order) in self.orders.iter().enumerate() {
            thread::sleep(delay);

            let kitchen = Arc::clone(self);
            let order = Arc::clone(order);
            handles.push(thread::spawn(move || {
                kitchen.fulfill_order(order_num, order);
            }));
        }

        handles
    }

    /// Shelve one incoming order and dispatch its courier.
    fn fulfill_order(self: &Arc<Self>, order_num: usize, order: Arc<Order>) {
        let (delay, signal) = {
            let mut state = self.state.lock().unwrap();

            let shelf = state.make_room(&self.config, order.temp);

            let delay = rand::rng()
                .random_range(self.config.pickup_min_sec..=self.config.pickup_max_sec);

            state
                .orders
                .insert(order_num, OrderState::new(order, shelf, delay));

            info!(
                order = order_num,
                status = NEW,
                shelf = %shelf,
                pickup_sec = delay,
                "order shelved"
            );
            state.snapshot(&self.config);

            // registered before the courier exists so an eviction racing the
            // spawn still has a signal to set
            let signal = Arc::new(Signal::new());
            state.signals.insert(order_num, Arc::clone(&signal));

            (delay, signal)
        };

        let kitchen = Arc::clone(self);
        let courier = thread::spawn(move || kitchen.dispatch_order(order_num, delay, &signal));
        self.couriers.lock().unwrap().push(courier);
    }

    /// Courier: wait out the pickup delay (or an early cancellation), then
    /// finalize the order.
    fn dispatch_order(&self, order_num: usize, delay: u64, signal: &Signal) {
        debug!(order = order_num, pickup_sec = delay, "courier dispatched");

        signal.wait_timeout(Duration::from_secs(delay));

        let mut state = self.state.lock().unwrap();
        let order_state = state
            .orders
            .get_mut(&order_num)
            .expect("courier for unknown order");

        if order_state.current_shelf() == Shelf::Waste {
            error!(
                order = order_num,
                status = PICKUP_CANCELED,
                age = order_state.total_age(),
                "order was wasted before pickup"
            );
        } else {
            let value = order_state.close(None, None);
            info!(
                order = order_num,
                status = DELIVERED,
                age = order_state.total_age(),
                value,
                "order picked up"
            );
        }
    }

    /// Background sweep: waste perished orders and pull one overflow order
    /// back to its home shelf when space allows.
    fn cleanup(&self) {
        let delay = Duration::from_secs_f64(self.config.cleanup_delay);

        loop {
            self.cleanup_signal.wait_timeout(delay);

            {
                let mut state = self.state.lock().unwrap();

                let (checked, expired) = state.remove_unhealthy();
                if expired > 0 {
                    debug!(checked, expired, "cleanup pass wasted orders");
                }

                state.recover_from_overflow(&self.config);
            }

            if self.cleanup_signal.is_set() {
                break;
            }
        }
    }

    /// Run the simulation to completion: sweeper in the background, intake
    /// on the calling thread, then wait for every courier before reporting.
    pub fn run(self: &Arc<Self>) -> Summary {
        info!(config = ?self.config, "kitchen configuration");
        warn!(total = self.orders.len(), "start kitchen");

        let sweeper = {
            let kitchen = Arc::clone(self);
            thread::spawn(move || kitchen.cleanup())
        };

        let fulfillments = self.accept_orders();
        for handle in fulfillments {
            handle.join().expect("fulfillment thread panicked");
        }

        // every fulfillment has registered its courier by now
        let couriers = std::mem::take(&mut *self.couriers.lock().unwrap());
        for handle in couriers {
            handle.join().expect("courier thread panicked");
        }

        self.cleanup_signal.set();
        sweeper.join().expect("cleanup thread panicked");

        let summary = self.summary();
        warn!(
            total = summary.total,
            delivered = summary.delivered,
            unfinished = summary.unfinished,
            wasted = summary.wasted,
            "stop kitchen"
        );
        summary
    }

    fn summary(&self) -> Summary {
        let state = self.state.lock().unwrap();

        let wasted = state
            .orders
            .values()
            .filter(|s| s.current_shelf() == Shelf::Waste)
            .count();
        let unfinished = state.orders.values().filter(|s| !s.closed()).count();
        let delivered = state
            .orders
            .values()
            .filter(|s| s.closed() && s.current_shelf() != Shelf::Waste)
            .count();

        Summary {
            total: self.orders.len(),
            delivered,
            wasted,
            unfinished,
        }
    }
}
