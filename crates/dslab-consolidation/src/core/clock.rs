//! Time source and logging context.

use std::cell::Cell;
use std::rc::Rc;

/// Monotonically non-decreasing time source, usually backed by the simulation clock.
pub trait Clock {
    fn time(&self) -> f64;
}

/// Clock whose time is advanced explicitly by its owner.
#[derive(Debug, Default)]
pub struct ManualClock {
    time: Cell<f64>,
}

impl ManualClock {
    pub fn new(time: f64) -> Self {
        Self { time: Cell::new(time) }
    }

    /// Sets the current time. Moving the clock backwards is ignored.
    pub fn set_time(&self, time: f64) {
        if time > self.time.get() {
            self.time.set(time);
        }
    }

    pub fn advance(&self, delta: f64) {
        self.set_time(self.time.get() + delta);
    }
}

impl Clock for ManualClock {
    fn time(&self) -> f64 {
        self.time.get()
    }
}

/// Named component context used for logging, analogous to a simulation component context.
#[derive(Clone)]
pub struct PlanningContext {
    name: String,
    clock: Rc<dyn Clock>,
}

impl PlanningContext {
    pub fn new(name: &str, clock: Rc<dyn Clock>) -> Self {
        Self {
            name: name.to_string(),
            clock,
        }
    }

    /// Creates a context for a child component sharing the same clock.
    pub fn child(&self, name: &str) -> Self {
        Self::new(name, self.clock.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn time(&self) -> f64 {
        self.clock.time()
    }

    pub fn clock(&self) -> Rc<dyn Clock> {
        self.clock.clone()
    }
}
