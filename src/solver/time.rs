use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeState {
    pub value: f64,
    pub delta_t: f64,
    pub time_index: i64,
}

/// Simulation clock shared by every field on a mesh.
///
/// Fields compare their own `time_index` against [`Time::time_index`] to decide
/// whether old-time levels must be pushed down.
#[derive(Debug)]
pub struct Time {
    state: RwLock<TimeState>,
}

impl Time {
    pub fn new(start: f64, delta_t: f64) -> Self {
        Self {
            state: RwLock::new(TimeState {
                value: start,
                delta_t,
                time_index: 0,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, TimeState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, TimeState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> TimeState {
        *self.read()
    }

    pub fn value(&self) -> f64 {
        self.read().value
    }

    pub fn delta_t(&self) -> f64 {
        self.read().delta_t
    }

    pub fn time_index(&self) -> i64 {
        self.read().time_index
    }

    pub fn set_delta_t(&self, delta_t: f64) {
        self.write().delta_t = delta_t;
    }

    /// Advances by one step of `delta_t`.
    pub fn increment(&self) -> TimeState {
        let mut state = self.write();
        state.value += state.delta_t;
        state.time_index += 1;
        log::debug!("time = {} (index {})", state.value, state.time_index);
        *state
    }

    pub fn set_time(&self, value: f64, time_index: i64) {
        let mut state = self.write();
        state.value = value;
        state.time_index = time_index;
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_advances_value_and_index() {
        let time = Time::new(1.0, 0.5);
        let state = time.increment();
        assert_eq!(state.value, 1.5);
        assert_eq!(state.time_index, 1);
        time.set_time(10.0, 7);
        assert_eq!(time.value(), 10.0);
        assert_eq!(time.time_index(), 7);
    }
}
