//! A cheap monotonic clock shared by every task, so `RemoteNode::last_msg_time`
//! and liveness comparisons all read from the same origin.

use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct Clock(Arc<Instant>);

impl Clock {
    pub fn start() -> Self {
        Clock(Arc::new(Instant::now()))
    }

    pub fn now(&self) -> f64 {
        self.0.elapsed().as_secs_f64()
    }
}
