//! User-supplied callbacks invoked from the dispatcher task.
//!
//! A panic inside a callback is caught and logged at `warn` rather than
//! allowed to unwind through the dispatcher — one misbehaving callback
//! should not take the whole connection down.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::ConnectionError;

type ConnectionChangedFn = dyn Fn(u16, bool) + Send + Sync;
type VariablesReceivedFn = dyn Fn(u16) + Send + Sync;
type ExecutionStateChangedFn = dyn Fn(u16, u16, u16) + Send + Sync;
type UserEventFn = dyn Fn(u16, u16, &[u16]) + Send + Sync;
type CommErrorFn = dyn Fn(&ConnectionError) + Send + Sync;

/// Callback registration for a [`crate::Connection`]. Every field is
/// optional; an unset callback is simply not invoked.
#[derive(Default)]
pub struct Callbacks {
    on_connection_changed: Option<Box<ConnectionChangedFn>>,
    on_variables_received: Option<Box<VariablesReceivedFn>>,
    on_execution_state_changed: Option<Box<ExecutionStateChangedFn>>,
    on_user_event: Option<Box<UserEventFn>>,
    on_comm_error: Option<Box<CommErrorFn>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Callbacks::default()
    }

    pub fn with_on_connection_changed(
        mut self,
        f: impl Fn(u16, bool) + Send + Sync + 'static,
    ) -> Self {
        self.on_connection_changed = Some(Box::new(f));
        self
    }

    pub fn with_on_variables_received(
        mut self,
        f: impl Fn(u16) + Send + Sync + 'static,
    ) -> Self {
        self.on_variables_received = Some(Box::new(f));
        self
    }

    pub fn with_on_execution_state_changed(
        mut self,
        f: impl Fn(u16, u16, u16) + Send + Sync + 'static,
    ) -> Self {
        self.on_execution_state_changed = Some(Box::new(f));
        self
    }

    pub fn with_on_user_event(
        mut self,
        f: impl Fn(u16, u16, &[u16]) + Send + Sync + 'static,
    ) -> Self {
        self.on_user_event = Some(Box::new(f));
        self
    }

    pub fn with_on_comm_error(mut self, f: impl Fn(&ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_comm_error = Some(Box::new(f));
        self
    }

    pub(crate) fn fire_connection_changed(&self, node_id: u16, up: bool) {
        if let Some(f) = &self.on_connection_changed {
            self.guard("on_connection_changed", || f(node_id, up));
        }
    }

    pub(crate) fn fire_variables_received(&self, node_id: u16) {
        if let Some(f) = &self.on_variables_received {
            self.guard("on_variables_received", || f(node_id));
        }
    }

    pub(crate) fn fire_execution_state_changed(&self, node_id: u16, pc: u16, flags: u16) {
        if let Some(f) = &self.on_execution_state_changed {
            self.guard("on_execution_state_changed", || f(node_id, pc, flags));
        }
    }

    pub(crate) fn fire_user_event(&self, node_id: u16, id: u16, arg: &[u16]) {
        if let Some(f) = &self.on_user_event {
            self.guard("on_user_event", || f(node_id, id, arg));
        }
    }

    pub(crate) fn fire_comm_error(&self, error: &ConnectionError) {
        if let Some(f) = &self.on_comm_error {
            self.guard("on_comm_error", || f(error));
        }
    }

    fn guard(&self, name: &str, f: impl FnOnce()) {
        if catch_unwind(AssertUnwindSafe(f)).is_err() {
            tracing::warn!(callback = name, "callback panicked, continuing dispatch");
        }
    }
}
