//! The node mirror: one `RemoteNode` per discovered robot.
//!
//! A `RemoteNode` owns the variable catalog, the word-indexed mirror of the
//! robot's named-variable memory, and the event/native-function catalogs
//! collected during the handshake. Every method here is a pure mutation of
//! in-memory state — no I/O, no locking. The caller (the session engine) is
//! responsible for serializing access with a single mutex, as described for
//! the dispatch path.

use std::collections::HashMap;

/// Errors raised by [`RemoteNode`]'s read/write surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    #[error("unknown variable name: {0}")]
    UnknownName(String),
    #[error("variable catalog is already complete, cannot add {0:?}")]
    CatalogComplete(String),
    #[error("index {index} out of range for variable {name} of size {size}")]
    IndexOutOfRange {
        name: String,
        index: usize,
        size: u16,
    },
    #[error("value array for {name} has length {got}, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: u16,
        got: usize,
    },
}

/// A named variable's position within the node's word-indexed memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSlot {
    pub name: String,
    pub offset: u16,
    pub size: u16,
}

/// A declared local event, as announced by `LOCAL_EVENT_DESCRIPTION`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEvent {
    pub name: String,
    pub description: String,
}

/// A declared native function, as announced by `NATIVE_FUNCTION_DESCRIPTION`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeFunction {
    pub name: String,
    pub description: String,
    pub arg_sizes: Vec<u16>,
}

/// Device identity fields populated by `DEVICE_INFO` (v6+ nodes only).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub rf_settings: Option<(u16, u16, u16)>,
}

/// One discovered robot: identity, capabilities, variable mirror, and
/// handshake/liveness bookkeeping.
#[derive(Debug, Clone)]
pub struct RemoteNode {
    pub node_id: u16,
    pub firmware_version: u16,
    pub device: DeviceIdentity,

    pub bytecode_size: u16,
    pub stack_size: u16,
    pub max_var_size: u16,
    pub num_named_var: u16,
    pub num_local_events: u16,
    pub num_native_fun: u16,

    named_variables: Vec<VariableSlot>,
    var_offset: HashMap<String, u16>,
    var_size: HashMap<String, u16>,
    var_total_size: u16,

    var_data: Vec<i16>,
    expected_var_end: u16,
    var_received: bool,

    pub local_events: Vec<LocalEvent>,
    pub native_functions: Vec<NativeFunction>,

    pub last_msg_time: f64,
    pub handshake_done: bool,
}

impl RemoteNode {
    /// Create a freshly discovered node (post-`NODE_PRESENT`, pre-handshake).
    pub fn new(node_id: u16, firmware_version: u16, now: f64) -> Self {
        RemoteNode {
            node_id,
            firmware_version,
            device: DeviceIdentity::default(),
            bytecode_size: 0,
            stack_size: 0,
            max_var_size: 0,
            num_named_var: 0,
            num_local_events: 0,
            num_native_fun: 0,
            named_variables: Vec::new(),
            var_offset: HashMap::new(),
            var_size: HashMap::new(),
            var_total_size: 0,
            var_data: Vec::new(),
            expected_var_end: 0,
            var_received: false,
            local_events: Vec::new(),
            native_functions: Vec::new(),
            last_msg_time: now,
            handshake_done: false,
        }
    }

    pub fn record_description(
        &mut self,
        bytecode_size: u16,
        stack_size: u16,
        max_var_size: u16,
        num_named_var: u16,
        num_local_events: u16,
        num_native_fun: u16,
    ) {
        self.bytecode_size = bytecode_size;
        self.stack_size = stack_size;
        self.max_var_size = max_var_size;
        self.num_named_var = num_named_var;
        self.num_local_events = num_local_events;
        self.num_native_fun = num_native_fun;
    }

    // ── Variable catalog ──────────────────────────────────────────────────

    /// Append a variable to the catalog, assigning it the current end offset.
    ///
    /// Fails with [`NodeError::CatalogComplete`] once `named_variables.len()`
    /// has already reached `num_named_var`.
    pub fn add_var(&mut self, name: &str, size: u16) -> Result<(), NodeError> {
        if self.named_variables.len() as u16 >= self.num_named_var {
            return Err(NodeError::CatalogComplete(name.to_string()));
        }
        let offset = self.var_total_size;
        self.named_variables.push(VariableSlot {
            name: name.to_string(),
            offset,
            size,
        });
        self.var_offset.insert(name.to_string(), offset);
        self.var_size.insert(name.to_string(), size);
        self.var_total_size += size;
        Ok(())
    }

    /// True once every named variable announced by `DESCRIPTION` has arrived.
    pub fn catalog_complete(&self) -> bool {
        self.named_variables.len() as u16 >= self.num_named_var
    }

    pub fn var_total_size(&self) -> u16 {
        self.var_total_size
    }

    pub fn named_variables(&self) -> &[VariableSlot] {
        &self.named_variables
    }

    /// Zero-fill the mirror once the catalog is complete.
    pub fn reset_var_data(&mut self) {
        self.var_data = vec![0i16; self.var_total_size as usize];
        self.var_received = false;
        self.expected_var_end = 0;
    }

    fn slot(&self, name: &str) -> Result<(u16, u16), NodeError> {
        let offset = *self
            .var_offset
            .get(name)
            .ok_or_else(|| NodeError::UnknownName(name.to_string()))?;
        let size = self.var_size[name];
        Ok((offset, size))
    }

    pub fn get_scalar(&self, name: &str, index: usize) -> Result<i16, NodeError> {
        let (offset, size) = self.slot(name)?;
        if index as u16 >= size {
            return Err(NodeError::IndexOutOfRange {
                name: name.to_string(),
                index,
                size,
            });
        }
        Ok(self.var_data[offset as usize + index])
    }

    pub fn get_array(&self, name: &str) -> Result<&[i16], NodeError> {
        let (offset, size) = self.slot(name)?;
        Ok(&self.var_data[offset as usize..offset as usize + size as usize])
    }

    /// Write one scalar into the mirror. Returns `(offset, values)` the
    /// caller must also ship to the robot via `SET_VARIABLES`.
    pub fn set_scalar(
        &mut self,
        name: &str,
        val: i16,
        index: usize,
    ) -> Result<(u16, Vec<u16>), NodeError> {
        let (offset, size) = self.slot(name)?;
        if index as u16 >= size {
            return Err(NodeError::IndexOutOfRange {
                name: name.to_string(),
                index,
                size,
            });
        }
        self.var_data[offset as usize + index] = val;
        Ok((offset + index as u16, vec![val as u16]))
    }

    /// Write a whole array into the mirror. Returns `(offset, values)` the
    /// caller must also ship to the robot.
    pub fn set_array(
        &mut self,
        name: &str,
        values: &[i16],
    ) -> Result<(u16, Vec<u16>), NodeError> {
        let (offset, size) = self.slot(name)?;
        if values.len() as u16 != size {
            return Err(NodeError::LengthMismatch {
                name: name.to_string(),
                expected: size,
                got: values.len(),
            });
        }
        for (i, v) in values.iter().enumerate() {
            self.var_data[offset as usize + i] = *v;
        }
        Ok((offset, values.iter().map(|v| *v as u16).collect()))
    }

    /// Apply an inbound `VARIABLES` window to the mirror. Sets `var_received`
    /// once the window reaches `expected_var_end`.
    pub fn set_var_data(&mut self, offset: u16, data: &[u16]) {
        for (i, word) in data.iter().enumerate() {
            let idx = offset as usize + i;
            if idx < self.var_data.len() {
                self.var_data[idx] = *word as i16;
            }
        }
        if offset as usize + data.len() >= self.expected_var_end as usize {
            self.var_received = true;
        }
    }

    pub fn var_received(&self) -> bool {
        self.var_received
    }

    pub fn mark_get_variables_sent(&mut self, offset: u16, len: u16) {
        self.expected_var_end = offset + len;
        self.var_received = false;
    }

    /// Smallest contiguous `(offset, length)` window covering every variable
    /// named in `names`. Returns `(0, 0)` for an empty set.
    ///
    /// The naive "running low/high" approach that only ever grows `hi` breaks
    /// when a later-examined variable has a *lower* offset than an earlier
    /// one (catalog order need not match offset order once variables of
    /// different sizes interleave); this takes the true min/max over the
    /// whole set instead.
    pub fn data_span_for_variables(&self, names: &[&str]) -> (u16, u16) {
        let mut lo: Option<u16> = None;
        let mut hi: Option<u16> = None;
        for name in names {
            if let Some(&offset) = self.var_offset.get(*name) {
                let size = self.var_size[*name];
                let end = offset + size;
                lo = Some(lo.map_or(offset, |l| l.min(offset)));
                hi = Some(hi.map_or(end, |h| h.max(end)));
            }
        }
        match (lo, hi) {
            (Some(lo), Some(hi)) => (lo, hi - lo),
            _ => (0, 0),
        }
    }

    // ── Event / native-function catalogs ──────────────────────────────────

    pub fn add_local_event(&mut self, name: String, description: String) {
        self.local_events.push(LocalEvent { name, description });
    }

    pub fn add_native_function(
        &mut self,
        name: String,
        description: String,
        arg_sizes: Vec<u16>,
    ) {
        self.native_functions.push(NativeFunction {
            name,
            description,
            arg_sizes,
        });
    }

    /// True once the native-function catalog has reached its declared count;
    /// this is the event that promotes the node to the active set.
    pub fn natives_complete(&self) -> bool {
        self.native_functions.len() as u16 >= self.num_native_fun
    }

    // ── Liveness ───────────────────────────────────────────────────────────

    pub fn touch(&mut self, now: f64) {
        self.last_msg_time = now;
    }

    pub fn is_alive(&self, now: f64, timeout: f64) -> bool {
        now - self.last_msg_time < timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn node_with_vars() -> RemoteNode {
        let mut node = RemoteNode::new(7, 5, 0.0);
        node.record_description(1000, 200, 32, 2, 0, 0);
        node.add_var("x", 1).unwrap();
        node.add_var("y", 3).unwrap();
        node.reset_var_data();
        node
    }

    #[test]
    fn add_var_assigns_increasing_offsets() {
        let node = node_with_vars();
        assert_eq!(node.var_total_size(), 4);
        assert_eq!(node.named_variables()[0].offset, 0);
        assert_eq!(node.named_variables()[1].offset, 1);
    }

    #[test]
    fn add_var_past_declared_count_fails() {
        let mut node = node_with_vars();
        assert_eq!(
            node.add_var("z", 1),
            Err(NodeError::CatalogComplete("z".to_string()))
        );
    }

    #[test]
    fn set_var_data_marks_received_at_window_end() {
        let mut node = node_with_vars();
        node.mark_get_variables_sent(0, 4);
        node.set_var_data(0, &[10, 20, 30]);
        assert!(!node.var_received());
        node.set_var_data(3, &[40]);
        assert!(node.var_received());
        assert_eq!(node.get_scalar("x", 0).unwrap(), 10);
        assert_eq!(node.get_array("y").unwrap(), &[20, 30, 40]);
    }

    #[test]
    fn get_scalar_unknown_name_errors() {
        let node = node_with_vars();
        assert_eq!(
            node.get_scalar("z", 0),
            Err(NodeError::UnknownName("z".to_string()))
        );
    }

    #[test]
    fn set_array_wrong_length_errors() {
        let mut node = node_with_vars();
        assert_eq!(
            node.set_array("y", &[1, 2]),
            Err(NodeError::LengthMismatch {
                name: "y".to_string(),
                expected: 3,
                got: 2,
            })
        );
    }

    #[test]
    fn data_span_for_variables_uses_true_min_and_max() {
        let mut node = RemoteNode::new(1, 5, 0.0);
        node.record_description(0, 0, 0, 3, 0, 0);
        node.add_var("a", 2).unwrap(); // offset 0..2
        node.add_var("b", 5).unwrap(); // offset 2..7
        node.add_var("c", 1).unwrap(); // offset 7..8
        node.reset_var_data();

        // Querying a subset whose catalog order does not match offset order
        // (c has the highest offset but is queried first) must still yield
        // the true covering span, not just grow from the first hit.
        assert_eq!(node.data_span_for_variables(&["c", "a"]), (0, 8));
        assert_eq!(node.data_span_for_variables(&["b"]), (2, 5));
        assert_eq!(node.data_span_for_variables(&[]), (0, 0));
    }

    #[test]
    fn liveness_timeout() {
        let node = node_with_vars();
        assert!(node.is_alive(2.9, 3.0));
        assert!(!node.is_alive(3.1, 3.0));
    }

    #[test]
    fn natives_complete_tracks_declared_count() {
        let mut node = RemoteNode::new(1, 5, 0.0);
        node.record_description(0, 0, 0, 0, 0, 2);
        assert!(!node.natives_complete());
        node.add_native_function("f".into(), "".into(), vec![1]);
        assert!(!node.natives_complete());
        node.add_native_function("g".into(), "".into(), vec![]);
        assert!(node.natives_complete());
    }

    proptest! {
        /// For any sequence of declared variable sizes, the offsets `add_var`
        /// assigns are contiguous and non-overlapping: each variable starts
        /// where the previous one ended, and the final total matches the sum
        /// of sizes.
        #[test]
        fn add_var_offsets_are_contiguous(sizes in prop::collection::vec(1u16..64, 1..16)) {
            let mut node = RemoteNode::new(1, 5, 0.0);
            node.record_description(0, 0, 0, sizes.len() as u16, 0, 0);

            let mut expected_offset = 0u16;
            for (i, size) in sizes.iter().enumerate() {
                let name = format!("v{i}");
                node.add_var(&name, *size).unwrap();
                let slot = node
                    .named_variables()
                    .iter()
                    .find(|s| s.name == name)
                    .unwrap();
                prop_assert_eq!(slot.offset, expected_offset);
                expected_offset += *size;
            }
            prop_assert_eq!(node.var_total_size(), expected_offset);
            prop_assert!(node.catalog_complete());
        }
    }
}
