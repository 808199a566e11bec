//! End-to-end scenarios driving a full `Connection` against a synthetic
//! robot on the in-memory duplex transport: no real socket, no real clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use aseba_core::{wire, Frame, PayloadReader, PayloadWriter, RemoteNode, SessionConfig};
use aseba_transport::test_transport_pair;
use asebad::{Callbacks, Connection};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

const DUPLEX_BUFFER: usize = 16 * 1024;
const TEST_HOST_NODE_ID: u16 = 1;
const TEST_NODE_ID: u16 = 7;

fn init_tracing() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A config tuned for determinism: no periodic discovery, a liveness window
/// long enough to outlive any test, and a refresh period long enough that
/// only the refresh task's immediate first tick (not a second one) can land
/// in the peer's read stream during a test's lifetime.
fn test_config() -> SessionConfig {
    SessionConfig {
        host_node_id: TEST_HOST_NODE_ID,
        liveness_timeout_secs: 3600.0,
        refresh_rate_secs: 3600.0,
        refresh_coverage: Vec::new(),
        discover_rate_secs: 0.0,
        handshake_wait_secs: 2.0,
        handshake_poll_secs: 0.01,
    }
}

async fn read_frame(peer: &mut DuplexStream) -> Frame {
    let mut header = [0u8; wire::HEADER_SIZE];
    peer.read_exact(&mut header).await.expect("read frame header");
    let payload_len = u16::from_le_bytes([header[0], header[1]]) as usize;
    let source_node = u16::from_le_bytes([header[2], header[3]]);
    let id = u16::from_le_bytes([header[4], header[5]]);
    let mut payload = vec![0u8; payload_len];
    if payload_len > 0 {
        peer.read_exact(&mut payload).await.expect("read frame payload");
    }
    Frame::new(source_node, id, payload)
}

/// Read frames until one with `id` is seen, tolerating up to `max_skips`
/// unrelated frames ahead of it (the per-node refresh task can interleave an
/// unsolicited `GET_VARIABLES` once a node goes active).
async fn read_frame_expecting(peer: &mut DuplexStream, id: u16, max_skips: usize) -> Frame {
    for _ in 0..=max_skips {
        let frame = read_frame(peer).await;
        if frame.id == id {
            return frame;
        }
        tracing::debug!(skipped = format_args!("{:#06x}", frame.id), "skipped unrelated frame");
    }
    panic!("expected frame id {id:#06x} was not seen within {max_skips} extra reads");
}

async fn write_frame(peer: &mut DuplexStream, frame: Frame) {
    let bytes = frame.encode().expect("encode frame");
    peer.write_all(&bytes).await.expect("write frame");
}

fn node_present(node_id: u16, version: u16) -> Frame {
    let mut w = PayloadWriter::new();
    w.put_u16(version);
    Frame::new(node_id, wire::ID_NODE_PRESENT, w.into_bytes())
}

#[allow(clippy::too_many_arguments)]
fn description(
    node_id: u16,
    name: &str,
    protocol_version: u16,
    bytecode_size: u16,
    stack_size: u16,
    max_var_size: u16,
    num_named_var: u16,
    num_local_events: u16,
    num_native_fun: u16,
) -> Frame {
    let mut w = PayloadWriter::new();
    w.put_string(name);
    w.put_u16(protocol_version);
    w.put_u16(bytecode_size);
    w.put_u16(stack_size);
    w.put_u16(max_var_size);
    w.put_u16(num_named_var);
    w.put_u16(num_local_events);
    w.put_u16(num_native_fun);
    Frame::new(node_id, wire::ID_DESCRIPTION, w.into_bytes())
}

fn named_variable_description(node_id: u16, size: u16, name: &str) -> Frame {
    let mut w = PayloadWriter::new();
    w.put_u16(size);
    w.put_string(name);
    Frame::new(node_id, wire::ID_NAMED_VARIABLE_DESCRIPTION, w.into_bytes())
}

fn variables(node_id: u16, var_offset: u16, var_data: &[u16]) -> Frame {
    let mut w = PayloadWriter::new();
    w.put_u16(var_offset);
    w.put_u16_words(var_data);
    Frame::new(node_id, wire::ID_VARIABLES, w.into_bytes())
}

fn user_event(node_id: u16, id: u16, arg: &[u16]) -> Frame {
    let mut w = PayloadWriter::new();
    w.put_u16_words(arg);
    Frame::new(node_id, id, w.into_bytes())
}

/// Bring `TEST_NODE_ID` to the active handshake phase with two named
/// variables, `x(size=1)` and `y(size=3)`, zero events, zero native
/// functions — scenario 1's node. Consumes the `GET_NODE_DESCRIPTION`
/// request the dispatcher sends on `NODE_PRESENT`.
async fn handshake_two_vars(connection: &Connection, peer: &mut DuplexStream) {
    write_frame(peer, node_present(TEST_NODE_ID, wire::PROTOCOL_VERSION)).await;
    let _ = read_frame_expecting(peer, wire::ID_GET_NODE_DESCRIPTION, 0).await;

    write_frame(
        peer,
        description(TEST_NODE_ID, "test-node", wire::PROTOCOL_VERSION, 1000, 200, 32, 2, 0, 0),
    )
    .await;
    write_frame(peer, named_variable_description(TEST_NODE_ID, 1, "x")).await;
    write_frame(peer, named_variable_description(TEST_NODE_ID, 3, "y")).await;

    connection
        .wait_for_handshake(TEST_NODE_ID)
        .await
        .expect("node should reach active phase");
}

// ── Scenario 1: handshake + variable mirror coherence ──────────────────────

#[tokio::test]
async fn handshake_completes_and_variable_mirror_reflects_inbound_variables() {
    init_tracing();
    let (client, mut peer) = test_transport_pair(DUPLEX_BUFFER);
    let variables_received = Arc::new(AtomicBool::new(false));
    let flag = variables_received.clone();
    let callbacks = Callbacks::new().with_on_variables_received(move |_node_id| {
        flag.store(true, Ordering::SeqCst);
    });

    let connection = Connection::open(Box::new(client), test_config(), callbacks).await;

    handshake_two_vars(&connection, &mut peer).await;
    assert!(connection.is_active(TEST_NODE_ID).await);

    // Catalog complete, mirror zeroed, x(1) + y(3) == 4 words.
    assert_eq!(connection.get_scalar(TEST_NODE_ID, "x", 0).await.unwrap(), 0);
    assert_eq!(connection.get_array(TEST_NODE_ID, "y").await.unwrap(), vec![0, 0, 0]);

    write_frame(&mut peer, variables(TEST_NODE_ID, 0, &[10, 20, 30, 40])).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !variables_received.load(Ordering::SeqCst) {
        assert!(tokio::time::Instant::now() < deadline, "on_variables_received never fired");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(connection.get_scalar(TEST_NODE_ID, "x", 0).await.unwrap(), 10);
    assert_eq!(connection.get_array(TEST_NODE_ID, "y").await.unwrap(), vec![20, 30, 40]);

    connection.shutdown();
}

// ── Scenario 2: set_array ships one SET_VARIABLES and updates the mirror ───

#[tokio::test]
async fn set_array_sends_one_set_variables_and_updates_local_mirror() {
    init_tracing();
    let (client, mut peer) = test_transport_pair(DUPLEX_BUFFER);
    let connection = Connection::open(Box::new(client), test_config(), Callbacks::new()).await;

    handshake_two_vars(&connection, &mut peer).await;

    connection
        .set_array(TEST_NODE_ID, "y", &[1, 2, 3])
        .await
        .expect("set_array should succeed");

    let frame = read_frame_expecting(&mut peer, wire::ID_SET_VARIABLES, 2).await;
    assert_eq!(frame.source_node, TEST_HOST_NODE_ID);
    let mut r = PayloadReader::new(&frame.payload);
    assert_eq!(r.get_u16().unwrap(), TEST_NODE_ID);
    assert_eq!(r.get_u16().unwrap(), 1, "y starts right after x at offset 1");
    assert_eq!(r.remaining_as_u16_words().unwrap(), vec![1, 2, 3]);

    assert_eq!(connection.get_array(TEST_NODE_ID, "y").await.unwrap(), vec![1, 2, 3]);

    connection.shutdown();
}

// ── Scenario 3: 600-word bytecode chunks into three SET_BYTECODE messages ──

#[tokio::test]
async fn set_bytecode_chunks_into_three_set_bytecode_messages() {
    init_tracing();
    let (client, mut peer) = test_transport_pair(DUPLEX_BUFFER);
    let connection = Connection::open(Box::new(client), test_config(), Callbacks::new()).await;

    handshake_two_vars(&connection, &mut peer).await;

    let bytecode: Vec<u16> = (0..600).map(|i| i as u16).collect();
    connection
        .set_bytecode(TEST_NODE_ID, &bytecode, 0)
        .await
        .expect("set_bytecode should succeed");

    let expected = [(0u16, 256usize), (256, 256), (512, 88)];
    for (addr, len) in expected {
        let frame = read_frame_expecting(&mut peer, wire::ID_SET_BYTECODE, 2).await;
        let mut r = PayloadReader::new(&frame.payload);
        assert_eq!(r.get_u16().unwrap(), TEST_NODE_ID);
        assert_eq!(r.get_u16().unwrap(), addr);
        assert_eq!(r.remaining_as_u16_words().unwrap().len(), len);
    }

    connection.shutdown();
}

// ── Scenario 4: assembler against a node with x at offset 269 ──────────────

#[test]
fn assembles_against_a_node_with_x_at_a_nonzero_offset() {
    let mut node = RemoteNode::new(TEST_NODE_ID, wire::PROTOCOL_VERSION, 0.0);
    node.record_description(2000, 200, 300, 2, 0, 0);
    node.add_var("pad", 269).unwrap();
    node.add_var("x", 1).unwrap();
    node.reset_var_data();

    let src = "dc end_toc\ndc _ev.init, init\nend_toc:\ninit: push.s 0\n store x\n stop\n";
    let bytecode = aseba_asm::assemble(&node, src).expect("assembly should succeed");
    assert_eq!(bytecode, vec![3, 0xffff, 3, 0x1000, 0x410d, 0x0000]);
}

// ── Scenario 5: a v6 NODE_PRESENT triggers UUID/NAME/RF then description ───

#[tokio::test]
async fn v6_node_present_requests_device_info_then_node_description() {
    init_tracing();
    let (client, mut peer) = test_transport_pair(DUPLEX_BUFFER);
    let connection = Connection::open(Box::new(client), test_config(), Callbacks::new()).await;

    write_frame(&mut peer, node_present(TEST_NODE_ID, wire::DEVICE_INFO_MIN_VERSION)).await;

    let expected_kinds = [
        wire::DEVICE_INFO_UUID,
        wire::DEVICE_INFO_NAME,
        wire::DEVICE_INFO_THYMIO2_RF_SETTINGS,
    ];
    for kind in expected_kinds {
        let frame = read_frame(&mut peer).await;
        assert_eq!(frame.id, wire::ID_GET_DEVICE_INFO);
        let mut r = PayloadReader::new(&frame.payload);
        assert_eq!(r.get_u16().unwrap(), TEST_NODE_ID);
        assert_eq!(r.get_u16().unwrap(), kind as u16);
    }

    let description_request = read_frame(&mut peer).await;
    assert_eq!(description_request.id, wire::ID_GET_NODE_DESCRIPTION);
    let mut r = PayloadReader::new(&description_request.payload);
    assert_eq!(r.get_u16().unwrap(), TEST_NODE_ID);
    assert_eq!(r.get_u16().unwrap(), wire::PROTOCOL_VERSION);

    connection.shutdown();
}

// ── Scenario 6: a user event message fires on_user_event ───────────────────

#[tokio::test]
async fn user_event_message_fires_callback_with_id_and_words() {
    init_tracing();
    let (client, mut peer) = test_transport_pair(DUPLEX_BUFFER);
    let received: Arc<Mutex<Option<(u16, u16, Vec<u16>)>>> = Arc::new(Mutex::new(None));
    let slot = received.clone();
    let callbacks = Callbacks::new().with_on_user_event(move |node_id, id, arg| {
        *slot.lock().unwrap() = Some((node_id, id, arg.to_vec()));
    });

    let connection = Connection::open(Box::new(client), test_config(), callbacks).await;

    // The dispatcher only routes messages from a known node, so the node
    // must already be present before the event arrives.
    write_frame(&mut peer, node_present(TEST_NODE_ID, wire::PROTOCOL_VERSION)).await;
    let _ = read_frame_expecting(&mut peer, wire::ID_GET_NODE_DESCRIPTION, 0).await;

    write_frame(&mut peer, user_event(TEST_NODE_ID, 0x0042, &[7, 9])).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(event) = received.lock().unwrap().clone() {
            assert_eq!(event, (TEST_NODE_ID, 0x0042, vec![7, 9]));
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "on_user_event never fired");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    connection.shutdown();
}
