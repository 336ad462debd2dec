//! Session slot behaviour over real TCP connections.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use hostbridge_config::SocketEndpoint;
use hostbridge_wire::{
    CommandResponse, ConnectionState, DEFAULT_MAX_FRAME_BYTES, FrameReader, RequestId,
    decode_response,
};
use rstest::{fixture, rstest};
use serde_json::json;

use super::{ConnectionHandler, ListenerHandle, SessionSlot, SocketListener};
use crate::queue::{ExecutionQueue, NoopWaker, QueuedItem, ResponseSink, SessionId};

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    queue: ExecutionQueue,
    slot: Arc<SessionSlot>,
    addr: SocketAddr,
    _listener: ListenerHandle,
}

impl Harness {
    fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).expect("connect to slot");
        stream.set_read_timeout(Some(WAIT)).expect("read timeout");
        stream
    }

    fn next_item(&self) -> QueuedItem {
        let deadline = Instant::now() + WAIT;
        loop {
            if let Some(item) = self.queue.try_recv() {
                return item;
            }
            assert!(Instant::now() < deadline, "no request reached the queue");
            thread::sleep(Duration::from_millis(5));
        }
    }
}

#[fixture]
fn harness() -> Harness {
    let (queue, handle) = ExecutionQueue::new(Arc::new(NoopWaker));
    let slot = Arc::new(SessionSlot::new(handle));
    let listener =
        SocketListener::bind(&SocketEndpoint::tcp("127.0.0.1", 0)).expect("bind listener");
    let addr = listener.local_addr().expect("local address");
    let handler: Arc<dyn ConnectionHandler> = Arc::clone(&slot) as Arc<dyn ConnectionHandler>;
    let listener = listener.start(handler).expect("start listener");
    Harness {
        queue,
        slot,
        addr,
        _listener: listener,
    }
}

fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn read_response(stream: &TcpStream) -> CommandResponse {
    let mut reader = FrameReader::new(stream.try_clone().expect("clone stream"));
    let frame = reader
        .read_frame()
        .expect("read frame")
        .expect("response frame");
    decode_response(&frame).expect("decode response")
}

fn send_line(stream: &mut TcpStream, line: &str) {
    stream.write_all(line.as_bytes()).expect("write frame");
    stream.write_all(b"\n").expect("write delimiter");
}

/// Writes large responses to `session` from another thread until told to stop
/// or the session goes away; reports on the returned channel when done.
fn flood_responses(slot: &Arc<SessionSlot>, session: SessionId) -> mpsc::Receiver<()> {
    let slot = Arc::clone(slot);
    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        let payload = json!("x".repeat(256 * 1024));
        for index in 0..128 {
            if !slot.is_peer_connected() {
                break;
            }
            let request_id = RequestId::new(format!("bulk-{index}"));
            slot.deliver(session, CommandResponse::success(request_id, payload.clone()));
        }
        drop(done_tx.send(()));
    });
    done_rx
}

fn peer_closed(stream: &mut TcpStream) -> bool {
    let mut buffer = [0_u8; 16];
    matches!(stream.read(&mut buffer), Ok(0) | Err(_))
}

#[rstest]
fn requests_reach_the_queue_and_responses_return(harness: Harness) {
    let mut client = harness.connect();
    send_line(
        &mut client,
        r#"{"CommandName":"get_all_levels","Parameters":null,"RequestId":"r1"}"#,
    );

    let item = harness.next_item();
    assert_eq!(item.request.command(), "get_all_levels");
    assert!(item.request.parameters.is_empty());
    assert_eq!(harness.slot.state(), ConnectionState::Connected);

    harness.slot.deliver(
        item.session,
        CommandResponse::success(item.request.request_id.clone(), json!({ "Count": 0 })),
    );
    let response = read_response(&client);
    assert_eq!(response.request_id.as_str(), "r1");
    assert_eq!(response.outcome(), Ok(&json!({ "Count": 0 })));
}

#[rstest]
fn bad_frames_are_answered_or_skipped_without_ending_the_session(harness: Harness) {
    let mut client = harness.connect();

    send_line(&mut client, r#"{"CommandName":"  ","RequestId":"bad-1"}"#);
    let response = read_response(&client);
    assert_eq!(response.request_id.as_str(), "bad-1");
    let error = response.outcome().expect_err("failure response");
    assert!(error.starts_with("invalid request:"), "{error}");

    send_line(&mut client, "this is not json");
    send_line(
        &mut client,
        r#"{"CommandName":"ping","Parameters":{},"RequestId":"ok-1"}"#,
    );

    let item = harness.next_item();
    assert_eq!(item.request.request_id.as_str(), "ok-1");
    assert!(harness.slot.is_peer_connected());
}

#[rstest]
fn oversize_frame_is_skipped_without_ending_the_session(harness: Harness) {
    let mut client = harness.connect();

    let oversize = "x".repeat(DEFAULT_MAX_FRAME_BYTES + 16);
    send_line(&mut client, &oversize);
    send_line(
        &mut client,
        r#"{"CommandName":"ping","Parameters":{},"RequestId":"after"}"#,
    );

    let item = harness.next_item();
    assert_eq!(item.request.request_id.as_str(), "after");
    assert_eq!(harness.slot.state(), ConnectionState::Connected);
}

#[rstest]
fn stalled_peer_does_not_block_its_replacement(harness: Harness) {
    let mut first = harness.connect();
    send_line(
        &mut first,
        r#"{"CommandName":"ping","Parameters":{},"RequestId":"from-first"}"#,
    );
    let stale = harness.next_item();
    let flooding = flood_responses(&harness.slot, stale.session);
    thread::sleep(Duration::from_millis(200));

    let mut second = harness.connect();
    send_line(
        &mut second,
        r#"{"CommandName":"ping","Parameters":{},"RequestId":"from-second"}"#,
    );
    let current = harness.next_item();
    assert_eq!(current.request.request_id.as_str(), "from-second");
    assert!(flooding.recv_timeout(WAIT).is_ok(), "stalled writer finished");

    harness.slot.deliver(
        current.session,
        CommandResponse::success(current.request.request_id.clone(), json!("fresh")),
    );
    let response = read_response(&second);
    assert_eq!(response.request_id.as_str(), "from-second");
    assert!(peer_closed(&mut first));
}

#[rstest]
fn close_is_not_blocked_by_a_stalled_peer(harness: Harness) {
    let mut client = harness.connect();
    send_line(
        &mut client,
        r#"{"CommandName":"ping","Parameters":{},"RequestId":"r1"}"#,
    );
    let item = harness.next_item();
    let flooding = flood_responses(&harness.slot, item.session);
    thread::sleep(Duration::from_millis(200));

    let (closed_tx, closed_rx) = mpsc::channel();
    let slot = Arc::clone(&harness.slot);
    thread::spawn(move || {
        slot.close();
        drop(closed_tx.send(()));
    });

    assert!(closed_rx.recv_timeout(WAIT).is_ok(), "close returned");
    assert!(flooding.recv_timeout(WAIT).is_ok(), "stalled writer finished");
    assert_eq!(harness.slot.state(), ConnectionState::Closing);
}

#[rstest]
fn new_connection_replaces_the_previous_one(harness: Harness) {
    let mut first = harness.connect();
    send_line(
        &mut first,
        r#"{"CommandName":"ping","Parameters":{},"RequestId":"from-first"}"#,
    );
    let stale = harness.next_item();

    let mut second = harness.connect();
    assert!(peer_closed(&mut first), "first connection is shut down");

    send_line(
        &mut second,
        r#"{"CommandName":"ping","Parameters":{},"RequestId":"from-second"}"#,
    );
    let current = harness.next_item();
    assert_ne!(stale.session, current.session);

    harness.slot.deliver(
        stale.session,
        CommandResponse::success(stale.request.request_id.clone(), json!("late")),
    );
    harness.slot.deliver(
        current.session,
        CommandResponse::success(current.request.request_id.clone(), json!("fresh")),
    );

    let response = read_response(&second);
    assert_eq!(response.request_id.as_str(), "from-second");
    assert_eq!(harness.slot.state(), ConnectionState::Connected);
}

#[rstest]
fn peer_disconnect_empties_the_slot(harness: Harness) {
    let client = harness.connect();
    assert!(wait_until(|| harness.slot.is_peer_connected()));

    drop(client);

    assert!(wait_until(|| !harness.slot.is_peer_connected()));
    assert_eq!(harness.slot.state(), ConnectionState::Disconnected);
}

#[rstest]
fn closed_slot_refuses_connections(harness: Harness) {
    let mut client = harness.connect();
    assert!(wait_until(|| harness.slot.is_peer_connected()));

    harness.slot.close();

    assert_eq!(harness.slot.state(), ConnectionState::Closing);
    assert!(peer_closed(&mut client));

    let mut late = harness.connect();
    assert!(peer_closed(&mut late), "late connection is refused");
    assert!(!harness.slot.is_peer_connected());
}
