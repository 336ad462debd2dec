//! Ordering, isolation and shutdown behaviour of the execution queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hostbridge_wire::{CommandRequest, CommandResponse, Parameters};
use rstest::{fixture, rstest};
use serde::Deserialize;
use serde_json::{Value, json};

use super::*;
use crate::dispatch::{
    Command, CommandRegistry, Dispatcher, HandlerError, TransactionError, Transactional,
};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct LogHost {
    log: Vec<String>,
    rollbacks: usize,
}

impl Transactional for LogHost {
    fn begin(&mut self, _label: &str) -> Result<(), TransactionError> {
        Ok(())
    }

    fn commit(&mut self) -> Result<(), TransactionError> {
        Ok(())
    }

    fn rollback(&mut self) {
        self.rollbacks += 1;
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepParams {
    label: String,
    #[serde(default)]
    delay_ms: u64,
}

struct Step;

impl Command<LogHost> for Step {
    type Params = StepParams;
    const NAME: &'static str = "step";

    fn run(&self, host: &mut LogHost, params: StepParams) -> Result<Value, HandlerError> {
        host.log.push(format!("{} start", params.label));
        thread::sleep(Duration::from_millis(params.delay_ms));
        host.log.push(format!("{} end", params.label));
        Ok(json!({ "Label": params.label }))
    }
}

struct Crash;

impl Command<LogHost> for Crash {
    type Params = Parameters;
    const NAME: &'static str = "crash";
    const MUTATES: bool = true;

    fn run(&self, _host: &mut LogHost, _params: Parameters) -> Result<Value, HandlerError> {
        panic!("host exploded");
    }
}

struct ChannelSink(Sender<(SessionId, CommandResponse)>);

impl ResponseSink for ChannelSink {
    fn deliver(&self, session: SessionId, response: CommandResponse) {
        let _ = self.0.send((session, response));
    }
}

#[derive(Default)]
struct CountingWaker(AtomicUsize);

impl HostWaker for CountingWaker {
    fn wake(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[fixture]
fn dispatcher() -> Dispatcher<LogHost> {
    Dispatcher::new(Arc::new(CommandRegistry::new().with(Step).with(Crash)))
}

fn step(label: &str, delay_ms: u64, id: &str) -> CommandRequest {
    let mut parameters = Parameters::new();
    parameters.insert("label".to_owned(), json!(label));
    parameters.insert("delayMs".to_owned(), json!(delay_ms));
    CommandRequest::new("step", parameters, id)
}

fn sink() -> (Arc<dyn ResponseSink>, Receiver<(SessionId, CommandResponse)>) {
    let (sender, receiver) = mpsc::channel();
    (Arc::new(ChannelSink(sender)), receiver)
}

#[rstest]
fn items_execute_in_enqueue_order_without_overlap(dispatcher: Dispatcher<LogHost>) {
    let (queue, handle) = ExecutionQueue::new(Arc::new(NoopWaker));
    let (sink, responses) = sink();
    let drain = DrainLoop::new(queue, dispatcher, LogHost::default(), sink);
    let worker = thread::spawn(move || drain.run());

    let session = SessionId::new(1);
    handle.enqueue(step("A", 100, "a"), session).expect("enqueue A");
    handle.enqueue(step("B", 0, "b"), session).expect("enqueue B");

    let first = responses.recv_timeout(WAIT).expect("first response");
    let second = responses.recv_timeout(WAIT).expect("second response");
    assert_eq!(first.1.request_id.as_str(), "a");
    assert_eq!(second.1.request_id.as_str(), "b");
    assert_eq!(first.0, session);

    handle.close();
    let host = worker.join().expect("drain thread");
    assert_eq!(host.log, vec!["A start", "A end", "B start", "B end"]);
}

#[rstest]
fn panic_fails_one_item_and_the_loop_continues(dispatcher: Dispatcher<LogHost>) {
    let (queue, handle) = ExecutionQueue::new(Arc::new(NoopWaker));
    let (sink, responses) = sink();
    let mut drain = DrainLoop::new(queue, dispatcher, LogHost::default(), sink);
    let session = SessionId::new(7);

    handle
        .enqueue(CommandRequest::new("crash", Parameters::new(), "boom"), session)
        .expect("enqueue crash");
    handle.enqueue(step("after", 0, "next"), session).expect("enqueue step");

    assert_eq!(drain.drain_pending(), 2);

    let (_, crashed) = responses.try_recv().expect("crash response");
    assert_eq!(crashed.request_id.as_str(), "boom");
    assert_eq!(crashed.outcome(), Err("command panicked: host exploded"));

    let (_, next) = responses.try_recv().expect("step response");
    assert_eq!(next.outcome(), Ok(&json!({ "Label": "after" })));
    assert_eq!(drain.host().rollbacks, 1);
}

#[rstest]
fn close_discards_waiting_items(dispatcher: Dispatcher<LogHost>) {
    let (queue, handle) = ExecutionQueue::new(Arc::new(NoopWaker));
    let (sink, responses) = sink();
    let mut drain = DrainLoop::new(queue, dispatcher, LogHost::default(), sink);
    let session = SessionId::new(1);

    handle.enqueue(step("A", 0, "a"), session).expect("enqueue");
    handle.enqueue(step("B", 0, "b"), session).expect("enqueue");
    assert_eq!(handle.depth(), 2);

    handle.close();

    assert_eq!(drain.drain_pending(), 0);
    assert!(responses.try_recv().is_err());
    assert_eq!(handle.depth(), 0);
    assert_eq!(
        handle.enqueue(step("C", 0, "c"), session),
        Err(QueueClosed)
    );
    assert!(drain.into_host().log.is_empty());
}

#[rstest]
fn close_after_the_drain_loop_is_gone_still_closes() {
    let waker = Arc::new(CountingWaker::default());
    let (queue, handle) = ExecutionQueue::new(Arc::clone(&waker) as Arc<dyn HostWaker>);
    drop(queue);

    handle.close();
    handle.close();

    assert!(handle.is_closed());
    assert_eq!(waker.0.load(Ordering::SeqCst), 1);
    assert_eq!(
        handle.enqueue(step("late", 0, "late"), SessionId::new(3)),
        Err(QueueClosed)
    );
}

#[rstest]
fn enqueue_wakes_the_host_and_drain_pending_pumps_ready_work(dispatcher: Dispatcher<LogHost>) {
    let waker = Arc::new(CountingWaker::default());
    let (queue, handle) = ExecutionQueue::new(Arc::clone(&waker) as Arc<dyn HostWaker>);
    let (sink, responses) = sink();
    let mut drain = DrainLoop::new(queue, dispatcher, LogHost::default(), sink);

    assert_eq!(drain.drain_pending(), 0);
    for index in 0..3 {
        handle
            .enqueue(step(&format!("s{index}"), 0, &format!("r{index}")), SessionId::new(2))
            .expect("enqueue");
    }

    assert_eq!(waker.0.load(Ordering::SeqCst), 3);
    assert_eq!(drain.drain_pending(), 3);
    let ids: Vec<String> = responses
        .try_iter()
        .map(|(_, response)| response.request_id.to_string())
        .collect();
    assert_eq!(ids, vec!["r0", "r1", "r2"]);
}

#[test]
fn concurrent_producers_keep_per_producer_order() {
    let (queue, handle) = ExecutionQueue::new(Arc::new(NoopWaker));

    let producers: Vec<_> = (0..4_u64)
        .map(|producer| {
            let handle = handle.clone();
            thread::spawn(move || {
                for index in 0..25 {
                    let request = step("p", 0, &format!("{producer}-{index}"));
                    handle
                        .enqueue(request, SessionId::new(producer))
                        .expect("enqueue");
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("producer thread");
    }

    let mut seen = Vec::new();
    while let Some(item) = queue.try_recv() {
        seen.push((item.session.get(), item.request.request_id.to_string()));
    }

    assert_eq!(seen.len(), 100);
    for producer in 0..4_u64 {
        let order: Vec<&str> = seen
            .iter()
            .filter(|(session, _)| *session == producer)
            .map(|(_, id)| id.as_str())
            .collect();
        let expected: Vec<String> = (0..25).map(|index| format!("{producer}-{index}")).collect();
        assert_eq!(order, expected);
    }
}
