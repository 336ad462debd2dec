//! Harness types shared by the executor unit and behaviour tests.

use std::io::Read;
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use hostbridge_client::{BridgeClient, CallError};
use hostbridge_config::{Config, SocketEndpoint};
use hostbridge_wire::{
    CommandRequest, CommandResponse, FrameReader, FrameWriter, Parameters, decode_response,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::bootstrap::BootstrapError;
use crate::dispatch::{Command, CommandRegistry, Dispatcher, HandlerError};
use crate::health::HealthReporter;
use crate::host::{HostDocument, demo_registry};
use crate::service::{
    BridgeService, EnablementStore, MemoryEnablementStore, ServiceError, ServiceState,
};

pub(crate) const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    StateChanged(ServiceState, ServiceState),
    Listening(SocketEndpoint),
    ServiceFailed(String),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub(crate) struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub(crate) fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn count(&self, wanted: &HealthEvent) -> usize {
        self.events()
            .iter()
            .filter(|event| *event == wanted)
            .count()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn service_state_changed(&self, previous: ServiceState, current: ServiceState) {
        self.record(HealthEvent::StateChanged(previous, current));
    }

    fn service_listening(&self, endpoint: &SocketEndpoint) {
        self.record(HealthEvent::Listening(endpoint.clone()));
    }

    fn service_failed(&self, error: &ServiceError) {
        self.record(HealthEvent::ServiceFailed(error.to_string()));
    }
}

/// Shared log written by [`TracedStep`].
pub(crate) type Trace = Arc<Mutex<Vec<String>>>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TracedStepParams {
    label: String,
    #[serde(default)]
    delay_ms: u64,
}

/// `traced_step`: records its start and end around an optional delay.
pub(crate) struct TracedStep {
    pub(crate) trace: Trace,
}

impl Command<HostDocument> for TracedStep {
    type Params = TracedStepParams;
    const NAME: &'static str = "traced_step";

    fn run(
        &self,
        _host: &mut HostDocument,
        params: TracedStepParams,
    ) -> Result<Value, HandlerError> {
        self.push(format!("{} start", params.label));
        thread::sleep(Duration::from_millis(params.delay_ms));
        self.push(format!("{} end", params.label));
        Ok(json!({ "Label": params.label }))
    }
}

impl TracedStep {
    fn push(&self, entry: String) {
        self.trace
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

pub(crate) fn traced_step_parameters(label: &str, delay_ms: u64) -> Parameters {
    let mut parameters = Parameters::new();
    parameters.insert("label".to_owned(), json!(label));
    parameters.insert("delayMs".to_owned(), json!(delay_ms));
    parameters
}

/// Demo commands plus [`TracedStep`].
pub(crate) fn traced_registry(trace: &Trace) -> CommandRegistry<HostDocument> {
    demo_registry().with(TracedStep {
        trace: Arc::clone(trace),
    })
}

/// Loopback configuration with an ephemeral port and short timings.
pub(crate) fn loopback_config() -> Config {
    Config {
        bridge_socket: SocketEndpoint::tcp("127.0.0.1", 0),
        reconnect_interval_ms: 50,
        handshake_timeout_ms: 500,
        call_timeout_ms: 2_000,
        ..Config::default()
    }
}

/// Client configuration pointing at a running service.
pub(crate) fn client_config(endpoint: SocketEndpoint) -> Config {
    Config {
        bridge_socket: endpoint,
        ..loopback_config()
    }
}

pub(crate) fn socket_addr(endpoint: &SocketEndpoint) -> SocketAddr {
    let address = endpoint.tcp_address().expect("tcp endpoint");
    address.parse().expect("socket address")
}

/// A peer speaking the wire protocol directly, for exact request ids.
pub(crate) struct RawPeer {
    writer: FrameWriter<TcpStream>,
    reader: FrameReader<TcpStream>,
}

impl RawPeer {
    pub(crate) fn connect(endpoint: &SocketEndpoint) -> Self {
        let stream = TcpStream::connect(socket_addr(endpoint)).expect("connect to executor");
        stream
            .set_read_timeout(Some(IO_TIMEOUT))
            .expect("read timeout");
        let reader = FrameReader::new(stream.try_clone().expect("clone stream"));
        Self {
            writer: FrameWriter::new(stream),
            reader,
        }
    }

    pub(crate) fn send(&mut self, command: &str, parameters: Parameters, request_id: &str) {
        let request = CommandRequest::new(command, parameters, request_id);
        self.writer.write_request(&request).expect("send request");
    }

    pub(crate) fn receive(&mut self) -> CommandResponse {
        let frame = self
            .reader
            .read_frame()
            .expect("read response")
            .expect("connection open");
        decode_response(&frame).expect("decode response")
    }

    /// Returns `true` when the executor has closed this connection.
    pub(crate) fn is_closed(&mut self) -> bool {
        let mut buffer = [0_u8; 1];
        matches!(self.writer.get_ref().read(&mut buffer), Ok(0) | Err(_))
    }
}

/// Outcome of a client call and how long it took.
pub(crate) struct TimedCall {
    pub(crate) result: Result<Value, CallError>,
    pub(crate) elapsed: Duration,
}

/// Service, peers and observations for one scenario.
pub(crate) struct TestWorld {
    pub(crate) reporter: Arc<RecordingHealthReporter>,
    pub(crate) store: Arc<MemoryEnablementStore>,
    pub(crate) trace: Trace,
    pub(crate) service: BridgeService<HostDocument>,
    pub(crate) peers: Vec<RawPeer>,
    pub(crate) responses: Vec<CommandResponse>,
    awaiting: Vec<usize>,
    pub(crate) client: Option<BridgeClient>,
    pub(crate) call: Option<TimedCall>,
}

impl Default for TestWorld {
    fn default() -> Self {
        let reporter = Arc::new(RecordingHealthReporter::default());
        let store = Arc::new(MemoryEnablementStore::default());
        let trace = Trace::default();
        let service = BridgeService::new(
            HostDocument::sample(),
            Dispatcher::new(Arc::new(traced_registry(&trace))),
            Arc::clone(&store) as Arc<dyn EnablementStore>,
            Arc::clone(&reporter) as Arc<dyn HealthReporter>,
        );
        Self {
            reporter,
            store,
            trace,
            service,
            peers: Vec::new(),
            responses: Vec::new(),
            awaiting: Vec::new(),
            client: None,
            call: None,
        }
    }
}

impl TestWorld {
    pub(crate) fn start(&self) -> ServiceState {
        self.service
            .start(&loopback_config())
            .expect("service starts")
    }

    pub(crate) fn endpoint(&self) -> SocketEndpoint {
        self.service.local_endpoint().expect("service is listening")
    }

    pub(crate) fn connect_peer(&mut self) {
        let peer = RawPeer::connect(&self.endpoint());
        self.peers.push(peer);
    }

    /// Sends a request from peer `index`; its response is read by [`Self::settle`].
    pub(crate) fn send(
        &mut self,
        index: usize,
        command: &str,
        parameters: Parameters,
        request_id: &str,
    ) {
        self.peers
            .get_mut(index)
            .expect("peer is connected")
            .send(command, parameters, request_id);
        self.awaiting.push(index);
    }

    /// Reads one response for every request sent since the last call.
    pub(crate) fn settle(&mut self) {
        for index in std::mem::take(&mut self.awaiting) {
            let response = self.peers.get_mut(index).expect("peer is connected").receive();
            self.responses.push(response);
        }
    }

    pub(crate) fn connect_client(&mut self) -> &BridgeClient {
        let client = BridgeClient::from_config(&client_config(self.endpoint()));
        client.connect().expect("client connects");
        self.client.insert(client)
    }

    pub(crate) fn response_for(&mut self, request_id: &str) -> &CommandResponse {
        self.settle();
        self.responses
            .iter()
            .find(|response| response.request_id.as_str() == request_id)
            .unwrap_or_else(|| panic!("no response for {request_id}"))
    }

    pub(crate) fn trace(&self) -> Vec<String> {
        self.trace
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
