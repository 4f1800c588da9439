use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::JoinHandle;

use bytes::Bytes;
use comlink_channel::{Channel, ChannelConfig, ChannelError, ChannelEvents, Flow};
use comlink_frame::{Message, MessageKind};
use comlink_transport::Endpoint;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::{ComponentConfig, StaleReplyPolicy};
use crate::correlation::{CorrelationId, Reference, ReferenceMinter};
use crate::error::{ComponentError, ProtocolError, Result};
use crate::lifecycle::{transition, LifecycleError, State, StateCell, Trigger};
use crate::pending::PendingMap;
use crate::wire::{self, AcquireSpec, CallOutcome, SocketDescriptor};

/// One inbound call awaiting an application reply.
///
/// The application must eventually answer with
/// [`ComponentHandle::call_return`], passing back the `reference`.
#[derive(Debug, Clone)]
pub struct InboundCall {
    pub reference: Reference,
    pub component: Option<String>,
    pub operation: String,
    pub inputs: Value,
    pub payload: Bytes,
}

/// One inbound fire-and-forget request.
#[derive(Debug, Clone)]
pub struct InboundCast {
    pub operation: String,
    pub inputs: Value,
    pub payload: Bytes,
}

/// Resolution of an outbound call.
#[derive(Debug, Clone)]
pub struct CallReply {
    pub reference: Reference,
    pub ok: bool,
    pub outputs: Value,
    pub error: Option<Value>,
    pub payload: Bytes,
}

/// Resolution of an outbound acquire.
#[derive(Debug, Clone)]
pub struct AcquireReply {
    pub reference: Reference,
    pub ok: bool,
    /// Resource-kind → descriptor, as sent by the peer.
    pub descriptors: Option<Value>,
    pub error: Option<Value>,
}

impl AcquireReply {
    /// Parse the TCP/IPv4 socket descriptor, if one was provisioned.
    pub fn socket(&self) -> Option<SocketDescriptor> {
        let descriptor = self
            .descriptors
            .as_ref()?
            .get(wire::RESOURCE_SOCKET_IPV4_TCP)?;
        serde_json::from_value(descriptor.clone()).ok()
    }
}

/// Component-level application callbacks.
///
/// Every method runs on the component's dispatch thread, serialized with
/// lifecycle transitions and all protocol bookkeeping — handler state needs
/// no additional locking.
pub trait ComponentHandler: Send + 'static {
    fn called(&mut self, call: InboundCall) {
        warn!(operation = %call.operation, "unhandled inbound call");
    }

    fn casted(&mut self, cast: InboundCast) {
        let _ = cast;
    }

    fn call_returned(&mut self, reply: CallReply) {
        let _ = reply;
    }

    fn register_returned(&mut self, reference: Reference, ok: bool, error: Option<Value>) {
        let _ = (reference, ok, error);
    }

    fn acquire_returned(&mut self, reply: AcquireReply) {
        let _ = reply;
    }

    fn failed(&mut self, error: ComponentError) {
        error!(%error, "component operation failed");
    }
}

enum Op {
    Initialize {
        reader: Endpoint,
        writer: Endpoint,
        ack: Sender<Result<()>>,
    },
    Bind {
        ack: Sender<Result<()>>,
    },
    Call {
        reference: Reference,
        component: String,
        operation: String,
        inputs: Value,
        payload: Bytes,
    },
    Cast {
        component: String,
        operation: String,
        inputs: Value,
        payload: Bytes,
    },
    Register {
        reference: Reference,
        group: String,
    },
    Acquire {
        reference: Reference,
        spec: AcquireSpec,
    },
    CallReturn {
        reference: Reference,
        outcome: CallOutcome,
    },
    Terminate,
    ChannelInitialized,
    Deliver(Message),
    FlowClosed(Flow),
    ChannelTerminated,
    Stop,
}

/// Forwards channel callbacks into the component's operation queue, so all
/// protocol state stays on the one dispatch thread.
struct ChannelBridge {
    ops: Sender<Op>,
}

impl ChannelBridge {
    /// A stalled component queue must not park the channel dispatcher
    /// forever (it still has to observe shutdown), so forwarding gives up
    /// after a bounded wait.
    const FORWARD_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

    fn forward(&self, op: Op) {
        if self.ops.send_timeout(op, Self::FORWARD_TIMEOUT).is_err() {
            warn!("component operation queue stalled, dropping channel event");
        }
    }
}

impl ChannelEvents for ChannelBridge {
    fn initialized(&mut self) {
        self.forward(Op::ChannelInitialized);
    }

    fn received(&mut self, message: Message) {
        self.forward(Op::Deliver(message));
    }

    fn closed(&mut self, flow: Flow) {
        self.forward(Op::FlowClosed(flow));
    }

    fn terminated(&mut self) {
        self.forward(Op::ChannelTerminated);
    }
}

/// Cloneable handle for driving one component.
///
/// Operations return immediately; outcomes arrive through the
/// [`ComponentHandler`]. Operations other than the lifecycle controls are
/// legal only in the Ready state and fail fast otherwise.
#[derive(Clone)]
pub struct ComponentHandle {
    ops: Sender<Op>,
    minter: Arc<ReferenceMinter>,
    mirror: Arc<StateCell>,
    op_capacity: usize,
}

impl ComponentHandle {
    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.mirror.load()
    }

    /// Start the channel pipeline over the given endpoint pair.
    /// Legal once, from the Bootstrapped state.
    pub fn initialize(&self, reader: Endpoint, writer: Endpoint) -> Result<()> {
        self.request(|ack| Op::Initialize { reader, writer, ack })
    }

    /// Transit Binding and become Ready. Legal once, from Initialized.
    pub fn bind(&self) -> Result<()> {
        self.request(|ack| Op::Bind { ack })
    }

    /// Send a call expecting one reply; resolution arrives via
    /// `call_returned` with the returned reference.
    pub fn call(
        &self,
        component: &str,
        operation: &str,
        inputs: Value,
        payload: impl Into<Bytes>,
    ) -> Result<Reference> {
        self.ensure_ready()?;
        let reference = self.minter.mint();
        self.post(Op::Call {
            reference,
            component: component.to_string(),
            operation: operation.to_string(),
            inputs,
            payload: payload.into(),
        })?;
        Ok(reference)
    }

    /// Send a fire-and-forget request: no correlation, no reply.
    pub fn cast(
        &self,
        component: &str,
        operation: &str,
        inputs: Value,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        self.ensure_ready()?;
        self.post(Op::Cast {
            component: component.to_string(),
            operation: operation.to_string(),
            inputs,
            payload: payload.into(),
        })
    }

    /// Join a named group; resolution arrives via `register_returned`.
    pub fn register(&self, group: &str) -> Result<Reference> {
        self.ensure_ready()?;
        let reference = self.minter.mint();
        self.post(Op::Register {
            reference,
            group: group.to_string(),
        })?;
        Ok(reference)
    }

    /// Request a provisioned resource; resolution arrives via
    /// `acquire_returned`.
    pub fn acquire(&self, spec: AcquireSpec) -> Result<Reference> {
        self.ensure_ready()?;
        let reference = self.minter.mint();
        self.post(Op::Acquire { reference, spec })?;
        Ok(reference)
    }

    /// Answer one inbound call previously delivered through `called`.
    pub fn call_return(&self, reference: Reference, outcome: CallOutcome) -> Result<()> {
        self.ensure_ready()?;
        self.post(Op::CallReturn { reference, outcome })
    }

    /// Begin shutdown. Legal from Ready; idempotent once terminating.
    pub fn terminate(&self) -> Result<()> {
        let state = self.mirror.load();
        match state {
            State::Ready | State::Terminating | State::Terminated => self.post(Op::Terminate),
            _ => Err(LifecycleError {
                state,
                trigger: Trigger::Terminate,
            }
            .into()),
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        let state = self.mirror.load();
        if state == State::Ready {
            Ok(())
        } else {
            Err(LifecycleError {
                state,
                trigger: Trigger::Execute,
            }
            .into())
        }
    }

    fn post(&self, op: Op) -> Result<()> {
        self.ops.try_send(op).map_err(|err| match err {
            TrySendError::Full(_) => ComponentError::Busy {
                capacity: self.op_capacity,
            },
            TrySendError::Disconnected(_) => ComponentError::NotRunning,
        })
    }

    fn request(&self, make: impl FnOnce(Sender<Result<()>>) -> Op) -> Result<()> {
        let (ack_tx, ack_rx) = bounded(1);
        self.post(make(ack_tx))?;
        match ack_rx.recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(ComponentError::NotRunning),
        }
    }
}

/// One component instance: the owner of the dispatch thread.
///
/// Dropping (or calling [`Component::destroy`]) stops the dispatch thread
/// and the channel pipeline.
pub struct Component {
    handle: ComponentHandle,
    worker: Option<JoinHandle<()>>,
}

impl Component {
    /// Create the component in the Bootstrapped state and start its
    /// dispatch thread.
    ///
    /// `make_handler` receives a handle clone so the handler can issue
    /// operations (typically `call_return`) from inside callbacks.
    pub fn bootstrap<H, F>(config: ComponentConfig, make_handler: F) -> Result<Self>
    where
        H: ComponentHandler,
        F: FnOnce(ComponentHandle) -> H,
    {
        let state = transition(State::New, Trigger::Bootstrap)?;

        let (ops_tx, ops_rx) = bounded(config.op_queue_capacity);
        let minter = Arc::new(ReferenceMinter::default());
        let mirror = Arc::new(StateCell::new(state));

        let handle = ComponentHandle {
            ops: ops_tx.clone(),
            minter: Arc::clone(&minter),
            mirror: Arc::clone(&mirror),
            op_capacity: config.op_queue_capacity,
        };
        let handler = Box::new(make_handler(handle.clone()));

        let core = DispatchCore {
            ops: ops_rx,
            ops_tx,
            handler,
            lifecycle: state,
            mirror,
            minter,
            channel: None,
            channel_config: config.channel,
            stale_policy: config.stale_reply_policy,
            outbound_calls: PendingMap::new("outbound-calls"),
            inbound_calls: PendingMap::new("inbound-calls"),
            registrations: PendingMap::new("registrations"),
            acquires: PendingMap::new("acquires"),
        };

        let worker = std::thread::Builder::new()
            .name("comlink-component".to_string())
            .spawn(move || core.run())
            .map_err(|source| {
                ComponentError::Channel(ChannelError::Spawn {
                    name: "component",
                    source,
                })
            })?;

        Ok(Self {
            handle,
            worker: Some(worker),
        })
    }

    /// A cloneable handle to this component.
    pub fn handle(&self) -> ComponentHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> State {
        self.handle.state()
    }

    pub fn initialize(&self, reader: Endpoint, writer: Endpoint) -> Result<()> {
        self.handle.initialize(reader, writer)
    }

    pub fn bind(&self) -> Result<()> {
        self.handle.bind()
    }

    pub fn call(
        &self,
        component: &str,
        operation: &str,
        inputs: Value,
        payload: impl Into<Bytes>,
    ) -> Result<Reference> {
        self.handle.call(component, operation, inputs, payload)
    }

    pub fn cast(
        &self,
        component: &str,
        operation: &str,
        inputs: Value,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        self.handle.cast(component, operation, inputs, payload)
    }

    pub fn register(&self, group: &str) -> Result<Reference> {
        self.handle.register(group)
    }

    pub fn acquire(&self, spec: AcquireSpec) -> Result<Reference> {
        self.handle.acquire(spec)
    }

    pub fn call_return(&self, reference: Reference, outcome: CallOutcome) -> Result<()> {
        self.handle.call_return(reference, outcome)
    }

    pub fn terminate(&self) -> Result<()> {
        self.handle.terminate()
    }

    /// Tear down the dispatch thread and the channel workers.
    pub fn destroy(mut self) {
        self.shutdown_worker();
    }

    fn shutdown_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.handle.ops.send(Op::Stop);
            if worker.join().is_err() {
                error!("component worker panicked");
            }
        }
    }
}

impl Drop for Component {
    fn drop(&mut self) {
        self.shutdown_worker();
    }
}

/// The serialized dispatch context: sole owner of the lifecycle state, the
/// four pending-operation maps, the handler, and the channel facade.
struct DispatchCore {
    ops: Receiver<Op>,
    ops_tx: Sender<Op>,
    handler: Box<dyn ComponentHandler>,
    lifecycle: State,
    mirror: Arc<StateCell>,
    minter: Arc<ReferenceMinter>,
    channel: Option<Channel>,
    channel_config: ChannelConfig,
    stale_policy: StaleReplyPolicy,
    outbound_calls: PendingMap,
    inbound_calls: PendingMap,
    registrations: PendingMap,
    acquires: PendingMap,
}

impl DispatchCore {
    fn run(mut self) {
        debug!("dispatch context started");
        loop {
            match self.ops.recv() {
                Ok(Op::Stop) | Err(_) => break,
                Ok(op) => self.handle_op(op),
            }
        }
        if !self.outbound_calls.is_empty()
            || !self.inbound_calls.is_empty()
            || !self.registrations.is_empty()
            || !self.acquires.is_empty()
        {
            debug!(
                outbound_calls = self.outbound_calls.len(),
                inbound_calls = self.inbound_calls.len(),
                registrations = self.registrations.len(),
                acquires = self.acquires.len(),
                "pending operations abandoned at shutdown"
            );
        }
        if let Some(mut channel) = self.channel.take() {
            channel.stop();
        }
        debug!("dispatch context stopped");
    }

    fn handle_op(&mut self, op: Op) {
        match op {
            Op::Initialize { reader, writer, ack } => self.on_initialize(reader, writer, ack),
            Op::Bind { ack } => self.on_bind(ack),
            Op::Call {
                reference,
                component,
                operation,
                inputs,
                payload,
            } => self.on_call(reference, &component, &operation, inputs, payload),
            Op::Cast {
                component,
                operation,
                inputs,
                payload,
            } => self.on_cast(&component, &operation, inputs, payload),
            Op::Register { reference, group } => self.on_register(reference, &group),
            Op::Acquire { reference, spec } => self.on_acquire(reference, spec),
            Op::CallReturn { reference, outcome } => self.on_call_return(reference, outcome),
            Op::Terminate => self.on_terminate(),
            Op::ChannelInitialized => debug!("channel pipeline running"),
            Op::Deliver(message) => self.on_deliver(message),
            Op::FlowClosed(flow) => debug!(%flow, "channel flow closed"),
            Op::ChannelTerminated => self.on_channel_terminated(),
            Op::Stop => unreachable!("Stop is handled by the run loop"),
        }
    }

    fn on_initialize(&mut self, reader: Endpoint, writer: Endpoint, ack: Sender<Result<()>>) {
        let outcome = match transition(self.lifecycle, Trigger::Initialize) {
            Ok(next) => {
                let bridge = ChannelBridge {
                    ops: self.ops_tx.clone(),
                };
                match Channel::start(
                    reader,
                    writer,
                    Box::new(bridge),
                    self.channel_config.clone(),
                ) {
                    Ok(channel) => {
                        self.channel = Some(channel);
                        self.commit(next);
                        Ok(())
                    }
                    Err(err) => Err(err.into()),
                }
            }
            Err(err) => Err(err.into()),
        };
        let _ = ack.send(outcome);
    }

    fn on_bind(&mut self, ack: Sender<Result<()>>) {
        let outcome = match transition(self.lifecycle, Trigger::Bind) {
            Ok(binding) => {
                self.commit(binding);
                // This engine layer has no wire exchange to perform while
                // Binding; implementations layering discovery on top hold
                // the Binding state open for theirs.
                match transition(self.lifecycle, Trigger::BindComplete) {
                    Ok(ready) => {
                        self.commit(ready);
                        Ok(())
                    }
                    Err(err) => Err(err.into()),
                }
            }
            Err(err) => Err(err.into()),
        };
        let _ = ack.send(outcome);
    }

    fn on_call(
        &mut self,
        reference: Reference,
        component: &str,
        operation: &str,
        inputs: Value,
        payload: Bytes,
    ) {
        if !self.ensure_execute() {
            return;
        }
        let correlation = CorrelationId::mint();
        if let Err(err) = self.outbound_calls.insert(reference, correlation.clone()) {
            self.fail(err.into());
            return;
        }
        let message = wire::call_message(component, operation, inputs, &correlation, payload);
        if let Err(err) = self.send(message) {
            self.outbound_calls.remove_by_reference(reference);
            self.fail(err);
        }
    }

    fn on_cast(&mut self, component: &str, operation: &str, inputs: Value, payload: Bytes) {
        if !self.ensure_execute() {
            return;
        }
        let message = wire::cast_message(component, operation, inputs, payload);
        if let Err(err) = self.send(message) {
            self.fail(err);
        }
    }

    fn on_register(&mut self, reference: Reference, group: &str) {
        if !self.ensure_execute() {
            return;
        }
        let correlation = CorrelationId::mint();
        if let Err(err) = self.registrations.insert(reference, correlation.clone()) {
            self.fail(err.into());
            return;
        }
        let message = wire::register_message(group, &correlation);
        if let Err(err) = self.send(message) {
            self.registrations.remove_by_reference(reference);
            self.fail(err);
        }
    }

    fn on_acquire(&mut self, reference: Reference, spec: AcquireSpec) {
        if !self.ensure_execute() {
            return;
        }
        let correlation = CorrelationId::mint();
        if let Err(err) = self.acquires.insert(reference, correlation.clone()) {
            self.fail(err.into());
            return;
        }
        let message = wire::acquire_message(spec, &correlation);
        if let Err(err) = self.send(message) {
            self.acquires.remove_by_reference(reference);
            self.fail(err);
        }
    }

    fn on_call_return(&mut self, reference: Reference, outcome: CallOutcome) {
        if !self.ensure_execute() {
            return;
        }
        match self.inbound_calls.remove_by_reference(reference) {
            Some(correlation) => {
                let message = wire::call_return_message(&correlation, outcome);
                if let Err(err) = self.send(message) {
                    self.fail(err);
                }
            }
            None => self.fail(
                ProtocolError::UnknownReference {
                    reference: reference.to_string(),
                }
                .into(),
            ),
        }
    }

    fn on_terminate(&mut self) {
        match transition(self.lifecycle, Trigger::Terminate) {
            Ok(next) => {
                let starting = self.lifecycle == State::Ready;
                self.commit(next);
                if starting {
                    match &self.channel {
                        Some(channel) => channel.terminate(),
                        None => {
                            if let Ok(done) =
                                transition(self.lifecycle, Trigger::TerminateComplete)
                            {
                                self.commit(done);
                            }
                        }
                    }
                }
            }
            Err(err) => self.fail(err.into()),
        }
    }

    fn on_channel_terminated(&mut self) {
        match self.lifecycle {
            State::Terminated => {}
            State::Terminating => {
                if let Ok(next) = transition(self.lifecycle, Trigger::TerminateComplete) {
                    self.commit(next);
                }
                info!("component terminated");
            }
            state => {
                // The peer (or a fatal stream error) tore the channel down
                // under us.
                warn!(%state, "channel terminated unexpectedly");
                self.commit(State::Terminated);
            }
        }
    }

    fn on_deliver(&mut self, message: Message) {
        if transition(self.lifecycle, Trigger::Execute).is_err() {
            debug!(state = %self.lifecycle, "dropping inbound message outside ready");
            return;
        }
        let action = match wire::action(&message) {
            Ok(action) => action.to_string(),
            Err(err) => {
                warn!(%err, "inbound message without action");
                return;
            }
        };
        match (message.kind, action.as_str()) {
            (MessageKind::Exchange, wire::ACTION_CALL) => self.on_inbound_call(message),
            (MessageKind::Exchange, wire::ACTION_CAST) => self.on_inbound_cast(message),
            (MessageKind::Exchange, wire::ACTION_CALL_RETURN) => self.on_call_returned(message),
            (MessageKind::Exchange, wire::ACTION_REGISTER_RETURN) => {
                self.on_register_returned(message)
            }
            (MessageKind::Resources, wire::ACTION_ACQUIRE_RETURN) => {
                self.on_acquire_returned(message)
            }
            _ => self.on_unsupported(&action, &message),
        }
    }

    fn on_inbound_call(&mut self, message: Message) {
        let correlation = match wire::correlation(&message) {
            Ok(correlation) => correlation,
            Err(err) => {
                warn!(%err, "call without correlation, dropping");
                return;
            }
        };
        let operation = match wire::required_str(&message, wire::KEY_OPERATION) {
            Ok(operation) => operation.to_string(),
            Err(err) => {
                warn!(%err, "malformed call, answering with failure");
                let reply = wire::call_return_message(
                    &correlation,
                    CallOutcome::Err {
                        error: json!({ "code": "malformed-call", "detail": err.to_string() }),
                    },
                );
                if let Err(err) = self.send(reply) {
                    self.fail(err);
                }
                return;
            }
        };

        let reference = self.minter.mint();
        if let Err(err) = self.inbound_calls.insert(reference, correlation) {
            warn!(%err, "dropping inbound call");
            return;
        }

        let call = InboundCall {
            reference,
            component: wire::required_str(&message, wire::KEY_COMPONENT)
                .ok()
                .map(str::to_string),
            operation,
            inputs: wire::optional_value(&message, wire::KEY_INPUTS).unwrap_or(Value::Null),
            payload: message.payload,
        };
        self.invoke("called", move |handler| handler.called(call));
    }

    fn on_inbound_cast(&mut self, message: Message) {
        let operation = match wire::required_str(&message, wire::KEY_OPERATION) {
            Ok(operation) => operation.to_string(),
            Err(err) => {
                warn!(%err, "malformed cast, ignoring");
                return;
            }
        };
        let cast = InboundCast {
            operation,
            inputs: wire::optional_value(&message, wire::KEY_INPUTS).unwrap_or(Value::Null),
            payload: message.payload,
        };
        self.invoke("casted", move |handler| handler.casted(cast));
    }

    fn on_call_returned(&mut self, message: Message) {
        let Some(reference) =
            self.resolve_return(&message, wire::ACTION_CALL_RETURN, PendingKind::OutboundCall)
        else {
            return;
        };
        let reply = CallReply {
            reference,
            ok: self.ok_or_failure(&message),
            outputs: wire::optional_value(&message, wire::KEY_OUTPUTS).unwrap_or(Value::Null),
            error: wire::optional_value(&message, wire::KEY_ERROR),
            payload: message.payload,
        };
        self.invoke("call_returned", move |handler| handler.call_returned(reply));
    }

    fn on_register_returned(&mut self, message: Message) {
        let Some(reference) =
            self.resolve_return(&message, wire::ACTION_REGISTER_RETURN, PendingKind::Registration)
        else {
            return;
        };
        let ok = self.ok_or_failure(&message);
        let error = wire::optional_value(&message, wire::KEY_ERROR);
        self.invoke("register_returned", move |handler| {
            handler.register_returned(reference, ok, error)
        });
    }

    fn on_acquire_returned(&mut self, message: Message) {
        let Some(reference) =
            self.resolve_return(&message, wire::ACTION_ACQUIRE_RETURN, PendingKind::Acquire)
        else {
            return;
        };
        let reply = AcquireReply {
            reference,
            ok: self.ok_or_failure(&message),
            descriptors: wire::optional_value(&message, wire::KEY_DESCRIPTORS),
            error: wire::optional_value(&message, wire::KEY_ERROR),
        };
        self.invoke("acquire_returned", move |handler| {
            handler.acquire_returned(reply)
        });
    }

    /// Look up and remove the pending entry for a `*-return`. `None` means
    /// the return was stale, unknown, or malformed — traced, never fatal.
    fn resolve_return(
        &mut self,
        message: &Message,
        action: &'static str,
        kind: PendingKind,
    ) -> Option<Reference> {
        let correlation = match wire::correlation(message) {
            Ok(correlation) => correlation,
            Err(err) => {
                warn!(action, %err, "return without correlation, dropping");
                return None;
            }
        };
        let map = match kind {
            PendingKind::OutboundCall => &mut self.outbound_calls,
            PendingKind::Registration => &mut self.registrations,
            PendingKind::Acquire => &mut self.acquires,
        };
        match map.remove_by_correlation(&correlation) {
            Some(reference) => Some(reference),
            None => {
                match self.stale_policy {
                    StaleReplyPolicy::Warn => {
                        warn!(action, correlation = %correlation, "stale or unknown correlation, dropping return");
                    }
                    StaleReplyPolicy::Ignore => {
                        debug!(action, correlation = %correlation, "stale or unknown correlation, dropping return");
                    }
                }
                None
            }
        }
    }

    fn ok_or_failure(&self, message: &Message) -> bool {
        match wire::ok_flag(message) {
            Ok(ok) => ok,
            Err(err) => {
                warn!(%err, "return without ok flag, treating as failure");
                false
            }
        }
    }

    fn on_unsupported(&mut self, action: &str, message: &Message) {
        let is_return = action.ends_with("-return");
        match wire::correlation(message) {
            Ok(correlation) if !is_return => {
                warn!(action, "unsupported action, answering with failure");
                let reply = wire::unsupported_action_return(&correlation, action);
                if let Err(err) = self.send(reply) {
                    self.fail(err);
                }
            }
            _ => {
                warn!(action, "unsupported action, ignoring");
            }
        }
    }

    fn ensure_execute(&mut self) -> bool {
        match transition(self.lifecycle, Trigger::Execute) {
            Ok(_) => true,
            Err(err) => {
                self.fail(err.into());
                false
            }
        }
    }

    fn send(&self, message: Message) -> Result<()> {
        match &self.channel {
            Some(channel) => channel.send(message).map_err(Into::into),
            None => Err(ComponentError::NotRunning),
        }
    }

    fn commit(&mut self, next: State) {
        if next != self.lifecycle {
            debug!(from = %self.lifecycle, to = %next, "lifecycle transition");
            self.lifecycle = next;
            self.mirror.store(next);
        }
    }

    fn invoke<F>(&mut self, callback: &'static str, f: F)
    where
        F: FnOnce(&mut dyn ComponentHandler),
    {
        let handler = self.handler.as_mut();
        if std::panic::catch_unwind(AssertUnwindSafe(|| f(handler))).is_err() {
            error!(callback, "component handler panicked");
        }
    }

    fn fail(&mut self, error: ComponentError) {
        self.invoke("failed", move |handler| handler.failed(error));
    }
}

#[derive(Clone, Copy)]
enum PendingKind {
    OutboundCall,
    Registration,
    Acquire,
}
