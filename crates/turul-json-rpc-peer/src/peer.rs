//! The peer: requester and responder over one duplex channel

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::{
    codec::{Codec, JsonCodec},
    config::PeerConfig,
    dispatch::{DispatchOutcome, Dispatched, Dispatcher},
    duplex::{PeerEvent, Subscribers, SubscriptionId, Writable},
    error::{PeerError, PeerResult},
    handler::{DefaultHandler, Handler},
    pending::{PendingRequests, PendingResponse},
    request::RequestParams,
};

/// A bidirectional JSON-RPC 2.0 peer.
///
/// `Peer` is a cheap handle; clones share the same pending requests,
/// handler and subscribers.
#[derive(Clone)]
pub struct Peer {
    inner: Arc<PeerInner>,
}

struct PeerInner {
    config: PeerConfig,
    codec: Arc<dyn Codec>,
    pending: Arc<PendingRequests>,
    dispatcher: Dispatcher,
    subscribers: Subscribers,
    ended: AtomicBool,
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("config", &self.inner.config)
            .field("pending_requests", &self.inner.pending.len())
            .field("subscribers", &self.inner.subscribers.len())
            .field("ended", &self.is_ended())
            .finish()
    }
}

impl Default for Peer {
    fn default() -> Self {
        Self::new()
    }
}

impl Peer {
    /// Peer with the default configuration and the default handler
    pub fn new() -> Self {
        PeerBuilder::new().build()
    }

    /// Peer answering inbound calls with `handler`
    pub fn with_handler<H: Handler>(handler: H) -> Self {
        PeerBuilder::new().with_handler(handler).build()
    }

    pub fn builder() -> PeerBuilder {
        PeerBuilder::new()
    }

    pub fn config(&self) -> &PeerConfig {
        &self.inner.config
    }

    /// Send a request; the returned future settles with the matching
    /// response or error.
    ///
    /// The request is registered and emitted before this returns, so the
    /// future only needs to be awaited to observe the result.
    pub fn send(
        &self,
        method: &str,
        params: Option<RequestParams>,
    ) -> impl Future<Output = PeerResult<Value>> + Send + 'static {
        let started = self.start_request(method, params.as_ref());
        async move { started?.wait().await }
    }

    fn start_request(
        &self,
        method: &str,
        params: Option<&RequestParams>,
    ) -> PeerResult<PendingResponse> {
        if self.is_ended() {
            return Err(PeerError::Closed);
        }

        // Dropping `pending` on an encoding failure removes its entry
        let pending = self.inner.pending.register();
        let request = self.inner.codec.encode_request(pending.id(), method, params)?;

        debug!(id = %pending.id(), method = %method, "Sending request");
        self.push(Some(request));
        Ok(pending)
    }

    /// Send a notification; no response is expected
    pub fn notify(&self, method: &str, params: Option<RequestParams>) -> PeerResult<()> {
        if self.is_ended() {
            return Err(PeerError::Closed);
        }

        let notification = self.inner.codec.encode_notification(method, params.as_ref())?;
        debug!(method = %method, "Sending notification");
        self.push(Some(notification));
        Ok(())
    }

    /// Reject every outstanding request with `reason`. In-flight handlers are
    /// not interrupted. Returns how many requests were failed.
    pub fn fail_all(&self, reason: PeerError) -> usize {
        let failed = self.inner.pending.fail_all(reason);
        if failed > 0 {
            debug!(count = failed, "Failed pending requests");
        }
        failed
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Decode and route one inbound message, returning what should be sent
    /// back.
    ///
    /// Faults of a single message are returned as `Err`. Faults of batch
    /// members are raised as [`PeerEvent::Fault`] so the rest of the batch
    /// still gets its replies.
    pub async fn dispatch(&self, raw: &str, context: Option<Value>) -> PeerResult<DispatchOutcome> {
        if self.inner.config.logging.log_inbound {
            trace!(message = %raw, "Inbound message");
        }

        match self.inner.dispatcher.dispatch(raw, context).await {
            Dispatched::Outcome(outcome, faults) => {
                for fault in faults {
                    self.raise_fault(fault);
                }
                Ok(outcome)
            }
            Dispatched::Fault(fault) => Err(fault),
        }
    }

    /// Accept one inbound message from the transport
    pub fn write(&self, raw: impl Into<String>) {
        self.write_with_context(raw, None)
    }

    /// Accept one inbound message, passing `context` through to the handler.
    ///
    /// Dispatch runs on the current tokio runtime. Replies are pushed as
    /// [`PeerEvent::Data`]; faults are raised as [`PeerEvent::Fault`] and
    /// never returned to the caller.
    ///
    /// Ending the peer only closes the outbound side: late responses still
    /// settle pending requests, while replies produced after end are dropped.
    pub fn write_with_context(&self, raw: impl Into<String>, context: Option<Value>) {
        let raw = raw.into();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.raise_fault(PeerError::NoRuntime);
            return;
        };

        let peer = self.clone();
        runtime.spawn(async move {
            match peer.dispatch(&raw, context).await {
                Ok(outcome) => {
                    if let Some(reply) = outcome.into_wire() {
                        peer.push(Some(reply));
                    }
                }
                Err(fault) => peer.raise_fault(fault),
            }
        });
    }

    /// Emit outbound data. `None` is the end-of-stream marker and behaves
    /// like [`Peer::end`].
    pub fn push(&self, data: Option<String>) {
        let Some(data) = data else {
            self.end();
            return;
        };

        if self.is_ended() {
            debug!("Dropping outbound message after end");
            return;
        }

        if self.inner.config.logging.log_outbound {
            trace!(message = %data, "Outbound message");
        }
        self.inner.subscribers.emit(&PeerEvent::Data(data));
    }

    /// Signal that no more outbound data will be produced. Only the first
    /// call has an effect.
    pub fn end(&self) {
        if self.inner.ended.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("Peer ended");
        if self.inner.config.fail_pending_on_end {
            self.fail_all(PeerError::Closed);
        }
        self.inner.subscribers.emit(&PeerEvent::End);
    }

    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::SeqCst)
    }

    /// Handle that does not keep the peer alive
    pub fn downgrade(&self) -> WeakPeer {
        WeakPeer {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Forward this peer's outbound data and end into `target`.
    ///
    /// Returns `target`, so `a.pipe(b.clone()).pipe(a.clone())` connects two
    /// peers in both directions. The pipe detaches itself after forwarding
    /// end, once the target is closed, or when [`Peer::unpipe`] is called.
    ///
    /// A piped [`Peer`] is held weakly, so mutually piped peers are freed
    /// once every handle to them is dropped.
    pub fn pipe<T>(&self, target: T) -> T
    where
        T: Writable + Clone,
    {
        self.inner.subscribers.pipe(target.clone().into_pipe());
        target
    }

    /// Like [`Peer::pipe`], returning the id that detaches this one target
    /// through [`Peer::unsubscribe`]
    pub fn pipe_with_id<T: Writable>(&self, target: T) -> SubscriptionId {
        self.inner.subscribers.pipe(target.into_pipe())
    }

    /// Detach every pipe target. Returns how many were removed.
    pub fn unpipe(&self) -> usize {
        self.inner.subscribers.remove_pipes()
    }

    /// Register a listener for outbound data, end and fault events
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&PeerEvent) + Send + Sync + 'static,
    {
        self.inner.subscribers.listen(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.remove(id)
    }

    /// Receive every subsequent event on a channel. The subscription ends
    /// when the receiver is dropped.
    pub fn events(&self) -> mpsc::UnboundedReceiver<PeerEvent> {
        self.inner.subscribers.channel()
    }

    fn raise_fault(&self, fault: PeerError) {
        warn!(error = %fault, "Peer fault");
        self.inner.subscribers.emit(&PeerEvent::Fault(fault));
    }
}

impl Writable for Peer {
    fn write(&self, data: String) {
        Peer::write(self, data)
    }

    fn end(&self) {
        Peer::end(self)
    }

    fn into_pipe(self) -> Arc<dyn Writable> {
        Arc::new(self.downgrade())
    }
}

/// Non-owning handle to a [`Peer`]
#[derive(Clone)]
pub struct WeakPeer {
    inner: Weak<PeerInner>,
}

impl WeakPeer {
    pub fn upgrade(&self) -> Option<Peer> {
        self.inner.upgrade().map(|inner| Peer { inner })
    }
}

impl std::fmt::Debug for WeakPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakPeer")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Writable for WeakPeer {
    fn write(&self, data: String) {
        match self.upgrade() {
            Some(peer) => peer.write(data),
            None => debug!("Pipe target dropped, discarding message"),
        }
    }

    fn end(&self) {
        if let Some(peer) = self.upgrade() {
            peer.end();
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.strong_count() == 0
    }
}

/// Builder for [`Peer`]
pub struct PeerBuilder {
    config: PeerConfig,
    handler: Option<Arc<dyn Handler>>,
    codec: Option<Arc<dyn Codec>>,
}

impl PeerBuilder {
    pub fn new() -> Self {
        Self {
            config: PeerConfig::default(),
            handler: None,
            codec: None,
        }
    }

    pub fn with_config(mut self, config: PeerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_handler<H: Handler>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Share one handler between several peers
    pub fn with_shared_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_codec<C: Codec>(mut self, codec: C) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    pub fn build(self) -> Peer {
        let codec = self.codec.unwrap_or_else(|| Arc::new(JsonCodec));
        let handler = self.handler.unwrap_or_else(|| Arc::new(DefaultHandler));
        let pending = Arc::new(PendingRequests::new(self.config.request_ids));
        let dispatcher = Dispatcher::new(codec.clone(), handler, pending.clone());

        Peer {
            inner: Arc::new(PeerInner {
                config: self.config,
                codec,
                pending,
                dispatcher,
                subscribers: Subscribers::default(),
                ended: AtomicBool::new(false),
            }),
        }
    }
}

impl Default for PeerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
