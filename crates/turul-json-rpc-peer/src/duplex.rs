//! Duplex surface: outbound events, pipe targets and the subscriber registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::PeerError;

/// Events a peer produces on its outbound side
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// An encoded message for the remote side, to be forwarded verbatim
    Data(String),
    /// No more data will be produced
    End,
    /// A local fault with no reply channel (out-of-band)
    Fault(PeerError),
}

/// Anything a peer can be piped into
pub trait Writable: Send + Sync + 'static {
    /// Accept one inbound message
    fn write(&self, data: String);

    /// The upstream will produce no more data
    fn end(&self);

    /// A closed target is detached from the pipe on the next event
    fn is_closed(&self) -> bool {
        false
    }

    /// The sink stored when this target is piped into
    fn into_pipe(self) -> Arc<dyn Writable>
    where
        Self: Sized,
    {
        Arc::new(self)
    }
}

/// Forward data and end events into a channel, for transports driven by a
/// receive loop
impl Writable for mpsc::UnboundedSender<PeerEvent> {
    fn write(&self, data: String) {
        let _ = self.send(PeerEvent::Data(data));
    }

    fn end(&self) {
        let _ = self.send(PeerEvent::End);
    }

    fn is_closed(&self) -> bool {
        mpsc::UnboundedSender::is_closed(self)
    }
}

/// Handle returned by [`Peer::subscribe`](crate::Peer::subscribe)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&PeerEvent) + Send + Sync>;

#[derive(Clone)]
enum Sink {
    Listener(Listener),
    Channel(mpsc::UnboundedSender<PeerEvent>),
    Pipe(Arc<dyn Writable>),
}

impl Sink {
    /// Deliver `event`; returns whether the sink stays registered
    fn deliver(&self, event: &PeerEvent) -> bool {
        match self {
            Sink::Listener(listener) => {
                listener(event);
                true
            }
            Sink::Channel(sender) => sender.send(event.clone()).is_ok(),
            Sink::Pipe(target) if target.is_closed() => false,
            Sink::Pipe(target) => match event {
                PeerEvent::Data(data) => {
                    target.write(data.clone());
                    true
                }
                PeerEvent::End => {
                    target.end();
                    false
                }
                PeerEvent::Fault(_) => true,
            },
        }
    }
}

/// Registered sinks, notified in registration order
#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: AtomicU64,
    sinks: Mutex<Vec<(SubscriptionId, Sink)>>,
}

impl Subscribers {
    fn add(&self, sink: Sink) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sinks.lock().push((id, sink));
        id
    }

    pub fn listen(&self, listener: impl Fn(&PeerEvent) + Send + Sync + 'static) -> SubscriptionId {
        self.add(Sink::Listener(Arc::new(listener)))
    }

    pub fn channel(&self) -> mpsc::UnboundedReceiver<PeerEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.add(Sink::Channel(sender));
        receiver
    }

    pub fn pipe(&self, target: Arc<dyn Writable>) -> SubscriptionId {
        self.add(Sink::Pipe(target))
    }

    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut sinks = self.sinks.lock();
        let before = sinks.len();
        sinks.retain(|(sink_id, _)| *sink_id != id);
        sinks.len() != before
    }

    /// Remove every pipe target, returning how many were removed
    pub fn remove_pipes(&self) -> usize {
        let mut sinks = self.sinks.lock();
        let before = sinks.len();
        sinks.retain(|(_, sink)| !matches!(sink, Sink::Pipe(_)));
        before - sinks.len()
    }

    /// Deliver `event` to every sink. Sinks run outside the lock so they may
    /// re-enter the peer.
    pub fn emit(&self, event: &PeerEvent) {
        let snapshot: Vec<(SubscriptionId, Sink)> = self.sinks.lock().clone();

        let finished: Vec<SubscriptionId> = snapshot
            .into_iter()
            .filter_map(|(id, sink)| (!sink.deliver(event)).then_some(id))
            .collect();

        if !finished.is_empty() {
            self.sinks
                .lock()
                .retain(|(id, _)| !finished.contains(id));
        }
    }

    pub fn len(&self) -> usize {
        self.sinks.lock().len()
    }
}
