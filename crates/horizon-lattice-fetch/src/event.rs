//! Lifecycle event bus.
//!
//! Every [`RequestContext`](crate::http::RequestContext) reports its progress
//! through five lifecycle events. Observers subscribe a [`Listener`] per
//! [`EventKind`] and receive a [`LifecycleEvent`] whose variant carries exactly
//! the arguments of that kind:
//!
//! | Kind             | Arguments            |
//! |------------------|----------------------|
//! | `RequestStart`   | context              |
//! | `RequestError`   | context, error       |
//! | `RequestEnd`     | context, response    |
//! | `TransformStart` | context, response    |
//! | `TransformEnd`   | context, response    |
//!
//! Delivery is synchronous and follows subscription order. A panicking
//! listener is not isolated: the panic unwinds out of [`EventBus::emit`] and
//! later listeners for that event are skipped.
//!
//! # Example
//!
//! ```ignore
//! use horizon_lattice_fetch::event::{EventBus, EventKind};
//!
//! let bus = EventBus::new();
//! let listener = bus.subscribe(EventKind::RequestStart, |event| {
//!     println!("starting {}", event.context().endpoint());
//! });
//!
//! // Later
//! bus.off(EventKind::RequestStart, &listener);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::Error;
use crate::http::{RawResponse, Request, RequestConfig, ResponseShape};

/// The five lifecycle points of a request execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Execution began (before any delay).
    RequestStart,
    /// The transport failed.
    RequestError,
    /// The transport returned a response.
    RequestEnd,
    /// Response transformation is about to begin.
    TransformStart,
    /// Response transformation finished.
    TransformEnd,
}

impl EventKind {
    /// All event kinds, in emission order.
    pub const ALL: [EventKind; 5] = [
        EventKind::RequestStart,
        EventKind::RequestError,
        EventKind::RequestEnd,
        EventKind::TransformStart,
        EventKind::TransformEnd,
    ];

    /// The camel-case name observers know the event by.
    pub fn name(self) -> &'static str {
        match self {
            Self::RequestStart => "requestStart",
            Self::RequestError => "requestError",
            Self::RequestEnd => "requestEnd",
            Self::TransformStart => "transformStart",
            Self::TransformEnd => "transformEnd",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-only view of the request context that emitted an event.
#[derive(Clone, Copy)]
pub struct EventContext<'a> {
    request: &'a Request,
    shape: &'a ResponseShape,
}

impl<'a> EventContext<'a> {
    pub(crate) fn new(request: &'a Request, shape: &'a ResponseShape) -> Self {
        Self { request, shape }
    }

    /// The request being executed.
    pub fn request(&self) -> &'a Request {
        self.request
    }

    /// The request descriptor.
    pub fn config(&self) -> &'a RequestConfig {
        self.request.config()
    }

    /// The request label, if one was set.
    pub fn name(&self) -> Option<&'a str> {
        self.request.name()
    }

    /// The artificial delay applied before the transport call.
    pub fn delay(&self) -> Duration {
        self.request.delay()
    }

    /// The path portion of the request URL.
    pub fn endpoint(&self) -> String {
        self.request.endpoint()
    }

    /// The expected response shape.
    pub fn shape(&self) -> &'a ResponseShape {
        self.shape
    }
}

impl fmt::Debug for EventContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContext")
            .field("method", &self.config().method)
            .field("url", &self.config().url)
            .field("name", &self.name())
            .field("shape", &self.shape)
            .finish()
    }
}

/// A lifecycle notification and its arguments.
#[derive(Debug)]
pub enum LifecycleEvent<'a> {
    /// Execution began.
    RequestStart(EventContext<'a>),
    /// The transport failed with the given error.
    RequestError(EventContext<'a>, &'a Error),
    /// The transport returned this response.
    RequestEnd(EventContext<'a>, &'a RawResponse),
    /// Transformation of this response is starting.
    TransformStart(EventContext<'a>, &'a RawResponse),
    /// Transformation finished; `data` holds the transformed payload.
    TransformEnd(EventContext<'a>, &'a RawResponse),
}

impl<'a> LifecycleEvent<'a> {
    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RequestStart(_) => EventKind::RequestStart,
            Self::RequestError(..) => EventKind::RequestError,
            Self::RequestEnd(..) => EventKind::RequestEnd,
            Self::TransformStart(..) => EventKind::TransformStart,
            Self::TransformEnd(..) => EventKind::TransformEnd,
        }
    }

    /// The context that emitted this event.
    pub fn context(&self) -> &EventContext<'a> {
        match self {
            Self::RequestStart(ctx)
            | Self::RequestError(ctx, _)
            | Self::RequestEnd(ctx, _)
            | Self::TransformStart(ctx, _)
            | Self::TransformEnd(ctx, _) => ctx,
        }
    }

    /// The error carried by `RequestError`.
    pub fn error(&self) -> Option<&'a Error> {
        match self {
            Self::RequestError(_, error) => Some(error),
            _ => None,
        }
    }

    /// The response carried by `RequestEnd`, `TransformStart` and `TransformEnd`.
    pub fn response(&self) -> Option<&'a RawResponse> {
        match self {
            Self::RequestEnd(_, response)
            | Self::TransformStart(_, response)
            | Self::TransformEnd(_, response) => Some(response),
            _ => None,
        }
    }
}

type Callback = dyn Fn(&LifecycleEvent<'_>) + Send + Sync;

/// A subscribed callback.
///
/// Listeners are compared by identity: clones of one listener are the same
/// listener, two listeners wrapping equal closures are not.
#[derive(Clone)]
pub struct Listener {
    callback: Arc<Callback>,
}

impl Listener {
    /// Wrap a callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&LifecycleEvent<'_>) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Whether both handles refer to the same callback.
    pub fn same(&self, other: &Listener) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }

    fn call(&self, event: &LifecycleEvent<'_>) {
        (self.callback)(event)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("callback", &Arc::as_ptr(&self.callback))
            .finish()
    }
}

/// Publish/subscribe registry for lifecycle events.
///
/// The bus is a cheap handle; clones share the same subscriptions.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<HashMap<EventKind, Vec<Listener>>>>,
}

impl EventBus {
    /// Create a bus with no subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `listener` to the subscribers of `kind`.
    ///
    /// Subscribing the same listener twice delivers the event to it twice.
    pub fn on(&self, kind: EventKind, listener: Listener) {
        self.listeners.lock().entry(kind).or_default().push(listener);
    }

    /// Wrap `callback` in a new listener, subscribe it and return the handle.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> Listener
    where
        F: Fn(&LifecycleEvent<'_>) + Send + Sync + 'static,
    {
        let listener = Listener::new(callback);
        self.on(kind, listener.clone());
        listener
    }

    /// Remove every occurrence of `listener` from the subscribers of `kind`.
    ///
    /// Returns the number of removed subscriptions.
    pub fn off(&self, kind: EventKind, listener: &Listener) -> usize {
        let mut listeners = self.listeners.lock();
        let Some(list) = listeners.get_mut(&kind) else {
            return 0;
        };
        let before = list.len();
        list.retain(|it| !it.same(listener));
        before - list.len()
    }

    /// Deliver `event` to every current subscriber of its kind, in order.
    ///
    /// The subscriber list is captured before delivery, so listeners may
    /// subscribe or unsubscribe from inside a callback; such changes apply
    /// from the next emission.
    #[tracing::instrument(skip_all, target = "horizon_lattice_fetch::event", level = "trace", fields(event = %event.kind()))]
    pub fn emit(&self, event: &LifecycleEvent<'_>) {
        let snapshot = match self.listeners.lock().get(&event.kind()) {
            Some(list) if !list.is_empty() => list.clone(),
            _ => return,
        };
        tracing::trace!(target: "horizon_lattice_fetch::event", listener_count = snapshot.len(), "emitting lifecycle event");

        for listener in &snapshot {
            listener.call(event);
        }
    }

    /// Number of subscriptions for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Discard all subscriptions.
    pub fn clean(&self) {
        self.listeners.lock().clear();
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.lock();
        let mut map = f.debug_map();
        for kind in EventKind::ALL {
            if let Some(list) = listeners.get(&kind) {
                map.entry(&kind.name(), &list.len());
            }
        }
        map.finish()
    }
}
