//! Event bus used by layers to notify dependent models
//!
//! Subscribers receive events through their own queue and drain it when they
//! are ready, so publishing never calls back into a subscriber that is in the
//! middle of a mutation.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::value::{AttributeValue, FeatureId};

type Queue<E> = Mutex<VecDeque<E>>;

/// Fan-out event bus with per-subscriber queues
pub struct EventBus<E> {
    queues: Mutex<Vec<Weak<Queue<E>>>>,
}

/// Receiving end of an [`EventBus`]; dropping it unsubscribes
pub struct Subscription<E> {
    queue: Arc<Queue<E>>,
}

/// Notifications published by a vector layer
#[derive(Debug, Clone, PartialEq)]
pub enum LayerEvent {
    /// A feature was added to the layer
    FeatureAdded(FeatureId),

    /// A feature was deleted from the layer
    FeatureDeleted(FeatureId),

    /// One attribute of a feature changed
    AttributeValueChanged {
        id: FeatureId,
        field: usize,
        value: AttributeValue,
    },

    /// The layer content changed wholesale
    LayerModified { geometry_only: bool },

    /// The layer is going away
    LayerDeleted,
}

impl<E: Clone> EventBus<E> {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(Vec::new()),
        }
    }

    /// Register a new subscriber queue
    pub fn subscribe(&self) -> Subscription<E> {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        self.queues.lock().push(Arc::downgrade(&queue));
        Subscription { queue }
    }

    /// Publish an event to every live subscriber
    pub fn publish(&self, event: E) {
        let mut queues = self.queues.lock();
        queues.retain(|weak| match weak.upgrade() {
            Some(queue) => {
                queue.lock().push_back(event.clone());
                true
            }
            None => false,
        });
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.queues.lock().iter().filter(|weak| weak.strong_count() > 0).count()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Subscription<E> {
    /// Take every pending event in publication order
    pub fn drain(&self) -> Vec<E> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
