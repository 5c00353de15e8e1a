//! Store lifecycle notifications.
//!
//! The controller publishes a [`StoreEvent`] for every lifecycle step.
//! Listeners either register a synchronous callback with
//! [`EventBus::on_event`] or take an async receiver with
//! [`EventBus::subscribe`].
//!
//! # Thread Safety
//!
//! The bus is cheap to clone; clones share listeners. Callbacks run on the
//! publishing task, so they should not block.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::ProductId;

/// Capacity of the async subscriber channel. Slow subscribers lag rather
/// than block publishers.
const CHANNEL_CAPACITY: usize = 256;

/// Lifecycle notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// Platform billing is available.
    BillingSupported,
    /// Platform billing is not available.
    BillingNotSupported,
    /// A store session was opened.
    OpeningStore,
    /// A store session was closed.
    ClosingStore,
    /// A platform purchase flow was launched.
    PurchaseStarted {
        /// Product being bought.
        product_id: ProductId,
        /// Economy item sold under the product.
        item_id: String,
    },
    /// The platform reported a purchase state change for an item.
    ///
    /// Not published for redeliveries of an already granted purchase.
    PurchaseCompleted {
        /// Economy item.
        item_id: String,
        /// Payload the purchase carried.
        developer_payload: String,
    },
    /// The economy model was updated for an item.
    ItemPurchased {
        /// Economy item.
        item_id: String,
    },
    /// The user cancelled a purchase flow.
    PurchaseCancelled {
        /// Economy item.
        item_id: String,
    },
    /// An inventory restore began.
    RestoreTransactionsStarted,
    /// An inventory restore finished.
    RestoreTransactions {
        /// Whether the restore succeeded.
        success: bool,
    },
    /// Something unexpected happened; details are in the log.
    UnexpectedError {
        /// Short description.
        reason: String,
    },
}

impl StoreEvent {
    /// Build an unexpected-error event.
    pub fn unexpected(reason: impl Into<String>) -> Self {
        Self::UnexpectedError {
            reason: reason.into(),
        }
    }

    /// Short name, useful for logs and CLI output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BillingSupported => "billing_supported",
            Self::BillingNotSupported => "billing_not_supported",
            Self::OpeningStore => "opening_store",
            Self::ClosingStore => "closing_store",
            Self::PurchaseStarted { .. } => "purchase_started",
            Self::PurchaseCompleted { .. } => "purchase_completed",
            Self::ItemPurchased { .. } => "item_purchased",
            Self::PurchaseCancelled { .. } => "purchase_cancelled",
            Self::RestoreTransactionsStarted => "restore_transactions_started",
            Self::RestoreTransactions { .. } => "restore_transactions",
            Self::UnexpectedError { .. } => "unexpected_error",
        }
    }
}

/// Callback for store events.
pub type EventCallback = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

/// Publish/subscribe fan-out of [`StoreEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
    callbacks: Arc<RwLock<Vec<EventCallback>>>,
}

impl EventBus {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            callbacks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a synchronous callback.
    pub fn on_event(&self, callback: EventCallback) {
        let mut callbacks = self.callbacks.write().unwrap_or_else(|e| e.into_inner());
        callbacks.push(callback);
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to every listener.
    pub fn publish(&self, event: StoreEvent) {
        tracing::debug!(event = event.name(), "publishing store event");
        {
            let callbacks = self.callbacks.read().unwrap_or_else(|e| e.into_inner());
            for callback in callbacks.iter() {
                callback(&event);
            }
        }
        // No receivers is fine.
        let _ = self.sender.send(event);
    }

    /// Number of registered callbacks plus live subscribers.
    pub fn listener_count(&self) -> usize {
        let callbacks = self.callbacks.read().unwrap_or_else(|e| e.into_inner());
        callbacks.len() + self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Records every event it sees. Handy for tests and CLI transcripts.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<RwLock<Vec<StoreEvent>>>,
}

impl EventRecorder {
    /// Create a recorder and attach it to `bus`.
    pub fn attach(bus: &EventBus) -> Self {
        let recorder = Self::default();
        let sink = recorder.events.clone();
        bus.on_event(Arc::new(move |event| {
            sink.write()
                .unwrap_or_else(|e| e.into_inner())
                .push(event.clone());
        }));
        recorder
    }

    /// Events recorded so far.
    pub fn events(&self) -> Vec<StoreEvent> {
        self.events.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Names of the recorded events, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(StoreEvent::name).collect()
    }

    /// Number of recorded events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&StoreEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }

    /// Forget recorded events.
    pub fn clear(&self) {
        self.events.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
