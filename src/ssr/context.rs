//! Render context: hydration data collected while one render runs.
//!
//! The subscription layer reports what it fetched through [`record_subscription`]
//! and [`add_documents`]. Those calls land in the context of the render that is
//! currently executing on this task; each orchestrator call opens a fresh one
//! with [`scope`] and the context is dropped when that future completes or is
//! cancelled. Work spawned onto other tasks does not inherit the context.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::Future;

use serde::Serialize;
use serde_json::Value;

tokio::task_local! {
    static RENDER_CONTEXT: RefCell<RenderContext>;
}

/// Accumulates hydration snapshots for exactly one in-flight render.
#[derive(Debug, Default)]
pub struct RenderContext {
    subscriptions: BTreeMap<String, Vec<Value>>,
    collections: BTreeMap<String, Vec<Vec<Value>>>,
}

impl RenderContext {
    pub fn record_subscription(&mut self, name: impl Into<String>, params: Value) {
        self.subscriptions
            .entry(name.into())
            .or_default()
            .push(params);
    }

    pub fn add_documents(&mut self, collection: impl Into<String>, documents: Vec<Value>) {
        if documents.is_empty() {
            return;
        }
        self.collections
            .entry(collection.into())
            .or_default()
            .push(documents);
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty() && self.collections.is_empty()
    }

    /// Take everything collected so far, leaving the context empty.
    pub fn drain(&mut self) -> HydrationPayload {
        HydrationPayload {
            subscriptions: std::mem::take(&mut self.subscriptions),
            collection_data: std::mem::take(&mut self.collections),
        }
    }
}

/// Server-fetched data the client needs to resume without refetching.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationPayload {
    pub subscriptions: BTreeMap<String, Vec<Value>>,
    pub collection_data: BTreeMap<String, Vec<Vec<Value>>>,
}

impl HydrationPayload {
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty() && self.collection_data.is_empty()
    }
}

/// Run `f` inside a fresh render context.
pub async fn scope<F>(f: F) -> F::Output
where
    F: Future,
{
    RENDER_CONTEXT
        .scope(RefCell::new(RenderContext::default()), f)
        .await
}

/// Whether a render context is open on the current task.
pub fn is_active() -> bool {
    RENDER_CONTEXT.try_with(|_| ()).is_ok()
}

/// Record a subscription made during rendering. Ignored outside a render.
pub fn record_subscription(name: impl Into<String>, params: Value) {
    let _ = RENDER_CONTEXT.try_with(|ctx| ctx.borrow_mut().record_subscription(name, params));
}

/// Record documents fetched for `collection` during rendering. Ignored outside a render.
pub fn add_documents(collection: impl Into<String>, documents: Vec<Value>) {
    let _ = RENDER_CONTEXT.try_with(|ctx| ctx.borrow_mut().add_documents(collection, documents));
}

/// Drain the current render context; empty outside a render.
pub fn drain() -> HydrationPayload {
    RENDER_CONTEXT
        .try_with(|ctx| ctx.borrow_mut().drain())
        .unwrap_or_default()
}
