//! Popup handles and the exactly-once lifecycle behind them.

use std::{
    fmt, mem,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use parking_lot::Mutex;
use popup_geom::AnchorRect;
use popup_protocol::{MessageKind, PopupId, PopupResult};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::Result;

/// Lifecycle phase of one popup. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Open was called.
    Created,
    /// Surface built, geometry computed, channel wired.
    Opening,
    /// The surface reported ready; `on_open` fired.
    Ready,
    /// Exchanging messages.
    Live,
    /// A close source fired; teardown in progress.
    Closing,
    /// Torn down and resolved.
    Closed,
}

/// Hook run once with the final result.
pub type SettledHook = Box<dyn FnOnce(&PopupResult) + Send>;

/// Resolution state, guarded together so settle and hook registration
/// cannot interleave.
struct Settlement {
    /// Present until the result is sent.
    sender: Option<oneshot::Sender<PopupResult>>,
    /// The result, once settled.
    outcome: Option<PopupResult>,
    /// Hooks waiting for the result.
    hooks: Vec<SettledHook>,
}

/// Exactly-once open/close state shared by a handle and its adapter.
pub struct Lifecycle {
    /// Popup this lifecycle belongs to.
    id: PopupId,
    /// Flipped false at the very start of close; every later step checks it.
    open: AtomicBool,
    /// Current phase.
    phase: Mutex<Phase>,
    /// Result plumbing.
    settlement: Mutex<Settlement>,
    /// Awaitable result shared by every handle clone.
    result: Shared<BoxFuture<'static, PopupResult>>,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .field("phase", &self.phase())
            .finish()
    }
}

impl Lifecycle {
    /// Fresh lifecycle in the `Created` phase.
    pub fn new(id: PopupId) -> Arc<Self> {
        let (tx, rx) = oneshot::channel();
        let result = rx
            .map(|r| r.unwrap_or_else(|_| PopupResult::programmatic()))
            .boxed()
            .shared();
        Arc::new(Self {
            id,
            open: AtomicBool::new(false),
            phase: Mutex::new(Phase::Created),
            settlement: Mutex::new(Settlement {
                sender: Some(tx),
                outcome: None,
                hooks: Vec::new(),
            }),
            result,
        })
    }

    /// Popup this lifecycle tracks.
    pub fn id(&self) -> &PopupId {
        &self.id
    }

    /// True until closing begins.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    /// Enter `Opening` and mark the popup open.
    pub fn mark_opening(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.advance(Phase::Opening);
    }

    /// Move forward to `phase`. Ignored when it would move backwards or when
    /// a close has started and `phase` is not part of closing.
    pub fn advance(&self, phase: Phase) {
        let mut cur = self.phase.lock();
        let closing = *cur >= Phase::Closing;
        if phase > *cur && (!closing || phase == Phase::Closed) {
            trace!(popup_id = %self.id, from = ?*cur, to = ?phase, "phase");
            *cur = phase;
        }
    }

    /// Start closing. Returns true for exactly one caller; everyone after
    /// that, and anyone calling before the popup opened, gets false.
    pub fn begin_close(&self) -> bool {
        if self.open.swap(false, Ordering::SeqCst) {
            self.advance(Phase::Closing);
            debug!(popup_id = %self.id, "closing");
            true
        } else {
            false
        }
    }

    /// Resolve the result. Only the first call has any effect; it returns
    /// true and runs the settled hooks.
    pub fn settle(&self, result: PopupResult) -> bool {
        let (sender, hooks) = {
            let mut s = self.settlement.lock();
            let Some(sender) = s.sender.take() else {
                trace!(popup_id = %self.id, "late resolution ignored");
                return false;
            };
            s.outcome = Some(result.clone());
            (sender, mem::take(&mut s.hooks))
        };
        self.open.store(false, Ordering::SeqCst);
        self.advance(Phase::Closed);
        debug!(
            popup_id = %self.id,
            confirmed = result.confirmed,
            reason = ?result.close_reason,
            "resolved"
        );
        for hook in hooks {
            hook(&result);
        }
        // Nobody awaiting is fine.
        sender.send(result).ok();
        true
    }

    /// Run `hook` with the result once it settles; immediately if it already
    /// has.
    pub fn on_settled(&self, hook: SettledHook) {
        let mut s = self.settlement.lock();
        match s.outcome.clone() {
            None => s.hooks.push(hook),
            Some(r) => {
                drop(s);
                hook(&r);
            }
        }
    }

    /// The result, if already settled.
    pub fn outcome(&self) -> Option<PopupResult> {
        self.settlement.lock().outcome.clone()
    }

    /// Future resolving to the result.
    pub fn result(&self) -> Shared<BoxFuture<'static, PopupResult>> {
        self.result.clone()
    }
}

/// Adapter-side operations behind a handle.
pub trait PopupControl: Send + Sync {
    /// Begin closing with `result`; later calls are ignored.
    fn close(&self, result: PopupResult);
    /// Send a message to the content.
    fn send(&self, kind: MessageKind, payload: Option<Value>) -> Result<()>;
    /// Re-place the popup, measuring the anchor again when `anchor` is `None`.
    fn update_position(&self, anchor: Option<AnchorRect>);
}

/// Live controller for one popup.
///
/// Clones share state. Once closed a handle stays closed: every operation
/// except awaiting the result becomes a no-op.
#[derive(Clone)]
pub struct PopupHandle {
    /// Shared lifecycle.
    lifecycle: Arc<Lifecycle>,
    /// Adapter operations.
    control: Arc<dyn PopupControl>,
}

impl fmt::Debug for PopupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopupHandle")
            .field("id", self.id())
            .field("phase", &self.phase())
            .finish()
    }
}

impl PopupHandle {
    /// Handle over `lifecycle`, acting through `control`.
    pub fn new(lifecycle: Arc<Lifecycle>, control: Arc<dyn PopupControl>) -> Self {
        Self { lifecycle, control }
    }

    /// Popup id.
    pub fn id(&self) -> &PopupId {
        self.lifecycle.id()
    }

    /// True until closing begins.
    pub fn is_open(&self) -> bool {
        self.lifecycle.is_open()
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    /// Shared lifecycle state.
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Close with `result`, or a `programmatic` result when none is given.
    pub fn close(&self, result: Option<PopupResult>) {
        if self.is_open() {
            self.control
                .close(result.unwrap_or_else(PopupResult::programmatic));
        }
    }

    /// Send a message to the popup content. No-op once closed.
    pub fn send(&self, kind: MessageKind, payload: Option<Value>) -> Result<()> {
        if !self.is_open() {
            trace!(popup_id = %self.id(), kind = %kind, "send after close ignored");
            return Ok(());
        }
        self.control.send(kind, payload)
    }

    /// Recompute the position against `anchor`, or against a fresh
    /// measurement of the original anchor when `None`.
    pub fn update_position(&self, anchor: Option<AnchorRect>) {
        if self.is_open() {
            self.control.update_position(anchor);
        }
    }

    /// Wait for the final result.
    pub async fn result(&self) -> PopupResult {
        self.lifecycle.result().await
    }

    /// The final result if it is already known.
    pub fn try_result(&self) -> Option<PopupResult> {
        self.lifecycle.outcome()
    }
}

/// Interpret a `submit-result` payload: a full result when it parses as one,
/// otherwise a confirmed submit carrying the payload as data.
pub fn result_from_payload(payload: Option<Value>) -> PopupResult {
    match payload {
        Some(v) => serde_json::from_value::<PopupResult>(v.clone())
            .unwrap_or_else(|_| PopupResult::submit(Some(v))),
        None => PopupResult::submit(None),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use popup_protocol::CloseReason;
    use serde_json::json;

    use super::*;

    #[test]
    fn close_is_exactly_once() {
        let lc = Lifecycle::new(PopupId::new("p"));
        assert!(!lc.begin_close(), "not open yet");
        lc.mark_opening();
        assert!(lc.begin_close());
        assert!(!lc.begin_close());
        assert_eq!(lc.phase(), Phase::Closing);
        assert!(lc.settle(PopupResult::cancel()));
        assert!(!lc.settle(PopupResult::submit(None)));
        assert_eq!(lc.outcome(), Some(PopupResult::cancel()));
        assert_eq!(lc.phase(), Phase::Closed);
    }

    #[test]
    fn phases_never_move_back() {
        let lc = Lifecycle::new(PopupId::new("p"));
        lc.mark_opening();
        lc.advance(Phase::Live);
        lc.advance(Phase::Ready);
        assert_eq!(lc.phase(), Phase::Live);
        lc.begin_close();
        lc.advance(Phase::Live);
        assert_eq!(lc.phase(), Phase::Closing);
    }

    #[test]
    fn hooks_run_once_whenever_registered() {
        let lc = Lifecycle::new(PopupId::new("p"));
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        lc.on_settled(Box::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        lc.mark_opening();
        lc.begin_close();
        lc.settle(PopupResult::programmatic());
        lc.settle(PopupResult::programmatic());
        let h = hits.clone();
        lc.on_settled(Box::new(move |r| {
            assert_eq!(r.close_reason, CloseReason::Programmatic);
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn result_future_is_shared() {
        let lc = Lifecycle::new(PopupId::new("p"));
        let a = lc.result();
        let b = lc.result();
        lc.mark_opening();
        lc.begin_close();
        lc.settle(PopupResult::submit(Some(json!("x"))));
        assert_eq!(a.await, b.await);
    }

    #[test]
    fn payload_interpretation() {
        let full = serde_json::to_value(PopupResult::cancel()).unwrap();
        assert_eq!(result_from_payload(Some(full)), PopupResult::cancel());
        assert_eq!(
            result_from_payload(Some(json!({"choice": 2}))),
            PopupResult::submit(Some(json!({"choice": 2})))
        );
        assert_eq!(result_from_payload(None), PopupResult::submit(None));
    }
}
