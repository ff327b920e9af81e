//! Per-invocation isolation for user-supplied handlers.

use std::{
    any::Any,
    error::Error as StdError,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use popup_protocol::Message;
use tracing::warn;

/// Error type handlers may return.
pub type HandlerError = Box<dyn StdError + Send + Sync>;

/// Return type of every message handler.
pub type HandlerResult = Result<(), HandlerError>;

/// Subscriber callback for channel messages.
pub type MessageHandler = Arc<dyn Fn(&Message) -> HandlerResult + Send + Sync>;

/// Best-effort text for a panic payload.
fn panic_text(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run `f`, catching both an `Err` return and a panic. Failures are logged
/// against `context` and reported as `false`.
pub fn run_isolated(context: &str, f: impl FnOnce() -> HandlerResult) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(context, error = %e, "handler returned an error");
            false
        }
        Err(payload) => {
            warn!(context, panic = %panic_text(payload.as_ref()), "handler panicked");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_success_error_and_panic() {
        assert!(run_isolated("ok", || Ok(())));
        assert!(!run_isolated("err", || Err("nope".into())));
        assert!(!run_isolated("panic", || panic!("boom")));
    }
}
