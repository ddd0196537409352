//! Panic isolation for phase and strategy logic.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

/// Run `fut`, turning a panic inside it into an error message.
pub(crate) async fn isolate<F: Future>(fut: F) -> std::result::Result<F::Output, String> {
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|payload| panic_message(payload.as_ref()))
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_values_through() {
        assert_eq!(isolate(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn captures_panic_text() {
        let err = isolate(async {
            let n = 42;
            if n > 0 {
                panic!("boom {n}");
            }
            n
        })
        .await
        .unwrap_err();
        assert_eq!(err, "boom 42");

        let err = isolate(async {
            let code = 3_u8;
            if code > 0 {
                std::panic::panic_any(code);
            }
            code
        })
        .await
        .unwrap_err();
        assert_eq!(err, "unknown panic payload");
    }
}
