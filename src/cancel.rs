//! Batch cancellation wiring.
//!
//! Every in-flight document holds a clone of one
//! [`CancellationToken`] and races its network call against
//! [`CancellationToken::cancelled`]. The CLI cancels it on Ctrl-C.

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Cancel the returned token on Ctrl-C.
pub fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    cancel_when(token.clone(), async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No handler could be installed; never fire.
            std::future::pending::<()>().await;
        }
    });
    token
}

/// Cancel `token` once `signal` resolves.
///
/// Nothing happens if the token is already cancelled by then.
pub fn cancel_when<F>(token: CancellationToken, signal: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            _ = signal => {
                tracing::warn!("interrupted, cancelling in-flight documents");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });
}
