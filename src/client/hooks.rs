use async_trait::async_trait;
use std::future::Future;

use crate::http::{AttemptOutcome, CallResult};

/// Callback consulted by [`AsyncClient`](super::AsyncClient) after an attempt.
///
/// Returning `Some` makes that value the result of the call; `None` keeps the
/// client's default behavior.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Hook: Send + Sync {
    async fn handle(&self, outcome: &AttemptOutcome) -> Option<CallResult>;
}

/// [`Hook`] built from a closure returning a future.
pub struct FnHook<F>(F);

/// Wraps a closure as a [`Hook`]. The closure receives its own copy of the
/// outcome, so the returned future may hold on to it.
///
/// ```
/// use paced::client::hook_fn;
///
/// let hook = hook_fn(|outcome| async move {
///     log::info!("attempt finished: {:?}", outcome);
///     None
/// });
/// # let _ = hook;
/// ```
pub fn hook_fn<F, Fut>(f: F) -> FnHook<F>
where
    F: Fn(AttemptOutcome) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<CallResult>> + Send + 'static,
{
    FnHook(f)
}

#[async_trait]
impl<F, Fut> Hook for FnHook<F>
where
    F: Fn(AttemptOutcome) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<CallResult>> + Send + 'static,
{
    async fn handle(&self, outcome: &AttemptOutcome) -> Option<CallResult> {
        (self.0)(outcome.clone()).await
    }
}
