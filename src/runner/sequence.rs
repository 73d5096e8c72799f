use anyhow::Result;
use std::future::Future;

/// Outcome of one future run through [`settle_all`].
#[derive(Debug)]
pub enum Settled<T> {
    Fulfilled(T),
    Rejected(anyhow::Error),
}

impl<T> Settled<T> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settled::Fulfilled(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Settled::Fulfilled(value) => Some(value),
            Settled::Rejected(_) => None,
        }
    }
}

impl<T> From<Result<T>> for Settled<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Settled::Fulfilled(value),
            Err(e) => Settled::Rejected(e),
        }
    }
}

/// Run task functions one at a time, in order.
///
/// Each function is invoked only after the previous one's future has
/// settled. Failures are dropped, so the output holds the successful results
/// in input order and may be shorter than the input.
pub async fn sequence<T, F, Fut>(task_funcs: Vec<F>) -> Vec<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut results = Vec::with_capacity(task_funcs.len());
    for (index, func) in task_funcs.into_iter().enumerate() {
        match func().await {
            Ok(result) => results.push(result),
            Err(e) => log::debug!("Task {} failed and was dropped: {:#}", index, e),
        }
    }
    results
}

/// Run all futures concurrently and capture every outcome, in input order.
pub async fn settle_all<T, Fut>(futures: impl IntoIterator<Item = Fut>) -> Vec<Settled<T>>
where
    Fut: Future<Output = Result<T>>,
{
    futures::future::join_all(futures)
        .await
        .into_iter()
        .map(Settled::from)
        .collect()
}
