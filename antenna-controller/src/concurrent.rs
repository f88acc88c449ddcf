use std::future::Future;
use tokio::task::JoinError;

/// Spawns every operation as its own task and waits for all of them.
///
/// Results come back in the order the operations were given, whether each one
/// succeeded, failed or panicked. Tasks that are already running keep going if
/// the returned future is dropped.
pub async fn run_concurrently<I, F, T>(ops: I) -> Vec<Result<T, JoinError>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = ops.into_iter().map(tokio::spawn).collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::{Instant, sleep};

    #[tokio::test]
    async fn runs_in_parallel_and_keeps_order() {
        let started = Instant::now();

        let results = run_concurrently([300u64, 100, 200].map(|ms| async move {
            sleep(Duration::from_millis(ms)).await;
            ms
        }))
        .await;

        let values: Vec<u64> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![300, 100, 200]);
        assert!(started.elapsed() < Duration::from_millis(550));
    }

    #[tokio::test]
    async fn a_panicking_task_does_not_hide_the_others() {
        let results = run_concurrently([false, true].map(|boom| async move {
            if boom {
                panic!("axis task exploded");
            }
            7
        }))
        .await;

        assert_eq!(*results[0].as_ref().unwrap(), 7);
        assert!(results[1].as_ref().unwrap_err().is_panic());
    }
}
