use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::time::Instant;

/// Drives `f` once per `interval` until it breaks.
pub async fn poll<T, F, Fut>(interval: Duration, mut f: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ControlFlow<T>>,
{
    let mut interval = tokio::time::interval(interval);

    loop {
        interval.tick().await;

        if let ControlFlow::Break(ret) = f().await {
            break ret;
        }
    }
}

/// Like [`poll`], but bounded by `timeout`.
///
/// `f` yields `Continue` with the latest observation while the condition is
/// unmet; that observation is returned as-is once the deadline elapses. A zero
/// timeout means no deadline. `f` always runs at least once, even with a
/// timeout shorter than the interval.
pub async fn poll_deadline<T, F, Fut>(interval: Duration, timeout: Duration, mut f: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ControlFlow<T, T>>,
{
    let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
    let mut interval = tokio::time::interval(interval);

    loop {
        interval.tick().await;

        match f().await {
            ControlFlow::Break(ret) => break ret,
            ControlFlow::Continue(last) => {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    break last;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn breaks_on_condition() {
        let mut n = 0;
        let ret = poll(Duration::from_millis(1), || {
            n += 1;
            let n = n;
            async move {
                if n >= 3 {
                    ControlFlow::Break(n)
                } else {
                    ControlFlow::Continue(())
                }
            }
        })
        .await;
        assert_eq!(ret, 3);
    }

    #[tokio::test]
    async fn deadline_returns_last_observation() {
        let ret = poll_deadline(Duration::from_millis(5), Duration::from_millis(20), || async {
            ControlFlow::<u32, u32>::Continue(7)
        })
        .await;
        assert_eq!(ret, 7);
    }

    #[tokio::test]
    async fn zero_timeout_means_no_deadline() {
        let mut n = 0;
        let ret = poll_deadline(Duration::from_millis(1), Duration::ZERO, || {
            n += 1;
            let n = n;
            async move {
                if n >= 50 {
                    ControlFlow::Break(n)
                } else {
                    ControlFlow::Continue(n)
                }
            }
        })
        .await;
        assert_eq!(ret, 50);
    }
}
