use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

/// One-shot completion flag.
///
/// Any number of tasks may `wait`; all of them resume once `release` is
/// called. Releasing twice is harmless.
#[derive(Debug, Default, Clone)]
pub struct Latch(Arc<Inner>);

#[derive(Debug, Default)]
struct Inner {
    released: AtomicBool,
    waiters: Mutex<Vec<Waker>>,
}

impl Latch {
    pub fn release(&self) {
        self.0.released.store(true, Ordering::Release);
        let mut waiters = self.0.waiters.lock().unwrap();
        for waker in waiters.drain(..) {
            waker.wake();
        }
    }

    pub fn is_released(&self) -> bool {
        self.0.released.load(Ordering::Acquire)
    }

    pub fn wait(&self) -> LatchWait<'_> {
        LatchWait { inner: &self.0 }
    }
}

pub struct LatchWait<'a> {
    inner: &'a Inner,
}

impl Future for LatchWait<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut waiters = self.inner.waiters.lock().unwrap();

        // `release` drains under the same lock, so a flag observed false here
        // guarantees the waker registered below will be woken.
        if self.inner.released.load(Ordering::Acquire) {
            return Poll::Ready(());
        }

        match waiters.iter_mut().find(|w| w.will_wake(cx.waker())) {
            Some(w) => *w = cx.waker().clone(),
            None => waiters.push(cx.waker().clone()),
        }

        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_resumes_after_release() {
        let latch = Latch::default();
        let other = latch.clone();

        let waiter = tokio::spawn(async move { other.wait().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        latch.release();
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn wait_after_release_is_immediate() {
        let latch = Latch::default();
        latch.release();
        latch.wait().await;
        assert!(latch.is_released());
    }
}
