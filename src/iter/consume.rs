//! Consuming an async enumerator.

use super::enumerator::AsyncEnumerator;
use super::machine::AsyncIteratorMachine;
use crate::error::{Error, Result};
use futures_lite::Stream;
use std::future::{Future, IntoFuture};
use std::ops::ControlFlow;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Drains `enumerator` on the calling thread, then disposes it exactly once.
///
/// `f` may stop the iteration early by returning [`ControlFlow::Break`]. A
/// fault from the body ends the iteration; disposal still runs and the body
/// fault is returned in preference to a disposal fault.
///
/// Pending steps are waited for by blocking, so the operands the body awaits
/// must be completed by some other thread.
pub fn for_each<M, F>(mut enumerator: AsyncEnumerator<M>, mut f: F) -> Result<()>
where
    M: AsyncIteratorMachine,
    F: FnMut(M::Item) -> ControlFlow<()>,
{
    let outcome = loop {
        match enumerator.move_next().get_result() {
            Ok(true) => {
                let Some(item) = enumerator.take_current() else {
                    break Err(Error::ResultConsumed);
                };
                if f(item).is_break() {
                    break Ok(());
                }
            }
            Ok(false) => break Ok(()),
            Err(err) => break Err(err),
        }
    };
    let disposed = enumerator.dispose().get_result();
    outcome.and(disposed)
}

/// Streams the elements; a fault is yielded once and ends the stream.
///
/// Dropping the stream early does not run the body's cleanup; call
/// [`AsyncEnumerator::dispose`] for that.
impl<M: AsyncIteratorMachine> Stream for AsyncEnumerator<M> {
    type Item = Result<M::Item>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.pending.is_none() {
            let step = this.move_next().into_future();
            this.pending = Some(step);
        }
        let Some(step) = this.pending.as_mut() else {
            return Poll::Ready(None);
        };
        let polled = Pin::new(step).poll(cx);
        match polled {
            Poll::Pending => Poll::Pending,
            Poll::Ready(outcome) => {
                this.pending = None;
                match outcome {
                    Ok(true) => Poll::Ready(Some(this.take_current().ok_or(Error::ResultConsumed))),
                    Ok(false) => Poll::Ready(None),
                    Err(err) => Poll::Ready(Some(Err(err))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::{IterStep, IteratorContext};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Numbers {
        next: u32,
        end: u32,
        disposed: Arc<AtomicUsize>,
    }

    impl AsyncIteratorMachine for Numbers {
        type Item = u32;

        fn advance(&mut self, cx: &mut IteratorContext<'_>) -> Result<IterStep<u32>> {
            if cx.is_disposing() {
                self.disposed.fetch_add(1, Ordering::SeqCst);
                return Ok(IterStep::Complete);
            }
            if self.next == self.end {
                return Ok(IterStep::Complete);
            }
            self.next += 1;
            Ok(IterStep::Yield(0, self.next - 1))
        }
    }

    fn numbers(end: u32, disposed: &Arc<AtomicUsize>) -> AsyncEnumerator<Numbers> {
        AsyncEnumerator::new(Numbers {
            next: 0,
            end,
            disposed: Arc::clone(disposed),
        })
    }

    #[test]
    fn for_each_visits_everything() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let mut seen = Vec::new();
        for_each(numbers(4, &disposed), |n| {
            seen.push(n);
            ControlFlow::Continue(())
        })
        .expect("iteration");
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_eq!(disposed.load(Ordering::SeqCst), 0, "finished bodies need no disposal");
    }

    #[test]
    fn for_each_break_disposes() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let mut seen = Vec::new();
        for_each(numbers(10, &disposed), |n| {
            seen.push(n);
            if n == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .expect("iteration");
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stream_collects() {
        use futures_lite::StreamExt;

        let disposed = Arc::new(AtomicUsize::new(0));
        let items: Vec<u32> = futures_lite::future::block_on(
            numbers(3, &disposed).map(|item| item.expect("item")).collect(),
        );
        assert_eq!(items, vec![0, 1, 2]);
    }
}
