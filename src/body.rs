//! Response body that reports its own completion.
//!
//! hyper polls a body until it yields `None`, then finishes the message on
//! the wire. [`CompletionBody`] runs its hook at exactly that point, or when
//! it is dropped unread (client went away, HEAD request, error path), so
//! whoever registered the hook sees every response exactly once.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};

pub(crate) type CompletionHook = Box<dyn FnOnce() + Send + 'static>;

pub struct CompletionBody {
    data: Option<Bytes>,
    len: u64,
    hook: Option<CompletionHook>,
}

impl CompletionBody {
    pub(crate) fn new(data: Bytes, hook: Option<CompletionHook>) -> Self {
        let len = data.len() as u64;
        let data = if data.is_empty() { None } else { Some(data) };
        Self { data, len, hook }
    }

    fn complete(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook();
        }
    }
}

impl Body for CompletionBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match this.data.take() {
            Some(data) => Poll::Ready(Some(Ok(Frame::data(data)))),
            None => {
                this.complete();
                Poll::Ready(None)
            }
        }
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.len)
    }
}

impl Drop for CompletionBody {
    fn drop(&mut self) {
        self.complete();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http_body_util::BodyExt;

    use super::*;

    fn counting() -> (Arc<AtomicUsize>, CompletionHook) {
        let count = Arc::new(AtomicUsize::new(0));
        let hook_count = Arc::clone(&count);
        (count, Box::new(move || {
            hook_count.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[tokio::test]
    async fn hook_runs_once_after_body_is_read() {
        let (count, hook) = counting();
        let body = CompletionBody::new(Bytes::from_static(b"hello"), Some(hook));
        assert_eq!(body.size_hint().exact(), Some(5));

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"hello");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hook_runs_when_dropped_unread() {
        let (count, hook) = counting();
        drop(CompletionBody::new(Bytes::from_static(b"unsent"), Some(hook)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
