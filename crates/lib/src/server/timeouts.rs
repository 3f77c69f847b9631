//! Per-connection read/write/idle deadlines for the stub.
//!
//! [`ConnClock`] tracks where a connection is in its request cycle; the service
//! moves it along and [`TimedIo`] turns the current deadline into a `TimedOut`
//! error on a stalled read. Writes that stay pending past the write timeout fail too.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant, Sleep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for (the rest of) request headers.
    Headers,
    /// Handler is running; it bounds its own body read.
    Handling,
    /// Response produced; waiting for the next request on a keep-alive connection.
    Idle,
}

#[derive(Debug)]
struct ClockState {
    phase: Phase,
    read_deadline: Option<Instant>,
}

/// Shared between the hyper service and the connection's IO.
#[derive(Debug, Clone)]
pub(crate) struct ConnClock {
    read_timeout: Duration,
    idle_timeout: Duration,
    state: Arc<Mutex<ClockState>>,
}

impl ConnClock {
    /// A fresh connection must deliver its first request headers within `read_timeout`.
    pub(crate) fn new(read_timeout: Duration, idle_timeout: Duration) -> Self {
        Self {
            read_timeout,
            idle_timeout,
            state: Arc::new(Mutex::new(ClockState {
                phase: Phase::Headers,
                read_deadline: Some(Instant::now() + read_timeout),
            })),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ClockState) -> R) -> R {
        let mut g = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut g)
    }

    /// Headers parsed, handler about to run.
    pub(crate) fn request_started(&self) {
        self.with_state(|s| {
            s.phase = Phase::Handling;
            s.read_deadline = None;
        });
    }

    /// Handler returned; the connection is idle until the next request's first byte.
    pub(crate) fn request_finished(&self) {
        let deadline = Instant::now() + self.idle_timeout;
        self.with_state(|s| {
            s.phase = Phase::Idle;
            s.read_deadline = Some(deadline);
        });
    }

    /// Bytes arrived; on an idle connection this starts a new request's read window.
    fn bytes_read(&self) {
        let deadline = Instant::now() + self.read_timeout;
        self.with_state(|s| {
            if s.phase == Phase::Idle {
                s.phase = Phase::Headers;
                s.read_deadline = Some(deadline);
            }
        });
    }

    fn read_deadline(&self) -> Option<Instant> {
        self.with_state(|s| s.read_deadline)
    }
}

/// IO wrapper enforcing the [`ConnClock`] read deadline and a per-write timeout.
pub(crate) struct TimedIo<T> {
    inner: T,
    clock: ConnClock,
    write_timeout: Duration,
    read_sleep: Pin<Box<Sleep>>,
    read_armed: Option<Instant>,
    write_sleep: Pin<Box<Sleep>>,
    write_armed: bool,
}

impl<T> TimedIo<T> {
    pub(crate) fn new(inner: T, clock: ConnClock, write_timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            inner,
            clock,
            write_timeout,
            read_sleep: Box::pin(tokio::time::sleep_until(now)),
            read_armed: None,
            write_sleep: Box::pin(tokio::time::sleep_until(now)),
            write_armed: false,
        }
    }

    fn poll_read_deadline(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let Some(deadline) = self.clock.read_deadline() else {
            self.read_armed = None;
            return Poll::Pending;
        };
        if self.read_armed != Some(deadline) {
            self.read_sleep.as_mut().reset(deadline);
            self.read_armed = Some(deadline);
        }
        match self.read_sleep.as_mut().poll(cx) {
            Poll::Ready(()) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "read deadline elapsed",
            ))),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_write_deadline<R>(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<R>> {
        if !self.write_armed {
            self.write_sleep
                .as_mut()
                .reset(Instant::now() + self.write_timeout);
            self.write_armed = true;
        }
        match self.write_sleep.as_mut().poll(cx) {
            Poll::Ready(()) => {
                self.write_armed = false;
                Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "write timeout elapsed",
                )))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn write_done<R>(
        &mut self,
        res: Poll<io::Result<R>>,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<R>> {
        match res {
            Poll::Ready(r) => {
                self.write_armed = false;
                Poll::Ready(r)
            }
            Poll::Pending => self.poll_write_deadline(cx),
        }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for TimedIo<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                if buf.filled().len() > before {
                    this.clock.bytes_read();
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => this.poll_read_deadline(cx),
        }
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for TimedIo<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let res = Pin::new(&mut this.inner).poll_write(cx, buf);
        this.write_done(res, cx)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let res = Pin::new(&mut this.inner).poll_flush(cx);
        this.write_done(res, cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let res = Pin::new(&mut this.inner).poll_shutdown(cx);
        this.write_done(res, cx)
    }
}
