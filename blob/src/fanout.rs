//! One-producer, many-consumer stream splitter with bounded shared buffering.
//!
//! A [`Fanout`] wraps a single readable source with a declared size bound and
//! mints any number of independent consumers, before, during or after the
//! stream is produced. The first read on any consumer starts the single
//! producer task; late joiners replay the already-buffered prefix and then
//! subscribe to the live broadcast.

use std::future::Future;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, ReadBuf};
use tokio::sync::{mpsc, watch};

/// Producer read granularity; consumer channels get one slot per chunk of the
/// declared size, so a channel only fills if its consumer stops reading.
pub const CHUNK_SIZE: usize = 4096;

/// A boxed byte stream, the universal carrier between loaders, the fan-out
/// buffer and readers.
pub type StreamSource = Box<dyn AsyncRead + Send + Unpin>;

fn closed_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "read on closed pipe")
}

pub struct Fanout {
    shared: Arc<Shared>,
}

struct Shared {
    state: RwLock<State>,
    source: Mutex<Option<StreamSource>>,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

struct State {
    buf: Vec<u8>,
    /// Declared upper bound, tightened to the observed count on a short read.
    size: usize,
    err: Option<Arc<io::Error>>,
    /// One slot per consumer; `None` once that consumer's channel is closed.
    senders: Vec<Option<mpsc::Sender<Bytes>>>,
    started: bool,
    finished: bool,
    /// Full buffer, frozen once the producer terminates.
    frozen: Option<Bytes>,
}

impl Fanout {
    pub fn new(source: StreamSource, size: usize) -> Self {
        let (done_tx, done_rx) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(State {
                    buf: Vec::new(),
                    size,
                    err: None,
                    senders: Vec::new(),
                    started: false,
                    finished: false,
                    frozen: None,
                }),
                source: Mutex::new(Some(source)),
                done_tx,
                done_rx,
            }),
        }
    }

    /// Current size bound: the declared size until the producer terminates,
    /// the exact byte count afterwards.
    pub fn size(&self) -> usize {
        self.shared.state.read().unwrap().size
    }

    /// Mint an independent consumer. May be called at any point in the
    /// stream's life; a consumer joining late first replays the buffered
    /// prefix and then follows the live broadcast.
    pub fn new_reader(&self) -> FanoutReader {
        let mut state = self.shared.state.write().unwrap();
        let capacity = (state.size / CHUNK_SIZE + 1).max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let replay = match &state.frozen {
            Some(frozen) => frozen.clone(),
            None => Bytes::copy_from_slice(&state.buf),
        };
        let index = state.senders.len();
        if state.finished {
            // No broadcast is coming; leave the slot closed.
            state.senders.push(None);
        } else {
            state.senders.push(Some(tx));
        }
        FanoutReader {
            shared: self.shared.clone(),
            index,
            rx,
            replay,
            pending: Bytes::new(),
            pos: 0,
            closed: false,
            seek: SeekState::Streaming,
        }
    }
}

impl Shared {
    fn ensure_started(self: &Arc<Self>) {
        {
            let mut state = self.state.write().unwrap();
            if state.started {
                return;
            }
            state.started = true;
        }
        let source = self.source.lock().unwrap().take();
        if let Some(source) = source {
            let shared = self.clone();
            tokio::spawn(async move {
                shared.produce(source).await;
            });
        }
    }

    async fn produce(self: Arc<Self>, mut source: StreamSource) {
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            match source.read(&mut chunk).await {
                Ok(0) => return self.finish(None),
                Ok(n) => {
                    let (bytes, targets, complete) = {
                        let mut state = self.state.write().unwrap();
                        // Defend against a source that overruns the declared
                        // size by truncating the final chunk.
                        let n = n.min(state.size.saturating_sub(state.buf.len()));
                        if n == 0 {
                            drop(state);
                            return self.finish(None);
                        }
                        state.buf.extend_from_slice(&chunk[..n]);
                        let bytes = Bytes::copy_from_slice(&chunk[..n]);
                        let targets: Vec<_> = state.senders.iter().flatten().cloned().collect();
                        let complete = state.buf.len() >= state.size;
                        (bytes, targets, complete)
                    };
                    // Channel sends happen outside the state lock.
                    for tx in targets {
                        let _ = tx.send(bytes.clone()).await;
                    }
                    if complete {
                        return self.finish(None);
                    }
                },
                Err(e) => return self.finish(Some(e)),
            }
        }
    }

    fn finish(&self, err: Option<io::Error>) {
        {
            let mut state = self.state.write().unwrap();
            state.finished = true;
            if let Some(e) = err {
                tracing::warn!("fan-out source read failed: {e}");
                state.err = Some(Arc::new(e));
            }
            if state.buf.len() < state.size {
                state.size = state.buf.len();
            }
            state.frozen = Some(Bytes::from(std::mem::take(&mut state.buf)));
            // Dropping every sender closes the consumer channels, which wakes
            // any reader parked on an empty channel.
            for slot in state.senders.iter_mut() {
                *slot = None;
            }
        }
        let _ = self.done_tx.send(true);
    }

    fn frozen(&self) -> Bytes {
        self.state.read().unwrap().frozen.clone().unwrap_or_default()
    }

    fn latched_err(&self) -> Option<io::Error> {
        let state = self.state.read().unwrap();
        state.err.as_ref().map(|e| io::Error::new(e.kind(), e.to_string()))
    }
}

enum SeekState {
    Streaming,
    /// Seek requested; waiting for the producer to terminate.
    Waiting {
        done: Pin<Box<dyn Future<Output = ()> + Send>>,
        target: SeekFrom,
    },
    /// Direct view over the frozen buffer.
    Ready {
        data: Bytes,
        pos: u64,
    },
}

/// An independent consumer of a [`Fanout`].
///
/// Reads replay the buffered prefix, then follow the live broadcast. A seek
/// request waits for the producer to terminate and then switches the consumer
/// to a direct reader over the complete buffer; it stops receiving broadcast
/// chunks at that point.
pub struct FanoutReader {
    shared: Arc<Shared>,
    index: usize,
    rx: mpsc::Receiver<Bytes>,
    replay: Bytes,
    pending: Bytes,
    pos: usize,
    closed: bool,
    seek: SeekState,
}

impl FanoutReader {
    /// Mark this consumer closed and close its channel. Idempotent; never
    /// affects the producer or other consumers.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.unsubscribe();
    }

    fn unsubscribe(&self) {
        let mut state = self.shared.state.write().unwrap();
        if let Some(slot) = state.senders.get_mut(self.index) {
            *slot = None;
        }
    }

    fn deliver(&mut self, buf: &mut ReadBuf<'_>, from_replay: bool) {
        let source = if from_replay { &mut self.replay } else { &mut self.pending };
        let n = buf.remaining().min(source.len());
        buf.put_slice(&source.split_to(n));
        self.pos += n;
    }

    fn wait_done(shared: &Shared) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let mut rx = shared.done_rx.clone();
        Box::pin(async move {
            loop {
                if *rx.borrow() {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        })
    }
}

impl Drop for FanoutReader {
    fn drop(&mut self) {
        self.close();
    }
}

fn resolve_seek(cur: u64, len: u64, from: SeekFrom) -> io::Result<u64> {
    let target = match from {
        SeekFrom::Start(n) => Some(n),
        SeekFrom::Current(d) => cur.checked_add_signed(d),
        SeekFrom::End(d) => len.checked_add_signed(d),
    };
    target.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative position"))
}

impl AsyncRead for FanoutReader {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        // A consumer that switched (or is switching) to the seekable view
        // reads from the frozen buffer.
        loop {
            match &mut this.seek {
                SeekState::Streaming => break,
                SeekState::Waiting { done, target } => {
                    futures::ready!(done.as_mut().poll(cx));
                    if let Some(e) = this.shared.latched_err() {
                        return Poll::Ready(Err(e));
                    }
                    let data = this.shared.frozen();
                    let target = *target;
                    let pos = resolve_seek(this.pos as u64, data.len() as u64, target)?;
                    this.seek = SeekState::Ready { data, pos };
                },
                SeekState::Ready { data, pos } => {
                    if this.closed {
                        return Poll::Ready(Err(closed_pipe()));
                    }
                    let p = (*pos).min(data.len() as u64) as usize;
                    let n = buf.remaining().min(data.len() - p);
                    buf.put_slice(&data[p..p + n]);
                    *pos = (p + n) as u64;
                    return Poll::Ready(Ok(()));
                },
            }
        }

        if this.closed {
            return Poll::Ready(Err(closed_pipe()));
        }
        this.shared.ensure_started();

        if !this.replay.is_empty() {
            this.deliver(buf, true);
            return Poll::Ready(Ok(()));
        }
        if !this.pending.is_empty() {
            this.deliver(buf, false);
            return Poll::Ready(Ok(()));
        }

        loop {
            let (finished, size, err) = {
                let state = this.shared.state.read().unwrap();
                (state.finished, state.size, state.err.clone())
            };
            if finished {
                if let Some(e) = err {
                    this.close();
                    return Poll::Ready(Err(io::Error::new(e.kind(), e.to_string())));
                }
            }
            if this.pos >= size {
                return Poll::Ready(Ok(()));
            }
            match this.rx.poll_recv(cx) {
                Poll::Ready(Some(bytes)) => {
                    this.pending = bytes;
                    this.deliver(buf, false);
                    return Poll::Ready(Ok(()));
                },
                Poll::Ready(None) => {
                    // Channel closed: the producer terminated (or this
                    // consumer unsubscribed) and everything delivered has
                    // been drained. Resolve the end state.
                    let state = this.shared.state.read().unwrap();
                    if let Some(e) = &state.err {
                        let e = io::Error::new(e.kind(), e.to_string());
                        drop(state);
                        this.close();
                        return Poll::Ready(Err(e));
                    }
                    if this.pos >= state.size {
                        return Poll::Ready(Ok(()));
                    }
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "fan-out channel closed before the declared size was reached",
                    )));
                },
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl AsyncSeek for FanoutReader {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let this = self.get_mut();
        if this.closed {
            return Err(closed_pipe());
        }
        match &mut this.seek {
            SeekState::Streaming => {
                // Switching to the seekable view; no more broadcast chunks.
                this.unsubscribe();
                this.shared.ensure_started();
                this.seek = SeekState::Waiting {
                    done: Self::wait_done(&this.shared),
                    target: position,
                };
                Ok(())
            },
            SeekState::Waiting { target, .. } => {
                *target = position;
                Ok(())
            },
            SeekState::Ready { data, pos } => {
                *pos = resolve_seek(*pos, data.len() as u64, position)?;
                Ok(())
            },
        }
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        let this = self.get_mut();
        match &mut this.seek {
            SeekState::Streaming => Poll::Ready(Ok(this.pos as u64)),
            SeekState::Waiting { done, target } => {
                futures::ready!(done.as_mut().poll(cx));
                if let Some(e) = this.shared.latched_err() {
                    return Poll::Ready(Err(e));
                }
                let data = this.shared.frozen();
                let target = *target;
                let pos = resolve_seek(this.pos as u64, data.len() as u64, target)?;
                this.seek = SeekState::Ready { data, pos };
                Poll::Ready(Ok(pos))
            },
            SeekState::Ready { pos, .. } => Poll::Ready(Ok(*pos)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::RngCore;
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    use super::*;

    fn payload(len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut data);
        data
    }

    fn fanout_over(data: Vec<u8>, size: usize) -> Fanout {
        Fanout::new(Box::new(std::io::Cursor::new(data)), size)
    }

    #[tokio::test]
    async fn test_consumers_read_identical_bytes() {
        let data = payload(64 * 1024 + 123);
        let fanout = fanout_over(data.clone(), data.len());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let mut reader = fanout.new_reader();
            handles.push(tokio::spawn(async move {
                let mut out = Vec::new();
                reader.read_to_end(&mut out).await.unwrap();
                out
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), data);
        }
    }

    #[tokio::test]
    async fn test_late_join_replays_from_start() {
        let data: Vec<u8> = (0u16..256).map(|b| b as u8).collect();
        let fanout = fanout_over(data.clone(), data.len());

        let mut first = fanout.new_reader();
        let mut head = vec![0u8; 64];
        first.read_exact(&mut head).await.unwrap();
        assert_eq!(head, &data[..64]);

        // Created mid-stream, still observes the full sequence.
        let mut second = fanout.new_reader();
        let mut out = Vec::new();
        second.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, data);

        let mut rest = Vec::new();
        first.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, &data[64..]);
    }

    #[tokio::test]
    async fn test_short_source_tightens_size() {
        let data = payload(1000);
        let fanout = fanout_over(data.clone(), 4096);

        let mut reader = fanout.new_reader();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, data);
        assert_eq!(fanout.size(), 1000);
    }

    #[tokio::test]
    async fn test_overrun_source_is_truncated() {
        let data = payload(10_000);
        let fanout = fanout_over(data.clone(), 5000);

        let mut reader = fanout.new_reader();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, &data[..5000]);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_local() {
        let data = payload(20_000);
        let fanout = fanout_over(data.clone(), data.len());

        let mut closer = fanout.new_reader();
        let mut survivor = fanout.new_reader();

        closer.close();
        closer.close();
        let mut buf = [0u8; 16];
        let err = closer.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        let mut out = Vec::new();
        survivor.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_seek_waits_for_completion() {
        let data = payload(30_000);
        let fanout = fanout_over(data.clone(), data.len());

        let mut reader = fanout.new_reader();
        let pos = reader.seek(SeekFrom::Start(10_000)).await.unwrap();
        assert_eq!(pos, 10_000);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, &data[10_000..]);

        // Seek is idempotent after completion.
        let pos = reader.seek(SeekFrom::Start(0)).await.unwrap();
        assert_eq!(pos, 0);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_seek_after_close_is_rejected() {
        let fanout = fanout_over(payload(100), 100);
        let mut reader = fanout.new_reader();
        reader.close();
        let err = reader.seek(SeekFrom::Start(0)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_error_latched_after_partial_stream() {
        struct FailAfter {
            sent: usize,
        }
        impl AsyncRead for FailAfter {
            fn poll_read(
                mut self: Pin<&mut Self>,
                _cx: &mut Context<'_>,
                buf: &mut ReadBuf<'_>,
            ) -> Poll<io::Result<()>> {
                if self.sent == 0 {
                    self.sent = 1;
                    buf.put_slice(&[7u8; 100]);
                    Poll::Ready(Ok(()))
                } else {
                    Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "upstream reset")))
                }
            }
        }

        let fanout = Fanout::new(Box::new(FailAfter { sent: 0 }), 1000);
        let mut reader = fanout.new_reader();
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);

        // A consumer joining after the failure observes the error too.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut late = fanout.new_reader();
        let mut out = Vec::new();
        // The buffered prefix is still replayed before the error surfaces.
        let err = late.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn test_producer_started_at_most_once() {
        struct CountingSource {
            data: std::io::Cursor<Vec<u8>>,
            opens: Arc<std::sync::atomic::AtomicU32>,
            counted: bool,
        }
        impl AsyncRead for CountingSource {
            fn poll_read(
                mut self: Pin<&mut Self>,
                cx: &mut Context<'_>,
                buf: &mut ReadBuf<'_>,
            ) -> Poll<io::Result<()>> {
                if !self.counted {
                    self.counted = true;
                    self.opens.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                }
                Pin::new(&mut self.data).poll_read(cx, buf)
            }
        }

        let opens = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let data = payload(10_000);
        let fanout = Fanout::new(
            Box::new(CountingSource {
                data: std::io::Cursor::new(data.clone()),
                opens: opens.clone(),
                counted: false,
            }),
            data.len(),
        );

        let mut handles = Vec::new();
        for _ in 0..16 {
            let mut reader = fanout.new_reader();
            handles.push(tokio::spawn(async move {
                let mut out = Vec::new();
                reader.read_to_end(&mut out).await.unwrap();
                out.len()
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), data.len());
        }
        assert_eq!(opens.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
