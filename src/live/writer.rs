//! Write-behind of statics updates into the shard's statics files.

use crossbeam::{
    channel::{self, Receiver, RecvTimeoutError},
    queue::SegQueue,
};
use std::{
    collections::HashMap,
    fs::File,
    io::{self, Seek as _, SeekFrom, Write as _},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{error, trace, warn};

/// Bytes to place at `offset` in the statics file of `map`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct WriteRequest {
    pub(crate) map: u8,
    pub(crate) offset: u64,
    pub(crate) payload: Vec<u8>,
}

/// Owns the statics files and a thread that drains queued writes into them.
pub(crate) struct Writer {
    queue: Arc<SegQueue<WriteRequest>>,
    cancel: Arc<AtomicBool>,
    done: Receiver<()>,
    handle: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl Writer {
    pub(crate) fn spawn(
        files: HashMap<u8, File>,
        poll_interval: Duration,
        shutdown_timeout: Duration,
    ) -> io::Result<Self> {
        let queue = Arc::new(SegQueue::new());
        let cancel = Arc::new(AtomicBool::new(false));
        let (done_tx, done) = channel::bounded(1);

        let handle = {
            let queue = Arc::clone(&queue);
            let cancel = Arc::clone(&cancel);
            thread::Builder::new()
                .name("statics-writer".into())
                .spawn(move || {
                    let mut files = files;
                    while !cancel.load(Ordering::Acquire) {
                        drain(&queue, &mut files);
                        thread::park_timeout(poll_interval);
                    }
                    drain(&queue, &mut files);
                    let _ = done_tx.send(());
                })?
        };

        Ok(Self {
            queue,
            cancel,
            done,
            handle: Some(handle),
            shutdown_timeout,
        })
    }

    pub(crate) fn enqueue(&self, request: WriteRequest) {
        self.queue.push(request);
    }

    /// Stops the thread after it has drained the queue, waiting at most the shutdown timeout.
    pub(crate) fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.cancel.store(true, Ordering::Release);
        handle.thread().unpark();
        match self.done.recv_timeout(self.shutdown_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    error!("statics writer panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "statics writer did not stop within {:?}, detaching it with {} queued writes",
                    self.shutdown_timeout,
                    self.queue.len()
                );
            }
        }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn drain(queue: &SegQueue<WriteRequest>, files: &mut HashMap<u8, File>) {
    while let Some(request) = queue.pop() {
        let Some(file) = files.get_mut(&request.map) else {
            error!("no statics file is open for map {}", request.map);
            continue;
        };
        match write(file, &request) {
            Ok(()) => trace!(
                "wrote {} statics bytes at 0x{:08X} for map {}",
                request.payload.len(),
                request.offset,
                request.map
            ),
            Err(err) => error!(
                "failed to write statics at 0x{:08X} for map {}: {err}",
                request.offset, request.map
            ),
        }
    }
}

fn write(file: &mut File, request: &WriteRequest) -> io::Result<()> {
    file.seek(SeekFrom::Start(request.offset))?;
    file.write_all(&request.payload)?;
    file.flush()
}
