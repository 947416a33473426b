//! Readiness watching for backend file descriptors.
//!
//! A vendor backend may hand the daemon raw descriptors (device nodes,
//! netlink sockets) it wants serviced from the main loop. Each watched
//! fd gets a task wrapping it in [`AsyncFd`]; on readability the task
//! notifies the loop and waits for an ack before re-arming, so the
//! actual `handle_file_descriptor` call runs serially with everything
//! else. The backend keeps ownership of the descriptor; stopping a
//! watch never closes it.

use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;

use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// One readiness notification. The receiver answers on `done` once the
/// descriptor has been serviced.
pub(crate) struct FdReady {
    pub(crate) fd: RawFd,
    pub(crate) done: oneshot::Sender<()>,
}

pub(crate) struct FdWatcher {
    ready_tx: mpsc::Sender<FdReady>,
    watches: HashMap<RawFd, CancellationToken>,
}

impl FdWatcher {
    pub(crate) fn new() -> (Self, mpsc::Receiver<FdReady>) {
        let (ready_tx, ready_rx) = mpsc::channel(16);
        let watcher = Self {
            ready_tx,
            watches: HashMap::new(),
        };
        (watcher, ready_rx)
    }

    /// Starts watching `fd` for readability. Watching an fd twice is a
    /// warned no-op.
    pub(crate) fn watch(&mut self, fd: RawFd) {
        if self.watches.contains_key(&fd) {
            warn!("fd {} is already watched", fd);
            return;
        }
        let token = CancellationToken::new();
        let task_token = token.clone();
        let ready_tx = self.ready_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = watch_fd(fd, ready_tx, task_token).await {
                error!("fd {} watch ended: {}", fd, e);
            }
        });
        self.watches.insert(fd, token);
        debug!("watching fd {}", fd);
    }

    /// Stops watching `fd`. Stopping an unknown fd is a warned no-op.
    pub(crate) fn unwatch(&mut self, fd: RawFd) {
        match self.watches.remove(&fd) {
            Some(token) => {
                token.cancel();
                debug!("stopped watching fd {}", fd);
            }
            None => warn!("fd {} is not watched", fd),
        }
    }

    /// Cancels every watch, for shutdown.
    pub(crate) fn clear(&mut self) {
        for (_, token) in self.watches.drain() {
            token.cancel();
        }
    }
}

async fn watch_fd(
    fd: RawFd,
    ready_tx: mpsc::Sender<FdReady>,
    token: CancellationToken,
) -> io::Result<()> {
    let async_fd = AsyncFd::with_interest(fd, Interest::READABLE)?;
    loop {
        // Cancellation wins over readability so a stopped watch never
        // emits a late notification.
        let mut guard = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            result = async_fd.readable() => result?,
        };
        let (done_tx, done_rx) = oneshot::channel();
        if ready_tx.send(FdReady { fd, done: done_tx }).await.is_err() {
            // Receiver gone, the daemon is shutting down.
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            _ = done_rx => {}
        }
        guard.clear_ready();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{pipe, Read, Write};
    use std::os::fd::AsRawFd;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_readable_fd_notifies_once_per_ack() {
        let (mut reader, mut writer) = pipe().unwrap();
        let fd = reader.as_raw_fd();
        let (mut watcher, mut ready_rx) = FdWatcher::new();
        watcher.watch(fd);

        writer.write_all(b"x").unwrap();
        let ready = ready_rx.recv().await.unwrap();
        assert_eq!(ready.fd, fd);

        // No second notification until the first one is acked.
        writer.write_all(b"y").unwrap();
        assert!(timeout(Duration::from_millis(50), ready_rx.recv())
            .await
            .is_err());

        let mut buf = [0u8; 8];
        reader.read(&mut buf).unwrap();
        ready.done.send(()).unwrap();

        writer.write_all(b"z").unwrap();
        let ready = ready_rx.recv().await.unwrap();
        assert_eq!(ready.fd, fd);
        ready.done.send(()).unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_watch_is_a_no_op() {
        let (reader, mut writer) = pipe().unwrap();
        let fd = reader.as_raw_fd();
        let (mut watcher, mut ready_rx) = FdWatcher::new();
        watcher.watch(fd);
        watcher.watch(fd);

        writer.write_all(b"x").unwrap();
        let ready = ready_rx.recv().await.unwrap();
        assert_eq!(ready.fd, fd);
        // Exactly one watcher task: nothing else is queued.
        assert!(timeout(Duration::from_millis(50), ready_rx.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_unwatch_stops_notifications() {
        let (reader, mut writer) = pipe().unwrap();
        let fd = reader.as_raw_fd();
        let (mut watcher, mut ready_rx) = FdWatcher::new();

        // Unknown fd: no panic.
        watcher.unwatch(fd);

        watcher.watch(fd);
        watcher.unwatch(fd);
        writer.write_all(b"x").unwrap();
        assert!(timeout(Duration::from_millis(50), ready_rx.recv())
            .await
            .is_err());
    }
}
