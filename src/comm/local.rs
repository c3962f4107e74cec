use super::{CommError, Communicator, Tag};
use std::{
    sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender},
    time::Duration,
};

struct Envelope {
    tag: Tag,
    payload: Vec<u8>,
}

/// One rank of a [`LocalUniverse`].
///
/// Every ordered pair of ranks is connected by its own unbounded channel, so sends never block
/// and messages between two ranks are received in the order they were sent.
pub struct LocalComm {
    rank: usize,
    size: usize,
    outbox: Vec<Sender<Envelope>>,
    inbox: Vec<Receiver<Envelope>>,
    timeout: Duration,
}

impl core::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// In-process message passing universe: each rank is a thread.
pub struct LocalUniverse;

impl LocalUniverse {
    /// Creates `size` fully connected ranks whose receives give up after `timeout`.
    pub fn comms(size: usize, timeout: Duration) -> Vec<LocalComm> {
        let mut outboxes = (0..size).map(|_| Vec::with_capacity(size)).collect::<Vec<_>>();
        let mut inboxes = (0..size).map(|_| Vec::with_capacity(size)).collect::<Vec<_>>();
        // channel (src -> dst) lands in outboxes[src][dst] and inboxes[dst][src].
        for outbox in outboxes.iter_mut() {
            for inbox in inboxes.iter_mut() {
                let (tx, rx) = channel();
                outbox.push(tx);
                inbox.push(rx);
            }
        }
        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outbox, inbox))| LocalComm {
                rank,
                size,
                outbox,
                inbox,
                timeout,
            })
            .collect()
    }

    /// Runs `f` on `size` ranks, each on its own scoped thread, and returns the results in
    /// rank order.
    ///
    /// A rank returning early drops its communicator, which makes its peers observe
    /// [`CommError::Disconnected`] instead of waiting on it. A panic on any rank is propagated
    /// to the caller once every thread has finished.
    pub fn run<R: Send>(
        size: usize,
        timeout: Duration,
        f: impl Fn(LocalComm) -> R + Sync,
    ) -> Vec<R> {
        let f = &f;
        std::thread::scope(|s| {
            let handles = Self::comms(size, timeout)
                .into_iter()
                .map(|comm| s.spawn(move || f(comm)))
                .collect::<Vec<_>>();
            let mut out = Vec::with_capacity(size);
            let mut panic = None;
            for handle in handles {
                match handle.join() {
                    Ok(value) => out.push(value),
                    Err(payload) => panic = panic.or(Some(payload)),
                }
            }
            if let Some(payload) = panic {
                std::panic::resume_unwind(payload);
            }
            out
        })
    }
}

impl LocalComm {
    #[inline]
    fn check_peer(&self, peer: usize) -> Result<(), CommError> {
        if peer < self.size {
            Ok(())
        } else {
            Err(CommError::InvalidRank {
                rank: peer,
                size: self.size,
            })
        }
    }
}

impl Communicator for LocalComm {
    #[inline]
    fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, dst: usize, tag: Tag, data: &[u8]) -> Result<(), CommError> {
        self.check_peer(dst)?;
        self.outbox[dst]
            .send(Envelope {
                tag,
                payload: data.to_vec(),
            })
            .map_err(|_| CommError::Disconnected { peer: dst })
    }

    fn recv(&self, src: usize, tag: Tag, data: &mut [u8]) -> Result<(), CommError> {
        self.check_peer(src)?;
        let envelope = self.inbox[src]
            .recv_timeout(self.timeout)
            .map_err(|err| match err {
                RecvTimeoutError::Timeout => CommError::Timeout { peer: src },
                RecvTimeoutError::Disconnected => CommError::Disconnected { peer: src },
            })?;
        if envelope.tag != tag {
            return Err(CommError::TagMismatch {
                peer: src,
                expected: tag,
                found: envelope.tag,
            });
        }
        if envelope.payload.len() != data.len() {
            return Err(CommError::SizeMismatch {
                peer: src,
                expected: data.len(),
                found: envelope.payload.len(),
            });
        }
        data.copy_from_slice(&envelope.payload);
        Ok(())
    }

    fn sendrecv(
        &self,
        dst: usize,
        send: &[u8],
        src: usize,
        recv: &mut [u8],
        tag: Tag,
    ) -> Result<(), CommError> {
        // sends are buffered, so posting the send first cannot deadlock.
        self.send(dst, tag, send)?;
        self.recv(src, tag, recv)
    }
}
