//! Background replay of the disk cache.
//!
//! Replaying a large store inside `init` stalls startup on work that does not
//! need the graphics context: reading records, decoding keys and generating
//! source. A [`Prewarmer`] runs those steps on a worker thread and hands the
//! results to the render thread over a bounded channel. Only the render
//! thread touches the driver or the program map: it drains the channel with
//! [`ProgramCache::apply_prewarmed`](crate::cache::ProgramCache::apply_prewarmed)
//! a few programs at a time, so no lock is ever shared between the two.

use std::thread::{self, JoinHandle};

use flume::{Receiver, Sender, TryRecvError};

use crate::disk_cache::StoreSnapshot;
use crate::driver::ProgramBinary;
use crate::errors::{Result, VestaError};
use crate::generator::{ProgramGenerator, ProgramSources};
use crate::pipeline_key::PipelineKey;

/// Programs the worker may get ahead of the render thread.
const CHANNEL_CAPACITY: usize = 64;

/// One stored program, ready to be built on the render thread.
#[derive(Debug)]
pub struct PrewarmedProgram {
    pub key: PipelineKey,
    pub sources: ProgramSources,
    /// Driver binary stored with the key, if any.
    pub binary: Option<ProgramBinary>,
}

/// What the worker saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrewarmReport {
    /// Records that passed their checksum.
    pub records: usize,
    /// Records dropped by the worker: bad checksum, undecodable key, or
    /// generation failure.
    pub rejected: usize,
    /// Programs handed to the render thread.
    pub sent: usize,
}

/// Handle to a running pre-warm worker.
///
/// Dropping it disconnects the channel; the worker then stops sending and
/// exits after its read pass.
pub struct Prewarmer {
    receiver: Receiver<PrewarmedProgram>,
    worker: JoinHandle<Result<PrewarmReport>>,
    /// Store generation the snapshot was taken from.
    epoch: u64,
}

impl Prewarmer {
    pub(crate) fn spawn<G>(snapshot: StoreSnapshot, generator: G, epoch: u64) -> Self
    where
        G: ProgramGenerator + Send + 'static,
    {
        let (sender, receiver) = flume::bounded(CHANNEL_CAPACITY);
        log::debug!("Pre-warming programs from {}", snapshot.path().display());
        let worker = thread::spawn(move || run(&snapshot, &generator, &sender));
        Self {
            receiver,
            worker,
            epoch,
        }
    }

    #[must_use]
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Next prepared program, without blocking.
    #[must_use]
    pub fn try_next(&self) -> Option<PrewarmedProgram> {
        match self.receiver.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Programs waiting in the channel.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// The worker has exited and everything it sent has been taken.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.worker.is_finished() && self.receiver.is_empty()
    }

    /// Waits for the worker to finish its read pass.
    ///
    /// Programs still in the channel are discarded.
    pub fn join(self) -> Result<PrewarmReport> {
        let Self { receiver, worker, .. } = self;
        drop(receiver);
        worker.join().unwrap_or_else(|_| {
            Err(VestaError::IoError(std::io::Error::other(
                "pre-warm worker panicked",
            )))
        })
    }
}

fn run<G: ProgramGenerator>(
    snapshot: &StoreSnapshot,
    generator: &G,
    sender: &Sender<PrewarmedProgram>,
) -> Result<PrewarmReport> {
    let mut report = PrewarmReport::default();
    let mut disconnected = false;

    let summary = snapshot.read(|key_bytes, value| {
        if disconnected {
            return;
        }

        let key = match PipelineKey::from_bytes(key_bytes) {
            Ok(key) => key,
            Err(err) => {
                log::warn!("Pre-warm skipping record: {err}");
                report.rejected += 1;
                return;
            }
        };
        let sources = match generator.sources(&key) {
            Ok(sources) => sources,
            Err(err) => {
                log::warn!("Pre-warm skipping {key:?}: {err}");
                report.rejected += 1;
                return;
            }
        };

        let item = PrewarmedProgram {
            key,
            sources,
            binary: ProgramBinary::from_bytes(value),
        };
        if sender.send(item).is_ok() {
            report.sent += 1;
        } else {
            disconnected = true;
        }
    })?;

    report.records = summary.delivered;
    report.rejected += summary.rejected;
    log::debug!(
        "Pre-warm worker done: {} sent, {} rejected",
        report.sent,
        report.rejected
    );
    Ok(report)
}
