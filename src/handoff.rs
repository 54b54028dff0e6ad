//! Background decoding with a single-slot handoff to the consumer.
//!
//! The producer runs one of the iterators on a worker thread and blocks on a
//! `sync_channel(1)` until the consumer takes the previous instruction, so at
//! most one decoded instruction is ever waiting. Dropping the [`Handoff`]
//! disconnects the channel and detaches the worker without waiting for it, so
//! a producer stuck in a slow read never stalls the consumer. The producer
//! notices on its next send and drops its iterator, which releases the decode
//! slot.

use std::io::{self, Read};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use crate::decompose::Instruction;
use crate::{Address, DecodeError, Decoder, DisasmIter, StopReason, StreamIter, StreamOptions};

enum Event {
    Insn(Instruction),
    Done(StopReason),
}

/// Consumer side of a background decode.
///
/// If the worker panics, the sequence ends with
/// [`StopReason::SourceError`] of kind [`io::ErrorKind::Other`] and the panic
/// is logged at `warn`.
pub struct Handoff {
    rx: Option<Receiver<Event>>,
    worker: Option<JoinHandle<()>>,
    stop: Option<StopReason>,
}

/// Decode `bytes` on a worker thread.
pub fn spawn_buffer<D>(decoder: D, bytes: Vec<u8>, address: Address) -> Result<Handoff, DecodeError>
where
    D: Decoder + Send + 'static,
{
    spawn("nuclide-buffer", move |tx| {
        let mut it = DisasmIter::new(&decoder, &bytes, address);
        if pump(&mut it, &tx) {
            let reason = it.stop_reason().cloned().unwrap_or(StopReason::Exhausted);
            let _ = tx.send(Event::Done(reason));
        }
    })
}

/// Decode `source` on a worker thread, `options.chunk_size` bytes per read.
pub fn spawn_stream<D, R>(
    decoder: D,
    source: R,
    address: Address,
    options: StreamOptions,
) -> Result<Handoff, DecodeError>
where
    D: Decoder + Send + 'static,
    R: Read + Send + 'static,
{
    options.validate()?;
    spawn("nuclide-stream", move |tx| {
        let mut it = StreamIter::with_valid_options(&decoder, source, address, options);
        if pump(&mut it, &tx) {
            let reason = it.stop_reason().cloned().unwrap_or(StopReason::Exhausted);
            let _ = tx.send(Event::Done(reason));
        }
    })
}

fn spawn<F>(name: &str, produce: F) -> Result<Handoff, DecodeError>
where
    F: FnOnce(SyncSender<Event>) + Send + 'static,
{
    let (tx, rx) = sync_channel(1);
    let worker = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || produce(tx))?;

    Ok(Handoff {
        rx: Some(rx),
        worker: Some(worker),
        stop: None,
    })
}

/// Forward every instruction; false if the consumer went away first.
fn pump<I: Iterator<Item = Instruction>>(it: &mut I, tx: &SyncSender<Event>) -> bool {
    for insn in it.by_ref() {
        if tx.send(Event::Insn(insn)).is_err() {
            log::debug!("Handoff consumer disconnected; stopping producer");
            return false;
        }
    }
    true
}

impl Handoff {
    /// Why the sequence ended, or `None` while it is still live.
    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stop.as_ref()
    }

    /// Wait for a worker that has already stopped sending.
    fn join(&mut self) {
        self.rx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Decoder worker thread panicked");
            }
        }
    }
}

impl Iterator for Handoff {
    type Item = Instruction;

    fn next(&mut self) -> Option<Self::Item> {
        let event = self.rx.as_ref()?.recv();
        match event {
            Ok(Event::Insn(insn)) => Some(insn),
            Ok(Event::Done(reason)) => {
                self.stop = Some(reason);
                self.join();
                None
            }
            Err(_) => {
                // Only a panic drops the sender without a `Done`.
                log::warn!("Decoder worker exited without reporting why it stopped");
                self.stop = Some(StopReason::SourceError {
                    kind: io::ErrorKind::Other,
                    message: "decoder worker panicked".to_string(),
                });
                self.join();
                None
            }
        }
    }
}

impl Drop for Handoff {
    fn drop(&mut self) {
        self.rx.take();
        if let Some(worker) = self.worker.take() {
            log::debug!("Detaching decoder worker {:?}", worker.thread().name());
        }
    }
}
