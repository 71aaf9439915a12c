//! Analysis worker: one OS thread, one inbox, one outbox
//!
//! Requests are handled strictly in order. The thread survives every fault
//! in a request and exits once all senders are dropped.

use super::handler::handle_message;
use crate::analysis::TrackAnalyzer;
use crate::error::AnalysisError;
use crate::model::{AnalysisRequest, InboundMessage, OutboundMessage};
use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

pub struct AnalysisWorker {
    name: String,
    inbox: Option<Sender<InboundMessage>>,
    outbox: Receiver<OutboundMessage>,
    handle: Option<JoinHandle<()>>,
}

impl AnalysisWorker {
    /// Start a worker thread that owns `analyzer`
    pub fn spawn<A>(name: impl Into<String>, analyzer: A) -> Result<Self>
    where
        A: TrackAnalyzer + Send + 'static,
    {
        let name = name.into();
        let (inbox_tx, inbox_rx) = unbounded::<InboundMessage>();
        let (outbox_tx, outbox_rx) = unbounded::<OutboundMessage>();

        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                log::debug!("{}: started", thread_name);
                for message in inbox_rx.iter() {
                    let response = handle_message(&analyzer, message);
                    if outbox_tx.send(response).is_err() {
                        log::debug!("{}: response receiver dropped", thread_name);
                        break;
                    }
                }
                log::debug!("{}: stopped", thread_name);
            })
            .with_context(|| format!("Failed to spawn worker thread {}", name))?;

        Ok(Self {
            name,
            inbox: Some(inbox_tx),
            outbox: outbox_rx,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a message without waiting for its response
    pub fn submit(&self, message: InboundMessage) -> Result<(), AnalysisError> {
        self.inbox
            .as_ref()
            .ok_or(AnalysisError::WorkerDisconnected)?
            .send(message)
            .map_err(|_| AnalysisError::WorkerDisconnected)
    }

    /// Block until the next response is available
    pub fn recv(&self) -> Result<OutboundMessage, AnalysisError> {
        self.outbox.recv().map_err(|_| AnalysisError::WorkerDisconnected)
    }

    /// Next response if one is ready
    pub fn try_recv(&self) -> Result<Option<OutboundMessage>, AnalysisError> {
        match self.outbox.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(AnalysisError::WorkerDisconnected),
        }
    }

    /// Blocking round trip for a single request
    ///
    /// Only meaningful when no other submitted request is still pending.
    pub fn analyze(&self, request: AnalysisRequest) -> Result<OutboundMessage, AnalysisError> {
        self.submit(InboundMessage::Analyze(request))?;
        self.recv()
    }

    /// Close the inbox and wait for the thread to finish queued work
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.inbox.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("{}: worker thread panicked", self.name);
            }
        }
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AnalysisReport;
    use anyhow::bail;

    struct Rejecting;

    impl TrackAnalyzer for Rejecting {
        fn analyze(&self, request: &AnalysisRequest) -> anyhow::Result<AnalysisReport> {
            bail!("request {} rejected", request.id)
        }
    }

    #[test]
    fn test_responses_keep_request_order() {
        let worker = AnalysisWorker::spawn("test-worker", Rejecting).unwrap();
        for id in 1..=3 {
            let request = AnalysisRequest::new(id, vec![0.0; 100], 100);
            worker.submit(InboundMessage::Analyze(request)).unwrap();
        }
        let ids: Vec<u64> = (0..3).map(|_| worker.recv().unwrap().id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(worker.try_recv(), Ok(None));
        worker.shutdown();
    }
}
