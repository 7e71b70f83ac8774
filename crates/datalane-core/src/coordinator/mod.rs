// ── Fan-out / fan-in coordinators ──
//
// Batch and bulk calls dispatch every leaf as an ordinary single-entity
// request whose processor resolves a oneshot slot. The aggregate is
// delivered once, after `join_all` over every slot.

pub(crate) mod batch;
pub(crate) mod bulk;

use std::sync::{Arc, Mutex};

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::model::{DataError, LeafOutcome};
use crate::processor::{Processor, ProcessorContext};

/// Resolves one fan-in slot with the first outcome it sees.
struct LeafProcessor {
    slot: Mutex<Option<oneshot::Sender<LeafOutcome>>>,
}

impl LeafProcessor {
    fn channel() -> (Arc<Self>, oneshot::Receiver<LeafOutcome>) {
        let (tx, rx) = oneshot::channel();
        let processor = Arc::new(Self {
            slot: Mutex::new(Some(tx)),
        });
        (processor, rx)
    }

    fn resolve(&self, outcome: LeafOutcome) {
        let sender = match self.slot.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(tx) = sender {
            let _ = tx.send(outcome);
        }
    }
}

impl Processor for LeafProcessor {
    fn on_success(&self, ctx: &ProcessorContext, response: &Value) {
        self.resolve(LeafOutcome::Success(ctx.payload(response)));
    }

    fn on_error(&self, _ctx: &ProcessorContext, error: &DataError) {
        self.resolve(LeafOutcome::Error(error.clone()));
    }
}

/// Wait for every slot. A slot whose sender vanished becomes an error.
async fn join_slots(slots: Vec<oneshot::Receiver<LeafOutcome>>) -> Vec<LeafOutcome> {
    join_all(slots)
        .await
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|_| {
                LeafOutcome::Error(DataError::new("request dropped before completion", None))
            })
        })
        .collect()
}
