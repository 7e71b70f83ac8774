// ── Bulk fan-out ──
//
// Many entities, one call. Reads only. With a caller view the results
// are joined by position and handed over as one array; without one,
// each entity is dispatched on its own and reports to its own view.

use serde_json::Value;
use tracing::debug;

use super::{LeafProcessor, join_slots};
use crate::dispatcher::{Dispatcher, EnqueueOptions, PendingRequest};
use crate::error::CoreError;
use crate::model::{EntityConfig, Operation};

pub(crate) fn dispatch(
    dispatcher: &Dispatcher,
    operation: Option<Operation>,
    entities: Vec<EntityConfig>,
    payload: Option<Value>,
    options: EnqueueOptions,
) -> Result<(), CoreError> {
    let operations: Vec<Operation> = entities
        .iter()
        .map(|e| operation.unwrap_or(e.data_config().default_operation))
        .collect();
    if let Some(op) = operations.iter().find(|op| !op.is_read()) {
        return Err(CoreError::invalid(format!(
            "bulk calls accept read operations only, got '{op}'"
        )));
    }

    let Some(receiver) = options.caller_view.clone() else {
        debug!(entities = entities.len(), "bulk dispatched without aggregate receiver");
        for (entity, operation) in entities.into_iter().zip(operations) {
            dispatcher.submit(PendingRequest {
                operation,
                entity,
                payload: payload.clone(),
                options: EnqueueOptions::leaf(&options),
            });
        }
        return Ok(());
    };

    let mut slots = Vec::with_capacity(entities.len());
    let mut leaves = Vec::with_capacity(entities.len());
    for (entity, operation) in entities.iter().zip(operations) {
        let (processor, slot) = LeafProcessor::channel();
        let mut builder = EntityConfig::builder(entity.data_config().clone())
            .processor(processor)
            .derived_from(entity.id());
        if let Some(class) = entity.blob_class() {
            builder = builder.blob_class(class.clone());
        }
        leaves.push(PendingRequest {
            operation,
            entity: builder.build()?,
            payload: payload.clone(),
            options: EnqueueOptions::leaf(&options),
        });
        slots.push(slot);
    }

    debug!(entities = leaves.len(), "bulk dispatched");
    for leaf in leaves {
        dispatcher.submit(leaf);
    }

    tokio::spawn(async move {
        let outcomes = join_slots(slots).await;
        debug!(
            total = outcomes.len(),
            failed = outcomes.iter().filter(|o| !o.is_success()).count(),
            "bulk resolved"
        );
        receiver.handle_bulk_data(outcomes);
    });
    Ok(())
}
