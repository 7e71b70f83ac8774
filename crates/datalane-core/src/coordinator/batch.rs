// ── Batch fan-out ──
//
// One entity, many URLs. Each `BatchCall` becomes a synthetic leaf
// entity; results are joined by identifier in declaration order.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::{LeafProcessor, join_slots};
use crate::dispatcher::{Dispatcher, EnqueueOptions, PendingRequest};
use crate::error::CoreError;
use crate::model::{BatchCall, BatchResults, DataConfig, EntityConfig};
use crate::processor::ProcessorContext;
use crate::view::DataView;

pub(crate) fn dispatch(
    dispatcher: &Dispatcher,
    parent: EntityConfig,
    payload: Option<Value>,
    options: EnqueueOptions,
) -> Result<(), CoreError> {
    let calls = parent
        .data_config()
        .batch()
        .ok_or_else(|| CoreError::invalid("entity has no batch override"))?;

    // Build every leaf before submitting any, so a bad leaf dispatches nothing.
    let mut identifiers = Vec::with_capacity(calls.len());
    let mut slots = Vec::with_capacity(calls.len());
    let mut leaves = Vec::with_capacity(calls.len());
    for call in calls {
        let (processor, slot) = LeafProcessor::channel();
        leaves.push(PendingRequest {
            operation: call.operation,
            entity: leaf_entity(parent.data_config(), call, processor)?,
            payload: payload.clone(),
            options: EnqueueOptions::leaf(&options),
        });
        identifiers.push(call.identifier.clone());
        slots.push(slot);
    }

    debug!(entity = %parent.id(), leaves = leaves.len(), "batch dispatched");
    for leaf in leaves {
        dispatcher.submit(leaf);
    }

    let receiver = options.caller_view.or_else(|| parent.view().cloned());
    tokio::spawn(async move {
        let outcomes = join_slots(slots).await;
        let results: BatchResults = identifiers.into_iter().zip(outcomes).collect();
        deliver(&parent, receiver, results);
    });
    Ok(())
}

/// The leaf inherits the parent's allowances, socket tag and, unless it
/// brings its own, reuse policy.
fn leaf_entity(
    parent: &DataConfig,
    call: &BatchCall,
    processor: Arc<LeafProcessor>,
) -> Result<EntityConfig, CoreError> {
    let mut config = DataConfig::for_url(call.url.clone())
        .allow_all(parent.allowed_operations.iter().copied())
        .default_operation(call.operation)
        .reuse(call.reuse.clone().unwrap_or_else(|| parent.reuse.clone()));
    config.socket_tag.clone_from(&parent.socket_tag);

    let mut builder = EntityConfig::builder(config).processor(processor);
    if let Some(class) = &call.blob_class {
        builder = builder.blob_class(class.clone());
    }
    builder.build()
}

fn deliver(parent: &EntityConfig, receiver: Option<Arc<dyn DataView>>, results: BatchResults) {
    let failed = results.values().filter(|o| !o.is_success()).count();
    debug!(entity = %parent.id(), total = results.len(), failed, "batch resolved");

    if let Some(view) = receiver {
        view.handle_batch_data(results);
        return;
    }
    // Processor-only parents get the map as JSON.
    let Some(processor) = parent.processor() else {
        return;
    };
    match serde_json::to_value(&results) {
        Ok(value) => {
            let ctx = ProcessorContext::new(
                parent.data_config().default_operation,
                parent.clone(),
                None,
            );
            processor.on_success(&ctx, &value);
        }
        Err(e) => warn!(entity = %parent.id(), error = %e, "batch results not encodable"),
    }
}
