// ── View collaborator ──
//
// The consumer side of a dispatch. Views only ever see delivered data
// or delivered errors; they never observe cache or queue state.

use crate::model::{BatchResults, DataError, DataPayload, LeafOutcome};

/// Receives the outcome of requests made on its behalf.
///
/// `handle_batch_data` and `handle_bulk_data` are only called when the
/// view is the aggregate receiver of a batch or bulk call; the defaults
/// drop the result.
pub trait DataView: Send + Sync + 'static {
    fn handle_data_change(&self, data: DataPayload);

    fn handle_data_error(&self, error: DataError);

    fn handle_batch_data(&self, results: BatchResults) {
        let _ = results;
    }

    fn handle_bulk_data(&self, results: Vec<LeafOutcome>) {
        let _ = results;
    }
}
