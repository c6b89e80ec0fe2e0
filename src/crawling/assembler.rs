//! Result assembly: joins stubs with their details by position

use tracing::warn;

use crate::domain::{CompleteRecord, DetailRecord, StubRecord};

/// Pair each stub with the detail at the same position
///
/// A missing detail drops that stub with a warning. Output keeps stub order.
pub fn assemble(stubs: Vec<StubRecord>, details: Vec<Option<DetailRecord>>) -> Vec<CompleteRecord> {
    if stubs.len() != details.len() {
        warn!(
            "Assembling {} stubs against {} detail slots; unmatched stubs are skipped",
            stubs.len(),
            details.len()
        );
    }

    let mut details = details.into_iter();
    stubs
        .into_iter()
        .enumerate()
        .filter_map(|(position, stub)| match details.next().flatten() {
            Some(detail) => Some(CompleteRecord::from_parts(stub, detail)),
            None => {
                warn!("Skipping '{}' at position {}: no detail record", stub.name, position + 1);
                None
            }
        })
        .collect()
}
