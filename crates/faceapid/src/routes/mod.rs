//! HTTP handlers.

pub mod account;
pub mod compare;
pub mod detect;
pub mod health;
pub mod metadata;
pub mod v1;

use crate::auth::Caller;
use crate::metadata::{MetadataRecord, UserRef};
use crate::AppState;

/// Append a processing record when recording is enabled.
///
/// Recording failures are logged and never fail the request that produced
/// the record.
pub(crate) async fn record(
    state: &AppState,
    caller: &Caller,
    image_path: String,
    build: impl FnOnce(MetadataRecord) -> MetadataRecord,
) {
    if !state.config.record_metadata {
        return;
    }
    let record = build(MetadataRecord::new(UserRef::Name(caller.user_id()), image_path));
    if let Err(err) = state.metadata.append(&record).await {
        tracing::warn!(%err, "failed to record metadata");
    }
}
