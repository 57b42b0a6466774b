//! Response envelope for list endpoints.

use serde::Serialize;

/// `{ "data": T }` envelope used by collection responses.
///
/// Single-resource responses (job status, acceptance receipts) are returned
/// bare so pollers can read fields directly.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
