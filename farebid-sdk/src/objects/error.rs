use serde::{Deserialize, Serialize};

/// JSON error body returned by every non-2xx response.
///
/// ```json
/// {"error":"OutOfPolicyAmount","message":"amount 150 outside [40, 100]"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable error name.
    pub error: String,
    pub message: String,
}
