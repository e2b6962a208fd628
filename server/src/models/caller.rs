use serde::{Deserialize, Serialize};

/// Identity the rate limiter keys on. The API key itself is issued and
/// validated elsewhere; here it is only an opaque id.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
}
