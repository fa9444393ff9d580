//! Region data model.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One deployable region: a relational endpoint and a cache endpoint.
///
/// Regions are symmetric — either may be active. The identifier is an
/// opaque string drawn from configuration, not a hardcoded closed set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub relational_endpoint: String,
    pub cache_endpoint: String,
}

/// The configured universe of regions, keyed by id.
pub type RegionMap = HashMap<String, Region>;
