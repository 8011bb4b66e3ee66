//! Location hint for joins.
//!
//! The coordinator uses the location to pick a nearby media edge. Working
//! it out (latency probes, geo lookups) is the embedding application's job;
//! the session client only asks for the current value when joining.

use async_trait::async_trait;

use crate::errors::CallError;

/// Produces a location token such as `"FRA"` or `"IAD"`.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn get_location(&self) -> Result<String, CallError>;
}

/// Always returns the same location.
#[derive(Debug, Clone)]
pub struct StaticLocationProvider {
    location: String,
}

impl StaticLocationProvider {
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }
}

#[async_trait]
impl LocationProvider for StaticLocationProvider {
    async fn get_location(&self) -> Result<String, CallError> {
        Ok(self.location.clone())
    }
}
