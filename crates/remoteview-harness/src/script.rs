//! Scripted responses of the simulated rendering service.

use remoteview_core::{RenderingSessionStatus, ServiceError, SessionId};

/// What the simulated service answers.
///
/// Created sessions are numbered per call (`{create}-1`, `{create}-2`, ...).
/// Property queries consume `properties` one entry per call; once exhausted
/// the last entry repeats.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceScript {
    /// Id prefix of created sessions, or the create/open failure
    pub create: Result<String, ServiceError>,
    /// Results of successive property queries
    pub properties: Vec<Result<RenderingSessionStatus, ServiceError>>,
    /// Result of the runtime connect
    pub connect: Result<(), ServiceError>,
    /// Progress values reported while loading
    pub load_progress: Vec<f32>,
    /// Result of the model load
    pub load: Result<(), ServiceError>,
}

impl Default for ServiceScript {
    fn default() -> Self {
        Self {
            create: Ok("sim-session".to_string()),
            properties: vec![Ok(RenderingSessionStatus::Starting), Ok(RenderingSessionStatus::Ready)],
            connect: Ok(()),
            load_progress: vec![0.25, 0.5, 1.0],
            load: Ok(()),
        }
    }
}

impl ServiceScript {
    /// Replace the property query results.
    pub fn with_properties(
        mut self,
        properties: impl IntoIterator<Item = Result<RenderingSessionStatus, ServiceError>>,
    ) -> Self {
        self.properties = properties.into_iter().collect();
        self
    }

    /// Session reports `Ready` on the first query.
    pub fn ready_immediately(self) -> Self {
        self.with_properties([Ok(RenderingSessionStatus::Ready)])
    }

    /// Reject create/open.
    pub fn fail_create(mut self, error: ServiceError) -> Self {
        self.create = Err(error);
        self
    }

    /// Fail the runtime connect.
    pub fn fail_connect(mut self, error: ServiceError) -> Self {
        self.connect = Err(error);
        self
    }

    /// Fail the model load.
    pub fn fail_load(mut self, error: ServiceError) -> Self {
        self.load = Err(error);
        self
    }

    /// Response to the create call number `call` (zero based).
    pub fn created_session(&self, call: usize) -> Result<SessionId, ServiceError> {
        self.create.clone().map(|prefix| SessionId::new(format!("{prefix}-{}", call + 1)))
    }

    /// Response to the property query number `call` (zero based).
    pub fn property_response(&self, call: usize) -> Result<RenderingSessionStatus, ServiceError> {
        self.properties
            .get(call)
            .or_else(|| self.properties.last())
            .cloned()
            .unwrap_or(Ok(RenderingSessionStatus::Unknown))
    }
}
