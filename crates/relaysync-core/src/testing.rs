//! In-memory collaborators for unit tests

use crate::selector::{RecommendationQuery, RelayCandidate, RelayDirectory, RelayError};
use crate::service::ServiceControl;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Answers queries from a script; an exhausted script answers with no candidates
#[derive(Default)]
pub struct ScriptedDirectory {
    script: Mutex<VecDeque<Option<Vec<RelayCandidate>>>>,
    queries: Mutex<Vec<RecommendationQuery>>,
}

impl ScriptedDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful answer
    pub fn push(&self, candidates: Vec<RelayCandidate>) {
        self.script.lock().push_back(Some(candidates));
    }

    /// Queue an answer with these addresses
    pub fn push_stations(&self, stations: &[&str]) {
        self.push(stations.iter().map(|s| RelayCandidate::with_station(s)).collect());
    }

    /// Queue a failed query
    pub fn fail(&self) {
        self.script.lock().push_back(None);
    }

    pub fn queries(&self) -> Vec<RecommendationQuery> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl RelayDirectory for ScriptedDirectory {
    async fn recommendations(&self, query: &RecommendationQuery) -> Result<Vec<RelayCandidate>, RelayError> {
        self.queries.lock().push(query.clone());
        match self.script.lock().pop_front() {
            Some(Some(candidates)) => Ok(candidates),
            Some(None) => Err(RelayError::Status(502)),
            None => Ok(Vec::new()),
        }
    }
}

/// Restart request seen by [`RecordingServices`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restart {
    pub service: String,
    pub instance: Option<String>,
    pub at: tokio::time::Instant,
}

/// Records restarts instead of running them
#[derive(Default)]
pub struct RecordingServices {
    restarts: Mutex<Vec<Restart>>,
}

impl RecordingServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restarts(&self) -> Vec<Restart> {
        self.restarts.lock().clone()
    }

    /// `service` or `service:instance` per restart
    pub fn commands(&self) -> Vec<String> {
        self.restarts
            .lock()
            .iter()
            .map(|r| match &r.instance {
                Some(instance) => format!("{}:{}", r.service, instance),
                None => r.service.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl ServiceControl for RecordingServices {
    async fn restart(&self, service: &str, instance: Option<&str>) {
        self.restarts.lock().push(Restart {
            service: service.to_string(),
            instance: instance.map(String::from),
            at: tokio::time::Instant::now(),
        });
    }
}
