// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity of the pipeline stage a consumer or producer runs in.

use crate::monitoring::Tags;

/// Scenario and stage names plus user tags, passed to every lifecycle call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageContext {
    pub scenario_name: String,
    pub stage_name: String,
    pub tags: Tags,
}

impl StageContext {
    pub fn new(scenario_name: impl Into<String>, stage_name: impl Into<String>) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            stage_name: stage_name.into(),
            tags: Tags::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Tags identifying counters created by this stage
    pub fn meter_tags(&self) -> Tags {
        self.identity_tags()
    }

    /// Tags attached to events emitted by this stage
    pub fn event_tags(&self) -> Tags {
        self.identity_tags()
    }

    fn identity_tags(&self) -> Tags {
        let mut tags = self.tags.clone();
        tags.insert("scenario".to_string(), self.scenario_name.clone());
        tags.insert("stage".to_string(), self.stage_name.clone());
        tags
    }
}
