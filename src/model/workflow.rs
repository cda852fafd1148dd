use serde::Serialize;
use std::fmt;

use super::work_item::{EpicInfo, TaskInfo, UserStoryInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchMode {
    ById,
    ByNameFragment,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::ById => f.write_str("BY_ID"),
            SearchMode::ByNameFragment => f.write_str("BY_NAME_FRAGMENT"),
        }
    }
}

/// One epic together with everything found beneath it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EpicAggregate {
    pub epic: Option<EpicInfo>,
    pub user_stories: Vec<UserStoryInfo>,
    pub tasks: Vec<TaskInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowMetadata {
    pub elapsed_millis: u64,
    pub transport_call_count: u32,
    pub had_errors: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub search_mode: SearchMode,
    pub search_value: String,
    pub epics: Vec<EpicAggregate>,
    pub metadata: WorkflowMetadata,
}

impl WorkflowResult {
    /// A resolution that matched nothing. Not an error.
    pub fn empty(search_mode: SearchMode, search_value: impl Into<String>) -> Self {
        Self {
            search_mode,
            search_value: search_value.into(),
            epics: Vec::new(),
            metadata: WorkflowMetadata::default(),
        }
    }

    pub fn total_epics(&self) -> usize {
        self.epics.len()
    }

    pub fn total_user_stories(&self) -> usize {
        self.epics.iter().map(|e| e.user_stories.len()).sum()
    }

    pub fn total_tasks(&self) -> usize {
        self.epics.iter().map(|e| e.tasks.len()).sum()
    }

    pub fn completed_user_stories(&self) -> usize {
        self.epics
            .iter()
            .flat_map(|e| &e.user_stories)
            .filter(|s| s.is_completed())
            .count()
    }

    pub fn completed_tasks(&self) -> usize {
        self.epics
            .iter()
            .flat_map(|e| &e.tasks)
            .filter(|t| t.is_completed())
            .count()
    }

    pub fn is_by_id(&self) -> bool {
        self.search_mode == SearchMode::ById
    }

    pub fn first_epic(&self) -> Option<&EpicAggregate> {
        self.epics.first()
    }

    pub fn summary(&self) -> String {
        format!(
            "Search {} '{}': {} epics, {} user stories ({} completed), {} tasks ({} completed)",
            self.search_mode,
            self.search_value,
            self.total_epics(),
            self.total_user_stories(),
            self.completed_user_stories(),
            self.total_tasks(),
            self.completed_tasks(),
        )
    }
}
