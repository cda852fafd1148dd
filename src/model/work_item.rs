use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const COMPLETED: &[&str] = &["Closed", "Done"];
const STORY_COMPLETED: &[&str] = &["Closed", "Done", "Resolved"];
const IN_PROGRESS: &[&str] = &["Active", "In Progress"];
const NEW: &[&str] = &["New"];

/// Work item type as reported by the `System.WorkItemType` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkItemKind {
    Epic,
    UserStory,
    Task,
    Unrecognized,
}

impl WorkItemKind {
    /// Exact, case-sensitive mapping. Anything unknown is `Unrecognized` and gets skipped.
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "Epic" => WorkItemKind::Epic,
            "Issue" | "User Story" => WorkItemKind::UserStory,
            "Task" => WorkItemKind::Task,
            _ => WorkItemKind::Unrecognized,
        }
    }

    /// Type name used when querying for this kind.
    pub fn query_name(&self) -> Option<&'static str> {
        match self {
            WorkItemKind::Epic => Some("Epic"),
            WorkItemKind::UserStory => Some("Issue"),
            WorkItemKind::Task => Some("Task"),
            WorkItemKind::Unrecognized => None,
        }
    }
}

/// Fields every work item kind carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkItemBase {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_date: Option<DateTime<Utc>>,
}

impl WorkItemBase {
    /// Case-insensitive match of `state` against a label set. Absent state matches nothing.
    fn state_in(&self, labels: &[&str]) -> bool {
        self.state
            .as_deref()
            .is_some_and(|s| labels.iter().any(|l| s.eq_ignore_ascii_case(l)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpicInfo {
    #[serde(flatten)]
    pub base: WorkItemBase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<DateTime<Utc>>,
}

impl EpicInfo {
    pub fn id(&self) -> u64 {
        self.base.id
    }

    pub fn is_completed(&self) -> bool {
        self.base.state_in(COMPLETED)
    }

    pub fn is_in_progress(&self) -> bool {
        self.base.state_in(IN_PROGRESS)
    }

    pub fn is_new(&self) -> bool {
        self.base.state_in(NEW)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStoryInfo {
    #[serde(flatten)]
    pub base: WorkItemBase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_points: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
}

impl UserStoryInfo {
    pub fn id(&self) -> u64 {
        self.base.id
    }

    /// Stories also count as completed once "Resolved".
    pub fn is_completed(&self) -> bool {
        self.base.state_in(STORY_COMPLETED)
    }

    pub fn is_in_progress(&self) -> bool {
        self.base.state_in(IN_PROGRESS)
    }

    pub fn is_new(&self) -> bool {
        self.base.state_in(NEW)
    }

    pub fn has_story_points(&self) -> bool {
        self.story_points.is_some_and(|p| p > 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    #[serde(flatten)]
    pub base: WorkItemBase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_work: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_estimate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_work: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

impl TaskInfo {
    pub fn id(&self) -> u64 {
        self.base.id
    }

    pub fn is_completed(&self) -> bool {
        self.base.state_in(COMPLETED)
    }

    pub fn is_in_progress(&self) -> bool {
        self.base.state_in(IN_PROGRESS)
    }

    pub fn is_new(&self) -> bool {
        self.base.state_in(NEW)
    }

    pub fn has_time_estimate(&self) -> bool {
        self.original_estimate.is_some_and(|e| e > 0.0)
    }

    /// Completed work as a share of the original estimate, capped at 100.
    ///
    /// Without a usable estimate the task is either all done (100) or not started (0).
    pub fn progress_percentage(&self) -> f64 {
        let estimate = match self.original_estimate {
            Some(e) if e != 0.0 => e,
            _ => return if self.is_completed() { 100.0 } else { 0.0 },
        };
        match self.completed_work {
            Some(done) => (done / estimate * 100.0).min(100.0),
            None => 0.0,
        }
    }
}
