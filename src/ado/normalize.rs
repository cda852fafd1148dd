//! Turns raw transport payloads into typed work items.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::error::AdoError;
use super::raw::{RawRelation, RawResult, RawShape, RawWorkItem};
use crate::model::work_item::{EpicInfo, TaskInfo, UserStoryInfo, WorkItemBase, WorkItemKind};

const LOCAL_ISO: &str = "%Y-%m-%dT%H:%M:%S%.f";
const UTC_MICROS: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";
const UTC_SECONDS: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Ids from flat items and edge targets, deduplicated in first-occurrence order.
pub fn extract_identifiers(raw: &RawResult) -> Result<Vec<u64>, AdoError> {
    let (items, relations): (&[RawWorkItem], &[RawRelation]) = match raw.shape() {
        RawShape::Flat(items) => (items, &[]),
        RawShape::Edges(relations) => (&[], relations),
        RawShape::Mixed { items, relations } => (items, relations),
        RawShape::Unrecognized => {
            return Err(AdoError::parsing(
                "response has neither work items nor work item relations",
            ))
        }
    };

    let mut seen = HashSet::new();
    let ids: Vec<u64> = items
        .iter()
        .map(|item| item.id)
        .chain(relations.iter().filter_map(|r| r.target.map(|t| t.id)))
        .filter(|id| seen.insert(*id))
        .collect();

    debug!(count = ids.len(), "extracted work item ids");
    Ok(ids)
}

pub fn parse_epics(raw: &RawResult) -> Result<Vec<EpicInfo>, AdoError> {
    let epics: Vec<EpicInfo> = items_of_kind(raw, WorkItemKind::Epic)?
        .map(|item| {
            let f = &item.fields;
            EpicInfo {
                base: base(item),
                priority: text(f, "Microsoft.VSTS.Common.Priority"),
                business_value: text(f, "Microsoft.VSTS.Common.BusinessValue"),
                acceptance_criteria: text(f, "Microsoft.VSTS.Common.AcceptanceCriteria"),
                start_date: timestamp(f, "Microsoft.VSTS.Scheduling.StartDate"),
                target_date: timestamp(f, "Microsoft.VSTS.Scheduling.TargetDate"),
            }
        })
        .collect();
    debug!(count = epics.len(), "parsed epics");
    Ok(epics)
}

pub fn parse_user_stories(raw: &RawResult) -> Result<Vec<UserStoryInfo>, AdoError> {
    let stories: Vec<UserStoryInfo> = items_of_kind(raw, WorkItemKind::UserStory)?
        .map(|item| {
            let f = &item.fields;
            UserStoryInfo {
                base: base(item),
                acceptance_criteria: text(f, "Microsoft.VSTS.Common.AcceptanceCriteria"),
                story_points: integer(f, "Microsoft.VSTS.Scheduling.StoryPoints"),
                priority: text(f, "Microsoft.VSTS.Common.Priority"),
                risk_level: text(f, "Microsoft.VSTS.Common.Risk"),
            }
        })
        .collect();
    debug!(count = stories.len(), "parsed user stories");
    Ok(stories)
}

pub fn parse_tasks(raw: &RawResult) -> Result<Vec<TaskInfo>, AdoError> {
    let tasks: Vec<TaskInfo> = items_of_kind(raw, WorkItemKind::Task)?
        .map(|item| {
            let f = &item.fields;
            TaskInfo {
                base: base(item),
                remaining_work: float(f, "Microsoft.VSTS.Scheduling.RemainingWork"),
                original_estimate: float(f, "Microsoft.VSTS.Scheduling.OriginalEstimate"),
                completed_work: float(f, "Microsoft.VSTS.Scheduling.CompletedWork"),
                activity: text(f, "Microsoft.VSTS.Common.Activity"),
                priority: text(f, "Microsoft.VSTS.Common.Priority"),
            }
        })
        .collect();
    debug!(count = tasks.len(), "parsed tasks");
    Ok(tasks)
}

/// Parse a timestamp in any of the formats the service has been seen to emit.
///
/// Formats are tried in order: RFC 3339 with offset, local ISO (taken as UTC), then the
/// two fixed `Z`-suffixed patterns. Unparseable input is logged and treated as absent.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for pattern in [LOCAL_ISO, UTC_MICROS, UTC_SECONDS] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, pattern) {
            return Some(naive.and_utc());
        }
    }
    warn!(value, "could not parse timestamp");
    None
}

fn items_of_kind(
    raw: &RawResult,
    kind: WorkItemKind,
) -> Result<impl Iterator<Item = &RawWorkItem>, AdoError> {
    let items = raw
        .items
        .as_deref()
        .ok_or_else(|| AdoError::parsing("response has no work item list"))?;
    Ok(items.iter().filter(move |item| kind_of(item) == kind))
}

fn kind_of(item: &RawWorkItem) -> WorkItemKind {
    item.fields
        .get("System.WorkItemType")
        .and_then(Value::as_str)
        .map_or(WorkItemKind::Unrecognized, WorkItemKind::from_type_name)
}

fn base(item: &RawWorkItem) -> WorkItemBase {
    let f = &item.fields;
    WorkItemBase {
        id: item.id,
        title: text(f, "System.Title"),
        state: text(f, "System.State"),
        description: text(f, "System.Description"),
        assigned_to: f
            .get("System.AssignedTo")
            .and_then(|v| v.get("displayName"))
            .and_then(scalar_text),
        area_path: text(f, "System.AreaPath"),
        created_date: timestamp(f, "System.CreatedDate"),
        changed_date: timestamp(f, "System.ChangedDate"),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn text(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields.get(name).and_then(scalar_text)
}

fn integer(fields: &Map<String, Value>, name: &str) -> Option<i64> {
    match fields.get(name)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float(fields: &Map<String, Value>, name: &str) -> Option<f64> {
    match fields.get(name)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn timestamp(fields: &Map<String, Value>, name: &str) -> Option<DateTime<Utc>> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
}
