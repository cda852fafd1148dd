//! Epic resolution and child fan-out.
//!
//! A workflow resolves its input to one or more epics, then fetches each epic's user
//! stories and tasks concurrently. Only the resolution step must succeed: a failed child
//! fetch leaves that list empty and is reported through the result metadata.

use std::fmt;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::ado::error::{classify, AdoError};
use crate::ado::normalize::{extract_identifiers, parse_epics, parse_tasks, parse_user_stories};
use crate::ado::query::Wiql;
use crate::ado::raw::RawResult;
use crate::ado::Transport;
use crate::model::work_item::{EpicInfo, TaskInfo, UserStoryInfo, WorkItemKind};
use crate::model::workflow::{EpicAggregate, SearchMode, WorkflowMetadata, WorkflowResult};

/// Transport calls reported for a full by-id workflow: epic, stories, tasks.
const BY_ID_CALLS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStage {
    Started,
    EpicsResolved,
    ChildFetchesDispatched,
    Joined,
    Completed,
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowStage::Started => f.write_str("started"),
            WorkflowStage::EpicsResolved => f.write_str("epics-resolved"),
            WorkflowStage::ChildFetchesDispatched => f.write_str("child-fetches-dispatched"),
            WorkflowStage::Joined => f.write_str("joined"),
            WorkflowStage::Completed => f.write_str("completed"),
        }
    }
}

/// Caller input: a numeric epic id or a title fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpicQuery {
    ById(u64),
    ByNameFragment(String),
}

impl EpicQuery {
    /// All-digit input (surrounding whitespace aside) is an id. Anything else, including
    /// nothing, is a title fragment and is kept exactly as given.
    pub fn parse(input: &str) -> Self {
        let digits = input.trim();
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(id) = digits.parse() {
                return EpicQuery::ById(id);
            }
        }
        EpicQuery::ByNameFragment(input.to_string())
    }
}

type Parser<T> = fn(&RawResult) -> Result<Vec<T>, AdoError>;

/// Result of one child fetch. A failed branch is empty and keeps its error.
struct Branch<T> {
    items: Vec<T>,
    error: Option<String>,
}

pub struct Orchestrator {
    transport: Box<dyn Transport>,
    project: String,
}

impl Orchestrator {
    pub fn new(transport: Box<dyn Transport>, project: impl Into<String>) -> Self {
        Self {
            transport,
            project: project.into(),
        }
    }

    pub async fn resolve(&self, input: &str) -> Result<WorkflowResult, AdoError> {
        match EpicQuery::parse(input) {
            EpicQuery::ById(id) => self.resolve_by_id(id).await,
            EpicQuery::ByNameFragment(fragment) => self.resolve_by_name_fragment(&fragment).await,
        }
    }

    pub async fn resolve_by_id(&self, id: u64) -> Result<WorkflowResult, AdoError> {
        let started = Instant::now();
        let search_value = id.to_string();
        debug!(stage = %WorkflowStage::Started, id, "resolving epic by id");

        let Some(epic) = self.epic_by_id(id).await? else {
            info!(id, "no epic with this id");
            let result = WorkflowResult::empty(SearchMode::ById, search_value);
            return Ok(finish(result, started, 1, Vec::new()));
        };
        debug!(stage = %WorkflowStage::EpicsResolved, id, "epic resolved");

        let (aggregate, errors) = self.expand_epic(epic).await;
        debug!(stage = %WorkflowStage::Joined, id, "child fetches joined");

        let mut result = WorkflowResult::empty(SearchMode::ById, search_value);
        result.epics.push(aggregate);
        Ok(finish(result, started, BY_ID_CALLS, errors))
    }

    pub async fn resolve_by_name_fragment(
        &self,
        fragment: &str,
    ) -> Result<WorkflowResult, AdoError> {
        let started = Instant::now();
        debug!(stage = %WorkflowStage::Started, fragment, "resolving epics by name fragment");

        let ids = self.matching_epic_ids(fragment).await?;
        if ids.is_empty() {
            info!(fragment, "no epic title matches");
            let result = WorkflowResult::empty(SearchMode::ByNameFragment, fragment);
            return Ok(finish(result, started, 1, Vec::new()));
        }
        let epics = parse_epics(&self.details(&ids).await?)?;
        debug!(stage = %WorkflowStage::EpicsResolved, count = epics.len(), "epics resolved");

        let epic_count = u32::try_from(epics.len()).unwrap_or(u32::MAX);
        // join_all yields in input order, whatever order the branches finish in.
        let expanded = join_all(epics.into_iter().map(|epic| self.expand_epic(epic))).await;
        debug!(stage = %WorkflowStage::Joined, count = expanded.len(), "child fetches joined");

        let mut result = WorkflowResult::empty(SearchMode::ByNameFragment, fragment);
        let mut errors = Vec::new();
        for (aggregate, branch_errors) in expanded {
            result.epics.push(aggregate);
            errors.extend(branch_errors);
        }
        let calls = 2u32.saturating_add(epic_count.saturating_mul(2));
        Ok(finish(result, started, calls, errors))
    }

    /// The epic with this id. `None` when the id names another kind of work item.
    pub async fn epic_by_id(&self, id: u64) -> Result<Option<EpicInfo>, AdoError> {
        let raw = self
            .transport
            .fetch_with_relations(id)
            .await
            .map_err(|f| classify(f, &self.project))?;
        Ok(parse_epics(&raw)?.into_iter().next())
    }

    /// Epics whose title contains `fragment`; an empty fragment lists them all.
    pub async fn list_epics(&self, fragment: &str) -> Result<Vec<EpicInfo>, AdoError> {
        let ids = self.matching_epic_ids(fragment).await?;
        parse_epics(&self.details(&ids).await?)
    }

    pub async fn list_user_stories(&self) -> Result<Vec<UserStoryInfo>, AdoError> {
        self.all_of_kind(WorkItemKind::UserStory, parse_user_stories)
            .await
    }

    pub async fn list_tasks(&self) -> Result<Vec<TaskInfo>, AdoError> {
        self.all_of_kind(WorkItemKind::Task, parse_tasks).await
    }

    pub async fn user_stories_for_epics(
        &self,
        epic_ids: &[u64],
    ) -> Result<Vec<UserStoryInfo>, AdoError> {
        self.children_of(epic_ids, WorkItemKind::UserStory, parse_user_stories)
            .await
    }

    pub async fn tasks_for_epics(&self, epic_ids: &[u64]) -> Result<Vec<TaskInfo>, AdoError> {
        self.children_of(epic_ids, WorkItemKind::Task, parse_tasks)
            .await
    }

    /// User stories under every epic whose title contains `fragment`.
    pub async fn user_stories_for_epic_name(
        &self,
        fragment: &str,
    ) -> Result<Vec<UserStoryInfo>, AdoError> {
        let ids = self.matching_epic_ids(fragment).await?;
        self.user_stories_for_epics(&ids).await
    }

    async fn expand_epic(&self, epic: EpicInfo) -> (EpicAggregate, Vec<String>) {
        let id = epic.id();
        debug!(stage = %WorkflowStage::ChildFetchesDispatched, id, "fetching stories and tasks");
        let (stories, tasks) = tokio::join!(
            self.child_branch(id, WorkItemKind::UserStory, parse_user_stories),
            self.child_branch(id, WorkItemKind::Task, parse_tasks),
        );
        let errors = stories.error.into_iter().chain(tasks.error).collect();
        let aggregate = EpicAggregate {
            epic: Some(epic),
            user_stories: stories.items,
            tasks: tasks.items,
        };
        (aggregate, errors)
    }

    async fn child_branch<T>(&self, epic_id: u64, kind: WorkItemKind, parse: Parser<T>) -> Branch<T> {
        match self.children_of(&[epic_id], kind, parse).await {
            Ok(items) => Branch { items, error: None },
            Err(err) => {
                let label = match kind {
                    WorkItemKind::UserStory => "user stories",
                    WorkItemKind::Task => "tasks",
                    WorkItemKind::Epic | WorkItemKind::Unrecognized => "children",
                };
                warn!(epic_id, error = %err, "fetching {label} failed, continuing without them");
                Branch {
                    items: Vec::new(),
                    error: Some(format!("{label} of epic {epic_id}: {err}")),
                }
            }
        }
    }

    async fn children_of<T>(
        &self,
        source_ids: &[u64],
        kind: WorkItemKind,
        parse: Parser<T>,
    ) -> Result<Vec<T>, AdoError> {
        let Some(wiql) = kind
            .query_name()
            .and_then(|target| Wiql::by_hierarchy(source_ids, target))
        else {
            return Ok(Vec::new());
        };
        let ids = extract_identifiers(&self.run(&wiql).await?)?;
        parse(&self.details(&ids).await?)
    }

    async fn all_of_kind<T>(&self, kind: WorkItemKind, parse: Parser<T>) -> Result<Vec<T>, AdoError> {
        let Some(name) = kind.query_name() else {
            return Ok(Vec::new());
        };
        let ids = extract_identifiers(&self.run(&Wiql::by_type(name, &self.project)).await?)?;
        parse(&self.details(&ids).await?)
    }

    async fn matching_epic_ids(&self, fragment: &str) -> Result<Vec<u64>, AdoError> {
        let wiql = Wiql::by_title_fragment("Epic", &self.project, fragment);
        extract_identifiers(&self.run(&wiql).await?)
    }

    async fn run(&self, wiql: &Wiql) -> Result<RawResult, AdoError> {
        self.transport
            .execute(wiql)
            .await
            .map_err(|f| classify(f, &self.project))
    }

    async fn details(&self, ids: &[u64]) -> Result<RawResult, AdoError> {
        if ids.is_empty() {
            return Ok(RawResult::empty());
        }
        self.transport
            .fetch_details(ids)
            .await
            .map_err(|f| classify(f, &self.project))
    }
}

fn finish(
    mut result: WorkflowResult,
    started: Instant,
    transport_call_count: u32,
    errors: Vec<String>,
) -> WorkflowResult {
    result.metadata = WorkflowMetadata {
        elapsed_millis: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        transport_call_count,
        had_errors: !errors.is_empty(),
        error_message: (!errors.is_empty()).then(|| errors.join("; ")),
    };
    info!(
        stage = %WorkflowStage::Completed,
        mode = %result.search_mode,
        search = %result.search_value,
        epics = result.total_epics(),
        user_stories = result.total_user_stories(),
        tasks = result.total_tasks(),
        elapsed_ms = result.metadata.elapsed_millis,
        had_errors = result.metadata.had_errors,
        "workflow completed"
    );
    result
}
