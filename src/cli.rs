use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::model::work_item::{EpicInfo, TaskInfo, UserStoryInfo};
use crate::model::workflow::WorkflowResult;
use crate::workflow::{EpicQuery, Orchestrator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Full workflow for an epic id or title fragment. Empty input covers every epic.
    Resolve(String),
    /// One epic by id, or the epics whose title contains the fragment.
    Epics(String),
    Stories { epic: Option<String> },
    Tasks { epic: Option<u64> },
    Help,
}

/// Parse everything after the binary name into a command.
///
/// Supported forms:
///   epic-rollup resolve 42
///   epic-rollup resolve Checkout revamp
///   epic-rollup resolve ""
///   epic-rollup epics [id|fragment]
///   epic-rollup stories [--epic <id|name>]
///   epic-rollup tasks [--epic <id>]
pub fn parse_args(args: &[String]) -> Result<Command> {
    let Some((name, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };

    match name.as_str() {
        "resolve" => Ok(Command::Resolve(rest.join(" "))),
        "epics" => Ok(Command::Epics(rest.join(" "))),
        "stories" => Ok(Command::Stories {
            epic: parse_epic_flag(rest)?,
        }),
        "tasks" => {
            let epic = match parse_epic_flag(rest)? {
                Some(value) => Some(
                    value
                        .trim()
                        .parse::<u64>()
                        .with_context(|| format!("`--epic` for tasks must be an id, got '{value}'"))?,
                ),
                None => None,
            };
            Ok(Command::Tasks { epic })
        }
        "help" | "-h" | "--help" => Ok(Command::Help),
        other => bail!("Unknown command '{other}'. Run `epic-rollup help` for usage."),
    }
}

fn parse_epic_flag(args: &[String]) -> Result<Option<String>> {
    let mut epic = None;
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--epic" | "-e" => {
                i += 1;
                match args.get(i) {
                    Some(value) => epic = Some(value.clone()),
                    None => bail!("Missing value for --epic flag"),
                }
            }
            other => bail!("Unexpected argument '{other}'"),
        }
        i += 1;
    }

    Ok(epic)
}

/// Run a command and return the JSON document to print.
pub async fn execute(command: Command, orchestrator: &Orchestrator) -> Result<Value> {
    match command {
        Command::Resolve(input) => {
            let result = orchestrator.resolve(&input).await?;
            if result.first_epic().is_none() {
                let by = if result.is_by_id() { "id" } else { "title fragment" };
                warn!(search = %result.search_value, "no epic matches this {by}");
            }
            render_workflow(&result)
        }
        Command::Epics(input) => {
            let epics: Vec<EpicInfo> = match EpicQuery::parse(&input) {
                EpicQuery::ById(id) => orchestrator.epic_by_id(id).await?.into_iter().collect(),
                EpicQuery::ByNameFragment(fragment) => orchestrator.list_epics(&fragment).await?,
            };
            render_list(&epics)
        }
        Command::Stories { epic: None } => render_list(&orchestrator.list_user_stories().await?),
        Command::Stories { epic: Some(epic) } => {
            let stories = match EpicQuery::parse(&epic) {
                EpicQuery::ById(id) => orchestrator.user_stories_for_epics(&[id]).await?,
                EpicQuery::ByNameFragment(fragment) => {
                    orchestrator.user_stories_for_epic_name(&fragment).await?
                }
            };
            render_list(&stories)
        }
        Command::Tasks { epic: None } => render_list(&orchestrator.list_tasks().await?),
        Command::Tasks { epic: Some(id) } => render_list(&orchestrator.tasks_for_epics(&[id]).await?),
        Command::Help => {
            print_help();
            Ok(Value::Null)
        }
    }
}

pub fn render_workflow(result: &WorkflowResult) -> Result<Value> {
    let mut doc = serde_json::to_value(result).context("Failed to serialize workflow result")?;
    if let Value::Object(map) = &mut doc {
        map.insert("totals".into(), totals(result));
        map.insert("summary".into(), Value::String(result.summary()));
    }
    Ok(doc)
}

/// State breakdown per kind, plus estimate coverage and mean task progress.
fn totals(result: &WorkflowResult) -> Value {
    let epics: Vec<&EpicInfo> = result.epics.iter().filter_map(|a| a.epic.as_ref()).collect();
    let stories: Vec<&UserStoryInfo> = result.epics.iter().flat_map(|a| &a.user_stories).collect();
    let tasks: Vec<&TaskInfo> = result.epics.iter().flat_map(|a| &a.tasks).collect();
    let average_progress = (!tasks.is_empty()).then(|| {
        tasks.iter().map(|t| t.progress_percentage()).sum::<f64>() / tasks.len() as f64
    });

    json!({
        "epics": {
            "total": result.total_epics(),
            "completed": epics.iter().filter(|e| e.is_completed()).count(),
            "in_progress": epics.iter().filter(|e| e.is_in_progress()).count(),
            "new": epics.iter().filter(|e| e.is_new()).count(),
        },
        "user_stories": {
            "total": result.total_user_stories(),
            "completed": result.completed_user_stories(),
            "in_progress": stories.iter().filter(|s| s.is_in_progress()).count(),
            "new": stories.iter().filter(|s| s.is_new()).count(),
            "estimated": stories.iter().filter(|s| s.has_story_points()).count(),
        },
        "tasks": {
            "total": result.total_tasks(),
            "completed": result.completed_tasks(),
            "in_progress": tasks.iter().filter(|t| t.is_in_progress()).count(),
            "new": tasks.iter().filter(|t| t.is_new()).count(),
            "estimated": tasks.iter().filter(|t| t.has_time_estimate()).count(),
            "average_progress": average_progress,
        },
    })
}

fn render_list<T: Serialize>(items: &[T]) -> Result<Value> {
    let items = serde_json::to_value(items).context("Failed to serialize work items")?;
    Ok(json!({
        "count": items.as_array().map_or(0, Vec::len),
        "items": items,
    }))
}

pub fn print_help() {
    println!("epic-rollup: epic, user story and task rollups from Azure DevOps\n");
    println!("USAGE:");
    println!("  epic-rollup resolve <id|name>        Resolve epics and fetch their stories and tasks");
    println!("  epic-rollup epics [id|fragment]      Show one epic, or list epics filtered by title");
    println!("  epic-rollup stories [--epic <id|name>]");
    println!("                                       List user stories, all or under an epic");
    println!("  epic-rollup tasks [--epic <id>]      List tasks, all or under an epic");
    println!("  epic-rollup help                     Show this message");
    println!();
    println!("CONFIG:");
    println!("  ~/.epic-rollup/config.toml (override with EPIC_ROLLUP_CONFIG)");
    println!("  ADO_PAT overrides pat_token; RUST_LOG controls log output on stderr");
    println!();
    println!("EXAMPLES:");
    println!("  epic-rollup resolve 1234");
    println!("  epic-rollup resolve \"Checkout revamp\"");
    println!("  epic-rollup stories --epic Checkout");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ado::tests::MockTransport;
    use crate::model::workflow::SearchMode;

    fn args(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| s.to_string()).collect()
    }

    fn orchestrator() -> Orchestrator {
        let mock = MockTransport::new()
            .epic(1, "Checkout revamp", "Active")
            .story(10, 1, "Guest checkout", "Closed")
            .task(100, 10, "Build form", "Active");
        Orchestrator::new(Box::new(mock), "Fabrikam")
    }

    #[test]
    fn no_args_is_help() {
        assert_eq!(parse_args(&[]).unwrap(), Command::Help);
        assert_eq!(parse_args(&args(&["--help"])).unwrap(), Command::Help);
    }

    #[test]
    fn resolve_joins_words() {
        let command = parse_args(&args(&["resolve", "Checkout", "revamp"])).unwrap();
        assert_eq!(command, Command::Resolve("Checkout revamp".into()));
    }

    #[test]
    fn resolve_without_input_covers_every_epic() {
        assert_eq!(
            parse_args(&args(&["resolve"])).unwrap(),
            Command::Resolve(String::new())
        );
    }

    #[test]
    fn epics_fragment_is_optional() {
        assert_eq!(
            parse_args(&args(&["epics"])).unwrap(),
            Command::Epics(String::new())
        );
        assert_eq!(
            parse_args(&args(&["epics", "Check"])).unwrap(),
            Command::Epics("Check".into())
        );
    }

    #[test]
    fn stories_epic_flag() {
        assert_eq!(
            parse_args(&args(&["stories"])).unwrap(),
            Command::Stories { epic: None }
        );
        assert_eq!(
            parse_args(&args(&["stories", "--epic", "Checkout"])).unwrap(),
            Command::Stories {
                epic: Some("Checkout".into())
            }
        );
    }

    #[test]
    fn tasks_epic_must_be_numeric() {
        assert_eq!(
            parse_args(&args(&["tasks", "-e", "42"])).unwrap(),
            Command::Tasks { epic: Some(42) }
        );
        let err = parse_args(&args(&["tasks", "--epic", "Checkout"])).unwrap_err();
        assert!(err.to_string().contains("must be an id"));
    }

    #[test]
    fn missing_flag_value_fails() {
        let err = parse_args(&args(&["stories", "--epic"])).unwrap_err();
        assert!(err.to_string().contains("Missing value"));
    }

    #[test]
    fn unknown_command_fails() {
        let err = parse_args(&args(&["sync"])).unwrap_err();
        assert!(err.to_string().contains("Unknown command 'sync'"));
    }

    #[test]
    fn workflow_json_has_totals_and_summary() {
        let result = WorkflowResult::empty(SearchMode::ByNameFragment, "Payroll");
        let doc = render_workflow(&result).unwrap();
        assert_eq!(doc["search_mode"], "BY_NAME_FRAGMENT");
        assert_eq!(doc["totals"]["epics"]["total"], 0);
        assert!(doc["totals"]["tasks"]["average_progress"].is_null());
        assert!(doc["summary"].as_str().unwrap().contains("'Payroll'"));
    }

    #[tokio::test]
    async fn resolve_renders_the_aggregate() {
        let doc = execute(Command::Resolve("1".into()), &orchestrator())
            .await
            .unwrap();
        assert_eq!(doc["search_mode"], "BY_ID");
        assert_eq!(doc["epics"][0]["epic"]["id"], 1);
        assert_eq!(doc["epics"][0]["tasks"][0]["id"], 100);
        assert_eq!(doc["totals"]["epics"]["in_progress"], 1);
        assert_eq!(doc["totals"]["user_stories"]["completed"], 1);
        assert_eq!(doc["totals"]["user_stories"]["estimated"], 0);
        assert_eq!(doc["totals"]["tasks"]["in_progress"], 1);
        assert_eq!(doc["totals"]["tasks"]["average_progress"], 0.0);
        assert_eq!(doc["metadata"]["transport_call_count"], 3);
    }

    #[tokio::test]
    async fn empty_resolve_lists_every_epic() {
        let doc = execute(Command::Resolve(String::new()), &orchestrator())
            .await
            .unwrap();
        assert_eq!(doc["search_mode"], "BY_NAME_FRAGMENT");
        assert_eq!(doc["search_value"], "");
        assert_eq!(doc["totals"]["epics"]["total"], 1);
    }

    #[tokio::test]
    async fn numeric_epics_argument_is_an_id_lookup() {
        let mock = MockTransport::new()
            .epic(1, "Checkout revamp", "Active")
            .epic(2, "Release 1", "New");
        let calls = mock.calls.clone();
        let orchestrator = Orchestrator::new(Box::new(mock), "Fabrikam");

        let doc = execute(Command::Epics("1".into()), &orchestrator)
            .await
            .unwrap();
        assert_eq!(doc["count"], 1);
        assert_eq!(doc["items"][0]["id"], 1);
        assert_eq!(*calls.lock().unwrap(), vec!["relations:1"]);
    }

    #[tokio::test]
    async fn epics_argument_for_another_kind_is_empty() {
        let doc = execute(Command::Epics("100".into()), &orchestrator())
            .await
            .unwrap();
        assert_eq!(doc["count"], 0);
    }

    #[tokio::test]
    async fn stories_under_named_epic() {
        let command = Command::Stories {
            epic: Some("Checkout".into()),
        };
        let doc = execute(command, &orchestrator()).await.unwrap();
        assert_eq!(doc["count"], 1);
        assert_eq!(doc["items"][0]["title"], "Guest checkout");
    }

    #[tokio::test]
    async fn tasks_under_epic_id() {
        let doc = execute(Command::Tasks { epic: Some(1) }, &orchestrator())
            .await
            .unwrap();
        assert_eq!(doc["count"], 1);
        assert_eq!(doc["items"][0]["id"], 100);
    }
}
