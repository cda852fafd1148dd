//! WIQL builders for the three query shapes the workflows need.
//!
//! Everything here is pure text assembly. Quoting of string literals and escaping for
//! the JSON request body both happen here, so a transport can send `envelope()` as is.

use std::fmt;

const HIERARCHY_FORWARD: &str = "System.LinkTypes.Hierarchy-Forward";

/// A compiled WIQL query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wiql {
    text: String,
}

impl Wiql {
    /// All items of `item_type` in `project`, newest first.
    pub fn by_type(item_type: &str, project: &str) -> Self {
        Self::flat(item_type, project, None)
    }

    /// Items of `item_type` whose title contains `fragment`.
    ///
    /// An empty fragment still emits the `CONTAINS ''` clause, which matches every title.
    pub fn by_title_fragment(item_type: &str, project: &str, fragment: &str) -> Self {
        Self::flat(item_type, project, Some(fragment))
    }

    /// Items of `target_type` reachable from any of `source_ids` through forward hierarchy
    /// links, at any depth. `None` when there is nothing to start from.
    pub fn by_hierarchy(source_ids: &[u64], target_type: &str) -> Option<Self> {
        if source_ids.is_empty() {
            return None;
        }
        let ids = source_ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let text = format!(
            "SELECT [System.Id], [System.Title], [System.State], [System.WorkItemType]\n\
             FROM WorkItemLinks\n\
             WHERE [Source].[System.Id] IN ({ids})\n\
             AND [System.Links.LinkType] = {link}\n\
             AND [Target].[System.WorkItemType] = {target}\n\
             MODE (Recursive)",
            link = literal(HIERARCHY_FORWARD),
            target = literal(target_type),
        );
        Some(Self { text })
    }

    fn flat(item_type: &str, project: &str, fragment: Option<&str>) -> Self {
        let mut text = format!(
            "SELECT [System.Id], [System.Title], [System.State], [System.CreatedDate]\n\
             FROM WorkItems\n\
             WHERE [System.WorkItemType] = {}\n\
             AND [System.TeamProject] = {}\n",
            literal(item_type),
            literal(project),
        );
        if let Some(fragment) = fragment {
            text.push_str(&format!("AND [System.Title] CONTAINS {}\n", literal(fragment)));
        }
        text.push_str("ORDER BY [System.CreatedDate] DESC");
        Self { text }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// JSON request body `{"query": "..."}` with quotes and newlines escaped.
    pub fn envelope(&self) -> String {
        serde_json::json!({ "query": self.text }).to_string()
    }
}

impl fmt::Display for Wiql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// WIQL string literal; single quotes are doubled.
fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_type_filters_type_and_project() {
        let q = Wiql::by_type("Task", "Fabrikam");
        assert!(q.as_str().contains("FROM WorkItems"));
        assert!(q.as_str().contains("[System.WorkItemType] = 'Task'"));
        assert!(q.as_str().contains("[System.TeamProject] = 'Fabrikam'"));
        assert!(q.as_str().ends_with("ORDER BY [System.CreatedDate] DESC"));
        assert!(!q.as_str().contains("CONTAINS"));
    }

    #[test]
    fn title_fragment_adds_containment() {
        let q = Wiql::by_title_fragment("Epic", "Fabrikam", "Checkout");
        assert!(q.as_str().contains("[System.Title] CONTAINS 'Checkout'"));
        assert!(q.as_str().ends_with("ORDER BY [System.CreatedDate] DESC"));
    }

    #[test]
    fn empty_fragment_keeps_the_containment_clause() {
        let q = Wiql::by_title_fragment("Epic", "Fabrikam", "");
        assert!(q.as_str().contains("[System.Title] CONTAINS ''"));
    }

    #[test]
    fn single_quotes_are_doubled() {
        let q = Wiql::by_title_fragment("Epic", "O'Brien Labs", "Bob's epic");
        assert!(q.as_str().contains("[System.TeamProject] = 'O''Brien Labs'"));
        assert!(q.as_str().contains("CONTAINS 'Bob''s epic'"));
    }

    #[test]
    fn hierarchy_lists_sources_and_target() {
        let q = Wiql::by_hierarchy(&[12, 34], "Issue").unwrap();
        assert!(q.as_str().contains("FROM WorkItemLinks"));
        assert!(q.as_str().contains("[Source].[System.Id] IN (12, 34)"));
        assert!(q
            .as_str()
            .contains("[System.Links.LinkType] = 'System.LinkTypes.Hierarchy-Forward'"));
        assert!(q.as_str().contains("[Target].[System.WorkItemType] = 'Issue'"));
        assert!(q.as_str().ends_with("MODE (Recursive)"));
    }

    #[test]
    fn hierarchy_without_sources_compiles_nothing() {
        assert_eq!(Wiql::by_hierarchy(&[], "Task"), None);
    }

    #[test]
    fn envelope_escapes_quotes_and_newlines() {
        let q = Wiql::by_title_fragment("Epic", "Fabrikam", "say \"hi\"");
        let body = q.envelope();
        assert!(!body.contains('\n'));
        assert!(body.contains("\\n"));
        assert!(body.contains("\\\"hi\\\""));

        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["query"], q.as_str());
    }
}
