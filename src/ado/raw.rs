use serde::Deserialize;
use serde_json::{Map, Value};

/// Payload returned by the transport.
///
/// Work item detail responses carry a flat `value` list, flat WIQL queries a `workItems`
/// list, and link queries a `workItemRelations` edge list. Either, both or neither may be
/// present; `shape()` says which.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawResult {
    #[serde(default, rename = "value", alias = "workItems")]
    pub items: Option<Vec<RawWorkItem>>,
    #[serde(default, rename = "workItemRelations")]
    pub relations: Option<Vec<RawRelation>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawWorkItem {
    pub id: u64,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// A link query edge. Only the target end is read; `rel` and `source` are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawRelation {
    #[serde(default)]
    pub target: Option<RawRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RawRef {
    pub id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawShape<'a> {
    Flat(&'a [RawWorkItem]),
    Edges(&'a [RawRelation]),
    Mixed {
        items: &'a [RawWorkItem],
        relations: &'a [RawRelation],
    },
    Unrecognized,
}

impl RawResult {
    /// An empty flat list, used when a fetch is skipped locally.
    pub fn empty() -> Self {
        Self::from_items(Vec::new())
    }

    pub fn from_items(items: Vec<RawWorkItem>) -> Self {
        Self {
            items: Some(items),
            relations: None,
        }
    }

    pub fn shape(&self) -> RawShape<'_> {
        match (&self.items, &self.relations) {
            (Some(items), Some(relations)) => RawShape::Mixed { items, relations },
            (Some(items), None) => RawShape::Flat(items),
            (None, Some(relations)) => RawShape::Edges(relations),
            (None, None) => RawShape::Unrecognized,
        }
    }
}
