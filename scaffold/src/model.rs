//! Artifact families and the aggregate project state.
//!
//! Every generated artifact carries its own [`ArtifactStatus`] so a failure
//! in one never hides the others. Collections that the user sees in order
//! (pages, APIs, tables, components) keep insertion order end-to-end.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle of a single artifact.
///
/// ```text
/// Pending → Generating → Success
///                      → Retrying(1) → … → Retrying(n) → Success | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "attempt", rename_all = "snake_case")]
pub enum ArtifactStatus {
    #[default]
    Pending,
    Generating,
    /// Attempt `n` was rejected and another try follows.
    Retrying(u32),
    Success,
    Failed,
}

impl ArtifactStatus {
    /// Whether the artifact will not change again without a regeneration.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Generating => write!(f, "generating"),
            Self::Retrying(n) => write!(f, "retrying ({n})"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ── Brief ───────────────────────────────────────────────────────────────

/// What the user asked for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectBrief {
    pub name: String,
    pub purpose: String,
    /// Free-form colour wishes, e.g. "navy and warm orange".
    #[serde(default)]
    pub colors: String,
    #[serde(default)]
    pub multi_page: bool,
}

// ── Page plan ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Page {
    pub name: String,
    #[serde(default)]
    pub purpose: String,
    /// Component names used on this page, in display order.
    #[serde(default)]
    pub components: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PagePlan {
    pub pages: Vec<Page>,
}

impl PagePlan {
    /// Component names across all pages, deduplicated in first-use order.
    pub fn unique_components(&self) -> Vec<String> {
        let mut seen = IndexSet::new();
        for page in &self.pages {
            for component in &page.components {
                seen.insert(component.clone());
            }
        }
        seen.into_iter().collect()
    }

    pub fn page(&self, name: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.name == name)
    }

    /// First page that uses `component`.
    pub fn page_using(&self, component: &str) -> Option<&Page> {
        self.pages
            .iter()
            .find(|p| p.components.iter().any(|c| c == component))
    }
}

// ── Styling ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StylingPlan {
    /// Role (`primary`, `background`, …) to hex colour, in model order.
    pub colors: IndexMap<String, String>,
}

impl StylingPlan {
    /// Roles whose value is not a `#rgb` / `#rrggbb` hex colour.
    pub fn invalid_roles(&self) -> Vec<&str> {
        self.colors
            .iter()
            .filter(|(_, v)| !is_hex_color(v))
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

pub fn is_hex_color(value: &str) -> bool {
    let Some(digits) = value.strip_prefix('#') else {
        return false;
    };
    matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit())
}

// ── API surface ─────────────────────────────────────────────────────────

/// A declared API parameter. Models emit either a bare name or an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ApiParameter {
    Name(String),
    Field {
        name: String,
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        required: Option<bool>,
    },
}

impl ApiParameter {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(n) => n,
            Self::Field { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ApiSpec {
    pub name: String,
    pub endpoint: String,
    pub method: String,
    #[serde(default)]
    pub parameters: Vec<ApiParameter>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ApiPlan {
    pub apis: Vec<ApiSpec>,
}

// ── Database schema ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForeignKey {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    #[serde(rename = "type")]
    pub kind: String,
    pub related_table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub table_name: String,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Schema {
    pub tables: Vec<Table>,
}

impl Schema {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.table_name == name)
    }
}

// ── Generated code ──────────────────────────────────────────────────────

/// A stage artifact together with its status.
///
/// `confirmed` survives a failed regeneration: the status turns `Failed`
/// but the last accepted value stays usable downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tracked<T> {
    pub value: T,
    pub status: ArtifactStatus,
    #[serde(default)]
    pub confirmed: bool,
}

impl<T: Default> Tracked<T> {
    pub fn succeeded(value: T) -> Self {
        Self {
            value,
            status: ArtifactStatus::Success,
            confirmed: true,
        }
    }

    /// Failed stages keep an empty value.
    pub fn failed() -> Self {
        Self {
            value: T::default(),
            status: ArtifactStatus::Failed,
            confirmed: false,
        }
    }

    /// The last confirmed value, if any.
    pub fn available(&self) -> Option<&T> {
        self.confirmed.then_some(&self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiComponent {
    pub name: String,
    /// TSX source; the failure placeholder while status is `Failed`.
    pub source: String,
    pub status: ArtifactStatus,
    /// Last rejection reason, kept for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl UiComponent {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: String::new(),
            status: ArtifactStatus::Pending,
            failure: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerlessApi {
    pub spec: ApiSpec,
    pub code: String,
    pub status: ArtifactStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlScript {
    pub text: String,
    pub status: ArtifactStatus,
}

/// Source rendered in place of a component that never compiled.
pub fn failure_placeholder_source(name: &str, attempts: u32) -> String {
    format!("() => <div>Error generating {name} after {attempts} attempts</div>")
}

// ── Aggregate ───────────────────────────────────────────────────────────

/// Everything generated for one project.
///
/// Mutated only through [`ProjectState::apply`](crate::state).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub brief: ProjectBrief,
    pub page_plan: Tracked<PagePlan>,
    pub styling: Tracked<StylingPlan>,
    pub api_plan: Tracked<ApiPlan>,
    pub schema: Tracked<Schema>,
    pub components: IndexMap<String, UiComponent>,
    pub apis: IndexMap<String, ServerlessApi>,
    pub sql: SqlScript,
}

impl ProjectState {
    pub fn new(brief: ProjectBrief) -> Self {
        Self {
            brief,
            ..Self::default()
        }
    }

    pub fn successful_components(&self) -> impl Iterator<Item = &UiComponent> {
        self.components.values().filter(|c| c.status.is_success())
    }

    pub fn successful_apis(&self) -> impl Iterator<Item = &ServerlessApi> {
        self.apis.values().filter(|a| a.status.is_success())
    }

    /// Every artifact label with its current status, in pipeline order.
    pub fn statuses(&self) -> Vec<(String, ArtifactStatus)> {
        let mut out = vec![
            ("page plan".to_string(), self.page_plan.status),
            ("styling".to_string(), self.styling.status),
            ("api plan".to_string(), self.api_plan.status),
            ("schema".to_string(), self.schema.status),
        ];
        out.extend(self.components.values().map(|c| (c.name.clone(), c.status)));
        out.extend(self.apis.values().map(|a| (a.spec.name.clone(), a.status)));
        out.push(("sql".to_string(), self.sql.status));
        out
    }
}

/// Decode a model listing that may arrive either as a bare array or wrapped
/// in an object under `key` (`[..]` vs `{"pages": [..]}`).
pub fn listing(value: serde_json::Value, key: &str) -> serde_json::Value {
    match value {
        serde_json::Value::Array(items) => {
            let mut map = serde_json::Map::new();
            map.insert(key.to_string(), serde_json::Value::Array(items));
            serde_json::Value::Object(map)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrying_status_displays_attempt() {
        assert_eq!(ArtifactStatus::Retrying(2).to_string(), "retrying (2)");
        assert_eq!(ArtifactStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn unique_components_dedups_in_first_use_order() {
        let plan = PagePlan {
            pages: vec![
                Page {
                    name: "Home".into(),
                    purpose: String::new(),
                    components: vec!["Header".into(), "Hero".into(), "Footer".into()],
                },
                Page {
                    name: "About".into(),
                    purpose: String::new(),
                    components: vec!["Header".into(), "Team".into(), "Footer".into()],
                },
            ],
        };
        assert_eq!(
            plan.unique_components(),
            vec!["Header", "Hero", "Footer", "Team"]
        );
        assert_eq!(plan.page_using("Team").map(|p| p.name.as_str()), Some("About"));
    }

    #[test]
    fn hex_colour_validation() {
        assert!(is_hex_color("#fff"));
        assert!(is_hex_color("#1A2b3C"));
        assert!(!is_hex_color("blue"));
        assert!(!is_hex_color("#12345"));
    }

    #[test]
    fn api_parameters_accept_names_and_objects() {
        let spec: ApiSpec = serde_json::from_str(
            r#"{"name":"getUser","endpoint":"/api/user","method":"GET",
                "parameters":["id", {"name":"expand","type":"boolean"}]}"#,
        )
        .unwrap();
        let names: Vec<_> = spec.parameters.iter().map(ApiParameter::name).collect();
        assert_eq!(names, vec!["id", "expand"]);
    }

    #[test]
    fn schema_uses_camel_case_wire_names() {
        let schema: Schema = serde_json::from_str(
            r#"{"tables":[{"tableName":"orders","columns":[
                {"name":"id","type":"uuid","primaryKey":true,"nullable":false},
                {"name":"user_id","type":"uuid","foreignKey":{"table":"users"}}],
                "relationships":[{"type":"many-to-one","relatedTable":"users","column":"user_id"}]}]}"#,
        )
        .unwrap();
        let orders = schema.table("orders").unwrap();
        assert!(orders.columns[0].primary_key);
        assert_eq!(
            orders.columns[1].foreign_key.as_ref().map(|f| f.table.as_str()),
            Some("users")
        );
        assert_eq!(orders.relationships[0].related_table, "users");
    }

    #[test]
    fn listing_wraps_bare_arrays() {
        let wrapped = listing(serde_json::json!([{"name": "Home"}]), "pages");
        assert_eq!(wrapped, serde_json::json!({"pages": [{"name": "Home"}]}));
        let untouched = listing(serde_json::json!({"pages": []}), "pages");
        assert_eq!(untouched, serde_json::json!({"pages": []}));
    }

    #[test]
    fn failed_tracked_has_no_available_value() {
        let t: Tracked<Schema> = Tracked::failed();
        assert!(t.available().is_none());
        assert!(Tracked::succeeded(Schema::default()).available().is_some());
    }
}
