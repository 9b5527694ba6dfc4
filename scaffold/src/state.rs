//! Field-scoped reducers over [`ProjectState`].
//!
//! Generation results and user edits both arrive as [`StateEvent`]s. Each
//! event touches exactly one artifact, so an edit to the schema and a late
//! component result can be applied in either order without losing either.
//! Results addressed to an artifact that no longer exists are dropped.

use serde::{Deserialize, Serialize};

use crate::model::{
    failure_placeholder_source, ApiPlan, ApiSpec, ArtifactStatus, PagePlan, ProjectState, Schema,
    ServerlessApi, StylingPlan, Tracked, UiComponent,
};

/// Addresses one artifact in the project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum ArtifactRef {
    PagePlan,
    Styling,
    ApiPlan,
    Schema,
    Component(String),
    Api(String),
    Sql,
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PagePlan => write!(f, "page plan"),
            Self::Styling => write!(f, "styling"),
            Self::ApiPlan => write!(f, "api plan"),
            Self::Schema => write!(f, "schema"),
            Self::Component(name) => write!(f, "component {name}"),
            Self::Api(name) => write!(f, "api {name}"),
            Self::Sql => write!(f, "sql"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    /// Non-terminal progress (`generating`, `retrying (n)`).
    StatusChanged {
        target: ArtifactRef,
        status: ArtifactStatus,
    },

    // ── Generation results ──
    PagePlanResolved(Option<PagePlan>),
    StylingResolved(Option<StylingPlan>),
    ApiPlanResolved(Option<ApiPlan>),
    SchemaResolved(Option<Schema>),
    /// Registers pending entries for fan-out; existing entries are kept.
    ComponentsDeclared(Vec<String>),
    ApisDeclared(Vec<ApiSpec>),
    ComponentGenerated {
        name: String,
        source: String,
    },
    ComponentFailed {
        name: String,
        reason: String,
        attempts: u32,
    },
    ApiGenerated {
        name: String,
        code: String,
    },
    ApiFailed {
        name: String,
    },
    SqlGenerated(String),
    SqlFailed,
    /// A regeneration ran out of attempts. The confirmed value stays and
    /// only the status changes.
    RegenerationFailed(ArtifactRef),

    // ── User edits ──
    StylingEdited(StylingPlan),
    /// Replaces the plan and syncs the generated API set to it.
    ApiPlanEdited(ApiPlan),
    SchemaEdited(Schema),
    ComponentRemoved(String),
    ApiRemoved(String),
}

impl ProjectState {
    /// Apply one event. Returns `false` when the event was dropped because
    /// its target artifact does not exist.
    pub fn apply(&mut self, event: StateEvent) -> bool {
        match event {
            StateEvent::StatusChanged { target, status } => self.set_status(&target, status),

            StateEvent::PagePlanResolved(plan) => {
                self.page_plan = resolved(plan);
                true
            }
            StateEvent::StylingResolved(plan) => {
                self.styling = resolved(plan);
                true
            }
            StateEvent::ApiPlanResolved(plan) => {
                self.api_plan = resolved(plan);
                true
            }
            StateEvent::SchemaResolved(schema) => {
                self.schema = resolved(schema);
                true
            }

            StateEvent::ComponentsDeclared(names) => {
                for name in names {
                    self.components
                        .entry(name.clone())
                        .or_insert_with(|| UiComponent::pending(name));
                }
                true
            }
            StateEvent::ApisDeclared(specs) => {
                self.sync_apis(specs);
                true
            }

            StateEvent::ComponentGenerated { name, source } => {
                let Some(component) = self.components.get_mut(&name) else {
                    return false;
                };
                component.source = source;
                component.status = ArtifactStatus::Success;
                component.failure = None;
                true
            }
            StateEvent::ComponentFailed {
                name,
                reason,
                attempts,
            } => {
                let Some(component) = self.components.get_mut(&name) else {
                    return false;
                };
                component.source = failure_placeholder_source(&name, attempts);
                component.status = ArtifactStatus::Failed;
                component.failure = Some(reason);
                true
            }
            StateEvent::ApiGenerated { name, code } => {
                let Some(api) = self.apis.get_mut(&name) else {
                    return false;
                };
                api.code = code;
                api.status = ArtifactStatus::Success;
                true
            }
            StateEvent::ApiFailed { name } => {
                let Some(api) = self.apis.get_mut(&name) else {
                    return false;
                };
                api.code.clear();
                api.status = ArtifactStatus::Failed;
                true
            }
            StateEvent::SqlGenerated(text) => {
                self.sql.text = text;
                self.sql.status = ArtifactStatus::Success;
                true
            }
            StateEvent::SqlFailed => {
                self.sql.text.clear();
                self.sql.status = ArtifactStatus::Failed;
                true
            }

            StateEvent::RegenerationFailed(target) => {
                self.set_status(&target, ArtifactStatus::Failed)
            }

            StateEvent::StylingEdited(plan) => {
                self.styling = Tracked::succeeded(plan);
                true
            }
            StateEvent::ApiPlanEdited(plan) => {
                self.sync_apis(plan.apis.clone());
                self.api_plan = Tracked::succeeded(plan);
                true
            }
            StateEvent::SchemaEdited(schema) => {
                self.schema = Tracked::succeeded(schema);
                true
            }
            StateEvent::ComponentRemoved(name) => self.components.shift_remove(&name).is_some(),
            StateEvent::ApiRemoved(name) => {
                if self.apis.shift_remove(&name).is_none() {
                    return false;
                }
                self.api_plan.value.apis.retain(|a| a.name != name);
                true
            }
        }
    }

    fn set_status(&mut self, target: &ArtifactRef, status: ArtifactStatus) -> bool {
        match target {
            ArtifactRef::PagePlan => self.page_plan.status = status,
            ArtifactRef::Styling => self.styling.status = status,
            ArtifactRef::ApiPlan => self.api_plan.status = status,
            ArtifactRef::Schema => self.schema.status = status,
            ArtifactRef::Sql => self.sql.status = status,
            ArtifactRef::Component(name) => match self.components.get_mut(name) {
                Some(c) => c.status = status,
                None => return false,
            },
            ArtifactRef::Api(name) => match self.apis.get_mut(name) {
                Some(a) => a.status = status,
                None => return false,
            },
        }
        true
    }

    /// Keep generated code for APIs that are still declared, add pending
    /// entries for new ones and drop the rest. Declaration order wins.
    fn sync_apis(&mut self, specs: Vec<ApiSpec>) {
        let mut previous = std::mem::take(&mut self.apis);
        for spec in specs {
            let entry = match previous.shift_remove(&spec.name) {
                Some(mut existing) => {
                    existing.spec = spec;
                    existing
                }
                None => ServerlessApi {
                    spec,
                    code: String::new(),
                    status: ArtifactStatus::Pending,
                },
            };
            self.apis.insert(entry.spec.name.clone(), entry);
        }
    }
}

fn resolved<T: Default>(value: Option<T>) -> Tracked<T> {
    match value {
        Some(v) => Tracked::succeeded(v),
        None => Tracked::failed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProjectBrief;

    fn api(name: &str) -> ApiSpec {
        ApiSpec {
            name: name.into(),
            endpoint: format!("/api/{name}"),
            method: "GET".into(),
            ..ApiSpec::default()
        }
    }

    fn state_with_components(names: &[&str]) -> ProjectState {
        let mut state = ProjectState::new(ProjectBrief::default());
        state.apply(StateEvent::ComponentsDeclared(
            names.iter().map(|n| n.to_string()).collect(),
        ));
        state
    }

    #[test]
    fn failed_regeneration_keeps_confirmed_schema() {
        let mut state = ProjectState::default();
        let schema = Schema {
            tables: vec![crate::model::Table {
                table_name: "loaves".into(),
                columns: Vec::new(),
                relationships: Vec::new(),
            }],
        };
        state.apply(StateEvent::SchemaResolved(Some(schema.clone())));

        assert!(state.apply(StateEvent::RegenerationFailed(ArtifactRef::Schema)));
        assert_eq!(state.schema.status, ArtifactStatus::Failed);
        assert_eq!(state.schema.value, schema);
        assert_eq!(state.schema.available(), Some(&schema));
    }

    #[test]
    fn regeneration_failure_for_removed_api_is_dropped() {
        let mut state = ProjectState::default();
        assert!(!state.apply(StateEvent::RegenerationFailed(ArtifactRef::Api("gone".into()))));
    }

    #[test]
    fn result_for_removed_component_is_dropped() {
        let mut state = state_with_components(&["Hero", "Footer"]);
        assert!(state.apply(StateEvent::ComponentRemoved("Hero".into())));

        let applied = state.apply(StateEvent::ComponentGenerated {
            name: "Hero".into(),
            source: "() => <div/>".into(),
        });
        assert!(!applied);
        assert!(!state.components.contains_key("Hero"));
    }

    #[test]
    fn failed_component_gets_placeholder_source() {
        let mut state = state_with_components(&["Hero"]);
        state.apply(StateEvent::ComponentFailed {
            name: "Hero".into(),
            reason: "'Widget' is not defined".into(),
            attempts: 3,
        });
        let hero = &state.components["Hero"];
        assert_eq!(hero.status, ArtifactStatus::Failed);
        assert_eq!(
            hero.source,
            "() => <div>Error generating Hero after 3 attempts</div>"
        );
    }

    #[test]
    fn schema_edit_does_not_touch_components() {
        let mut state = state_with_components(&["Hero"]);
        state.apply(StateEvent::ComponentGenerated {
            name: "Hero".into(),
            source: "() => <h1/>".into(),
        });
        state.apply(StateEvent::SchemaEdited(Schema::default()));
        assert_eq!(state.components["Hero"].source, "() => <h1/>");
        assert_eq!(state.schema.status, ArtifactStatus::Success);
    }

    #[test]
    fn api_plan_edit_keeps_existing_code() {
        let mut state = ProjectState::new(ProjectBrief::default());
        state.apply(StateEvent::ApisDeclared(vec![api("list"), api("create")]));
        state.apply(StateEvent::ApiGenerated {
            name: "list".into(),
            code: "export default () => {}".into(),
        });

        state.apply(StateEvent::ApiPlanEdited(ApiPlan {
            apis: vec![api("search"), api("list")],
        }));

        let names: Vec<_> = state.apis.keys().cloned().collect();
        assert_eq!(names, vec!["search", "list"]);
        assert_eq!(state.apis["list"].code, "export default () => {}");
        assert_eq!(state.apis["search"].status, ArtifactStatus::Pending);
    }

    #[test]
    fn removing_api_updates_plan() {
        let mut state = ProjectState::new(ProjectBrief::default());
        state.apply(StateEvent::ApiPlanEdited(ApiPlan {
            apis: vec![api("a"), api("b")],
        }));
        assert!(state.apply(StateEvent::ApiRemoved("a".into())));
        assert_eq!(state.api_plan.value.apis.len(), 1);
        assert!(!state.apply(StateEvent::ApiRemoved("a".into())));
    }

    #[test]
    fn status_for_unknown_component_is_dropped() {
        let mut state = ProjectState::default();
        assert!(!state.apply(StateEvent::StatusChanged {
            target: ArtifactRef::Component("Ghost".into()),
            status: ArtifactStatus::Generating,
        }));
        assert!(state.apply(StateEvent::StatusChanged {
            target: ArtifactRef::Sql,
            status: ArtifactStatus::Retrying(1),
        }));
        assert_eq!(state.sql.status, ArtifactStatus::Retrying(1));
    }
}
