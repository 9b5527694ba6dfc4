//! Generation orchestrator: staged pipeline with a concurrent fan-out.
//!
//! ```text
//! Phase 1: Sequential planning (each prompt embeds what came before)
//!   PagePlan → Styling → ApiSurface → Schema
//!
//! Phase 2: Fan-out (settle-all)
//!   JoinSet::spawn(component_i) × unique component names
//!   JoinSet::spawn(api_j)       × declared APIs
//!   JoinSet::spawn(sql)
//!
//! Phase 3: Ready
//! ```
//!
//! ## Failure policy
//!
//! - No usable page plan after every retry aborts the run.
//! - Styling, API surface and schema exhaustion mark the artifact failed with
//!   an empty value; later stages continue without it.
//! - Fan-out items fail individually. A failed component keeps a placeholder
//!   source, a failed API keeps no code, and the run still reaches `Ready`.
//!
//! All state changes are [`StateEvent`]s applied under the write lock, so a
//! user edit to one artifact never loses a concurrent result for another.
//! A result whose artifact was removed in the meantime is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use scaffold::model::listing;
use scaffold::repair::{repair, repair_value_into, strip_code_fences};
use scaffold::{
    ApiPlan, ArtifactRef, ArtifactStatus, CompilationUnit, Layout, PagePlan, ProjectAssembler,
    ProjectBrief, ProjectState, Schema, StateEvent, StylingPlan, VirtualFileNode,
};

use crate::client::{first_output, GenerationClient};
use crate::config::AppgenConfig;
use crate::error::{ClientError, PipelineError};
use crate::prompts;
use crate::retry::RetryController;
use crate::stages::{PipelineStage, StageMachine, TransitionRecord};
use crate::status::{SharedStatusBus, StatusBus, StatusSink};

pub struct GenerationOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<dyn GenerationClient>,
    config: AppgenConfig,
    retry: RetryController,
    bus: SharedStatusBus,
    state: RwLock<ProjectState>,
    stages: Mutex<StageMachine>,
}

/// Whether an upstream stage runs as part of a full run or on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Initial,
    Regeneration,
}

/// Applies in-flight statuses to the project state and forwards every
/// status to the bus. Terminal statuses reach the state together with the
/// result event instead.
struct ArtifactSink<'a> {
    inner: &'a Inner,
    target: ArtifactRef,
}

#[async_trait]
impl StatusSink for ArtifactSink<'_> {
    async fn publish(&self, label: &str, status: ArtifactStatus) {
        if !status.is_terminal() {
            self.inner
                .state
                .write()
                .await
                .apply(StateEvent::StatusChanged {
                    target: self.target.clone(),
                    status,
                });
        }
        self.inner.bus.publish(label, status).await;
    }
}

impl GenerationOrchestrator {
    pub fn new(client: Arc<dyn GenerationClient>, config: AppgenConfig) -> Self {
        Self::with_status_bus(client, config, StatusBus::new().shared())
    }

    pub fn with_status_bus(
        client: Arc<dyn GenerationClient>,
        config: AppgenConfig,
        bus: SharedStatusBus,
    ) -> Self {
        let retry = RetryController::new(config.max_attempts);
        Self {
            inner: Arc::new(Inner {
                client,
                config,
                retry,
                bus,
                state: RwLock::new(ProjectState::default()),
                stages: Mutex::new(StageMachine::new()),
            }),
        }
    }

    pub fn status_bus(&self) -> SharedStatusBus {
        Arc::clone(&self.inner.bus)
    }

    pub async fn snapshot(&self) -> ProjectState {
        self.inner.state.read().await.clone()
    }

    pub async fn stage(&self) -> PipelineStage {
        self.inner.stages.lock().await.current()
    }

    pub async fn transitions(&self) -> Vec<TransitionRecord> {
        self.inner.stages.lock().await.transitions().to_vec()
    }

    /// Run the whole pipeline for `brief`, replacing any previous project.
    pub async fn run(&self, brief: ProjectBrief) -> Result<ProjectState, PipelineError> {
        let inner = &self.inner;
        *inner.stages.lock().await = StageMachine::new();
        *inner.state.write().await = ProjectState::new(brief);
        info!(max_attempts = inner.retry.max_attempts(), "generation run started");

        let Some(plan) = inner.generate_page_plan(None, Pass::Initial).await else {
            inner.stages.lock().await.abort("page plan produced no pages")?;
            return Err(PipelineError::NoPages);
        };
        let reason = format!("{} pages", plan.pages.len());
        inner.advance(PipelineStage::Styling, &reason).await?;

        let styling = inner.generate_styling(None, Pass::Initial).await;
        inner.advance(PipelineStage::ApiSurface, &format!("styling {styling}")).await?;

        let apis = inner.generate_api_plan(None, Pass::Initial).await;
        inner.advance(PipelineStage::Schema, &format!("api plan {apis}")).await?;

        let schema = inner.generate_schema(None, Pass::Initial).await;
        inner.advance(PipelineStage::FanOut, &format!("schema {schema}")).await?;

        self.fan_out().await;
        inner.advance(PipelineStage::Ready, "all artifacts settled").await?;

        let summary = inner.stages.lock().await.summary();
        info!(%summary, "generation run finished");
        Ok(self.snapshot().await)
    }

    /// Generate every declared component, API and the SQL script
    /// concurrently and wait for all of them.
    async fn fan_out(&self) {
        let (components, apis) = {
            let mut state = self.inner.state.write().await;
            let components = state.page_plan.value.unique_components();
            let apis = state.api_plan.value.apis.clone();
            state.apply(StateEvent::ComponentsDeclared(components.clone()));
            state.apply(StateEvent::ApisDeclared(apis.clone()));
            (components, apis)
        };
        info!(components = components.len(), apis = apis.len(), "fan-out started");

        let mut join_set: JoinSet<()> = JoinSet::new();
        for name in components {
            let inner = Arc::clone(&self.inner);
            join_set.spawn(async move {
                inner.generate_component(&name, None).await;
            });
        }
        for api in apis {
            let inner = Arc::clone(&self.inner);
            join_set.spawn(async move {
                inner.generate_api(&api.name, None).await;
            });
        }
        let inner = Arc::clone(&self.inner);
        join_set.spawn(async move {
            inner.generate_sql().await;
        });

        while let Some(res) = join_set.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "fan-out task panicked");
            }
        }
    }

    /// Generate `names` concurrently, returning their statuses in the
    /// order given.
    async fn generate_components(
        &self,
        names: Vec<String>,
        modification: Option<&str>,
    ) -> Vec<(String, ArtifactStatus)> {
        let mut join_set = JoinSet::new();
        for name in names.iter().cloned() {
            let inner = Arc::clone(&self.inner);
            let modification = modification.map(str::to_string);
            join_set.spawn(async move {
                let status = inner.generate_component(&name, modification.as_deref()).await;
                (name, status)
            });
        }

        let mut statuses = Vec::with_capacity(names.len());
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok(settled) => statuses.push(settled),
                Err(e) => warn!(error = %e, "component task panicked"),
            }
        }
        statuses.sort_by_key(|(name, _)| names.iter().position(|n| n == name));
        statuses
    }

    // ── Regeneration ──────────────────────────────────────────────────

    pub async fn regenerate_component(
        &self,
        name: &str,
        modification: Option<&str>,
    ) -> Result<ArtifactStatus, PipelineError> {
        self.inner
            .require(&ArtifactRef::Component(name.to_string()))
            .await?;
        Ok(self.inner.generate_component(name, modification).await)
    }

    /// Regenerate every declared component with the same instruction.
    /// A blank instruction changes nothing.
    pub async fn regenerate_all_components(
        &self,
        modification: &str,
    ) -> Vec<(String, ArtifactStatus)> {
        if modification.trim().is_empty() {
            debug!("ignoring blank instruction for component regeneration");
            return Vec::new();
        }
        let names: Vec<String> = self.inner.state.read().await.components.keys().cloned().collect();
        info!(components = names.len(), "regenerating all components");
        self.generate_components(names, Some(modification)).await
    }

    pub async fn regenerate_api(
        &self,
        name: &str,
        modification: Option<&str>,
    ) -> Result<ArtifactStatus, PipelineError> {
        self.inner.require(&ArtifactRef::Api(name.to_string())).await?;
        Ok(self.inner.generate_api(name, modification).await)
    }

    pub async fn regenerate_sql(&self) -> ArtifactStatus {
        self.inner.generate_sql().await
    }

    /// Replace the page plan. Components still referenced keep their code,
    /// components no longer referenced are removed, and new ones are
    /// generated. A failed regeneration keeps the current plan.
    pub async fn regenerate_page_plan(&self, modification: Option<&str>) -> ArtifactStatus {
        let Some(plan) = self
            .inner
            .generate_page_plan(modification, Pass::Regeneration)
            .await
        else {
            return ArtifactStatus::Failed;
        };

        let added = {
            let mut state = self.inner.state.write().await;
            let names = plan.unique_components();
            let dropped: Vec<String> = state
                .components
                .keys()
                .filter(|name| !names.contains(name))
                .cloned()
                .collect();
            for name in dropped {
                state.apply(StateEvent::ComponentRemoved(name));
            }
            let added: Vec<String> = names
                .iter()
                .filter(|name| !state.components.contains_key(*name))
                .cloned()
                .collect();
            state.apply(StateEvent::ComponentsDeclared(names));
            added
        };
        info!(pages = plan.pages.len(), added = added.len(), "page plan regenerated");
        self.generate_components(added, None).await;
        ArtifactStatus::Success
    }

    pub async fn regenerate_styling(&self, modification: Option<&str>) -> ArtifactStatus {
        self.inner.generate_styling(modification, Pass::Regeneration).await
    }

    /// Replace the API plan. APIs that are still declared keep their code;
    /// new ones stay pending until regenerated. A failed regeneration keeps
    /// the current plan and API set.
    pub async fn regenerate_api_plan(&self, modification: Option<&str>) -> ArtifactStatus {
        let status = self
            .inner
            .generate_api_plan(modification, Pass::Regeneration)
            .await;
        if status.is_success() {
            let mut state = self.inner.state.write().await;
            let apis = state.api_plan.value.apis.clone();
            state.apply(StateEvent::ApisDeclared(apis));
        }
        status
    }

    pub async fn regenerate_schema(&self, modification: Option<&str>) -> ArtifactStatus {
        self.inner.generate_schema(modification, Pass::Regeneration).await
    }

    // ── User edits ────────────────────────────────────────────────────

    pub async fn edit_styling(&self, plan: StylingPlan) {
        self.inner.apply(StateEvent::StylingEdited(plan)).await;
    }

    pub async fn edit_api_plan(&self, plan: ApiPlan) {
        self.inner.apply(StateEvent::ApiPlanEdited(plan)).await;
    }

    pub async fn edit_schema(&self, schema: Schema) {
        self.inner.apply(StateEvent::SchemaEdited(schema)).await;
    }

    pub async fn remove_component(&self, name: &str) -> Result<(), PipelineError> {
        if self.inner.apply(StateEvent::ComponentRemoved(name.to_string())).await {
            Ok(())
        } else {
            Err(PipelineError::UnknownArtifact(format!("component {name}")))
        }
    }

    pub async fn remove_api(&self, name: &str) -> Result<(), PipelineError> {
        if self.inner.apply(StateEvent::ApiRemoved(name.to_string())).await {
            Ok(())
        } else {
            Err(PipelineError::UnknownArtifact(format!("api {name}")))
        }
    }

    /// Assemble the current state with the configured assembler.
    pub async fn assemble(&self, layout: &Layout) -> Result<VirtualFileNode, PipelineError> {
        let state = self.snapshot().await;
        let assembler = ProjectAssembler::new(self.inner.config.assembler.clone());
        Ok(assembler.assemble(&state, layout)?)
    }
}

impl Inner {
    async fn advance(&self, to: PipelineStage, reason: &str) -> Result<(), PipelineError> {
        Ok(self.stages.lock().await.advance(to, Some(reason))?)
    }

    /// Apply one event; `false` means the target no longer exists.
    async fn apply(&self, event: StateEvent) -> bool {
        let applied = self.state.write().await.apply(event);
        if !applied {
            debug!("dropping event for an artifact that no longer exists");
        }
        applied
    }

    /// Record an upstream stage result. A failed regeneration keeps the
    /// confirmed value; a failed first pass leaves an empty one.
    async fn settle<T>(
        &self,
        pass: Pass,
        target: ArtifactRef,
        result: Option<T>,
        resolved: impl FnOnce(Option<T>) -> StateEvent,
    ) -> ArtifactStatus {
        let status = resolved_status(&result);
        let event = match (pass, result) {
            (Pass::Regeneration, None) => StateEvent::RegenerationFailed(target),
            (_, result) => resolved(result),
        };
        self.apply(event).await;
        status
    }

    async fn require(&self, target: &ArtifactRef) -> Result<(), PipelineError> {
        let state = self.state.read().await;
        let exists = match target {
            ArtifactRef::Component(name) => state.components.contains_key(name),
            ArtifactRef::Api(name) => state.apis.contains_key(name),
            _ => true,
        };
        if exists {
            Ok(())
        } else {
            Err(PipelineError::UnknownArtifact(target.to_string()))
        }
    }

    fn sink(&self, target: ArtifactRef) -> ArtifactSink<'_> {
        ArtifactSink {
            inner: self,
            target,
        }
    }

    async fn request(&self, template_id: &str, prompt: &str) -> Result<String, ClientError> {
        self.client
            .generate(template_id, prompt)
            .await
            .map(first_output)
    }

    /// Retry `prompt` until `validate` accepts an answer.
    async fn generate_validated<T>(
        &self,
        target: ArtifactRef,
        template_id: &str,
        prompt: &str,
        validate: impl FnMut(&str) -> Result<T, String>,
    ) -> Result<T, crate::error::GenerationExhausted> {
        let label = target.to_string();
        let sink = self.sink(target);
        self.retry
            .attempt_with(&label, &sink, move || self.request(template_id, prompt), validate)
            .await
    }

    async fn repair_context(&self) -> HashMap<String, String> {
        prompts::repair_context(&self.state.read().await.brief)
    }

    // ── Planning stages ───────────────────────────────────────────────

    async fn generate_page_plan(&self, modification: Option<&str>, pass: Pass) -> Option<PagePlan> {
        let (prompt, template) = {
            let state = self.state.read().await;
            (
                prompts::with_modification(prompts::page_plan(&state.brief), modification),
                self.config.templates.page_plan(state.brief.multi_page).to_string(),
            )
        };
        let context = self.repair_context().await;
        let result = self
            .generate_validated(ArtifactRef::PagePlan, &template, &prompt, |text| {
                let plan: PagePlan = decode(text, Some("pages"), &context)?;
                if plan.pages.is_empty() {
                    return Err("page plan has no pages".to_string());
                }
                Ok(plan)
            })
            .await
            .ok();
        self.settle(pass, ArtifactRef::PagePlan, result.clone(), StateEvent::PagePlanResolved)
            .await;
        result
    }

    async fn generate_styling(&self, modification: Option<&str>, pass: Pass) -> ArtifactStatus {
        let prompt = prompts::with_modification(
            prompts::styling(&self.state.read().await.brief),
            modification,
        );
        let context = self.repair_context().await;
        let template = &self.config.templates.styling_plan;
        let result = self
            .generate_validated(ArtifactRef::Styling, template, &prompt, |text| {
                let plan: StylingPlan = decode(text, None, &context).or_else(|_| {
                    // Some answers are the bare role map.
                    let colors = decode(text, None, &context)?;
                    Ok::<_, String>(StylingPlan { colors })
                })?;
                let invalid = plan.invalid_roles();
                if !invalid.is_empty() {
                    return Err(format!("not hex colours: {}", invalid.join(", ")));
                }
                Ok(plan)
            })
            .await
            .ok();
        self.settle(pass, ArtifactRef::Styling, result, StateEvent::StylingResolved)
            .await
    }

    async fn generate_api_plan(&self, modification: Option<&str>, pass: Pass) -> ArtifactStatus {
        let prompt = {
            let state = self.state.read().await;
            prompts::api_plan(&state.brief, &state.page_plan.value)
        };
        let prompt = prompts::with_modification(prompt, modification);
        let context = self.repair_context().await;
        let template = &self.config.templates.api_plan;
        let result = self
            .generate_validated(ArtifactRef::ApiPlan, template, &prompt, |text| {
                decode::<ApiPlan>(text, Some("apis"), &context)
            })
            .await
            .ok();
        self.settle(pass, ArtifactRef::ApiPlan, result, StateEvent::ApiPlanResolved)
            .await
    }

    async fn generate_schema(&self, modification: Option<&str>, pass: Pass) -> ArtifactStatus {
        let prompt = {
            let state = self.state.read().await;
            prompts::schema(&state.brief, &state.page_plan.value, &state.api_plan.value)
        };
        let prompt = prompts::with_modification(prompt, modification);
        let context = self.repair_context().await;
        let template = &self.config.templates.schema;
        let result = self
            .generate_validated(ArtifactRef::Schema, template, &prompt, |text| {
                decode::<Schema>(text, Some("tables"), &context)
            })
            .await
            .ok();
        self.settle(pass, ArtifactRef::Schema, result, StateEvent::SchemaResolved)
            .await
    }

    // ── Fan-out items ─────────────────────────────────────────────────

    async fn generate_component(&self, name: &str, modification: Option<&str>) -> ArtifactStatus {
        let prompt = {
            let state = self.state.read().await;
            prompts::component(
                name,
                state.page_plan.value.page_using(name),
                state.styling.available(),
            )
        };
        let prompt = prompts::with_modification(prompt, modification);
        let sandbox = &self.config.sandbox;

        let result = self
            .generate_validated(
                ArtifactRef::Component(name.to_string()),
                &self.config.templates.component,
                &prompt,
                |text| {
                    let source = strip_code_fences(text);
                    CompilationUnit::self_check(source, name, sandbox)
                        .map(|()| source.to_string())
                        .map_err(|e| e.to_string())
                },
            )
            .await;

        let (event, status) = match result {
            Ok(source) => (
                StateEvent::ComponentGenerated {
                    name: name.to_string(),
                    source,
                },
                ArtifactStatus::Success,
            ),
            Err(exhausted) => (
                StateEvent::ComponentFailed {
                    name: name.to_string(),
                    reason: exhausted.last_failure.unwrap_or_default(),
                    attempts: exhausted.attempts,
                },
                ArtifactStatus::Failed,
            ),
        };
        self.apply(event).await;
        status
    }

    async fn generate_api(&self, name: &str, modification: Option<&str>) -> ArtifactStatus {
        let prompt = {
            let state = self.state.read().await;
            let Some(api) = state.apis.get(name) else {
                return ArtifactStatus::Failed;
            };
            prompts::serverless_api(&api.spec, state.schema.available())
        };
        let prompt = prompts::with_modification(prompt, modification);

        let result = self
            .generate_validated(
                ArtifactRef::Api(name.to_string()),
                &self.config.templates.serverless_api,
                &prompt,
                |text| Ok(strip_code_fences(text).to_string()),
            )
            .await;

        let (event, status) = match result {
            Ok(code) => (
                StateEvent::ApiGenerated {
                    name: name.to_string(),
                    code,
                },
                ArtifactStatus::Success,
            ),
            Err(_) => (
                StateEvent::ApiFailed {
                    name: name.to_string(),
                },
                ArtifactStatus::Failed,
            ),
        };
        self.apply(event).await;
        status
    }

    async fn generate_sql(&self) -> ArtifactStatus {
        let schema = self.state.read().await.schema.available().cloned();
        let Some(schema) = schema else {
            warn!("skipping sql generation: schema unavailable");
            self.bus.publish("sql", ArtifactStatus::Failed).await;
            self.apply(StateEvent::SqlFailed).await;
            return ArtifactStatus::Failed;
        };

        let prompt = prompts::sql(&schema);
        let result = self
            .generate_validated(ArtifactRef::Sql, &self.config.templates.sql, &prompt, |text| {
                Ok(strip_code_fences(text).to_string())
            })
            .await;

        match result {
            Ok(text) => {
                self.apply(StateEvent::SqlGenerated(text)).await;
                ArtifactStatus::Success
            }
            Err(_) => {
                self.apply(StateEvent::SqlFailed).await;
                ArtifactStatus::Failed
            }
        }
    }
}

/// Repair model text and decode it, accepting a bare array where an object
/// wrapping it under `key` is expected.
fn decode<T: DeserializeOwned>(
    text: &str,
    key: Option<&str>,
    context: &HashMap<String, String>,
) -> Result<T, String> {
    let value = repair(text, context).map_err(|e| e.to_string())?;
    let value = match key {
        Some(key) => listing(value, key),
        None => value,
    };
    repair_value_into(value, text).map_err(|e| e.to_string())
}

fn resolved_status<T>(result: &Option<T>) -> ArtifactStatus {
    if result.is_some() {
        ArtifactStatus::Success
    } else {
        ArtifactStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn decode_wraps_bare_listings() {
        let plan: PagePlan = decode(
            "[{name: 'Home', purpose: 'Welcome', components: ['Hero',]}]",
            Some("pages"),
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(plan.pages[0].components, vec!["Hero"]);
    }

    #[test]
    fn decode_reports_shape_mismatch() {
        let err =
            decode::<Schema>("{tables: 'none'}", Some("tables"), &HashMap::new()).unwrap_err();
        assert!(err.starts_with("malformed artifact"));
    }

    #[test]
    fn bare_colour_maps_decode_as_role_maps() {
        let colors: IndexMap<String, String> =
            decode("{primary: '#112233', accent: '#abc'}", None, &HashMap::new()).unwrap();
        assert_eq!(StylingPlan { colors }.invalid_roles(), Vec::<&str>::new());
    }
}
