//! Live preview of generated components.
//!
//! Every successful component is compiled once into a [`RenderableUnit`].
//! Pages are rendered placement by placement, each inside its own isolation
//! boundary, so one broken unit only ever replaces its own box with the
//! failure placeholder.

use indexmap::IndexMap;
use serde_json::json;
use tracing::debug;

use crate::layout::{CanvasSize, ComponentInstance};
use crate::model::{ArtifactStatus, ProjectState};
use crate::sandbox::{
    escape_attr, placeholder, CompilationUnit, RenderableUnit, Rendered, SandboxConfig,
};

#[derive(Debug, Clone)]
pub struct Preview {
    config: SandboxConfig,
    units: IndexMap<String, RenderableUnit>,
    /// Components that exist in the project but have no usable source.
    unavailable: IndexMap<String, String>,
}

impl Preview {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            units: IndexMap::new(),
            unavailable: IndexMap::new(),
        }
    }

    /// Compile every successful component of `state`.
    pub fn build(state: &ProjectState, config: &SandboxConfig) -> Self {
        let mut preview = Self::new(config.clone());
        for component in state.components.values() {
            match component.status {
                ArtifactStatus::Success => preview.replace(&component.name, &component.source),
                status => {
                    let reason = component
                        .failure
                        .clone()
                        .unwrap_or_else(|| format!("component is {status}"));
                    preview.unavailable.insert(component.name.clone(), reason);
                }
            }
        }
        preview
    }

    /// Compile `source` and swap it in for `name`. Placements referring to
    /// the component are unaffected.
    pub fn replace(&mut self, name: &str, source: &str) {
        let unit = CompilationUnit::compile(source, name, &self.config);
        debug!(component = name, compiled = unit.is_ok(), "preview unit replaced");
        self.unavailable.shift_remove(name);
        self.units.insert(name.to_string(), unit);
    }

    pub fn remove(&mut self, name: &str) {
        self.units.shift_remove(name);
        self.unavailable.shift_remove(name);
    }

    pub fn unit(&self, name: &str) -> Option<&RenderableUnit> {
        self.units.get(name)
    }

    pub fn render_component(&self, name: &str, props: &serde_json::Value) -> Rendered {
        match self.units.get(name) {
            Some(unit) => unit.render(props),
            None => {
                let reason = self
                    .unavailable
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| "component not generated".to_string());
                Rendered {
                    markup: placeholder(name, &reason),
                    failure: Some(reason),
                }
            }
        }
    }

    /// One placement wrapped in an absolutely positioned box. An instance
    /// with its own variant source renders that source instead.
    pub fn render_instance(&self, instance: &ComponentInstance) -> String {
        let rendered = match &instance.variant_source {
            Some(source) => CompilationUnit::compile(source, &instance.component, &self.config)
                .render(&json!({})),
            None => self.render_component(&instance.component, &json!({})),
        };
        format!(
            "<div class=\"placement\" data-instance=\"{}\" style=\"position: absolute; left: {}px; top: {}px; width: {}px; height: {}px\">{}</div>",
            escape_attr(&instance.instance_id),
            instance.position.x,
            instance.position.y,
            instance.dimensions.width,
            instance.dimensions.height,
            rendered.markup
        )
    }

    pub fn render_page(&self, instances: &[ComponentInstance], canvas: CanvasSize) -> String {
        let body: String = instances.iter().map(|i| self.render_instance(i)).collect();
        format!(
            "<div class=\"page-canvas\" style=\"position: relative; width: {}px; height: {}px\">{body}</div>",
            canvas.width, canvas.height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Dimensions, Position};
    use crate::model::UiComponent;

    fn component(name: &str, source: &str, status: ArtifactStatus) -> UiComponent {
        UiComponent {
            name: name.into(),
            source: source.into(),
            status,
            failure: None,
        }
    }

    fn placed(id: &str, component: &str, x: f64) -> ComponentInstance {
        ComponentInstance {
            instance_id: id.into(),
            component: component.into(),
            position: Position { x, y: 0.0 },
            dimensions: Dimensions {
                width: 100.0,
                height: 50.0,
            },
            variant_source: None,
        }
    }

    fn state() -> ProjectState {
        let mut state = ProjectState::default();
        for c in [
            component(
                "Header",
                "const Header = () => <header>Bakery</header>;",
                ArtifactStatus::Success,
            ),
            component(
                "Broken",
                "export default () => { throw new Error('nope'); }",
                ArtifactStatus::Success,
            ),
            component("Hero", "", ArtifactStatus::Failed),
        ] {
            state.components.insert(c.name.clone(), c);
        }
        state
    }

    #[test]
    fn failing_unit_does_not_affect_siblings() {
        let preview = Preview::build(&state(), &SandboxConfig::default());
        let page = preview.render_page(
            &[placed("a", "Header", 0.0), placed("b", "Broken", 100.0), placed("c", "Hero", 200.0)],
            CanvasSize::default(),
        );
        assert!(page.contains("<header>Bakery</header>"));
        assert!(page.contains("Error loading Broken: uncaught Error: nope"));
        assert!(page.contains("Error loading Hero: component is failed"));
        assert!(page.contains("left: 100px"));
    }

    #[test]
    fn replace_swaps_unit_in_place() {
        let mut preview = Preview::build(&state(), &SandboxConfig::default());
        preview.replace("Hero", "const Hero = () => <h1>Fresh bread</h1>;");
        assert_eq!(
            preview.render_component("Hero", &json!({})).markup,
            "<h1>Fresh bread</h1>"
        );
        let names: Vec<&str> = preview.units.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["Header", "Broken", "Hero"]);
    }

    #[test]
    fn variant_source_overrides_shared_unit() {
        let preview = Preview::build(&state(), &SandboxConfig::default());
        let mut instance = placed("v", "Header", 0.0);
        instance.variant_source = Some("const Header = () => <header>Variant</header>;".into());
        assert!(preview.render_instance(&instance).contains("<header>Variant</header>"));
    }

    #[test]
    fn instance_id_is_escaped_in_attribute() {
        let preview = Preview::build(&state(), &SandboxConfig::default());
        let html = preview.render_instance(&placed(r#"a" onclick="x"#, "Header", 0.0));
        assert!(html.contains(r#"data-instance="a&quot; onclick=&quot;x""#));
        assert!(!html.contains(r#"onclick="x""#));
    }
}
