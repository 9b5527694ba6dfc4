//! Project assembly: artifacts and placements in, virtual file tree out.
//!
//! ```text
//! project-root/
//! ├── pages/<Route>            one extension-less module per page
//! ├── layout.config.js         placements per page
//! ├── api/<name>.js            successful serverless APIs
//! ├── components/<Name>.js     successful components (+ Name_2, Name_3 variants)
//! ├── database/schema.sql      when the SQL script succeeded
//! └── package.json, next.config.js, jsconfig.json, globals.css,
//!     postcss.config.js, tailwind.config.js, routes.config.js
//! ```
//!
//! Assembly is a pure function of the [`ProjectState`] and the [`Layout`]:
//! the same inputs always yield the same tree (and [`VirtualFileNode::digest`]).

mod templates;

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::error::AssemblyError;
use crate::layout::{default_stack, CanvasSize, ComponentInstance, Layout};
use crate::model::{ArtifactStatus, Page, ProjectState};
use crate::repair::strip_code_fences;
use crate::sandbox::{escape_attr, module_source};
use crate::tree::{VirtualFileNode, PAGES_FOLDER};

pub const ROOT_FOLDER: &str = "project-root";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Size the editor's pixel positions are measured against.
    pub canvas: CanvasSize,
    /// Extension for generated modules (`js`, `jsx`, `tsx`).
    pub extension: String,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            canvas: CanvasSize::default(),
            extension: "js".to_string(),
        }
    }
}

/// Assemble with the default configuration.
pub fn assemble(state: &ProjectState, layout: &Layout) -> Result<VirtualFileNode, AssemblyError> {
    ProjectAssembler::new(AssemblerConfig::default()).assemble(state, layout)
}

#[derive(Debug, Clone, Default)]
pub struct ProjectAssembler {
    config: AssemblerConfig,
}

/// Module a placement renders, or the reason it cannot render one.
enum Slot<'a> {
    Module(String),
    Failed(&'a str),
}

impl ProjectAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    pub fn assemble(
        &self,
        state: &ProjectState,
        layout: &Layout,
    ) -> Result<VirtualFileNode, AssemblyError> {
        let plan = state
            .page_plan
            .available()
            .ok_or(AssemblyError::MissingArtifact("page plan"))?;
        if plan.pages.is_empty() {
            return Err(AssemblyError::NoPages);
        }

        let placements: Vec<(&Page, Vec<ComponentInstance>)> = plan
            .pages
            .iter()
            .map(|page| (page, self.placements(page, state, layout)))
            .collect();
        let modules = Modules::collect(state, &placements);

        let ext = &self.config.extension;
        let mut root = Vec::new();

        let pages: Vec<VirtualFileNode> = placements
            .iter()
            .zip(route_names(&plan.pages))
            .map(|((page, instances), route)| {
                VirtualFileNode::file(route, self.page_module(page, instances, state, &modules))
            })
            .collect();
        root.extend(VirtualFileNode::folder(PAGES_FOLDER, pages));
        root.push(VirtualFileNode::file(
            format!("layout.config.{ext}"),
            layout_config(&placements),
        ));

        let mut api_names = Names::default();
        let apis: Vec<VirtualFileNode> = state
            .successful_apis()
            .map(|api| {
                VirtualFileNode::file(
                    format!("{}.{ext}", api_names.claim(identifier(&api.spec.name))),
                    ensure_newline(strip_code_fences(&api.code)),
                )
            })
            .collect();
        root.extend(VirtualFileNode::folder("api", apis));

        let mut components = Vec::new();
        for component in state.successful_components() {
            let Some(module) = modules.of(&component.name) else {
                continue;
            };
            components.push(VirtualFileNode::file(
                format!("{module}.{ext}"),
                module_source(&component.source, module),
            ));
            for (variant, source) in modules.variants_of(&component.name) {
                components.push(VirtualFileNode::file(
                    format!("{variant}.{ext}"),
                    module_source(source, variant),
                ));
            }
        }
        root.extend(VirtualFileNode::folder("components", components));

        if state.sql.status.is_success() {
            let sql = ensure_newline(strip_code_fences(&state.sql.text));
            let sql = VirtualFileNode::file("schema.sql", sql);
            root.extend(VirtualFileNode::folder("database", vec![sql]));
        }

        let styling = state.styling.available();
        let tailwind = templates::tailwind_config(styling);
        let routes = templates::routes_config(&plan.pages);
        root.extend([
            VirtualFileNode::file("package.json", templates::package_json(&state.brief.name)),
            VirtualFileNode::file(format!("next.config.{ext}"), templates::NEXT_CONFIG),
            VirtualFileNode::file("jsconfig.json", templates::jsconfig_json()),
            VirtualFileNode::file("globals.css", templates::globals_css(styling)),
            VirtualFileNode::file(format!("postcss.config.{ext}"), templates::POSTCSS_CONFIG),
            VirtualFileNode::file(format!("tailwind.config.{ext}"), tailwind),
            VirtualFileNode::file(format!("routes.config.{ext}"), routes),
        ]);

        VirtualFileNode::folder(ROOT_FOLDER, root).ok_or(AssemblyError::NoPages)
    }

    /// Recorded placements for the page, or a default stack when none were
    /// recorded. Placements of components the project no longer has are
    /// dropped.
    fn placements(
        &self,
        page: &Page,
        state: &ProjectState,
        layout: &Layout,
    ) -> Vec<ComponentInstance> {
        let recorded = layout.instances(&page.name);
        let instances = if recorded.is_empty() {
            default_stack(&page.name, &page.components)
        } else {
            recorded.to_vec()
        };
        instances
            .into_iter()
            .filter(|instance| {
                let known = state.components.contains_key(&instance.component);
                if !known {
                    warn!(
                        page = %page.name,
                        component = %instance.component,
                        "skipping placement of unknown component"
                    );
                }
                known
            })
            .collect()
    }

    fn page_module(
        &self,
        page: &Page,
        instances: &[ComponentInstance],
        state: &ProjectState,
        modules: &Modules,
    ) -> String {
        let slots: Vec<Slot> = instances
            .iter()
            .map(|instance| match state.components.get(&instance.component) {
                Some(c) if c.status == ArtifactStatus::Success => modules
                    .module_for(instance)
                    .map_or(Slot::Failed(&instance.component), Slot::Module),
                _ => Slot::Failed(&instance.component),
            })
            .collect();

        let mut imports: Vec<&str> = Vec::new();
        for slot in &slots {
            if let Slot::Module(module) = slot {
                if !imports.contains(&module.as_str()) {
                    imports.push(module);
                }
            }
        }

        let mut out = String::from("import React from 'react';\n");
        for module in &imports {
            out.push_str(&format!("import {module} from '@components/{module}';\n"));
        }
        out.push_str(&format!(
            "\nexport default function {}Page() {{\n  return (\n    <main style={{{{ position: 'relative', width: '100vw', minHeight: '100vh' }}}}>\n",
            identifier(&page.name)
        ));
        for (instance, slot) in instances.iter().zip(&slots) {
            out.push_str(&format!(
                "      <div key=\"{}\" style={{{{ {} }}}}>\n",
                escape_attr(&instance.instance_id),
                self.placement_style(instance)
            ));
            match slot {
                Slot::Module(module) => out.push_str(&format!("        <{module} />\n")),
                Slot::Failed(name) => out.push_str(&format!(
                    "        <div className=\"component-error\" data-component=\"{}\">Error loading {}: generation failed</div>\n",
                    escape_attr(name),
                    jsx_text(name)
                )),
            }
            out.push_str("      </div>\n");
        }
        out.push_str("    </main>\n  );\n}\n");
        out
    }

    /// Pixel placement to viewport units against the configured canvas.
    fn placement_style(&self, instance: &ComponentInstance) -> String {
        let canvas = self.config.canvas;
        let vw = |px: f64| px / canvas.width * 100.0;
        let vh = |px: f64| px / canvas.height * 100.0;
        format!(
            "position: 'absolute', left: '{:.2}vw', top: '{:.2}vh', width: '{:.2}vw', height: '{:.2}vh'",
            vw(instance.position.x),
            vh(instance.position.y),
            vw(instance.dimensions.width),
            vh(instance.dimensions.height),
        )
    }
}

/// Module names for successful components plus numbered variants for
/// placements whose own source differs from the shared component source.
/// All of them share the `components/` folder, so they share one [`Names`].
#[derive(Default)]
struct Modules<'a> {
    by_component: HashMap<&'a str, String>,
    /// component → [(variant module, fingerprint, source)]
    variants: IndexMap<&'a str, Vec<(String, blake3::Hash, &'a str)>>,
}

impl<'a> Modules<'a> {
    fn collect(
        state: &'a ProjectState,
        placements: &'a [(&'a Page, Vec<ComponentInstance>)],
    ) -> Self {
        let mut names = Names::default();
        let mut modules = Self::default();
        for component in state.successful_components() {
            let module = names.claim(identifier(&component.name));
            modules.by_component.insert(component.name.as_str(), module);
        }

        for instance in placements.iter().flat_map(|(_, instances)| instances) {
            let Some(source) = instance.variant_source.as_deref() else {
                continue;
            };
            let Some(component) = state
                .components
                .get(&instance.component)
                .filter(|c| c.status.is_success())
            else {
                continue;
            };
            let Some(base) = modules.by_component.get(component.name.as_str()) else {
                continue;
            };
            let fingerprint = fingerprint(source);
            if fingerprint == self::fingerprint(&component.source) {
                continue;
            }
            let list = modules.variants.entry(component.name.as_str()).or_default();
            if list.iter().any(|(_, f, _)| *f == fingerprint) {
                continue;
            }
            let module = names.numbered(base);
            list.push((module, fingerprint, source));
        }
        modules
    }

    fn of(&self, component: &str) -> Option<&str> {
        self.by_component.get(component).map(String::as_str)
    }

    fn variants_of(&self, component: &str) -> impl Iterator<Item = (&str, &str)> {
        self.variants
            .get(component)
            .into_iter()
            .flatten()
            .map(|(module, _, source)| (module.as_str(), *source))
    }

    fn module_for(&self, instance: &ComponentInstance) -> Option<String> {
        let variant = instance.variant_source.as_deref().and_then(|source| {
            let fingerprint = fingerprint(source);
            self.variants
                .get(instance.component.as_str())?
                .iter()
                .find(|(_, f, _)| *f == fingerprint)
                .map(|(module, _, _)| module.clone())
        });
        variant.or_else(|| self.of(&instance.component).map(str::to_string))
    }
}

/// Names taken inside one folder. Comparison ignores ASCII case so the
/// tree also writes cleanly to case-insensitive file systems.
#[derive(Default)]
struct Names {
    used: HashSet<String>,
}

impl Names {
    /// `base` when free, otherwise the first free `base_2`, `base_3`, ...
    fn claim(&mut self, base: String) -> String {
        if self.used.insert(base.to_ascii_lowercase()) {
            base
        } else {
            self.numbered(&base)
        }
    }

    /// The first free `base_N` with `N >= 2`.
    fn numbered(&mut self, base: &str) -> String {
        (2..)
            .map(|n| format!("{base}_{n}"))
            .find(|name| self.used.insert(name.to_ascii_lowercase()))
            .unwrap_or_else(|| base.to_string())
    }
}

fn fingerprint(source: &str) -> blake3::Hash {
    blake3::hash(strip_code_fences(source).as_bytes())
}

fn layout_config(placements: &[(&Page, Vec<ComponentInstance>)]) -> String {
    let pages: serde_json::Map<String, serde_json::Value> = placements
        .iter()
        .map(|(page, instances)| {
            let entries: Vec<serde_json::Value> = instances
                .iter()
                .map(|i| {
                    json!({
                        "id": i.instance_id,
                        "component": i.component,
                        "position": i.position,
                        "dimensions": i.dimensions,
                    })
                })
                .collect();
            (page.name.clone(), serde_json::Value::Array(entries))
        })
        .collect();
    let body = serde_json::to_string_pretty(&json!({ "pages": pages })).unwrap_or_default();
    format!("export default {body};\n")
}

/// Route folder name for a page: ASCII letters, digits, `_` and `-` only.
pub(crate) fn route_name(page: &str) -> String {
    let route: String = page
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if route.is_empty() {
        "Page".to_string()
    } else {
        route
    }
}

/// One route per page in page order, numbered where sanitized names collide.
pub(crate) fn route_names(pages: &[Page]) -> Vec<String> {
    let mut names = Names::default();
    pages.iter().map(|page| names.claim(route_name(&page.name))).collect()
}

/// A JavaScript identifier derived from a display name.
fn identifier(name: &str) -> String {
    let ident: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '$')
        .collect();
    match ident.chars().next() {
        Some(c) if c.is_ascii_digit() => format!("_{ident}"),
        Some(_) => ident,
        None => "Unnamed".to_string(),
    }
}

fn jsx_text(text: &str) -> String {
    text.replace('{', "&#123;")
        .replace('}', "&#125;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn ensure_newline(text: &str) -> String {
    let mut out = text.to_string();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_and_routes() {
        assert_eq!(identifier("Hero Banner"), "HeroBanner");
        assert_eq!(identifier("3D View"), "_3DView");
        assert_eq!(route_name("About  Us"), "AboutUs");
        assert_eq!(route_name("Dr. Who"), "DrWho");
        assert_eq!(route_name("../etc/passwd"), "etcpasswd");
        assert_eq!(route_name("!!!"), "Page");
    }

    #[test]
    fn colliding_names_get_numbered_suffixes() {
        let mut names = Names::default();
        assert_eq!(names.claim("Hero".into()), "Hero");
        assert_eq!(names.claim("Hero".into()), "Hero_2");
        assert_eq!(names.claim("hero".into()), "hero_3");
        assert_eq!(names.claim("Hero_4".into()), "Hero_4");
        assert_eq!(names.numbered("Hero"), "Hero_5");
    }

    #[test]
    fn route_names_are_unique_in_page_order() {
        let pages: Vec<Page> = ["About Us", "AboutUs", "Dr. Who", "Dr/Who"]
            .into_iter()
            .map(|name| Page {
                name: name.to_string(),
                ..Page::default()
            })
            .collect();
        assert_eq!(route_names(&pages), vec!["AboutUs", "AboutUs_2", "DrWho", "DrWho_2"]);
    }

    #[test]
    fn placement_uses_viewport_units() {
        let assembler = ProjectAssembler::default();
        let instance = ComponentInstance {
            instance_id: "a".into(),
            component: "Hero".into(),
            position: crate::layout::Position { x: 640.0, y: 200.0 },
            dimensions: crate::layout::Dimensions {
                width: 320.0,
                height: 400.0,
            },
            variant_source: None,
        };
        assert_eq!(
            assembler.placement_style(&instance),
            "position: 'absolute', left: '50.00vw', top: '25.00vh', width: '25.00vw', height: '50.00vh'"
        );
    }
}
