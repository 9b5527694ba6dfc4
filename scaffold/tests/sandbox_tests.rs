//! Sandbox integration tests: generated components compiled and rendered
//! through the public API, including the failure paths that must never
//! escape a unit.

use scaffold::model::UiComponent;
use scaffold::sandbox::placeholder;
use scaffold::{
    ArtifactStatus, CanvasSize, CompilationUnit, CompileFailure, ComponentInstance, Dimensions,
    Position, Preview, ProjectState, SandboxConfig,
};
use serde_json::json;

const MENU: &str = r#"```tsx
import React, { useState } from 'react';
import styled from 'styled-components';

const Price = styled.span`
  color: #8b4513;
  font-weight: bold;
`;

interface Props { items?: { name: string; price: number }[] }

export default function Menu({ items = [] }: Props) {
  const [open] = useState(true);
  if (!open) return null;
  return (
    <ul className="menu">
      {items.map((item) => (
        <li key={item.name}>
          {item.name} <Price>${item.price.toFixed(2)}</Price>
        </li>
      ))}
    </ul>
  );
}
```"#;

fn instance(id: &str, component: &str, x: f64) -> ComponentInstance {
    ComponentInstance {
        instance_id: id.to_string(),
        component: component.to_string(),
        position: Position { x, y: 0.0 },
        dimensions: Dimensions {
            width: 200.0,
            height: 100.0,
        },
        variant_source: None,
    }
}

#[test]
fn typed_component_with_hooks_and_styled_renders() {
    let unit = CompilationUnit::compile(MENU, "Menu", &SandboxConfig::default());
    assert!(unit.is_ok(), "{:?}", unit.failure());

    let rendered = unit.render(&json!({"items": [{"name": "Rye", "price": 4.5}]}));
    assert!(!rendered.is_placeholder(), "{:?}", rendered.failure);
    assert!(rendered.markup.starts_with("<ul class=\"menu\"><li>Rye "));
    assert!(rendered.markup.contains("<span class=\"sc-"));
    assert!(rendered.markup.contains(">$4.50</span>"));
}

#[test]
fn default_props_apply_when_absent() {
    let unit = CompilationUnit::compile(MENU, "Menu", &SandboxConfig::default());
    assert_eq!(unit.render(&json!({})).markup, "<ul class=\"menu\"></ul>");
}

#[test]
fn node_modules_outside_the_allow_list_are_rejected() {
    let source =
        "import fs from 'fs';\nexport default () => <p>{fs.readFileSync('/etc/passwd')}</p>;";
    let unit = CompilationUnit::compile(source, "Leak", &SandboxConfig::default());
    assert_eq!(unit.failure(), Some(&CompileFailure::ForbiddenImport("fs".into())));

    let rendered = unit.render(&json!({}));
    assert_eq!(
        rendered.markup,
        placeholder("Leak", "import of 'fs' is not permitted")
    );
}

#[test]
fn styled_is_unavailable_when_not_injected() {
    let config = SandboxConfig {
        globals: vec!["React".to_string()],
        ..SandboxConfig::default()
    };
    let result = CompilationUnit::self_check(MENU, "Menu", &config);
    assert_eq!(
        result,
        Err(CompileFailure::ForbiddenImport("styled-components".into()))
    );
}

#[test]
fn runaway_component_degrades_to_placeholder() {
    let config = SandboxConfig {
        timeout_ms: 50,
        max_steps: 10_000,
        ..SandboxConfig::default()
    };
    let unit = CompilationUnit::compile(
        "export default function Spin() { for (;;) {} }",
        "Spin",
        &config,
    );
    let rendered = unit.render(&json!({}));
    assert!(rendered.is_placeholder());
    assert!(rendered.markup.contains("data-component=\"Spin\""));
}

#[test]
fn preview_page_isolates_each_placement() {
    let mut state = ProjectState::default();
    for (name, source, status) in [
        ("Header", "const Header = () => <header>Bob's Bakery</header>;", ArtifactStatus::Success),
        (
            "Oven",
            "export default () => { const t = undefined; return <p>{t.temp}</p>; }",
            ArtifactStatus::Success,
        ),
        ("Team", "() => <div>Error generating Team after 3 attempts</div>", ArtifactStatus::Failed),
    ] {
        state.components.insert(
            name.to_string(),
            UiComponent {
                name: name.to_string(),
                source: source.to_string(),
                status,
                failure: None,
            },
        );
    }

    let preview = Preview::build(&state, &SandboxConfig::default());
    let page = preview.render_page(
        &[
            instance("a", "Header", 0.0),
            instance("b", "Oven", 200.0),
            instance("c", "Team", 400.0),
        ],
        CanvasSize::default(),
    );

    assert!(page.contains("<header>Bob's Bakery</header>"));
    assert!(page.contains("data-component=\"Oven\">Error loading Oven: TypeError"));
    assert!(page.contains("data-component=\"Team\""));
    assert_eq!(page.matches("class=\"placement\"").count(), 3);
}
