//! Assembly integration tests: a generated bakery site end to end.
//!
//! Covers:
//! - Tree layout for a two-page project with one failed component
//! - Deterministic output (same inputs, same digest)
//! - Numbered component variants from per-placement source
//! - Missing or empty page plans
//! - Required configuration discovery over the assembled tree
//! - Unique file and route names when display names sanitize alike
//! - Escaped attribute values for failed components

use scaffold::model::{Page, Tracked};
use scaffold::{
    assemble, scan_required_config, ApiPlan, ApiSpec, AssemblyError, ComponentInstance,
    Dimensions, Layout, LayoutEvent, PagePlan, Position, ProjectBrief, ProjectState, StateEvent,
    StylingPlan, VirtualFileNode,
};

fn page(name: &str, components: &[&str]) -> Page {
    Page {
        name: name.to_string(),
        purpose: String::new(),
        components: components.iter().map(|c| c.to_string()).collect(),
    }
}

fn api(name: &str) -> ApiSpec {
    ApiSpec {
        name: name.to_string(),
        endpoint: format!("/api/{name}"),
        method: "GET".to_string(),
        ..ApiSpec::default()
    }
}

/// Home(Header, Hero) and About(Header, Team); Team never compiled and the
/// `placeOrder` API failed.
fn bakery() -> ProjectState {
    let mut state = ProjectState::new(ProjectBrief {
        name: "Bob's Bakery".to_string(),
        purpose: "Sell bread online".to_string(),
        colors: "warm brown".to_string(),
        multi_page: true,
    });
    state.apply(StateEvent::PagePlanResolved(Some(PagePlan {
        pages: vec![page("Home", &["Header", "Hero"]), page("About", &["Header", "Team"])],
    })));
    state.apply(StateEvent::StylingResolved(Some(StylingPlan {
        colors: [("primary".to_string(), "#8b4513".to_string())]
            .into_iter()
            .collect(),
    })));
    state.apply(StateEvent::ComponentsDeclared(vec![
        "Header".into(),
        "Hero".into(),
        "Team".into(),
    ]));
    state.apply(StateEvent::ComponentGenerated {
        name: "Header".into(),
        source: "const Header = () => <header>Bob's Bakery</header>;".into(),
    });
    state.apply(StateEvent::ComponentGenerated {
        name: "Hero".into(),
        source: "export default function Hero() { return <h1>Fresh bread</h1>; }".into(),
    });
    state.apply(StateEvent::ComponentFailed {
        name: "Team".into(),
        reason: "'Widget' is not defined".into(),
        attempts: 3,
    });
    state.apply(StateEvent::ApiPlanResolved(Some(ApiPlan {
        apis: vec![api("getMenu"), api("placeOrder")],
    })));
    state.apply(StateEvent::ApisDeclared(vec![api("getMenu"), api("placeOrder")]));
    state.apply(StateEvent::ApiGenerated {
        name: "getMenu".into(),
        code: "```js\nexport default async function handler(req, res) {\n  \
               const db = process.env.DB_URL;\n  res.json({ db });\n}\n```"
            .into(),
    });
    state.apply(StateEvent::ApiFailed {
        name: "placeOrder".into(),
    });
    state.apply(StateEvent::SqlGenerated(
        "CREATE TABLE loaves (id SERIAL PRIMARY KEY);".into(),
    ));
    state
}

fn child_names(node: &VirtualFileNode) -> Vec<&str> {
    node.children().iter().map(VirtualFileNode::name).collect()
}

#[test]
fn two_page_project_tree() {
    let tree = assemble(&bakery(), &Layout::default()).unwrap();
    assert_eq!(tree.name(), "project-root");

    let pages = tree.find("pages").unwrap();
    assert_eq!(child_names(pages), vec!["Home", "About"]);

    let components = tree.find("components").unwrap();
    assert_eq!(child_names(components), vec!["Header.js", "Hero.js"]);

    let api = tree.find("api").unwrap();
    assert_eq!(child_names(api), vec!["getMenu.js"]);
    let handler = tree.find("api/getMenu.js").and_then(VirtualFileNode::content).unwrap();
    assert!(handler.starts_with("export default async function handler"));
    assert!(!handler.contains("```"));

    assert!(tree.find("database/schema.sql").is_some());
    assert!(tree.find("layout.config.js").is_some());
    assert!(tree.find("routes.config.js").is_some());

    let manifest: serde_json::Value = serde_json::from_str(
        tree.find("package.json").and_then(VirtualFileNode::content).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest["name"], "bob-s-bakery");
    assert_eq!(manifest["dependencies"]["styled-components"], "^6.1.12");
}

#[test]
fn failed_component_is_inlined_as_error() {
    let tree = assemble(&bakery(), &Layout::default()).unwrap();
    let about = tree.find("pages/About").and_then(VirtualFileNode::content).unwrap();
    assert!(about.contains("import Header from '@components/Header';"));
    assert!(!about.contains("@components/Team"));
    assert!(about.contains("data-component=\"Team\""));

    let header = tree
        .find("components/Header.js")
        .and_then(VirtualFileNode::content)
        .unwrap();
    assert!(header.starts_with("import React from 'react';"));
    assert!(header.ends_with("export default Header;\n"));
}

#[test]
fn assembly_is_deterministic() {
    let state = bakery();
    let layout = Layout::default();
    let first = assemble(&state, &layout).unwrap();
    let second = assemble(&state, &layout).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.digest(), second.digest());
}

#[test]
fn distinct_variant_sources_become_numbered_modules() {
    let state = bakery();
    let mut layout = Layout::default();
    let mut place = |id: &str, variant: Option<&str>, y: f64| {
        let instance = ComponentInstance {
            instance_id: id.to_string(),
            component: "Hero".to_string(),
            position: Position { x: 0.0, y },
            dimensions: Dimensions {
                width: 640.0,
                height: 200.0,
            },
            variant_source: variant.map(str::to_string),
        };
        layout
            .apply(LayoutEvent::Place {
                page: "Home".to_string(),
                instance,
            })
            .unwrap();
    };
    place("plain", None, 0.0);
    place("sale", Some("const Hero = () => <h1>Sale today</h1>;"), 200.0);
    place("sale-again", Some("const Hero = () => <h1>Sale today</h1>;"), 400.0);
    place("closed", Some("const Hero = () => <h1>Closed</h1>;"), 600.0);

    let tree = assemble(&state, &layout).unwrap();
    let components = tree.find("components").unwrap();
    assert_eq!(
        child_names(components),
        vec!["Header.js", "Hero.js", "Hero_2.js", "Hero_3.js"]
    );

    let home = tree.find("pages/Home").and_then(VirtualFileNode::content).unwrap();
    assert!(home.contains("import Hero_2 from '@components/Hero_2';"));
    assert_eq!(home.matches("<Hero_2 />").count(), 2);
    assert_eq!(home.matches("<Hero_3 />").count(), 1);
    assert!(!home.contains("<Header />"), "recorded placements replace the default stack");
}

#[test]
fn missing_page_plan_is_an_error() {
    let mut state = bakery();
    state.page_plan = Tracked::failed();
    assert_eq!(
        assemble(&state, &Layout::default()),
        Err(AssemblyError::MissingArtifact("page plan"))
    );
}

#[test]
fn empty_page_plan_is_an_error() {
    let mut state = bakery();
    state.apply(StateEvent::PagePlanResolved(Some(PagePlan::default())));
    assert_eq!(
        assemble(&state, &Layout::default()),
        Err(AssemblyError::NoPages)
    );
}

#[test]
fn required_config_found_in_assembled_tree() {
    let tree = assemble(&bakery(), &Layout::default()).unwrap();
    let required = scan_required_config(&tree);
    assert_eq!(required.iter().collect::<Vec<_>>(), vec!["DB_URL"]);
}

/// Pages and components whose display names differ but sanitize alike.
fn lookalikes() -> ProjectState {
    let mut state = ProjectState::new(ProjectBrief {
        name: "Lookalikes".to_string(),
        purpose: "Names that collide".to_string(),
        colors: String::new(),
        multi_page: true,
    });
    state.apply(StateEvent::PagePlanResolved(Some(PagePlan {
        pages: vec![
            page("About Us", &["Hero Banner"]),
            page("AboutUs", &["HeroBanner"]),
            page("Dr. Who", &["Hero Banner", "HeroBanner"]),
        ],
    })));
    state.apply(StateEvent::ComponentsDeclared(vec![
        "Hero Banner".into(),
        "HeroBanner".into(),
    ]));
    state.apply(StateEvent::ComponentGenerated {
        name: "Hero Banner".into(),
        source: "const HeroBanner = () => <h1>First</h1>;".into(),
    });
    state.apply(StateEvent::ComponentGenerated {
        name: "HeroBanner".into(),
        source: "const HeroBanner = () => <h1>Second</h1>;".into(),
    });
    state
}

#[test]
fn lookalike_component_names_get_distinct_modules() {
    let tree = assemble(&lookalikes(), &Layout::default()).unwrap();
    let components = tree.find("components").unwrap();
    assert_eq!(child_names(components), vec!["HeroBanner.js", "HeroBanner_2.js"]);

    let second = tree
        .find("components/HeroBanner_2.js")
        .and_then(VirtualFileNode::content)
        .unwrap();
    assert!(second.contains("Second"));
    assert!(second.ends_with("export default HeroBanner;\n"));

    let both = tree.find("pages/DrWho").and_then(VirtualFileNode::content).unwrap();
    assert!(both.contains("import HeroBanner from '@components/HeroBanner';"));
    assert!(both.contains("import HeroBanner_2 from '@components/HeroBanner_2';"));
}

#[test]
fn lookalike_page_names_get_distinct_routes() {
    let tree = assemble(&lookalikes(), &Layout::default()).unwrap();
    let pages = tree.find("pages").unwrap();
    assert_eq!(child_names(pages), vec!["AboutUs", "AboutUs_2", "DrWho"]);

    let paths: Vec<String> = tree.flatten("js").into_iter().map(|f| f.path).collect();
    for expected in [
        "pages/AboutUs/index.js",
        "pages/AboutUs_2/index.js",
        "pages/DrWho/index.js",
    ] {
        assert_eq!(paths.iter().filter(|p| *p == expected).count(), 1, "{expected}");
    }
    assert!(paths.iter().all(|p| !p.contains("Dr.")));

    let routes = tree
        .find("routes.config.js")
        .and_then(VirtualFileNode::content)
        .unwrap();
    assert!(routes.contains("\"/AboutUs_2\""));
    assert!(routes.contains("\"/DrWho\""));
}

#[test]
fn failed_component_attributes_are_escaped() {
    let mut state = lookalikes();
    let odd = r#"Sale "50%" <Off>"#;
    state.apply(StateEvent::PagePlanResolved(Some(PagePlan {
        pages: vec![page("Home", &[odd])],
    })));
    state.apply(StateEvent::ComponentsDeclared(vec![odd.into()]));
    state.apply(StateEvent::ComponentFailed {
        name: odd.into(),
        reason: "syntax error".into(),
        attempts: 3,
    });

    let tree = assemble(&state, &Layout::default()).unwrap();
    let home = tree.find("pages/Home").and_then(VirtualFileNode::content).unwrap();
    assert!(home.contains(r#"data-component="Sale &quot;50%&quot; &lt;Off&gt;""#));
    assert!(!home.contains(r#"data-component="Sale "50%""#));
}
