//! Pipeline integration tests against a scripted generation service.
//!
//! The script answers by template id. `Hero` keeps referencing an
//! undeclared name until the prompt asks it to declare every name, and the
//! `placeOrder` endpoint always fails with HTTP 500. A page-plan prompt
//! asking for a contact page gets a reshaped plan, and an outage switch
//! makes every call fail.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use appgen::{
    AppgenConfig, ClientError, GenerationClient, GenerationOrchestrator, GenerationOutput,
    PipelineError, PipelineStage,
};
use scaffold::model::{Column, Table};
use scaffold::{scan_required_config, ArtifactStatus, Layout, ProjectBrief, Schema, VirtualFileNode};

const FIX_HINT: &str = "Declare every name you use.";
const CONTACT_HINT: &str = "Replace the About page with a Contact page.";

struct ScriptedClient {
    page_plan: String,
    outage: AtomicBool,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedClient {
    fn new(page_plan: &str) -> Arc<Self> {
        Arc::new(Self {
            page_plan: page_plan.to_string(),
            outage: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn bakery() -> Arc<Self> {
        Self::new(
            "Here is the plan: {pages: [\
               {name: 'Home', purpose: 'Welcome visitors', components: ['Header', 'Hero',]},\
               {name: 'About', purpose: 'Tell Bob\\'s story', components: ['Header']},\
             ]}",
        )
    }

    fn count(&self, template_id: &str, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, p)| t == template_id && p.contains(needle))
            .count()
    }

    fn go_down(&self) {
        self.outage.store(true, Ordering::SeqCst);
    }

    fn respond(&self, template_id: &str, prompt: &str) -> Result<String, ClientError> {
        if self.outage.load(Ordering::SeqCst) {
            return Err(ClientError::Status {
                status: 503,
                body: "maintenance".to_string(),
            });
        }
        let text = match template_id {
            "generate-multiple-page-plan" if prompt.contains(CONTACT_HINT) => {
                "{pages: [{name: 'Home', purpose: 'Welcome visitors', components: ['Header']}, \
                 {name: 'Contact', purpose: 'Take enquiries', components: ['ContactForm']}]}"
                    .to_string()
            }
            "generate-multiple-page-plan" | "generate-single-page-plan" => self.page_plan.clone(),
            "generate-styling-plan" => {
                "{colors: {primary: '#8b4513', background: '#fff8f0',}}".to_string()
            }
            "generate-api-plan" => "[{name: 'getMenu', endpoint: '/api/menu', method: 'GET'}, \
                 {name: 'placeOrder', endpoint: '/api/order', method: 'POST', \
                 parameters: ['items']}]"
                .to_string(),
            "generate-schema" => r#"{"tables": [{"tableName": "loaves", "columns":
                [{"name": "id", "type": "serial", "primaryKey": true}]}]}"#
                .to_string(),
            "generate-styled-react-component" => {
                let name = prompt
                    .split("named ")
                    .nth(1)
                    .and_then(|rest| rest.split_whitespace().next())
                    .unwrap_or("Unknown");
                if name == "Hero" && !prompt.contains(FIX_HINT) {
                    "const Hero = () => <h1>{tagline}</h1>;".to_string()
                } else {
                    format!(
                        "```tsx\nconst {name} = () => \
                         <section className=\"block\">{name}</section>;\n```"
                    )
                }
            }
            "generate-serverless-api" if prompt.contains("\"placeOrder\"") => {
                return Err(ClientError::Status {
                    status: 500,
                    body: "upstream unavailable".to_string(),
                })
            }
            "generate-serverless-api" => "```js\n\
                 export default async function handler(req, res) {\n  \
                 res.json({ db: process.env.DB_URL });\n}\n```"
                .to_string(),
            "generate-sql-execution-code" => {
                "CREATE TABLE loaves (id SERIAL PRIMARY KEY);".to_string()
            }
            other => {
                return Err(ClientError::Status {
                    status: 404,
                    body: format!("unknown template {other}"),
                })
            }
        };
        Ok(text)
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate(
        &self,
        template_id: &str,
        prompt: &str,
    ) -> Result<Vec<GenerationOutput>, ClientError> {
        self.calls
            .lock()
            .unwrap()
            .push((template_id.to_string(), prompt.to_string()));
        self.respond(template_id, prompt)
            .map(|output| vec![GenerationOutput { output }])
    }
}

fn brief() -> ProjectBrief {
    ProjectBrief {
        name: "Bob's Bakery".to_string(),
        purpose: "Sell bread online".to_string(),
        colors: "warm browns".to_string(),
        multi_page: true,
    }
}

fn child_names(node: &VirtualFileNode) -> Vec<&str> {
    node.children().iter().map(VirtualFileNode::name).collect()
}

#[tokio::test]
async fn bakery_run_reaches_ready_with_isolated_failures() {
    let client = ScriptedClient::bakery();
    let orchestrator = GenerationOrchestrator::new(client.clone(), AppgenConfig::default());

    let state = orchestrator.run(brief()).await.unwrap();

    assert_eq!(orchestrator.stage().await, PipelineStage::Ready);
    assert_eq!(orchestrator.transitions().await.len(), 5);
    assert_eq!(state.components.len(), 2, "Header is generated once for both pages");
    assert_eq!(state.components["Header"].status, ArtifactStatus::Success);
    assert_eq!(state.styling.value.colors["primary"], "#8b4513");
    assert_eq!(state.schema.value.tables[0].table_name, "loaves");
    assert_eq!(state.sql.status, ArtifactStatus::Success);

    let hero = &state.components["Hero"];
    assert_eq!(hero.status, ArtifactStatus::Failed);
    assert!(hero.failure.as_deref().unwrap_or_default().contains("tagline"));
    assert_eq!(client.count("generate-styled-react-component", "named Hero "), 3);
    assert_eq!(client.count("generate-styled-react-component", "named Header "), 1);
    assert_eq!(
        orchestrator.status_bus().statuses_for("component Hero"),
        vec![
            ArtifactStatus::Generating,
            ArtifactStatus::Retrying(1),
            ArtifactStatus::Retrying(2),
            ArtifactStatus::Failed,
        ]
    );

    assert_eq!(state.apis["getMenu"].status, ArtifactStatus::Success);
    assert_eq!(state.apis["placeOrder"].status, ArtifactStatus::Failed);
    assert_eq!(client.count("generate-serverless-api", "\"placeOrder\""), 3);
}

#[tokio::test]
async fn assembled_tree_leaves_out_failed_artifacts() {
    let orchestrator =
        GenerationOrchestrator::new(ScriptedClient::bakery(), AppgenConfig::default());
    orchestrator.run(brief()).await.unwrap();

    let tree = orchestrator.assemble(&Layout::default()).await.unwrap();
    assert_eq!(child_names(tree.find("pages").unwrap()), vec!["Home", "About"]);
    assert_eq!(child_names(tree.find("components").unwrap()), vec!["Header.js"]);
    assert_eq!(child_names(tree.find("api").unwrap()), vec!["getMenu.js"]);

    let home = tree.find("pages/Home").and_then(VirtualFileNode::content).unwrap();
    assert!(home.contains("import Header from '@components/Header';"));
    assert!(home.contains("data-component=\"Hero\""));

    let required = scan_required_config(&tree);
    let names: Vec<&str> = required.iter().collect();
    assert_eq!(names, vec!["DB_URL"]);
}

#[tokio::test]
async fn regeneration_with_a_modification_recovers_a_failed_component() {
    let client = ScriptedClient::bakery();
    let orchestrator = GenerationOrchestrator::new(client.clone(), AppgenConfig::default());
    orchestrator.run(brief()).await.unwrap();

    let status = orchestrator
        .regenerate_component("Hero", Some(FIX_HINT))
        .await
        .unwrap();

    assert_eq!(status, ArtifactStatus::Success);
    let state = orchestrator.snapshot().await;
    assert_eq!(state.components["Hero"].status, ArtifactStatus::Success);
    assert!(state.components["Hero"].source.contains("<section"));
    assert_eq!(client.count("generate-styled-react-component", FIX_HINT), 1);

    let tree = orchestrator.assemble(&Layout::default()).await.unwrap();
    assert_eq!(
        child_names(tree.find("components").unwrap()),
        vec!["Header.js", "Hero.js"]
    );
}

#[tokio::test]
async fn empty_page_plan_aborts_the_run() {
    let client = ScriptedClient::new("{pages: []}");
    let orchestrator = GenerationOrchestrator::new(client.clone(), AppgenConfig::default());

    let err = orchestrator.run(brief()).await.unwrap_err();

    assert!(matches!(err, PipelineError::NoPages));
    assert_eq!(orchestrator.stage().await, PipelineStage::Aborted);
    assert_eq!(client.count("generate-multiple-page-plan", "Name: Bob's Bakery"), 3);
    assert_eq!(client.count("generate-styling-plan", ""), 0);
    assert_eq!(
        orchestrator.status_bus().statuses_for("page plan").last(),
        Some(&ArtifactStatus::Failed)
    );
}

#[tokio::test]
async fn removed_artifacts_cannot_be_regenerated() {
    let orchestrator =
        GenerationOrchestrator::new(ScriptedClient::bakery(), AppgenConfig::default());
    orchestrator.run(brief()).await.unwrap();

    orchestrator.remove_component("Header").await.unwrap();
    let err = orchestrator.regenerate_component("Header", None).await.unwrap_err();
    assert!(matches!(err, PipelineError::UnknownArtifact(ref name) if name == "component Header"));

    orchestrator.remove_api("getMenu").await.unwrap();
    assert!(matches!(
        orchestrator.remove_api("getMenu").await,
        Err(PipelineError::UnknownArtifact(_))
    ));
}

#[tokio::test]
async fn concurrent_edit_and_regeneration_both_land() {
    let orchestrator =
        GenerationOrchestrator::new(ScriptedClient::bakery(), AppgenConfig::default());
    orchestrator.run(brief()).await.unwrap();

    let edited = Schema {
        tables: vec![Table {
            table_name: "orders".to_string(),
            columns: vec![Column {
                name: "id".to_string(),
                column_type: "uuid".to_string(),
                primary_key: true,
                nullable: false,
                foreign_key: None,
            }],
            relationships: Vec::new(),
        }],
    };

    let ((), status) = tokio::join!(
        orchestrator.edit_schema(edited.clone()),
        orchestrator.regenerate_component("Hero", Some(FIX_HINT)),
    );

    assert_eq!(status.unwrap(), ArtifactStatus::Success);
    let state = orchestrator.snapshot().await;
    assert_eq!(state.schema.value, edited);
    assert_eq!(state.components["Hero"].status, ArtifactStatus::Success);
    assert_eq!(state.components["Header"].status, ArtifactStatus::Success);
}

#[tokio::test]
async fn failed_upstream_regeneration_keeps_confirmed_artifacts() {
    let client = ScriptedClient::bakery();
    let orchestrator = GenerationOrchestrator::new(client.clone(), AppgenConfig::default());
    let before = orchestrator.run(brief()).await.unwrap();
    client.go_down();

    assert_eq!(orchestrator.regenerate_styling(Some("darker")).await, ArtifactStatus::Failed);
    assert_eq!(
        orchestrator.regenerate_api_plan(Some("add search")).await,
        ArtifactStatus::Failed
    );
    assert_eq!(orchestrator.regenerate_schema(Some("add users")).await, ArtifactStatus::Failed);
    assert_eq!(orchestrator.regenerate_page_plan(Some(CONTACT_HINT)).await, ArtifactStatus::Failed);

    let after = orchestrator.snapshot().await;
    assert_eq!(after.styling.status, ArtifactStatus::Failed);
    assert_eq!(after.styling.value, before.styling.value);
    assert_eq!(after.api_plan.value, before.api_plan.value);
    assert_eq!(after.api_plan.status, ArtifactStatus::Failed);
    assert_eq!(after.apis.len(), 2);
    assert_eq!(after.schema.value.tables.len(), 1);
    assert_eq!(after.schema.available(), Some(&before.schema.value));
    assert_eq!(after.page_plan.value, before.page_plan.value);
    assert_eq!(
        orchestrator.status_bus().statuses_for("schema").last(),
        Some(&ArtifactStatus::Failed)
    );

    let tree = orchestrator.assemble(&Layout::default()).await.unwrap();
    assert_eq!(child_names(tree.find("pages").unwrap()), vec!["Home", "About"]);
    assert_eq!(child_names(tree.find("api").unwrap()), vec!["getMenu.js"]);
}

#[tokio::test]
async fn page_plan_regeneration_redeclares_components() {
    let client = ScriptedClient::bakery();
    let orchestrator = GenerationOrchestrator::new(client.clone(), AppgenConfig::default());
    orchestrator.run(brief()).await.unwrap();

    let status = orchestrator.regenerate_page_plan(Some(CONTACT_HINT)).await;

    assert_eq!(status, ArtifactStatus::Success);
    let state = orchestrator.snapshot().await;
    let pages: Vec<&str> = state.page_plan.value.pages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(pages, vec!["Home", "Contact"]);
    let components: Vec<&str> = state.components.keys().map(String::as_str).collect();
    assert_eq!(components, vec!["Header", "ContactForm"]);
    assert_eq!(state.components["ContactForm"].status, ArtifactStatus::Success);
    assert_eq!(client.count("generate-styled-react-component", "named Header "), 1);
    assert_eq!(client.count("generate-styled-react-component", "named ContactForm "), 1);
    assert_eq!(client.count("generate-multiple-page-plan", CONTACT_HINT), 1);

    let tree = orchestrator.assemble(&Layout::default()).await.unwrap();
    assert_eq!(child_names(tree.find("pages").unwrap()), vec!["Home", "Contact"]);
    assert_eq!(
        child_names(tree.find("components").unwrap()),
        vec!["Header.js", "ContactForm.js"]
    );
}

#[tokio::test]
async fn regenerate_all_components_applies_one_instruction_everywhere() {
    let client = ScriptedClient::bakery();
    let orchestrator = GenerationOrchestrator::new(client.clone(), AppgenConfig::default());
    orchestrator.run(brief()).await.unwrap();

    assert!(orchestrator.regenerate_all_components("   ").await.is_empty());
    assert_eq!(client.count("generate-styled-react-component", ""), 4);

    let statuses = orchestrator.regenerate_all_components(FIX_HINT).await;

    assert_eq!(
        statuses,
        vec![
            ("Header".to_string(), ArtifactStatus::Success),
            ("Hero".to_string(), ArtifactStatus::Success),
        ]
    );
    assert_eq!(client.count("generate-styled-react-component", FIX_HINT), 2);
    let state = orchestrator.snapshot().await;
    assert!(state.components.values().all(|c| c.status == ArtifactStatus::Success));
}
