//! Stage prompts.
//!
//! Each prompt embeds the state accumulated so far. Structured stages also
//! carry the JSON schema of the expected answer, derived from the model
//! types so prompt and decoder cannot drift apart.

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use scaffold::model::{ApiParameter, Page};
use scaffold::{ApiPlan, ApiSpec, PagePlan, ProjectBrief, Schema, StylingPlan};

/// Service-side template id for every prompt kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateIds {
    pub single_page_plan: String,
    pub multi_page_plan: String,
    pub styling_plan: String,
    pub api_plan: String,
    pub schema: String,
    pub component: String,
    pub serverless_api: String,
    pub sql: String,
}

impl Default for TemplateIds {
    fn default() -> Self {
        Self {
            single_page_plan: "generate-single-page-plan".into(),
            multi_page_plan: "generate-multiple-page-plan".into(),
            styling_plan: "generate-styling-plan".into(),
            api_plan: "generate-api-plan".into(),
            schema: "generate-schema".into(),
            component: "generate-styled-react-component".into(),
            serverless_api: "generate-serverless-api".into(),
            sql: "generate-sql-execution-code".into(),
        }
    }
}

impl TemplateIds {
    pub fn page_plan(&self, multi_page: bool) -> &str {
        if multi_page {
            &self.multi_page_plan
        } else {
            &self.single_page_plan
        }
    }
}

fn answer_shape<T: JsonSchema>() -> String {
    let schema = serde_json::to_string(&schema_for!(T)).unwrap_or_default();
    format!("\n\nAnswer with JSON matching this schema:\n{schema}")
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

pub fn page_plan(brief: &ProjectBrief) -> String {
    format!(
        "Name: {}, Purpose: {}{}",
        brief.name,
        brief.purpose,
        answer_shape::<PagePlan>()
    )
}

pub fn styling(brief: &ProjectBrief) -> String {
    format!(
        "Colors: {}, Purpose: {}{}",
        brief.colors,
        brief.purpose,
        answer_shape::<StylingPlan>()
    )
}

pub fn api_plan(brief: &ProjectBrief, pages: &PagePlan) -> String {
    format!(
        "Purpose: {}, Page details: {}{}",
        brief.purpose,
        json(&pages.pages),
        answer_shape::<ApiPlan>()
    )
}

pub fn schema(brief: &ProjectBrief, pages: &PagePlan, apis: &ApiPlan) -> String {
    format!(
        "Purpose: {}, Page details: {}, API details: {}{}",
        brief.purpose,
        json(&pages.pages),
        json(&apis.apis),
        answer_shape::<Schema>()
    )
}

/// One component, described by the first page that uses it.
pub fn component(name: &str, page: Option<&Page>, styling: Option<&StylingPlan>) -> String {
    let purpose = page.map(|p| p.purpose.as_str()).unwrap_or("");
    let guide = styling.map(json).unwrap_or_else(|| "{}".to_string());
    format!(
        "Generate a React component named {name} for a page with the following purpose: {purpose}. \
         Follow this styling guide: {guide}"
    )
}

/// Serverless implementation of one API against the whole schema.
pub fn serverless_api(api: &ApiSpec, schema: Option<&Schema>) -> String {
    let mut prompt = format!(
        "Generate a serverless API function named \"{}\" with the following details:\n",
        api.name
    );
    prompt.push_str(&format!("- HTTP Method: {}\n", api.method));
    prompt.push_str(&format!("- Endpoint: {}\n", api.endpoint));
    if !api.parameters.is_empty() {
        let names: Vec<&str> = api.parameters.iter().map(ApiParameter::name).collect();
        prompt.push_str(&format!("- Parameters: {}\n", names.join(", ")));
    }
    if !api.description.is_empty() {
        prompt.push_str(&format!("- Description: {}\n", api.description));
    }

    if let Some(schema) = schema.filter(|s| !s.tables.is_empty()) {
        prompt.push_str("\nThis API should interact with the following database schema:\n");
        for table in &schema.tables {
            prompt.push_str(&format!("- Table: {}\n", table.table_name));
            prompt.push_str("  - Columns:\n");
            for column in &table.columns {
                prompt.push_str(&format!("    - {} ({})\n", column.name, column.column_type));
            }
            if !table.relationships.is_empty() {
                prompt.push_str("  - Relationships:\n");
                for rel in &table.relationships {
                    prompt.push_str(&format!(
                        "    - {} relationship with {} via {}\n",
                        rel.kind, rel.related_table, rel.column
                    ));
                }
            }
        }
    }

    prompt.push_str(
        "\nRead configuration such as connection strings from process.env. \
         Handle error cases and invalid input gracefully.",
    );
    prompt
}

pub fn sql(schema: &Schema) -> String {
    json(schema)
}

/// Append the user's modification request, if any.
pub fn with_modification(prompt: String, modification: Option<&str>) -> String {
    match modification.map(str::trim).filter(|m| !m.is_empty()) {
        Some(m) => format!("{prompt}\n{m}"),
        None => prompt,
    }
}

/// Identifiers models like to concatenate into literals
/// (`'Welcome to ' + projectName`).
pub fn repair_context(brief: &ProjectBrief) -> HashMap<String, String> {
    HashMap::from([
        ("name".to_string(), brief.name.clone()),
        ("projectName".to_string(), brief.name.clone()),
        ("project.name".to_string(), brief.name.clone()),
        ("purpose".to_string(), brief.purpose.clone()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaffold::model::{Column, Relationship, Table};

    fn orders_schema() -> Schema {
        Schema {
            tables: vec![Table {
                table_name: "orders".into(),
                columns: vec![Column {
                    name: "id".into(),
                    column_type: "uuid".into(),
                    primary_key: true,
                    nullable: false,
                    foreign_key: None,
                }],
                relationships: vec![Relationship {
                    kind: "many-to-one".into(),
                    related_table: "users".into(),
                    column: "user_id".into(),
                }],
            }],
        }
    }

    #[test]
    fn api_prompt_embeds_method_endpoint_and_schema() {
        let api = ApiSpec {
            name: "placeOrder".into(),
            endpoint: "/api/order".into(),
            method: "POST".into(),
            parameters: vec![ApiParameter::Name("items".into())],
            description: String::new(),
        };
        let prompt = serverless_api(&api, Some(&orders_schema()));
        assert!(prompt.contains("named \"placeOrder\""));
        assert!(
            prompt.contains("- HTTP Method: POST\n- Endpoint: /api/order\n- Parameters: items\n")
        );
        assert!(prompt.contains("- Table: orders\n  - Columns:\n    - id (uuid)\n"));
        assert!(prompt.contains("many-to-one relationship with users via user_id"));
    }

    #[test]
    fn schema_prompt_embeds_pages_and_apis() {
        let brief = ProjectBrief {
            purpose: "Sell bread".into(),
            ..ProjectBrief::default()
        };
        let pages = PagePlan {
            pages: vec![Page {
                name: "Home".into(),
                ..Page::default()
            }],
        };
        let apis = ApiPlan {
            apis: vec![ApiSpec {
                name: "getMenu".into(),
                ..ApiSpec::default()
            }],
        };
        let prompt = schema(&brief, &pages, &apis);
        assert!(prompt.starts_with("Purpose: Sell bread, Page details: [{\"name\":\"Home\""));
        assert!(prompt.contains("API details: [{\"name\":\"getMenu\""));
        assert!(prompt.contains("\"tables\""));
    }

    #[test]
    fn modification_is_appended_when_present() {
        assert_eq!(with_modification("base".into(), Some("  darker  ")), "base\ndarker");
        assert_eq!(with_modification("base".into(), Some("   ")), "base");
        assert_eq!(with_modification("base".into(), None), "base");
    }

    #[test]
    fn component_prompt_names_purpose_and_guide() {
        let page = Page {
            name: "Home".into(),
            purpose: "Welcome visitors".into(),
            components: vec!["Hero".into()],
        };
        let prompt = component("Hero", Some(&page), None);
        assert_eq!(
            prompt,
            "Generate a React component named Hero for a page with the following purpose: Welcome visitors. Follow this styling guide: {}"
        );
    }

    #[test]
    fn page_plan_template_follows_brief() {
        let ids = TemplateIds::default();
        assert_eq!(ids.page_plan(true), "generate-multiple-page-plan");
        assert_eq!(ids.page_plan(false), "generate-single-page-plan");
    }
}
