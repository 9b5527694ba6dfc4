//! Deploy bundle: everything the hosting collaborator needs in one payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config_scan::ConfigScanner;
use crate::error::DeployError;
use crate::tree::{PackagedFile, VirtualFileNode};

/// Environments every configuration value is made available to.
const TARGETS: [&str; 3] = ["production", "preview", "development"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub target: Vec<String>,
}

impl ConfigEntry {
    pub fn plain(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            kind: "plain".to_string(),
            target: TARGETS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployBundle {
    pub project_name: String,
    pub files: Vec<PackagedFile>,
    pub package_manifest: serde_json::Value,
    pub required_config: Vec<ConfigEntry>,
    pub secrets: BTreeMap<String, String>,
}

impl DeployBundle {
    /// Package `root` for deployment. Every configuration variable the code
    /// references must have a value in `values` (or `secrets`).
    pub fn prepare(
        project_name: &str,
        root: &VirtualFileNode,
        extension: &str,
        scanner: &ConfigScanner,
        values: &BTreeMap<String, String>,
        secrets: BTreeMap<String, String>,
    ) -> Result<Self, DeployError> {
        let package_manifest = root
            .find("package.json")
            .and_then(VirtualFileNode::content)
            .and_then(|text| serde_json::from_str(text).ok())
            .ok_or(DeployError::MissingManifest)?;

        let required = scanner.scan(root);
        let missing: Vec<String> = required
            .iter()
            .filter(|key| !values.contains_key(*key) && !secrets.contains_key(*key))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(DeployError::MissingConfig(missing));
        }

        let required_config = required
            .iter()
            .filter_map(|key| values.get(key).map(|value| ConfigEntry::plain(key, value)))
            .collect();
        let files = root.flatten(extension);
        info!(project = project_name, files = files.len(), "deploy bundle prepared");

        Ok(Self {
            project_name: project_name.to_string(),
            files,
            package_manifest,
            required_config,
            secrets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> VirtualFileNode {
        VirtualFileNode::folder(
            "project-root",
            vec![
                VirtualFileNode::folder(
                    "api",
                    vec![VirtualFileNode::file(
                        "orders.js",
                        "const { DB_URL, TOKEN } = process.env;",
                    )],
                )
                .unwrap(),
                VirtualFileNode::file("package.json", "{\"name\": \"bakery\"}"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn missing_values_are_reported() {
        let values = BTreeMap::from([("DB_URL".to_string(), "postgres://db".to_string())]);
        let err = DeployBundle::prepare(
            "bakery",
            &tree(),
            "js",
            &ConfigScanner::default(),
            &values,
            BTreeMap::new(),
        )
        .unwrap_err();
        assert_eq!(err, DeployError::MissingConfig(vec!["TOKEN".into()]));
    }

    #[test]
    fn bundle_carries_config_and_secrets() {
        let values = BTreeMap::from([("DB_URL".to_string(), "postgres://db".to_string())]);
        let secrets = BTreeMap::from([("TOKEN".to_string(), "s3cret".to_string())]);
        let bundle = DeployBundle::prepare(
            "bakery",
            &tree(),
            "js",
            &ConfigScanner::default(),
            &values,
            secrets,
        )
        .unwrap();
        assert_eq!(bundle.package_manifest["name"], "bakery");
        assert_eq!(bundle.required_config, vec![ConfigEntry::plain("DB_URL", "postgres://db")]);
        assert_eq!(bundle.files.len(), 2);

        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["requiredConfig"][0]["type"], "plain");
        assert_eq!(json["requiredConfig"][0]["target"][1], "preview");
    }

    #[test]
    fn manifest_is_required() {
        let root = VirtualFileNode::folder("r", vec![VirtualFileNode::file("a.js", "")]).unwrap();
        let err = DeployBundle::prepare(
            "x",
            &root,
            "js",
            &ConfigScanner::default(),
            &BTreeMap::new(),
            BTreeMap::new(),
        )
        .unwrap_err();
        assert_eq!(err, DeployError::MissingManifest);
    }
}
