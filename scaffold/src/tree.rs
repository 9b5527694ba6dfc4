//! Virtual project tree and packaging.
//!
//! A [`VirtualFileNode`] is either a folder with at least one child or a file
//! with content. Empty folders cannot be constructed; they are represented by
//! omission. Trees are built once per assembly and never mutated.

use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Leaves directly below this folder are routes.
pub const PAGES_FOLDER: &str = "pages";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum VirtualFileNode {
    Folder {
        name: String,
        children: Vec<VirtualFileNode>,
    },
    File {
        name: String,
        content: String,
    },
}

/// One entry of a flattened, archive-ready project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PackagedFile {
    pub path: String,
    pub content: String,
}

impl VirtualFileNode {
    pub fn file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::File {
            name: name.into(),
            content: content.into(),
        }
    }

    /// A folder, or `None` when there are no children.
    pub fn folder(name: impl Into<String>, children: Vec<VirtualFileNode>) -> Option<Self> {
        (!children.is_empty()).then(|| Self::Folder {
            name: name.into(),
            children,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Folder { name, .. } | Self::File { name, .. } => name,
        }
    }

    pub fn children(&self) -> &[VirtualFileNode] {
        match self {
            Self::Folder { children, .. } => children,
            Self::File { .. } => &[],
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Self::File { content, .. } => Some(content),
            Self::Folder { .. } => None,
        }
    }

    /// Look up a node by a `/`-separated path relative to this node.
    pub fn find(&self, path: &str) -> Option<&VirtualFileNode> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |node, segment| {
                node.children().iter().find(|child| child.name() == segment)
            })
    }

    /// Every file below this node with its path (this node's name excluded),
    /// in tree order.
    pub fn leaves(&self) -> Vec<(String, &str)> {
        let mut out = Vec::new();
        for child in self.children() {
            collect_leaves(child, String::new(), &mut out);
        }
        if let Self::File { name, content } = self {
            out.push((name.clone(), content.as_str()));
        }
        out
    }

    /// Content fingerprint of the whole tree. Structurally identical trees
    /// always produce the same digest.
    pub fn digest(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }

    /// Flatten to archive entries. Extension-less leaves directly under
    /// `pages/` become `pages/<name>/index.<ext>`; every other leaf keeps
    /// its name.
    pub fn flatten(&self, extension: &str) -> Vec<PackagedFile> {
        self.leaves()
            .into_iter()
            .map(|(path, content)| PackagedFile {
                path: packaged_path(&path, extension),
                content: content.to_string(),
            })
            .collect()
    }

    /// Write the flattened tree below `dir`. Returns the written paths.
    pub fn write_to_dir(&self, dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for file in self.flatten(extension) {
            let relative = Path::new(&file.path);
            let unsafe_path = relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
            if unsafe_path {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("refusing to write outside the project: {}", file.path),
                ));
            }
            let target = dir.join(relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, file.content)?;
            written.push(target);
        }
        Ok(written)
    }

    /// Read a project directory back into a tree, honouring `.gitignore`.
    /// Files that are not UTF-8 are skipped. Returns `None` for a directory
    /// without readable files.
    pub fn from_dir(dir: &Path) -> io::Result<Option<VirtualFileNode>> {
        let mut files: BTreeMap<PathBuf, String> = BTreeMap::new();
        let walker = WalkBuilder::new(dir).hidden(true).git_ignore(true).build();
        for entry in walker {
            let entry = entry.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(path) else {
                continue;
            };
            if let Ok(relative) = path.strip_prefix(dir) {
                files.insert(relative.to_path_buf(), content);
            }
        }

        let root_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project-root".to_string());
        let mut root = DirBuilder::default();
        for (path, content) in files {
            let segments: Vec<String> = path
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            root.insert(&segments, content);
        }
        Ok(root.build(root_name))
    }
}

fn collect_leaves<'a>(node: &'a VirtualFileNode, prefix: String, out: &mut Vec<(String, &'a str)>) {
    let path = if prefix.is_empty() {
        node.name().to_string()
    } else {
        format!("{prefix}/{}", node.name())
    };
    match node {
        VirtualFileNode::File { content, .. } => out.push((path, content)),
        VirtualFileNode::Folder { children, .. } => {
            for child in children {
                collect_leaves(child, path.clone(), out);
            }
        }
    }
}

fn packaged_path(path: &str, extension: &str) -> String {
    match path.strip_prefix(PAGES_FOLDER).and_then(|p| p.strip_prefix('/')) {
        Some(route) if !route.contains('/') && !route.contains('.') => {
            format!("{PAGES_FOLDER}/{route}/index.{extension}")
        }
        _ => path.to_string(),
    }
}

#[derive(Default)]
struct DirBuilder {
    dirs: BTreeMap<String, DirBuilder>,
    files: BTreeMap<String, String>,
}

impl DirBuilder {
    fn insert(&mut self, segments: &[String], content: String) {
        match segments {
            [] => {}
            [file] => {
                self.files.insert(file.clone(), content);
            }
            [dir, rest @ ..] => self.dirs.entry(dir.clone()).or_default().insert(rest, content),
        }
    }

    fn build(self, name: String) -> Option<VirtualFileNode> {
        let mut children: Vec<VirtualFileNode> = self
            .dirs
            .into_iter()
            .filter_map(|(dir, builder)| builder.build(dir))
            .collect();
        children.extend(
            self.files
                .into_iter()
                .map(|(file, content)| VirtualFileNode::file(file, content)),
        );
        VirtualFileNode::folder(name, children)
    }
}
