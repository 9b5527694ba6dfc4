//! Component placements per page, as reported by the layout editor.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::LayoutError;

/// Size a freshly dropped component gets.
pub const DEFAULT_DIMENSIONS: Dimensions = Dimensions {
    width: 500.0,
    height: 300.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

impl Default for Dimensions {
    fn default() -> Self {
        DEFAULT_DIMENSIONS
    }
}

/// Canvas the editor measures positions against. Positions are converted
/// to viewport units relative to this size when pages are assembled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

impl Default for CanvasSize {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 800.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInstance {
    pub instance_id: String,
    pub component: String,
    pub position: Position,
    pub dimensions: Dimensions,
    /// Source regenerated for this instance only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_source: Option<String>,
}

impl ComponentInstance {
    pub fn new(component: impl Into<String>, position: Position) -> Self {
        Self {
            instance_id: uuid::Uuid::new_v4().to_string(),
            component: component.into(),
            position,
            dimensions: DEFAULT_DIMENSIONS,
            variant_source: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LayoutEvent {
    Place {
        page: String,
        instance: ComponentInstance,
    },
    Move {
        page: String,
        instance_id: String,
        position: Position,
    },
    Resize {
        page: String,
        instance_id: String,
        dimensions: Dimensions,
    },
    Remove {
        page: String,
        instance_id: String,
    },
    SetVariant {
        page: String,
        instance_id: String,
        source: Option<String>,
    },
}

/// Page name to ordered placements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub pages: IndexMap<String, Vec<ComponentInstance>>,
}

impl Layout {
    pub fn instances(&self, page: &str) -> &[ComponentInstance] {
        self.pages.get(page).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn apply(&mut self, event: LayoutEvent) -> Result<(), LayoutError> {
        match event {
            LayoutEvent::Place { page, instance } => {
                let placed = self.pages.entry(page.clone()).or_default();
                if placed.iter().any(|i| i.instance_id == instance.instance_id) {
                    return Err(LayoutError::DuplicateInstance {
                        page,
                        instance_id: instance.instance_id,
                    });
                }
                placed.push(instance);
            }
            LayoutEvent::Move {
                page,
                instance_id,
                position,
            } => self.instance_mut(&page, &instance_id)?.position = position,
            LayoutEvent::Resize {
                page,
                instance_id,
                dimensions,
            } => self.instance_mut(&page, &instance_id)?.dimensions = dimensions,
            LayoutEvent::SetVariant {
                page,
                instance_id,
                source,
            } => self.instance_mut(&page, &instance_id)?.variant_source = source,
            LayoutEvent::Remove { page, instance_id } => {
                let placed = self.pages.get_mut(&page);
                let index = placed
                    .as_ref()
                    .and_then(|p| p.iter().position(|i| i.instance_id == instance_id));
                match (placed, index) {
                    (Some(placed), Some(index)) => {
                        placed.remove(index);
                    }
                    _ => return Err(LayoutError::UnknownInstance { page, instance_id }),
                }
            }
        }
        Ok(())
    }

    /// Drop every placement of `component`, e.g. after the user deletes it.
    pub fn remove_component(&mut self, component: &str) {
        for placed in self.pages.values_mut() {
            placed.retain(|i| i.component != component);
        }
    }

    fn instance_mut(
        &mut self,
        page: &str,
        instance_id: &str,
    ) -> Result<&mut ComponentInstance, LayoutError> {
        self.pages
            .get_mut(page)
            .and_then(|p| p.iter_mut().find(|i| i.instance_id == instance_id))
            .ok_or_else(|| LayoutError::UnknownInstance {
                page: page.to_string(),
                instance_id: instance_id.to_string(),
            })
    }
}

/// Placements for a page nobody arranged: each component stacked below the
/// previous one at the default size.
pub fn default_stack(page: &str, components: &[String]) -> Vec<ComponentInstance> {
    components
        .iter()
        .enumerate()
        .map(|(i, component)| ComponentInstance {
            instance_id: format!("{page}-{i}"),
            component: component.clone(),
            position: Position {
                x: 0.0,
                y: i as f64 * DEFAULT_DIMENSIONS.height,
            },
            dimensions: DEFAULT_DIMENSIONS,
            variant_source: None,
        })
        .collect()
}
