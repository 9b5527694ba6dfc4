//! Scaffold: the deterministic half of the app generator.
//!
//! This library provides:
//! - The project data model and its field-scoped reducers
//! - A repair parser for quasi-JSON model output
//! - Sandboxed compilation and rendering of generated TSX components
//! - Project assembly into a virtual file tree, packaging and config discovery
//!
//! Nothing in this crate performs I/O against the generation service; the
//! async orchestration lives in the `appgen` crate.
//!
//! # Example
//!
//! ```no_run
//! use scaffold::{assemble, scan_required_config, Layout, ProjectState};
//!
//! # fn demo(state: &ProjectState) -> Result<(), scaffold::AssemblyError> {
//! let tree = assemble(state, &Layout::default())?;
//! for name in scan_required_config(&tree).iter() {
//!     println!("needs {name}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod config_scan;
pub mod deploy;
pub mod error;
pub mod layout;
pub mod model;
pub mod preview;
pub mod repair;
pub mod sandbox;
pub mod state;
pub mod tree;

pub use assembler::{assemble, AssemblerConfig, ProjectAssembler};
pub use config_scan::{scan_required_config, ConfigScanner, RequiredConfig};
pub use deploy::{ConfigEntry, DeployBundle};
pub use error::{AssemblyError, CompileFailure, DeployError, LayoutError, RenderError, RepairError};
pub use layout::{CanvasSize, ComponentInstance, Dimensions, Layout, LayoutEvent, Position};
pub use model::{
    ApiPlan, ApiSpec, ArtifactStatus, PagePlan, ProjectBrief, ProjectState, Schema, StylingPlan,
    UiComponent,
};
pub use preview::Preview;
pub use repair::{repair, repair_into};
pub use sandbox::{CompilationUnit, RenderableUnit, Rendered, SandboxConfig};
pub use state::{ArtifactRef, StateEvent};
pub use tree::{PackagedFile, VirtualFileNode};
