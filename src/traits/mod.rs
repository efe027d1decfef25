pub mod dataset;
pub mod renderer;
pub mod tool;

pub use crate::config::{DependencyGraph, ToolMap};
pub use dataset::DatasetReader;
pub use renderer::ReportRenderer;
pub use tool::{InputValue, Invocation, Tool, ToolKind, ToolOutcome};
