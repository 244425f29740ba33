//! The built-in stage chain.

pub mod cdn;
pub mod component;
pub mod css;
pub mod strip_types;

pub use cdn::RemoteModuleStage;
pub use component::SourceCompilerStage;
pub use css::StyleExtractionStage;
pub use strip_types::TypeErasureStage;

use std::sync::Arc;
use url::Url;

use super::Plugin;
use crate::compiler::ComponentCompiler;
use crate::fetch::FetchCache;

/// Component compiler → style extraction → remote modules → type erasure.
#[must_use]
pub fn default_plugins(
    compiler: Arc<dyn ComponentCompiler>,
    component_extension: &str,
    registry: Url,
    fetch: &Arc<FetchCache>,
) -> Vec<Box<dyn Plugin>> {
    vec![
        Box::new(SourceCompilerStage::new(compiler, component_extension)),
        Box::new(StyleExtractionStage::new(Arc::clone(fetch))),
        Box::new(RemoteModuleStage::new(registry, Arc::clone(fetch))),
        Box::new(TypeErasureStage::new()),
    ]
}
