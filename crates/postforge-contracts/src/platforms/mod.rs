mod registry;
mod target;

pub use registry::{generic_fields, GenericField, PlatformRegistry, RenderKey, RenderSpec};
pub use target::{canonical_format, canonical_platform, PlatformTarget, TypeFilter};
