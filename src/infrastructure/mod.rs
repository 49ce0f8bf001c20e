//! Infrastructure layer: filesystem implementations of domain boundaries

pub mod error_ext;
pub mod fs_source;

pub use error_ext::IoResultExt;
pub use fs_source::FsDefinitionRoot;
