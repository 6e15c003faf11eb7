pub mod manifest;
pub mod viewer;

pub use manifest::{classify_manifest, probe_manifest, AttachError};
pub use viewer::{ExternalViewer, StreamAttachment, ViewerConfig};
