pub mod artifact;
pub mod gc;
pub mod narinfo;
pub mod upload;

pub use artifact::{ArtifactStore, Compression};
pub use gc::GcAgeSign;
pub use narinfo::NarinfoFields;
pub use upload::UploadRegistry;
