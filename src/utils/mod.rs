//! Shared utility functions.

mod cancel;
mod format;
mod mime;

pub use cancel::CancelFlag;
pub use format::format_size;
pub use mime::{detect_mime, extension_of};
