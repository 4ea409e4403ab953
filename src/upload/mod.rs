//! Image upload: validation, thumbnailing and storage.

pub mod filename;
pub mod imaging;
pub mod service;

pub use filename::sanitize_filename;
pub use imaging::{ImageLimits, ProcessedImage, fit_within, format_for_mime, process_image, sniff_format};
pub use service::UploadService;
