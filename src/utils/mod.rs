//! Shared utility functions.
//!
//! - `format`: Human-readable formatting (sizes, dates)
//! - `mime`: Image content-type sniffing and extensions
//! - `redirect`: Open-redirect protection for `next` parameters
//! - `validate`: Form field normalization and validation helpers

mod format;
mod mime;
mod redirect;
mod validate;

pub use format::{format_date, format_size, format_timestamp};
pub use mime::{extension_for, sniff_image_type, SUPPORTED_IMAGE_TYPES};
pub use redirect::{is_safe_redirect, safe_redirect_or};
pub use validate::{clean, is_valid_email, require, FieldErrors};
