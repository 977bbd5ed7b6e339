//! Static asset constants (CSS and JavaScript).

/// Stylesheet for the web interface.
pub const CSS: &str = include_str!("styles.css");

/// htmx configuration and small page helpers.
pub const JS: &str = include_str!("scripts.js");
