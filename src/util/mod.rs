//! Utility functions shared across the pipeline.
//!
//! - **Text**: feed text sanitization and terminal width helpers
//! - **URL validation**: checks applied to configured feeds and relays

mod text;
mod url_validator;

pub use text::{clean_text, display_width, strip_tags, truncate_to_width};
pub use url_validator::{validate_feed_url, validate_relay_template, UrlValidationError};
