//! Small shared helpers.

pub mod human_format;

pub use human_format::format_size;
