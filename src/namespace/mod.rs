//! Namespace: name normalization, path resolution and listing.

pub mod listing;
pub mod names;
pub mod resolve;

pub use listing::NamespaceListing;
pub use names::{compatible_file_name, compatible_name};
pub use resolve::PathResolver;
