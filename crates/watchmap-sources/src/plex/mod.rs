pub mod api;
pub mod client;

pub use client::{PlexLibrarySource, parse_external_ids_from_guids};
