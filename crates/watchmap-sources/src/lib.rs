pub mod traits;
pub mod plex;
pub mod error;

pub use traits::LibrarySource;
pub use error::SourceError;
pub use plex::{PlexLibrarySource, parse_external_ids_from_guids};
