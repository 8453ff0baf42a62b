//! Organize pipeline services
//!
//! Leaf services (sanitizer, artist identity, transliteration, path
//! generation, tag extraction) are pure or file-local. The runners and the
//! romanization coordinator tie them to the state store.

pub mod artist_id;
pub mod assets;
pub mod directory_runner;
pub(crate) mod file_runner;
pub mod file_hasher;
pub mod file_scanner;
pub mod metadata_extractor;
pub mod musicbrainz_client;
pub mod path_generator;
pub mod processor;
pub mod quarantine;
pub mod restore;
pub mod romanization;
pub mod sanitizer;
pub mod transliteration;

pub use file_scanner::FileScanner;
pub use metadata_extractor::{LoftyTagReader, MetadataError, MetadataExtractor, TagReader};
pub use musicbrainz_client::{MBError, MusicBrainzClient, MusicBrainzConfig};
pub use path_generator::PathContext;
pub use processor::{MusicProcessor, ProcessorOptions};
pub use restore::{CollisionPolicy, RestoreOutcome, RestoreReport, RestoreRequest};
pub use romanization::{RomanizationCoordinator, RomanizationLookup, Romanized};
