//! Archive container readers and writers: `ar`, `dump`, and the ZIP/JAR
//! local-file-header scan. Each reader is a small state machine cycling
//! through `Idle -> HeaderPending -> EntryOpen -> EntryClosing -> Idle`
//! until the container signals end-of-archive.

mod ar;
mod dump;
mod entry;
mod zip;

pub use ar::{ArReader, ArWriter, LongNameMode};
pub use dump::DumpReader;
pub use entry::{ArchiveEntry, EntryKind};
pub use zip::{refine_zip_or_jar, ZipReader, ZipWriter, JAR_MARKER_TAG};
