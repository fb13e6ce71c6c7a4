pub mod analysis;
pub mod cursor;
pub mod delimited_text;
pub mod record;

pub use analysis::{FileAnalysis, FileStamp};
pub use cursor::FeatureCursor;
pub use delimited_text::{Capabilities, DelimitedTextProvider};
pub use record::{InvalidLine, InvalidReason, RecordLayout};
