//! Change detection
//!
//! - `category`: selection and rendering of the tracked views
//! - `state`: fingerprints and the publish state
//! - `detector`: evaluation, dirty set and commit

pub mod category;
pub mod detector;
pub mod state;

pub use category::{builtin, Category, MissingLink, RenderContext, Unclaimed, Unreviewed};
pub use detector::{ChangeDetector, DirtyEntry, DirtySet, Evaluation, GroupSummary, Snapshot};
pub use state::{CategoryState, Fingerprint, PublishState};
