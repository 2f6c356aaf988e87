//! stratus-label — label index and selector engine.
//!
//! Every resource record has one [`LabelInfo`] entry under
//! `/label/{type}/{uid}`, keyed by uid so it survives renames. The entry
//! merges a small system-reserved key set, caller-supplied labels, and
//! provider-native tags — with caller labels always winning on conflict.
//! Discovery goes through a six-clause selector grammar evaluated as a
//! conjunction, failing closed on anything it doesn't recognize.

pub mod error;
pub mod index;
pub mod selector;

pub use error::{LabelError, LabelResult};
pub use index::{LabelIndex, LabelInfo, syskeys};
pub use selector::matches_label_selector;
