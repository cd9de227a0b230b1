//! Turn-taking pipeline: segmentation, echo suppression, the playback queue
//! and the controller that ties them together.

pub mod coordinator;
pub mod echo_guard;
pub mod messages;
pub mod playback_queue;
pub mod segmenter;
