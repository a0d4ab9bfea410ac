//! The Concurrency Fabric (spec §4.6): segment data model, bounded
//! inter-stage queues, segment tracking, queue-depth monitoring, adaptive
//! draft scheduling, the output sink, and the orchestrator that wires them
//! into a running pipeline.

pub mod draft_controller;
pub mod monitor;
pub mod orchestrator;
pub mod output;
pub mod queue;
pub mod segment;
pub mod tracker;

pub use draft_controller::{AdaptiveDraftController, DraftControllerStats, SimpleDraftController, SkipReason as DraftSkipReason};
pub use monitor::{AlertLevel, QueueAlert, QueueMonitor};
pub use orchestrator::{Pipeline, PipelineHandles, ShutdownReport};
pub use output::{CollectingSink, OutputRecord, OutputSink};
pub use queue::{BoundedQueue, PutError};
pub use segment::{DropReason, PipelineSegment, PipelineStage, SpeechSegment};
pub use tracker::{SegmentTrace, SegmentTracker, TrackerStats};
