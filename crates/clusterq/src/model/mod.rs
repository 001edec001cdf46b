//! Domain records persisted in the store: jobs, nodes and processors.
//!
//! Records validate on construction and carry no persistence logic; all
//! reads and writes go through [`crate::store::QueueStore`].

mod job;
mod node;
mod processor;

pub use job::{Job, JobStatus, ResultMetadata};
pub use node::{Node, NodeStatus, UNASSIGNED_NODE};
pub use processor::{Processor, ProcessorStatus};
