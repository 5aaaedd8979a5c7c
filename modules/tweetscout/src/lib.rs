pub mod cancel;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod geocoder;
pub mod job_log;
pub mod pipeline;
pub mod registry;
pub mod storage;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod writer;

pub use cancel::CancelFlag;
pub use pipeline::{JobSpec, Pipeline, PipelineDeps, PipelineSettings};
pub use registry::JobRegistry;
