//! Task and subprocess supervision for URL → file conversions.
//!
//! - [`paths`]: unique output/temp paths and extension inference
//! - [`parser`]: progress from the transcoder's diagnostic stream
//! - [`task`] / [`store`]: task state and the in-memory registry
//! - [`machine`]: the lifecycle reducer
//! - [`supervisor`]: process spawning, monitoring, finalize and cancel
//! - [`fallback`]: plain HTTP download when no transcoder is installed

pub mod fallback;
pub mod machine;
pub mod parser;
pub mod paths;
pub mod store;
pub mod supervisor;
pub mod task;

pub use machine::{Effect, TaskEvent};
pub use store::TaskStore;
pub use supervisor::{StartRequest, TranscodeSupervisor, Transcoder, detect_transcoder};
pub use task::{ProcessHandle, Task, TaskStatus};
