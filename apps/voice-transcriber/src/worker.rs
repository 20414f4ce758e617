mod job_worker;
mod queue;

pub use job_worker::{start_worker, Worker, WorkerStats};
pub use queue::{JobQueue, JobReceiver, JobSender, TryEnqueueError};
