pub mod jobs;

pub use jobs::{JobClient, JobError, JobObserver};
