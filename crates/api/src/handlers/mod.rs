pub mod agent;
pub mod generation;
pub mod jobs;
