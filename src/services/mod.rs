pub mod job_service;
pub mod jobs;
pub mod processor;
pub mod staging;
pub mod worker;
