pub mod dicom;
pub mod health;
pub mod jobs;
pub mod pages;
