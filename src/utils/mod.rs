pub mod archive;
pub mod command;
pub mod file;
pub mod runlog;
pub mod staging;
