pub mod book;
pub mod job;
