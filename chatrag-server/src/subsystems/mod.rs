pub mod attachments;
pub mod context;
pub mod ingest;
pub mod purge;
pub mod retrieve;
pub mod turn;
