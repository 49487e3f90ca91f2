mod common;

mod coordinator;
mod pipeline;
mod schedule;
