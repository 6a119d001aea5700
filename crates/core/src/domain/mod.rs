pub mod agent;
pub mod calendar;
pub mod meeting;
pub mod task;
