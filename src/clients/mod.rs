pub mod database;
pub mod rbmq;
