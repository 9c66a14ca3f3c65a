pub mod detector;
pub mod ingestor;
pub mod queue;
pub mod recommendations;
