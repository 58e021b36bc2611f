pub mod types;
pub mod cli;
pub mod commands;
pub mod logging;

pub mod model;
pub mod ml;

pub use types::{default_dataset, DatasetEntry, LabelTable};
pub use commands::{predict_command, train_command, TrainReport, TrainingProgress};
