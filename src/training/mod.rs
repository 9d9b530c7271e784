//! Training orchestration: run naming, schedulers, epoch bookkeeping

pub mod run;
pub mod scheduler;
pub mod trainer;

pub use run::{run_name, train, TrainOptions};
pub use scheduler::LrSchedule;
pub use trainer::{CsvLogger, EarlyStopping, EpochRecord};
