mod scheduler;
mod transfer;

pub use scheduler::{
    DownloadScheduler, DownloadValidator, SchedulerOptions, TEMP_SUFFIX, temp_path_for,
};
