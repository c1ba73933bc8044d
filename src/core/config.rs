use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,

    // Dropped collections: wipe the renamed `deleted-<id>` directory too
    pub remove_on_drop: bool,

    // Defaults for newly manifested collections
    pub default_maximal_size: u64,
    pub default_wait_for_sync: bool,

    // Maintenance threads
    pub start_maintenance: bool,
    pub sync_interval: Duration,
    pub compaction_interval: Duration,
    pub cleanup_interval: Duration,
}

impl Config {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Config {
            database_path: database_path.into(),
            ..Config::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("./data"),
            remove_on_drop: true,
            default_maximal_size: 32 * 1024 * 1024,     // 32MB journal
            default_wait_for_sync: false,
            start_maintenance: true,
            sync_interval: Duration::from_millis(100),
            compaction_interval: Duration::from_secs(1),
            cleanup_interval: Duration::from_millis(50),
        }
    }
}
