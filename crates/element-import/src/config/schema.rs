use serde::{Deserialize, Serialize};

/// Largest batch accepted by `start_import`.
pub const MAX_BATCH_SIZE: usize = 50;
/// Largest decode-ahead window accepted by `start_import`.
pub const MAX_CONCURRENT_BATCHES: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default)]
    pub import: ImportSettings,
    #[serde(default)]
    pub hierarchy: HierarchySettings,
    #[serde(default)]
    pub workbook: WorkbookSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            database_url: default_database_url(),
            import: ImportSettings::default(),
            hierarchy: HierarchySettings::default(),
            workbook: WorkbookSettings::default(),
        }
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

/// Returns `sqlite://~/.element-import/data/import.db?mode=rwc`, or a file in
/// the working directory when no home directory is known.
pub fn default_database_url() -> String {
    match dirs::home_dir() {
        Some(home) => format!(
            "sqlite://{}?mode=rwc",
            home.join(".element-import")
                .join("data")
                .join("import.db")
                .display()
        ),
        None => "sqlite://element-import.db?mode=rwc".to_string(),
    }
}

/// Tunables for the import driver, its observers and the rollback flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Number of decoded batches buffered ahead of the persister.
    #[serde(default = "default_concurrent_batches")]
    pub concurrent_batches: usize,
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,
    /// Termination monitor cadence, 25–50 ms.
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    /// Delay before a force-cancel re-checks whether the job stopped.
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
    /// How long a rollback waits for the cancelled worker to drain.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    /// Value of `rollback_enabled` on newly created job rows.
    #[serde(default)]
    pub rollback_enabled_by_default: bool,
    #[serde(default = "default_pending_window_minutes")]
    pub pending_window_minutes: i64,
    /// Row errors kept in the job row's error column.
    #[serde(default = "default_max_recorded_errors")]
    pub max_recorded_errors: usize,
    /// Largest quantity accepted in one hierarchy cell.
    #[serde(default = "default_max_cell_quantity")]
    pub max_cell_quantity: i32,
}

fn default_batch_size() -> usize {
    30
}

fn default_concurrent_batches() -> usize {
    15
}

fn default_progress_interval_secs() -> u64 {
    5
}

fn default_monitor_interval_ms() -> u64 {
    40
}

fn default_cancel_grace_ms() -> u64 {
    500
}

fn default_drain_timeout_secs() -> u64 {
    30
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_pending_window_minutes() -> i64 {
    30
}

fn default_max_recorded_errors() -> usize {
    50
}

fn default_max_cell_quantity() -> i32 {
    10_000
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrent_batches: default_concurrent_batches(),
            progress_interval_secs: default_progress_interval_secs(),
            monitor_interval_ms: default_monitor_interval_ms(),
            cancel_grace_ms: default_cancel_grace_ms(),
            drain_timeout_secs: default_drain_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            rollback_enabled_by_default: false,
            pending_window_minutes: default_pending_window_minutes(),
            max_recorded_errors: default_max_recorded_errors(),
            max_cell_quantity: default_max_cell_quantity(),
        }
    }
}

/// Alias groups bridging legacy hierarchy prefixes. The first entry of each
/// group is the canonical spelling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchySettings {
    #[serde(default = "default_aliases")]
    pub aliases: Vec<Vec<String>>,
}

fn default_aliases() -> Vec<Vec<String>> {
    vec![
        vec!["tower_".to_string(), "tawor_".to_string(), "km_".to_string()],
        vec!["floor_".to_string(), "kmfloor_".to_string()],
    ]
}

impl Default for HierarchySettings {
    fn default() -> Self {
        Self {
            aliases: default_aliases(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkbookSettings {
    #[serde(default = "default_element_sheet")]
    pub element_sheet: String,
    #[serde(default = "default_summary_sheet")]
    pub summary_sheet: String,
    /// 1-based row where data starts (after headers and the sample row).
    #[serde(default = "default_data_start_row")]
    pub data_start_row: usize,
}

fn default_element_sheet() -> String {
    "Element Types".to_string()
}

fn default_summary_sheet() -> String {
    "Summary".to_string()
}

fn default_data_start_row() -> usize {
    4
}

impl Default for WorkbookSettings {
    fn default() -> Self {
        Self {
            element_sheet: default_element_sheet(),
            summary_sheet: default_summary_sheet(),
            data_start_row: default_data_start_row(),
        }
    }
}
