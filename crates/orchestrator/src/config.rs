//! Factory configuration.
//!
//! Every field has a serde default so a partial TOML file (or none at all)
//! yields a runnable factory.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use industry_core::{Error, Operation, Position, Result};

/// Top-level configuration for one factory run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactoryConfig {
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub robots: RobotConfig,
    #[serde(default)]
    pub cells: CellConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub orders: OrderConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
}

impl FactoryConfig {
    /// Parse a TOML document and validate it.
    ///
    /// # Errors
    ///
    /// `TomlParseFailed` for bad TOML, `InvalidConfig` when validation fails.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::toml_parse_failed(e.to_string()))?;
        config.validate().map_err(Error::invalid_config)?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    ///
    /// `FileReadFailed` when the file cannot be read, otherwise as
    /// [`FactoryConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the value cannot be represented in TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::invalid_config(e.to_string()))
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.timing.validate()?;
        self.robots.validate()?;
        self.cells.validate()?;
        self.orders.validate()?;

        if self.orders.max_tr_count > self.robots.count {
            return Err(format!(
                "orders.max_tr_count ({}) exceeds robots.count ({}); such stages could never be carried",
                self.orders.max_tr_count, self.robots.count
            ));
        }
        Ok(())
    }
}

/// Durations and periods, all in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Processing time per operation name; missing operations use the default.
    #[serde(default = "default_operation_durations")]
    pub operation_durations_ms: BTreeMap<String, u64>,

    #[serde(default = "default_operation_ms")]
    pub default_operation_ms: u64,

    /// Movement integration period.
    #[serde(default = "default_movement_tick_ms")]
    pub movement_tick_ms: u64,

    /// Robot decision loop period.
    #[serde(default = "default_decision_period_ms")]
    pub decision_period_ms: u64,

    /// Scheduler dispatch poll interval.
    #[serde(default = "default_scheduler_poll_ms")]
    pub scheduler_poll_ms: u64,

    /// How long an agent may go without mail before it logs and re-polls.
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,

    /// Roster snapshot telemetry period.
    #[serde(default = "default_snapshot_ms")]
    pub roster_snapshot_ms: u64,

    /// Delay before a work-cell asks the next robot after a refusal.
    #[serde(default = "default_transport_retry_ms")]
    pub transport_retry_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            operation_durations_ms: default_operation_durations(),
            default_operation_ms: default_operation_ms(),
            movement_tick_ms: default_movement_tick_ms(),
            decision_period_ms: default_decision_period_ms(),
            scheduler_poll_ms: default_scheduler_poll_ms(),
            receive_timeout_ms: default_receive_timeout_ms(),
            roster_snapshot_ms: default_snapshot_ms(),
            transport_retry_ms: default_transport_retry_ms(),
        }
    }
}

impl TimingConfig {
    /// Processing duration for `operation`.
    #[must_use]
    pub fn operation_duration(&self, operation: Operation) -> Duration {
        let ms = self
            .operation_durations_ms
            .get(operation.as_str())
            .copied()
            .unwrap_or(self.default_operation_ms);
        Duration::from_millis(ms)
    }

    /// Resolved per-operation duration table.
    #[must_use]
    pub fn duration_table(&self) -> BTreeMap<Operation, Duration> {
        Operation::ALL
            .iter()
            .map(|op| (*op, self.operation_duration(*op)))
            .collect()
    }

    #[must_use]
    pub const fn movement_tick(&self) -> Duration {
        Duration::from_millis(self.movement_tick_ms)
    }

    #[must_use]
    pub const fn decision_period(&self) -> Duration {
        Duration::from_millis(self.decision_period_ms)
    }

    #[must_use]
    pub const fn scheduler_poll(&self) -> Duration {
        Duration::from_millis(self.scheduler_poll_ms)
    }

    #[must_use]
    pub const fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    #[must_use]
    pub const fn roster_snapshot(&self) -> Duration {
        Duration::from_millis(self.roster_snapshot_ms)
    }

    #[must_use]
    pub const fn transport_retry(&self) -> Duration {
        Duration::from_millis(self.transport_retry_ms)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        for name in self.operation_durations_ms.keys() {
            Operation::from_str(name).map_err(|e| format!("timing.operation_durations_ms: {e}"))?;
        }
        let periods = [
            ("movement_tick_ms", self.movement_tick_ms),
            ("decision_period_ms", self.decision_period_ms),
            ("scheduler_poll_ms", self.scheduler_poll_ms),
            ("receive_timeout_ms", self.receive_timeout_ms),
            ("roster_snapshot_ms", self.roster_snapshot_ms),
        ];
        match periods.iter().find(|(_, ms)| *ms == 0) {
            Some((name, _)) => Err(format!("timing.{name} must be greater than 0")),
            None => Ok(()),
        }
    }
}

/// When a robot agrees to help a leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Willingness {
    /// Agree to every recruitment request.
    Always,
    /// Agree only while idle with no other helping commitment.
    #[default]
    WhenFree,
}

/// Transport robot fleet settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotConfig {
    #[serde(default = "default_robot_count")]
    pub count: usize,

    /// Floor units per second.
    #[serde(default = "default_speed")]
    pub speed: f64,

    #[serde(default)]
    pub willingness: Willingness,

    /// Broadcast rounds a leader attempts before giving up.
    #[serde(default = "default_max_recruit_rounds")]
    pub max_recruit_rounds: u32,

    #[serde(default = "default_recruit_interval_ms")]
    pub recruit_interval_ms: u64,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            count: default_robot_count(),
            speed: default_speed(),
            willingness: Willingness::default(),
            max_recruit_rounds: default_max_recruit_rounds(),
            recruit_interval_ms: default_recruit_interval_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl RobotConfig {
    #[must_use]
    pub const fn recruit_interval(&self) -> Duration {
        Duration::from_millis(self.recruit_interval_ms)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.count == 0 {
            return Err("robots.count must be greater than 0".to_string());
        }
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err("robots.speed must be a positive number".to_string());
        }
        if self.max_recruit_rounds == 0 {
            return Err("robots.max_recruit_rounds must be greater than 0".to_string());
        }
        if self.recruit_interval_ms == 0 {
            return Err("robots.recruit_interval_ms must be greater than 0".to_string());
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err("robots.backoff_base_ms must not exceed robots.backoff_max_ms".to_string());
        }
        Ok(())
    }
}

/// Work-cell settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellConfig {
    #[serde(default = "default_cell_count")]
    pub count: usize,

    /// Explicit machine sets per cell (operation names); cells beyond the
    /// list get a generated set.
    #[serde(default)]
    pub machines: Vec<Vec<String>>,

    /// Size of each generated machine set.
    #[serde(default = "default_machines_per_cell")]
    pub machines_per_cell: usize,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            count: default_cell_count(),
            machines: Vec::new(),
            machines_per_cell: default_machines_per_cell(),
        }
    }
}

impl CellConfig {
    /// Machine operations for the zero-based cell `index`.
    ///
    /// Generated sets walk the operation list so that consecutive cells
    /// cover consecutive operations.
    ///
    /// # Errors
    ///
    /// `UnknownOperation` for a bad explicit operation name.
    pub fn machines_for(&self, index: usize) -> Result<Vec<Operation>> {
        match self.machines.get(index) {
            Some(names) => names.iter().map(|n| Operation::from_str(n)).collect(),
            None => {
                let all = Operation::ALL.len();
                let start = index.saturating_mul(self.machines_per_cell);
                Ok((0..self.machines_per_cell)
                    .map(|k| Operation::ALL[start.saturating_add(k) % all])
                    .collect())
            }
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.count == 0 {
            return Err("cells.count must be greater than 0".to_string());
        }
        if self.machines.is_empty() && self.machines_per_cell == 0 {
            return Err("cells.machines_per_cell must be greater than 0".to_string());
        }
        for index in 0..self.count {
            self.machines_for(index)
                .map_err(|e| format!("cells.machines[{index}]: {e}"))?;
        }
        Ok(())
    }
}

/// Which end of the priority scale is served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityOrder {
    /// Smallest priority value first ("0 is max").
    #[default]
    LowestFirst,
    HighestFirst,
}

/// Scheduler dispatch policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub priority_order: PriorityOrder,

    /// Only dispatch to cells able to perform the order's next operation.
    #[serde(default = "default_true")]
    pub capability_filter: bool,

    /// Return a refusing cell to the idle set on the next poll tick.
    #[serde(default = "default_true")]
    pub restore_refused_cells: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            priority_order: PriorityOrder::default(),
            capability_filter: true,
            restore_refused_cells: true,
        }
    }
}

impl DispatchConfig {
    /// The unfiltered, non-restoring policy.
    #[must_use]
    pub fn reference() -> Self {
        Self {
            priority_order: PriorityOrder::LowestFirst,
            capability_filter: false,
            restore_refused_cells: false,
        }
    }
}

/// Order source settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfig {
    #[serde(default = "default_order_period_ms")]
    pub period_ms: u64,

    #[serde(default = "default_operations_per_order")]
    pub operations_per_order: usize,

    /// Upper bound for the random per-stage robot count.
    #[serde(default = "default_max_tr_count")]
    pub max_tr_count: usize,

    #[serde(default = "default_order_priority")]
    pub priority: i32,

    /// Stop emitting after this many orders.
    #[serde(default)]
    pub limit: Option<u64>,

    /// Restrict generated operations to ones some cell can perform.
    #[serde(default = "default_true")]
    pub only_serviceable: bool,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            period_ms: default_order_period_ms(),
            operations_per_order: default_operations_per_order(),
            max_tr_count: default_max_tr_count(),
            priority: default_order_priority(),
            limit: None,
            only_serviceable: true,
        }
    }
}

impl OrderConfig {
    #[must_use]
    pub const fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.period_ms == 0 {
            return Err("orders.period_ms must be greater than 0".to_string());
        }
        if self.operations_per_order == 0 {
            return Err("orders.operations_per_order must be greater than 0".to_string());
        }
        if self.max_tr_count == 0 {
            return Err("orders.max_tr_count must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Floor geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_warehouse")]
    pub warehouse: Position,

    /// Cells per grid column.
    #[serde(default = "default_per_column")]
    pub per_column: usize,

    #[serde(default = "default_column_spacing")]
    pub column_spacing: f64,

    #[serde(default = "default_row_spacing")]
    pub row_spacing: f64,

    /// Standard deviation of robot start positions around their cell.
    #[serde(default = "default_spray")]
    pub spray: f64,

    /// Seed for layout, cell choice and order generation.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            warehouse: default_warehouse(),
            per_column: default_per_column(),
            column_spacing: default_column_spacing(),
            row_spacing: default_row_spacing(),
            spray: default_spray(),
            seed: None,
        }
    }
}

fn default_operation_durations() -> BTreeMap<String, u64> {
    BTreeMap::from([
        (Operation::Drill.as_str().to_string(), 1000),
        (Operation::Mill.as_str().to_string(), 1500),
    ])
}

const fn default_operation_ms() -> u64 {
    1000
}

const fn default_movement_tick_ms() -> u64 {
    100
}

const fn default_decision_period_ms() -> u64 {
    100
}

const fn default_scheduler_poll_ms() -> u64 {
    10_000
}

const fn default_receive_timeout_ms() -> u64 {
    600_000
}

const fn default_snapshot_ms() -> u64 {
    1000
}

const fn default_transport_retry_ms() -> u64 {
    500
}

const fn default_robot_count() -> usize {
    12
}

const fn default_speed() -> f64 {
    50.0
}

const fn default_max_recruit_rounds() -> u32 {
    20
}

const fn default_recruit_interval_ms() -> u64 {
    500
}

const fn default_backoff_base_ms() -> u64 {
    200
}

const fn default_backoff_max_ms() -> u64 {
    5000
}

const fn default_cell_count() -> usize {
    12
}

const fn default_machines_per_cell() -> usize {
    2
}

const fn default_true() -> bool {
    true
}

const fn default_order_period_ms() -> u64 {
    10_000
}

const fn default_operations_per_order() -> usize {
    4
}

const fn default_max_tr_count() -> usize {
    3
}

const fn default_order_priority() -> i32 {
    1
}

const fn default_warehouse() -> Position {
    Position::new(-128.0, 0.0)
}

const fn default_per_column() -> usize {
    5
}

const fn default_column_spacing() -> f64 {
    64.0
}

const fn default_row_spacing() -> f64 {
    48.0
}

const fn default_spray() -> f64 {
    10.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn should_validate_defaults() {
        assert!(FactoryConfig::default().validate().is_ok());
    }

    #[test]
    fn should_use_operation_duration_table() {
        let timing = TimingConfig::default();
        assert_eq!(
            timing.operation_duration(Operation::Drill),
            Duration::from_millis(1000)
        );
        assert_eq!(
            timing.operation_duration(Operation::Mill),
            Duration::from_millis(1500)
        );
        assert_eq!(
            timing.operation_duration(Operation::Grind),
            Duration::from_millis(1000)
        );
        assert_eq!(timing.duration_table().len(), Operation::ALL.len());
    }

    #[test]
    fn should_fill_missing_sections_with_defaults() {
        let config = FactoryConfig::from_toml_str(
            r#"
            [robots]
            count = 4
            willingness = "always"

            [dispatch]
            priority_order = "highest_first"
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(config.robots.count, 4);
        assert_eq!(config.robots.willingness, Willingness::Always);
        assert_eq!(config.dispatch.priority_order, PriorityOrder::HighestFirst);
        assert!(config.dispatch.capability_filter);
        assert_eq!(config.cells.count, 12);
        assert_eq!(config.timing.scheduler_poll_ms, 10_000);
    }

    #[test]
    fn should_reject_unknown_operation_duration() {
        let result = FactoryConfig::from_toml_str(
            r"
            [timing.operation_durations_ms]
            WELD = 300
            ",
        );
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn should_reject_zero_speed() {
        let mut config = FactoryConfig::default();
        config.robots.speed = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_tr_count_larger_than_fleet() {
        let mut config = FactoryConfig::default();
        config.robots.count = 2;
        config.orders.max_tr_count = 3;
        let err = config.validate().expect_err("fleet too small");
        assert!(err.contains("max_tr_count"));
    }

    #[test]
    fn should_report_bad_toml() {
        let result = FactoryConfig::from_toml_str("[robots\ncount = ");
        assert!(matches!(result, Err(Error::TomlParseFailed { .. })));
    }

    #[test]
    fn should_generate_machine_sets_covering_all_operations() {
        let cells = CellConfig::default();
        let covered: std::collections::BTreeSet<Operation> = (0..cells.count)
            .flat_map(|i| cells.machines_for(i).unwrap())
            .collect();
        assert_eq!(covered.len(), Operation::ALL.len());
    }

    #[test]
    fn should_prefer_explicit_machine_sets() {
        let cells = CellConfig {
            count: 2,
            machines: vec![vec!["drill".to_string(), "MILL".to_string()]],
            machines_per_cell: 1,
        };
        assert_eq!(
            cells.machines_for(0).unwrap(),
            vec![Operation::Drill, Operation::Mill]
        );
        assert_eq!(cells.machines_for(1).unwrap().len(), 1);
    }

    #[test]
    fn should_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cells]\ncount = 3\n\n[orders]\nlimit = 5").unwrap();

        let config = FactoryConfig::load(file.path()).unwrap();
        assert_eq!(config.cells.count, 3);
        assert_eq!(config.orders.limit, Some(5));
    }

    #[test]
    fn should_report_missing_file() {
        let result = FactoryConfig::load("/definitely/not/here.toml");
        assert!(matches!(result, Err(Error::FileReadFailed { .. })));
    }

    #[test]
    fn should_render_defaults_as_parseable_toml() {
        let text = FactoryConfig::default().to_toml_string().unwrap();
        let parsed = FactoryConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, FactoryConfig::default());
    }
}
