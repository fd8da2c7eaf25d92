//! Runtime configuration: one nested JSON document resolved field-by-field
//! against built-in defaults into an immutable `PursuitConfig`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config is not valid json: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigIssueKind {
    Missing,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub path: String,
    pub kind: ConfigIssueKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureFlags {
    pub roleplay_enabled: bool,
    pub money_per_minute_enabled: bool,
    pub cool_message_enabled: bool,
    pub speeding_bonus_enabled: bool,
    pub zigzag_bonus_enabled: bool,
    pub police_features_enabled: bool,
}

impl FeatureFlags {
    pub fn speeding_active(&self) -> bool {
        self.roleplay_enabled && self.speeding_bonus_enabled
    }

    pub fn zigzag_active(&self) -> bool {
        self.roleplay_enabled && self.zigzag_bonus_enabled
    }

    pub fn police_active(&self) -> bool {
        self.roleplay_enabled && self.police_features_enabled
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            roleplay_enabled: true,
            money_per_minute_enabled: true,
            cool_message_enabled: true,
            speeding_bonus_enabled: true,
            zigzag_bonus_enabled: true,
            police_features_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    pub autosave_interval_ms: u64,
    pub combined_tick_interval_ms: u64,
    pub role_check_interval_ms: u64,
    /// Threads used for the pursuer/target spatial join; 1 keeps it sequential.
    pub worker_threads: u64,
    pub cool_messages: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            autosave_interval_ms: 120_000,
            combined_tick_interval_ms: 1_000,
            role_check_interval_ms: 5_000,
            worker_threads: 1,
            cool_messages: default_cool_messages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoneyConfig {
    pub money_per_minute_interval_ms: u64,
    pub money_per_minute_amount: u64,
    pub starting_money: u64,
    pub cool_message_interval_ms: u64,
}

impl Default for MoneyConfig {
    fn default() -> Self {
        Self {
            money_per_minute_interval_ms: 60_000,
            money_per_minute_amount: 10,
            starting_money: 3_333,
            cool_message_interval_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CivilianConfig {
    pub speeding_limit_kmh: u64,
    pub speeding_bonus_duration_ms: u64,
    pub speeding_cooldown_ms: u64,
    pub speeding_bonus_per_second: u64,
    pub zigzag_bonus_duration_ms: u64,
    pub zigzag_cooldown_ms: u64,
    /// Flat bonus credited when a wanted episode runs out without a capture.
    pub zigzag_final_bonus_amount: u64,
    /// Per-second accrual rate of a zigzag episode.
    pub zigzag_prorated_bonus: u64,
    pub min_speed_kmh_for_zigzag: u64,
    pub zigzag_min_turns: u64,
    pub zigzag_min_angle_deg: u64,
    pub wanted_fail_penalty: u64,
}

impl Default for CivilianConfig {
    fn default() -> Self {
        Self {
            speeding_limit_kmh: 100,
            speeding_bonus_duration_ms: 60_000,
            speeding_cooldown_ms: 200_000,
            speeding_bonus_per_second: 1,
            zigzag_bonus_duration_ms: 120_000,
            zigzag_cooldown_ms: 200_000,
            zigzag_final_bonus_amount: 50,
            zigzag_prorated_bonus: 5,
            min_speed_kmh_for_zigzag: 10,
            zigzag_min_turns: 5,
            zigzag_min_angle_deg: 15,
            wanted_fail_penalty: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoliceConfig {
    pub police_proximity_range_m: u64,
    pub busted_range_m: u64,
    pub busted_stop_time_ms: u64,
    pub busted_speed_limit_kmh: u64,
    pub police_bonus_per_second: u64,
    pub bust_bonus_amount: u64,
    pub pursuer_liveries: Vec<String>,
}

impl Default for PoliceConfig {
    fn default() -> Self {
        Self {
            police_proximity_range_m: 150,
            busted_range_m: 20,
            busted_stop_time_ms: 7_000,
            busted_speed_limit_kmh: 5,
            police_bonus_per_second: 2,
            bust_bonus_amount: 100,
            pursuer_liveries: default_pursuer_liveries(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PursuitConfig {
    pub features: FeatureFlags,
    pub general: GeneralConfig,
    pub money: MoneyConfig,
    pub civilian: CivilianConfig,
    pub police: PoliceConfig,
}

impl PursuitConfig {
    /// Resolves a raw document. Every missing or invalid field falls back to
    /// its default and is reported as an issue; resolution never fails.
    pub fn resolve(document: &Value) -> (Self, Vec<ConfigIssue>) {
        let defaults = Self::default();
        let mut issues = Vec::new();
        let root = document.as_object();
        if root.is_none() {
            issues.push(ConfigIssue {
                path: "$".to_string(),
                kind: ConfigIssueKind::Invalid,
            });
        }

        let mut features = Section::open(root, "features", &mut issues);
        let d = &defaults.features;
        let features_cfg = FeatureFlags {
            roleplay_enabled: features.flag("roleplay_enabled", d.roleplay_enabled),
            money_per_minute_enabled: features
                .flag("money_per_minute_enabled", d.money_per_minute_enabled),
            cool_message_enabled: features.flag("cool_message_enabled", d.cool_message_enabled),
            speeding_bonus_enabled: features
                .flag("speeding_bonus_enabled", d.speeding_bonus_enabled),
            zigzag_bonus_enabled: features.flag("zigzag_bonus_enabled", d.zigzag_bonus_enabled),
            police_features_enabled: features
                .flag("police_features_enabled", d.police_features_enabled),
        };

        let mut general = Section::open(root, "general", &mut issues);
        let d = &defaults.general;
        let general_cfg = GeneralConfig {
            autosave_interval_ms: general.positive("autosave_interval_ms", d.autosave_interval_ms),
            combined_tick_interval_ms: general
                .positive("combined_tick_interval_ms", d.combined_tick_interval_ms),
            role_check_interval_ms: general
                .positive("role_check_interval_ms", d.role_check_interval_ms),
            worker_threads: general.positive("worker_threads", d.worker_threads),
            cool_messages: general.strings("cool_messages", &d.cool_messages),
        };

        let mut money = Section::open(root, "money", &mut issues);
        let d = &defaults.money;
        let money_cfg = MoneyConfig {
            money_per_minute_interval_ms: money
                .positive("money_per_minute_interval_ms", d.money_per_minute_interval_ms),
            money_per_minute_amount: money
                .uint("money_per_minute_amount", d.money_per_minute_amount),
            starting_money: money.uint("starting_money", d.starting_money),
            cool_message_interval_ms: money
                .positive("cool_message_interval_ms", d.cool_message_interval_ms),
        };

        let mut civilian = Section::open(root, "civilian", &mut issues);
        let d = &defaults.civilian;
        let civilian_cfg = CivilianConfig {
            speeding_limit_kmh: civilian.uint("speeding_limit_kmh", d.speeding_limit_kmh),
            speeding_bonus_duration_ms: civilian
                .uint("speeding_bonus_duration_ms", d.speeding_bonus_duration_ms),
            speeding_cooldown_ms: civilian.uint("speeding_cooldown_ms", d.speeding_cooldown_ms),
            speeding_bonus_per_second: civilian
                .uint("speeding_bonus_per_second", d.speeding_bonus_per_second),
            zigzag_bonus_duration_ms: civilian
                .uint("zigzag_bonus_duration_ms", d.zigzag_bonus_duration_ms),
            zigzag_cooldown_ms: civilian.uint("zigzag_cooldown_ms", d.zigzag_cooldown_ms),
            zigzag_final_bonus_amount: civilian
                .uint("zigzag_final_bonus_amount", d.zigzag_final_bonus_amount),
            zigzag_prorated_bonus: civilian.uint("zigzag_prorated_bonus", d.zigzag_prorated_bonus),
            min_speed_kmh_for_zigzag: civilian
                .uint("min_speed_kmh_for_zigzag", d.min_speed_kmh_for_zigzag),
            zigzag_min_turns: civilian.positive("zigzag_min_turns", d.zigzag_min_turns),
            zigzag_min_angle_deg: civilian.uint("zigzag_min_angle_deg", d.zigzag_min_angle_deg),
            wanted_fail_penalty: civilian.uint("wanted_fail_penalty", d.wanted_fail_penalty),
        };

        let mut police = Section::open(root, "police", &mut issues);
        let d = &defaults.police;
        let police_cfg = PoliceConfig {
            police_proximity_range_m: police
                .uint("police_proximity_range_m", d.police_proximity_range_m),
            busted_range_m: police.uint("busted_range_m", d.busted_range_m),
            busted_stop_time_ms: police.uint("busted_stop_time_ms", d.busted_stop_time_ms),
            busted_speed_limit_kmh: police.uint("busted_speed_limit_kmh", d.busted_speed_limit_kmh),
            police_bonus_per_second: police
                .uint("police_bonus_per_second", d.police_bonus_per_second),
            bust_bonus_amount: police.uint("bust_bonus_amount", d.bust_bonus_amount),
            pursuer_liveries: police.strings("pursuer_liveries", &d.pursuer_liveries),
        };

        let config = Self {
            features: features_cfg,
            general: general_cfg,
            money: money_cfg,
            civilian: civilian_cfg,
            police: police_cfg,
        };
        (config, issues)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<(Self, Vec<ConfigIssue>), ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document = serde_json::from_str::<Value>(&raw)?;
        Ok(Self::resolve(&document))
    }

    /// Loads the document at `path`, logging every fallback. A missing or
    /// unreadable document yields the all-defaults configuration.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok((config, issues)) => {
                for issue in &issues {
                    match issue.kind {
                        ConfigIssueKind::Missing => {
                            debug!(field = %issue.path, "config field missing, using default")
                        }
                        ConfigIssueKind::Invalid => {
                            warn!(field = %issue.path, "config field invalid, using default")
                        }
                    }
                }
                config
            }
            Err(err) => {
                warn!(error = %err, path = %path.as_ref().display(), "config unavailable, using defaults");
                Self::default()
            }
        }
    }
}

fn default_cool_messages() -> Vec<String> {
    ["tip_speeding", "tip_zigzag", "tip_police", "tip_busted"]
        .iter()
        .map(|key| key.to_string())
        .collect()
}

fn default_pursuer_liveries() -> Vec<String> {
    ["police", "police_interceptor", "highway_patrol", "sheriff"]
        .iter()
        .map(|key| key.to_string())
        .collect()
}

struct Section<'a> {
    name: &'static str,
    fields: Option<&'a Map<String, Value>>,
    issues: &'a mut Vec<ConfigIssue>,
}

impl<'a> Section<'a> {
    fn open(
        root: Option<&'a Map<String, Value>>,
        name: &'static str,
        issues: &'a mut Vec<ConfigIssue>,
    ) -> Self {
        let fields = match root.and_then(|map| map.get(name)) {
            Some(Value::Object(fields)) => Some(fields),
            Some(_) => {
                issues.push(ConfigIssue {
                    path: name.to_string(),
                    kind: ConfigIssueKind::Invalid,
                });
                None
            }
            None => None,
        };
        Self {
            name,
            fields,
            issues,
        }
    }

    fn read<T>(&mut self, key: &str, default: T, parse: impl Fn(&Value) -> Option<T>) -> T {
        let value = self.fields.and_then(|fields| fields.get(key));
        let kind = match value {
            None => ConfigIssueKind::Missing,
            Some(raw) => match parse(raw) {
                Some(parsed) => return parsed,
                None => ConfigIssueKind::Invalid,
            },
        };
        self.issues.push(ConfigIssue {
            path: format!("{}.{}", self.name, key),
            kind,
        });
        default
    }

    fn flag(&mut self, key: &str, default: bool) -> bool {
        self.read(key, default, Value::as_bool)
    }

    fn uint(&mut self, key: &str, default: u64) -> u64 {
        self.read(key, default, Value::as_u64)
    }

    fn positive(&mut self, key: &str, default: u64) -> u64 {
        self.read(key, default, |raw| raw.as_u64().filter(|value| *value > 0))
    }

    fn strings(&mut self, key: &str, default: &[String]) -> Vec<String> {
        self.read(key, default.to_vec(), |raw| {
            let entries = raw.as_array()?;
            let parsed = entries
                .iter()
                .map(|entry| entry.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()?;
            (!parsed.is_empty()).then_some(parsed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_document_resolves_to_defaults_with_missing_issues() {
        let (config, issues) = PursuitConfig::resolve(&json!({}));
        assert_eq!(config, PursuitConfig::default());
        assert!(!issues.is_empty());
        assert!(issues
            .iter()
            .all(|issue| issue.kind == ConfigIssueKind::Missing));
    }

    #[test]
    fn invalid_fields_fall_back_individually() {
        let document = json!({
            "civilian": {
                "speeding_limit_kmh": "fast",
                "zigzag_min_turns": 0,
                "wanted_fail_penalty": 75
            },
            "police": { "busted_range_m": -4, "pursuer_liveries": [] },
            "features": "yes"
        });
        let (config, issues) = PursuitConfig::resolve(&document);

        assert_eq!(config.civilian.speeding_limit_kmh, 100);
        assert_eq!(config.civilian.zigzag_min_turns, 5);
        assert_eq!(config.civilian.wanted_fail_penalty, 75);
        assert_eq!(config.police.busted_range_m, 20);
        assert_eq!(config.police.pursuer_liveries, default_pursuer_liveries());
        assert_eq!(config.features, FeatureFlags::default());

        let invalid = issues
            .iter()
            .filter(|issue| issue.kind == ConfigIssueKind::Invalid)
            .map(|issue| issue.path.as_str())
            .collect::<Vec<_>>();
        assert!(invalid.contains(&"civilian.speeding_limit_kmh"));
        assert!(invalid.contains(&"civilian.zigzag_min_turns"));
        assert!(invalid.contains(&"police.busted_range_m"));
        assert!(invalid.contains(&"police.pursuer_liveries"));
        assert!(invalid.contains(&"features"));
    }

    #[test]
    fn serialized_config_resolves_to_itself_without_issues() {
        let mut config = PursuitConfig::default();
        config.features.zigzag_bonus_enabled = false;
        config.police.bust_bonus_amount = 250;
        config.general.worker_threads = 4;

        let document = serde_json::to_value(&config).expect("serialize");
        let (resolved, issues) = PursuitConfig::resolve(&document);
        assert_eq!(resolved, config);
        assert!(issues.is_empty());
    }

    #[test]
    fn roleplay_switch_gates_dependent_features() {
        let mut flags = FeatureFlags::default();
        assert!(flags.speeding_active() && flags.zigzag_active() && flags.police_active());
        flags.roleplay_enabled = false;
        assert!(!flags.speeding_active());
        assert!(!flags.zigzag_active());
        assert!(!flags.police_active());
    }

    #[test]
    fn load_or_default_tolerates_missing_file() {
        let config = PursuitConfig::load_or_default("/nonexistent/pursuit/config.json");
        assert_eq!(config, PursuitConfig::default());
    }
}
