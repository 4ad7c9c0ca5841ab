//! Configuration loading and typed config structures for the Vitalis
//! simulation.
//!
//! The canonical configuration lives in `vitalis-config.yaml`. This module
//! defines strongly-typed structs that mirror the YAML structure, a loader
//! that reads the file, and [`SimulationConfig::validate`], which rejects
//! out-of-range values before any state is built.
//!
//! Rates are per capita per tick. Durations and delays are in ticks.

use std::path::Path;

use serde::Deserialize;
use vitalis_population::TICK_UNSET;
use vitalis_types::DelayDistribution;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content (including unknown distribution names).
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is outside its allowed range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Explanation of what is wrong with the value.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
///
/// Mirrors the structure of `vitalis-config.yaml`. The passive immunity and
/// vaccination sections are optional; their processes are only built when
/// the section is present.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Run length, seed, and time step.
    #[serde(default)]
    pub run: RunConfig,

    /// Initial population.
    #[serde(default)]
    pub population: PopulationConfig,

    /// Birth and death rates.
    #[serde(default)]
    pub vital_dynamics: VitalDynamicsConfig,

    /// Waning passive immunity for newborns.
    #[serde(default)]
    pub passive_immunity: Option<PassiveImmunityConfig>,

    /// Scheduled vaccination of newborns.
    #[serde(default)]
    pub vaccination: Option<VaccinationConfig>,

    /// Passive trackers.
    #[serde(default)]
    pub trackers: TrackersConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Check every value against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.time_step_days == 0 {
            return Err(ConfigError::Invalid {
                field: "run.time_step_days",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.population.regions.is_empty() {
            return Err(ConfigError::Invalid {
                field: "population.regions",
                reason: "at least one region must be configured".to_owned(),
            });
        }
        check_rate("vital_dynamics.birth_rate", self.vital_dynamics.birth_rate)?;
        check_rate("vital_dynamics.death_rate", self.vital_dynamics.death_rate)?;
        if let Some(delay) = self.vital_dynamics.routine_immunization_delay {
            self.check_routine_delay(delay)?;
        }

        if let Some(pi) = &self.passive_immunity {
            check_mean("passive_immunity.duration_mean", pi.duration_mean)?;
            check_fraction("passive_immunity.coverage", pi.coverage)?;
        }
        if let Some(vx) = &self.vaccination {
            check_mean("vaccination.delay_mean", vx.delay_mean)?;
            check_fraction("vaccination.efficacy", vx.efficacy)?;
            check_fraction("vaccination.coverage", vx.coverage)?;
        }
        Ok(())
    }

    /// The latest routine vaccination tick must fit in the tick columns.
    fn check_routine_delay(&self, delay: u64) -> Result<(), ConfigError> {
        let limit = u64::try_from(TICK_UNSET).unwrap_or(u64::MAX);
        let last_due = delay
            .checked_mul(u64::from(self.run.time_step_days))
            .and_then(|ticks| ticks.checked_add(self.run.num_ticks));
        match last_due {
            Some(due) if due < limit => Ok(()),
            _ => Err(ConfigError::Invalid {
                field: "vital_dynamics.routine_immunization_delay",
                reason: format!(
                    "{delay} days after the last of {} ticks is past the last representable tick {limit}",
                    self.run.num_ticks
                ),
            }),
        }
    }
}

fn check_rate(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("rate must be finite and non-negative, got {value}"),
        })
    }
}

fn check_fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("must be within [0, 1], got {value}"),
        })
    }
}

fn check_mean(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("mean must be finite and at least 1 tick, got {value}"),
        })
    }
}

/// Run-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Random seed for reproducibility.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of ticks to run.
    #[serde(default = "default_num_ticks")]
    pub num_ticks: u64,

    /// Days per tick.
    #[serde(default = "default_time_step_days")]
    pub time_step_days: u32,

    /// Verify the aggregate/per-agent invariant after every process call.
    #[serde(default = "default_true")]
    pub verify_consistency: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            num_ticks: default_num_ticks(),
            time_step_days: default_time_step_days(),
            verify_consistency: true,
        }
    }
}

/// Initial population.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PopulationConfig {
    /// Initial population of each region; the list length is the number of
    /// regions.
    #[serde(default = "default_regions")]
    pub regions: Vec<u64>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            regions: default_regions(),
        }
    }
}

/// Birth and death rates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VitalDynamicsConfig {
    /// Per-capita births per tick.
    #[serde(default = "default_birth_rate")]
    pub birth_rate: f64,

    /// Per-capita deaths per tick.
    #[serde(default = "default_death_rate")]
    pub death_rate: f64,

    /// When set, every newborn is immunized this many days (scaled by the
    /// time step) after birth, without an efficacy trial.
    #[serde(default)]
    pub routine_immunization_delay: Option<u64>,
}

impl Default for VitalDynamicsConfig {
    fn default() -> Self {
        Self {
            birth_rate: default_birth_rate(),
            death_rate: default_death_rate(),
            routine_immunization_delay: None,
        }
    }
}

impl VitalDynamicsConfig {
    /// Convert crude rates (per 1000 per year) into per-capita per-tick
    /// rates for a tick of `time_step_days` days.
    ///
    /// Uses compound conversion: `(1 + crude / 1000)^(days / 365) - 1`.
    pub fn from_crude_rates(crude_birth_rate: f64, crude_death_rate: f64, time_step_days: u32) -> Self {
        Self {
            birth_rate: per_tick_rate(crude_birth_rate, time_step_days),
            death_rate: per_tick_rate(crude_death_rate, time_step_days),
            routine_immunization_delay: None,
        }
    }
}

fn per_tick_rate(crude: f64, time_step_days: u32) -> f64 {
    let exponent = f64::from(time_step_days) / 365.0;
    ((crude / 1000.0).ln_1p() * exponent).exp_m1()
}

/// Waning passive (maternal) immunity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PassiveImmunityConfig {
    /// Mean protection duration in ticks.
    #[serde(default = "default_duration_mean")]
    pub duration_mean: f64,

    /// Fraction of newborns protected.
    #[serde(default = "default_coverage")]
    pub coverage: f64,

    /// Distribution of the protection duration.
    #[serde(default)]
    pub distribution: DelayDistribution,
}

impl Default for PassiveImmunityConfig {
    fn default() -> Self {
        Self {
            duration_mean: default_duration_mean(),
            coverage: default_coverage(),
            distribution: DelayDistribution::default(),
        }
    }
}

/// Scheduled vaccination of newborns.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VaccinationConfig {
    /// Mean delay from birth to vaccination in ticks.
    #[serde(default = "default_delay_mean")]
    pub delay_mean: f64,

    /// Probability a dose protects.
    #[serde(default = "default_efficacy")]
    pub efficacy: f64,

    /// Fraction of newborns scheduled.
    #[serde(default = "default_coverage")]
    pub coverage: f64,

    /// Distribution of the delay.
    #[serde(default)]
    pub delay_distribution: DelayDistribution,

    /// Label carried in `vaccination` events.
    #[serde(default = "default_vaccination_kind")]
    pub kind: String,
}

impl Default for VaccinationConfig {
    fn default() -> Self {
        Self {
            delay_mean: default_delay_mean(),
            efficacy: default_efficacy(),
            coverage: default_coverage(),
            delay_distribution: DelayDistribution::default(),
            kind: default_vaccination_kind(),
        }
    }
}

/// Passive trackers to attach.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct TrackersConfig {
    /// Attach a birth monitor.
    #[serde(default)]
    pub births: bool,

    /// Attach a death monitor.
    #[serde(default)]
    pub deaths: bool,

    /// Keep per-region breakdowns.
    #[serde(default = "default_true")]
    pub track_regions: bool,

    /// Keep per-compartment breakdowns (deaths).
    #[serde(default = "default_true")]
    pub track_compartments: bool,
}

impl Default for TrackersConfig {
    fn default() -> Self {
        Self {
            births: false,
            deaths: false,
            track_regions: true,
            track_compartments: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), used when `RUST_LOG`
    /// is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions for serde
// ---------------------------------------------------------------------------

const fn default_true() -> bool {
    true
}

const fn default_seed() -> u64 {
    42
}

const fn default_num_ticks() -> u64 {
    365
}

const fn default_time_step_days() -> u32 {
    1
}

fn default_regions() -> Vec<u64> {
    vec![500, 300]
}

const fn default_birth_rate() -> f64 {
    0.0
}

const fn default_death_rate() -> f64 {
    0.0
}

const fn default_duration_mean() -> f64 {
    180.0
}

const fn default_delay_mean() -> f64 {
    270.0
}

const fn default_efficacy() -> f64 {
    0.9
}

const fn default_coverage() -> f64 {
    1.0
}

fn default_vaccination_kind() -> String {
    "scheduled".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SimulationConfig::default();
        assert_eq!(config.run.seed, 42);
        assert_eq!(config.run.num_ticks, 365);
        assert_eq!(config.population.regions, vec![500, 300]);
        assert!(config.passive_immunity.is_none());
        assert!(config.vaccination.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
run:
  seed: 7
  num_ticks: 100
  time_step_days: 1
  verify_consistency: false

population:
  regions: [1000, 800, 1200]

vital_dynamics:
  birth_rate: 0.0003
  death_rate: 0.0002
  routine_immunization_delay: 270

passive_immunity:
  duration_mean: 120
  coverage: 0.8
  distribution: Exponential

vaccination:
  delay_mean: 270
  efficacy: 0.85
  coverage: 0.9
  delay_distribution: gamma
  kind: mcv1

trackers:
  births: true
  deaths: true
  track_regions: false

logging:
  level: debug
  json: true
";
        let config = SimulationConfig::parse(yaml).unwrap();
        assert_eq!(config.run.seed, 7);
        assert!(!config.run.verify_consistency);
        assert_eq!(config.population.regions.len(), 3);
        assert_eq!(config.vital_dynamics.routine_immunization_delay, Some(270));

        let pi = config.passive_immunity.as_ref().unwrap();
        assert_eq!(pi.distribution, DelayDistribution::Exponential);
        assert!((pi.coverage - 0.8).abs() < f64::EPSILON);

        let vx = config.vaccination.as_ref().unwrap();
        assert_eq!(vx.kind, "mcv1");
        assert_eq!(vx.delay_distribution, DelayDistribution::Gamma);

        assert!(config.trackers.births);
        assert!(!config.trackers.track_regions);
        assert!(config.trackers.track_compartments);
        assert!(config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn section_defaults_apply() {
        let yaml = "passive_immunity: {}\nvaccination: {}\n";
        let config = SimulationConfig::parse(yaml).unwrap();
        let pi = config.passive_immunity.unwrap();
        assert!((pi.duration_mean - 180.0).abs() < f64::EPSILON);
        assert!((pi.coverage - 1.0).abs() < f64::EPSILON);
        assert_eq!(pi.distribution, DelayDistribution::Gamma);
        let vx = config.vaccination.unwrap();
        assert!((vx.delay_mean - 270.0).abs() < f64::EPSILON);
        assert!((vx.efficacy - 0.9).abs() < f64::EPSILON);
        assert_eq!(vx.kind, "scheduled");
    }

    #[test]
    fn unknown_distribution_is_rejected() {
        let yaml = "passive_immunity:\n  distribution: weibull\n";
        let result = SimulationConfig::parse(yaml);
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut config = SimulationConfig::default();
        config.vital_dynamics.birth_rate = -0.1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "vital_dynamics.birth_rate", .. })
        ));

        let mut config = SimulationConfig::default();
        config.vaccination = Some(VaccinationConfig {
            efficacy: 1.5,
            ..VaccinationConfig::default()
        });
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.passive_immunity = Some(PassiveImmunityConfig {
            duration_mean: 0.5,
            ..PassiveImmunityConfig::default()
        });
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.population.regions.clear();
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.run.time_step_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_routine_delay_past_the_tick_range() {
        let mut config = SimulationConfig::default();
        config.vital_dynamics.routine_immunization_delay = Some(3_000_000_000);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "vital_dynamics.routine_immunization_delay",
                ..
            })
        ));

        // The time step scales the delay.
        config.vital_dynamics.routine_immunization_delay = Some(400_000_000);
        config.run.time_step_days = 7;
        assert!(config.validate().is_err());
        config.run.time_step_days = 1;
        assert!(config.validate().is_ok());

        config.vital_dynamics.routine_immunization_delay = Some(u64::MAX);
        assert!(config.validate().is_err());
    }

    #[test]
    fn crude_rates_convert_to_per_tick() {
        let vd = VitalDynamicsConfig::from_crude_rates(0.0, 0.0, 1);
        assert!(vd.birth_rate.abs() < f64::EPSILON);

        // 365 daily steps compound back to the annual rate.
        let vd = VitalDynamicsConfig::from_crude_rates(30.0, 10.0, 1);
        let annual = (1.0 + vd.birth_rate).powi(365) - 1.0;
        assert!((annual - 0.03).abs() < 1e-9);
        assert!(vd.death_rate < vd.birth_rate);

        let weekly = VitalDynamicsConfig::from_crude_rates(30.0, 10.0, 7);
        assert!(weekly.birth_rate > vd.birth_rate);
    }
}
