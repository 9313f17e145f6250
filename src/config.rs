//! Aggregate configuration, persisted as TOML.
//!
//! Every tunable constant of the pipeline lives in one of these sections. All
//! fields have defaults, so an empty file is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::abstraction::{AbstractionConfig, Thresholds};
use crate::controller::ControllerConfig;
use crate::error::ConfigError;
use crate::pddl::PddlConfig;
use crate::planner::PlannerConfig;
use crate::primitives::{PrimitiveConfig, SamplingBudget};
use crate::sim::SimConfig;

/// Top-level config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub thresholds: Thresholds,
    pub abstraction: AbstractionConfig,
    pub primitives: PrimitiveConfig,
    pub controller: ControllerConfig,
    pub planner: PlannerConfig,
    pub pddl: PddlConfig,
    pub sim: SimConfig,
}

impl BridgeConfig {
    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: "<memory>".into(),
            message: e.to_string(),
        })
    }

    /// Save to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Reject tolerances and counts that would make grounding meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in self.thresholds.fields() {
            positive(&format!("thresholds.{name}"), value)?;
        }

        let p = &self.primitives;
        for (name, value) in [
            ("primitives.grasp_descent", p.grasp_descent),
            ("primitives.lift", p.lift),
            ("primitives.place_step", p.place_step),
            ("primitives.put_down_height", p.put_down_height),
            ("primitives.open_aperture", p.open_aperture),
        ] {
            positive(name, value)?;
        }
        if !(p.min_clearance.is_finite() && p.min_clearance >= 0.0) {
            return Err(invalid("primitives.min_clearance", "must be finite and non-negative"));
        }
        for (name, [lo, hi]) in [
            ("primitives.put_down_x", p.put_down_x),
            ("primitives.put_down_y", p.put_down_y),
        ] {
            if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
                return Err(invalid(name, &format!("range [{lo}, {hi}] is empty or non-finite")));
            }
        }
        if p.sampling == SamplingBudget::Capped(0) {
            return Err(invalid("primitives.sampling", "a capped budget needs at least one sample"));
        }

        if self.controller.max_cycles == Some(0) {
            return Err(invalid("controller.max_cycles", "must be at least 1 when set"));
        }
        if self.planner.command.trim().is_empty() {
            return Err(invalid("planner.command", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        message: message.into(),
    }
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, &format!("{value} is not finite and strictly positive")))
    }
}
