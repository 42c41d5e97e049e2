use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::types::{Function, Temperature};

/// Valid setpoint bounds in tenths of a degree Celsius.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetpointRange {
    pub min: i32,
    pub max: i32,
}

impl SetpointRange {
    pub fn min_temperature(&self) -> Temperature {
        Temperature::from_tenths(self.min)
    }

    pub fn max_temperature(&self) -> Temperature {
        Temperature::from_tenths(self.max)
    }
}

/// Device-reported value limits for the current session.
#[derive(Debug, Default)]
pub(crate) struct AttributeRegistry {
    allowed: HashMap<Function, HashSet<String>>,
    setpoint: Option<SetpointRange>,
}

impl AttributeRegistry {
    /// The latest LIMITS response for a function replaces the previous one.
    pub fn apply_limits(&mut self, function: Function, values: Vec<String>) {
        if function != Function::Setpoint {
            debug!(%function, count = values.len(), "limits updated");
            self.allowed.insert(function, values.into_iter().collect());
            return;
        }

        let [min, max] = values.as_slice() else {
            warn!(count = values.len(), "ignoring SETPTEMP limits with wrong arity");
            return;
        };
        match (min.parse::<i32>(), max.parse::<i32>()) {
            (Ok(min), Ok(max)) if min <= max => {
                debug!(min, max, "setpoint range updated");
                self.setpoint = Some(SetpointRange { min, max });
            }
            _ => warn!(%min, %max, "ignoring invalid SETPTEMP limits"),
        }
    }

    /// Fails closed: a function whose limits were never received allows nothing.
    pub fn is_allowed(&self, function: Function, value: &str) -> bool {
        self.allowed
            .get(&function)
            .is_some_and(|values| values.contains(value))
    }

    /// Identity until the device has reported a range.
    pub fn clamp_setpoint(&self, tenths: i32) -> i32 {
        match self.setpoint {
            Some(range) => tenths.clamp(range.min, range.max),
            None => tenths,
        }
    }

    pub fn allowed_values(&self, function: Function) -> Option<Vec<String>> {
        self.allowed.get(&function).map(|values| {
            let mut values: Vec<String> = values.iter().cloned().collect();
            values.sort();
            values
        })
    }

    pub fn setpoint_range(&self) -> Option<SetpointRange> {
        self.setpoint
    }

    pub fn clear(&mut self) {
        self.allowed.clear();
        self.setpoint = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn setpoint_limits_convert_and_clamp() {
        let mut registry = AttributeRegistry::default();
        registry.apply_limits(Function::Setpoint, strings(&["180", "300"]));

        let range = registry.setpoint_range().unwrap();
        assert_eq!(range.min_temperature().celsius(), 18.0);
        assert_eq!(range.max_temperature().celsius(), 30.0);
        assert_eq!(registry.clamp_setpoint(350), 300);
        assert_eq!(registry.clamp_setpoint(100), 180);
        assert_eq!(registry.clamp_setpoint(225), 225);
    }

    #[test]
    fn setpoint_wrong_arity_keeps_previous_bounds() {
        let mut registry = AttributeRegistry::default();
        registry.apply_limits(Function::Setpoint, strings(&["180", "300"]));
        registry.apply_limits(Function::Setpoint, strings(&["180"]));
        registry.apply_limits(Function::Setpoint, strings(&["160", "200", "300"]));
        registry.apply_limits(Function::Setpoint, strings(&["A", "300"]));
        registry.apply_limits(Function::Setpoint, strings(&["300", "180"]));

        assert_eq!(
            registry.setpoint_range(),
            Some(SetpointRange { min: 180, max: 300 })
        );
    }

    #[test]
    fn clamp_is_identity_without_limits() {
        let registry = AttributeRegistry::default();
        assert_eq!(registry.clamp_setpoint(-50), -50);
        assert_eq!(registry.clamp_setpoint(990), 990);
    }

    #[test]
    fn is_allowed_fails_closed() {
        let mut registry = AttributeRegistry::default();
        assert!(!registry.is_allowed(Function::Mode, "HEAT"));

        registry.apply_limits(Function::Mode, strings(&["AUTO", "COOL", "HEAT"]));
        assert!(registry.is_allowed(Function::Mode, "HEAT"));
        assert!(!registry.is_allowed(Function::Mode, "DRY"));
        assert!(!registry.is_allowed(Function::FanSpeed, "AUTO"));
    }

    #[test]
    fn limits_replace_rather_than_merge() {
        let mut registry = AttributeRegistry::default();
        registry.apply_limits(Function::FanSpeed, strings(&["1", "2", "3"]));
        registry.apply_limits(Function::FanSpeed, strings(&["AUTO", "1"]));

        assert!(!registry.is_allowed(Function::FanSpeed, "3"));
        assert_eq!(
            registry.allowed_values(Function::FanSpeed).unwrap(),
            vec!["1", "AUTO"]
        );
    }

    #[test]
    fn clear_forgets_session_limits() {
        let mut registry = AttributeRegistry::default();
        registry.apply_limits(Function::Mode, strings(&["AUTO"]));
        registry.apply_limits(Function::Setpoint, strings(&["180", "300"]));
        registry.clear();

        assert!(!registry.is_allowed(Function::Mode, "AUTO"));
        assert_eq!(registry.setpoint_range(), None);
        assert_eq!(registry.clamp_setpoint(350), 350);
    }
}
