//! A small, explicitly owned metrics registry with Prometheus text rendering.
//!
//! Instruments are registered once and then updated through the handles the
//! registry hands back. Nothing here is global.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("metric {0:?} is already registered")]
    Duplicate(String),
    #[error("metric {name:?} takes {expected} label values, got {got}")]
    LabelCount {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("no metric family with index {0} in this registry")]
    UnknownFamily(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Gauge,
    Counter,
}

impl Kind {
    fn as_str(&self) -> &'static str {
        match self {
            Kind::Gauge => "gauge",
            Kind::Counter => "counter",
        }
    }
}

#[derive(Debug)]
struct Family {
    name: String,
    help: &'static str,
    kind: Kind,
    label_names: &'static [&'static str],
    samples: BTreeMap<Vec<String>, f64>,
}

/// Handle to a registered gauge family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gauge(usize);

/// Handle to a registered counter family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter(usize);

#[derive(Debug)]
pub struct MetricsRegistry {
    prefix: String,
    families: Vec<Family>,
    names: HashSet<String>,
}

impl MetricsRegistry {
    /// Every metric name is prefixed with the non-empty parts of
    /// `namespace_subsystem_`.
    pub fn new(namespace: &str, subsystem: &str) -> Self {
        let prefix = [namespace, subsystem]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| format!("{part}_"))
            .collect();
        Self {
            prefix,
            families: Vec::new(),
            names: HashSet::new(),
        }
    }

    fn register(
        &mut self,
        name: &str,
        help: &'static str,
        kind: Kind,
        label_names: &'static [&'static str],
    ) -> Result<usize, RegistryError> {
        let name = format!("{}{}", self.prefix, name);
        if !self.names.insert(name.clone()) {
            return Err(RegistryError::Duplicate(name));
        }
        self.families.push(Family {
            name,
            help,
            kind,
            label_names,
            samples: BTreeMap::new(),
        });
        Ok(self.families.len() - 1)
    }

    pub fn gauge(&mut self, name: &str, help: &'static str) -> Result<Gauge, RegistryError> {
        self.register(name, help, Kind::Gauge, &[]).map(Gauge)
    }

    pub fn gauge_vec(
        &mut self,
        name: &str,
        help: &'static str,
        label_names: &'static [&'static str],
    ) -> Result<Gauge, RegistryError> {
        self.register(name, help, Kind::Gauge, label_names).map(Gauge)
    }

    pub fn counter_vec(
        &mut self,
        name: &str,
        help: &'static str,
        label_names: &'static [&'static str],
    ) -> Result<Counter, RegistryError> {
        self.register(name, help, Kind::Counter, label_names)
            .map(Counter)
    }

    /// Looks up the sample for one label set, creating it at zero. The number
    /// of label values must match the family's label names.
    fn sample(&mut self, index: usize, label_values: &[&str]) -> Result<&mut f64, RegistryError> {
        let family = self
            .families
            .get_mut(index)
            .ok_or(RegistryError::UnknownFamily(index))?;
        if family.label_names.len() != label_values.len() {
            return Err(RegistryError::LabelCount {
                name: family.name.clone(),
                expected: family.label_names.len(),
                got: label_values.len(),
            });
        }
        let key = label_values.iter().map(|v| v.to_string()).collect();
        Ok(family.samples.entry(key).or_insert(0.0))
    }

    pub fn set(
        &mut self,
        gauge: Gauge,
        label_values: &[&str],
        value: f64,
    ) -> Result<(), RegistryError> {
        *self.sample(gauge.0, label_values)? = value;
        Ok(())
    }

    pub fn set_bool(
        &mut self,
        gauge: Gauge,
        label_values: &[&str],
        value: bool,
    ) -> Result<(), RegistryError> {
        self.set(gauge, label_values, if value { 1.0 } else { 0.0 })
    }

    /// Adds `delta` to a counter. Negative or NaN deltas are ignored so the
    /// counter never goes backwards.
    pub fn add(
        &mut self,
        counter: Counter,
        label_values: &[&str],
        delta: f64,
    ) -> Result<(), RegistryError> {
        let sample = self.sample(counter.0, label_values)?;
        if delta >= 0.0 {
            *sample += delta;
        }
        Ok(())
    }

    pub fn value(&self, family: impl Into<FamilyRef>, label_values: &[&str]) -> Option<f64> {
        let key: Vec<String> = label_values.iter().map(|v| v.to_string()).collect();
        self.families.get(family.into().0)?.samples.get(&key).copied()
    }

    /// Renders every family that has at least one sample.
    pub fn render(&self) -> String {
        let mut output = String::new();
        for family in self.families.iter().filter(|f| !f.samples.is_empty()) {
            let _ = writeln!(output, "# HELP {} {}", family.name, escape_help(family.help));
            let _ = writeln!(output, "# TYPE {} {}", family.name, family.kind.as_str());
            for (label_values, value) in &family.samples {
                output.push_str(&family.name);
                if !label_values.is_empty() {
                    let labels: Vec<String> = family
                        .label_names
                        .iter()
                        .zip(label_values)
                        .map(|(name, value)| format!("{}=\"{}\"", name, escape_label_value(value)))
                        .collect();
                    let _ = write!(output, "{{{}}}", labels.join(","));
                }
                let _ = writeln!(output, " {}", format_value(*value));
            }
        }
        output
    }
}

/// Index of a family, for reading values back.
#[derive(Debug, Clone, Copy)]
pub struct FamilyRef(usize);

impl From<Gauge> for FamilyRef {
    fn from(g: Gauge) -> Self {
        FamilyRef(g.0)
    }
}

impl From<Counter> for FamilyRef {
    fn from(c: Counter) -> Self {
        FamilyRef(c.0)
    }
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

fn escape_help(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Backslash, double-quote, and newline must be escaped.
fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_skips_empty_parts() {
        let mut registry = MetricsRegistry::new("tesla", "");
        let g = registry.gauge("grid_connected", "grid up").unwrap();
        registry.set(g, &[], 1.0).unwrap();
        assert!(registry.render().contains("\ntesla_grid_connected 1\n"));

        let mut bare = MetricsRegistry::new("", "");
        let g = bare.gauge("grid_connected", "grid up").unwrap();
        bare.set(g, &[], 0.0).unwrap();
        assert!(bare.render().contains("\ngrid_connected 0\n"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = MetricsRegistry::new("tesla", "energy_gateway");
        registry.gauge("uptime_seconds", "uptime").unwrap();
        let err = registry
            .gauge_vec("uptime_seconds", "again", &["meter"])
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::Duplicate("tesla_energy_gateway_uptime_seconds".to_string())
        );
    }

    #[test]
    fn test_render_gauge_and_counter() {
        let mut registry = MetricsRegistry::new("tesla", "energy_gateway");
        let power = registry
            .gauge_vec("instant_power", "power now", &["meter", "powerType"])
            .unwrap();
        let energy = registry
            .counter_vec("cumulative_power", "energy so far", &["meter", "direction"])
            .unwrap();
        registry.set(power, &["site", "truePower"], -2.8).unwrap();
        registry.add(energy, &["site", "to"], 1.5).unwrap();
        registry.add(energy, &["site", "to"], 0.25).unwrap();

        let text = registry.render();
        let expected = "\
# HELP tesla_energy_gateway_instant_power power now
# TYPE tesla_energy_gateway_instant_power gauge
tesla_energy_gateway_instant_power{meter=\"site\",powerType=\"truePower\"} -2.8
# HELP tesla_energy_gateway_cumulative_power energy so far
# TYPE tesla_energy_gateway_cumulative_power counter
tesla_energy_gateway_cumulative_power{meter=\"site\",direction=\"to\"} 1.75
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_counter_ignores_negative_delta() {
        let mut registry = MetricsRegistry::new("", "");
        let c = registry.counter_vec("energy", "kWh", &["meter"]).unwrap();
        registry.add(c, &["load"], 2.0).unwrap();
        registry.add(c, &["load"], -1.0).unwrap();
        registry.add(c, &["load"], f64::NAN).unwrap();
        assert_eq!(registry.value(c, &["load"]), Some(2.0));
    }

    #[test]
    fn test_unset_families_are_not_rendered() {
        let mut registry = MetricsRegistry::new("", "");
        registry.gauge("never_set", "nothing").unwrap();
        assert_eq!(registry.render(), "");
    }

    #[test]
    fn test_label_values_are_escaped() {
        let mut registry = MetricsRegistry::new("", "");
        let g = registry.gauge_vec("info", "info", &["name"]).unwrap();
        registry.set_bool(g, &["a \"quoted\"\nname"], true).unwrap();
        assert!(registry
            .render()
            .contains(r#"info{name="a \"quoted\"\nname"} 1"#));
    }

    #[test]
    fn test_wrong_label_count_is_rejected() {
        let mut registry = MetricsRegistry::new("tesla", "");
        let power = registry
            .gauge_vec("instant_power", "power now", &["meter", "powerType"])
            .unwrap();
        assert_eq!(
            registry.set(power, &["site"], 1.0),
            Err(RegistryError::LabelCount {
                name: "tesla_instant_power".to_string(),
                expected: 2,
                got: 1,
            })
        );
        let up = registry.gauge("up", "up").unwrap();
        assert!(matches!(
            registry.set_bool(up, &["extra"], true),
            Err(RegistryError::LabelCount { expected: 0, got: 1, .. })
        ));
        assert_eq!(registry.render(), "");
    }

    #[test]
    fn test_handle_from_another_registry_is_rejected() {
        let mut other = MetricsRegistry::new("", "");
        other.gauge("a", "a").unwrap();
        let foreign = other.counter_vec("b", "b", &["meter"]).unwrap();

        let mut registry = MetricsRegistry::new("", "");
        assert_eq!(
            registry.add(foreign, &["site"], 1.0),
            Err(RegistryError::UnknownFamily(1))
        );
        assert_eq!(registry.value(foreign, &["site"]), None);
    }

    #[test]
    fn test_special_values() {
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(204900.0), "204900");
        assert_eq!(format_value(0.5), "0.5");
    }
}
