//! Rule framework (§4.6) and rule library (§4.7).
//!
//! A [`Rule`] is a descriptor plus a function; a [`RuleRegistry`] is an
//! ordered name-to-rule mapping; a [`ProfileRegistry`] maps profile names
//! to [`Profile`]s. Both registries throw (return `Err`) on unknown names,
//! the same "unknown X" setup-error class used for every other lookup
//! table in this crate.

mod geography;
mod identity;
mod locale;
mod naming;
mod referencing;
mod timing;

use std::collections::HashMap;

use crate::error::{EngineError, ValidationError};
use crate::{Document, Format, Profile};

/// Free-form per-invocation configuration handed to a rule's `run`. The
/// orchestrator injects `xsd_content` for every cross-document rule before
/// invoking it (§4.6); `distance_meters` overrides the default threshold
/// for the two geography rules.
#[derive(Debug, Clone, Default)]
pub struct RuleRunConfig {
    pub xsd_content: Option<String>,
    pub distance_meters: Option<f64>,
}

/// Rule names the orchestrator must run once against the whole document
/// set rather than once per document (§4.6).
pub const CROSS_DOC_RULE_NAMES: &[&str] = &[
    "everyLineIsReferenced",
    "everyStopPlaceIsReferenced",
    "locationsAreReferencingTheSamePoint",
    "netexKeyRefConstraints",
    "netexPrerequisitesAreSatisfied",
    "netexUniqueConstraints",
];

pub fn is_cross_doc_rule(name: &str) -> bool {
    CROSS_DOC_RULE_NAMES.contains(&name)
}

/// A stateless rule value. `run` never throws; any internal failure must be
/// represented as an error value, never a panic that escapes the function
/// (the orchestrator additionally guards against panics it cannot prevent
/// with `catch_unwind`-free discipline by trusting this contract).
pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;
    fn display_name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn formats(&self) -> &'static [Format];
    fn run(&self, docs: &[Document], config: &RuleRunConfig) -> Vec<ValidationError>;
}

/// Ordered name -> rule mapping. Iteration order is registration order,
/// which is also the order rules fire within a file (§5).
pub struct RuleRegistry {
    order: Vec<&'static str>,
    rules: HashMap<&'static str, Box<dyn Rule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            rules: HashMap::new(),
        }
    }

    pub fn register(&mut self, rule: Box<dyn Rule>) {
        self.order.push(rule.name());
        self.rules.insert(rule.name(), rule);
    }

    pub fn get_rule(&self, name: &str) -> Result<&dyn Rule, EngineError> {
        self.rules
            .get(name)
            .map(|r| r.as_ref())
            .ok_or_else(|| EngineError::UnknownRule {
                names: name.to_string(),
                available: self.order.join(", "),
            })
    }

    /// Rules applicable to `format`, in registry order.
    pub fn rules_for_format(&self, format: Format) -> Vec<&dyn Rule> {
        self.order
            .iter()
            .map(|n| self.rules[n].as_ref())
            .filter(|r| r.formats().contains(&format))
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.order.iter().copied()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(referencing::EveryLineIsReferenced));
        registry.register(Box::new(referencing::EveryStopPlaceIsReferenced));
        registry.register(Box::new(naming::EveryStopPlaceHasAName));
        registry.register(Box::new(naming::EveryScheduledStopPointHasAName));
        registry.register(Box::new(naming::EveryStopPlaceHasACorrectStopPlaceType));
        registry.register(Box::new(timing::EveryStopPointHasArrivalAndDepartureTime));
        registry.register(Box::new(timing::PassingTimesIsNotDecreasing));
        registry.register(Box::new(geography::StopPlaceQuayDistanceIsReasonable));
        registry.register(Box::new(locale::FrameDefaultsHaveALocaleAndTimeZone));
        registry.register(Box::new(geography::LocationsAreReferencingTheSamePoint));
        registry.register(Box::new(identity::NetexKeyRefConstraints));
        registry.register(Box::new(identity::NetexUniqueConstraints));
        registry.register(Box::new(referencing::NetexPrerequisitesAreSatisfied));
        registry
    }
}

/// Name -> [`Profile`] mapping (§6).
pub struct ProfileRegistry {
    profiles: HashMap<&'static str, Profile>,
}

impl ProfileRegistry {
    pub fn get_profile(&self, name: &str) -> Result<&Profile, EngineError> {
        self.profiles
            .get(name)
            .ok_or_else(|| EngineError::UnknownProfile {
                name: name.to_string(),
                available: {
                    let mut names: Vec<_> = self.profiles.keys().copied().collect();
                    names.sort_unstable();
                    names.join(", ")
                },
            })
    }

    pub fn default_for_format(&self, format: Format) -> &'static str {
        match format {
            Format::Netex => "netex-fast-v1.2",
            Format::Siri => "siri-v2.2",
        }
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        let netex_all_rules: Vec<&'static str> = vec![
            "everyLineIsReferenced",
            "everyStopPlaceIsReferenced",
            "everyStopPlaceHasAName",
            "everyScheduledStopPointHasAName",
            "everyStopPlaceHasACorrectStopPlaceType",
            "everyStopPointHasArrivalAndDepartureTime",
            "passingTimesIsNotDecreasing",
            "stopPlaceQuayDistanceIsReasonable",
            "frameDefaultsHaveALocaleAndTimeZone",
            "locationsAreReferencingTheSamePoint",
            "netexKeyRefConstraints",
            "netexUniqueConstraints",
            "netexPrerequisitesAreSatisfied",
        ];
        let siri_all_rules: Vec<&'static str> = vec![];

        let mut profiles = HashMap::new();
        profiles.insert(
            "netex-fast-v1.2",
            Profile {
                name: "netex-fast-v1.2",
                display_name: "NeTEx fast (1.2)",
                format: Format::Netex,
                schema_id: Some("netex@1.2-nc"),
                enabled_rules: netex_all_rules.clone(),
            },
        );
        profiles.insert(
            "netex-full-v1.2",
            Profile {
                name: "netex-full-v1.2",
                display_name: "NeTEx full (1.2)",
                format: Format::Netex,
                schema_id: Some("netex@1.2"),
                enabled_rules: netex_all_rules.clone(),
            },
        );
        profiles.insert(
            "epip-v1.1.2",
            Profile {
                name: "epip-v1.1.2",
                display_name: "EPIP (1.1.2)",
                format: Format::Netex,
                schema_id: Some("epip@1.1.2"),
                enabled_rules: netex_all_rules.clone(),
            },
        );
        profiles.insert(
            "netex-schema-only-v1.2",
            Profile {
                name: "netex-schema-only-v1.2",
                display_name: "NeTEx schema only (1.2)",
                format: Format::Netex,
                schema_id: Some("netex@1.2-nc"),
                enabled_rules: vec![],
            },
        );
        profiles.insert(
            "netex-rules-only",
            Profile {
                name: "netex-rules-only",
                display_name: "NeTEx rules only",
                format: Format::Netex,
                schema_id: None,
                enabled_rules: netex_all_rules,
            },
        );
        profiles.insert(
            "siri-v2.2",
            Profile {
                name: "siri-v2.2",
                display_name: "SIRI (2.2)",
                format: Format::Siri,
                schema_id: Some("siri@2.2"),
                enabled_rules: siri_all_rules.clone(),
            },
        );
        profiles.insert(
            "siri-v2.1",
            Profile {
                name: "siri-v2.1",
                display_name: "SIRI (2.1)",
                format: Format::Siri,
                schema_id: Some("siri@2.1"),
                enabled_rules: siri_all_rules.clone(),
            },
        );
        profiles.insert(
            "siri-schema-only-v2.2",
            Profile {
                name: "siri-schema-only-v2.2",
                display_name: "SIRI schema only (2.2)",
                format: Format::Siri,
                schema_id: Some("siri@2.2"),
                enabled_rules: vec![],
            },
        );
        profiles.insert(
            "siri-rules-only",
            Profile {
                name: "siri-rules-only",
                display_name: "SIRI rules only",
                format: Format::Siri,
                schema_id: None,
                enabled_rules: siri_all_rules,
            },
        );
        Self { profiles }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_contains_all_twelve_rules() {
        let registry = RuleRegistry::default();
        assert_eq!(registry.names().count(), 13);
        assert!(registry.get_rule("everyLineIsReferenced").is_ok());
        assert!(registry.get_rule("netexUniqueConstraints").is_ok());
    }

    #[test]
    fn unknown_rule_name_errors_with_available_list() {
        let registry = RuleRegistry::default();
        let err = registry.get_rule("doesNotExist").err().unwrap();
        match err {
            EngineError::UnknownRule { names, available } => {
                assert_eq!(names, "doesNotExist");
                assert!(available.contains("everyLineIsReferenced"));
            }
            _ => panic!("expected UnknownRule"),
        }
    }

    #[test]
    fn unknown_profile_name_errors() {
        let registry = ProfileRegistry::default();
        assert!(registry.get_profile("netex-fast-v1.2").is_ok());
        assert!(registry.get_profile("nope").is_err());
    }

    #[test]
    fn rules_for_format_filters_by_format() {
        let registry = RuleRegistry::default();
        let netex_rules = registry.rules_for_format(Format::Netex);
        assert!(!netex_rules.is_empty());
        for r in netex_rules {
            assert!(r.formats().contains(&Format::Netex));
        }
    }
}
