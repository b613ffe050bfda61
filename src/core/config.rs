//! Processing configuration: the immutable bundle of reference data and
//! settings every stage reads. Built once, shared by reference across
//! documents and threads.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::codelists::Codelists;
use super::error::BelegError;
use super::mapping::MappingTable;
use super::registry::BtRegistry;
use super::rules::{RuleContext, RuleSet, ValidationRule};

/// Numeric knobs of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Largest difference between a stated and a computed amount that is
    /// still corrected instead of refused.
    pub tolerance: Decimal,
    /// Upper bound on engine passes per document.
    pub max_iterations: usize,
    /// Extraction confidence below which a value may be overruled.
    pub low_confidence_threshold: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tolerance: dec!(0.01),
            max_iterations: 10,
            low_confidence_threshold: 0.8,
        }
    }
}

impl Settings {
    fn check(&self) -> Result<(), BelegError> {
        if self.tolerance < Decimal::ZERO {
            return Err(BelegError::Config(format!(
                "tolerance must not be negative, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(BelegError::Config("max_iterations must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.low_confidence_threshold) {
            return Err(BelegError::Config(format!(
                "low_confidence_threshold must be within 0..=1, got {}",
                self.low_confidence_threshold
            )));
        }
        Ok(())
    }
}

/// Everything needed to process documents.
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    registry: BtRegistry,
    mapping: MappingTable,
    codelists: Codelists,
    rules: RuleSet,
    settings: Settings,
}

impl ProcessingConfig {
    /// EN 16931 Basic defaults throughout.
    pub fn en16931_basic() -> Self {
        Self {
            registry: BtRegistry::en16931_basic(),
            mapping: MappingTable::azure_invoice(),
            codelists: Codelists::new(),
            rules: RuleSet::en16931_basic(),
            settings: Settings::default(),
        }
    }

    pub fn builder() -> ProcessingConfigBuilder {
        ProcessingConfigBuilder::new()
    }

    pub fn registry(&self) -> &BtRegistry {
        &self.registry
    }

    pub fn mapping(&self) -> &MappingTable {
        &self.mapping
    }

    pub fn codelists(&self) -> &Codelists {
        &self.codelists
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn rule_context(&self) -> RuleContext<'_> {
        RuleContext {
            registry: &self.registry,
            codelists: &self.codelists,
            settings: &self.settings,
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self::en16931_basic()
    }
}

/// Builder for [`ProcessingConfig`]. Unset parts fall back to the
/// EN 16931 Basic defaults; [`build`](Self::build) checks that the parts
/// fit together and orders the rules.
#[derive(Debug, Default)]
pub struct ProcessingConfigBuilder {
    registry: Option<BtRegistry>,
    mapping: Option<MappingTable>,
    codelists: Option<Codelists>,
    rules: Option<Vec<ValidationRule>>,
    disabled_rules: Vec<String>,
    settings: Option<Settings>,
}

impl ProcessingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(mut self, registry: BtRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn mapping(mut self, mapping: MappingTable) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn codelists(mut self, codelists: Codelists) -> Self {
        self.codelists = Some(codelists);
        self
    }

    /// Replace the rule set. The rules are ordered at build time.
    pub fn rules(mut self, rules: Vec<ValidationRule>) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Drop rules by id from whichever rule set is used.
    pub fn disable_rules<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled_rules.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Assemble the configuration.
    ///
    /// Fails with [`BelegError::RuleCycle`] when the rules cannot be
    /// ordered and with [`BelegError::Config`] when the mapping table
    /// refers to terms the registry does not know.
    pub fn build(self) -> Result<ProcessingConfig, BelegError> {
        let registry = self.registry.unwrap_or_default();
        let mapping = self.mapping.unwrap_or_default();
        mapping.check(&registry)?;

        let settings = self.settings.unwrap_or_default();
        settings.check()?;

        let rules = match self.rules {
            Some(rules) => RuleSet::new(rules)?,
            None => RuleSet::en16931_basic(),
        };
        let rules = if self.disabled_rules.is_empty() {
            rules
        } else {
            rules.without(&self.disabled_rules)?
        };

        tracing::debug!(
            terms = registry.terms().count(),
            mappings = mapping.entries().len(),
            rules = rules.len(),
            "processing configuration built"
        );
        Ok(ProcessingConfig {
            registry,
            mapping,
            codelists: self.codelists.unwrap_or_default(),
            rules,
            settings,
        })
    }
}
