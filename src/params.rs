use serde::{Deserialize, Serialize};
use simple_error::SimpleError;

use crate::error;
use crate::synapse::SynapseClass;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerParams {
    pub dt: f64,
    pub minis_seed: u64,
    pub extracellular_calcium: Option<f64>,
    pub finalize_order: FinalizeOrder,
    pub kind: ConnectionKind,
}

// buckets are always walked in insertion order, the policy orders connections within a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalizeOrder {
    Insertion,
    ReverseInsertion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionKind {
    Chemical,
    GapJunction,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReaderParams {
    pub dt: f64,
    pub extracellular_calcium: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupParams {
    pub num_workers: Option<usize>,
    pub pin_threads: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathwayRule {
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub delay: Option<f64>,
    #[serde(default)]
    pub synapse_configure: Option<String>,
    #[serde(default)]
    pub plasticity_mode: Option<String>,
    #[serde(default)]
    pub spont_minis: Option<f64>,
    #[serde(default)]
    pub kind_restrict: Option<SynapseClass>,
    #[serde(default)]
    pub override_helper: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupConnect {
    pub weight: Option<f64>,
    pub configuration: Option<String>,
    pub plasticity_mode: Option<String>,
    pub minis_rate: Option<f64>,
    pub kind_restrict: Option<SynapseClass>,
    pub synapse_override: Option<String>,
    pub creation_mode: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionUpdate {
    pub weight: Option<f64>,
    pub configuration: Option<String>,
    pub params: Vec<(String, f64)>,
}

impl Default for ManagerParams {
    fn default() -> Self {
        Self {
            dt: 0.025,
            minis_seed: 0,
            extracellular_calcium: None,
            finalize_order: FinalizeOrder::default(),
            kind: ConnectionKind::Chemical,
        }
    }
}

// legacy iteration order
impl Default for FinalizeOrder {
    fn default() -> Self {
        FinalizeOrder::ReverseInsertion
    }
}

impl Default for GroupParams {
    fn default() -> Self {
        Self {
            num_workers: Some(1),
            pin_threads: false,
        }
    }
}

impl ManagerParams {
    pub fn reader_params(&self) -> ReaderParams {
        ReaderParams {
            dt: self.dt,
            extracellular_calcium: self.extracellular_calcium,
        }
    }
}

impl PathwayRule {
    pub fn new(source: &str, destination: &str) -> Self {
        Self {
            source: source.to_string(),
            destination: destination.to_string(),
            weight: None,
            delay: None,
            synapse_configure: None,
            plasticity_mode: None,
            spont_minis: None,
            kind_restrict: None,
            override_helper: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_delay(mut self, delay: f64) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_configure(mut self, configure: &str) -> Self {
        self.synapse_configure = Some(configure.to_string());
        self
    }

    pub fn is_delayed(&self) -> bool {
        self.delay.map_or(false, |delay| delay > 0.0)
    }

    pub fn is_zero_weight(&self) -> bool {
        self.weight == Some(0.0)
    }

    pub fn label(&self) -> String {
        format!("{} -> {}", self.source, self.destination)
    }

    pub fn to_group_connect(&self, creation_mode: bool) -> GroupConnect {
        GroupConnect {
            weight: self.weight,
            configuration: self.synapse_configure.clone(),
            plasticity_mode: self.plasticity_mode.clone(),
            minis_rate: self.spont_minis,
            kind_restrict: self.kind_restrict,
            synapse_override: self.override_helper.clone(),
            creation_mode,
        }
    }
}

impl ConnectionUpdate {
    pub fn is_empty(&self) -> bool {
        self.weight.is_none() && self.configuration.is_none() && self.params.is_empty()
    }
}

pub fn load_rules_yaml(yaml: &str) -> error::Result<Vec<PathwayRule>> {
    let rules: Vec<PathwayRule> = serde_yaml::from_str(yaml).map_err(|err| {
        SimpleError::new(format!("cannot parse pathway rules: {}", err))
    })?;

    for rule in &rules {
        validate_rule(rule)?;
    }

    Ok(rules)
}

pub fn load_manager_params_yaml(yaml: &str) -> error::Result<ManagerParams> {
    let params: ManagerParams = serde_yaml::from_str(yaml).map_err(|err| {
        SimpleError::new(format!("cannot parse manager parameters: {}", err))
    })?;

    validate_manager_params(&params)?;

    Ok(params)
}

pub fn validate_manager_params(params: &ManagerParams) -> Result<(), SimpleError> {
    if !(params.dt > 0.0) {
        return Err(SimpleError::new("dt must be strictly positive"));
    }

    if let Some(calcium) = params.extracellular_calcium {
        if !(calcium > 0.0) {
            return Err(SimpleError::new(
                "extracellular_calcium must be strictly positive",
            ));
        }
    }

    Ok(())
}

pub fn validate_group_params(params: &GroupParams) -> Result<(), SimpleError> {
    if let Some(num_workers) = params.num_workers {
        if num_workers == 0 {
            return Err(SimpleError::new("num_workers must be strictly positive"));
        }

        if params.pin_threads && num_cpus::get() < num_workers {
            return Err(SimpleError::new(
                "num_workers must not be greater than number of available CPUs when pinning threads",
            ));
        }
    }

    Ok(())
}

pub fn validate_rule(rule: &PathwayRule) -> Result<(), SimpleError> {
    if rule.source.is_empty() || rule.destination.is_empty() {
        return Err(SimpleError::new(format!(
            "pathway rule {}: source and destination must not be empty",
            rule.label()
        )));
    }

    if let Some(weight) = rule.weight {
        if !(weight >= 0.0) || !weight.is_finite() {
            return Err(SimpleError::new(format!(
                "pathway rule {}: weight must be finite and not negative",
                rule.label()
            )));
        }
    }

    if let Some(delay) = rule.delay {
        if !(delay >= 0.0) || !delay.is_finite() {
            return Err(SimpleError::new(format!(
                "pathway rule {}: delay must be finite and not negative",
                rule.label()
            )));
        }
    }

    if let Some(spont_minis) = rule.spont_minis {
        if !(spont_minis >= 0.0) || !spont_minis.is_finite() {
            return Err(SimpleError::new(format!(
                "pathway rule {}: spont_minis must be finite and not negative",
                rule.label()
            )));
        }
    }

    if let Some(mode) = &rule.plasticity_mode {
        if mode.trim().is_empty() {
            return Err(SimpleError::new(format!(
                "pathway rule {}: plasticity_mode must not be blank",
                rule.label()
            )));
        }
    }

    if rule.is_delayed() && rule.weight.is_none() && rule.synapse_configure.is_none() {
        return Err(SimpleError::new(format!(
            "pathway rule {}: a delayed rule must set weight or synapse_configure",
            rule.label()
        )));
    }

    Ok(())
}
