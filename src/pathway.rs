use std::fmt;

use crate::engine::{SectionLocator, SimulationEngine};
use crate::error::{Error, Result};
use crate::manager::ConnectionManager;
use crate::membership::{intersects, same_members, GidSet, Memberships, TargetSpec};
use crate::params::{self, ConnectionUpdate, PathwayRule};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStatus {
    Applied,
    Delayed,
    ZeroWeightOverridden { by: usize },
    ZeroWeightInert,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleResolution {
    pub label: String,
    pub status: RuleStatus,
    pub overrides: Option<usize>,
    pub unscoped_assignments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    rules: Vec<RuleResolution>,
}

impl Resolution {
    pub fn rules(&self) -> &[RuleResolution] {
        &self.rules
    }

    pub fn status(&self, rule_index: usize) -> Option<RuleStatus> {
        self.rules.get(rule_index).map(|rule| rule.status)
    }

    pub fn delayed(&self) -> Vec<usize> {
        self.indices_with(|status| status == RuleStatus::Delayed)
    }

    pub fn inert(&self) -> Vec<usize> {
        self.indices_with(|status| status == RuleStatus::ZeroWeightInert)
    }

    pub fn has_unscoped_assignments(&self) -> bool {
        self.rules
            .iter()
            .any(|rule| !rule.unscoped_assignments.is_empty())
    }

    fn indices_with(&self, predicate: impl Fn(RuleStatus) -> bool) -> Vec<usize> {
        self.rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| predicate(rule.status))
            .map(|(idx, _)| idx)
            .collect()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, rule) in self.rules.iter().enumerate() {
            write!(f, "[{}] {}", idx, rule.label)?;

            match rule.status {
                RuleStatus::Applied => {}
                RuleStatus::Delayed => write!(f, " (delayed)")?,
                RuleStatus::ZeroWeightOverridden { by } => {
                    write!(f, " (zero weight, overridden by [{}])", by)?
                }
                RuleStatus::ZeroWeightInert => write!(f, " (zero weight, inert)")?,
            }

            if let Some(overridden) = rule.overrides {
                write!(f, " overrides [{}] {}", overridden, self.rules[overridden].label)?;
            }

            for statement in &rule.unscoped_assignments {
                write!(f, "\n    unscoped assignment: {}", statement)?;
            }

            writeln!(f)?;
        }
        Ok(())
    }
}

struct ResolvedRule {
    rule: PathwayRule,
    source: GidSet,
    destination: GidSet,
}

impl ResolvedRule {
    fn overlaps(&self, other: &ResolvedRule) -> bool {
        intersects(&self.source, &other.source) && intersects(&self.destination, &other.destination)
    }

    fn same_scope(&self, other: &ResolvedRule) -> bool {
        same_members(&self.source, &other.source)
            && same_members(&self.destination, &other.destination)
    }
}

pub struct PathwayRuleResolver {
    rules: Vec<ResolvedRule>,
}

impl PathwayRuleResolver {
    pub fn new(rules: Vec<PathwayRule>, memberships: &Memberships) -> Result<Self> {
        let mut resolved = Vec::with_capacity(rules.len());

        for rule in rules {
            params::validate_rule(&rule)
                .map_err(|err| Error::Configuration(err.as_str().to_string()))?;

            let source = memberships.resolve(&rule.source)?.clone();
            let destination = memberships.resolve(&rule.destination)?.clone();

            resolved.push(ResolvedRule {
                rule,
                source,
                destination,
            });
        }

        Ok(Self { rules: resolved })
    }

    pub fn rules(&self) -> impl Iterator<Item = &PathwayRule> {
        self.rules.iter().map(|resolved| &resolved.rule)
    }

    pub fn analyze(&self) -> Result<Resolution> {
        let mut statuses: Vec<Option<RuleStatus>> = vec![None; self.rules.len()];
        let mut pending_zero: Vec<usize> = Vec::new();

        for (idx, resolved) in self.rules.iter().enumerate() {
            if resolved.rule.is_delayed() {
                statuses[idx] = Some(RuleStatus::Delayed);

                for &zero_idx in &pending_zero {
                    let zero_rule = &self.rules[zero_idx];
                    if !resolved.overlaps(zero_rule) {
                        continue;
                    }

                    if !resolved.same_scope(zero_rule) {
                        return Err(Error::Configuration(format!(
                            "partial override of a zero-weight pathway is unsupported: {} by {}",
                            zero_rule.rule.label(),
                            resolved.rule.label()
                        )));
                    }

                    statuses[zero_idx] = Some(RuleStatus::ZeroWeightOverridden { by: idx });
                }
            } else if resolved.rule.is_zero_weight() {
                pending_zero.push(idx);
            } else {
                statuses[idx] = Some(RuleStatus::Applied);
            }
        }

        let mut rules = Vec::with_capacity(self.rules.len());

        for (idx, resolved) in self.rules.iter().enumerate() {
            let status = statuses[idx].unwrap_or(RuleStatus::ZeroWeightInert);
            if status == RuleStatus::ZeroWeightInert {
                log::warn!(
                    "zero-weight pathway {} is never overridden, its connections stay inert",
                    resolved.rule.label()
                );
            }

            let overrides = if resolved.rule.is_delayed() {
                None
            } else {
                self.rules[..idx]
                    .iter()
                    .rposition(|earlier| !earlier.rule.is_delayed() && resolved.overlaps(earlier))
            };

            let unscoped_assignments = resolved
                .rule
                .synapse_configure
                .as_deref()
                .map(unscoped_assignments)
                .unwrap_or_default();
            for statement in &unscoped_assignments {
                log::warn!(
                    "pathway {}: assignment '{}' is not scoped to the synapse",
                    resolved.rule.label(),
                    statement
                );
            }

            rules.push(RuleResolution {
                label: resolved.rule.label(),
                status,
                overrides,
                unscoped_assignments,
            });
        }

        Ok(Resolution { rules })
    }

    pub fn apply_initial(
        &self,
        manager: &mut ConnectionManager,
        locator: &dyn SectionLocator,
        target_ids: &[usize],
        creation_mode: bool,
    ) -> Result<Resolution> {
        let resolution = self.analyze()?;
        log::debug!("pathway resolution:\n{}", resolution);

        for (resolved, outcome) in self.rules.iter().zip(resolution.rules()) {
            if let RuleStatus::Applied | RuleStatus::ZeroWeightOverridden { .. } = outcome.status {
                let stats = manager.group_connect(
                    locator,
                    &resolved.source,
                    &resolved.destination,
                    target_ids,
                    &resolved.rule.to_group_connect(creation_mode),
                )?;
                log::info!(
                    "pathway {}: {} created, {} updated",
                    outcome.label,
                    stats.created,
                    stats.updated
                );
            }
        }

        // an inert pathway only owns the pairs no later initial rule covers
        for (idx, outcome) in resolution.rules().iter().enumerate() {
            if outcome.status != RuleStatus::ZeroWeightInert {
                continue;
            }

            let resolved = &self.rules[idx];
            let later: Vec<&ResolvedRule> = self.rules[idx + 1..]
                .iter()
                .filter(|later| !later.rule.is_delayed())
                .collect();
            let covered_later = |pre_nid: usize, post_nid: usize| {
                later.iter().any(|later| {
                    later.source.contains(pre_nid) && later.destination.contains(post_nid)
                })
            };

            let parked = manager.deactivate_pathway(
                &resolved.source,
                &resolved.destination,
                target_ids,
                &covered_later,
            )?;
            log::info!("pathway {}: {} connections parked", outcome.label, parked);
        }

        Ok(resolution)
    }

    pub fn apply_delayed(
        &self,
        manager: &mut ConnectionManager,
        engine: &mut dyn SimulationEngine,
        target_ids: &[usize],
        rule_index: usize,
    ) -> Result<usize> {
        let resolved = self.rules.get(rule_index).ok_or_else(|| {
            Error::InvalidInput(format!("no pathway rule with index {}", rule_index))
        })?;

        if !resolved.rule.is_delayed() {
            return Err(Error::InvalidInput(format!(
                "pathway {} is not delayed",
                resolved.rule.label()
            )));
        }

        let update = ConnectionUpdate {
            weight: resolved.rule.weight,
            configuration: resolved.rule.synapse_configure.clone(),
            params: Vec::new(),
        };

        manager.configure(
            engine,
            &resolved.source,
            &resolved.destination,
            target_ids,
            &update,
        )
    }
}

// statements assigning to a bare name instead of a synapse attribute
fn unscoped_assignments(configure: &str) -> Vec<String> {
    configure
        .split(|c| c == ';' || c == '\n')
        .map(str::trim)
        .filter(|statement| match assignment_target(statement) {
            Some(target) => !target.is_empty() && !target.contains('.'),
            None => false,
        })
        .map(str::to_string)
        .collect()
}

fn assignment_target(statement: &str) -> Option<&str> {
    let bytes = statement.as_bytes();
    let eq = statement.find('=')?;

    if bytes.get(eq + 1) == Some(&b'=') {
        return None;
    }

    let target_end = match eq.checked_sub(1).map(|prev| bytes[prev]) {
        Some(b'<') | Some(b'>') | Some(b'!') => return None,
        Some(b'*') | Some(b'+') | Some(b'-') | Some(b'/') => eq - 1,
        _ => eq,
    };

    Some(statement[..target_end].trim())
}
