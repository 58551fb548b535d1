use super::descriptors::{self, Descriptor, DescriptorKind};
use super::expression::{Expression, ExpressionError};
use super::patterns::{PatternError, PatternMatcher};
use crate::core::chem::structure::ChemicalStructure;
use crate::core::chem::tags;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FitnessError {
    #[error("Invalid fitness expression: {0}")]
    Expression(#[from] ExpressionError),
    #[error("Unknown descriptor '{0}'")]
    UnknownDescriptor(String),
    #[error("Variable '{variable}' uses a {kind} descriptor and needs a pattern")]
    MissingPattern {
        variable: String,
        kind: DescriptorKind,
    },
    #[error("Expression variable '{0}' is not defined by any descriptor")]
    UndefinedVariable(String),
    #[error("Descriptor '{descriptor}' produced no value for variable '{variable}'")]
    NoResult { variable: String, descriptor: String },
    #[error("Pattern lookup for variable '{variable}' failed: {source}")]
    Pattern {
        variable: String,
        source: PatternError,
    },
    #[error("Bond pattern for variable '{variable}' matched {count} atoms in one hit; expected 2")]
    BondHitArity { variable: String, count: usize },
    #[error("Descriptors of {kind} kind are not supported (variable '{variable}')")]
    Unsupported {
        variable: String,
        kind: DescriptorKind,
    },
    #[error("Fitness expression could not be evaluated: {0}")]
    Evaluation(ExpressionError),
}

impl FitnessError {
    /// Errors that only concern the candidate at hand and leave the run
    /// untouched.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Evaluation(_))
    }
}

/// Configuration of one expression variable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DescriptorSpec {
    /// Name used in the fitness expression.
    pub variable: String,
    /// Short name of the descriptor that computes the value.
    pub descriptor: String,
    /// Atom or bond pattern selecting where atomic/bond descriptors apply.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Entry to use when the descriptor returns an array.
    #[serde(default)]
    pub result_index: Option<usize>,
}

struct Variable {
    name: String,
    descriptor: Box<dyn Descriptor>,
    pattern: Option<String>,
    result_index: Option<usize>,
}

/// Computes a fitness value from descriptors combined by an expression.
pub struct FitnessProvider {
    variables: Vec<Variable>,
    expression: Expression,
    matcher: Arc<dyn PatternMatcher>,
}

impl std::fmt::Debug for FitnessProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitnessProvider")
            .field("expression", &self.expression.source())
            .field(
                "variables",
                &self.variables.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl FitnessProvider {
    /// Builds a provider, checking that every variable of the expression is
    /// produced by one of the configured descriptors.
    pub fn new(
        specs: &[DescriptorSpec],
        expression: &str,
        matcher: Arc<dyn PatternMatcher>,
    ) -> Result<Self, FitnessError> {
        let expression = Expression::parse(expression)?;
        let mut variables = Vec::with_capacity(specs.len());
        for spec in specs {
            let descriptor = descriptors::builtin(&spec.descriptor)
                .ok_or_else(|| FitnessError::UnknownDescriptor(spec.descriptor.clone()))?;
            let kind = descriptor.kind();
            if matches!(kind, DescriptorKind::Atomic | DescriptorKind::Bond) && spec.pattern.is_none() {
                return Err(FitnessError::MissingPattern {
                    variable: spec.variable.clone(),
                    kind,
                });
            }
            variables.push(Variable {
                name: spec.variable.clone(),
                descriptor: Box::new(descriptor),
                pattern: spec.pattern.clone(),
                result_index: spec.result_index,
            });
        }
        for name in expression.variables() {
            if !variables.iter().any(|v| v.name == name) {
                return Err(FitnessError::UndefinedVariable(name));
            }
        }
        Ok(Self {
            variables,
            expression,
            matcher,
        })
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Computes the fitness of `structure`. Every variable value is stored
    /// as a property of the structure, followed by the fitness itself.
    pub fn fitness(&self, structure: &mut ChemicalStructure) -> Result<f64, FitnessError> {
        let work = structure.without_dummy_atoms();
        let mut values: HashMap<String, f64> = HashMap::new();

        for variable in &self.variables {
            let Some(samples) = self.samples(variable, &work)? else {
                continue;
            };
            if samples.len() > 1 {
                for (i, v) in samples.iter().enumerate() {
                    structure.set_property(&format!("{}_{i}", variable.name), v);
                }
            }
            let mean = samples.iter().sum::<f64>() / samples.len() as f64;
            structure.set_property(&variable.name, mean);
            values.insert(variable.name.clone(), mean);
        }

        let fitness = self
            .expression
            .evaluate_with(&values)
            .map_err(FitnessError::Evaluation)?;
        debug!(fitness, expression = self.expression.source(), "Fitness computed");
        structure.set_property(tags::FITNESS, fitness);
        Ok(fitness)
    }

    /// Values contributing to a variable, or `None` when a pattern found
    /// nothing to compute on.
    fn samples(&self, var: &Variable, s: &ChemicalStructure) -> Result<Option<Vec<f64>>, FitnessError> {
        let no_result = || FitnessError::NoResult {
            variable: var.name.clone(),
            descriptor: var.descriptor.name().to_string(),
        };
        let scalar = |r: Option<descriptors::DescriptorResult>| {
            r.and_then(|r| r.as_scalar(var.result_index)).ok_or_else(&no_result)
        };

        let kind = var.descriptor.kind();
        let hits = match (kind, &var.pattern) {
            (DescriptorKind::Molecular, _) => {
                return Ok(Some(vec![scalar(var.descriptor.molecular(s))?]));
            }
            (DescriptorKind::Pair, _) => {
                return Err(FitnessError::Unsupported {
                    variable: var.name.clone(),
                    kind,
                });
            }
            (_, Some(pattern)) => self
                .matcher
                .find_all(s, pattern)
                .map_err(|source| FitnessError::Pattern {
                    variable: var.name.clone(),
                    source,
                })?,
            (_, None) => {
                return Err(FitnessError::MissingPattern {
                    variable: var.name.clone(),
                    kind,
                });
            }
        };
        if hits.is_empty() {
            return Ok(None);
        }
        if hits.len() > 1 {
            warn!(
                variable = %var.name,
                hits = hits.len(),
                "Multiple pattern hits; taking the average of all values"
            );
        }

        let mut samples = Vec::new();
        for hit in &hits {
            match kind {
                DescriptorKind::Atomic => {
                    if hit.len() != 1 {
                        warn!(variable = %var.name, "Several atoms in one hit; taking the average of all values");
                    }
                    for &atom in hit {
                        samples.push(scalar(var.descriptor.atomic(s, atom))?);
                    }
                }
                _ => {
                    if hit.len() != 2 {
                        return Err(FitnessError::BondHitArity {
                            variable: var.name.clone(),
                            count: hit.len(),
                        });
                    }
                    samples.push(scalar(var.descriptor.bond(s, hit[0], hit[1]))?);
                }
            }
        }
        Ok(Some(samples))
    }
}
