//! Cohort predicates.
//!
//! Conditions are built as an explicit expression tree over typed leaves.
//! The tree is evaluated directly by in-memory stores and rendered to SQL by
//! `storage::sql::predicate`, so condition construction never depends on a
//! query dialect.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::action::{Action, ActionStep, UrlMatching, CURRENT_URL_PROPERTY};
use super::property::{PropertyFilter, PropertyOperator};
use super::RetentionError;
use crate::interfaces::EventRecord;

/// Event used when a request names no entity.
pub const PAGEVIEW_EVENT: &str = "$pageview";

/// What a cohort is defined by: a raw event name or a stored action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Event(String),
    Action(i64),
}

impl EntityRef {
    pub fn pageview() -> Self {
        EntityRef::Event(PAGEVIEW_EVENT.to_string())
    }
}

/// Retention semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionMode {
    /// Cohort by first target occurrence, return measured on a second entity.
    #[serde(alias = "retention_first_time")]
    FirstTime,
    /// Target and returning entity are the same.
    #[default]
    #[serde(alias = "retention_recurring")]
    Recurring,
}

/// Parameter prefix separating target and returning conditions in one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamNamespace {
    Target,
    Returning,
    Filter,
}

impl ParamNamespace {
    pub fn prefix(&self) -> &'static str {
        match self {
            ParamNamespace::Target => "target",
            ParamNamespace::Returning => "returning",
            ParamNamespace::Filter => "filter",
        }
    }

    fn param(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix(), suffix)
    }
}

/// Typed predicate leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    /// Event name equality.
    EventIs { param: String, event: String },
    /// Filter on one event property.
    Property { param: String, filter: PropertyFilter },
    /// Event timestamp falls in bucket `index`.
    InBucket { index: usize },
}

/// Conjunction / disjunction tree over [`Leaf`] conditions.
///
/// An empty `All` is true, an empty `Any` is false.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Leaf(Leaf),
}

impl Predicate {
    pub fn always() -> Self {
        Predicate::All(Vec::new())
    }

    /// Conjunction of request-level property filters.
    pub fn from_property_filters(filters: &[PropertyFilter]) -> Self {
        Predicate::All(
            filters
                .iter()
                .enumerate()
                .map(|(i, filter)| {
                    Predicate::Leaf(Leaf::Property {
                        param: ParamNamespace::Filter.param(&format!("prop_{i}")),
                        filter: filter.clone(),
                    })
                })
                .collect(),
        )
    }

    /// Evaluate against one event. `buckets` are the bucket boundaries.
    pub fn matches(&self, event: &EventRecord, buckets: &[DateTime<Utc>]) -> bool {
        match self {
            Predicate::All(parts) => parts.iter().all(|p| p.matches(event, buckets)),
            Predicate::Any(parts) => parts.iter().any(|p| p.matches(event, buckets)),
            Predicate::Leaf(Leaf::EventIs { event: name, .. }) => event.event == *name,
            Predicate::Leaf(Leaf::Property { filter, .. }) => filter.matches(&event.properties),
            Predicate::Leaf(Leaf::InBucket { index }) => {
                match (buckets.get(*index), buckets.get(index + 1)) {
                    (Some(start), Some(end)) => event.timestamp >= *start && event.timestamp < *end,
                    _ => false,
                }
            }
        }
    }

    /// Named parameters the predicate binds, keyed by namespaced name.
    pub fn params(&self) -> BTreeMap<String, Value> {
        let mut params = BTreeMap::new();
        self.collect_params(&mut params);
        params
    }

    fn collect_params(&self, out: &mut BTreeMap<String, Value>) {
        match self {
            Predicate::All(parts) | Predicate::Any(parts) => {
                parts.iter().for_each(|p| p.collect_params(out))
            }
            Predicate::Leaf(Leaf::EventIs { param, event }) => {
                out.insert(param.clone(), Value::String(event.clone()));
            }
            Predicate::Leaf(Leaf::Property { param, filter }) => {
                out.insert(param.clone(), filter.value.clone());
            }
            Predicate::Leaf(Leaf::InBucket { .. }) => {}
        }
    }
}

/// A predicate tagged with the namespace of its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortCondition {
    pub namespace: ParamNamespace,
    pub predicate: Predicate,
}

/// The pair of conditions one retention query needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortConditions {
    /// Target action occurred in the anchor bucket.
    pub target: CohortCondition,
    /// Returning action occurred in a later bucket.
    pub returning: CohortCondition,
}

/// Builds target / returning conditions for a retention request.
#[derive(Debug, Clone)]
pub struct CohortConditionBuilder {
    mode: RetentionMode,
    target: EntityRef,
    returning: EntityRef,
}

impl CohortConditionBuilder {
    /// Missing entities default to pageviews. In recurring mode the
    /// returning entity is always the target.
    pub fn new(
        mode: RetentionMode,
        target: Option<EntityRef>,
        returning: Option<EntityRef>,
    ) -> Self {
        let target = target.unwrap_or_else(EntityRef::pageview);
        let returning = match mode {
            RetentionMode::FirstTime => returning.unwrap_or_else(EntityRef::pageview),
            RetentionMode::Recurring => target.clone(),
        };
        Self {
            mode,
            target,
            returning,
        }
    }

    pub fn mode(&self) -> RetentionMode {
        self.mode
    }

    pub fn target(&self) -> &EntityRef {
        &self.target
    }

    pub fn returning(&self) -> &EntityRef {
        &self.returning
    }

    /// Action ids that must be resolved before [`build`](Self::build).
    pub fn action_ids(&self) -> Vec<i64> {
        let mut ids = Vec::new();
        for entity in [&self.target, &self.returning] {
            if let EntityRef::Action(id) = entity {
                if !ids.contains(id) {
                    ids.push(*id);
                }
            }
        }
        ids
    }

    /// Build both conditions. Referenced actions must be present in `actions`.
    pub fn build(&self, actions: &HashMap<i64, Action>) -> Result<CohortConditions, RetentionError> {
        let target = entity_predicate(&self.target, ParamNamespace::Target, actions)?;

        let returning = match self.mode {
            RetentionMode::Recurring => CohortCondition {
                namespace: ParamNamespace::Target,
                predicate: target.clone(),
            },
            RetentionMode::FirstTime => {
                let returning =
                    entity_predicate(&self.returning, ParamNamespace::Returning, actions)?;
                CohortCondition {
                    namespace: ParamNamespace::Returning,
                    predicate: Predicate::Any(vec![
                        Predicate::All(vec![
                            target.clone(),
                            Predicate::Leaf(Leaf::InBucket { index: 0 }),
                        ]),
                        returning,
                    ]),
                }
            }
        };

        Ok(CohortConditions {
            target: CohortCondition {
                namespace: ParamNamespace::Target,
                predicate: target,
            },
            returning,
        })
    }
}

fn entity_predicate(
    entity: &EntityRef,
    namespace: ParamNamespace,
    actions: &HashMap<i64, Action>,
) -> Result<Predicate, RetentionError> {
    match entity {
        EntityRef::Event(name) => Ok(Predicate::Leaf(Leaf::EventIs {
            param: namespace.param("event"),
            event: name.clone(),
        })),
        EntityRef::Action(id) => {
            let action = actions.get(id).ok_or(RetentionError::ActionNotFound(*id))?;
            Ok(Predicate::Any(
                action
                    .steps
                    .iter()
                    .enumerate()
                    .map(|(i, step)| step_predicate(step, namespace, action.id, i))
                    .collect(),
            ))
        }
    }
}

fn step_predicate(step: &ActionStep, namespace: ParamNamespace, action_id: i64, index: usize) -> Predicate {
    let prefix = format!("action_{action_id}_step_{index}");
    let mut clauses = Vec::new();

    if let Some(event) = &step.event {
        clauses.push(Predicate::Leaf(Leaf::EventIs {
            param: namespace.param(&format!("{prefix}_event")),
            event: event.clone(),
        }));
    }

    if let Some(url) = &step.url {
        let operator = match step.url_matching {
            UrlMatching::Exact => PropertyOperator::Exact,
            UrlMatching::Contains => PropertyOperator::Icontains,
        };
        clauses.push(Predicate::Leaf(Leaf::Property {
            param: namespace.param(&format!("{prefix}_url")),
            filter: PropertyFilter::exact(CURRENT_URL_PROPERTY, url.clone()).with_operator(operator),
        }));
    }

    for (j, filter) in step.properties.iter().enumerate() {
        clauses.push(Predicate::Leaf(Leaf::Property {
            param: namespace.param(&format!("{prefix}_prop_{j}")),
            filter: filter.clone(),
        }));
    }

    Predicate::All(clauses)
}
