//! Comparison filter conditions.
//!
//! A condition decides whether one discovered object represents a
//! discrepancy, given the opposing object list. Conditions are looked up
//! by name through an explicit registry; a filter without a condition
//! matches every source object.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use recon_core::{AssetService, FilterDefinition, ObjectKind};
use recon_substitution::ScriptEvaluator;

use crate::error::FlowError;

/// Evaluation context for one object: snapshots taken under the object
/// locks so conditions never hold them while evaluating.
pub struct FilterContext {
    /// Properties of the object under evaluation.
    pub object_properties: IndexMap<String, Value>,
    /// Properties of the linked opposing object; empty when unlinked.
    pub linked_properties: IndexMap<String, Value>,
    /// Property snapshots of every opposing object. Conditions may narrow
    /// this list while matching.
    pub opposing: Vec<IndexMap<String, Value>>,
    pub feature_pack_id: i64,
    pub inputs: IndexMap<String, Value>,
}

impl FilterContext {
    /// True when the link stage paired this object with an opposing one.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        !self.linked_properties.is_empty()
    }
}

/// A named comparison condition.
pub trait Condition: Send + Sync {
    /// Which object kind the condition evaluates.
    fn kind(&self) -> ObjectKind;

    /// Whether the object in the context is a discrepancy under this
    /// filter.
    fn evaluate(&self, filter: &FilterDefinition, ctx: &mut FilterContext)
        -> Result<bool, FlowError>;
}

impl std::fmt::Debug for dyn Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condition").field("kind", &self.kind()).finish()
    }
}

/// Compare two property values. Values are equal when structurally equal
/// or when their string renditions agree, so `42` matches `"42"` across
/// systems that disagree on types.
fn values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    if a == b {
        return true;
    }
    stringify(a) == stringify(b)
}

fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "null".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Parsed condition argument: property key pairs in
/// `srcKey:targetKey&srcKey2:targetKey2` form. A bare key names the same
/// property on both sides.
#[derive(Debug)]
pub struct PropertiesArg {
    pairs: Vec<(String, String)>,
}

impl PropertiesArg {
    pub fn parse(arg: &str) -> Result<Self, FlowError> {
        let mut pairs = Vec::new();
        for part in arg.split('&') {
            let part = part.trim();
            if part.is_empty() {
                return Err(FlowError::invalid_condition_arg(arg, "empty property pair"));
            }
            match part.split_once(':') {
                Some((own, opposing)) => {
                    let own = own.trim();
                    let opposing = opposing.trim();
                    if own.is_empty() || opposing.is_empty() {
                        return Err(FlowError::invalid_condition_arg(
                            arg,
                            format!("malformed property pair '{part}'"),
                        ));
                    }
                    pairs.push((own.to_string(), opposing.to_string()));
                }
                None => pairs.push((part.to_string(), part.to_string())),
            }
        }
        Ok(Self { pairs })
    }

    /// True when every pair matches between the two property maps.
    #[must_use]
    pub fn all_match(
        &self,
        own: &IndexMap<String, Value>,
        opposing: &IndexMap<String, Value>,
    ) -> bool {
        self.pairs
            .iter()
            .all(|(own_key, opposing_key)| values_equal(own.get(own_key), opposing.get(opposing_key)))
    }
}

fn condition_arg<'a>(filter: &'a FilterDefinition) -> Option<&'a str> {
    filter.condition.as_ref().and_then(|c| c.arg.as_deref())
}

fn required_arg<'a>(filter: &'a FilterDefinition, name: &str) -> Result<&'a str, FlowError> {
    condition_arg(filter)
        .ok_or_else(|| FlowError::invalid_condition_arg(name, "an argument is required"))
}

/// Is the source object present in the target system?
///
/// Without an argument the link stage's verdict is used. With property
/// pairs: a linked object matches when every pair agrees with the linked
/// target; an unlinked object matches when any target agrees on every
/// pair (the opposing list is narrowed to those candidates).
pub struct SourceInTarget;

impl SourceInTarget {
    fn matches(filter: &FilterDefinition, ctx: &mut FilterContext) -> Result<bool, FlowError> {
        let Some(arg) = condition_arg(filter) else {
            return Ok(ctx.is_linked());
        };
        let pairs = PropertiesArg::parse(arg)?;
        if ctx.is_linked() {
            return Ok(pairs.all_match(&ctx.object_properties, &ctx.linked_properties));
        }
        let object_properties = &ctx.object_properties;
        ctx.opposing
            .retain(|candidate| pairs.all_match(object_properties, candidate));
        Ok(!ctx.opposing.is_empty())
    }
}

impl Condition for SourceInTarget {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Source
    }

    fn evaluate(
        &self,
        filter: &FilterDefinition,
        ctx: &mut FilterContext,
    ) -> Result<bool, FlowError> {
        Self::matches(filter, ctx)
    }
}

/// Is the source object missing from the target system? The negation of
/// [`SourceInTarget`].
pub struct SourceNotInTarget;

impl Condition for SourceNotInTarget {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Source
    }

    fn evaluate(
        &self,
        filter: &FilterDefinition,
        ctx: &mut FilterContext,
    ) -> Result<bool, FlowError> {
        Ok(!SourceInTarget::matches(filter, ctx)?)
    }
}

/// Is the source object present in the target system but with diverging
/// property values? Requires the link stage and a property-pair argument;
/// an unlinked object is never mismatched (it is missing instead).
pub struct SourceMismatchedInTarget;

impl Condition for SourceMismatchedInTarget {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Source
    }

    fn evaluate(
        &self,
        filter: &FilterDefinition,
        ctx: &mut FilterContext,
    ) -> Result<bool, FlowError> {
        let arg = required_arg(filter, "sourceMismatchedInTarget")?;
        if !ctx.is_linked() {
            return Ok(false);
        }
        let pairs = PropertiesArg::parse(arg)?;
        Ok(!pairs.all_match(&ctx.object_properties, &ctx.linked_properties))
    }
}

/// Is the target object absent from the source system? Pair keys name the
/// source property first and the target's own property second.
pub struct TargetNotInSource;

impl Condition for TargetNotInSource {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Target
    }

    fn evaluate(
        &self,
        filter: &FilterDefinition,
        ctx: &mut FilterContext,
    ) -> Result<bool, FlowError> {
        let Some(arg) = condition_arg(filter) else {
            return Ok(!ctx.is_linked());
        };
        let pairs = PropertiesArg::parse(arg)?;
        if ctx.is_linked() {
            return Ok(!pairs.all_match(&ctx.linked_properties, &ctx.object_properties));
        }
        let object_properties = &ctx.object_properties;
        Ok(!ctx
            .opposing
            .iter()
            .any(|candidate| pairs.all_match(candidate, object_properties)))
    }
}

/// Matches every source object. Backs filters declared without a
/// condition.
pub struct MatchAllSource;

impl Condition for MatchAllSource {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Source
    }

    fn evaluate(&self, _: &FilterDefinition, _: &mut FilterContext) -> Result<bool, FlowError> {
        Ok(true)
    }
}

/// Evaluates a script expression over the object and the opposing list.
/// The argument is the expression, or an asset name when prefixed `@`.
pub struct ScriptCondition {
    kind: ObjectKind,
    evaluator: Arc<ScriptEvaluator>,
    asset_service: Arc<dyn AssetService>,
}

impl ScriptCondition {
    #[must_use]
    pub fn new(
        kind: ObjectKind,
        evaluator: Arc<ScriptEvaluator>,
        asset_service: Arc<dyn AssetService>,
    ) -> Self {
        Self {
            kind,
            evaluator,
            asset_service,
        }
    }

    fn resolve_source(&self, arg: &str, feature_pack_id: i64) -> Result<String, FlowError> {
        match arg.strip_prefix('@') {
            Some(asset_name) => {
                let content = self
                    .asset_service
                    .get_asset_content(asset_name, feature_pack_id)
                    .map_err(recon_substitution::SubstitutionError::from)?;
                Ok(String::from_utf8_lossy(&content).into_owned())
            }
            None => Ok(arg.to_string()),
        }
    }

    fn coerce(name: &str, result: Value) -> Result<bool, FlowError> {
        match result {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            Value::String(s) => Ok(s.eq_ignore_ascii_case("true")),
            other => Err(FlowError::invalid_condition_arg(
                name,
                format!("script returned non-boolean value: {other}"),
            )),
        }
    }
}

impl Condition for ScriptCondition {
    fn kind(&self) -> ObjectKind {
        self.kind
    }

    fn evaluate(
        &self,
        filter: &FilterDefinition,
        ctx: &mut FilterContext,
    ) -> Result<bool, FlowError> {
        let name = filter
            .condition
            .as_ref()
            .map_or("script", |c| c.name.as_str());
        let arg = required_arg(filter, name)?;
        let source = self.resolve_source(arg, ctx.feature_pack_id)?;

        let opposing: Vec<Value> = ctx
            .opposing
            .iter()
            .map(|properties| serde_json::to_value(properties).unwrap_or(Value::Null))
            .collect();
        let own = serde_json::to_value(&ctx.object_properties).unwrap_or(Value::Null);

        let mut bindings = IndexMap::new();
        bindings.insert(
            "inputs".to_string(),
            serde_json::to_value(&ctx.inputs).unwrap_or(Value::Null),
        );
        match self.kind {
            ObjectKind::Source => {
                bindings.insert("source".to_string(), own);
                bindings.insert("targets".to_string(), Value::Array(opposing));
            }
            ObjectKind::Target => {
                bindings.insert("target".to_string(), own);
                bindings.insert("sources".to_string(), Value::Array(opposing));
            }
        }

        let result = self.evaluator.eval(&source, &bindings)?;
        Self::coerce(name, result)
    }
}

/// Maps condition names to implementations. A filter without a condition
/// resolves to [`MatchAllSource`].
pub struct ConditionRegistry {
    conditions: HashMap<String, Arc<dyn Condition>>,
    match_all: Arc<dyn Condition>,
}

impl ConditionRegistry {
    /// Build the registry with the built-in conditions.
    #[must_use]
    pub fn standard(evaluator: Arc<ScriptEvaluator>, asset_service: Arc<dyn AssetService>) -> Self {
        let mut conditions: HashMap<String, Arc<dyn Condition>> = HashMap::new();
        conditions.insert("sourceInTarget".to_string(), Arc::new(SourceInTarget));
        conditions.insert("sourceNotInTarget".to_string(), Arc::new(SourceNotInTarget));
        conditions.insert(
            "sourceMismatchedInTarget".to_string(),
            Arc::new(SourceMismatchedInTarget),
        );
        conditions.insert("targetNotInSource".to_string(), Arc::new(TargetNotInSource));
        conditions.insert("matchAllSource".to_string(), Arc::new(MatchAllSource));
        conditions.insert(
            "script".to_string(),
            Arc::new(ScriptCondition::new(
                ObjectKind::Source,
                evaluator.clone(),
                asset_service.clone(),
            )),
        );
        conditions.insert(
            "targetScript".to_string(),
            Arc::new(ScriptCondition::new(
                ObjectKind::Target,
                evaluator,
                asset_service,
            )),
        );
        Self {
            conditions,
            match_all: Arc::new(MatchAllSource),
        }
    }

    /// Register a condition, replacing any previous one of the same name.
    pub fn register(&mut self, name: impl Into<String>, condition: Arc<dyn Condition>) {
        self.conditions.insert(name.into(), condition);
    }

    /// Resolve the condition of a filter.
    pub fn resolve(
        &self,
        filter_name: &str,
        filter: &FilterDefinition,
    ) -> Result<Arc<dyn Condition>, FlowError> {
        let Some(condition) = &filter.condition else {
            return Ok(self.match_all.clone());
        };
        self.conditions
            .get(&condition.name)
            .cloned()
            .ok_or_else(|| FlowError::UnsupportedCondition {
                filter: filter_name.to_string(),
                condition: condition.name.clone(),
            })
    }
}
