//! Built-in template helpers.

use std::sync::Arc;

use chrono::Utc;
use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext, RenderError,
    RenderErrorReason,
};
use serde_json::Value;
use tracing::{debug, error};

use recon_core::{ActionDefinition, AssetService};

use crate::engine::FP_CTX_VAR;
use crate::jq;
use crate::runner::ActionRunner;
use crate::script::ScriptEvaluator;

fn helper_error(message: String) -> RenderError {
    RenderErrorReason::Other(message).into()
}

fn missing_param(function: &str, name: &str) -> RenderError {
    helper_error(format!("'{function}' helper is missing the '{name}' parameter"))
}

fn write_out(out: &mut dyn Output, text: &str) -> HelperResult {
    out.write(text)
        .map_err(|e| helper_error(format!("output error: {e}")))
}

/// Render a JSON value the way templates expect: strings bare, everything
/// else serialized.
fn write_value(out: &mut dyn Output, value: &Value) -> HelperResult {
    match value {
        Value::String(s) => write_out(out, s),
        other => write_out(out, &other.to_string()),
    }
}

fn feature_pack_id(ctx: &Context) -> Option<i64> {
    ctx.data().get(FP_CTX_VAR).and_then(Value::as_i64)
}

/// `{{jq <input> "<expression>"}}` — run a jq expression over the input.
/// A string input is parsed as JSON first.
pub(crate) struct JqHelper;

impl HelperDef for JqHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let input = h.param(0).ok_or_else(|| missing_param("jq", "input"))?.value();
        let expr = h
            .param(1)
            .and_then(|p| p.value().as_str())
            .ok_or_else(|| missing_param("jq", "expression"))?;

        let json = match input {
            Value::String(s) => serde_json::from_str(s)
                .map_err(|e| helper_error(format!("jq input is not valid JSON: {e}")))?,
            other => other.clone(),
        };

        let result = jq::query_one(expr, &json).map_err(|e| helper_error(e.to_string()))?;
        write_value(out, &result)
    }
}

/// `{{execute <action-json>}}` — execute a nested action definition and
/// render the flattened mapped values as a JSON array.
pub(crate) struct ExecuteActionHelper {
    pub(crate) runner: Arc<dyn ActionRunner>,
}

impl ExecuteActionHelper {
    // jq returns an empty collection when a select expression matches
    // nothing; those residues are dropped from the flattened result.
    fn is_empty_collection(value: &Value) -> bool {
        match value {
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }
}

impl HelperDef for ExecuteActionHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let param = h
            .param(0)
            .ok_or_else(|| missing_param("execute", "action"))?
            .value();
        let action: ActionDefinition = match param {
            Value::String(s) => serde_json::from_str(s),
            other => serde_json::from_value(other.clone()),
        }
        .map_err(|e| helper_error(format!("invalid action definition: {e}")))?;

        let feature_pack_id = feature_pack_id(ctx)
            .ok_or_else(|| helper_error("feature pack id is not set in the context".to_string()))?;

        debug!(feature_pack_id, "executing nested action from template");
        let rows = self.runner.run(action, feature_pack_id).map_err(|e| {
            error!(error = %e, "nested action execution failed");
            helper_error(e.to_string())
        })?;

        let values: Vec<Value> = rows
            .into_iter()
            .filter_map(|mut row| row.shift_remove("value"))
            .filter(|v| !v.is_null())
            .filter(|v| !Self::is_empty_collection(v))
            .collect();

        write_out(out, &Value::Array(values).to_string())
    }
}

/// `{{script "<expression>" arg0 arg1 ...}}` — evaluate an inline or
/// asset-backed (`@name`) script. Arguments are bound as `arg0..argN` and
/// collected into an `args` array.
pub(crate) struct ScriptHelper {
    pub(crate) evaluator: Arc<ScriptEvaluator>,
    pub(crate) asset_service: Arc<dyn AssetService>,
}

impl HelperDef for ScriptHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let script = h
            .param(0)
            .and_then(|p| p.value().as_str())
            .ok_or_else(|| missing_param("script", "expression"))?;

        let source = match script.strip_prefix('@') {
            Some(asset_name) => {
                let fp_id = feature_pack_id(ctx).ok_or_else(|| {
                    helper_error("feature pack id is not set in the context".to_string())
                })?;
                let content = self
                    .asset_service
                    .get_asset_content(asset_name, fp_id)
                    .map_err(|e| helper_error(e.to_string()))?;
                String::from_utf8_lossy(&content).into_owned()
            }
            None => script.to_string(),
        };

        let mut bindings = indexmap::IndexMap::new();
        let mut args = Vec::new();
        for (index, param) in h.params().iter().enumerate().skip(1) {
            bindings.insert(format!("arg{}", index - 1), param.value().clone());
            args.push(param.value().clone());
        }
        bindings.insert("args".to_string(), Value::Array(args));

        let result = self
            .evaluator
            .eval(&source, &bindings)
            .map_err(|e| helper_error(e.to_string()))?;
        write_value(out, &result)
    }
}

/// `{{replaceAtSymbol <text>}}` — replace every `@` with `__`.
pub(crate) struct ReplaceAtSymbolHelper;

impl HelperDef for ReplaceAtSymbolHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let text = h
            .param(0)
            .and_then(|p| p.value().as_str())
            .ok_or_else(|| missing_param("replaceAtSymbol", "text"))?;
        write_out(out, &text.replace('@', "__"))
    }
}

/// `{{currentTimeStamp}}` — RFC 3339 UTC timestamp.
pub(crate) struct CurrentTimeStampHelper;

impl HelperDef for CurrentTimeStampHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        _: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        write_out(out, &Utc::now().to_rfc3339())
    }
}

/// `{{currentTimeMillis}}` — milliseconds since the unix epoch.
pub(crate) struct CurrentTimeMillisHelper;

impl HelperDef for CurrentTimeMillisHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        _: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        write_out(out, &Utc::now().timestamp_millis().to_string())
    }
}
