//! JavaScript facade
//!
//! `HostTable` collects JS functions as namespace methods; an
//! `InstrumentPanel` owns a `Panel` built from it. Variables cross the
//! boundary as their numeric ids.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::host::{HostRegistry, Namespace};
use crate::panel::{BindingContext, Panel};
use crate::scheduler::TickReport;
use crate::value::{ParamType, Primitive};
use crate::variable::{Variable, VariableId};
use indexmap::IndexMap;
use serde::Serialize;
use wasm_bindgen::prelude::*;

fn to_js(value: &Primitive) -> JsValue {
    match value {
        Primitive::Bool(b) => JsValue::from_bool(*b),
        Primitive::Double(n) => JsValue::from_f64(*n),
        Primitive::Str(s) => JsValue::from_str(s),
    }
}

fn from_js(value: JsValue) -> Result<Primitive, String> {
    if let Some(b) = value.as_bool() {
        return Ok(Primitive::Bool(b));
    }
    if let Some(n) = value.as_f64() {
        return Ok(Primitive::Double(n));
    }
    if let Some(s) = value.as_string() {
        return Ok(Primitive::from(s));
    }
    Err(format!("unsupported return value {:?}", value))
}

fn js_message(err: &JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{:?}", err))
}

fn engine_error(err: EngineError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Host namespaces backed by JavaScript functions
#[wasm_bindgen]
pub struct HostTable {
    hosts: HostRegistry,
}

#[wasm_bindgen]
impl HostTable {
    /// Start with the built-in `math` namespace
    #[wasm_bindgen(constructor)]
    pub fn new() -> HostTable {
        HostTable {
            hosts: HostRegistry::with_math_library(),
        }
    }

    /// Register `namespace.name` as a call to `f`.
    ///
    /// `arg_type` is `undefined` for a zero-argument method, otherwise one of
    /// `"bool"`, `"double"` or `"string"`.
    #[wasm_bindgen(js_name = registerMethod)]
    pub fn register_method(
        &mut self,
        namespace: &str,
        name: &str,
        arg_type: JsValue,
        f: js_sys::Function,
    ) -> Result<(), JsValue> {
        let arg_type: Option<ParamType> = serde_wasm_bindgen::from_value(arg_type)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        let params: Vec<ParamType> = arg_type.into_iter().collect();
        self.hosts.register(Namespace::new(namespace, ()).raw(
            name,
            params,
            false,
            move |_: &(), args: &[Primitive]| {
                let result = match args {
                    [] => f.call0(&JsValue::NULL),
                    [arg] => f.call1(&JsValue::NULL, &to_js(arg)),
                    _ => return Err("JavaScript host methods take at most one argument".to_string()),
                };
                from_js(result.map_err(|e| js_message(&e))?)
            },
        ));
        Ok(())
    }

    #[wasm_bindgen(js_name = hasNamespace)]
    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.hosts.contains(namespace)
    }
}

impl Default for HostTable {
    fn default() -> Self {
        HostTable::new()
    }
}

/// Serializable summary of a `TickReport`
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TickSummary {
    tick: u64,
    native: usize,
    script: usize,
    math_library: usize,
    changed: usize,
    failures: Vec<String>,
}

impl From<TickReport> for TickSummary {
    fn from(report: TickReport) -> Self {
        TickSummary {
            tick: report.tick,
            native: report.native,
            script: report.script,
            math_library: report.math_library,
            changed: report.changed,
            failures: report.failures.iter().map(ToString::to_string).collect(),
        }
    }
}

/// One instrument's variables and scheduler
#[wasm_bindgen]
pub struct InstrumentPanel {
    panel: Panel,
}

impl InstrumentPanel {
    fn get(&self, id: u32) -> Result<&Variable, JsValue> {
        self.panel
            .variable(VariableId(id as usize))
            .ok_or_else(|| engine_error(EngineError::UnknownVariable(id as usize)))
    }
}

#[wasm_bindgen]
impl InstrumentPanel {
    /// `config` is an optional plain object, e.g. `{ scriptUpdatePriority: 4 }`
    #[wasm_bindgen(constructor)]
    pub fn new(hosts: HostTable, config: JsValue) -> Result<InstrumentPanel, JsValue> {
        let config: EngineConfig = if config.is_undefined() || config.is_null() {
            EngineConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config).map_err(|e| JsValue::from_str(&e.to_string()))?
        };
        let panel = Panel::with_config(hosts.hosts, config).map_err(engine_error)?;
        Ok(InstrumentPanel { panel })
    }

    /// Resolve an expression to a variable id. `context` is an optional
    /// object of placeholder → replacement strings.
    #[wasm_bindgen(js_name = getVariable)]
    pub fn get_variable(&mut self, text: &str, context: JsValue) -> Result<u32, JsValue> {
        let context = if context.is_undefined() || context.is_null() {
            BindingContext::default()
        } else {
            let pairs: IndexMap<String, String> = serde_wasm_bindgen::from_value(context)
                .map_err(|e| JsValue::from_str(&e.to_string()))?;
            pairs
                .into_iter()
                .fold(BindingContext::new(), |ctx, (k, v)| ctx.with(k, v))
        };
        let id = self
            .panel
            .get_variable(text, &context)
            .map_err(engine_error)?;
        Ok(id.index() as u32)
    }

    /// Advance one tick; returns a summary object
    pub fn tick(&mut self) -> Result<JsValue, JsValue> {
        let summary = TickSummary::from(self.panel.tick());
        serde_wasm_bindgen::to_value(&summary).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn value(&self, id: u32) -> Result<f64, JsValue> {
        Ok(self.get(id)?.value())
    }

    #[wasm_bindgen(js_name = safeValue)]
    pub fn safe_value(&self, id: u32) -> Result<f64, JsValue> {
        Ok(self.get(id)?.safe_value())
    }

    #[wasm_bindgen(js_name = stringValue)]
    pub fn string_value(&self, id: u32) -> Result<String, JsValue> {
        Ok(self.get(id)?.as_str().to_string())
    }

    #[wasm_bindgen(js_name = rawValue)]
    pub fn raw_value(&self, id: u32) -> Result<JsValue, JsValue> {
        Ok(to_js(self.get(id)?.raw_value()))
    }

    pub fn snapshot(&self, id: u32) -> Result<JsValue, JsValue> {
        let snapshot = self.get(id)?.snapshot();
        serde_wasm_bindgen::to_value(&snapshot).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// `f` receives the new safe value
    #[wasm_bindgen(js_name = onNumericChange)]
    pub fn on_numeric_change(&mut self, id: u32, f: js_sys::Function) -> Result<(), JsValue> {
        self.panel
            .on_numeric_change(VariableId(id as usize), move |value| {
                f.call1(&JsValue::NULL, &JsValue::from_f64(value))
                    .map(|_| ())
                    .map_err(|e| js_message(&e).into())
            })
            .map_err(engine_error)
    }

    #[wasm_bindgen(js_name = onChange)]
    pub fn on_change(&mut self, id: u32, f: js_sys::Function) -> Result<(), JsValue> {
        self.panel
            .on_change(VariableId(id as usize), move || {
                f.call0(&JsValue::NULL)
                    .map(|_| ())
                    .map_err(|e| js_message(&e).into())
            })
            .map_err(engine_error)
    }

    #[wasm_bindgen(getter)]
    pub fn size(&self) -> usize {
        self.panel.len()
    }
}
