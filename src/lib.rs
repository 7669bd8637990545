//! Gauge Core - expression variables for cockpit instruments
//!
//! Instruments describe their readouts as short expressions such as
//! `nav.Heading()` or `math.Sin(nav.Heading()) * 2 + 1`. This crate turns each
//! distinct expression into one cached variable and keeps those variables up
//! to date once per simulation tick:
//! - Tokenizing and canonicalizing expression text (one variable per meaning)
//! - Binding `ns.method(arg)` shapes straight to host methods
//! - Compiling everything else to bytecode for a small stack interpreter
//! - Tiered, time-sliced re-evaluation with change callbacks
//!
//! ```
//! use gauge_core::host::{HostRegistry, Namespace};
//! use gauge_core::Panel;
//!
//! let hosts = HostRegistry::with_math_library()
//!     .with(Namespace::new("nav", ()).method0("Heading", |_: &()| 45.0));
//! let mut panel = Panel::new(hosts);
//!
//! let heading = panel.get("nav.Heading() * 2").unwrap();
//! panel.tick();
//! assert_eq!(panel[heading].value(), 90.0);
//! ```

use wasm_bindgen::prelude::*;

mod binder;
pub mod bytecode;
pub mod canonical;
pub mod compiler;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod host;
pub mod lexer;
pub mod math;
pub mod panel;
pub mod registry;
pub mod scheduler;
pub mod value;
pub mod variable;
pub mod wasm;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use host::{HostRegistry, Namespace};
pub use panel::{BindingContext, Panel};
pub use scheduler::TickReport;
pub use value::Primitive;
pub use variable::{CallbackError, Tier, Variable, VariableId, VariableKind, VariableSnapshot};

/// Initialize the WASM module
/// Call this once when loading the module to set up panic hooks
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Get the version of the gauge-core library
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
