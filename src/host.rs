//! Host namespace registration table
//!
//! Expressions call into the simulation through namespaces such as
//! `nav.Heading()`. Each namespace wraps one receiver object; its methods are
//! registered up front through typed builders and stored type-erased, keyed
//! by name and parameter signature. The table is filled once when a session
//! starts and only read afterwards.
//!
//! ```
//! use gauge_core::host::{HostRegistry, Namespace};
//! use std::cell::Cell;
//!
//! struct Nav {
//!     heading: Cell<f64>,
//! }
//!
//! let mut hosts = HostRegistry::new();
//! hosts.register(
//!     Namespace::new("nav", Nav { heading: Cell::new(45.0) })
//!         .method0("Heading", |nav: &Nav| nav.heading.get()),
//! );
//! assert!(hosts.contains("nav"));
//! ```

use crate::error::HostError;
use crate::value::{ParamType, Primitive};
use indexmap::IndexMap;
use num_traits::ToPrimitive;
use std::fmt;
use std::rc::Rc;

/// Type-erased method body. Arguments are already checked against the
/// method's signature.
pub type MethodFn = Rc<dyn Fn(&[Primitive]) -> Result<Primitive, String>>;

/// One registered host method
pub struct HostMethod {
    namespace: Rc<str>,
    name: Rc<str>,
    params: Vec<ParamType>,
    pure: bool,
    call: MethodFn,
}

impl HostMethod {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    /// Pure, stateless math function (the math-library allow-list)
    pub fn is_pure(&self) -> bool {
        self.pure
    }

    /// True when `args` match this method's signature exactly
    pub fn accepts(&self, args: &[Primitive]) -> bool {
        self.params.len() == args.len()
            && self
                .params
                .iter()
                .zip(args)
                .all(|(param, arg)| *param == arg.param_type())
    }

    /// Call the method
    #[inline]
    pub fn invoke(&self, args: &[Primitive]) -> Result<Primitive, HostError> {
        (self.call)(args).map_err(|message| HostError {
            namespace: self.namespace.to_string(),
            method: self.name.to_string(),
            message,
        })
    }
}

impl fmt::Debug for HostMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostMethod")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("pure", &self.pure)
            .finish()
    }
}

/// A Rust type usable as a host method parameter
pub trait HostArg: Sized {
    const TYPE: ParamType;

    fn from_primitive(value: &Primitive) -> Self;
}

impl HostArg for f64 {
    const TYPE: ParamType = ParamType::Double;

    fn from_primitive(value: &Primitive) -> Self {
        value.to_f64()
    }
}

impl HostArg for bool {
    const TYPE: ParamType = ParamType::Bool;

    fn from_primitive(value: &Primitive) -> Self {
        value.to_bool_lossy()
    }
}

impl HostArg for String {
    const TYPE: ParamType = ParamType::String;

    fn from_primitive(value: &Primitive) -> Self {
        value.to_string()
    }
}

impl HostArg for Rc<str> {
    const TYPE: ParamType = ParamType::String;

    fn from_primitive(value: &Primitive) -> Self {
        match value {
            Primitive::Str(s) => s.clone(),
            other => Rc::from(other.to_string()),
        }
    }
}

/// A Rust type usable as a host method result
pub trait IntoPrimitive {
    fn into_primitive(self) -> Result<Primitive, String>;
}

impl IntoPrimitive for Primitive {
    fn into_primitive(self) -> Result<Primitive, String> {
        Ok(self)
    }
}

impl IntoPrimitive for f64 {
    fn into_primitive(self) -> Result<Primitive, String> {
        Ok(Primitive::Double(self))
    }
}

impl IntoPrimitive for bool {
    fn into_primitive(self) -> Result<Primitive, String> {
        Ok(Primitive::Bool(self))
    }
}

impl IntoPrimitive for String {
    fn into_primitive(self) -> Result<Primitive, String> {
        Ok(Primitive::from(self))
    }
}

impl IntoPrimitive for &'static str {
    fn into_primitive(self) -> Result<Primitive, String> {
        Ok(Primitive::from(self))
    }
}

impl IntoPrimitive for Rc<str> {
    fn into_primitive(self) -> Result<Primitive, String> {
        Ok(Primitive::Str(self))
    }
}

macro_rules! numeric_into_primitive {
    ($($ty:ty),*) => {
        $(
            impl IntoPrimitive for $ty {
                fn into_primitive(self) -> Result<Primitive, String> {
                    Ok(Primitive::Double(self.to_f64().unwrap_or(f64::NAN)))
                }
            }
        )*
    };
}

numeric_into_primitive!(f32, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl<T, E> IntoPrimitive for Result<T, E>
where
    T: IntoPrimitive,
    E: fmt::Display,
{
    fn into_primitive(self) -> Result<Primitive, String> {
        self.map_err(|e| e.to_string())?.into_primitive()
    }
}

/// Builder for one namespace around a receiver object
pub struct Namespace<R> {
    name: Rc<str>,
    receiver: Rc<R>,
    methods: Vec<HostMethod>,
}

impl<R: 'static> Namespace<R> {
    pub fn new(name: &str, receiver: R) -> Self {
        Self::shared(name, Rc::new(receiver))
    }

    /// Use a receiver the host keeps a handle to (to update its values)
    pub fn shared(name: &str, receiver: Rc<R>) -> Self {
        Namespace {
            name: Rc::from(name),
            receiver,
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register an already type-erased method
    pub fn raw(
        mut self,
        name: &str,
        params: Vec<ParamType>,
        pure: bool,
        call: impl Fn(&R, &[Primitive]) -> Result<Primitive, String> + 'static,
    ) -> Self {
        let receiver = self.receiver.clone();
        self.methods.push(HostMethod {
            namespace: self.name.clone(),
            name: Rc::from(name),
            params,
            pure,
            call: Rc::new(move |args: &[Primitive]| call(&receiver, args)),
        });
        self
    }

    pub fn method0<T>(self, name: &str, f: impl Fn(&R) -> T + 'static) -> Self
    where
        T: IntoPrimitive,
    {
        self.raw(name, Vec::new(), false, move |r, _| f(r).into_primitive())
    }

    pub fn method1<A, T>(self, name: &str, f: impl Fn(&R, A) -> T + 'static) -> Self
    where
        A: HostArg,
        T: IntoPrimitive,
    {
        self.raw(name, vec![A::TYPE], false, move |r, args| {
            f(r, A::from_primitive(&args[0])).into_primitive()
        })
    }

    /// Like `method1`, flagged as a pure math function
    pub fn pure1<A, T>(self, name: &str, f: impl Fn(&R, A) -> T + 'static) -> Self
    where
        A: HostArg,
        T: IntoPrimitive,
    {
        self.raw(name, vec![A::TYPE], true, move |r, args| {
            f(r, A::from_primitive(&args[0])).into_primitive()
        })
    }

    pub fn method2<A, B, T>(self, name: &str, f: impl Fn(&R, A, B) -> T + 'static) -> Self
    where
        A: HostArg,
        B: HostArg,
        T: IntoPrimitive,
    {
        self.raw(name, vec![A::TYPE, B::TYPE], false, move |r, args| {
            f(r, A::from_primitive(&args[0]), B::from_primitive(&args[1])).into_primitive()
        })
    }

    pub fn method3<A, B, C, T>(self, name: &str, f: impl Fn(&R, A, B, C) -> T + 'static) -> Self
    where
        A: HostArg,
        B: HostArg,
        C: HostArg,
        T: IntoPrimitive,
    {
        self.raw(name, vec![A::TYPE, B::TYPE, C::TYPE], false, move |r, args| {
            f(
                r,
                A::from_primitive(&args[0]),
                B::from_primitive(&args[1]),
                C::from_primitive(&args[2]),
            )
            .into_primitive()
        })
    }
}

/// Methods of one namespace, grouped by name; each group holds the overloads
#[derive(Default)]
struct NamespaceTable {
    methods: IndexMap<Rc<str>, Vec<Rc<HostMethod>>>,
}

/// The set of namespaces expressions may call into
#[derive(Default)]
pub struct HostRegistry {
    namespaces: IndexMap<String, NamespaceTable>,
}

impl HostRegistry {
    pub fn new() -> Self {
        HostRegistry::default()
    }

    /// Add a namespace. Registering a name twice merges the method sets;
    /// a method with an identical signature replaces the earlier one.
    pub fn register<R: 'static>(&mut self, namespace: Namespace<R>) -> &mut Self {
        let table = self
            .namespaces
            .entry(namespace.name.to_string())
            .or_default();
        for method in namespace.methods {
            let overloads = table.methods.entry(method.name.clone()).or_default();
            overloads.retain(|existing| existing.params != method.params);
            overloads.push(Rc::new(method));
        }
        self
    }

    /// Builder form of `register`
    pub fn with<R: 'static>(mut self, namespace: Namespace<R>) -> Self {
        self.register(namespace);
        self
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.namespaces.contains_key(namespace)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    /// All overloads of `namespace.method`
    pub fn overloads(&self, namespace: &str, method: &str) -> &[Rc<HostMethod>] {
        self.namespaces
            .get(namespace)
            .and_then(|table| table.methods.get(method))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The overload whose parameter list is exactly `params`
    pub fn find(&self, namespace: &str, method: &str, params: &[ParamType]) -> Option<Rc<HostMethod>> {
        self.overloads(namespace, method)
            .iter()
            .find(|m| m.params == params)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Radio {
        freq: Cell<f64>,
    }

    fn radio_hosts() -> HostRegistry {
        HostRegistry::new().with(
            Namespace::new("radio", Radio { freq: Cell::new(118.5) })
                .method0("Frequency", |r: &Radio| r.freq.get())
                .method1("SetFrequency", |r: &Radio, f: f64| {
                    r.freq.set(f);
                    true
                })
                .method1("Label", |_: &Radio, s: String| format!("COM {}", s))
                .method1("Label", |_: &Radio, n: f64| format!("COM #{}", n))
                .method1("Checked", |_: &Radio, v: f64| {
                    if v < 0.0 {
                        Err("negative")
                    } else {
                        Ok(v)
                    }
                })
                .method0("Channels", |_: &Radio| 720u32),
        )
    }

    #[test]
    fn test_find_by_signature() {
        let hosts = radio_hosts();
        assert!(hosts.find("radio", "Frequency", &[]).is_some());
        assert!(hosts.find("radio", "Frequency", &[ParamType::Double]).is_none());
        assert_eq!(hosts.overloads("radio", "Label").len(), 2);
        assert!(hosts.find("radio", "Label", &[ParamType::String]).is_some());
        assert!(hosts.find("nav", "Frequency", &[]).is_none());
    }

    #[test]
    fn test_invoke() {
        let hosts = radio_hosts();
        let freq = hosts.find("radio", "Frequency", &[]).unwrap();
        assert_eq!(freq.invoke(&[]).unwrap(), Primitive::Double(118.5));

        let set = hosts.find("radio", "SetFrequency", &[ParamType::Double]).unwrap();
        set.invoke(&[Primitive::Double(121.5)]).unwrap();
        assert_eq!(freq.invoke(&[]).unwrap(), Primitive::Double(121.5));

        let label = hosts.find("radio", "Label", &[ParamType::String]).unwrap();
        assert_eq!(
            label.invoke(&[Primitive::from("1")]).unwrap(),
            Primitive::from("COM 1")
        );

        let channels = hosts.find("radio", "Channels", &[]).unwrap();
        assert_eq!(channels.invoke(&[]).unwrap(), Primitive::Double(720.0));
    }

    #[test]
    fn test_host_failure_carries_location() {
        let hosts = radio_hosts();
        let checked = hosts.find("radio", "Checked", &[ParamType::Double]).unwrap();
        let err = checked.invoke(&[Primitive::Double(-1.0)]).unwrap_err();
        assert_eq!(err.namespace, "radio");
        assert_eq!(err.method, "Checked");
        assert_eq!(err.message, "negative");
    }

    #[test]
    fn test_reregistering_replaces_same_signature() {
        let mut hosts = radio_hosts();
        hosts.register(Namespace::new("radio", ()).method0("Frequency", |_: &()| 1.0));
        assert_eq!(hosts.overloads("radio", "Frequency").len(), 1);
        let freq = hosts.find("radio", "Frequency", &[]).unwrap();
        assert_eq!(freq.invoke(&[]).unwrap(), Primitive::Double(1.0));
        // Other methods survive the merge
        assert!(hosts.find("radio", "Channels", &[]).is_some());
    }

    #[test]
    fn test_accepts() {
        let hosts = radio_hosts();
        let label = hosts.find("radio", "Label", &[ParamType::Double]).unwrap();
        assert!(label.accepts(&[Primitive::Double(2.0)]));
        assert!(!label.accepts(&[Primitive::from("2")]));
        assert!(!label.accepts(&[]));
    }
}
