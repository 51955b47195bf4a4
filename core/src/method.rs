use crate::error::{CallError, MisuseError};
use crate::name::is_valid_method_name;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A type-erased payload carrier.
///
/// Carriers are created by a [Method]'s factories and moved through `invoke`
/// boundaries as `dyn Payload`. The vtable supplies both downcasting (for
/// handlers that know the concrete type) and codec-neutral encode/decode (for
/// protocols that do not): a carrier converts to and from a [serde_json::Value],
/// which any serde codec can transcode, so non-JSON wire formats work through
/// the same interface.
///
/// The blanket impl covers every `Serialize + DeserializeOwned + Send + Sync`
/// concrete type, so there is nothing to implement by hand.
pub trait Payload: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Encode the carrier into a codec-neutral value.
    fn to_value(&self) -> Result<Value, CallError>;

    /// Replace the carrier's contents by decoding `v`.
    fn set_from_value(&mut self, v: Value) -> Result<(), CallError>;
}

impl<T> Payload for T
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn to_value(&self) -> Result<Value, CallError> {
        serde_json::to_value(self).map_err(|e| CallError::Encode(e.to_string()))
    }

    fn set_from_value(&mut self, v: Value) -> Result<(), CallError> {
        *self = serde_json::from_value(v).map_err(|e| CallError::Decode(e.to_string()))?;
        Ok(())
    }
}

impl dyn Payload + '_ {
    #[inline]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    #[inline]
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }
}

type Factory = Box<dyn Fn() -> Box<dyn Payload> + Send + Sync>;

struct MethodInner {
    name: String,
    in_type: TypeId,
    in_type_name: &'static str,
    in_factory: Factory,
    out_type: TypeId,
    out_type_name: &'static str,
    out_factory: Factory,
}

/// A named, typed operation descriptor: name plus input/output carrier
/// factories, with the concrete carrier types recorded at construction.
///
/// A `Method` is identity-equal to itself only; two methods constructed with
/// the same name are distinct entities. Cloning is cheap and preserves
/// identity.
#[derive(Clone)]
pub struct Method(Arc<MethodInner>);

impl Method {
    /// Define a new method. The factories produce fresh carriers of the
    /// concrete types `I` / `O`, which are recorded as the method's input and
    /// output types.
    ///
    /// Panics when `name` does not match the name grammar.
    pub fn new<I, O, FI, FO>(name: &str, in_factory: FI, out_factory: FO) -> Self
    where
        I: Serialize + DeserializeOwned + Send + Sync + 'static,
        O: Serialize + DeserializeOwned + Send + Sync + 'static,
        FI: Fn() -> I + Send + Sync + 'static,
        FO: Fn() -> O + Send + Sync + 'static,
    {
        if !is_valid_method_name(name) {
            panic!("{}", MisuseError::BadMethodName);
        }
        Method(Arc::new(MethodInner {
            name: name.to_string(),
            in_type: TypeId::of::<I>(),
            in_type_name: type_name::<I>(),
            in_factory: Box::new(move || Box::new(in_factory())),
            out_type: TypeId::of::<O>(),
            out_type_name: type_name::<O>(),
            out_factory: Box::new(move || Box::new(out_factory())),
        }))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Produce a fresh input carrier; it already satisfies
    /// [Method::assert_input_type].
    #[inline]
    pub fn gen_input(&self) -> Box<dyn Payload> {
        (self.0.in_factory)()
    }

    /// Produce a fresh output carrier; it already satisfies
    /// [Method::assert_output_type].
    #[inline]
    pub fn gen_output(&self) -> Box<dyn Payload> {
        (self.0.out_factory)()
    }

    /// Panics unless `input` has exactly the recorded input type. Type
    /// identity is strict runtime equality, not structural compatibility.
    pub fn assert_input_type(&self, input: &dyn Payload) {
        if input.as_any().type_id() != self.0.in_type {
            panic!("method {:?} input expects {}", self.0.name, self.0.in_type_name);
        }
    }

    /// Panics unless `output` has exactly the recorded output type.
    pub fn assert_output_type(&self, output: &dyn Payload) {
        if output.as_any().type_id() != self.0.out_type {
            panic!("method {:?} output expects {}", self.0.name, self.0.out_type_name);
        }
    }
}

impl PartialEq for Method {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Method {}

impl Hash for Method {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Method({})", self.0.name)
    }
}

/// An unordered set of methods addressable by name, with uniqueness on name.
///
/// Cloning is cheap. Membership ([Interface::has_method]) is identity on the
/// method, not on its name: an interface that maps a name to a *different*
/// method does not contain this one.
#[derive(Clone, Default)]
pub struct Interface(Arc<HashMap<String, Method>>);

impl Interface {
    /// Compose interfaces into one. A [Method] converts into a singleton
    /// interface, so methods and interfaces mix freely. On name collision the
    /// later definition wins: the caller is declaring which method is visible
    /// under that name in the composed view.
    pub fn new<I>(itfs: I) -> Self
    where
        I: IntoIterator<Item = Interface>,
    {
        let mut map = HashMap::new();
        for itf in itfs {
            for m in itf.methods() {
                map.insert(m.name().to_string(), m);
            }
        }
        Interface(Arc::new(map))
    }

    /// Identity membership test.
    pub fn has_method(&self, method: &Method) -> bool {
        self.0.get(method.name()).is_some_and(|m| m == method)
    }

    /// Lookup by name; `None` when unknown.
    pub fn method_by_name(&self, name: &str) -> Option<Method> {
        self.0.get(name).cloned()
    }

    /// All methods, in unspecified order.
    pub fn methods(&self) -> Vec<Method> {
        self.0.values().cloned().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Method> for Interface {
    fn from(m: Method) -> Self {
        let mut map = HashMap::with_capacity(1);
        map.insert(m.name().to_string(), m);
        Interface(Arc::new(map))
    }
}

impl From<&Method> for Interface {
    #[inline]
    fn from(m: &Method) -> Self {
        m.clone().into()
    }
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.0.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        write!(f, "Interface{:?}", names)
    }
}
