//! Dynamic Values
//!
//! Reactive objects hold [`Value`]s. Scalars are stored inline; objects and
//! arrays live behind a shared [`Container`] handle so that the same data can
//! be reached from several places and wrapped as a [`Reactive`] object.
//!
//! # Equality
//!
//! Change detection uses same-value equality, see [`has_changed`]:
//!
//! - Numbers compare like `Object.is`: NaN equals NaN, `0.0` and `-0.0`
//!   differ.
//! - Strings compare by content.
//! - Containers, reactive wrappers and refs compare by identity.

use std::cell::RefCell;
use std::collections::{HashSet, TryReserveError};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

use super::object::{self, Reactive};
use super::refs::Ref;
use crate::error::{ReactiveError, Result};

/// Whether `new` differs from `old`.
pub fn has_changed<T: PartialEq + ?Sized>(new: &T, old: &T) -> bool {
    new != old
}

/// Address of a slot inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A named object property.
    Prop(Rc<str>),
    /// An array element.
    Index(usize),
    /// The length of an array.
    Length,
}

impl Key {
    /// Build a property key.
    pub fn prop(name: &str) -> Self {
        Self::Prop(Rc::from(name))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prop(name) => write!(f, "{name:?}"),
            Self::Index(index) => write!(f, "{index}"),
            Self::Length => f.write_str("length"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::prop(name)
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Prop(Rc::from(name))
    }
}

impl From<Rc<str>> for Key {
    fn from(name: Rc<str>) -> Self {
        Self::Prop(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Identity of a container, stable for its whole life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug)]
enum Data {
    Object(IndexMap<Rc<str>, Value>),
    Array(Vec<Value>),
}

struct ContainerInner {
    id: TargetId,
    data: RefCell<Data>,
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        object::forget_target(self.id);
    }
}

/// A shared, unwrapped object or array.
///
/// Reads and writes through a `Container` are not tracked and do not notify.
/// Wrap it with [`Reactive::new`] to observe it.
#[derive(Clone)]
pub struct Container(Rc<ContainerInner>);

impl Container {
    fn with_data(data: Data) -> Self {
        Self(Rc::new(ContainerInner {
            id: TargetId::next(),
            data: RefCell::new(data),
        }))
    }

    /// An empty object.
    pub fn object() -> Self {
        Self::with_data(Data::Object(IndexMap::new()))
    }

    /// An empty array.
    pub fn array() -> Self {
        Self::with_data(Data::Array(Vec::new()))
    }

    /// An object with the given properties, in order.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Rc<str>>,
        V: Into<Value>,
    {
        let map = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self::with_data(Data::Object(map))
    }

    /// An array with the given elements.
    pub fn from_values<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::with_data(Data::Array(values.into_iter().map(Into::into).collect()))
    }

    /// The container's identity.
    pub fn id(&self) -> TargetId {
        self.0.id
    }

    /// Whether both handles point at the same container.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Whether this is an array.
    pub fn is_array(&self) -> bool {
        matches!(*self.0.data.borrow(), Data::Array(_))
    }

    fn kind(&self) -> &'static str {
        if self.is_array() {
            "an array"
        } else {
            "an object"
        }
    }

    /// Number of properties or elements.
    pub fn len(&self) -> usize {
        match &*self.0.data.borrow() {
            Data::Object(map) => map.len(),
            Data::Array(items) => items.len(),
        }
    }

    /// Whether the container has no properties or elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Property names or indices, in order.
    pub fn keys(&self) -> Vec<Key> {
        match &*self.0.data.borrow() {
            Data::Object(map) => map.keys().cloned().map(Key::Prop).collect(),
            Data::Array(items) => (0..items.len()).map(Key::Index).collect(),
        }
    }

    /// Map a key onto this container's key space.
    ///
    /// Arrays accept `"length"` and numeric property names; objects see
    /// indices and `Length` as property names.
    pub(crate) fn normalize(&self, key: Key) -> Key {
        let is_array = self.is_array();
        match key {
            Key::Prop(name) if is_array => {
                if &*name == "length" {
                    Key::Length
                } else if let Some(index) = array_index(&name) {
                    Key::Index(index)
                } else {
                    Key::Prop(name)
                }
            }
            Key::Index(index) if !is_array => Key::Prop(Rc::from(index.to_string())),
            Key::Length if !is_array => Key::prop("length"),
            key => key,
        }
    }

    /// Read a slot without tracking. Missing slots read as `Null`.
    pub fn get(&self, key: &Key) -> Value {
        let key = self.normalize(key.clone());
        match (&*self.0.data.borrow(), &key) {
            (Data::Object(map), Key::Prop(name)) => map.get(name).cloned().unwrap_or_default(),
            (Data::Array(items), Key::Index(index)) => {
                items.get(*index).cloned().unwrap_or_default()
            }
            (Data::Array(items), Key::Length) => Value::from(items.len()),
            _ => Value::Null,
        }
    }

    /// Write a slot without notifying anyone.
    ///
    /// Writing past the end of an array fills the gap with `Null`; writing
    /// `Length` truncates or extends it.
    pub fn set(&self, key: Key, value: Value) -> Result<()> {
        let key = self.normalize(key);
        let kind = self.kind();
        // Replaced values are dropped after the borrow ends; dropping a
        // container touches runtime state.
        let _replaced: Vec<Value> = {
            let mut data = self.0.data.borrow_mut();
            match (&mut *data, key) {
                (Data::Object(map), Key::Prop(name)) => map.insert(name, value).into_iter().collect(),
                (Data::Array(items), Key::Index(index)) => {
                    if index >= MAX_ARRAY_LENGTH {
                        return Err(ReactiveError::InvalidKey { key: Key::Index(index), kind });
                    }
                    if index >= items.len() {
                        grow(items, index + 1).map_err(|_| ReactiveError::InvalidKey {
                            key: Key::Index(index),
                            kind,
                        })?;
                    }
                    vec![std::mem::replace(&mut items[index], value)]
                }
                (Data::Array(items), Key::Length) => {
                    let len = array_length(&value)?;
                    if len < items.len() {
                        items.split_off(len)
                    } else {
                        grow(items, len).map_err(|_| ReactiveError::InvalidLength(len as f64))?;
                        Vec::new()
                    }
                }
                (_, key) => return Err(ReactiveError::InvalidKey { key, kind }),
            }
        };
        Ok(())
    }

    fn to_json_inner(&self, stack: &mut HashSet<TargetId>) -> Result<JsonValue> {
        if !stack.insert(self.id()) {
            return Err(ReactiveError::Cycle);
        }

        // Children are snapshotted so no borrow is held while recursing
        let json = if self.is_array() {
            let items: Vec<Value> = self.keys().iter().map(|key| self.get(key)).collect();
            let mut out = Vec::with_capacity(items.len());
            for item in &items {
                out.push(item.to_json_inner(stack)?);
            }
            JsonValue::Array(out)
        } else {
            let mut out = serde_json::Map::new();
            for key in self.keys() {
                if let Key::Prop(name) = &key {
                    out.insert(name.to_string(), self.get(&key).to_json_inner(stack)?);
                }
            }
            JsonValue::Object(out)
        };

        stack.remove(&self.id());
        Ok(json)
    }
}

/// Largest array length; valid indices stay below it.
pub const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

/// Parse a canonical decimal index. `"01"` and `"+1"` stay property names.
fn array_index(name: &str) -> Option<usize> {
    let index = name.parse::<usize>().ok()?;
    (index < MAX_ARRAY_LENGTH && index.to_string() == name).then_some(index)
}

fn grow(items: &mut Vec<Value>, len: usize) -> std::result::Result<(), TryReserveError> {
    items.try_reserve(len - items.len())?;
    items.resize(len, Value::Null);
    Ok(())
}

fn array_length(value: &Value) -> Result<usize> {
    match value {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= MAX_ARRAY_LENGTH as f64 => {
            Ok(*n as usize)
        }
        Value::Number(n) => Err(ReactiveError::InvalidLength(*n)),
        _ => Err(ReactiveError::InvalidLength(f64::NAN)),
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Contents are not printed: containers may reference themselves
        f.debug_struct("Container")
            .field("id", &self.id())
            .field("array", &self.is_array())
            .field("len", &self.len())
            .finish()
    }
}

/// A dynamically typed reactive value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A number. All numbers are `f64`.
    Number(f64),
    /// A string.
    String(Rc<str>),
    /// A raw object or array. Wrapped on read through a reactive object.
    Container(Container),
    /// A reactive object or array.
    Reactive(Reactive),
    /// A ref stored inside a container. Unwrapped on read through a reactive
    /// object; writes through the object are redirected into it.
    Ref(Ref<Value>),
}

impl Value {
    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Container(_) => "container",
            Self::Reactive(_) => "reactive",
            Self::Ref(_) => "ref",
        }
    }

    /// Whether the value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The number, if this is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The reactive wrapper, if this is one.
    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Self::Reactive(reactive) => Some(reactive),
            _ => None,
        }
    }

    /// The ref, if this is one.
    pub fn as_ref_cell(&self) -> Option<&Ref<Value>> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// The underlying container of a raw or reactive object.
    pub fn container(&self) -> Option<&Container> {
        match self {
            Self::Container(container) => Some(container),
            Self::Reactive(reactive) => Some(reactive.target()),
            _ => None,
        }
    }

    /// Snapshot as JSON without tracking. Refs are unwrapped.
    ///
    /// Fails with [`ReactiveError::Cycle`] if a container contains itself.
    pub fn to_json(&self) -> Result<JsonValue> {
        self.to_json_inner(&mut HashSet::new())
    }

    fn to_json_inner(&self, stack: &mut HashSet<TargetId>) -> Result<JsonValue> {
        Ok(match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Number(n) => json_number(*n),
            Self::String(s) => JsonValue::String(s.to_string()),
            Self::Container(container) => container.to_json_inner(stack)?,
            Self::Reactive(reactive) => reactive.target().to_json_inner(stack)?,
            Self::Ref(r) => r.get_untracked().to_json_inner(stack)?,
        })
    }
}

fn json_number(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        JsonValue::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(JsonValue::Null, JsonValue::Number)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => {
                a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
            }
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Container(a), Self::Container(b)) => a.ptr_eq(b),
            (Self::Reactive(a), Self::Reactive(b)) => a.ptr_eq(b),
            (Self::Ref(a), Self::Ref(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Self::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(f64, f32, i32, i64, u32, u64, usize);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::Null
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<Container> for Value {
    fn from(container: Container) -> Self {
        Self::Container(container)
    }
}

impl From<Reactive> for Value {
    fn from(reactive: Reactive) -> Self {
        Self::Reactive(reactive)
    }
}

impl From<Ref<Value>> for Value {
    fn from(r: Ref<Value>) -> Self {
        Self::Ref(r)
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Self::from(s),
            JsonValue::Array(items) => Self::Container(Container::from_values(items)),
            JsonValue::Object(map) => Self::Container(Container::from_pairs(
                map.into_iter().map(|(key, value)| (Rc::<str>::from(key), value)),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_use_same_value_equality() {
        assert!(!has_changed(&Value::from(f64::NAN), &Value::from(f64::NAN)));
        assert!(has_changed(&Value::from(0.0), &Value::from(-0.0)));
        assert!(!has_changed(&Value::from(3), &Value::from(3.0)));
    }

    #[test]
    fn containers_compare_by_identity() {
        let a = Container::object();
        let b = Container::object();

        assert_eq!(Value::from(a.clone()), Value::from(a.clone()));
        assert_ne!(Value::from(a), Value::from(b));
    }

    #[test]
    fn json_round_trips_through_containers() {
        let value = Value::from(json!({ "name": "tether", "tags": [1, 2], "nested": { "ok": true } }));

        let container = value.container().expect("object");
        assert!(!container.is_array());
        assert_eq!(container.get(&Key::from("name")).as_str(), Some("tether"));

        assert_eq!(
            value.to_json().expect("acyclic"),
            json!({ "name": "tether", "tags": [1, 2], "nested": { "ok": true } })
        );
    }

    #[test]
    fn array_length_key_truncates_and_extends() {
        let array = Container::from_values([1, 2, 3]);

        array.set(Key::Length, Value::from(1)).expect("valid length");
        assert_eq!(array.len(), 1);

        array.set(Key::Index(3), Value::from(9)).expect("valid index");
        assert_eq!(array.len(), 4);
        assert!(array.get(&Key::Index(2)).is_null());
        assert_eq!(array.get(&Key::prop("length")), Value::from(4));
    }

    #[test]
    fn invalid_keys_and_lengths_are_rejected() {
        let array = Container::array();
        assert!(matches!(
            array.set(Key::prop("name"), Value::Null),
            Err(ReactiveError::InvalidKey { .. })
        ));
        assert_eq!(
            array.set(Key::Length, Value::from(1.5)),
            Err(ReactiveError::InvalidLength(1.5))
        );

        // Objects treat indices as property names
        let object = Container::object();
        object.set(Key::Index(0), Value::from("zero")).expect("object key");
        assert_eq!(object.get(&Key::prop("0")).as_str(), Some("zero"));
    }

    #[test]
    fn oversized_indices_and_lengths_are_rejected() {
        let array = Container::from_values([1]);

        assert_eq!(
            array.set(Key::Index(usize::MAX), Value::from(1)),
            Err(ReactiveError::InvalidKey {
                key: Key::Index(usize::MAX),
                kind: "an array",
            })
        );
        assert!(matches!(
            array.set(Key::Index(MAX_ARRAY_LENGTH), Value::from(1)),
            Err(ReactiveError::InvalidKey { .. })
        ));
        assert_eq!(
            array.set(Key::Length, Value::from(MAX_ARRAY_LENGTH as f64 + 1.0)),
            Err(ReactiveError::InvalidLength(MAX_ARRAY_LENGTH as f64 + 1.0))
        );
        assert_eq!(array.len(), 1);
    }

    #[test]
    fn only_canonical_index_strings_address_elements() {
        let array = Container::from_values([1, 2]);

        assert_eq!(array.normalize(Key::prop("1")), Key::Index(1));
        assert_eq!(array.normalize(Key::prop("01")), Key::prop("01"));
        assert_eq!(array.normalize(Key::prop("+1")), Key::prop("+1"));
        assert_eq!(array.normalize(Key::prop("4294967295")), Key::prop("4294967295"));
        assert_eq!(array.get(&Key::prop("01")), Value::Null);
    }

    #[test]
    fn cyclic_containers_fail_to_serialize() {
        let object = Container::object();
        object
            .set(Key::prop("me"), Value::from(object.clone()))
            .expect("object key");

        assert_eq!(Value::from(object.clone()).to_json(), Err(ReactiveError::Cycle));

        // Break the cycle so the container can be freed
        object.set(Key::prop("me"), Value::Null).expect("object key");
    }

    #[test]
    fn shared_children_are_not_cycles() {
        let child = Container::from_values([1]);
        let parent = Container::from_values([Value::from(child.clone()), Value::from(child)]);

        assert_eq!(Value::from(parent).to_json().expect("acyclic"), json!([[1], [1]]));
    }

    #[test]
    fn serialize_uses_the_json_snapshot() {
        let value = Value::from(json!({ "a": [1.5, null] }));
        let text = serde_json::to_string(&value).expect("serializable");
        assert_eq!(text, r#"{"a":[1.5,null]}"#);
    }
}
