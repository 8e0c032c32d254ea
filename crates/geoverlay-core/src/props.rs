//! Structural diffing of declared prop sets.
//!
//! Layers describe their inputs as a [`PropSet`]: a fixed schema of named
//! values. Two prop sets are compared key by key, with an ignore list for
//! inputs that have their own change detection (data, update triggers).

use std::any::TypeId;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// A single comparable prop value.
///
/// `Ref` holds an identity token (an address) for inputs that are compared
/// by reference rather than by value, such as shared data containers.
/// `Type` identifies a zero-sized function by its type.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Vector(Vec<f64>),
    Ref(usize),
    Type(TypeId),
}

impl PropValue {
    /// Identity token for any referenced value.
    pub fn identity<T: ?Sized>(value: &T) -> Self {
        Self::Ref(std::ptr::from_ref(value).cast::<()>() as usize)
    }

    /// Identity token that stays equal across copies of a zero-sized value.
    ///
    /// Functions and closures that capture nothing are zero-sized, and any two
    /// values of such a type behave the same. Everything else falls back to
    /// [`PropValue::identity`].
    pub fn stable_identity<T: 'static>(value: &T) -> Self {
        if std::mem::size_of::<T>() == 0 {
            Self::Type(TypeId::of::<T>())
        } else {
            Self::identity(value)
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Null => write!(f, "null"),
            PropValue::Bool(v) => write!(f, "{v}"),
            PropValue::Int(v) => write!(f, "{v}"),
            PropValue::Float(v) => write!(f, "{v}"),
            PropValue::Text(v) => write!(f, "{v:?}"),
            PropValue::Vector(v) => write!(f, "{v:?}"),
            PropValue::Ref(v) => write!(f, "<ref {v:#x}>"),
            PropValue::Type(v) => write!(f, "<fn {v:?}>"),
        }
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<usize> for PropValue {
    fn from(v: usize) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for PropValue {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<f64>> for PropValue {
    fn from(v: Vec<f64>) -> Self {
        Self::Vector(v)
    }
}

impl<T: Into<PropValue>> From<Option<T>> for PropValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A shared function that carries its prop identity.
///
/// Build one from a concrete function with [`Callback::with_identity`] and
/// [`PropValue::stable_identity`], or from an existing `Rc` with
/// [`Callback::shared`]. Clones compare equal.
pub struct Callback<F: ?Sized> {
    func: Rc<F>,
    identity: PropValue,
}

impl<F: ?Sized> Callback<F> {
    /// Wraps a shared function, identified by its allocation.
    pub fn shared(func: Rc<F>) -> Self {
        let identity = PropValue::identity(func.as_ref());
        Self { func, identity }
    }

    pub fn with_identity(func: Rc<F>, identity: PropValue) -> Self {
        Self { func, identity }
    }

    pub fn identity(&self) -> &PropValue {
        &self.identity
    }
}

impl<F: ?Sized> Clone for Callback<F> {
    fn clone(&self) -> Self {
        Self {
            func: Rc::clone(&self.func),
            identity: self.identity.clone(),
        }
    }
}

impl<F: ?Sized> Deref for Callback<F> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.func
    }
}

impl<F: ?Sized> fmt::Debug for Callback<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({})", self.identity)
    }
}

impl<F: ?Sized> From<&Callback<F>> for PropValue {
    fn from(callback: &Callback<F>) -> Self {
        callback.identity.clone()
    }
}

/// An ordered set of named prop values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropSet {
    values: BTreeMap<String, PropValue>,
}

impl PropSet {
    /// Creates an empty prop set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts or replaces a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Gets a value by key.
    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.values.get(key)
    }

    /// Returns true if the key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Iterates over keys and values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<PropValue>> FromIterator<(K, V)> for PropSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

/// Compares two prop sets key by key.
///
/// Returns `None` when every non-ignored key is present in both with equal
/// values, otherwise a description of the first difference found.
pub fn compare_props(old: &PropSet, new: &PropSet, ignore: &[&str]) -> Option<String> {
    for (key, old_value) in old.iter() {
        if ignore.contains(&key) {
            continue;
        }
        match new.get(key) {
            None => return Some(format!("prop {key} dropped: {old_value} -> (undefined)")),
            Some(new_value) if new_value != old_value => {
                return Some(format!("prop {key} changed: {old_value} -> {new_value}"));
            }
            Some(_) => {}
        }
    }

    for (key, new_value) in new.iter() {
        if !ignore.contains(&key) && !old.contains(key) {
            return Some(format!("prop {key} added: (undefined) -> {new_value}"));
        }
    }

    None
}
