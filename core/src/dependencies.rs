//! Dependency lists and their comparison.
//!
//! A [`DependencyList`] is the ordered set of keys whose change tells the
//! controller to issue a fresh request. Keys compare with an explicit,
//! per-variant equality: primitives by value, [`Dependency::Identity`] by
//! pointer.
//!
//! # Examples
//!
//! ```
//! use request_state_core::deps;
//! use request_state_core::dependencies::DependencyComparison;
//!
//! let before = deps!["foo", 1];
//! let after = deps!["bar", 1];
//!
//! assert!(!before.matches(&after, DependencyComparison::Strict));
//! assert!(before.matches(&deps!["foo", 1], DependencyComparison::Strict));
//! ```

use smallvec::SmallVec;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// How two dependency lists are compared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DependencyComparison {
    /// Lists of different length are always unequal.
    #[default]
    Strict,

    /// Compare positionally up to the shorter length; trailing entries in the
    /// longer list are ignored.
    ///
    /// Kept for callers that relied on the lenient behavior. A list that only
    /// grows will not trigger a new request under this mode.
    SharedPrefix,
}

/// One dependency key.
#[derive(Clone)]
pub enum Dependency {
    /// Absent value
    Null,
    /// Boolean key
    Bool(bool),
    /// Integer key
    Int(i64),
    /// String key, compared by content
    Str(Arc<str>),
    /// Opaque shared object, compared by reference identity
    Identity(Arc<dyn Any + Send + Sync>),
}

impl Dependency {
    /// Wrap a shared object as an identity key.
    ///
    /// Two identity keys are equal only when they point at the same allocation.
    #[must_use]
    pub fn identity<T: Any + Send + Sync>(value: &Arc<T>) -> Self {
        let erased: Arc<dyn Any + Send + Sync> = Arc::clone(value) as Arc<dyn Any + Send + Sync>;
        Self::Identity(erased)
    }

    /// Key equality: by value for primitives, by pointer for identities.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Identity(a), Self::Identity(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Self::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Self::Identity(arc) => write!(f, "Identity({:p})", Arc::as_ptr(arc)),
        }
    }
}

impl From<bool> for Dependency {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Dependency {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Dependency {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Dependency {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for Dependency {
    fn from(value: &str) -> Self {
        Self::Str(Arc::from(value))
    }
}

impl From<String> for Dependency {
    fn from(value: String) -> Self {
        Self::Str(Arc::from(value))
    }
}

impl<T: Into<Self>> From<Option<T>> for Dependency {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Compare two ordered key sequences with an explicit equality function.
///
/// # Examples
///
/// ```
/// use request_state_core::dependencies::{dependencies_equal, DependencyComparison};
///
/// let eq = |a: &u8, b: &u8| a == b;
/// assert!(!dependencies_equal(&[1, 2], &[1], eq, DependencyComparison::Strict));
/// assert!(dependencies_equal(&[1, 2], &[1], eq, DependencyComparison::SharedPrefix));
/// ```
pub fn dependencies_equal<K, F>(
    previous: &[K],
    next: &[K],
    eq: F,
    mode: DependencyComparison,
) -> bool
where
    F: Fn(&K, &K) -> bool,
{
    if mode == DependencyComparison::Strict && previous.len() != next.len() {
        return false;
    }

    previous.iter().zip(next).all(|(a, b)| eq(a, b))
}

/// Ordered list of dependency keys supplied on every observation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DependencyList(SmallVec<[Dependency; 4]>);

impl DependencyList {
    /// An empty list: requests fire once, on the first observation.
    #[must_use]
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    /// Append a key.
    #[must_use]
    pub fn with(mut self, key: impl Into<Dependency>) -> Self {
        self.0.push(key.into());
        self
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when the list has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys in order.
    #[must_use]
    pub fn as_slice(&self) -> &[Dependency] {
        &self.0
    }

    /// Whether `next` represents the same dependency epoch as `self`.
    #[must_use]
    pub fn matches(&self, next: &Self, mode: DependencyComparison) -> bool {
        dependencies_equal(&self.0, &next.0, Dependency::same_as, mode)
    }
}

impl<D: Into<Dependency>> FromIterator<D> for DependencyList {
    fn from_iter<I: IntoIterator<Item = D>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<Dependency>> for DependencyList {
    fn from(keys: Vec<Dependency>) -> Self {
        Self(SmallVec::from_vec(keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps;
    use proptest::prelude::*;

    #[test]
    fn test_empty_lists_match() {
        assert!(DependencyList::new().matches(&deps![], DependencyComparison::Strict));
    }

    #[test]
    fn test_positional_change_is_detected() {
        assert!(!deps!["foo"].matches(&deps!["bar"], DependencyComparison::Strict));
        assert!(!deps![1, "a"].matches(&deps!["a", 1], DependencyComparison::Strict));
    }

    #[test]
    fn test_length_mismatch_depends_on_mode() {
        let short = deps!["foo"];
        let long = deps!["foo", true];

        assert!(!short.matches(&long, DependencyComparison::Strict));
        assert!(short.matches(&long, DependencyComparison::SharedPrefix));
        assert!(long.matches(&short, DependencyComparison::SharedPrefix));
    }

    #[test]
    fn test_variants_never_cross_match() {
        assert_ne!(Dependency::Int(1), Dependency::Bool(true));
        assert_ne!(Dependency::from("1"), Dependency::Int(1));
        assert_eq!(Dependency::from(None::<i64>), Dependency::Null);
    }

    #[test]
    fn test_identity_compares_by_pointer() {
        let a = Arc::new(vec![1, 2, 3]);
        let b = Arc::new(vec![1, 2, 3]);

        assert_eq!(Dependency::identity(&a), Dependency::identity(&a));
        assert_ne!(Dependency::identity(&a), Dependency::identity(&b));
    }

    proptest! {
        #[test]
        fn prop_list_matches_itself(keys in proptest::collection::vec(any::<i64>(), 0..8)) {
            let list: DependencyList = keys.iter().copied().collect();
            prop_assert!(list.matches(&list.clone(), DependencyComparison::Strict));
        }

        #[test]
        fn prop_strict_implies_shared_prefix(
            a in proptest::collection::vec(0i64..4, 0..5),
            b in proptest::collection::vec(0i64..4, 0..5),
        ) {
            let eq = |x: &i64, y: &i64| x == y;
            if dependencies_equal(&a, &b, eq, DependencyComparison::Strict) {
                prop_assert!(dependencies_equal(&a, &b, eq, DependencyComparison::SharedPrefix));
            }
        }

        #[test]
        fn prop_strict_is_symmetric(
            a in proptest::collection::vec(0i64..3, 0..4),
            b in proptest::collection::vec(0i64..3, 0..4),
        ) {
            let eq = |x: &i64, y: &i64| x == y;
            prop_assert_eq!(
                dependencies_equal(&a, &b, eq, DependencyComparison::Strict),
                dependencies_equal(&b, &a, eq, DependencyComparison::Strict)
            );
        }
    }
}
