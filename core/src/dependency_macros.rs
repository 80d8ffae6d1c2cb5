//! Declarative macros for building dependency lists.

/// Build a [`DependencyList`](crate::dependencies::DependencyList) from keys.
///
/// Every key goes through `Dependency::from`, so strings, integers, booleans
/// and `Option`s of those can be mixed freely.
///
/// # Example
///
/// ```rust
/// use request_state_core::deps;
///
/// let user_id = 42;
/// let list = deps![user_id, "active", true];
/// assert_eq!(list.len(), 3);
///
/// let empty = deps![];
/// assert!(empty.is_empty());
/// ```
#[macro_export]
macro_rules! deps {
    () => {
        $crate::dependencies::DependencyList::new()
    };
    ($($key:expr),+ $(,)?) => {
        $crate::dependencies::DependencyList::new()
            $(.with($crate::dependencies::Dependency::from($key)))+
    };
}
