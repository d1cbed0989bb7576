pub(crate) mod private_traits {
    pub trait TableIdPrivate {
        fn new(value: i32) -> Self;
        fn raw(&self) -> i32;
    }
}

/// An integer-like object referring to a table row.
/// Trait objects can be `NULL`, indicating that
/// there is no row associated with the object.
///
/// This trait cannot be implemented for types not
/// defined in this crate:
///
/// ```compile_fail
/// impl gentrees::TableId for i32 {
///     fn is_null(&self) -> bool {
///         false
///     }
///
///     fn into_raw(self) -> i32 {
///         self
///     }
/// }
/// ```
pub trait TableId: std::fmt::Debug + Copy + private_traits::TableIdPrivate {
    /// Return true if `self` is equal to the
    /// type's `NULL` value.
    fn is_null(&self) -> bool;

    /// Return the underlying integer value.
    fn into_raw(self) -> i32;
}
