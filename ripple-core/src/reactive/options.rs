//! Construction options shared by signals, computed nodes and effects.

use std::rc::Rc;

/// Equality predicate deciding whether a write is a change.
pub type EqualsFn<T> = Rc<dyn Fn(&T, &T) -> bool>;

/// Options for `state`, `computed` and `effect`.
///
/// ```rust,ignore
/// let point = rt.state_with(
///     (0.0, 0.0),
///     Options::with_equals(|a: &(f64, f64), b| {
///         (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9
///     })
///     .debug("cursor"),
/// );
/// ```
pub struct Options<T> {
    equals: EqualsFn<T>,
    debug: Option<String>,
}

impl<T: PartialEq + 'static> Options<T> {
    /// Default options: `PartialEq` equality, no label.
    pub fn new() -> Self {
        Self::with_equals(|a: &T, b: &T| a == b)
    }
}

impl<T: PartialEq + 'static> Default for Options<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Options<T> {
    /// Options with a custom equality predicate.
    pub fn with_equals<F>(equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Self {
            equals: Rc::new(equals),
            debug: None,
        }
    }

    /// Options under which every write counts as a change.
    pub fn never_equal() -> Self {
        Self::with_equals(|_: &T, _: &T| false)
    }

    /// Replace the equality predicate.
    pub fn equals<F>(mut self, equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        self.equals = Rc::new(equals);
        self
    }

    /// Attach a diagnostic label. Has no behavioral effect.
    pub fn debug(mut self, label: impl Into<String>) -> Self {
        self.debug = Some(label.into());
        self
    }

    /// The diagnostic label, if any.
    pub fn label(&self) -> Option<&str> {
        self.debug.as_deref()
    }

    pub(crate) fn into_parts(self) -> (EqualsFn<T>, Option<String>) {
        (self.equals, self.debug)
    }
}

impl<T> Clone for Options<T> {
    fn clone(&self) -> Self {
        Self {
            equals: Rc::clone(&self.equals),
            debug: self.debug.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Options<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_partial_eq() {
        let (equals, label) = Options::<i32>::new().into_parts();
        assert!(equals(&1, &1));
        assert!(!equals(&1, &2));
        assert!(label.is_none());
    }

    #[test]
    fn never_equal_rejects_identical_values() {
        let (equals, _) = Options::<()>::never_equal().into_parts();
        assert!(!equals(&(), &()));
    }

    #[test]
    fn builder_methods_compose() {
        let options = Options::<String>::new()
            .equals(|a, b| a.eq_ignore_ascii_case(b))
            .debug("name");

        assert_eq!(options.label(), Some("name"));
        let (equals, _) = options.into_parts();
        assert!(equals(&"Ada".to_string(), &"ADA".to_string()));
    }
}
