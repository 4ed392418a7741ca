// src/core/dimension.rs

//! Named sample dimensions and the traits of objects that have them.

use std::fmt;

use crate::core::symbolic::{Cardinality, SymbolId};
use crate::errors::Result;

/// Size of one dimension: a number of samples, or a placeholder while that
/// number is not known yet.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Size {
    Concrete(u64),
    Symbolic(SymbolId),
}

impl Size {
    pub fn symbol(name: impl AsRef<str>) -> Self {
        Size::Symbolic(SymbolId::new(name))
    }

    pub fn as_concrete(&self) -> Option<u64> {
        match self {
            Size::Concrete(n) => Some(*n),
            Size::Symbolic(_) => None,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Size::Symbolic(_))
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Size::Concrete(0))
    }
}

impl From<u64> for Size {
    fn from(value: u64) -> Self {
        Size::Concrete(value)
    }
}

impl From<Size> for Cardinality {
    fn from(value: Size) -> Self {
        match value {
            Size::Concrete(n) => Cardinality::Concrete(n),
            Size::Symbolic(s) => Cardinality::Symbol(s),
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Size::Concrete(n) => write!(f, "{n}"),
            Size::Symbolic(s) => write!(f, "{s}"),
        }
    }
}

/// A named dimension of a sample collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Dimension {
    name: String,
    size: Size,
}

impl Dimension {
    pub fn new(name: impl Into<String>, size: impl Into<Size>) -> Self {
        Self {
            name: name.into(),
            size: size.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> &Size {
        &self.size
    }

    /// Replace the size outright, shrinking included.
    pub fn set_size(&mut self, value: Size) -> bool {
        let changed = value != self.size;
        self.size = value;
        changed
    }

    /// Merge new size information into this dimension.
    ///
    /// A concrete size only grows (max-merge); a symbolic size may be
    /// resolved to a concrete one. A concrete size is never replaced by a
    /// symbol. Returns whether the size changed.
    pub fn update_size(&mut self, value: Size) -> bool {
        let merged = match (&self.size, value) {
            (Size::Concrete(current), Size::Concrete(new)) => Size::Concrete((*current).max(new)),
            (Size::Symbolic(_), Size::Concrete(new)) => Size::Concrete(new),
            (current, Size::Symbolic(_)) => current.clone(),
        };

        let changed = merged != self.size;
        self.size = merged;
        changed
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.size)
    }
}

/// Anything that delivers samples laid out along named dimensions.
///
/// Only [`HasDimensions::dimensions`] is required; the rest are projections
/// of it and are recomputed on every call.
pub trait HasDimensions {
    fn dimensions(&self) -> Result<Vec<Dimension>>;

    fn dimnames(&self) -> Result<Vec<String>> {
        Ok(self.dimensions()?.into_iter().map(|d| d.name).collect())
    }

    fn size(&self) -> Result<Vec<Size>> {
        Ok(self.dimensions()?.into_iter().map(|d| d.size).collect())
    }

    fn ndims(&self) -> Result<usize> {
        Ok(self.dimensions()?.len())
    }
}

/// Objects that take their dimensions from an upstream object and reshape
/// them with a pure function.
pub trait ForwardsDimensions: HasDimensions {
    fn source_dimensions(&self) -> Result<Vec<Dimension>>;

    fn combine_dimensions(&self, dimensions: Vec<Dimension>) -> Vec<Dimension>;

    fn forwarded_dimensions(&self) -> Result<Vec<Dimension>> {
        Ok(self.combine_dimensions(self.source_dimensions()?))
    }
}

/// Is a size "trivial" for broadcasting: `()`, `(0,)` or `(1,)`.
pub fn is_trivial_size(size: &[Size]) -> bool {
    matches!(size, [] | [Size::Concrete(0)] | [Size::Concrete(1)])
}

/// A size that delivers no samples at all: empty, or all dimensions zero.
pub fn is_empty_size(size: &[Size]) -> bool {
    size.iter().all(Size::is_zero)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<Dimension>);

    impl HasDimensions for Fixed {
        fn dimensions(&self) -> Result<Vec<Dimension>> {
            Ok(self.0.clone())
        }
    }

    struct Renamer(Fixed);

    impl HasDimensions for Renamer {
        fn dimensions(&self) -> Result<Vec<Dimension>> {
            self.forwarded_dimensions()
        }
    }

    impl ForwardsDimensions for Renamer {
        fn source_dimensions(&self) -> Result<Vec<Dimension>> {
            self.0.dimensions()
        }

        fn combine_dimensions(&self, dimensions: Vec<Dimension>) -> Vec<Dimension> {
            dimensions
                .into_iter()
                .map(|d| Dimension::new(format!("{}_x", d.name()), d.size().clone()))
                .collect()
        }
    }

    #[test]
    fn update_size_only_grows_or_resolves() {
        let mut dim = Dimension::new("source", Size::symbol("N_source"));
        assert!(dim.update_size(Size::Concrete(3)));
        assert_eq!(dim.size(), &Size::Concrete(3));

        assert!(!dim.update_size(Size::Concrete(2)));
        assert_eq!(dim.size(), &Size::Concrete(3));

        assert!(!dim.update_size(Size::symbol("N_other")));
        assert_eq!(dim.size(), &Size::Concrete(3));

        assert!(dim.update_size(Size::Concrete(5)));
        assert_eq!(dim.size(), &Size::Concrete(5));
    }

    #[test]
    fn set_size_may_shrink() {
        let mut dim = Dimension::new("source", 3);
        assert!(dim.set_size(Size::Concrete(2)));
        assert_eq!(dim.size(), &Size::Concrete(2));
        assert!(!dim.set_size(Size::Concrete(2)));
    }

    #[test]
    fn projections_follow_dimensions() {
        let fixed = Fixed(vec![Dimension::new("a", 2), Dimension::new("b", Size::symbol("N_b"))]);
        assert_eq!(fixed.dimnames().unwrap(), vec!["a", "b"]);
        assert_eq!(fixed.size().unwrap(), vec![Size::Concrete(2), Size::symbol("N_b")]);
        assert_eq!(fixed.ndims().unwrap(), 2);
    }

    #[test]
    fn forwarding_applies_combine() {
        let renamer = Renamer(Fixed(vec![Dimension::new("a", 2)]));
        assert_eq!(renamer.dimnames().unwrap(), vec!["a_x"]);
    }

    #[test]
    fn trivial_and_empty_sizes() {
        assert!(is_trivial_size(&[]));
        assert!(is_trivial_size(&[Size::Concrete(1)]));
        assert!(!is_trivial_size(&[Size::Concrete(2)]));
        assert!(is_empty_size(&[Size::Concrete(0), Size::Concrete(0)]));
        assert!(!is_empty_size(&[Size::symbol("N")]));
    }
}
