// src/core/symbolic.rs

//! Minimal symbolic arithmetic for cardinalities that are not known while
//! planning.
//!
//! Only what the engine needs is modelled: named symbols, sums and products.
//! Sums keep their terms in order (one term per contributing SubInput), so
//! that an `as:target[i]` cardinality can pick the `i`-th contribution back
//! out with [`Cardinality::decompose_nth_term`].

use std::fmt;

use crate::errors::{PlanError, Result};

/// Identity of a symbolic quantity. Two symbols are the same quantity iff
/// their names are equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(String);

impl SymbolId {
    /// Create a symbol; spaces are not allowed in symbol names and are
    /// replaced by underscores.
    pub fn new(name: impl AsRef<str>) -> Self {
        SymbolId(name.as_ref().replace(' ', "_"))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Number of data items flowing through a connection for one sample.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Cardinality {
    Concrete(u64),
    Symbol(SymbolId),
    Sum(Vec<Cardinality>),
    Product(Vec<Cardinality>),
}

impl Cardinality {
    pub fn symbol(name: impl AsRef<str>) -> Self {
        Cardinality::Symbol(SymbolId::new(name))
    }

    pub fn zero() -> Self {
        Cardinality::Concrete(0)
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, Cardinality::Concrete(_))
    }

    pub fn is_symbolic(&self) -> bool {
        !self.is_concrete()
    }

    pub fn as_concrete(&self) -> Option<u64> {
        match self {
            Cardinality::Concrete(n) => Some(*n),
            _ => None,
        }
    }

    /// Sum of a sequence of per-slot contributions.
    ///
    /// Fully concrete sequences collapse to a single number. Otherwise the
    /// terms are kept positionally (zeros included) so that term `i` still
    /// belongs to slot `i`. Fails with [`PlanError::Value`] when a concrete
    /// total does not fit in a `u64`.
    pub fn sum<I>(terms: I) -> Result<Self>
    where
        I: IntoIterator<Item = Cardinality>,
    {
        let terms: Vec<Cardinality> = terms.into_iter().collect();

        if terms.iter().all(Cardinality::is_concrete) {
            let total = terms
                .iter()
                .filter_map(Cardinality::as_concrete)
                .try_fold(0u64, u64::checked_add)
                .ok_or_else(|| overflow("sum", &terms))?;
            return Ok(Cardinality::Concrete(total));
        }

        if terms.len() == 1 {
            return Ok(terms.into_iter().next().unwrap_or_else(Cardinality::zero));
        }

        Ok(Cardinality::Sum(terms))
    }

    pub fn add(self, other: Cardinality) -> Result<Cardinality> {
        Ok(match (self, other) {
            (Cardinality::Concrete(a), Cardinality::Concrete(b)) => Cardinality::Concrete(
                a.checked_add(b)
                    .ok_or_else(|| overflow("sum", &[Cardinality::Concrete(a), Cardinality::Concrete(b)]))?,
            ),
            (Cardinality::Concrete(0), x) | (x, Cardinality::Concrete(0)) => x,
            (Cardinality::Sum(mut terms), x) => {
                terms.push(x);
                Cardinality::Sum(terms)
            }
            (a, b) => Cardinality::Sum(vec![a, b]),
        })
    }

    pub fn multiply(self, other: Cardinality) -> Result<Cardinality> {
        Ok(match (self, other) {
            (Cardinality::Concrete(a), Cardinality::Concrete(b)) => Cardinality::Concrete(
                a.checked_mul(b)
                    .ok_or_else(|| overflow("product", &[Cardinality::Concrete(a), Cardinality::Concrete(b)]))?,
            ),
            (Cardinality::Concrete(0), _) | (_, Cardinality::Concrete(0)) => Cardinality::zero(),
            (Cardinality::Concrete(1), x) | (x, Cardinality::Concrete(1)) => x,
            (Cardinality::Product(mut factors), x) => {
                factors.push(x);
                Cardinality::Product(factors)
            }
            (a, b) => Cardinality::Product(vec![a, b]),
        })
    }

    /// Pick a single element's contribution out of a composite cardinality.
    ///
    /// * `Sum`: the `n`-th term.
    /// * `Product`: the product without its leading multiplier, i.e. the
    ///   cardinality of one element.
    /// * anything else cannot be decomposed.
    pub fn decompose_nth_term(&self, n: usize) -> Result<Cardinality> {
        match self {
            Cardinality::Sum(terms) => terms.get(n).cloned().ok_or_else(|| {
                PlanError::Cardinality(format!(
                    "cardinality {self} has {} terms and thus does not have index {n}",
                    terms.len()
                ))
            }),
            Cardinality::Product(factors) => {
                let mut rest = factors.iter().skip(1).cloned();
                rest.try_fold(Cardinality::Concrete(1), Cardinality::multiply)
            }
            other => Err(PlanError::UnsupportedShape(format!(
                "cannot take element {n} of cardinality {other} (neither a sum nor a product)"
            ))),
        }
    }

    /// Equality that knows when it does not know.
    ///
    /// Returns `Some(_)` when both sides are concrete or structurally
    /// identical, `None` when symbolic values might or might not be equal.
    pub fn try_eq(&self, other: &Cardinality) -> Option<bool> {
        match (self, other) {
            (Cardinality::Concrete(a), Cardinality::Concrete(b)) => Some(a == b),
            (a, b) if a == b => Some(true),
            _ => None,
        }
    }
}

fn overflow(what: &str, terms: &[Cardinality]) -> PlanError {
    let parts: Vec<String> = terms.iter().map(ToString::to_string).collect();
    PlanError::Value(format!("{what} of cardinalities [{}] overflows", parts.join(", ")))
}

impl From<u64> for Cardinality {
    fn from(value: u64) -> Self {
        Cardinality::Concrete(value)
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::Concrete(n) => write!(f, "{n}"),
            Cardinality::Symbol(s) => write!(f, "{s}"),
            Cardinality::Sum(terms) => {
                let parts: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
                f.write_str(&parts.join(" + "))
            }
            Cardinality::Product(factors) => {
                let parts: Vec<String> = factors
                    .iter()
                    .map(|t| match t {
                        Cardinality::Sum(_) => format!("({t})"),
                        _ => t.to_string(),
                    })
                    .collect();
                f.write_str(&parts.join("*"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concrete_terms_fold() {
        let total = Cardinality::sum([2u64, 3, 0].map(Cardinality::from)).unwrap();
        assert_eq!(total, Cardinality::Concrete(5));
    }

    #[test]
    fn symbolic_sum_keeps_positions() {
        let total = Cardinality::sum(vec![
            Cardinality::Concrete(2),
            Cardinality::symbol("N_source"),
            Cardinality::Concrete(0),
        ])
        .unwrap();

        assert_eq!(total.decompose_nth_term(1).unwrap(), Cardinality::symbol("N_source"));
        assert_eq!(total.decompose_nth_term(2).unwrap(), Cardinality::zero());
        assert!(matches!(total.decompose_nth_term(3), Err(PlanError::Cardinality(_))));
        assert_eq!(total.to_string(), "2 + N_source + 0");
    }

    #[test]
    fn product_drops_the_multiplier() {
        let total = Cardinality::Concrete(4).multiply(Cardinality::symbol("N_x")).unwrap();
        assert_eq!(total, Cardinality::Product(vec![Cardinality::Concrete(4), Cardinality::symbol("N_x")]));
        assert_eq!(total.decompose_nth_term(0).unwrap(), Cardinality::symbol("N_x"));
    }

    #[test]
    fn plain_symbol_is_not_decomposable() {
        let err = Cardinality::symbol("N").decompose_nth_term(0).unwrap_err();
        assert!(matches!(err, PlanError::UnsupportedShape(_)));
    }

    #[test]
    fn arithmetic_identities() {
        let n = Cardinality::symbol("N a");
        assert_eq!(n.clone().add(Cardinality::zero()).unwrap(), n);
        assert_eq!(Cardinality::Concrete(1).multiply(n.clone()).unwrap(), n);
        assert_eq!(n.clone().multiply(Cardinality::zero()).unwrap(), Cardinality::zero());
        assert_eq!(n.to_string(), "N_a");
    }

    #[test]
    fn concrete_overflow_is_a_value_error() {
        let big = Cardinality::Concrete(u64::MAX);
        let err = Cardinality::sum([big.clone(), Cardinality::Concrete(1)]).unwrap_err();
        assert!(matches!(err, PlanError::Value(ref msg) if msg.contains("overflows")));
        assert!(big.clone().add(Cardinality::Concrete(1)).is_err());
        assert!(big.clone().multiply(Cardinality::Concrete(2)).is_err());
        // symbolic terms never fold, so they cannot overflow
        assert!(Cardinality::sum([big, Cardinality::symbol("N_a")]).is_ok());
    }

    #[test]
    fn try_eq_is_three_valued() {
        let a = Cardinality::symbol("N_a");
        assert_eq!(a.try_eq(&a.clone()), Some(true));
        assert_eq!(a.try_eq(&Cardinality::symbol("N_b")), None);
        assert_eq!(Cardinality::Concrete(3).try_eq(&Cardinality::Concrete(4)), Some(false));
    }
}
