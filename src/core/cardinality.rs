// src/core/cardinality.rs

//! Cardinality specifications and their string grammar.
//!
//! ```text
//! cardinality := "*" | "any" | "unknown"       -> Any
//!              | INT                            -> Int
//!              | "[" INT ("," INT)* "]"         -> Choice
//!              | (INT|"*") "-" (INT|"*")        -> Range / Min / Max / Any
//!              | "as:" IDENT ("[" INT "]")?     -> As
//!              | "val:" IDENT                   -> Value
//! ```
//!
//! A spec does not hold on to the Input/Output it belongs to. Everything it
//! needs to know about its surroundings is asked through a
//! [`CardinalityContext`] supplied at evaluation time.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::core::dimension::Size;
use crate::core::job::JobPayload;
use crate::core::samples::{SampleIndex, SampleItem, SampleKey};
use crate::core::symbolic::Cardinality;
use crate::errors::{PlanError, Result};

struct Grammar {
    int: Regex,
    choice: Regex,
    range: Regex,
    as_target: Regex,
    value_target: Regex,
}

static GRAMMAR: LazyLock<std::result::Result<Grammar, regex::Error>> = LazyLock::new(|| {
    Ok(Grammar {
        int: Regex::new(r"^\d+$")?,
        choice: Regex::new(r"^\[\d+(,\d+)*\]$")?,
        range: Regex::new(r"^(\d+|\*)-(\d+|\*)$")?,
        as_target: Regex::new(r"^([A-Za-z_][A-Za-z0-9_\-]*)(?:\[(\d+)\])?$")?,
        value_target: Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*$")?,
    })
});

fn grammar() -> Result<&'static Grammar> {
    GRAMMAR
        .as_ref()
        .map_err(|e| PlanError::Other(anyhow::anyhow!("cardinality grammar failed to compile: {e}")))
}

/// Target of an `as:` spec, optionally indexing one element of it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CardinalityTarget {
    name: String,
    index: Option<usize>,
}

impl CardinalityTarget {
    pub fn new(name: impl Into<String>, index: Option<usize>) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }
}

impl fmt::Display for CardinalityTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}[{i}]", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// What a spec may ask about the node its parent belongs to.
pub trait CardinalityContext {
    /// Cardinality of the Input `name` of the parent's node, optionally for
    /// one sample. `None` when the node has no such Input.
    fn input_cardinality(&self, name: &str, key: Option<&SampleKey>) -> Result<Option<Cardinality>>;

    /// Per-element cardinalities of the Input `name`, in key order.
    fn input_items(&self, name: &str) -> Result<Option<Vec<Cardinality>>>;

    fn input_size(&self, name: &str) -> Result<Option<Vec<Size>>>;

    fn has_output(&self, name: &str) -> bool;

    /// Sample of the parent itself (only Outputs carry samples).
    fn parent_sample(&self, key: &SampleKey) -> Option<&SampleItem>;

    fn output_sample(&self, name: &str, key: &SampleKey) -> Option<&SampleItem>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CardinalitySpec {
    Int(u64),
    Min(u64),
    Max(u64),
    Range(u64, u64),
    Choice(Vec<u64>),
    Any,
    As(CardinalityTarget),
    Value(String),
}

/// Parse a cardinality description string.
pub fn create_cardinality(desc: &str) -> Result<CardinalitySpec> {
    let g = grammar()?;
    let format_error = || PlanError::CardinalityFormat(desc.to_string());
    let number = |s: &str| s.parse::<u64>().map_err(|_| format_error());

    if g.int.is_match(desc) {
        return Ok(CardinalitySpec::Int(number(desc)?));
    }

    if matches!(desc, "*" | "any" | "unknown") {
        return Ok(CardinalitySpec::Any);
    }

    if g.choice.is_match(desc) {
        let options = desc[1..desc.len() - 1]
            .split(',')
            .map(number)
            .collect::<Result<Vec<_>>>()?;
        return Ok(CardinalitySpec::Choice(options));
    }

    if let Some(rest) = desc.strip_prefix("as:") {
        let caps = g.as_target.captures(rest).ok_or_else(format_error)?;
        let name = caps.get(1).map(|m| m.as_str()).ok_or_else(format_error)?;
        let index = match caps.get(2) {
            Some(m) => Some(m.as_str().parse::<usize>().map_err(|_| format_error())?),
            None => None,
        };
        return Ok(CardinalitySpec::As(CardinalityTarget::new(name, index)));
    }

    if let Some(rest) = desc.strip_prefix("val:") {
        if !g.value_target.is_match(rest) {
            return Err(format_error());
        }
        return Ok(CardinalitySpec::Value(rest.to_string()));
    }

    if let Some(caps) = g.range.captures(desc) {
        let lower = caps.get(1).map(|m| m.as_str()).ok_or_else(format_error)?;
        let upper = caps.get(2).map(|m| m.as_str()).ok_or_else(format_error)?;
        return match (lower, upper) {
            ("*", "*") => Ok(CardinalitySpec::Any),
            ("*", hi) => Ok(CardinalitySpec::Max(number(hi)?)),
            (lo, "*") => Ok(CardinalitySpec::Min(number(lo)?)),
            (lo, hi) => {
                let (lo, hi) = (number(lo)?, number(hi)?);
                if lo > hi {
                    return Err(format_error());
                }
                Ok(CardinalitySpec::Range(lo, hi))
            }
        };
    }

    Err(format_error())
}

impl FromStr for CardinalitySpec {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self> {
        create_cardinality(s)
    }
}

impl fmt::Display for CardinalitySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardinalitySpec::Int(n) => write!(f, "{n}"),
            CardinalitySpec::Min(n) => write!(f, "{n}-*"),
            CardinalitySpec::Max(n) => write!(f, "*-{n}"),
            CardinalitySpec::Range(lo, hi) => write!(f, "{lo}-{hi}"),
            CardinalitySpec::Choice(options) => {
                let parts: Vec<String> = options.iter().map(|o| o.to_string()).collect();
                write!(f, "[{}]", parts.join(","))
            }
            CardinalitySpec::Any => f.write_str("any"),
            CardinalitySpec::As(target) => write!(f, "as:{target}"),
            CardinalitySpec::Value(target) => write!(f, "val:{target}"),
        }
    }
}

impl CardinalitySpec {
    /// Is the value knowable before execution?
    pub fn predefined(&self) -> bool {
        matches!(self, CardinalitySpec::Int(_) | CardinalitySpec::As(_))
    }

    /// Check `cardinality` against this spec.
    ///
    /// Symbolic cardinalities are accepted while planning and rejected during
    /// execution.
    pub fn validate(
        &self,
        ctx: &dyn CardinalityContext,
        payload: Option<&JobPayload>,
        cardinality: &Cardinality,
        planning: bool,
    ) -> Result<bool> {
        let Some(c) = cardinality.as_concrete() else {
            return Ok(planning);
        };

        let valid = match self {
            CardinalitySpec::Int(n) => c == *n,
            CardinalitySpec::Min(n) => c >= *n,
            CardinalitySpec::Max(n) => c <= *n,
            CardinalitySpec::Range(lo, hi) => *lo <= c && c <= *hi,
            CardinalitySpec::Choice(options) => options.contains(&c),
            CardinalitySpec::Any => true,
            CardinalitySpec::As(target) => self.validate_as(ctx, target, payload, c)?,
            CardinalitySpec::Value(target) => validate_value(target, payload, c)?,
        };
        Ok(valid)
    }

    fn validate_as(
        &self,
        ctx: &dyn CardinalityContext,
        target: &CardinalityTarget,
        payload: Option<&JobPayload>,
        c: u64,
    ) -> Result<bool> {
        let Some(payload) = payload else {
            return Ok(match self.calculate_planning_cardinality(ctx)? {
                Some(Cardinality::Concrete(expected)) => expected == c,
                _ => true,
            });
        };

        let expected = match (payload.get(target.name()), target.index()) {
            (None, _) => 0,
            (Some(value), None) => value.len(),
            (Some(value), Some(_)) if value.is_empty() => 0,
            (Some(value), Some(index)) => value.item_len(index).ok_or_else(|| {
                PlanError::Index(format!(
                    "Cardinality references to invalid field (target {} has length {} and thus does not have index {index})",
                    target.name(),
                    value.len()
                ))
            })?,
        };

        Ok(c == expected as u64)
    }

    /// Best-effort value without a payload; `None` when the spec only
    /// validates.
    pub fn calculate_planning_cardinality(&self, ctx: &dyn CardinalityContext) -> Result<Option<Cardinality>> {
        match self {
            CardinalitySpec::Int(n) => Ok(Some(Cardinality::Concrete(*n))),
            CardinalitySpec::As(target) => {
                let total = require_input(ctx, target.name(), None)?;
                match target.index() {
                    None => Ok(Some(total)),
                    Some(index) => index_into(ctx, target, total, index).map(Some),
                }
            }
            _ => Ok(None),
        }
    }

    /// Value once a concrete sample is addressable.
    pub fn calculate_execution_cardinality(
        &self,
        ctx: &dyn CardinalityContext,
        key: Option<&SampleKey>,
    ) -> Result<Option<Cardinality>> {
        match self {
            CardinalitySpec::Int(n) => Ok(Some(Cardinality::Concrete(*n))),
            CardinalitySpec::As(target) => {
                if target.index().is_some() {
                    return self.calculate_planning_cardinality(ctx);
                }

                let Some(key) = key else {
                    return require_input(ctx, target.name(), None).map(Some);
                };

                let size = ctx
                    .input_size(target.name())?
                    .ok_or_else(|| missing_input(target.name()))?;
                if size.iter().all(Size::is_zero) {
                    Ok(Some(Cardinality::zero()))
                } else if size == [Size::Concrete(1)] {
                    let first = SampleKey::Index(SampleIndex(vec![0]));
                    require_input(ctx, target.name(), Some(&first)).map(Some)
                } else {
                    require_input(ctx, target.name(), Some(key)).map(Some)
                }
            }
            CardinalitySpec::Value(target) => {
                let Some(key) = key else {
                    return Ok(None);
                };
                if ctx.input_items(target)?.is_some() {
                    let found = ctx.parent_sample(key).map(|s| Cardinality::Concrete(s.cardinality()));
                    if found.is_none() {
                        debug!(input = %target, "no execution data for val: cardinality");
                    }
                    Ok(found)
                } else if ctx.has_output(target) {
                    Ok(ctx
                        .output_sample(target, key)
                        .and_then(|s| s.data.first())
                        .and_then(|v| v.repr.parse::<u64>().ok())
                        .map(Cardinality::Concrete))
                } else {
                    Ok(None)
                }
            }
            _ => Ok(key
                .and_then(|k| ctx.parent_sample(k))
                .map(|s| Cardinality::Concrete(s.cardinality()))),
        }
    }

    /// Value computable from one job's materialised payload, used to size
    /// non-automatic outputs.
    pub fn calculate_job_cardinality(&self, payload: &JobPayload) -> Result<Option<u64>> {
        match self {
            CardinalitySpec::Int(n) => Ok(Some(*n)),
            CardinalitySpec::As(target) => Ok(Some(
                payload.get(target.name()).map(|v| v.len() as u64).unwrap_or(0),
            )),
            CardinalitySpec::Value(target) => {
                let value = payload.inputs.get(target).ok_or_else(|| missing_input(target))?;
                let single = value.single().ok_or_else(|| {
                    PlanError::Value(format!(
                        "Cannot determine cardinality from multiple values (requested {self}, found {} values)",
                        value.len()
                    ))
                })?;
                single.repr.parse::<u64>().map(Some).map_err(|_| {
                    PlanError::Value(format!("Cannot interpret {} as a cardinality", single.repr))
                })
            }
            _ => Ok(None),
        }
    }
}

fn validate_value(target: &str, payload: Option<&JobPayload>, c: u64) -> Result<bool> {
    let Some(payload) = payload else {
        return Ok(true);
    };
    let value = payload.get(target).ok_or_else(|| {
        PlanError::Value(format!(
            "Cannot calculate val: type cardinality if value not in payload (missing {target})"
        ))
    })?;
    Ok(value
        .single()
        .and_then(|v| v.repr.parse::<u64>().ok())
        .is_some_and(|v| v == c))
}

fn missing_input(name: &str) -> PlanError {
    PlanError::Cardinality(format!(
        "Cardinality references to invalid field ({name} is not an Input in this Node)"
    ))
}

fn require_input(ctx: &dyn CardinalityContext, name: &str, key: Option<&SampleKey>) -> Result<Cardinality> {
    ctx.input_cardinality(name, key)?.ok_or_else(|| missing_input(name))
}

/// Cardinality of element `index` of the target Input.
///
/// A positional sum yields its term, a product its per-element factor. A
/// concrete total is resolved from the Input's own elements, as is a single
/// symbol coming from a one-element Input. Anything else is rejected.
fn index_into(
    ctx: &dyn CardinalityContext,
    target: &CardinalityTarget,
    total: Cardinality,
    index: usize,
) -> Result<Cardinality> {
    match total {
        Cardinality::Sum(_) | Cardinality::Product(_) => total.decompose_nth_term(index),
        Cardinality::Concrete(_) | Cardinality::Symbol(_) => {
            let items = ctx.input_items(target.name())?.unwrap_or_default();
            let structural = matches!(total, Cardinality::Concrete(_)) || items.len() == 1;
            if !structural {
                return Err(PlanError::UnsupportedShape(format!(
                    "cannot take element {index} of {} (cardinality {total})",
                    target.name()
                )));
            }
            items.get(index).cloned().ok_or_else(|| {
                PlanError::Cardinality(format!(
                    "Cardinality references to invalid field (target {} has length {} and thus does not have index {index})",
                    target.name(),
                    items.len()
                ))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::core::datatype::TypedValue;
    use crate::core::job::PayloadValue;

    #[derive(Default)]
    struct MapContext {
        inputs: HashMap<String, Vec<Cardinality>>,
        outputs: Vec<String>,
    }

    impl MapContext {
        fn with_input(mut self, name: &str, items: Vec<Cardinality>) -> Self {
            self.inputs.insert(name.to_string(), items);
            self
        }
    }

    impl CardinalityContext for MapContext {
        fn input_cardinality(&self, name: &str, _key: Option<&SampleKey>) -> Result<Option<Cardinality>> {
            self.inputs.get(name).map(|items| Cardinality::sum(items.clone())).transpose()
        }

        fn input_items(&self, name: &str) -> Result<Option<Vec<Cardinality>>> {
            Ok(self.inputs.get(name).cloned())
        }

        fn input_size(&self, name: &str) -> Result<Option<Vec<Size>>> {
            Ok(self.inputs.get(name).map(|items| vec![Size::Concrete(items.len() as u64)]))
        }

        fn has_output(&self, name: &str) -> bool {
            self.outputs.iter().any(|o| o == name)
        }

        fn parent_sample(&self, _key: &SampleKey) -> Option<&SampleItem> {
            None
        }

        fn output_sample(&self, _name: &str, _key: &SampleKey) -> Option<&SampleItem> {
            None
        }
    }

    fn int(v: &str) -> TypedValue {
        TypedValue { datatype: "Int".into(), repr: v.into() }
    }

    #[test]
    fn parses_every_variant() {
        let cases = [
            ("3", CardinalitySpec::Int(3)),
            ("*", CardinalitySpec::Any),
            ("unknown", CardinalitySpec::Any),
            ("*-*", CardinalitySpec::Any),
            ("2-*", CardinalitySpec::Min(2)),
            ("*-4", CardinalitySpec::Max(4)),
            ("1-3", CardinalitySpec::Range(1, 3)),
            ("[1,2,4]", CardinalitySpec::Choice(vec![1, 2, 4])),
            ("as:left", CardinalitySpec::As(CardinalityTarget::new("left", None))),
            ("as:pairs[1]", CardinalitySpec::As(CardinalityTarget::new("pairs", Some(1)))),
            ("val:count", CardinalitySpec::Value("count".into())),
        ];
        for (desc, expected) in cases {
            assert_eq!(create_cardinality(desc).unwrap(), expected, "parsing {desc}");
        }
    }

    #[test]
    fn rejects_garbage_with_the_offending_string() {
        for desc in ["", "-", "1-", "3-1", "[1,2", "[]", "as:", "as:1x", "val:x[0]", "many", " 1"] {
            let err = create_cardinality(desc).unwrap_err();
            assert!(matches!(err, PlanError::CardinalityFormat(ref s) if s == desc), "{desc}: {err}");
        }
        assert_eq!(
            create_cardinality("bogus").unwrap_err().to_string(),
            "Not a valid cardinality description string (bogus)"
        );
    }

    #[test]
    fn display_round_trips() {
        for desc in ["5", "2-*", "*-7", "1-3", "[1,2,4]", "any", "as:x[2]", "val:n"] {
            assert_eq!(create_cardinality(desc).unwrap().to_string(), desc);
        }
    }

    #[test]
    fn symbolic_cardinality_depends_on_phase() {
        let ctx = MapContext::default();
        let spec = CardinalitySpec::Int(1);
        let n = Cardinality::symbol("N_source");
        assert!(spec.validate(&ctx, None, &n, true).unwrap());
        assert!(!spec.validate(&ctx, None, &n, false).unwrap());
    }

    #[test]
    fn as_resolves_against_target_input() {
        let ctx = MapContext::default().with_input("left", vec![2u64.into(), 3u64.into()]);
        let spec = create_cardinality("as:left").unwrap();
        assert!(spec.predefined());
        assert_eq!(spec.calculate_planning_cardinality(&ctx).unwrap(), Some(Cardinality::Concrete(5)));
        assert!(spec.validate(&ctx, None, &Cardinality::Concrete(5), true).unwrap());
        assert!(!spec.validate(&ctx, None, &Cardinality::Concrete(4), true).unwrap());

        let indexed = create_cardinality("as:left[1]").unwrap();
        assert_eq!(indexed.calculate_planning_cardinality(&ctx).unwrap(), Some(Cardinality::Concrete(3)));
    }

    #[test]
    fn as_indexes_into_symbolic_sums() {
        let ctx = MapContext::default()
            .with_input("left", vec![Cardinality::Concrete(2), Cardinality::symbol("N_a")]);
        let spec = create_cardinality("as:left[1]").unwrap();
        assert_eq!(spec.calculate_planning_cardinality(&ctx).unwrap(), Some(Cardinality::symbol("N_a")));

        let spec = create_cardinality("as:left[5]").unwrap();
        assert!(matches!(spec.calculate_planning_cardinality(&ctx), Err(PlanError::Cardinality(_))));
    }

    #[test]
    fn as_index_into_opaque_symbol_is_unsupported() {
        let ctx = MapContext::default().with_input(
            "left",
            vec![Cardinality::Concrete(0), Cardinality::symbol("N_a")],
        );
        // a bare symbol over a two-element input cannot be split positionally
        let total = Cardinality::sum(vec![Cardinality::symbol("N_a")]).unwrap();
        let err = index_into(&ctx, &CardinalityTarget::new("left", Some(0)), total, 0).unwrap_err();
        assert!(matches!(err, PlanError::UnsupportedShape(_)));
    }

    #[test]
    fn as_with_missing_target_is_a_cardinality_error() {
        let ctx = MapContext::default();
        let spec = create_cardinality("as:nothing").unwrap();
        assert!(matches!(spec.calculate_planning_cardinality(&ctx), Err(PlanError::Cardinality(_))));
    }

    #[test]
    fn as_with_payload_counts_payload_values() {
        let ctx = MapContext::default();
        let mut payload = JobPayload::default();
        payload.inputs.insert("left".into(), PayloadValue::List(vec![int("1"), int("2")]));
        let spec = create_cardinality("as:left").unwrap();
        assert!(spec.validate(&ctx, Some(&payload), &Cardinality::Concrete(2), false).unwrap());
        assert!(!spec.validate(&ctx, Some(&payload), &Cardinality::Concrete(1), false).unwrap());
        assert_eq!(spec.calculate_job_cardinality(&payload).unwrap(), Some(2));
    }

    #[test]
    fn value_reads_the_single_payload_value() {
        let ctx = MapContext::default();
        let spec = create_cardinality("val:count").unwrap();
        assert!(!spec.predefined());
        assert_eq!(spec.calculate_planning_cardinality(&ctx).unwrap(), None);

        let mut payload = JobPayload::default();
        payload.inputs.insert("count".into(), PayloadValue::List(vec![int("3")]));
        assert!(spec.validate(&ctx, Some(&payload), &Cardinality::Concrete(3), false).unwrap());
        assert!(!spec.validate(&ctx, Some(&payload), &Cardinality::Concrete(2), false).unwrap());
        assert_eq!(spec.calculate_job_cardinality(&payload).unwrap(), Some(3));

        payload.inputs.insert("count".into(), PayloadValue::List(vec![int("3"), int("4")]));
        assert!(!spec.validate(&ctx, Some(&payload), &Cardinality::Concrete(3), false).unwrap());
        assert!(matches!(spec.calculate_job_cardinality(&payload), Err(PlanError::Value(_))));

        let empty = JobPayload::default();
        assert!(matches!(
            spec.validate(&ctx, Some(&empty), &Cardinality::Concrete(3), false),
            Err(PlanError::Value(_))
        ));
    }

    #[test]
    fn execution_cardinality_of_as_uses_keyed_target() {
        let ctx = MapContext::default().with_input("left", vec![Cardinality::Concrete(4)]);
        let spec = create_cardinality("as:left").unwrap();
        let key = SampleKey::Index(SampleIndex(vec![0]));
        assert_eq!(
            spec.calculate_execution_cardinality(&ctx, Some(&key)).unwrap(),
            Some(Cardinality::Concrete(4))
        );
        assert_eq!(
            CardinalitySpec::Any.calculate_execution_cardinality(&ctx, Some(&key)).unwrap(),
            None
        );
    }
}
