// src/core/datatype.rs

//! A small datatype registry with a subtype relation.
//!
//! Every type except `AnyType` has exactly one parent. Matching a set of
//! requested types yields the type that satisfies all of them, preferring an
//! explicit preference list over the most general candidate.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::job::is_url;
use crate::errors::{PlanError, Result};

pub const ANY_TYPE: &str = "AnyType";

/// A raw value as supplied by a user or a config file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl RawValue {
    pub fn is_url(&self) -> bool {
        matches!(self, RawValue::String(s) if is_url(s))
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Bool(b) => write!(f, "{b}"),
            RawValue::Int(i) => write!(f, "{i}"),
            RawValue::Float(x) => write!(f, "{x}"),
            RawValue::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Int(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Float(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::String(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::String(value)
    }
}

/// A value wrapped in a registered datatype. `repr` is the canonical string
/// form; URLs are kept verbatim for later resolution.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypedValue {
    pub datatype: String,
    pub repr: String,
}

impl TypedValue {
    pub fn is_url(&self) -> bool {
        is_url(&self.repr)
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}: {}>", self.datatype, self.repr)
    }
}

#[derive(Clone, Debug)]
pub struct TypeRegistry {
    parents: IndexMap<String, Option<String>>,
    preferred: Vec<String>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Registry with the builtin types.
    pub fn new() -> Self {
        let mut parents = IndexMap::new();
        parents.insert(ANY_TYPE.to_string(), None);
        for (name, parent) in [
            ("String", ANY_TYPE),
            ("Number", ANY_TYPE),
            ("Boolean", ANY_TYPE),
            ("FilePath", ANY_TYPE),
            ("Int", "Number"),
            ("Float", "Number"),
            ("Directory", "FilePath"),
        ] {
            parents.insert(name.to_string(), Some(parent.to_string()));
        }

        let preferred = ["Int", "Float", "Boolean", "String", "FilePath", "Directory"]
            .into_iter()
            .map(String::from)
            .collect();

        Self { parents, preferred }
    }

    pub fn register(&mut self, name: &str, parent: &str) -> Result<()> {
        if self.parents.contains_key(name) {
            return Err(PlanError::Value(format!("datatype {name} is already registered")));
        }
        if !self.parents.contains_key(parent) {
            return Err(PlanError::NotFound(format!("parent datatype {parent} of {name}")));
        }
        self.parents.insert(name.to_string(), Some(parent.to_string()));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parents.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parents.keys().map(String::as_str)
    }

    /// User-registered types (everything that is not builtin), with parents.
    pub fn user_types(&self) -> Vec<(String, String)> {
        let builtin = TypeRegistry::new();
        self.parents
            .iter()
            .filter(|(name, _)| !builtin.contains(name))
            .filter_map(|(name, parent)| parent.clone().map(|p| (name.clone(), p)))
            .collect()
    }

    pub fn default_preferred(&self) -> &[String] {
        &self.preferred
    }

    pub fn parent(&self, name: &str) -> Option<&str> {
        self.parents.get(name).and_then(|p| p.as_deref())
    }

    /// Is `name` equal to, or a descendant of, `ancestor`?
    pub fn is_subtype(&self, name: &str, ancestor: &str) -> bool {
        let mut current = Some(name);
        while let Some(n) = current {
            if n == ancestor {
                return self.contains(n);
            }
            current = self.parent(n);
        }
        false
    }

    /// Find the datatype satisfying every requested type.
    ///
    /// Candidates are all registered types that are a subtype of each
    /// request. The first preferred candidate wins; otherwise the candidate
    /// that is an ancestor of all other candidates. `None` when nothing fits
    /// or the choice is ambiguous.
    pub fn match_types(&self, requested: &[&str], preferred: &[String]) -> Option<String> {
        if requested.is_empty() {
            return None;
        }

        let candidates: Vec<&str> = self
            .names()
            .filter(|candidate| requested.iter().all(|r| self.is_subtype(candidate, r)))
            .collect();

        if let Some(hit) = preferred.iter().find(|p| candidates.contains(&p.as_str())) {
            return Some(hit.clone());
        }

        candidates
            .iter()
            .find(|c| candidates.iter().all(|other| self.is_subtype(other, c)))
            .map(|c| c.to_string())
    }

    /// Wrap a raw value in `datatype`.
    ///
    /// URLs are accepted for every datatype; they are resolved when the job
    /// for the sample runs.
    pub fn convert(&self, datatype: &str, raw: &RawValue) -> Result<TypedValue> {
        if !self.contains(datatype) {
            return Err(PlanError::NotFound(format!("datatype {datatype}")));
        }

        let repr = raw.to_string();
        if !raw.is_url() && !self.accepts(datatype, raw) {
            return Err(PlanError::Value(format!("cannot interpret {raw:?} as a {datatype}")));
        }

        Ok(TypedValue {
            datatype: datatype.to_string(),
            repr,
        })
    }

    fn accepts(&self, datatype: &str, raw: &RawValue) -> bool {
        let text = raw.to_string();
        if self.is_subtype(datatype, "Int") {
            text.parse::<i64>().is_ok()
        } else if self.is_subtype(datatype, "Float") || self.is_subtype(datatype, "Number") {
            text.parse::<f64>().is_ok()
        } else if self.is_subtype(datatype, "Boolean") {
            matches!(text.to_lowercase().as_str(), "true" | "false")
        } else {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn none() -> Vec<String> {
        Vec::new()
    }

    #[test]
    fn subtype_walks_parents() {
        let reg = TypeRegistry::new();
        assert!(reg.is_subtype("Int", "Number"));
        assert!(reg.is_subtype("Directory", ANY_TYPE));
        assert!(!reg.is_subtype("Number", "Int"));
        assert!(!reg.is_subtype("Missing", ANY_TYPE));
    }

    #[test]
    fn match_prefers_most_specific_common_type() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.match_types(&["Int", "Number"], &none()), Some("Int".into()));
        assert_eq!(reg.match_types(&["Number"], &none()), Some("Number".into()));
        assert_eq!(reg.match_types(&["Int", "String"], &none()), None);
    }

    #[test]
    fn match_uses_preference_list() {
        let reg = TypeRegistry::new();
        let preferred = vec!["Float".to_string()];
        assert_eq!(reg.match_types(&["Number"], &preferred), Some("Float".into()));
        assert_eq!(
            reg.match_types(&[ANY_TYPE], reg.default_preferred()),
            Some("Int".into())
        );
    }

    #[test]
    fn user_types_join_the_hierarchy() {
        let mut reg = TypeRegistry::new();
        reg.register("NiftiImageFile", "FilePath").unwrap();
        assert!(reg.is_subtype("NiftiImageFile", ANY_TYPE));
        assert_eq!(reg.user_types(), vec![("NiftiImageFile".into(), "FilePath".into())]);
        assert!(matches!(reg.register("Int", ANY_TYPE), Err(PlanError::Value(_))));
        assert!(matches!(reg.register("X", "Nope"), Err(PlanError::NotFound(_))));
    }

    #[test]
    fn convert_checks_values_but_not_urls() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.convert("Int", &RawValue::Int(5)).unwrap().repr, "5");
        assert!(reg.convert("Int", &RawValue::from("five")).is_err());
        assert_eq!(
            reg.convert("Int", &RawValue::from("file:///x")).unwrap().repr,
            "file:///x"
        );
        assert_eq!(reg.convert("String", &RawValue::Float(1.5)).unwrap().repr, "1.5");
    }

    #[test]
    fn raw_values_deserialize_untagged() {
        #[derive(Deserialize)]
        struct Doc {
            values: Vec<RawValue>,
        }
        let doc: Doc = toml::from_str(r#"values = [1, 2.5, true, "x"]"#).unwrap();
        assert_eq!(
            doc.values,
            vec![
                RawValue::Int(1),
                RawValue::Float(2.5),
                RawValue::Bool(true),
                RawValue::String("x".into())
            ]
        );
    }
}
