//! The language-neutral value tree produced by the decoder.

use std::sync::Arc;

use num_bigint::BigInt;

/// A decoded Ruby value.
///
/// Symbols keep their Ruby surface form, a leading colon followed by the
/// name (`":foo"`), but the variant is what distinguishes them from
/// strings: a `Str` that happens to start with a colon never compares equal
/// to a `Sym`. Symbols are interned per decode, so two occurrences of the
/// same source symbol share one allocation.
///
/// Hash keys are kept in source order and are not deduplicated; use
/// [`Value::map_get`] for the keyed view callers usually want.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Nil,
    Bool(bool),
    /// An integer that fits in 64 signed bits.
    Int(i64),
    /// An integer that does not.
    BigInt(BigInt),
    Str(String),
    Sym(Arc<str>),
    Seq(Vec<Value>),
    Map(Vec<(Value, Value)>),
    /// Opaque carrier for the "complex object" shapes the decoder does not
    /// reconstruct: user-defined objects, user-marshal and user-def data,
    /// extended-module markers, and object links.
    Wrapper(Box<Wrapper>),
}

/// The kind of shape a [`Wrapper`] was decoded from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WrapperKind {
    /// A user-defined object: `tag` is the class symbol, `children` holds
    /// the attribute symbol/value pairs, flattened.
    Object,
    /// Raw user-defined data: `tag` is the class symbol, `children` holds
    /// one `Str` with the payload text.
    UserDef,
    /// A `marshal_dump`ed object: `tag` is the class symbol, `children`
    /// holds the single dumped value.
    UserMarshal,
    /// An object back-reference: `tag` is the referenced index as an `Int`.
    /// The decoder does not maintain an object table, so links are handed
    /// to the caller unresolved.
    Link,
    /// An extended-module marker. Carries nothing.
    Extended,
}

/// An opaque wrapper around a shape the decoder preserves but does not
/// interpret. Consumers pattern-match on `kind`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Wrapper {
    pub kind: WrapperKind,
    pub tag: Value,
    pub children: Vec<Value>,
}

impl Value {
    /// The variant name, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "Nil",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::BigInt(_) => "BigInt",
            Value::Str(_) => "Str",
            Value::Sym(_) => "Sym",
            Value::Seq(_) => "Seq",
            Value::Map(_) => "Map",
            Value::Wrapper(_) => "Wrapper",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bigint(&self) -> Option<&BigInt> {
        match self {
            Value::BigInt(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// The symbol text, leading colon included.
    pub fn as_sym(&self) -> Option<&str> {
        match self {
            Value::Sym(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_wrapper(&self) -> Option<&Wrapper> {
        match self {
            Value::Wrapper(v) => Some(v),
            _ => None,
        }
    }

    /// Look up the first entry of a `Map` whose key is `Str(key)`. Returns
    /// `None` for non-map values and missing keys.
    pub fn map_get(&self, key: &str) -> Option<&Value> {
        self.as_map()?.iter().find_map(|(k, v)| match k {
            Value::Str(s) if s == key => Some(v),
            _ => None,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sym_and_str_are_distinct() {
        let sym = Value::Sym(Arc::from(":foo"));
        let string = Value::Str(":foo".to_string());
        assert_ne!(sym, string);
        assert_eq!(sym.as_sym(), Some(":foo"));
        assert_eq!(sym.as_str(), None);
        assert_eq!(string.as_str(), Some(":foo"));
        assert_eq!(string.as_sym(), None);
    }

    #[test]
    fn map_get_respects_source_order() {
        let map = Value::Map(vec![
            (Value::Str("a".into()), Value::Int(1)),
            (Value::Str("a".into()), Value::Int(2)),
            (Value::Sym(Arc::from(":a")), Value::Int(3)),
        ]);
        assert_eq!(map.map_get("a"), Some(&Value::Int(1)));
        assert_eq!(map.map_get("b"), None);
        assert_eq!(Value::Nil.map_get("a"), None);
    }
}
