/*!
The dynamic [Value] type: what result rows decode into and what query
arguments are encoded from.
*/

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use uuid::Uuid;

use crate::model::{BigInt, Datetime, Decimal, Duration, Json};
use crate::model::{LocalDate, LocalDatetime, LocalTime};

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Nothing,
    Uuid(Uuid),
    Str(String),
    Bytes(Bytes),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    BigInt(BigInt),
    Decimal(Decimal),
    Bool(bool),
    Datetime(Datetime),
    LocalDatetime(LocalDatetime),
    LocalDate(LocalDate),
    LocalTime(LocalTime),
    Duration(Duration),
    Json(Json),
    Set(Vec<Value>),
    Object {
        shape: ObjectShape,
        fields: Vec<Option<Value>>,
    },
    Tuple(Vec<Value>),
    NamedTuple {
        shape: NamedTupleShape,
        fields: Vec<Value>,
    },
    Array(Vec<Value>),
    Enum(EnumValue),
    Range(Range),
}

/// The field layout of a decoded object, shared between all rows of a
/// result set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectShape(pub(crate) Arc<ObjectShapeInfo>);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectShapeInfo {
    pub elements: Vec<ShapeElement>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShapeElement {
    pub flag_implicit: bool,
    pub flag_link_property: bool,
    pub flag_link: bool,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedTupleShape(pub(crate) Arc<NamedTupleShapeInfo>);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedTupleShapeInfo {
    pub elements: Vec<TupleElement>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TupleElement {
    pub name: String,
}

/// A member of a server-side enumeration type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumValue(pub(crate) Arc<str>);

/// A range value over some scalar domain.
#[derive(Clone, Debug, PartialEq)]
pub struct Range {
    pub(crate) lower: Option<Box<Value>>,
    pub(crate) upper: Option<Box<Value>>,
    pub(crate) inc_lower: bool,
    pub(crate) inc_upper: bool,
    pub(crate) empty: bool,
}

impl Value {
    pub fn kind(&self) -> &'static str {
        use Value::*;
        match self {
            Nothing => "nothing",
            Uuid(..) => "uuid",
            Str(..) => "str",
            Bytes(..) => "bytes",
            Int16(..) => "int16",
            Int32(..) => "int32",
            Int64(..) => "int64",
            Float32(..) => "float32",
            Float64(..) => "float64",
            BigInt(..) => "bigint",
            Decimal(..) => "decimal",
            Bool(..) => "bool",
            Datetime(..) => "datetime",
            LocalDatetime(..) => "cal::local_datetime",
            LocalDate(..) => "cal::local_date",
            LocalTime(..) => "cal::local_time",
            Duration(..) => "duration",
            Json(..) => "json",
            Set(..) => "set",
            Object { .. } => "object",
            Tuple(..) => "tuple",
            NamedTuple { .. } => "named_tuple",
            Array(..) => "array",
            Enum(..) => "enum",
            Range { .. } => "range",
        }
    }

    /// Short rendering of the value used in encoder rejections, e.g.
    /// `"something"` for a string or `0.5` for a float.
    pub fn display_repr(&self) -> String {
        use Value::*;
        match self {
            Nothing => "nothing".into(),
            Uuid(value) => value.to_string(),
            Str(value) => format!("{value:?}"),
            Bytes(value) => format!("{value:?}"),
            Int16(value) => value.to_string(),
            Int32(value) => value.to_string(),
            Int64(value) => value.to_string(),
            Float32(value) => value.to_string(),
            Float64(value) => value.to_string(),
            BigInt(value) => value.to_string(),
            Decimal(value) => value.to_string(),
            Bool(value) => value.to_string(),
            Duration(value) => value.to_string(),
            Enum(value) => format!("{:?}", &*value.0),
            other => format!("{other:?}"),
        }
    }
}

impl ObjectShape {
    pub fn new(elements: Vec<ShapeElement>) -> ObjectShape {
        ObjectShape(Arc::new(ObjectShapeInfo { elements }))
    }
    pub fn elements(&self) -> &[ShapeElement] {
        &self.0.elements
    }
    /// Position of a field by name, in declared order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.elements.iter().position(|e| e.name == name)
    }
}

impl NamedTupleShape {
    pub fn new(names: Vec<String>) -> NamedTupleShape {
        NamedTupleShape(Arc::new(NamedTupleShapeInfo {
            elements: names.into_iter().map(|name| TupleElement { name }).collect(),
        }))
    }
    pub fn elements(&self) -> &[TupleElement] {
        &self.0.elements
    }
    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.elements.iter().position(|e| e.name == name)
    }
}

impl EnumValue {
    pub fn new(value: impl Into<Arc<str>>) -> EnumValue {
        EnumValue(value.into())
    }
}

impl AsRef<str> for EnumValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Range {
    pub fn empty() -> Range {
        Range {
            lower: None,
            upper: None,
            inc_lower: true,
            inc_upper: false,
            empty: true,
        }
    }
    pub fn new(lower: Option<Value>, upper: Option<Value>, inc_lower: bool, inc_upper: bool) -> Range {
        Range {
            lower: lower.map(Box::new),
            upper: upper.map(Box::new),
            inc_lower,
            inc_upper,
            empty: false,
        }
    }
    pub fn lower(&self) -> Option<&Value> {
        self.lower.as_deref()
    }
    pub fn upper(&self) -> Option<&Value> {
        self.upper.as_deref()
    }
    pub fn inc_lower(&self) -> bool {
        self.inc_lower
    }
    pub fn inc_upper(&self) -> bool {
        self.inc_upper
    }
    pub fn is_empty(&self) -> bool {
        self.empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_repr_quotes_strings() {
        assert_eq!(Value::Str("something".into()).display_repr(), "\"something\"");
        assert_eq!(Value::Float32(0.5).display_repr(), "0.5");
    }

    #[test]
    fn named_tuple_positions() {
        let shape = NamedTupleShape::new(vec!["a".into(), "b".into()]);
        assert_eq!(shape.position("b"), Some(1));
        assert_eq!(shape.position("c"), None);
    }
}
