use std::collections::BTreeMap;
use std::fmt;

use crate::core::{DbError, GeoPoint, Result, Value};

use super::normalize_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Integer,
    String,
    Point,
    List,
    Map,
    Object,
    Boolean,
    Float,
    Default,
}

impl FieldType {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "int" | "integer" => Self::Integer,
            "string" | "str" | "text" => Self::String,
            "point" => Self::Point,
            "list" | "array" => Self::List,
            "map" | "hash" => Self::Map,
            "object" => Self::Object,
            "bool" | "boolean" => Self::Boolean,
            "float" | "double" => Self::Float,
            "default" | "" => Self::Default,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::String => "string",
            Self::Point => "point",
            Self::List => "list",
            Self::Map => "map",
            Self::Object => "object",
            Self::Boolean => "boolean",
            Self::Float => "float",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared size of a field: an exact width or a `(min, max)` range.
///
/// For strings this is a character length; for integers it is a byte width
/// that backends use to pick a native column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSize {
    Fixed(u32),
    Range(u32, u32),
}

impl FieldSize {
    pub fn min(&self) -> u32 {
        match self {
            Self::Fixed(n) => *n,
            Self::Range(min, _) => *min,
        }
    }

    pub fn max(&self) -> u32 {
        match self {
            Self::Fixed(n) => *n,
            Self::Range(_, max) => *max,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    field_type: FieldType,
    size: Option<FieldSize>,
    unique: bool,
    required: bool,
    default: Option<Value>,
    options: BTreeMap<String, Value>,
}

impl Field {
    pub fn new(name: &str, field_type: FieldType) -> Result<Self> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(DbError::InvalidArgument("Field name cannot be empty".into()));
        }
        if name.chars().all(|c| c.is_ascii_digit()) {
            return Err(DbError::InvalidArgument(format!(
                "Field name '{}' is numeric and reserved for positional access",
                name
            )));
        }
        Ok(Self::untyped(&name).with_type(field_type))
    }

    /// Field used for names nobody declared. Values pass through untouched.
    pub fn untyped(name: &str) -> Self {
        Self {
            name: normalize_name(name),
            field_type: FieldType::Default,
            size: None,
            unique: false,
            required: false,
            default: None,
            options: BTreeMap::new(),
        }
    }

    fn with_type(mut self, field_type: FieldType) -> Self {
        self.field_type = field_type;
        self
    }

    pub fn with_size(mut self, size: FieldSize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn set_size(&mut self, size: Option<FieldSize>) -> &mut Self {
        self.size = size;
        self
    }

    pub fn set_unique(&mut self, unique: bool) -> &mut Self {
        self.unique = unique;
        self
    }

    /// Mark the field required. `default` fills it in when a write omits it.
    pub fn set_required(&mut self, default: Option<Value>) -> &mut Self {
        self.required = true;
        self.default = default;
        self
    }

    pub fn set_option(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn size(&self) -> Option<FieldSize> {
        self.size
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn is_spatial(&self) -> bool {
        self.field_type == FieldType::Point
    }

    /// Coerce a value about to be stored into this field's declared type.
    pub fn normalize(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(value);
        }

        match self.field_type {
            FieldType::Default => Ok(value),
            FieldType::Integer => value
                .as_i64()
                .map(Value::Integer)
                .ok_or_else(|| self.mismatch(&value)),
            FieldType::Float => value
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| self.mismatch(&value)),
            FieldType::Boolean => self.normalize_bool(value),
            FieldType::String => self.normalize_string(value),
            FieldType::Point => GeoPoint::parse(&value)
                .map(GeoPoint::to_value)
                .map_err(|e| DbError::TypeMismatch(format!("Field '{}': {}", self.name, e))),
            FieldType::List => match value {
                Value::List(_) => Ok(value),
                other => Err(self.mismatch(&other)),
            },
            FieldType::Map | FieldType::Object => match value {
                Value::Map(_) => Ok(value),
                other => Err(self.mismatch(&other)),
            },
        }
    }

    /// Coerce a literal appearing in a query against this field.
    ///
    /// Collections are matched element-wise by the index tables, so a scalar
    /// compared against a list or map field passes through unchanged.
    pub fn normalize_query(&self, value: Value) -> Result<Value> {
        match self.field_type {
            FieldType::List | FieldType::Map | FieldType::Object if !value.is_list() => Ok(value),
            _ => self.normalize(value),
        }
    }

    fn normalize_bool(&self, value: Value) -> Result<Value> {
        let truth = match &value {
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => return Err(self.mismatch(&value)),
            },
            _ => return Err(self.mismatch(&value)),
        };
        Ok(Value::Integer(i64::from(truth)))
    }

    fn normalize_string(&self, value: Value) -> Result<Value> {
        let text = match value {
            Value::Text(s) => s,
            Value::Integer(_) | Value::Float(_) | Value::Boolean(_) => value.to_string(),
            other => return Err(self.mismatch(&other)),
        };

        if let Some(size) = self.size {
            let len = text.chars().count() as u32;
            if len > size.max() || len < size.min() {
                return Err(DbError::TypeMismatch(format!(
                    "Field '{}' expects a length within {}..={}, got {}",
                    self.name,
                    size.min(),
                    size.max(),
                    len
                )));
            }
        }
        Ok(Value::Text(text))
    }

    fn mismatch(&self, value: &Value) -> DbError {
        DbError::TypeMismatch(format!(
            "Field '{}' expects type {}, got {}",
            self.name,
            self.field_type,
            value.type_name()
        ))
    }
}
