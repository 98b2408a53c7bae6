//! リモート値のハンドル

use std::fmt;

/// ターゲット側オブジェクトのID
pub type ObjectId = u64;

/// オブジェクト参照
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub id: ObjectId,
    pub type_name: String,
}

/// 配列参照
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayRef {
    pub id: ObjectId,
    /// 要素型を含む型名（例: `int[]`）
    pub type_name: String,
    pub length: usize,
}

impl ArrayRef {
    /// 要素数入りの型名（`int[]` -> `int[3]`）
    pub fn sized_type_name(&self) -> String {
        match self.type_name.strip_suffix("[]") {
            Some(element) => format!("{}[{}]", element, self.length),
            None => format!("{}[{}]", self.type_name, self.length),
        }
    }
}

/// ターゲットから取得した値
///
/// 参照型の等価性はオブジェクトIDで判定される。
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Char(char),
    Int(i64),
    Float(f32),
    Double(f64),
    /// 文字列オブジェクト
    Str(ObjectRef),
    Object(ObjectRef),
    Array(ArrayRef),
}

impl Value {
    /// 値の型名を取得する
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Char(_) => "char",
            Value::Int(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Str(r) | Value::Object(r) => &r.type_name,
            Value::Array(a) => &a.type_name,
        }
    }

    /// 参照型ならオブジェクトIDを返す
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Value::Str(r) | Value::Object(r) => Some(r.id),
            Value::Array(a) => Some(a.id),
            _ => None,
        }
    }

    /// NaN かどうか
    pub fn is_nan(&self) -> bool {
        match self {
            Value::Float(v) => v.is_nan(),
            Value::Double(v) => v.is_nan(),
            _ => false,
        }
    }

    /// 同じ浮動小数点型かどうか
    pub fn same_floating_kind(&self, other: &Value) -> bool {
        matches!(
            (self, other),
            (Value::Float(_), Value::Float(_)) | (Value::Double(_), Value::Double(_))
        )
    }

    /// プリミティブ値かどうか
    pub fn is_primitive(&self) -> bool {
        self.object_id().is_none()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Char(c) => write!(f, "'{}'", c),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Str(r) | Value::Object(r) => write!(f, "{{{}@{}}}", r.type_name, r.id),
            Value::Array(a) => write!(f, "{{{}@{}}}", a.sized_type_name(), a.id),
        }
    }
}
