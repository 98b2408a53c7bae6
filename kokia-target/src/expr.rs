//! ウォッチ式の構文
//!
//! `x`、`obj.field`、`arr[0]`、`this` とその組み合わせだけを扱う。

use crate::EvaluateError;

/// 式の抽象構文木
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// 変数名: `x`
    Variable(String),
    /// `this`
    This,
    /// フィールドアクセス: `obj.field`
    FieldAccess {
        base: Box<Expression>,
        field: String,
    },
    /// 配列インデックスアクセス: `arr[0]`
    IndexAccess {
        base: Box<Expression>,
        index: usize,
    },
}

impl Expression {
    /// 式のテキスト表現
    pub fn to_text(&self) -> String {
        match self {
            Expression::Variable(name) => name.clone(),
            Expression::This => "this".to_string(),
            Expression::FieldAccess { base, field } => format!("{}.{}", base.to_text(), field),
            Expression::IndexAccess { base, index } => format!("{}[{}]", base.to_text(), index),
        }
    }
}

/// 式をパースする
///
/// 末尾の要素から分解するので `a.b.c` は `(a.b).c` になる。
pub fn parse_expression(input: &str) -> Result<Expression, EvaluateError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(EvaluateError::expression("empty expression"));
    }

    // 末尾が `]` -> IndexAccess
    if let Some(rest) = input.strip_suffix(']') {
        let open = rest
            .rfind('[')
            .ok_or_else(|| EvaluateError::expression("missing opening bracket '['"))?;
        let index_str = &rest[open + 1..];
        let index = index_str
            .trim()
            .parse::<usize>()
            .map_err(|_| EvaluateError::expression(format!("invalid array index: {}", index_str)))?;
        let base = Box::new(parse_expression(&rest[..open])?);
        return Ok(Expression::IndexAccess { base, index });
    }

    // 最後の `.` -> FieldAccess
    if let Some((base_str, field)) = input.rsplit_once('.') {
        let field = field.trim();
        if !is_identifier(field) {
            return Err(EvaluateError::expression(format!("invalid field name: {}", field)));
        }
        let base = Box::new(parse_expression(base_str)?);
        return Ok(Expression::FieldAccess {
            base,
            field: field.to_string(),
        });
    }

    if input.contains('[') {
        return Err(EvaluateError::expression("missing closing bracket ']'"));
    }
    if input == "this" {
        return Ok(Expression::This);
    }
    if !is_identifier(input) {
        return Err(EvaluateError::expression(format!("cannot parse '{}'", input)));
    }
    Ok(Expression::Variable(input.to_string()))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}
