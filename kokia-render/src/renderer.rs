//! レンダラのインターフェース

use kokia_target::{ArrayRef, EvalResult, FieldInfo, ObjectId, Target, Value};

/// レンダラが生成する子要素の指定
///
/// 実際の記述子はツリー側がこの指定から生成する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildSpec {
    /// フィールド（`object` が `None` なら static）
    Field {
        object: Option<ObjectId>,
        field: FieldInfo,
    },
    /// 配列要素
    ArrayElement { array: ArrayRef, index: usize },
    /// 式で表される子要素
    Expression { name: String, expression: String },
    /// 情報メッセージ
    Message(String),
}

/// 子要素の受け口
pub trait ChildrenSink {
    /// 子要素を追加する
    ///
    /// 呼ぶたびに、既に渡した子要素の後ろへ追加される。
    fn add_children(&mut self, children: Vec<ChildSpec>);
}

impl ChildrenSink for Vec<ChildSpec> {
    fn add_children(&mut self, children: Vec<ChildSpec>) {
        self.extend(children);
    }
}

/// 値レンダラ
///
/// マネージャスレッド上で呼び出される。
pub trait Renderer: Send + Sync {
    /// レンダラ名
    fn name(&self) -> &str;

    /// この値を扱えるか
    fn is_applicable(&self, value: &Value) -> bool;

    /// 子要素を持つか
    fn is_expandable(&self, value: &Value, target: &dyn Target) -> bool;

    /// 値のラベルを計算する
    fn calc_label(&self, value: &Value, target: &dyn Target) -> EvalResult<String>;

    /// 子要素を構築する
    fn build_children(
        &self,
        value: &Value,
        target: &dyn Target,
        sink: &mut dyn ChildrenSink,
    ) -> EvalResult<()>;

    /// 親の式から子要素の式を作る
    fn child_value_expression(&self, parent: &str, child: &ChildSpec) -> Option<String> {
        match child {
            ChildSpec::Field { object: None, field } => {
                Some(format!("{}.{}", field.declaring_type, field.name))
            }
            ChildSpec::Field { field, .. } => Some(format!("{}.{}", parent, field.name)),
            ChildSpec::ArrayElement { index, .. } => Some(format!("{}[{}]", parent, index)),
            ChildSpec::Expression { expression, .. } => Some(expression.clone()),
            ChildSpec::Message(_) => None,
        }
    }
}
