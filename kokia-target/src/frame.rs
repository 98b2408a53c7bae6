//! スタックフレーム、ローカル変数、フィールド

use crate::{ArrayRef, ObjectId, ThreadId};

/// スタックフレームの参照（スレッド + 深さ）
///
/// 停止エピソードの間だけ有効。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameRef {
    pub thread: ThreadId,
    /// 0 が最上位フレーム
    pub depth: usize,
}

/// スタックフレーム情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub frame: FrameRef,
    pub method: String,
    pub class_name: String,
    pub line: u32,
    /// static メソッドのフレームか
    pub is_static: bool,
}

/// ローカル変数
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalVariable {
    pub name: String,
    pub type_name: String,
}

/// フィールド情報
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldInfo {
    pub name: String,
    /// 宣言している型
    pub declaring_type: String,
    pub type_name: String,
    pub is_static: bool,
    pub is_final: bool,
}

/// 代入先
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lvalue {
    Local { frame: FrameRef, name: String },
    Field { object: ObjectId, field: FieldInfo },
    StaticField { field: FieldInfo },
    ArrayElement { array: ArrayRef, index: usize },
}
