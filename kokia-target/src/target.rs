//! デバッグ対象プロセスとの通信インターフェース
//!
//! プロトコル接続は同時リクエストに耐えられないため、
//! 実装はマネージャスレッドだけから呼び出される前提で `&self` / `&mut self` を取る。

use crate::{
    EvalResult, FieldInfo, FrameInfo, FrameRef, LocalVariable, Lvalue, ObjectId,
    ThreadGroupId, ThreadGroupInfo, ThreadId, ThreadInfo, Value,
};

/// デバッグ対象プロセス
pub trait Target: Send {
    /// 全スレッドが停止しているか
    fn is_suspended(&self) -> bool;

    /// プロセスを停止させる。停止の原因スレッドを返す
    fn suspend(&mut self) -> EvalResult<Option<ThreadId>>;

    /// プロセスを再開させる
    fn resume(&mut self) -> EvalResult<()>;

    /// 全スレッドを取得する
    fn threads(&self) -> EvalResult<Vec<ThreadInfo>>;

    /// スレッドを取得する
    fn thread(&self, id: ThreadId) -> EvalResult<ThreadInfo>;

    /// トップレベルのスレッドグループを取得する
    fn top_level_groups(&self) -> EvalResult<Vec<ThreadGroupInfo>>;

    /// スレッドグループを取得する
    fn thread_group(&self, id: ThreadGroupId) -> EvalResult<ThreadGroupInfo>;

    /// グループ直下のグループとスレッドを取得する
    fn group_children(
        &self,
        id: ThreadGroupId,
    ) -> EvalResult<(Vec<ThreadGroupInfo>, Vec<ThreadInfo>)>;

    /// スレッドのスタックフレームを上から順に取得する
    fn frames(&self, thread: ThreadId) -> EvalResult<Vec<FrameInfo>>;

    /// フレームの `this` オブジェクトを取得する
    fn this_object(&self, frame: &FrameRef) -> EvalResult<Option<Value>>;

    /// フレームで可視なローカル変数を宣言順に取得する
    fn visible_locals(&self, frame: &FrameRef) -> EvalResult<Vec<LocalVariable>>;

    /// ローカル変数の値を取得する
    fn local_value(&self, frame: &FrameRef, name: &str) -> EvalResult<Value>;

    /// 型が宣言・継承する全フィールドを宣言順に取得する
    ///
    /// 基底型のフィールドが先に並ぶ。
    fn fields(&self, type_name: &str) -> EvalResult<Vec<FieldInfo>>;

    /// フィールドの値を取得する（`object` が `None` なら static フィールド）
    fn field_value(&self, object: Option<ObjectId>, field: &FieldInfo) -> EvalResult<Value>;

    /// 配列要素を取得する
    fn array_element(&self, array: ObjectId, index: usize) -> EvalResult<Value>;

    /// 文字列オブジェクトの内容を取得する
    fn string_value(&self, id: ObjectId) -> EvalResult<String>;

    /// オブジェクトが回収済みか
    fn is_collected(&self, id: ObjectId) -> bool;

    /// フレームのスコープで式を評価する
    fn evaluate(&self, frame: Option<&FrameRef>, expression: &str) -> EvalResult<Value>;

    /// 代入する
    fn set_value(&mut self, lvalue: &Lvalue, value: Value) -> EvalResult<()>;
}
