//! Kokia デバッグ対象モデル
//!
//! このクレートは、デバッグ対象プロセスとの境界を定義します。
//! リモート値・スレッド・スタックフレーム・停止コンテキストのモデルと、
//! プロトコル接続を抽象化した [`Target`] トレイトを提供します。
//! [`SnapshotTarget`] はメモリ上で組み立てる実装です。

pub mod context;
pub mod error;
pub mod expr;
pub mod frame;
pub mod snapshot;
pub mod target;
pub mod thread;
pub mod value;

pub use context::SuspendContext;
pub use error::{EvalResult, EvaluateError};
pub use expr::{parse_expression, Expression};
pub use frame::{FieldInfo, FrameInfo, FrameRef, LocalVariable, Lvalue};
pub use snapshot::SnapshotTarget;
pub use target::Target;
pub use thread::{ThreadGroupId, ThreadGroupInfo, ThreadId, ThreadInfo, ThreadState};
pub use value::{ArrayRef, ObjectId, ObjectRef, Value};

/// ターゲット構築の結果型
pub type Result<T> = anyhow::Result<T>;
