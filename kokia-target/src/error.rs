//! 評価エラー

use thiserror::Error;

/// ターゲットへの問い合わせ・評価で発生するエラー
///
/// ツリー上ではノードの失敗ラベルとして表示され、ダイアログには出ない。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluateError {
    /// 参照先オブジェクトがターゲット側で回収済み
    #[error("object has been garbage collected")]
    ObjectCollected,
    /// ターゲットが停止していない
    #[error("target is not suspended")]
    NotSuspended,
    /// スタックフレームが無効
    #[error("stack frame is no longer valid")]
    InvalidFrame,
    /// スレッドが見つからない
    #[error("thread {0} not found")]
    ThreadNotFound(u64),
    /// 式の評価エラー
    #[error("{0}")]
    Expression(String),
    /// 代入できない値
    #[error("value cannot be modified")]
    NotLvalue,
    /// プロトコルレベルのエラー
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl EvaluateError {
    /// 式エラーを作成する
    pub fn expression(message: impl Into<String>) -> Self {
        EvaluateError::Expression(message.into())
    }

    /// オブジェクト回収によるエラーかどうか
    pub fn is_collected(&self) -> bool {
        matches!(self, EvaluateError::ObjectCollected)
    }
}

/// 評価結果型
pub type EvalResult<T> = std::result::Result<T, EvaluateError>;
