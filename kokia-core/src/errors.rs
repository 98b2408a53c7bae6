//! エラー型と表示メッセージ定数

use crate::descriptor::KindTag;
use crate::manager::ManagerError;
use thiserror::Error;

/// 評価待ちのプレースホルダ
pub const MSG_EVALUATING: &str = "Evaluating...";

/// プロセス実行中
pub const MSG_RUNNING: &str = "The application is running";

/// 停止コンテキストがない
pub const MSG_NOT_SUSPENDED: &str = "The application is not suspended";

/// フレームが選択されていない
pub const MSG_NO_FRAME_SELECTED: &str = "No stack frame selected";

/// フレームがない
pub const MSG_NO_FRAMES: &str = "Frames are not available";

/// 停止していないスレッド
pub const MSG_THREAD_NOT_SUSPENDED: &str = "Frames not available for unsuspended thread";

/// スレッドビューのルート
pub const MSG_THREADS_ROOT: &str = "Threads";

/// 変数ビューのルート
pub const MSG_VARIABLES_ROOT: &str = "Variables";

/// ウォッチビューのルート
pub const MSG_WATCHES_ROOT: &str = "Watches";

/// ツリーコアのエラー
#[derive(Debug, Error)]
pub enum CoreError {
    /// 構築テーブルにない記述子の種類（プログラミングエラー）
    #[error("no child builder registered for {0:?} descriptors")]
    UnknownKind(KindTag),
    /// ノードが存在しない
    #[error("node {0} does not exist")]
    NodeNotFound(u64),
    /// 代入できない記述子
    #[error("'{0}' cannot be modified")]
    NotLvalue(String),
    #[error(transparent)]
    Manager(#[from] ManagerError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
