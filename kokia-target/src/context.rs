//! 停止コンテキスト

use crate::ThreadId;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// ターゲットの1回の停止エピソードを表すトークン
///
/// 再開されると無効になる。クローンは同じエピソードを共有する。
#[derive(Clone)]
pub struct SuspendContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    id: u64,
    thread: Option<ThreadId>,
    resumed: AtomicBool,
}

impl SuspendContext {
    /// 新しい停止コンテキストを作成する
    pub fn new(id: u64, thread: Option<ThreadId>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id,
                thread,
                resumed: AtomicBool::new(false),
            }),
        }
    }

    /// コンテキストIDを取得する
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// 停止の原因となったスレッド
    pub fn thread(&self) -> Option<ThreadId> {
        self.inner.thread
    }

    /// 再開済みかどうか
    pub fn is_resumed(&self) -> bool {
        self.inner.resumed.load(Ordering::Acquire)
    }

    /// 再開済みとしてマークする
    pub fn resume(&self) {
        self.inner.resumed.store(true, Ordering::Release);
    }
}

impl PartialEq for SuspendContext {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for SuspendContext {}

impl fmt::Debug for SuspendContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SuspendContext")
            .field("id", &self.inner.id)
            .field("thread", &self.inner.thread)
            .field("resumed", &self.is_resumed())
            .finish()
    }
}
