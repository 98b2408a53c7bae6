//! デバッガコンテキスト

use kokia_target::{FrameRef, SuspendContext, ThreadId};

/// ツリーが表示している停止エピソード・スレッド・フレームの組
///
/// 評価コンテキストとしても使われる。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebuggerContext {
    suspend: Option<SuspendContext>,
    thread: Option<ThreadId>,
    frame: Option<FrameRef>,
}

impl DebuggerContext {
    /// 停止していないコンテキスト
    pub fn empty() -> Self {
        Self::default()
    }

    /// 停止コンテキストから作成する（停止スレッドの最上位フレームを選択）
    pub fn from_suspend(suspend: SuspendContext) -> Self {
        let thread = suspend.thread();
        Self {
            suspend: Some(suspend),
            thread,
            frame: thread.map(|thread| FrameRef { thread, depth: 0 }),
        }
    }

    /// 別スレッドを選択したコンテキスト
    pub fn with_thread(&self, thread: ThreadId) -> Self {
        Self {
            suspend: self.suspend.clone(),
            thread: Some(thread),
            frame: Some(FrameRef { thread, depth: 0 }),
        }
    }

    /// 現在のスレッドの別フレームを選択したコンテキスト
    pub fn with_frame(&self, depth: usize) -> Self {
        Self {
            suspend: self.suspend.clone(),
            thread: self.thread,
            frame: self.thread.map(|thread| FrameRef { thread, depth }),
        }
    }

    pub fn suspend(&self) -> Option<&SuspendContext> {
        self.suspend.as_ref()
    }

    pub fn thread(&self) -> Option<ThreadId> {
        self.thread
    }

    pub fn frame(&self) -> Option<&FrameRef> {
        self.frame.as_ref()
    }

    /// 停止中（再開されていない）か
    pub fn is_suspended(&self) -> bool {
        self.suspend.as_ref().is_some_and(|s| !s.is_resumed())
    }
}
