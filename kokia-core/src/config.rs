//! ツリーの設定

use std::time::Duration;

/// ツリーコントローラの設定
#[derive(Debug, Clone)]
pub struct TreeConfig {
    /// 現在のスレッド（とそれを含むグループ）を一覧の先頭に固定する
    pub pin_current_thread: bool,
    /// スレッドビューでスレッドグループを階層表示する
    pub show_thread_groups: bool,
    /// 履歴を保持するスレッド数
    pub history_capacity: usize,
    /// 即時表示用の値取得で待つ最大時間
    pub value_wait_timeout: Duration,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            pin_current_thread: true,
            show_thread_groups: true,
            history_capacity: 8,
            value_wait_timeout: Duration::from_secs(2),
        }
    }
}

impl TreeConfig {
    pub(crate) fn build_options(&self) -> BuildOptions {
        BuildOptions {
            pin_current_thread: self.pin_current_thread,
            show_thread_groups: self.show_thread_groups,
        }
    }
}

/// マネージャスレッドでの子要素構築に渡す設定
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    pub pin_current_thread: bool,
    pub show_thread_groups: bool,
}
