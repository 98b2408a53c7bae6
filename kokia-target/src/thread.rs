//! スレッドとスレッドグループ

use std::fmt;

/// スレッドID
pub type ThreadId = u64;

/// スレッドグループID
pub type ThreadGroupId = u64;

/// スレッドの実行状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    NotStarted,
    Running,
    Sleeping,
    Waiting,
    Monitor,
    Zombie,
    Terminated,
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            ThreadState::NotStarted => "NOT_STARTED",
            ThreadState::Running => "RUNNING",
            ThreadState::Sleeping => "SLEEPING",
            ThreadState::Waiting => "WAIT",
            ThreadState::Monitor => "MONITOR",
            ThreadState::Zombie => "ZOMBIE",
            ThreadState::Terminated => "TERMINATED",
        };
        f.write_str(text)
    }
}

/// デバッグ対象のスレッド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub name: String,
    pub group: ThreadGroupId,
    pub state: ThreadState,
    pub suspended: bool,
}

impl ThreadInfo {
    /// 生存しているか
    pub fn is_alive(&self) -> bool {
        self.state != ThreadState::Terminated
    }

    /// スタックフレームを列挙できる状態か
    ///
    /// 生存・停止中で、かつ zombie / 未開始でないこと。
    pub fn can_list_frames(&self) -> bool {
        self.is_alive()
            && self.suspended
            && !matches!(self.state, ThreadState::Zombie | ThreadState::NotStarted)
    }
}

/// スレッドグループ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadGroupInfo {
    pub id: ThreadGroupId,
    pub name: String,
    pub parent: Option<ThreadGroupId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(state: ThreadState, suspended: bool) -> ThreadInfo {
        ThreadInfo { id: 1, name: "main".to_string(), group: 1, state, suspended }
    }

    #[test]
    fn test_can_list_frames() {
        assert!(thread(ThreadState::Running, true).can_list_frames());
        assert!(!thread(ThreadState::Running, false).can_list_frames());
        assert!(!thread(ThreadState::Zombie, true).can_list_frames());
        assert!(!thread(ThreadState::NotStarted, true).can_list_frames());
        assert!(!thread(ThreadState::Terminated, true).can_list_frames());
    }
}
