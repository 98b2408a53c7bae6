//! デバッグセッション
//!
//! マネージャスレッドと現在の停止コンテキストを持つ。停止・再開の結果は
//! [`SessionEvent`] としてUIスレッドに届く。

use crate::context::DebuggerContext;
use crate::errors::{MSG_NOT_SUSPENDED, MSG_RUNNING};
use crate::manager::{ManagerHandle, ManagerThread, Priority};
use crate::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use kokia_render::RendererRegistry;
use kokia_target::{SuspendContext, Target};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// セッションの状態変化
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// ターゲットが停止した
    Paused(SuspendContext),
    /// ターゲットが再開した
    Resumed,
    /// 停止・再開に失敗した
    Error(String),
}

/// デバッグセッション
pub struct DebugSession {
    manager: ManagerThread,
    renderers: Arc<RendererRegistry>,
    current: Option<SuspendContext>,
    next_context: Arc<AtomicU64>,
    sender: Sender<SessionEvent>,
    receiver: Receiver<SessionEvent>,
}

impl DebugSession {
    /// マネージャスレッドを起動してセッションを始める
    pub fn start(target: impl Target + 'static, renderers: RendererRegistry) -> Result<Self> {
        let renderers = Arc::new(renderers);
        let manager = ManagerThread::spawn(Box::new(target), renderers.clone())?;
        let (sender, receiver) = unbounded();
        Ok(Self {
            manager,
            renderers,
            current: None,
            next_context: Arc::new(AtomicU64::new(1)),
            sender,
            receiver,
        })
    }

    pub fn manager(&self) -> ManagerHandle {
        self.manager.handle()
    }

    pub fn renderers(&self) -> Arc<RendererRegistry> {
        self.renderers.clone()
    }

    /// 現在の停止コンテキスト
    pub fn current_context(&self) -> Option<&SuspendContext> {
        self.current.as_ref()
    }

    pub fn is_suspended(&self) -> bool {
        self.current.as_ref().is_some_and(|c| !c.is_resumed())
    }

    /// ツリーに渡すコンテキスト
    pub fn debugger_context(&self) -> DebuggerContext {
        match &self.current {
            Some(context) => DebuggerContext::from_suspend(context.clone()),
            None => DebuggerContext::empty(),
        }
    }

    /// 状態の表示文字列
    pub fn state_text(&self) -> &'static str {
        if self.is_suspended() {
            "suspended"
        } else if self.current.is_some() {
            MSG_RUNNING
        } else {
            MSG_NOT_SUSPENDED
        }
    }

    /// ターゲットを停止する（結果は `Paused` イベント）
    pub fn pause(&self) -> Result<()> {
        let sender = self.sender.clone();
        let ids = self.next_context.clone();
        self.manager
            .handle()
            .schedule_with_priority("pause", Priority::High, None, move |env| {
                let result = env.target_mut().suspend();
                let event = match result {
                    Ok(thread) => {
                        let id = ids.fetch_add(1, Ordering::Relaxed);
                        info!(context = id, ?thread, "target suspended");
                        SessionEvent::Paused(SuspendContext::new(id, thread))
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to suspend target");
                        SessionEvent::Error(err.to_string())
                    }
                };
                let _ = sender.send(event);
            })?;
        Ok(())
    }

    /// ターゲットを再開する
    ///
    /// 停止コンテキストは即座に再開済みになり、まだ実行されていない
    /// そのコンテキストのコマンドは取り消される。再開済みのコンテキストは
    /// 次の停止まで残り、ツリーには実行中のメッセージが出る。
    pub fn resume(&mut self) -> Result<()> {
        if let Some(context) = &self.current {
            context.resume();
        }
        let sender = self.sender.clone();
        self.manager
            .handle()
            .schedule_with_priority("resume", Priority::High, None, move |env| {
                let result = env.target_mut().resume();
                let event = match result {
                    Ok(()) => {
                        info!("target resumed");
                        SessionEvent::Resumed
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to resume target");
                        SessionEvent::Error(err.to_string())
                    }
                };
                let _ = sender.send(event);
            })?;
        Ok(())
    }

    /// 届いたイベントを取り出し、停止コンテキストを更新する
    pub fn poll_events(&mut self) -> Vec<SessionEvent> {
        let events: Vec<SessionEvent> = self.receiver.try_iter().collect();
        for event in &events {
            if let SessionEvent::Paused(context) = event {
                self.current = Some(context.clone());
            }
        }
        events
    }

    /// 先に投入したコマンドがすべて終わるまで待つ
    pub fn flush(&self) -> Result<()> {
        self.manager.handle().flush()?;
        Ok(())
    }

    pub fn close(mut self) {
        self.manager.close();
    }
}
