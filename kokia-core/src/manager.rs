//! デバッガマネージャスレッド
//!
//! デバッグ対象との通信はすべてこのスレッドで直列に実行する。
//! UIスレッドはコマンドをキューに入れるだけで、結果はイベントとして受け取る。
//!
//! コマンドは優先度の高いものから、同じ優先度なら投入順に実行する。
//! コマンドが結び付いた停止コンテキストが実行時点で再開済みなら、
//! 本体の代わりに取り消し処理を実行する。
//!
//! マネージャスレッド上のコマンドから同じマネージャへ `invoke` すると、
//! キューを経由せずその場で実行する。

use crate::history::HistoryStore;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use kokia_render::RendererRegistry;
use kokia_target::{SuspendContext, Target};
use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, trace};

static NEXT_MANAGER: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// このスレッドで動いているマネージャのIDと状態
    static CURRENT: RefCell<Option<(u64, Rc<ManagerEnv>)>> = const { RefCell::new(None) };
}

/// 現在のスレッドがマネージャスレッドか
pub fn is_manager_thread() -> bool {
    CURRENT.with(|current| current.borrow().is_some())
}

/// 現在のスレッドがマネージャ `id` のスレッドなら、その状態
fn current_env(id: u64) -> Option<Rc<ManagerEnv>> {
    CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .filter(|(owner, _)| *owner == id)
            .map(|(_, env)| env.clone())
    })
}

/// マネージャスレッドとのやり取りのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    #[error("debugger manager thread has stopped")]
    Closed,
    #[error("timed out waiting for the debugger manager thread")]
    Timeout,
    #[error("command was cancelled because the target resumed")]
    Cancelled,
    #[error("command did not complete")]
    Aborted,
}

/// コマンドの優先度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// マネージャスレッドが持つ状態
///
/// 入れ子で実行されるコマンドとも共有するため、借用はその場限りにする。
/// 外側のコマンドが借用中の状態を入れ子のコマンドが書き換えようとするとパニックする。
pub struct ManagerEnv {
    target: RefCell<Box<dyn Target>>,
    renderers: Arc<RendererRegistry>,
    histories: RefCell<HistoryStore>,
}

impl ManagerEnv {
    pub fn new(target: Box<dyn Target>, renderers: Arc<RendererRegistry>) -> Self {
        Self {
            target: RefCell::new(target),
            renderers,
            histories: RefCell::new(HistoryStore::default()),
        }
    }

    pub fn target(&self) -> Ref<'_, dyn Target> {
        Ref::map(self.target.borrow(), |target| &**target)
    }

    pub fn target_mut(&self) -> RefMut<'_, dyn Target> {
        RefMut::map(self.target.borrow_mut(), |target| &mut **target)
    }

    pub fn renderers(&self) -> &RendererRegistry {
        &self.renderers
    }

    pub(crate) fn histories(&self) -> Ref<'_, HistoryStore> {
        self.histories.borrow()
    }

    pub(crate) fn histories_mut(&self) -> RefMut<'_, HistoryStore> {
        self.histories.borrow_mut()
    }
}

/// マネージャスレッドで実行するコマンド
pub trait ManagerCommand: Send + 'static {
    fn name(&self) -> &'static str;

    fn priority(&self) -> Priority {
        Priority::Normal
    }

    /// コマンドが結び付いた停止コンテキスト
    fn suspend_context(&self) -> Option<&SuspendContext> {
        None
    }

    fn action(self: Box<Self>, env: &ManagerEnv);

    /// 停止コンテキストが再開済みだった場合に本体の代わりに呼ばれる
    fn cancelled(self: Box<Self>, _env: &ManagerEnv) {}
}

/// クロージャを実行するコマンド
struct FnCommand<F> {
    name: &'static str,
    priority: Priority,
    context: Option<SuspendContext>,
    f: F,
}

impl<F> ManagerCommand for FnCommand<F>
where
    F: FnOnce(&ManagerEnv) + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn suspend_context(&self) -> Option<&SuspendContext> {
        self.context.as_ref()
    }

    fn action(self: Box<Self>, env: &ManagerEnv) {
        let this = *self;
        (this.f)(env)
    }
}

/// 完了を待ち手に通知するラッパー
struct Notifying {
    inner: Box<dyn ManagerCommand>,
    done: Sender<bool>,
}

impl ManagerCommand for Notifying {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn priority(&self) -> Priority {
        self.inner.priority()
    }

    fn suspend_context(&self) -> Option<&SuspendContext> {
        self.inner.suspend_context()
    }

    fn action(self: Box<Self>, env: &ManagerEnv) {
        let Notifying { inner, done } = *self;
        inner.action(env);
        let _ = done.send(true);
    }

    fn cancelled(self: Box<Self>, env: &ManagerEnv) {
        let Notifying { inner, done } = *self;
        inner.cancelled(env);
        let _ = done.send(false);
    }
}

struct Job {
    seq: u64,
    priority: Priority,
    command: Box<dyn ManagerCommand>,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.priority, Reverse(self.seq)).cmp(&(other.priority, Reverse(other.seq)))
    }
}

enum Message {
    Run(Job),
    Shutdown,
}

/// マネージャスレッドへの送信口
#[derive(Clone)]
pub struct ManagerHandle {
    id: u64,
    sender: Sender<Message>,
    seq: Arc<AtomicU64>,
}

impl ManagerHandle {
    /// コマンドを投入して即座に戻る
    pub fn invoke_later(&self, command: impl ManagerCommand) -> Result<(), ManagerError> {
        self.submit(Box::new(command))
    }

    /// 型消去済みのコマンドを投入する
    pub fn submit(&self, command: Box<dyn ManagerCommand>) -> Result<(), ManagerError> {
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        let job = Job {
            seq,
            priority: command.priority(),
            command,
        };
        trace!(seq, command = job.command.name(), "command queued");
        self.sender
            .send(Message::Run(job))
            .map_err(|_| ManagerError::Closed)
    }

    /// クロージャをコマンドとして投入する
    pub fn schedule<F>(
        &self,
        name: &'static str,
        context: Option<SuspendContext>,
        f: F,
    ) -> Result<(), ManagerError>
    where
        F: FnOnce(&ManagerEnv) + Send + 'static,
    {
        self.schedule_with_priority(name, Priority::Normal, context, f)
    }

    pub fn schedule_with_priority<F>(
        &self,
        name: &'static str,
        priority: Priority,
        context: Option<SuspendContext>,
        f: F,
    ) -> Result<(), ManagerError>
    where
        F: FnOnce(&ManagerEnv) + Send + 'static,
    {
        self.invoke_later(FnCommand {
            name,
            priority,
            context,
            f,
        })
    }

    /// コマンドを投入し、実行が終わるまで待つ
    ///
    /// このマネージャのスレッド上で呼ぶと、キューを経由せずその場で実行する。
    pub fn invoke(&self, command: impl ManagerCommand) -> Result<(), ManagerError> {
        if let Some(env) = current_env(self.id) {
            return run_nested(Box::new(command), &env);
        }
        let (done, finished) = bounded(1);
        self.submit(Box::new(Notifying {
            inner: Box::new(command),
            done,
        }))?;
        match finished.recv() {
            Ok(true) => Ok(()),
            Ok(false) => Err(ManagerError::Cancelled),
            Err(_) => Err(ManagerError::Aborted),
        }
    }

    /// 先に投入されたコマンドがすべて終わるまで待つ
    ///
    /// マネージャスレッド上では待たずに戻る。
    pub fn flush(&self) -> Result<(), ManagerError> {
        self.invoke(FnCommand {
            name: "flush",
            priority: Priority::Low,
            context: None,
            f: |_env: &ManagerEnv| {},
        })
    }

    /// マネージャスレッドで関数を実行し、結果を最大 `timeout` 待つ
    ///
    /// このマネージャのスレッド上ではその場で実行する。
    pub fn invoke_and_wait<R, F>(
        &self,
        context: Option<SuspendContext>,
        timeout: Duration,
        f: F,
    ) -> Result<R, ManagerError>
    where
        R: Send + 'static,
        F: FnOnce(&ManagerEnv) -> R + Send + 'static,
    {
        if let Some(env) = current_env(self.id) {
            if context.as_ref().is_some_and(SuspendContext::is_resumed) {
                return Err(ManagerError::Cancelled);
            }
            trace!("running nested invoke-and-wait");
            return Ok(f(&env));
        }
        let (tx, rx) = bounded(1);
        self.schedule_with_priority("invoke-and-wait", Priority::High, context, move |env| {
            let _ = tx.send(f(env));
        })?;
        match rx.recv_timeout(timeout) {
            Ok(result) => Ok(result),
            Err(RecvTimeoutError::Timeout) => Err(ManagerError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(ManagerError::Cancelled),
        }
    }
}

/// マネージャスレッド
pub struct ManagerThread {
    handle: ManagerHandle,
    worker: Option<JoinHandle<()>>,
}

impl ManagerThread {
    /// マネージャスレッドを起動する
    pub fn spawn(target: Box<dyn Target>, renderers: Arc<RendererRegistry>) -> crate::Result<Self> {
        let (sender, receiver) = unbounded();
        let id = NEXT_MANAGER.fetch_add(1, AtomicOrdering::Relaxed);
        let env = ManagerEnv::new(target, renderers);
        let worker = thread::Builder::new()
            .name("kokia-manager".to_string())
            .spawn(move || run(id, receiver, env))?;
        info!(manager = id, "debugger manager thread started");
        Ok(Self {
            handle: ManagerHandle {
                id,
                sender,
                seq: Arc::new(AtomicU64::new(0)),
            },
            worker: Some(worker),
        })
    }

    pub fn handle(&self) -> ManagerHandle {
        self.handle.clone()
    }

    /// キューに残ったコマンドを実行してから停止する
    pub fn close(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.handle.sender.send(Message::Shutdown);
        if worker.join().is_err() {
            error!("debugger manager thread panicked");
        }
        info!("debugger manager thread stopped");
    }
}

impl Drop for ManagerThread {
    fn drop(&mut self) {
        self.close();
    }
}

fn run(id: u64, receiver: Receiver<Message>, env: ManagerEnv) {
    let env = Rc::new(env);
    CURRENT.with(|current| *current.borrow_mut() = Some((id, env.clone())));
    let mut queue = BinaryHeap::new();
    let mut closing = false;

    loop {
        if queue.is_empty() {
            if closing {
                break;
            }
            match receiver.recv() {
                Ok(message) => accept(message, &mut queue, &mut closing),
                Err(_) => break,
            }
        }
        while let Ok(message) = receiver.try_recv() {
            accept(message, &mut queue, &mut closing);
        }
        if let Some(job) = queue.pop() {
            execute(job, &env);
        }
    }
    CURRENT.with(|current| current.borrow_mut().take());
}

fn accept(message: Message, queue: &mut BinaryHeap<Job>, closing: &mut bool) {
    match message {
        Message::Run(job) => queue.push(job),
        Message::Shutdown => *closing = true,
    }
}

fn execute(job: Job, env: &ManagerEnv) {
    let Job { seq, command, .. } = job;
    let name = command.name();
    let resumed = command
        .suspend_context()
        .is_some_and(SuspendContext::is_resumed);

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        if resumed {
            debug!(seq, command = name, "suspend context resumed, cancelling");
            command.cancelled(env);
        } else {
            trace!(seq, command = name, "running command");
            command.action(env);
        }
    }));
    if let Err(payload) = result {
        error!(seq, command = name, "command panicked: {}", panic_message(&*payload));
    }
}

/// 実行中のコマンドから呼ばれたコマンドをその場で実行する
///
/// パニックは外側のコマンドの実行に任せる。
fn run_nested(command: Box<dyn ManagerCommand>, env: &ManagerEnv) -> Result<(), ManagerError> {
    let name = command.name();
    if command
        .suspend_context()
        .is_some_and(SuspendContext::is_resumed)
    {
        debug!(command = name, "suspend context resumed, cancelling nested command");
        command.cancelled(env);
        return Err(ManagerError::Cancelled);
    }
    trace!(command = name, "running nested command");
    command.action(env);
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kokia_target::SnapshotTarget;
    use std::sync::Mutex;

    fn spawn() -> ManagerThread {
        ManagerThread::spawn(
            Box::new(SnapshotTarget::new()),
            Arc::new(RendererRegistry::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_priority_then_fifo() {
        let mut manager = spawn();
        let handle = manager.handle();
        let order = Arc::new(Mutex::new(Vec::new()));

        // 先頭のコマンドで後続の投入が終わるまで待たせる
        let (release, gate) = bounded::<()>(0);
        handle
            .schedule("gate", None, move |_| {
                let _ = gate.recv();
            })
            .unwrap();
        for (name, priority) in [
            ("low", Priority::Low),
            ("normal-1", Priority::Normal),
            ("high", Priority::High),
            ("normal-2", Priority::Normal),
        ] {
            let order = order.clone();
            handle
                .schedule_with_priority(name, priority, None, move |_| {
                    order.lock().unwrap().push(name);
                })
                .unwrap();
        }
        release.send(()).unwrap();
        handle.flush().unwrap();

        assert_eq!(
            *order.lock().unwrap(),
            vec!["high", "normal-1", "normal-2", "low"]
        );
        manager.close();
    }

    #[test]
    fn test_resumed_context_runs_cancel_hook() {
        let manager = spawn();
        let handle = manager.handle();
        let context = SuspendContext::new(1, None);
        context.resume();

        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        let result = handle.invoke(FnCommand {
            name: "bound",
            priority: Priority::Normal,
            context: Some(context),
            f: move |_env: &ManagerEnv| *flag.lock().unwrap() = true,
        });
        assert_eq!(result, Err(ManagerError::Cancelled));
        assert!(!*ran.lock().unwrap());
    }

    #[test]
    fn test_panicking_command_does_not_stop_thread() {
        let manager = spawn();
        let handle = manager.handle();
        handle
            .schedule("boom", None, |_| panic!("boom"))
            .unwrap();
        let value = handle
            .invoke_and_wait(None, Duration::from_secs(5), |env| env.target().is_suspended())
            .unwrap();
        assert!(value);
    }

    #[test]
    fn test_nested_invoke_runs_immediately() {
        let manager = spawn();
        let handle = manager.handle();
        let order = Arc::new(Mutex::new(Vec::new()));

        let inner = handle.clone();
        let log = order.clone();
        handle
            .schedule("outer", None, move |_| {
                log.lock().unwrap().push("outer-start");
                let queued = log.clone();
                inner
                    .schedule_with_priority("queued", Priority::High, None, move |_| {
                        queued.lock().unwrap().push("queued");
                    })
                    .unwrap();
                let nested = log.clone();
                let result = inner.invoke(FnCommand {
                    name: "nested",
                    priority: Priority::Low,
                    context: None,
                    f: move |env: &ManagerEnv| {
                        if env.target().is_suspended() {
                            nested.lock().unwrap().push("nested");
                        }
                    },
                });
                if result.is_ok() && inner.flush().is_ok() {
                    log.lock().unwrap().push("outer-end");
                }
            })
            .unwrap();
        handle.flush().unwrap();

        assert_eq!(
            *order.lock().unwrap(),
            vec!["outer-start", "nested", "outer-end", "queued"]
        );
        assert!(!is_manager_thread());
    }

    #[test]
    fn test_nested_invoke_and_wait() {
        let manager = spawn();
        let handle = manager.handle();
        let inner = handle.clone();
        let resumed = SuspendContext::new(1, None);
        resumed.resume();

        let (value, cancelled) = handle
            .invoke_and_wait(None, Duration::from_secs(5), move |_| {
                (
                    inner.invoke_and_wait(None, Duration::ZERO, |env| env.target().is_suspended()),
                    inner.invoke_and_wait(Some(resumed), Duration::ZERO, |_| ()),
                )
            })
            .unwrap();
        assert_eq!(value, Ok(true));
        assert_eq!(cancelled, Err(ManagerError::Cancelled));
    }

    #[test]
    fn test_other_manager_is_still_queued() {
        let first = spawn();
        let second = spawn();
        let other = second.handle();
        let result = first
            .handle()
            .invoke_and_wait(None, Duration::from_secs(5), move |_| {
                other.invoke_and_wait(None, Duration::from_secs(5), |_| is_manager_thread())
            })
            .unwrap();
        assert_eq!(result, Ok(true));
    }
}
