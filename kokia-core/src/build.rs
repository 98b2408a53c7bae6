//! 子要素の構築（マネージャスレッド）
//!
//! 記述子の種類ごとの構築関数を [`BUILDERS`] で振り分ける。
//! 構築中のエラーはメッセージの子要素として表示し、ツリーの他の部分は壊さない。

use crate::config::BuildOptions;
use crate::context::DebuggerContext;
use crate::descriptor::{Descriptor, DescriptorKey, DescriptorKind, KindTag, MessageDescriptor};
use crate::errors::{CoreError, MSG_NO_FRAMES, MSG_NO_FRAME_SELECTED, MSG_THREAD_NOT_SUSPENDED};
use crate::event::TreeEvent;
use crate::node::NodeId;
use crate::node_manager::DescriptorFactory;
use crate::tree::ViewKind;
use crossbeam_channel::Sender;
use kokia_render::{ChildSpec, ChildrenSink, RendererRegistry};
use kokia_target::{
    EvaluateError, Target, ThreadGroupId, ThreadGroupInfo, ThreadId, ThreadInfo, ThreadState,
};
use tracing::{debug, warn};

/// 構築関数に渡す環境
pub(crate) struct BuildContext<'a> {
    pub target: &'a dyn Target,
    pub renderers: &'a RendererRegistry,
    pub factory: DescriptorFactory<'a>,
    pub context: &'a DebuggerContext,
    pub options: BuildOptions,
}

impl BuildContext<'_> {
    /// 子記述子を作成し、評価とラベル計算まで済ませる
    pub fn create(&self, parent: &DescriptorKey, kind: DescriptorKind) -> Descriptor {
        let mut descriptor = self.factory.create(parent, kind);
        descriptor.set_context(self.context, self.target);
        descriptor.update_representation(self.target, self.renderers);
        descriptor
    }
}

fn error_message(parent: &DescriptorKey, err: &EvaluateError) -> Descriptor {
    Descriptor::message(parent, MessageDescriptor::error(err.to_string()))
}

/// 子要素をUIスレッドへ送る
pub(crate) struct Publisher {
    events: Sender<TreeEvent>,
    node: NodeId,
    serial: u64,
    published: bool,
    finished: bool,
}

impl Publisher {
    pub fn new(events: Sender<TreeEvent>, node: NodeId, serial: u64) -> Self {
        Self {
            events,
            node,
            serial,
            published: false,
            finished: false,
        }
    }

    /// 子要素を送る（最初の送信は既存の子要素を置き換え、以降は追加）
    pub fn publish(&mut self, children: Vec<Descriptor>) {
        let replace = !self.published;
        self.send(children, replace, false);
    }

    /// 送信済みのものも含めて子要素を置き換える
    pub fn replace_all(&mut self, children: Vec<Descriptor>) {
        self.send(children, true, false);
    }

    /// 子要素がこれ以上届かないことを知らせる
    ///
    /// 何も送っていなければ空の子要素で置き換える。2回目以降は何もしない。
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        let replace = !self.published;
        self.send(Vec::new(), replace, true);
        self.finished = true;
    }

    pub fn send_descriptor(&self, descriptor: Descriptor) {
        let _ = self.events.send(TreeEvent::DescriptorUpdated {
            node: self.node,
            serial: self.serial,
            descriptor,
        });
    }

    fn send(&mut self, children: Vec<Descriptor>, replace: bool, last: bool) {
        if self.finished {
            debug!(node = %self.node, "children sent after finish");
            return;
        }
        self.published = true;
        if self
            .events
            .send(TreeEvent::ChildrenReady {
                node: self.node,
                serial: self.serial,
                children,
                replace,
                last,
            })
            .is_err()
        {
            debug!(node = %self.node, "tree dropped before children arrived");
        }
    }
}

type BuildFn = fn(&BuildContext<'_>, &mut Publisher, &Descriptor);

/// 記述子の種類ごとの構築関数
///
/// メッセージは子要素を持たないので登録しない。
const BUILDERS: &[(KindTag, BuildFn)] = &[
    (KindTag::ThreadGroup, build_thread_group as BuildFn),
    (KindTag::Thread, build_thread as BuildFn),
    (KindTag::StackFrame, build_stack_frame as BuildFn),
    (KindTag::StaticScope, build_static_scope as BuildFn),
    (KindTag::ArrayElement, build_value as BuildFn),
    (KindTag::Field, build_value as BuildFn),
    (KindTag::Local, build_value as BuildFn),
    (KindTag::This, build_value as BuildFn),
    (KindTag::UserExpression, build_value as BuildFn),
    (KindTag::Watch, build_value as BuildFn),
];

/// 記述子の子要素を構築して送る
pub(crate) fn build_children(
    cx: &BuildContext<'_>,
    publisher: &mut Publisher,
    parent: &Descriptor,
) -> Result<(), CoreError> {
    let tag = parent.tag();
    let (_, builder) = BUILDERS
        .iter()
        .find(|(t, _)| *t == tag)
        .ok_or(CoreError::UnknownKind(tag))?;
    builder(cx, publisher, parent);
    publisher.finish();
    Ok(())
}

/// ビューの最上位の子要素を構築して送る
pub(crate) fn build_top_level(
    cx: &BuildContext<'_>,
    publisher: &mut Publisher,
    view: ViewKind,
    root: &DescriptorKey,
) {
    match view {
        ViewKind::Threads => build_threads_root(cx, publisher, root),
        ViewKind::Variables => build_variables_root(cx, publisher, root),
        // ウォッチはUIスレッドで作る
        ViewKind::Watches => {}
    }
    publisher.finish();
}

fn build_threads_root(cx: &BuildContext<'_>, publisher: &mut Publisher, root: &DescriptorKey) {
    let listed = if cx.options.show_thread_groups {
        cx.target.top_level_groups().map(|groups| (groups, Vec::new()))
    } else {
        cx.target.threads().map(|threads| (Vec::new(), threads))
    };
    match listed {
        Ok((groups, threads)) => publisher.publish(group_members(cx, root, groups, threads)),
        Err(err) => publisher.publish(vec![error_message(root, &err)]),
    }
}

fn build_variables_root(cx: &BuildContext<'_>, publisher: &mut Publisher, root: &DescriptorKey) {
    let Some(frame) = cx.context.frame() else {
        publisher.publish(vec![Descriptor::message(root, MSG_NO_FRAME_SELECTED)]);
        return;
    };
    match cx.target.frames(frame.thread) {
        Ok(frames) => match frames.into_iter().find(|f| f.frame == *frame) {
            Some(info) => {
                let descriptor = cx.factory.create(root, DescriptorKind::StackFrame(info));
                build_stack_frame(cx, publisher, &descriptor);
            }
            None => publisher.publish(vec![Descriptor::message(root, MSG_NO_FRAMES)]),
        },
        Err(err) => publisher.publish(vec![error_message(root, &err)]),
    }
}

fn build_thread_group(cx: &BuildContext<'_>, publisher: &mut Publisher, parent: &Descriptor) {
    let DescriptorKind::ThreadGroup(group) = parent.kind() else {
        return;
    };
    match cx.target.group_children(group.id) {
        Ok((groups, threads)) => publisher.publish(group_members(cx, parent.key(), groups, threads)),
        Err(err) => publisher.publish(vec![error_message(parent.key(), &err)]),
    }
}

/// グループ→スレッドの順に並べた子記述子
fn group_members(
    cx: &BuildContext<'_>,
    parent: &DescriptorKey,
    groups: Vec<ThreadGroupInfo>,
    threads: Vec<ThreadInfo>,
) -> Vec<Descriptor> {
    let current = cx.context.thread();
    let chain = current
        .map(|thread| group_chain(cx.target, thread))
        .unwrap_or_default();
    let (groups, threads) = order_groups_and_threads(
        groups,
        threads,
        current,
        &chain,
        cx.options.pin_current_thread,
    );

    let mut children: Vec<Descriptor> = groups
        .into_iter()
        .map(|group| cx.create(parent, DescriptorKind::ThreadGroup(group)))
        .collect();
    children.extend(
        threads
            .into_iter()
            .map(|thread| cx.create(parent, DescriptorKind::Thread(thread))),
    );
    children
}

/// スレッドが属するグループとその祖先
fn group_chain(target: &dyn Target, thread: ThreadId) -> Vec<ThreadGroupId> {
    let mut chain = Vec::new();
    let Ok(info) = target.thread(thread) else {
        return chain;
    };
    let mut next = Some(info.group);
    while let Some(id) = next {
        if chain.contains(&id) {
            break;
        }
        chain.push(id);
        next = target.thread_group(id).ok().and_then(|g| g.parent);
    }
    chain
}

/// 名前（同名なら ID）順に並べ、必要なら現在のスレッドと
/// それを含むグループを先頭に移す
pub(crate) fn order_groups_and_threads(
    mut groups: Vec<ThreadGroupInfo>,
    mut threads: Vec<ThreadInfo>,
    current_thread: Option<ThreadId>,
    current_groups: &[ThreadGroupId],
    pin_current: bool,
) -> (Vec<ThreadGroupInfo>, Vec<ThreadInfo>) {
    groups.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    threads.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

    if pin_current {
        if let Some(pos) = threads.iter().position(|t| Some(t.id) == current_thread) {
            let thread = threads.remove(pos);
            threads.insert(0, thread);
        }
        if let Some(pos) = groups.iter().position(|g| current_groups.contains(&g.id)) {
            let group = groups.remove(pos);
            groups.insert(0, group);
        }
    }
    (groups, threads)
}

fn build_thread(cx: &BuildContext<'_>, publisher: &mut Publisher, parent: &Descriptor) {
    let DescriptorKind::Thread(info) = parent.kind() else {
        return;
    };
    let key = parent.key();
    let info = match cx.target.thread(info.id) {
        Ok(info) => info,
        Err(err) => {
            publisher.publish(vec![error_message(key, &err)]);
            return;
        }
    };

    if !info.can_list_frames() {
        let dead = !info.is_alive()
            || matches!(info.state, ThreadState::Zombie | ThreadState::NotStarted);
        if !dead {
            publisher.publish(vec![Descriptor::message(key, MSG_THREAD_NOT_SUSPENDED)]);
        }
        return;
    }

    match cx.target.frames(info.id) {
        Ok(frames) if frames.is_empty() => {
            publisher.publish(vec![Descriptor::message(key, MSG_NO_FRAMES)])
        }
        Ok(frames) => publisher.publish(
            frames
                .into_iter()
                .map(|frame| cx.create(key, DescriptorKind::StackFrame(frame)))
                .collect(),
        ),
        Err(err) => publisher.publish(vec![error_message(key, &err)]),
    }
}

fn build_stack_frame(cx: &BuildContext<'_>, publisher: &mut Publisher, parent: &Descriptor) {
    let DescriptorKind::StackFrame(info) = parent.kind() else {
        return;
    };
    let key = parent.key();
    let mut children = Vec::new();

    if info.is_static {
        children.push(cx.create(
            key,
            DescriptorKind::StaticScope {
                type_name: info.class_name.clone(),
            },
        ));
    } else {
        match cx.target.this_object(&info.frame) {
            Ok(Some(_)) => children.push(cx.create(
                key,
                DescriptorKind::This {
                    frame: info.frame.clone(),
                },
            )),
            Ok(None) => {}
            Err(err) => children.push(error_message(key, &err)),
        }
    }

    // ローカル変数の取得に失敗しても this / static は残す
    match cx.target.visible_locals(&info.frame) {
        Ok(locals) => children.extend(locals.into_iter().map(|local| {
            cx.create(
                key,
                DescriptorKind::Local {
                    frame: info.frame.clone(),
                    local,
                },
            )
        })),
        Err(err) => {
            warn!(frame = ?info.frame, error = %err, "failed to list locals");
            children.push(error_message(key, &err));
        }
    }
    publisher.publish(children);
}

fn build_static_scope(cx: &BuildContext<'_>, publisher: &mut Publisher, parent: &Descriptor) {
    let DescriptorKind::StaticScope { type_name } = parent.kind() else {
        return;
    };
    let key = parent.key();
    match cx.target.fields(type_name) {
        Ok(fields) => publisher.publish(
            fields
                .into_iter()
                .filter(|field| field.is_static)
                .map(|field| cx.create(key, DescriptorKind::Field { object: None, field }))
                .collect(),
        ),
        Err(err) => publisher.publish(vec![error_message(key, &err)]),
    }
}

/// レンダラから届いた子要素を記述子にして送るシンク
struct DescriptorSink<'a, 'b> {
    cx: &'a BuildContext<'b>,
    publisher: &'a mut Publisher,
    parent: &'a DescriptorKey,
}

impl ChildrenSink for DescriptorSink<'_, '_> {
    fn add_children(&mut self, children: Vec<ChildSpec>) {
        let parent = self.parent;
        let descriptors = children
            .into_iter()
            .map(|child| match child {
                ChildSpec::Field { object, field } => {
                    self.cx.create(parent, DescriptorKind::Field { object, field })
                }
                ChildSpec::ArrayElement { array, index } => {
                    self.cx.create(parent, DescriptorKind::ArrayElement { array, index })
                }
                ChildSpec::Expression { name, expression } => self
                    .cx
                    .create(parent, DescriptorKind::UserExpression { name, expression }),
                ChildSpec::Message(text) => Descriptor::message(parent, text),
            })
            .collect();
        self.publisher.publish(descriptors);
    }
}

fn build_value(cx: &BuildContext<'_>, publisher: &mut Publisher, parent: &Descriptor) {
    let Some(value) = parent.value() else {
        return;
    };
    let Some(renderer) = cx.renderers.select(parent.assigned_renderer(), value) else {
        return;
    };

    let mut sink = DescriptorSink {
        cx,
        publisher: &mut *publisher,
        parent: parent.key(),
    };
    if let Err(err) = renderer.build_children(value, cx.target, &mut sink) {
        debug!(key = %parent.key(), error = %err, "building children failed");
        publisher.replace_all(vec![error_message(parent.key(), &err)]);
    }
}
