//! ツリーノードに対するマネージャコマンド

use crate::build::{build_children, build_top_level, BuildContext, Publisher};
use crate::config::BuildOptions;
use crate::context::DebuggerContext;
use crate::descriptor::{Descriptor, MessageDescriptor};
use crate::event::TreeEvent;
use crate::history::ControllerId;
use crate::manager::{ManagerCommand, ManagerEnv};
use crate::node::NodeId;
use crate::node_manager::DescriptorFactory;
use crate::tree::ViewKind;
use crossbeam_channel::Sender;
use kokia_target::{EvaluateError, SuspendContext, Value};
use tracing::{error, warn};

/// ノードに対する要求
#[derive(Debug, Clone)]
pub(crate) enum NodeOp {
    /// 履歴との対応付け・評価・ラベル計算（UIスレッドで作ったノード）
    Prime,
    /// ラベルだけ計算し直す
    Label,
    /// 現在の値でラベルと（構築済みなら）子要素を計算し直す
    Representation { rebuild_children: bool },
    /// 値を評価し直す
    Value { rebuild_children: bool },
    /// 値を代入してから評価し直す
    SetValue { value: Value, rebuild_children: bool },
    /// 子要素を構築する
    Children,
    /// ビューの最上位を構築する
    TopLevel(ViewKind),
}

impl NodeOp {
    pub fn name(&self) -> &'static str {
        match self {
            NodeOp::Prime => "prime-node",
            NodeOp::Label => "calc-label",
            NodeOp::Representation { .. } => "calc-representation",
            NodeOp::Value { .. } => "calc-value",
            NodeOp::SetValue { .. } => "set-value",
            NodeOp::Children => "build-children",
            NodeOp::TopLevel(_) => "build-top-level",
        }
    }

    pub fn updates_label(&self) -> bool {
        !matches!(self, NodeOp::Children | NodeOp::TopLevel(_))
    }

    pub fn updates_children(&self) -> bool {
        match self {
            NodeOp::Prime | NodeOp::Label => false,
            NodeOp::Representation { rebuild_children }
            | NodeOp::Value { rebuild_children }
            | NodeOp::SetValue {
                rebuild_children, ..
            } => *rebuild_children,
            NodeOp::Children | NodeOp::TopLevel(_) => true,
        }
    }
}

/// ノード1つに対するコマンド
///
/// 作成時のノードの記述子とコンテキストの複製を持ち、結果はイベントで返す。
pub(crate) struct NodeCommand {
    pub controller: ControllerId,
    pub node: NodeId,
    pub serial: u64,
    pub op: NodeOp,
    pub descriptor: Descriptor,
    pub context: DebuggerContext,
    pub options: BuildOptions,
    pub events: Sender<TreeEvent>,
}

impl ManagerCommand for NodeCommand {
    fn name(&self) -> &'static str {
        self.op.name()
    }

    fn suspend_context(&self) -> Option<&SuspendContext> {
        self.context.suspend()
    }

    fn action(self: Box<Self>, env: &ManagerEnv) {
        let NodeCommand {
            controller,
            node,
            serial,
            op,
            mut descriptor,
            context,
            options,
            events,
        } = *self;

        if let NodeOp::SetValue { value, .. } = &op {
            let result = match descriptor.lvalue() {
                Some(lvalue) => env.target_mut().set_value(&lvalue, value.clone()),
                None => Err(EvaluateError::NotLvalue),
            };
            if let Err(err) = result {
                warn!(key = %descriptor.key(), error = %err, "failed to set value");
                let _ = events.send(TreeEvent::SetValueFailed {
                    node,
                    error: err.to_string(),
                });
            }
        }

        let target = env.target();
        let histories = env.histories();
        let cx = BuildContext {
            target: &*target,
            renderers: env.renderers(),
            factory: DescriptorFactory::new(histories.get(controller)),
            context: &context,
            options,
        };
        let mut publisher = Publisher::new(events, node, serial);

        match op {
            NodeOp::Prime => {
                cx.factory.reconcile(&mut descriptor);
                descriptor.set_context(&context, cx.target);
                descriptor.update_representation(cx.target, cx.renderers);
                publisher.send_descriptor(descriptor);
            }
            NodeOp::Label => {
                descriptor.update_representation(cx.target, cx.renderers);
                publisher.send_descriptor(descriptor);
            }
            NodeOp::Representation { rebuild_children } => {
                descriptor.update_representation(cx.target, cx.renderers);
                publisher.send_descriptor(descriptor.clone());
                if rebuild_children {
                    rebuild(&cx, &mut publisher, &descriptor);
                }
            }
            NodeOp::Value { rebuild_children } | NodeOp::SetValue {
                rebuild_children, ..
            } => {
                descriptor.set_new(false);
                descriptor.set_context(&context, cx.target);
                descriptor.update_representation(cx.target, cx.renderers);
                publisher.send_descriptor(descriptor.clone());
                if rebuild_children {
                    rebuild(&cx, &mut publisher, &descriptor);
                }
            }
            NodeOp::Children => build_or_report(&cx, &mut publisher, &descriptor),
            NodeOp::TopLevel(view) => build_top_level(&cx, &mut publisher, view, descriptor.key()),
        }
    }

    fn cancelled(self: Box<Self>, _env: &ManagerEnv) {
        let _ = self.events.send(TreeEvent::Cancelled {
            node: self.node,
            serial: self.serial,
        });
    }
}

fn rebuild(cx: &BuildContext<'_>, publisher: &mut Publisher, descriptor: &Descriptor) {
    if descriptor.is_expandable() {
        build_or_report(cx, publisher, descriptor);
    } else {
        publisher.finish();
    }
}

fn build_or_report(cx: &BuildContext<'_>, publisher: &mut Publisher, descriptor: &Descriptor) {
    if let Err(err) = build_children(cx, publisher, descriptor) {
        error!(key = %descriptor.key(), error = %err, "cannot build children");
        publisher.replace_all(vec![Descriptor::message(
            descriptor.key(),
            MessageDescriptor::error(err.to_string()),
        )]);
        publisher.finish();
    }
}
