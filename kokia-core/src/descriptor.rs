//! ノード記述子
//!
//! 記述子はツリーノードの「何を表示するか」を表す値で、ラベル・展開可否・
//! 保存されたUI状態・（値の種類なら）評価結果を持つ。
//! 記述子はマネージャスレッドで計算され、クローンとしてUIスレッドへ渡される。

use crate::value::ValueData;
use crate::view::Rect;
use kokia_render::RendererRegistry;
use kokia_target::{
    ArrayRef, FieldInfo, FrameInfo, FrameRef, LocalVariable, ObjectId, Target, ThreadGroupId,
    ThreadGroupInfo, ThreadId, ThreadInfo, Value,
};
use std::collections::HashMap;
use std::fmt;
use tracing::trace;

/// 記述子の同一性を表すキーの要素
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Root,
    Group(ThreadGroupId),
    Thread(ThreadId),
    Frame { depth: usize, method: String },
    This,
    Local(String),
    Field { declaring_type: String, name: String },
    Element(usize),
    Static(String),
    Watch(String),
    Expression(String),
    Message(String),
}

/// 記述子キー
///
/// ルートからのパスで、再構築をまたいで「同じもの」を識別する。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorKey(Vec<KeyPart>);

impl DescriptorKey {
    pub fn root() -> Self {
        Self(vec![KeyPart::Root])
    }

    /// 子要素のキーを作成する
    pub fn child(&self, part: KeyPart) -> Self {
        let mut parts = self.0.clone();
        parts.push(part);
        Self(parts)
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn last(&self) -> Option<&KeyPart> {
        self.0.last()
    }
}

impl fmt::Display for DescriptorKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            match part {
                KeyPart::Root => write!(f, "<root>")?,
                KeyPart::Group(id) => write!(f, "group:{}", id)?,
                KeyPart::Thread(id) => write!(f, "thread:{}", id)?,
                KeyPart::Frame { depth, method } => write!(f, "frame:{}:{}", depth, method)?,
                KeyPart::This => write!(f, "this")?,
                KeyPart::Local(name) => write!(f, "local:{}", name)?,
                KeyPart::Field { declaring_type, name } => {
                    write!(f, "field:{}.{}", declaring_type, name)?
                }
                KeyPart::Element(index) => write!(f, "[{}]", index)?,
                KeyPart::Static(type_name) => write!(f, "static:{}", type_name)?,
                KeyPart::Watch(expr) => write!(f, "watch:{}", expr)?,
                KeyPart::Expression(name) => write!(f, "expr:{}", name)?,
                KeyPart::Message(text) => write!(f, "message:{}", text)?,
            }
        }
        Ok(())
    }
}

/// メッセージの種類（アイコンの選択に使う）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Error,
    Special,
}

/// 情報表示用の記述子
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDescriptor {
    pub text: String,
    pub kind: MessageKind,
}

impl MessageDescriptor {
    pub fn new(text: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(text, MessageKind::Error)
    }
}

impl From<&str> for MessageDescriptor {
    fn from(text: &str) -> Self {
        Self::new(text, MessageKind::Info)
    }
}

impl From<String> for MessageDescriptor {
    fn from(text: String) -> Self {
        Self::new(text, MessageKind::Info)
    }
}

/// 記述子の種類
#[derive(Debug, Clone)]
pub enum DescriptorKind {
    Message(MessageDescriptor),
    ArrayElement { array: ArrayRef, index: usize },
    /// `object` が `None` なら静的フィールド
    Field { object: Option<ObjectId>, field: FieldInfo },
    Local { frame: FrameRef, local: LocalVariable },
    This { frame: FrameRef },
    UserExpression { name: String, expression: String },
    Watch { expression: String },
    Thread(ThreadInfo),
    ThreadGroup(ThreadGroupInfo),
    StackFrame(FrameInfo),
    StaticScope { type_name: String },
}

/// 記述子の種類タグ（子要素構築の振り分けに使う）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindTag {
    Message,
    ArrayElement,
    Field,
    Local,
    This,
    UserExpression,
    Watch,
    Thread,
    ThreadGroup,
    StackFrame,
    StaticScope,
}

impl DescriptorKind {
    pub fn tag(&self) -> KindTag {
        match self {
            DescriptorKind::Message(_) => KindTag::Message,
            DescriptorKind::ArrayElement { .. } => KindTag::ArrayElement,
            DescriptorKind::Field { .. } => KindTag::Field,
            DescriptorKind::Local { .. } => KindTag::Local,
            DescriptorKind::This { .. } => KindTag::This,
            DescriptorKind::UserExpression { .. } => KindTag::UserExpression,
            DescriptorKind::Watch { .. } => KindTag::Watch,
            DescriptorKind::Thread(_) => KindTag::Thread,
            DescriptorKind::ThreadGroup(_) => KindTag::ThreadGroup,
            DescriptorKind::StackFrame(_) => KindTag::StackFrame,
            DescriptorKind::StaticScope { .. } => KindTag::StaticScope,
        }
    }

    /// 親キーの下でのキー要素
    pub fn key_part(&self) -> KeyPart {
        match self {
            DescriptorKind::Message(message) => KeyPart::Message(message.text.clone()),
            DescriptorKind::ArrayElement { index, .. } => KeyPart::Element(*index),
            DescriptorKind::Field { field, .. } => KeyPart::Field {
                declaring_type: field.declaring_type.clone(),
                name: field.name.clone(),
            },
            DescriptorKind::Local { local, .. } => KeyPart::Local(local.name.clone()),
            DescriptorKind::This { .. } => KeyPart::This,
            DescriptorKind::UserExpression { name, .. } => KeyPart::Expression(name.clone()),
            DescriptorKind::Watch { expression } => KeyPart::Watch(expression.clone()),
            DescriptorKind::Thread(info) => KeyPart::Thread(info.id),
            DescriptorKind::ThreadGroup(info) => KeyPart::Group(info.id),
            DescriptorKind::StackFrame(info) => KeyPart::Frame {
                depth: info.frame.depth,
                method: info.method.clone(),
            },
            DescriptorKind::StaticScope { type_name } => KeyPart::Static(type_name.clone()),
        }
    }

    /// 評価される値を持つ種類か
    pub fn is_value(&self) -> bool {
        matches!(
            self,
            DescriptorKind::ArrayElement { .. }
                | DescriptorKind::Field { .. }
                | DescriptorKind::Local { .. }
                | DescriptorKind::This { .. }
                | DescriptorKind::UserExpression { .. }
                | DescriptorKind::Watch { .. }
        )
    }

    /// 代入可能な種類か
    pub fn is_lvalue(&self) -> bool {
        matches!(
            self,
            DescriptorKind::ArrayElement { .. }
                | DescriptorKind::Field { .. }
                | DescriptorKind::Local { .. }
        )
    }

    /// 値の種類の表示名
    pub fn value_name(&self) -> Option<String> {
        match self {
            DescriptorKind::ArrayElement { index, .. } => Some(format!("[{}]", index)),
            DescriptorKind::Field { field, .. } => Some(field.name.clone()),
            DescriptorKind::Local { local, .. } => Some(local.name.clone()),
            DescriptorKind::This { .. } => Some("this".to_string()),
            DescriptorKind::UserExpression { name, .. } => Some(name.clone()),
            DescriptorKind::Watch { expression } => Some(expression.clone()),
            _ => None,
        }
    }
}

/// 保存されたUI状態
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiState {
    pub expanded: bool,
    pub selected: bool,
    /// 保存時に完全に見えていた場合の表示領域
    pub visible_rect: Option<Rect>,
}

/// ノード記述子
#[derive(Debug, Clone)]
pub struct Descriptor {
    key: DescriptorKey,
    kind: DescriptorKind,
    label: String,
    expandable: bool,
    is_new: bool,
    ui: UiState,
    user_data: HashMap<String, String>,
    pub(crate) value: Option<ValueData>,
}

impl Descriptor {
    /// 親キーの下に新しい記述子を作成する
    pub fn new(parent: &DescriptorKey, kind: DescriptorKind) -> Self {
        let key = parent.child(kind.key_part());
        let value = kind.is_value().then(|| ValueData::new(kind.is_lvalue()));
        let expandable = matches!(
            kind,
            DescriptorKind::ThreadGroup(_)
                | DescriptorKind::StackFrame(_)
                | DescriptorKind::StaticScope { .. }
        ) || matches!(&kind, DescriptorKind::Thread(info) if info.can_list_frames());
        let mut descriptor = Self {
            key,
            kind,
            label: String::new(),
            expandable,
            is_new: true,
            ui: UiState::default(),
            user_data: HashMap::new(),
            value,
        };
        descriptor.label = descriptor.initial_label();
        descriptor
    }

    /// メッセージ記述子を作成する
    pub fn message(parent: &DescriptorKey, message: impl Into<MessageDescriptor>) -> Self {
        Self::new(parent, DescriptorKind::Message(message.into()))
    }

    pub fn key(&self) -> &DescriptorKey {
        &self.key
    }

    pub fn kind(&self) -> &DescriptorKind {
        &self.kind
    }

    pub fn tag(&self) -> KindTag {
        self.kind.tag()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_expandable(&self) -> bool {
        self.expandable
    }

    pub(crate) fn set_expandable(&mut self, expandable: bool) {
        self.expandable = expandable;
    }

    /// 履歴に前回の記述子がなかったか
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub(crate) fn set_new(&mut self, is_new: bool) {
        self.is_new = is_new;
    }

    pub fn ui_state(&self) -> &UiState {
        &self.ui
    }

    pub(crate) fn set_ui_state(&mut self, ui: UiState) {
        self.ui = ui;
    }

    pub fn user_data(&self, key: &str) -> Option<&str> {
        self.user_data.get(key).map(String::as_str)
    }

    pub fn put_user_data(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.user_data.insert(key.into(), value.into());
    }

    pub fn value_data(&self) -> Option<&ValueData> {
        self.value.as_ref()
    }

    /// 評価済みの値
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref().and_then(|data| data.value.as_ref())
    }

    /// 値の評価に失敗した場合のエラー
    pub fn failure(&self) -> Option<&kokia_target::EvaluateError> {
        self.value.as_ref().and_then(|data| data.failure.as_ref())
    }

    /// 前回から値が変化したか
    pub fn is_dirty(&self) -> bool {
        self.value.as_ref().is_some_and(|data| data.is_dirty)
    }

    /// 値の表示名（値の種類でなければラベル）
    pub fn name(&self) -> String {
        self.kind.value_name().unwrap_or_else(|| self.label.clone())
    }

    pub fn assigned_renderer(&self) -> Option<&str> {
        self.value.as_ref().and_then(|data| data.renderer.as_deref())
    }

    pub(crate) fn set_renderer(&mut self, renderer: Option<String>) {
        if let Some(data) = self.value.as_mut() {
            data.renderer = renderer;
        }
    }

    /// 前回の同じ記述子から値・UI状態・ユーザーデータを引き継ぐ
    pub fn set_ancestor(&mut self, ancestor: &Descriptor) {
        self.ui = ancestor.ui.clone();
        for (key, value) in &ancestor.user_data {
            self.user_data
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        if let (Some(data), Some(previous)) = (self.value.as_mut(), ancestor.value.as_ref()) {
            data.previous = previous.value.clone().or_else(|| previous.previous.clone());
            if data.renderer.is_none() {
                data.renderer = previous.renderer.clone();
            }
        }
    }

    /// 値をクリアし、名前だけのラベルに戻す（取り消し時）
    pub fn clear_value(&mut self) {
        if let Some(data) = self.value.as_mut() {
            if let Some(value) = data.value.take() {
                data.previous = Some(value);
            }
            data.failure = None;
            data.is_dirty = false;
            self.label = self.name();
        }
    }

    /// ラベルと展開可否を計算し直す（マネージャスレッド）
    pub fn update_representation(&mut self, target: &dyn Target, renderers: &RendererRegistry) {
        if self.kind.is_value() {
            self.update_value_representation(target, renderers);
            return;
        }

        match &self.kind {
            DescriptorKind::Message(message) => {
                self.label = message.text.clone();
                self.expandable = false;
            }
            DescriptorKind::Thread(info) => {
                let info = target.thread(info.id).unwrap_or_else(|_| info.clone());
                let group = target
                    .thread_group(info.group)
                    .map(|g| g.name)
                    .unwrap_or_else(|_| "?".to_string());
                self.label = format!(
                    "\"{}\"@{} in group \"{}\": {}",
                    info.name, info.id, group, info.state
                );
                self.expandable = info.can_list_frames();
                self.kind = DescriptorKind::Thread(info);
            }
            DescriptorKind::ThreadGroup(info) => {
                self.label = format!("group \"{}\"", info.name);
                self.expandable = true;
            }
            DescriptorKind::StackFrame(info) => {
                self.label = frame_label(info);
                self.expandable = true;
            }
            DescriptorKind::StaticScope { type_name } => {
                self.label = format!("static members of {}", type_name);
                self.expandable = target
                    .fields(type_name)
                    .map(|fields| fields.iter().any(|f| f.is_static))
                    .unwrap_or(false);
            }
            _ => {}
        }
        trace!(key = %self.key, label = %self.label, "representation updated");
    }

    pub(crate) fn set_label(&mut self, label: String) {
        self.label = label;
    }

    /// 作成直後（評価前）のラベル
    fn initial_label(&self) -> String {
        match &self.kind {
            DescriptorKind::Message(message) => message.text.clone(),
            DescriptorKind::Thread(info) => format!("\"{}\"@{}", info.name, info.id),
            DescriptorKind::ThreadGroup(info) => format!("group \"{}\"", info.name),
            DescriptorKind::StackFrame(info) => frame_label(info),
            DescriptorKind::StaticScope { type_name } => format!("static members of {}", type_name),
            kind => kind.value_name().unwrap_or_default(),
        }
    }
}

/// `method():line, Class`
fn frame_label(info: &FrameInfo) -> String {
    format!("{}():{}, {}", info.method, info.line, info.class_name)
}
