//! 値記述子の評価と変更検出

use crate::context::DebuggerContext;
use crate::descriptor::{Descriptor, DescriptorKind};
use kokia_render::{escape_string, RendererRegistry};
use kokia_target::{EvalResult, EvaluateError, Lvalue, Target, Value};
use tracing::{debug, trace};

/// 値記述子の評価状態
#[derive(Debug, Clone, Default)]
pub struct ValueData {
    pub value: Option<Value>,
    pub failure: Option<EvaluateError>,
    /// 前回の値（変更検出に使う）
    pub previous: Option<Value>,
    pub is_dirty: bool,
    pub is_lvalue: bool,
    /// 割り当てられたレンダラ名
    pub renderer: Option<String>,
}

impl ValueData {
    pub fn new(is_lvalue: bool) -> Self {
        Self {
            is_lvalue,
            ..Self::default()
        }
    }
}

/// 前回の値から変化したかを判定する
///
/// - 前回の値の参照先が回収済みなら変化あり
/// - 前回が NaN なら、同じ浮動小数点型の値が来る限り変化なし
/// - それ以外は等しくなければ変化あり（前回がなければ変化あり）
pub fn is_value_dirty(previous: Option<&Value>, current: &Value, target: &dyn Target) -> bool {
    let Some(previous) = previous else {
        return true;
    };
    if let Some(id) = previous.object_id() {
        if target.is_collected(id) {
            return true;
        }
    }
    if previous.is_nan() {
        return !previous.same_floating_kind(current);
    }
    previous != current
}

/// 参照値の識別表示（`{Type@id}`）
pub fn identity_decoration(value: &Value) -> Option<String> {
    match value {
        Value::Object(object) => Some(format!("{{{}@{}}}", object.type_name, object.id)),
        Value::Array(array) => Some(format!("{{{}@{}}}", array.sized_type_name(), array.id)),
        _ => None,
    }
}

/// `name = {decoration} label` 形式のラベルを組み立てる
pub fn compose_value_label(name: &str, value: &Value, text: &str) -> String {
    let mut label = match value {
        Value::Str(_) => format!("\"{}\"", escape_string(text)),
        _ => text.to_string(),
    };
    if let Some(decoration) = identity_decoration(value) {
        if !label.starts_with(&decoration) {
            label = if label.is_empty() {
                decoration
            } else {
                format!("{} {}", decoration, label)
            };
        }
    }
    format!("{} = {}", name, label)
}

impl Descriptor {
    /// 値を評価して変更フラグを更新する（マネージャスレッド）
    ///
    /// 値の種類でなければ何もしない。
    pub fn set_context(&mut self, context: &DebuggerContext, target: &dyn Target) {
        if self.value.is_none() {
            return;
        }
        let result = self.calc_value(context, target);
        let is_new = self.is_new();
        let mut failed = false;
        if let Some(data) = self.value.as_mut() {
            let previous = data.value.take().or_else(|| data.previous.take());
            match result {
                Ok(value) => {
                    data.is_dirty = !is_new && is_value_dirty(previous.as_ref(), &value, target);
                    data.value = Some(value);
                    data.failure = None;
                }
                Err(err) => {
                    data.failure = Some(err);
                    data.is_dirty = false;
                    failed = true;
                }
            }
            data.previous = previous;
        }
        if failed {
            self.set_expandable(false);
        }
        trace!(key = %self.key(), dirty = self.is_dirty(), "value evaluated");
    }

    /// 代入先
    pub fn lvalue(&self) -> Option<Lvalue> {
        match self.kind() {
            DescriptorKind::Local { frame, local } => Some(Lvalue::Local {
                frame: frame.clone(),
                name: local.name.clone(),
            }),
            DescriptorKind::Field {
                object: Some(object),
                field,
            } => Some(Lvalue::Field {
                object: *object,
                field: field.clone(),
            }),
            DescriptorKind::Field { object: None, field } => Some(Lvalue::StaticField {
                field: field.clone(),
            }),
            DescriptorKind::ArrayElement { array, index } => Some(Lvalue::ArrayElement {
                array: array.clone(),
                index: *index,
            }),
            _ => None,
        }
    }

    fn calc_value(&self, context: &DebuggerContext, target: &dyn Target) -> EvalResult<Value> {
        if !context.is_suspended() {
            return Err(EvaluateError::NotSuspended);
        }
        let value = self.read_value(context, target)?;
        // 値そのものが回収済みのハンドルなら失敗として扱う
        if let Some(id) = value.object_id() {
            if target.is_collected(id) {
                return Err(EvaluateError::ObjectCollected);
            }
        }
        Ok(value)
    }

    fn read_value(&self, context: &DebuggerContext, target: &dyn Target) -> EvalResult<Value> {
        match self.kind() {
            DescriptorKind::Local { frame, local } => target.local_value(frame, &local.name),
            DescriptorKind::This { frame } => target
                .this_object(frame)?
                .ok_or_else(|| EvaluateError::expression("'this' is not available")),
            DescriptorKind::Field { object, field } => {
                if let Some(id) = object {
                    if target.is_collected(*id) {
                        return Err(EvaluateError::ObjectCollected);
                    }
                }
                target.field_value(*object, field)
            }
            DescriptorKind::ArrayElement { array, index } => {
                if target.is_collected(array.id) {
                    return Err(EvaluateError::ObjectCollected);
                }
                target.array_element(array.id, *index)
            }
            DescriptorKind::UserExpression { expression, .. }
            | DescriptorKind::Watch { expression } => {
                target.evaluate(context.frame(), expression)
            }
            _ => Err(EvaluateError::expression("descriptor has no value")),
        }
    }

    /// 値の種類のラベルと展開可否を計算する
    pub(crate) fn update_value_representation(
        &mut self,
        target: &dyn Target,
        renderers: &RendererRegistry,
    ) {
        let name = self.name();
        let Some(data) = self.value.as_mut() else {
            return;
        };

        let (label, expandable) = if let Some(failure) = &data.failure {
            (format!("{} = {}", name, failure), false)
        } else if let Some(value) = data.value.clone() {
            match renderers.select(data.renderer.as_deref(), &value) {
                Some(renderer) => match renderer.calc_label(&value, target) {
                    Ok(text) => (
                        compose_value_label(&name, &value, &text),
                        renderer.is_expandable(&value, target),
                    ),
                    Err(err) => {
                        debug!(renderer = renderer.name(), error = %err, "renderer failed");
                        let label = format!("{} = {}", name, err);
                        data.value = None;
                        data.failure = Some(err);
                        (label, false)
                    }
                },
                None => (compose_value_label(&name, &value, &value.to_string()), false),
            }
        } else {
            (name, false)
        };

        self.set_label(label);
        self.set_expandable(expandable);
    }
}
