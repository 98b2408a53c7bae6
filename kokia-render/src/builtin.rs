//! 組み込みレンダラ

use crate::renderer::{ChildSpec, ChildrenSink, Renderer};
use crate::text::truncate_chars;
use crate::RenderConfig;
use kokia_target::{EvalResult, EvaluateError, Target, Value};
use tracing::trace;

/// プリミティブ値（null を含む）
pub struct PrimitiveRenderer;

impl Renderer for PrimitiveRenderer {
    fn name(&self) -> &str {
        "primitive"
    }

    fn is_applicable(&self, value: &Value) -> bool {
        value.is_primitive()
    }

    fn is_expandable(&self, _value: &Value, _target: &dyn Target) -> bool {
        false
    }

    fn calc_label(&self, value: &Value, _target: &dyn Target) -> EvalResult<String> {
        Ok(value.to_string())
    }

    fn build_children(
        &self,
        _value: &Value,
        _target: &dyn Target,
        _sink: &mut dyn ChildrenSink,
    ) -> EvalResult<()> {
        Ok(())
    }
}

/// 文字列
///
/// ラベルは文字列の内容そのもの。引用符とエスケープは表示側で付ける。
pub struct StringRenderer {
    max_len: usize,
}

impl StringRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            max_len: config.max_string_len,
        }
    }
}

impl Renderer for StringRenderer {
    fn name(&self) -> &str {
        "string"
    }

    fn is_applicable(&self, value: &Value) -> bool {
        matches!(value, Value::Str(_))
    }

    fn is_expandable(&self, _value: &Value, _target: &dyn Target) -> bool {
        false
    }

    fn calc_label(&self, value: &Value, target: &dyn Target) -> EvalResult<String> {
        let Value::Str(string) = value else {
            return Ok(value.to_string());
        };
        let text = target.string_value(string.id)?;
        let (mut text, truncated) = truncate_chars(&text, self.max_len);
        if truncated {
            text.push_str("...");
        }
        Ok(text)
    }

    fn build_children(
        &self,
        _value: &Value,
        _target: &dyn Target,
        _sink: &mut dyn ChildrenSink,
    ) -> EvalResult<()> {
        Ok(())
    }
}

/// 配列
///
/// 要素は `array_chunk_size` 個ずつ段階的に渡す。
pub struct ArrayRenderer {
    max_elements: usize,
    chunk_size: usize,
}

impl ArrayRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            max_elements: config.max_array_elements,
            chunk_size: config.array_chunk_size.max(1),
        }
    }
}

impl Renderer for ArrayRenderer {
    fn name(&self) -> &str {
        "array"
    }

    fn is_applicable(&self, value: &Value) -> bool {
        matches!(value, Value::Array(_))
    }

    fn is_expandable(&self, value: &Value, _target: &dyn Target) -> bool {
        matches!(value, Value::Array(array) if array.length > 0)
    }

    fn calc_label(&self, _value: &Value, _target: &dyn Target) -> EvalResult<String> {
        Ok(String::new())
    }

    fn build_children(
        &self,
        value: &Value,
        target: &dyn Target,
        sink: &mut dyn ChildrenSink,
    ) -> EvalResult<()> {
        let Value::Array(array) = value else {
            return Ok(());
        };
        if target.is_collected(array.id) {
            return Err(EvaluateError::ObjectCollected);
        }

        let shown = array.length.min(self.max_elements);
        let mut start = 0;
        while start < shown {
            let end = (start + self.chunk_size).min(shown);
            trace!(array = array.id, start, end, "array chunk");
            let chunk = (start..end)
                .map(|index| ChildSpec::ArrayElement {
                    array: array.clone(),
                    index,
                })
                .collect();
            sink.add_children(chunk);
            start = end;
        }

        if array.length > shown {
            sink.add_children(vec![ChildSpec::Message(format!(
                "... {} more elements",
                array.length - shown
            ))]);
        }
        Ok(())
    }
}

/// オブジェクト（インスタンスフィールドを子要素にする）
pub struct ObjectRenderer;

impl Renderer for ObjectRenderer {
    fn name(&self) -> &str {
        "object"
    }

    fn is_applicable(&self, value: &Value) -> bool {
        matches!(value, Value::Object(_))
    }

    fn is_expandable(&self, value: &Value, target: &dyn Target) -> bool {
        let Value::Object(object) = value else {
            return false;
        };
        target
            .fields(&object.type_name)
            .map(|fields| fields.iter().any(|f| !f.is_static))
            .unwrap_or(false)
    }

    fn calc_label(&self, _value: &Value, _target: &dyn Target) -> EvalResult<String> {
        Ok(String::new())
    }

    fn build_children(
        &self,
        value: &Value,
        target: &dyn Target,
        sink: &mut dyn ChildrenSink,
    ) -> EvalResult<()> {
        let Value::Object(object) = value else {
            return Ok(());
        };
        if target.is_collected(object.id) {
            return Err(EvaluateError::ObjectCollected);
        }
        let children = target
            .fields(&object.type_name)?
            .into_iter()
            .filter(|field| !field.is_static)
            .map(|field| ChildSpec::Field {
                object: Some(object.id),
                field,
            })
            .collect();
        sink.add_children(children);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kokia_target::SnapshotTarget;

    /// add_children の呼び出し回数を記録するシンク
    #[derive(Default)]
    struct CountingSink {
        calls: usize,
        children: Vec<ChildSpec>,
    }

    impl ChildrenSink for CountingSink {
        fn add_children(&mut self, children: Vec<ChildSpec>) {
            self.calls += 1;
            self.children.extend(children);
        }
    }

    #[test]
    fn test_array_children_are_chunked() {
        let mut target = SnapshotTarget::new();
        let array = target.new_array("int[]", (0..7).map(Value::Int).collect());
        let renderer = ArrayRenderer::new(&RenderConfig {
            max_array_elements: 5,
            array_chunk_size: 2,
            ..RenderConfig::default()
        });

        let mut sink = CountingSink::default();
        renderer.build_children(&array, &target, &mut sink).unwrap();

        // 2 + 2 + 1 要素、最後に省略メッセージ
        assert_eq!(sink.calls, 4);
        assert_eq!(sink.children.len(), 6);
        assert_eq!(
            sink.children.last(),
            Some(&ChildSpec::Message("... 2 more elements".to_string()))
        );
    }

    #[test]
    fn test_collected_array_fails() {
        let mut target = SnapshotTarget::new();
        let array = target.new_array("int[]", vec![Value::Int(1)]);
        target.collect(array.object_id().unwrap());
        let renderer = ArrayRenderer::new(&RenderConfig::default());
        let mut sink: Vec<ChildSpec> = Vec::new();
        assert_eq!(
            renderer.build_children(&array, &target, &mut sink),
            Err(EvaluateError::ObjectCollected)
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn test_object_children_skip_statics() {
        let mut target = SnapshotTarget::new();
        target.define_type("Point", None, &[("x", "int", false), ("ORIGIN", "Point", true), ("y", "int", false)]);
        let point = target.new_object("Point", vec![("x", Value::Int(1))]);

        assert!(ObjectRenderer.is_expandable(&point, &target));
        let mut sink: Vec<ChildSpec> = Vec::new();
        ObjectRenderer.build_children(&point, &target, &mut sink).unwrap();
        let names: Vec<_> = sink
            .iter()
            .map(|c| match c {
                ChildSpec::Field { field, .. } => field.name.clone(),
                other => panic!("unexpected child {:?}", other),
            })
            .collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn test_string_label_is_truncated() {
        let mut target = SnapshotTarget::new();
        let s = target.new_string("abcdef");
        let renderer = StringRenderer::new(&RenderConfig {
            max_string_len: 3,
            ..RenderConfig::default()
        });
        assert_eq!(renderer.calc_label(&s, &target).unwrap(), "abc...");
    }
}
