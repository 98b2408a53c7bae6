//! メモリ上で組み立てるデバッグ対象
//!
//! 実プロセスの代わりに、スレッド・フレーム・ヒープを手で組み立てて
//! [`Target`] として振る舞う。テストとデモCLIで使用する。

use crate::expr::{parse_expression, Expression};
use crate::{
    ArrayRef, EvalResult, EvaluateError, FieldInfo, FrameInfo, FrameRef, LocalVariable, Lvalue,
    ObjectId, ObjectRef, Result, Target, ThreadGroupId, ThreadGroupInfo, ThreadId, ThreadInfo,
    ThreadState, Value,
};
use std::collections::{HashMap, HashSet};

/// 再開時に実行されるフック（プログラムの「実行」を模擬する）
pub type ResumeHook = Box<dyn FnMut(&mut SnapshotTarget) + Send>;

/// ヒープ上のオブジェクト
#[derive(Debug, Clone)]
enum HeapObject {
    Instance {
        type_name: String,
        fields: HashMap<String, Value>,
    },
    Array {
        type_name: String,
        elements: Vec<Value>,
    },
    Str(String),
}

/// 型宣言
#[derive(Debug, Clone)]
struct TypeDecl {
    superclass: Option<String>,
    fields: Vec<FieldInfo>,
}

#[derive(Debug, Clone)]
struct FrameEntry {
    method: String,
    class_name: String,
    line: u32,
    is_static: bool,
    this: Option<Value>,
    locals: Vec<(LocalVariable, Value)>,
    locals_error: Option<String>,
}

#[derive(Debug, Clone)]
struct ThreadEntry {
    info: ThreadInfo,
    /// 先頭が最上位フレーム
    frames: Vec<FrameEntry>,
    frames_error: Option<String>,
    /// 停止要求を無視して走り続ける
    free_running: bool,
}

/// メモリ上のデバッグ対象
pub struct SnapshotTarget {
    suspended: bool,
    groups: Vec<ThreadGroupInfo>,
    threads: Vec<ThreadEntry>,
    types: HashMap<String, TypeDecl>,
    heap: HashMap<ObjectId, HeapObject>,
    statics: HashMap<(String, String), Value>,
    collected: HashSet<ObjectId>,
    next_id: u64,
    on_resume: Option<ResumeHook>,
}

impl SnapshotTarget {
    /// 空のターゲットを作成する（停止状態で開始）
    pub fn new() -> Self {
        Self {
            suspended: true,
            groups: Vec::new(),
            threads: Vec::new(),
            types: HashMap::new(),
            heap: HashMap::new(),
            statics: HashMap::new(),
            collected: HashSet::new(),
            next_id: 1,
            on_resume: None,
        }
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// スレッドグループを追加する
    pub fn add_group(&mut self, name: &str, parent: Option<ThreadGroupId>) -> ThreadGroupId {
        let id = self.alloc_id();
        self.groups.push(ThreadGroupInfo {
            id,
            name: name.to_string(),
            parent,
        });
        id
    }

    /// スレッドを追加する
    pub fn add_thread(&mut self, name: &str, group: ThreadGroupId) -> ThreadId {
        let id = self.alloc_id();
        self.threads.push(ThreadEntry {
            info: ThreadInfo {
                id,
                name: name.to_string(),
                group,
                state: ThreadState::Running,
                suspended: self.suspended,
            },
            frames: Vec::new(),
            frames_error: None,
            free_running: false,
        });
        id
    }

    /// スレッドの実行状態を設定する
    pub fn set_thread_state(&mut self, thread: ThreadId, state: ThreadState) -> Result<()> {
        self.thread_entry_mut(thread)?.info.state = state;
        Ok(())
    }

    /// スレッドを停止させずに走らせ続ける
    pub fn keep_running(&mut self, thread: ThreadId) -> Result<()> {
        let entry = self.thread_entry_mut(thread)?;
        entry.free_running = true;
        entry.info.suspended = false;
        Ok(())
    }

    /// 型を宣言する
    ///
    /// `fields` は `(名前, 型名, static か)` の宣言順リスト。
    pub fn define_type(&mut self, name: &str, superclass: Option<&str>, fields: &[(&str, &str, bool)]) {
        let fields = fields
            .iter()
            .map(|(field, type_name, is_static)| FieldInfo {
                name: field.to_string(),
                declaring_type: name.to_string(),
                type_name: type_name.to_string(),
                is_static: *is_static,
                is_final: false,
            })
            .collect();
        self.types.insert(
            name.to_string(),
            TypeDecl {
                superclass: superclass.map(str::to_string),
                fields,
            },
        );
    }

    /// インスタンスを生成する
    pub fn new_object(&mut self, type_name: &str, fields: Vec<(&str, Value)>) -> Value {
        let id = self.alloc_id();
        let fields = fields
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        self.heap.insert(
            id,
            HeapObject::Instance {
                type_name: type_name.to_string(),
                fields,
            },
        );
        Value::Object(ObjectRef {
            id,
            type_name: type_name.to_string(),
        })
    }

    /// 配列を生成する
    pub fn new_array(&mut self, type_name: &str, elements: Vec<Value>) -> Value {
        let id = self.alloc_id();
        let length = elements.len();
        self.heap.insert(
            id,
            HeapObject::Array {
                type_name: type_name.to_string(),
                elements,
            },
        );
        Value::Array(ArrayRef {
            id,
            type_name: type_name.to_string(),
            length,
        })
    }

    /// 文字列を生成する
    pub fn new_string(&mut self, text: &str) -> Value {
        let id = self.alloc_id();
        self.heap.insert(id, HeapObject::Str(text.to_string()));
        Value::Str(ObjectRef {
            id,
            type_name: "java.lang.String".to_string(),
        })
    }

    /// static フィールドの値を設定する
    pub fn set_static(&mut self, type_name: &str, field: &str, value: Value) {
        self.statics
            .insert((type_name.to_string(), field.to_string()), value);
    }

    /// インスタンスフィールドの値を設定する
    pub fn set_field(&mut self, object: ObjectId, field: &str, value: Value) -> Result<()> {
        match self.heap.get_mut(&object) {
            Some(HeapObject::Instance { fields, .. }) => {
                fields.insert(field.to_string(), value);
                Ok(())
            }
            _ => Err(anyhow::anyhow!("Object {} is not an instance", object)),
        }
    }

    /// スレッドにフレームを積む（新しいフレームが最上位になる）
    pub fn push_frame(
        &mut self,
        thread: ThreadId,
        method: &str,
        class_name: &str,
        line: u32,
        this: Option<Value>,
    ) -> Result<FrameRef> {
        let entry = self.thread_entry_mut(thread)?;
        entry.frames.insert(
            0,
            FrameEntry {
                method: method.to_string(),
                class_name: class_name.to_string(),
                line,
                is_static: this.is_none(),
                this,
                locals: Vec::new(),
                locals_error: None,
            },
        );
        Ok(FrameRef { thread, depth: 0 })
    }

    /// 最上位フレームを取り除く
    pub fn pop_frame(&mut self, thread: ThreadId) -> Result<()> {
        let entry = self.thread_entry_mut(thread)?;
        if entry.frames.is_empty() {
            return Err(anyhow::anyhow!("Thread {} has no frames", thread));
        }
        entry.frames.remove(0);
        Ok(())
    }

    /// 最上位フレームの行番号を設定する
    pub fn set_line(&mut self, thread: ThreadId, line: u32) -> Result<()> {
        let frame = FrameRef { thread, depth: 0 };
        self.frame_entry_mut(&frame)?.line = line;
        Ok(())
    }

    /// ローカル変数を追加する
    pub fn add_local(&mut self, frame: &FrameRef, name: &str, type_name: &str, value: Value) -> Result<()> {
        let entry = self.frame_entry_mut(frame)?;
        entry.locals.push((
            LocalVariable {
                name: name.to_string(),
                type_name: type_name.to_string(),
            },
            value,
        ));
        Ok(())
    }

    /// ローカル変数の値を更新する
    pub fn set_local(&mut self, frame: &FrameRef, name: &str, value: Value) -> Result<()> {
        let entry = self.frame_entry_mut(frame)?;
        let slot = entry
            .locals
            .iter_mut()
            .find(|(local, _)| local.name == name)
            .ok_or_else(|| anyhow::anyhow!("Local '{}' not found", name))?;
        slot.1 = value;
        Ok(())
    }

    /// 停止状態に関係なくローカル変数を読む（再開時フック用）
    pub fn peek_local(&self, frame: &FrameRef, name: &str) -> Option<Value> {
        self.threads
            .iter()
            .find(|t| t.info.id == frame.thread)?
            .frames
            .get(frame.depth)?
            .locals
            .iter()
            .find(|(local, _)| local.name == name)
            .map(|(_, value)| value.clone())
    }

    /// ローカル変数の列挙を失敗させる
    pub fn fail_locals(&mut self, frame: &FrameRef, message: &str) -> Result<()> {
        self.frame_entry_mut(frame)?.locals_error = Some(message.to_string());
        Ok(())
    }

    /// フレームの列挙を失敗させる
    pub fn fail_frames(&mut self, thread: ThreadId, message: &str) -> Result<()> {
        self.thread_entry_mut(thread)?.frames_error = Some(message.to_string());
        Ok(())
    }

    /// オブジェクトを回収済みにする
    pub fn collect(&mut self, id: ObjectId) {
        self.heap.remove(&id);
        self.collected.insert(id);
    }

    /// 再開時フックを設定する
    pub fn on_resume(&mut self, hook: impl FnMut(&mut SnapshotTarget) + Send + 'static) {
        self.on_resume = Some(Box::new(hook));
    }

    fn thread_entry(&self, id: ThreadId) -> EvalResult<&ThreadEntry> {
        self.threads
            .iter()
            .find(|t| t.info.id == id)
            .ok_or(EvaluateError::ThreadNotFound(id))
    }

    fn thread_entry_mut(&mut self, id: ThreadId) -> Result<&mut ThreadEntry> {
        self.threads
            .iter_mut()
            .find(|t| t.info.id == id)
            .ok_or_else(|| anyhow::anyhow!("Thread {} not found", id))
    }

    fn frame_entry(&self, frame: &FrameRef) -> EvalResult<&FrameEntry> {
        let thread = self.thread_entry(frame.thread)?;
        if !thread.info.suspended {
            return Err(EvaluateError::NotSuspended);
        }
        thread.frames.get(frame.depth).ok_or(EvaluateError::InvalidFrame)
    }

    fn frame_entry_mut(&mut self, frame: &FrameRef) -> Result<&mut FrameEntry> {
        let depth = frame.depth;
        self.thread_entry_mut(frame.thread)?
            .frames
            .get_mut(depth)
            .ok_or_else(|| anyhow::anyhow!("Frame {} not found", depth))
    }

    fn heap_object(&self, id: ObjectId) -> EvalResult<&HeapObject> {
        if self.collected.contains(&id) {
            return Err(EvaluateError::ObjectCollected);
        }
        self.heap
            .get(&id)
            .ok_or_else(|| EvaluateError::Protocol(format!("invalid object id {}", id)))
    }

    fn eval(&self, frame: Option<&FrameRef>, expr: &Expression) -> EvalResult<Value> {
        match expr {
            Expression::Variable(name) => {
                let frame = frame.ok_or_else(|| {
                    EvaluateError::expression(format!("cannot find local variable '{}'", name))
                })?;
                self.local_value(frame, name)
            }
            Expression::This => {
                let frame = frame.ok_or_else(|| EvaluateError::expression("'this' is not available"))?;
                self.this_object(frame)?
                    .ok_or_else(|| EvaluateError::expression("'this' is not available"))
            }
            Expression::FieldAccess { base, field } => match self.eval(frame, base)? {
                Value::Object(object) => {
                    let info = self
                        .fields(&object.type_name)?
                        .into_iter()
                        .find(|f| &f.name == field)
                        .ok_or_else(|| {
                            EvaluateError::expression(format!(
                                "no field '{}' in {}",
                                field, object.type_name
                            ))
                        })?;
                    let owner = if info.is_static { None } else { Some(object.id) };
                    self.field_value(owner, &info)
                }
                Value::Array(array) if field == "length" => Ok(Value::Int(array.length as i64)),
                Value::Null => Err(EvaluateError::expression("null pointer dereference")),
                other => Err(EvaluateError::expression(format!(
                    "cannot access field '{}' of {}",
                    field,
                    other.type_name()
                ))),
            },
            Expression::IndexAccess { base, index } => match self.eval(frame, base)? {
                Value::Array(array) => self.array_element(array.id, *index),
                other => Err(EvaluateError::expression(format!(
                    "cannot index {}",
                    other.type_name()
                ))),
            },
        }
    }
}

impl Default for SnapshotTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl Target for SnapshotTarget {
    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn suspend(&mut self) -> EvalResult<Option<ThreadId>> {
        self.suspended = true;
        for thread in &mut self.threads {
            if thread.info.is_alive() && !thread.free_running {
                thread.info.suspended = true;
            }
        }
        Ok(self
            .threads
            .iter()
            .find(|t| t.info.suspended && !t.frames.is_empty())
            .map(|t| t.info.id))
    }

    fn resume(&mut self) -> EvalResult<()> {
        self.suspended = false;
        for thread in &mut self.threads {
            thread.info.suspended = false;
        }
        if let Some(mut hook) = self.on_resume.take() {
            hook(self);
            self.on_resume = Some(hook);
        }
        Ok(())
    }

    fn threads(&self) -> EvalResult<Vec<ThreadInfo>> {
        Ok(self.threads.iter().map(|t| t.info.clone()).collect())
    }

    fn thread(&self, id: ThreadId) -> EvalResult<ThreadInfo> {
        Ok(self.thread_entry(id)?.info.clone())
    }

    fn top_level_groups(&self) -> EvalResult<Vec<ThreadGroupInfo>> {
        Ok(self
            .groups
            .iter()
            .filter(|g| g.parent.is_none())
            .cloned()
            .collect())
    }

    fn thread_group(&self, id: ThreadGroupId) -> EvalResult<ThreadGroupInfo> {
        self.groups
            .iter()
            .find(|g| g.id == id)
            .cloned()
            .ok_or_else(|| EvaluateError::Protocol(format!("invalid thread group id {}", id)))
    }

    fn group_children(
        &self,
        id: ThreadGroupId,
    ) -> EvalResult<(Vec<ThreadGroupInfo>, Vec<ThreadInfo>)> {
        self.thread_group(id)?;
        let groups = self
            .groups
            .iter()
            .filter(|g| g.parent == Some(id))
            .cloned()
            .collect();
        let threads = self
            .threads
            .iter()
            .filter(|t| t.info.group == id)
            .map(|t| t.info.clone())
            .collect();
        Ok((groups, threads))
    }

    fn frames(&self, thread: ThreadId) -> EvalResult<Vec<FrameInfo>> {
        let entry = self.thread_entry(thread)?;
        if !entry.info.suspended {
            return Err(EvaluateError::NotSuspended);
        }
        if let Some(message) = &entry.frames_error {
            return Err(EvaluateError::Protocol(message.clone()));
        }
        Ok(entry
            .frames
            .iter()
            .enumerate()
            .map(|(depth, frame)| FrameInfo {
                frame: FrameRef { thread, depth },
                method: frame.method.clone(),
                class_name: frame.class_name.clone(),
                line: frame.line,
                is_static: frame.is_static,
            })
            .collect())
    }

    fn this_object(&self, frame: &FrameRef) -> EvalResult<Option<Value>> {
        Ok(self.frame_entry(frame)?.this.clone())
    }

    fn visible_locals(&self, frame: &FrameRef) -> EvalResult<Vec<LocalVariable>> {
        let entry = self.frame_entry(frame)?;
        if let Some(message) = &entry.locals_error {
            return Err(EvaluateError::Protocol(message.clone()));
        }
        Ok(entry.locals.iter().map(|(local, _)| local.clone()).collect())
    }

    fn local_value(&self, frame: &FrameRef, name: &str) -> EvalResult<Value> {
        self.frame_entry(frame)?
            .locals
            .iter()
            .find(|(local, _)| local.name == name)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| EvaluateError::expression(format!("cannot find local variable '{}'", name)))
    }

    fn fields(&self, type_name: &str) -> EvalResult<Vec<FieldInfo>> {
        let decl = self
            .types
            .get(type_name)
            .ok_or_else(|| EvaluateError::expression(format!("unknown type {}", type_name)))?;
        let mut fields = match &decl.superclass {
            Some(superclass) => self.fields(superclass)?,
            None => Vec::new(),
        };
        fields.extend(decl.fields.iter().cloned());
        Ok(fields)
    }

    fn field_value(&self, object: Option<ObjectId>, field: &FieldInfo) -> EvalResult<Value> {
        match object {
            None => Ok(self
                .statics
                .get(&(field.declaring_type.clone(), field.name.clone()))
                .cloned()
                .unwrap_or(Value::Null)),
            Some(id) => match self.heap_object(id)? {
                HeapObject::Instance { fields, .. } => {
                    Ok(fields.get(&field.name).cloned().unwrap_or(Value::Null))
                }
                _ => Err(EvaluateError::Protocol(format!("object {} has no fields", id))),
            },
        }
    }

    fn array_element(&self, array: ObjectId, index: usize) -> EvalResult<Value> {
        match self.heap_object(array)? {
            HeapObject::Array { elements, .. } => elements.get(index).cloned().ok_or_else(|| {
                EvaluateError::expression(format!(
                    "index {} out of bounds (length: {})",
                    index,
                    elements.len()
                ))
            }),
            _ => Err(EvaluateError::Protocol(format!("object {} is not an array", array))),
        }
    }

    fn string_value(&self, id: ObjectId) -> EvalResult<String> {
        match self.heap_object(id)? {
            HeapObject::Str(text) => Ok(text.clone()),
            _ => Err(EvaluateError::Protocol(format!("object {} is not a string", id))),
        }
    }

    fn is_collected(&self, id: ObjectId) -> bool {
        self.collected.contains(&id)
    }

    fn evaluate(&self, frame: Option<&FrameRef>, expression: &str) -> EvalResult<Value> {
        let expr = parse_expression(expression)?;
        self.eval(frame, &expr)
    }

    fn set_value(&mut self, lvalue: &Lvalue, value: Value) -> EvalResult<()> {
        if !self.suspended {
            return Err(EvaluateError::NotSuspended);
        }
        match lvalue {
            Lvalue::Local { frame, name } => self
                .set_local(frame, name, value)
                .map_err(|e| EvaluateError::expression(e.to_string())),
            Lvalue::Field { object, field } => {
                if field.is_final {
                    return Err(EvaluateError::NotLvalue);
                }
                self.heap_object(*object)?;
                self.set_field(*object, &field.name, value)
                    .map_err(|e| EvaluateError::Protocol(e.to_string()))
            }
            Lvalue::StaticField { field } => {
                if field.is_final {
                    return Err(EvaluateError::NotLvalue);
                }
                self.set_static(&field.declaring_type, &field.name, value);
                Ok(())
            }
            Lvalue::ArrayElement { array, index } => {
                self.heap_object(array.id)?;
                match self.heap.get_mut(&array.id) {
                    Some(HeapObject::Array { elements, .. }) => {
                        let slot = elements.get_mut(*index).ok_or_else(|| {
                            EvaluateError::expression(format!("index {} out of bounds", index))
                        })?;
                        *slot = value;
                        Ok(())
                    }
                    _ => Err(EvaluateError::Protocol(format!(
                        "object {} is not an array",
                        array.id
                    ))),
                }
            }
        }
    }
}
