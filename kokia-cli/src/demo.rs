//! デモ用のデバッグ対象
//!
//! 在庫を集計する小さなプログラムを模擬する。再開するたびにループが1周進み、
//! ローカル変数とフィールドが更新される。

use anyhow::Result;
use kokia_target::{SnapshotTarget, ThreadState, Value};

pub fn build() -> Result<SnapshotTarget> {
    let mut target = SnapshotTarget::new();
    target.define_type("Item", None, &[("name", "String", false), ("count", "int", false)]);
    target.define_type(
        "Inventory",
        None,
        &[
            ("items", "Item[]", false),
            ("total", "int", false),
            ("average", "double", false),
            ("INSTANCES", "int", true),
            ("MAX_ITEMS", "int", true),
        ],
    );

    let mut items = Vec::new();
    for (name, count) in [("apple", 3), ("banana", 0), ("cherry", 12), ("date", 7)] {
        let name = target.new_string(name);
        items.push(target.new_object("Item", vec![("name", name), ("count", Value::Int(count))]));
    }
    let items = target.new_array("Item[]", items);
    let inventory = target.new_object(
        "Inventory",
        vec![
            ("items", items.clone()),
            ("total", Value::Int(0)),
            ("average", Value::Double(f64::NAN)),
        ],
    );
    let inventory_id = inventory
        .object_id()
        .ok_or_else(|| anyhow::anyhow!("Inventory is not an object"))?;
    target.set_static("Inventory", "INSTANCES", Value::Int(1));
    target.set_static("Inventory", "MAX_ITEMS", Value::Int(64));

    let system = target.add_group("system", None);
    let main_group = target.add_group("main", Some(system));
    let main = target.add_thread("main", main_group);
    let worker = target.add_thread("worker-1", main_group);
    let finalizer = target.add_thread("Finalizer", system);
    target.set_thread_state(worker, ThreadState::Waiting)?;
    target.set_thread_state(finalizer, ThreadState::Sleeping)?;
    let reaper = target.add_thread("reaper", system);
    target.keep_running(reaper)?;

    target.push_frame(main, "main", "Inventory", 8, None)?;
    let frame = target.push_frame(main, "sum", "Inventory", 21, Some(inventory))?;
    target.add_local(&frame, "i", "int", Value::Int(0))?;
    target.add_local(&frame, "label", "String", Value::Null)?;
    target.add_local(&frame, "items", "Item[]", items.clone())?;
    target.push_frame(worker, "await", "Worker", 42, None)?;

    let len = match &items {
        Value::Array(array) => array.length as i64,
        _ => 1,
    };
    let names = ["apple", "banana", "cherry", "date"];
    let mut total = 0;
    target.on_resume(move |t| {
        let i = match t.peek_local(&frame, "i") {
            Some(Value::Int(i)) => i,
            _ => 0,
        };
        let next = (i + 1) % len.max(1);
        total += i + 1;
        let _ = t.set_local(&frame, "i", Value::Int(next));
        let label = t.new_string(names[next as usize % names.len()]);
        let _ = t.set_local(&frame, "label", label);
        let _ = t.set_field(inventory_id, "total", Value::Int(total));
        let _ = t.set_field(inventory_id, "average", Value::Double(total as f64 / len as f64));
        let _ = t.set_line(frame.thread, 21 + next as u32);
    });

    Ok(target)
}
