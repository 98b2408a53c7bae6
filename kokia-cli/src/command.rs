//! REPLコマンド

use kokia_core::ViewKind;
use kokia_target::Value;

/// REPLコマンド
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// ツリーを表示
    Print,
    /// 行番号のノードを展開
    Expand(usize),
    /// 行番号のノードを折りたたむ
    Collapse(usize),
    /// 行番号のノードを選択
    Select(usize),
    /// 実行を再開し、次の停止まで進める
    Continue,
    /// 実行を再開したままにする
    Resume,
    /// 停止させる
    Pause,
    /// 表示するスレッドを切り替える
    Thread(u64),
    /// 表示するフレームを切り替える
    Frame(usize),
    /// ビューを切り替える
    View(ViewKind),
    /// ウォッチ式を追加
    Watch(String),
    /// ウォッチ式を削除
    Unwatch(String),
    /// 値を代入
    Set(usize, Value),
    /// レンダラを割り当てる（`None` で自動選択）
    Renderer(usize, Option<String>),
    /// ノードの式を表示
    Expr(usize),
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }

        let row = |i: usize| parts.get(i).and_then(|s| s.parse::<usize>().ok());

        match parts[0] {
            "print" | "p" | "tree" => Some(Command::Print),
            "expand" | "e" => row(1).map(Command::Expand),
            "collapse" | "fold" => row(1).map(Command::Collapse),
            "select" | "sel" => row(1).map(Command::Select),
            "continue" | "c" => Some(Command::Continue),
            "resume" | "r" => Some(Command::Resume),
            "pause" => Some(Command::Pause),
            "thread" | "t" => parts.get(1)?.parse().ok().map(Command::Thread),
            "frame" | "f" => row(1).map(Command::Frame),
            "view" | "v" => match *parts.get(1)? {
                "threads" | "t" => Some(Command::View(ViewKind::Threads)),
                "vars" | "variables" | "v" => Some(Command::View(ViewKind::Variables)),
                "watches" | "w" => Some(Command::View(ViewKind::Watches)),
                _ => None,
            },
            "watch" | "w" => {
                if parts.len() > 1 {
                    Some(Command::Watch(parts[1..].join(" ")))
                } else {
                    None
                }
            }
            "unwatch" => {
                if parts.len() > 1 {
                    Some(Command::Unwatch(parts[1..].join(" ")))
                } else {
                    None
                }
            }
            "set" => {
                let index = row(1)?;
                let value = parse_value(&parts.get(2..)?.join(" "))?;
                Some(Command::Set(index, value))
            }
            "renderer" => {
                let index = row(1)?;
                match *parts.get(2)? {
                    "auto" => Some(Command::Renderer(index, None)),
                    name => Some(Command::Renderer(index, Some(name.to_string()))),
                }
            }
            "expr" => row(1).map(Command::Expr),
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

/// 代入する値をパースする（プリミティブのみ）
pub fn parse_value(input: &str) -> Option<Value> {
    let input = input.trim();
    match input {
        "" => None,
        "null" => Some(Value::Null),
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        _ => {
            if let Some(inner) = input.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
                let mut chars = inner.chars();
                return match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(Value::Char(c)),
                    _ => None,
                };
            }
            if let Ok(v) = input.parse::<i64>() {
                return Some(Value::Int(v));
            }
            if let Some(v) = input.strip_suffix('f').and_then(|s| s.parse::<f32>().ok()) {
                return Some(Value::Float(v));
            }
            input.parse::<f64>().ok().map(Value::Double)
        }
    }
}
