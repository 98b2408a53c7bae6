//! Kokia CLI - コマンドラインインターフェース
//!
//! 変数ツリーを端末上で操作するREPL。デバッグ対象はメモリ上のデモプログラム。

mod command;
mod demo;

use anyhow::Result;
use clap::Parser;
use command::Command;
use kokia_core::{
    DebugSession, DebuggerTree, HeadlessView, NodeId, SessionEvent, TreeConfig,
    TreeView, ViewKind,
};
use kokia_render::{RenderConfig, RendererRegistry};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Kokia - debugger variables tree
#[derive(Parser)]
#[command(name = "kokia")]
#[command(version = "0.1.0")]
#[command(about = "Interactive variables tree over a demo debug target", long_about = None)]
struct Cli {
    /// Do not pin the current thread to the top of thread lists
    #[arg(long)]
    no_pin: bool,

    /// List threads without their thread groups
    #[arg(long)]
    flat: bool,

    /// Number of threads whose tree history is kept
    #[arg(long, default_value_t = 8)]
    history: usize,

    /// Array elements delivered per chunk
    #[arg(long, default_value_t = 25)]
    chunk: usize,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

/// REPLの状態
struct App {
    session: DebugSession,
    tree: DebuggerTree<HeadlessView>,
    config: TreeConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    println!("Kokia - Debugger Variables Tree");
    println!("Version 0.1.0");
    println!();

    let mut app = init_app(&cli)?;
    print_tree(&app);
    run_repl(&mut app)?;
    app.session.close();

    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// デモプログラムでセッションを開始し、最初の停止まで進める
fn init_app(cli: &Cli) -> Result<App> {
    let render_config = RenderConfig {
        array_chunk_size: cli.chunk,
        ..RenderConfig::default()
    };
    let config = TreeConfig {
        pin_current_thread: !cli.no_pin,
        show_thread_groups: !cli.flat,
        history_capacity: cli.history,
        ..TreeConfig::default()
    };

    let session = DebugSession::start(demo::build()?, RendererRegistry::new(&render_config))?;
    let tree = DebuggerTree::new(
        ViewKind::Variables,
        &session,
        HeadlessView::default(),
        config.clone(),
    );
    let mut app = App {
        session,
        tree,
        config,
    };
    app.session.pause()?;
    sync(&mut app)?;
    let context = app.session.debugger_context();
    app.tree.rebuild(context);
    settle(&mut app)?;
    Ok(app)
}

/// REPLループを実行する
fn run_repl(app: &mut App) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("(kokia) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match Command::parse(line) {
                    Some(Command::Quit) => {
                        println!("Goodbye!");
                        break;
                    }
                    Some(command) => {
                        if let Err(e) = handle_command(app, command) {
                            eprintln!("Error: {}", e);
                        }
                    }
                    None => {
                        println!("Unknown command: {}", line);
                        println!("Type 'help' for available commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

fn handle_command(app: &mut App, command: Command) -> Result<()> {
    debug!(?command, "handling command");
    match command {
        Command::Print => {}
        Command::Help => {
            print_help(app);
            return Ok(());
        }
        Command::Quit => return Ok(()),
        Command::Expand(row) => {
            let id = row_node(app, row)?;
            app.tree.expand(id);
        }
        Command::Collapse(row) => {
            let id = row_node(app, row)?;
            app.tree.collapse(id);
        }
        Command::Select(row) => {
            let id = row_node(app, row)?;
            app.tree.select(id);
        }
        Command::Continue => handle_continue(app)?,
        Command::Resume => {
            app.session.resume()?;
            sync(app)?;
            let context = app.session.debugger_context();
            app.tree.rebuild(context);
        }
        Command::Pause => handle_pause(app)?,
        Command::Thread(thread) => {
            let context = app.tree.context().with_thread(thread);
            app.tree.rebuild(context);
        }
        Command::Frame(depth) => {
            let context = app.tree.context().with_frame(depth);
            app.tree.rebuild(context);
        }
        Command::View(kind) => handle_view(app, kind),
        Command::Watch(expression) => {
            app.tree.add_watch(expression);
            if app.tree.kind() != ViewKind::Watches {
                println!("Watch added. Use 'view watches' to see it.");
            }
        }
        Command::Unwatch(expression) => {
            if !app.tree.remove_watch(&expression) {
                println!("No such watch: {}", expression);
            }
        }
        Command::Set(row, value) => {
            let id = row_node(app, row)?;
            app.tree.set_value(id, value)?;
        }
        Command::Renderer(row, name) => {
            let id = row_node(app, row)?;
            app.tree.set_renderer(id, name.as_deref())?;
        }
        Command::Expr(row) => {
            let id = row_node(app, row)?;
            let Some(expression) = app.tree.node_expression(id) else {
                println!("No expression for row {}", row);
                return Ok(());
            };
            match app.tree.value_for_display(id) {
                Some(value) => println!("{} = {}", expression, value),
                None => println!("{}", expression),
            }
            return Ok(());
        }
    }

    settle(app)?;
    if let Some(error) = app.tree.take_last_error() {
        println!("Error: {}", error);
    }
    print_tree(app);
    Ok(())
}

/// Continueコマンドを処理する（再開して次の停止まで進める）
fn handle_continue(app: &mut App) -> Result<()> {
    println!("Continuing execution...");
    app.session.resume()?;
    handle_pause(app)
}

fn handle_pause(app: &mut App) -> Result<()> {
    app.session.pause()?;
    sync(app)?;
    let context = app.session.debugger_context();
    if let Some(thread) = context.thread() {
        println!("Stopped in thread {}", thread);
    }
    app.tree.rebuild(context);
    Ok(())
}

/// ビューを切り替える（ウォッチ式は引き継ぐ）
fn handle_view(app: &mut App, kind: ViewKind) {
    let watches = app.tree.watches().to_vec();
    let context = app.tree.context().clone();
    let mut tree = DebuggerTree::new(kind, &app.session, HeadlessView::default(), app.config.clone());
    for expression in watches {
        tree.add_watch(expression);
    }
    tree.rebuild(context);
    app.tree = tree;
}

/// マネージャスレッドのコマンドを待ち、セッションのイベントを反映する
fn sync(app: &mut App) -> Result<()> {
    app.session.flush()?;
    for event in app.session.poll_events() {
        match event {
            SessionEvent::Paused(_) | SessionEvent::Resumed => {}
            SessionEvent::Error(message) => println!("Error: {}", message),
        }
    }
    Ok(())
}

/// ツリーへの結果の反映が落ち着くまで待つ
fn settle(app: &mut App) -> Result<()> {
    loop {
        app.session.flush()?;
        if app.tree.process_events() == 0
            && app.tree.wait_events(Duration::from_millis(10)) == 0
        {
            return Ok(());
        }
    }
}

fn row_node(app: &App, row: usize) -> Result<NodeId> {
    app.tree
        .visible_rows()
        .get(row)
        .copied()
        .ok_or_else(|| anyhow::anyhow!("No row {}", row))
}

/// 表示行を番号付きで表示する
fn print_tree(app: &App) {
    println!("[{}]", app.session.state_text());
    let tree = &app.tree;
    for (row, (id, depth)) in tree.visible_rows_with_depth().into_iter().enumerate() {
        let Some(node) = tree.node(id) else {
            continue;
        };
        let marker = if node.is_leaf() {
            " "
        } else if tree.view().is_expanded(id) {
            "-"
        } else {
            "+"
        };
        let selected = if tree.view().is_selected(id) { ">" } else { " " };
        let dirty = if node.descriptor().is_dirty() { " *" } else { "" };
        println!(
            "{:>3}{} {}{} [{}] {}{}",
            row,
            selected,
            "  ".repeat(depth),
            marker,
            node.icon().symbol(),
            node.label(),
            dirty
        );
    }
}

fn print_help(app: &App) {
    println!("Available commands:");
    println!();
    println!("  help               - Show this help message");
    println!("  quit/exit/q        - Exit");
    println!();
    println!("Tree commands:");
    println!("  print (p)          - Show the tree");
    println!("  expand (e) <row>   - Expand a row");
    println!("  collapse <row>     - Collapse a row");
    println!("  select <row>       - Select a row");
    println!("  view threads|vars|watches - Switch view");
    println!("  watch <expr>       - Add a watch expression");
    println!("  unwatch <expr>     - Remove a watch expression");
    println!("  set <row> <value>  - Assign a primitive value");
    println!("  renderer <row> <name|auto> - Assign a renderer");
    println!("  expr <row>         - Show the expression and value for a row");
    println!();
    println!("Execution commands:");
    println!("  continue (c)       - Resume and stop again");
    println!("  resume (r)         - Resume without stopping");
    println!("  pause              - Stop the target");
    println!("  thread (t) <id>    - Show another thread");
    println!("  frame (f) <depth>  - Show another frame");
    println!();
    println!("Rows marked '*' changed since the last stop.");
    println!("Renderers: {}", app.session.renderers().names().join(", "));
}
