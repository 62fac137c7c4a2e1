//! End-to-end scenarios across the host/engine boundary.

use fmtbridge_core::{
    read_all_input, try_write_intermediary, write_intermediary, Bridge, BridgeError, Destination,
    Engine, EngineState, FormatFailure, InitStatus, LayoutConfig, RawBuffer, ResultBuffer,
    StatusCode, Token,
};
use pretty_assertions::assert_eq;
use std::fs;
use std::io::Cursor;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

/// Engine whose startup always fails and which counts every format attempt.
struct BrokenEngine {
    format_calls: Arc<AtomicUsize>,
}

impl Engine for BrokenEngine {
    fn name(&self) -> &str {
        "broken"
    }

    fn initialize(&self) -> Result<(), BridgeError> {
        Err(BridgeError::Initialization("grammar tables missing".into()))
    }

    fn format(&self, source: &[u8]) -> Result<ResultBuffer, FormatFailure> {
        self.format_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ResultBuffer::from_vec(source.to_vec()))
    }
}

fn ready() -> Bridge {
    let bridge = Bridge::builtin(LayoutConfig::default());
    assert_eq!(bridge.initialize(), InitStatus::Ok);
    bridge
}

#[test]
fn test_stdin_to_stdout_flow() {
    let input = read_all_input(Cursor::new("x=1")).unwrap();
    let out = ready().format_buffer(input.as_raw()).unwrap();
    assert_eq!(out.as_bytes(), b"x=1\n");
}

#[test]
fn test_large_input_is_formatted_whole() {
    let source: String = (0..20_000).map(|i| format!("line_{i}  \n")).collect();
    let input = read_all_input(Cursor::new(source.as_bytes())).unwrap();
    assert_eq!(input.len(), source.len());
    assert!(input.growths() > 0);

    let out = ready().format_buffer(input.as_raw()).unwrap();
    let text = std::str::from_utf8(out.as_bytes()).unwrap();
    assert_eq!(text.lines().count(), 20_000);
    assert!(text.starts_with("line_0\nline_1\n"));
    assert!(text.ends_with("line_19999\n"));
}

#[test]
fn test_failed_initialization_never_reaches_engine() {
    let format_calls = Arc::new(AtomicUsize::new(0));
    let bridge = Bridge::new(Box::new(BrokenEngine {
        format_calls: Arc::clone(&format_calls),
    }));

    assert_eq!(bridge.initialize(), InitStatus::Error);
    assert!(matches!(bridge.state(), EngineState::Failed(msg) if msg.contains("grammar")));

    let err = bridge.format_buffer(RawBuffer::from("x=1")).unwrap_err();
    assert_eq!(err.status(), StatusCode::InitializationFailure);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.rb");
    let err = bridge
        .format_to_file(&path, RawBuffer::from("x=1"), RawBuffer::from("{}"))
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::InitializationFailure);

    assert_eq!(format_calls.load(Ordering::SeqCst), 0);
    assert!(!path.exists());
}

#[test]
fn test_tree_output_to_file() {
    let source = "def foo\n\tbar\nend";
    let tree = r#"{"type":"program","start":0,"end":16,"children":[
        {"type":"def","start":0,"end":16,"children":[
            {"type":"kw","start":0,"end":3},
            {"type":"ident","start":4,"end":7},
            {"type":"body","start":9,"end":12,"children":[
                {"type":"ident","start":9,"end":12}
            ]},
            {"type":"kw","start":13,"end":16}
        ]}
    ]}"#;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.rb");

    let bytes = ready()
        .format_tree(
            &Destination::from_path(Some(&path)),
            RawBuffer::from(source),
            RawBuffer::from(tree),
        )
        .unwrap();

    let written = fs::read_to_string(&path).unwrap();
    assert_eq!(written, "def foo\n  bar\nend\n");
    assert_eq!(bytes, written.len() as u64);
}

#[test]
fn test_tokens_from_another_thread_arrive_in_order() {
    let (tx, rx) = mpsc::sync_channel::<Token<'static>>(4);
    let producer = thread::spawn(move || {
        for i in 0..1000 {
            tx.send(Token::from(format!("{i}\n"))).unwrap();
        }
    });

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("numbers.txt");
    write_intermediary(Some(path.as_path()), rx).unwrap();
    producer.join().unwrap();

    let expected: String = (0..1000).map(|i| format!("{i}\n")).collect();
    assert_eq!(fs::read_to_string(&path).unwrap(), expected);
}

#[test]
fn test_absent_path_selects_stdout() {
    assert_eq!(Destination::from_path(None::<&str>), Destination::Stdout);
    assert_eq!(write_intermediary(None, Vec::<Token>::new()).unwrap(), 0);
}

#[test]
fn test_failing_token_source_leaves_target_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.rb");
    fs::write(&path, "original\n").unwrap();

    let tokens = vec![
        Ok(Token::from("partial ")),
        Err(FormatFailure::Engine("host went away".into())),
        Ok(Token::from("never")),
    ];
    let err = try_write_intermediary(Some(path.as_path()), tokens).unwrap_err();
    assert_eq!(err.status(), StatusCode::EngineError);
    assert_eq!(fs::read_to_string(&path).unwrap(), "original\n");
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

/// Standard output cannot be retracted: tokens pulled before a failure have
/// already been written. Runs itself in a child process to capture stdout.
#[test]
fn test_stdout_keeps_tokens_emitted_before_failure() {
    if std::env::var_os("FMTBRIDGE_STDOUT_CHILD").is_some() {
        let tokens = vec![
            Ok(Token::from("emitted-first\n")),
            Err(FormatFailure::Engine("host went away".into())),
            Ok(Token::from("never-pulled\n")),
        ];
        let err = try_write_intermediary(None, tokens).unwrap_err();
        assert_eq!(err.status(), StatusCode::EngineError);
        return;
    }

    let out = Command::new(std::env::current_exe().unwrap())
        .args([
            "--exact",
            "test_stdout_keeps_tokens_emitted_before_failure",
            "--nocapture",
            "--test-threads=1",
        ])
        .env("FMTBRIDGE_STDOUT_CHILD", "1")
        .output()
        .unwrap();

    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("emitted-first\n"));
    assert!(!stdout.contains("never-pulled"));
}

#[test]
fn test_concurrent_format_calls_share_one_engine() {
    let bridge = Arc::new(ready());
    let workers: Vec<_> = (0..4)
        .map(|n| {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || {
                let source = format!("worker {n}   \n\n\n\tdone");
                let out = bridge.format_buffer(RawBuffer::from(source.as_str())).unwrap();
                String::from_utf8(out.into_vec()).unwrap()
            })
        })
        .collect();

    for (n, worker) in workers.into_iter().enumerate() {
        assert_eq!(worker.join().unwrap(), format!("worker {n}\n\n  done\n"));
    }
}
