//! Switchboard CLI
//!
//! 用法：`switchboard [--config path] [task ...]`。有参数时逐个执行任务；否则从 stdin 逐行读取任务。
//! Ctrl+C 取消正在进行的任务；退出前冲刷 Trace Sink。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use switchboard::agents::{build_orchestrator, create_llm_from_config, create_tracer_from_config};
use switchboard::config::load_config;
use switchboard::observability::Tracer;
use switchboard::{Orchestrator, SessionContext};

async fn run_task(orchestrator: &Orchestrator, tracer: &Tracer, cancel: &CancellationToken, task: &str) {
    let session = SessionContext::new(tracer.clone()).with_cancel_token(cancel.child_token());
    let result = orchestrator.handle(task, &session).await;
    match &result.failure {
        Some(failure) if result.answer.is_empty() => {
            println!("[{}] error: {}", result.status.as_str(), failure.reason);
        }
        _ => println!("{}", result.answer),
    }
    println!(
        "-- status: {}, iterations: {}, trace: {}",
        result.status.as_str(),
        result.iterations,
        session.correlation_id
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let path = PathBuf::from(args.remove(i + 1));
            args.remove(i);
            Some(path)
        }
        _ => std::env::var("SWITCHBOARD_CONFIG").ok().map(PathBuf::from),
    };

    let cfg = load_config(config_path).context("Failed to load config")?;
    switchboard::observability::init(&cfg.app.log_level);

    let tracer = create_tracer_from_config(&cfg).context("Failed to create tracer")?;
    let llm = create_llm_from_config(&cfg);
    let orchestrator =
        Arc::new(build_orchestrator(&cfg, llm).context("Failed to build orchestrator")?);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received, cancelling");
                cancel.cancel();
            }
        });
    }

    if args.is_empty() {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        eprintln!("switchboard ready, enter one task per line (Ctrl+D to quit)");
        while let Some(line) = lines.next_line().await? {
            let task = line.trim();
            if task.is_empty() {
                continue;
            }
            run_task(&orchestrator, &tracer, &cancel, task).await;
            if cancel.is_cancelled() {
                break;
            }
        }
    } else {
        for task in &args {
            run_task(&orchestrator, &tracer, &cancel, task).await;
            if cancel.is_cancelled() {
                break;
            }
        }
    }

    tracer.flush().await;
    Ok(())
}
