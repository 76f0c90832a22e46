use std::collections::HashMap;
use std::sync::Arc;

use fetchq::config::Config;
use fetchq::queue::Dispatcher;
use fetchq::{DownloadManager, TaskId, TaskSnapshot, TaskStatus};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::AnyError;
use crate::cli::{GetArgs, ServeArgs};

/// `fetchq get`: queue every URL, wait for the pool to drain, print a summary
pub async fn get(mut config: Config, args: GetArgs) -> Result<(), AnyError> {
    if let Some(workers) = args.workers {
        config.downloads.workers = workers;
    }
    if let Some(dir) = args.output_dir {
        config.downloads.output_dir = dir;
    }

    let manager = DownloadManager::start(&config).await?;
    let dispatcher = manager.dispatcher();
    info!(
        urls = args.urls.len(),
        workers = manager.pool_size(),
        "Starting downloads"
    );

    let reporter = tokio::spawn(log_progress(dispatcher.clone()));

    for url in &args.urls {
        dispatcher.enqueue_for(url.as_str(), args.org.clone())?;
    }

    let tasks = tokio::select! {
        tasks = manager.shutdown() => tasks,
        _ = fetchq::api::shutdown_signal() => {
            warn!("Interrupted, abandoning remaining downloads");
            dispatcher.tasks()
        }
    };
    reporter.abort();

    print_summary(&tasks);

    let failed = tasks
        .iter()
        .filter(|t| t.status != TaskStatus::Completed)
        .count();
    if failed > 0 {
        return Err(format!("{} of {} downloads did not complete", failed, tasks.len()).into());
    }
    Ok(())
}

/// `fetchq serve`: run the queue behind the operator API until shutdown
pub async fn serve(mut config: Config, args: ServeArgs) -> Result<(), AnyError> {
    if let Some(address) = args.address {
        config.server.bind_addr = address;
    }
    if let Some(workers) = args.workers {
        config.downloads.workers = workers;
    }
    if let Some(dir) = args.output_dir {
        config.downloads.output_dir = dir;
    }

    let manager = DownloadManager::start(&config).await?;
    let reporter = tokio::spawn(log_progress(manager.dispatcher()));

    fetchq::api::run(config.server.bind_addr, manager.dispatcher(), manager.pool_size()).await?;

    reporter.abort();
    manager.abort();
    Ok(())
}

/// Log each task's progress whenever it crosses a MiB boundary, and once
/// more when its last byte arrives
async fn log_progress(dispatcher: Arc<Dispatcher>) {
    let mut events = dispatcher.subscribe_progress();
    let mut logged_steps: HashMap<TaskId, u64> = HashMap::new();

    loop {
        match events.recv().await {
            Ok(event) => {
                let finished = event.file_size == Some(event.downloaded_bytes);
                let last = logged_steps.entry(event.task_id).or_insert(0);
                if !crossed_step(last, event.downloaded_bytes, finished) {
                    continue;
                }

                let Some(rx) = dispatcher.watch(event.task_id) else {
                    continue;
                };
                let task = rx.borrow();
                info!(
                    task_id = %event.task_id,
                    downloaded = event.downloaded_bytes,
                    size = %task.formatted_size(),
                    progress = %task.progress_string(),
                    speed = %task.formatted_speed(),
                    "Download progress"
                );
                if finished {
                    logged_steps.remove(&event.task_id);
                }
            }
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "Progress reporter lagging"),
            Err(RecvError::Closed) => break,
        }
    }
}

const PROGRESS_STEP: u64 = 1024 * 1024;

/// True when `downloaded` has passed a MiB boundary beyond `last_step`, or
/// the download just finished. Advances `last_step` when it returns true.
fn crossed_step(last_step: &mut u64, downloaded: u64, finished: bool) -> bool {
    let step = downloaded / PROGRESS_STEP;
    if step <= *last_step && !finished {
        return false;
    }
    *last_step = step;
    true
}

fn print_summary(tasks: &[TaskSnapshot]) {
    for task in tasks {
        let name = task.filename.as_deref().unwrap_or("-");
        match task.status {
            TaskStatus::Completed => println!(
                "[{}] {:<11} {} ({} bytes)",
                task.id, task.status, name, task.downloaded_bytes
            ),
            TaskStatus::Failed => println!(
                "[{}] {:<11} {} - {}",
                task.id,
                task.status,
                task.url,
                task.error_message.as_deref().unwrap_or("unknown error")
            ),
            _ => println!("[{}] {:<11} {}", task.id, task.status, task.url),
        }
    }
}
