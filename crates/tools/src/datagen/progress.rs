use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use super::pool::WorkPool;

/// 既定の表示間隔
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// 終了条件を確認する間隔
const POLL_STEP: Duration = Duration::from_millis(20);

/// 完了数を定期的に表示する。
///
/// 全局面が完了するか、実行中のワーカーがいなくなったら戻る。
/// ワーカーに触れるのは `WorkPool` のロックだけ。
pub fn report_progress(pool: &WorkPool, running: &AtomicUsize, interval: Duration, bar: &ProgressBar) {
    let total = pool.total();
    let mut last_update = Instant::now();
    loop {
        let completed = pool.completed();
        let finished = completed >= total || running.load(Ordering::SeqCst) == 0;
        if finished || last_update.elapsed() >= interval {
            bar.set_position(completed as u64);
            last_update = Instant::now();
        }
        if finished {
            break;
        }
        std::thread::sleep(POLL_STEP.min(interval));
    }
    bar.finish();
}

/// 生成数用のプログレスバー
pub fn progress_bar(total: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({per_sec}, eta {eta})")
    {
        bar.set_style(style);
    }
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_when_all_positions_completed() {
        let pool = WorkPool::new(10, 10);
        let running = AtomicUsize::new(1);
        assert_eq!(pool.request_batch(0), 10);
        assert_eq!(pool.request_batch(10), 0);
        let bar = progress_bar(10, false);
        report_progress(&pool, &running, Duration::from_secs(60), &bar);
        assert_eq!(bar.position(), 10);
    }

    #[test]
    fn returns_when_workers_exit_early() {
        let pool = WorkPool::new(10, 10);
        let running = AtomicUsize::new(2);
        std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(Duration::from_millis(30));
                running.fetch_sub(2, Ordering::SeqCst);
            });
            let bar = progress_bar(10, false);
            report_progress(&pool, &running, Duration::from_secs(60), &bar);
            assert_eq!(bar.position(), 0);
        });
    }
}
