use std::{ops::AddAssign, sync::Arc};

use async_channel::{Receiver, Sender};
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    context::Outcome,
    engines::prober::{Prober, Verdict},
};

/// 单个 worker 的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub emitted: usize,
    pub suppressed: usize,
    // 探测途中被取消
    pub cancelled: usize,
    // 结果通道已关闭，结果没能送出
    pub dropped: usize,
}

impl AddAssign for WorkerStats {
    fn add_assign(&mut self, rhs: Self) {
        self.emitted += rhs.emitted;
        self.suppressed += rhs.suppressed;
        self.cancelled += rhs.cancelled;
        self.dropped += rhs.dropped;
    }
}

/// worker 主循环：从任务队列取 path，探测，把结果放进结果队列。
/// 任务队列关闭并且取空，或者收到取消信号时退出。
pub async fn worker(
    task_channel: Receiver<String>,
    result_channel: Sender<Outcome>,
    idx: usize,
    prober: Arc<Prober>,
    cancel: CancellationToken,
) -> WorkerStats {
    debug!("worker {idx} start!");
    let mut stats = WorkerStats::default();

    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            task = task_channel.recv() => task,
        };
        // 通道已关闭并且没有剩余任务
        let Ok(path) = task else {
            break;
        };
        if cancel.is_cancelled() {
            break;
        }

        match prober.probe(&path, &cancel).await {
            Verdict::Emit(outcome) => match result_channel.send(outcome).await {
                Ok(()) => stats.emitted += 1,
                Err(e) => {
                    warn!("Error put outcome to result_channel, error: {:?}", e);
                    stats.dropped += 1;
                }
            },
            Verdict::Suppressed => {
                debug!("suppressed {}", path);
                stats.suppressed += 1;
            }
            Verdict::Cancelled => {
                stats.cancelled += 1;
                break;
            }
        }
    }

    debug!("worker {idx} finished! {:?}", stats);
    stats
}
