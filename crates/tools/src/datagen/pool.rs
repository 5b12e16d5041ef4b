use std::sync::{Mutex, MutexGuard, PoisonError};

/// 1回の割り当ての既定上限
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// 生成する局面数をワーカーに小分けに配る。
///
/// `remaining + completed <= total` は常に成り立ち、全ワーカーが
/// 割り当て分を完了報告すれば等号になる。
pub struct WorkPool {
    total: usize,
    batch_size: usize,
    state: Mutex<PoolState>,
}

struct PoolState {
    remaining: usize,
    completed: usize,
    cancelled: bool,
}

impl WorkPool {
    pub fn new(total: usize, batch_size: usize) -> Self {
        Self {
            total,
            batch_size: batch_size.max(1),
            state: Mutex::new(PoolState {
                remaining: total,
                completed: 0,
                cancelled: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 前回分の完了数を報告し、次の割り当てを受け取る。
    ///
    /// 0 が返ったら仕事はもうない。
    pub fn request_batch(&self, worker_completed: usize) -> usize {
        let mut state = self.lock();
        state.completed += worker_completed;
        if state.cancelled {
            return 0;
        }
        let batch = state.remaining.min(self.batch_size);
        state.remaining -= batch;
        batch
    }

    /// 以降の割り当てを止める（ワーカーの失敗時）
    pub fn cancel(&self) {
        self.lock().cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.lock().completed
    }

    pub fn remaining(&self) -> usize {
        self.lock().remaining
    }
}
