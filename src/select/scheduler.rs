//! 单槽位延迟任务调度器
//!
//! 每个决策通道（Pick / Ban）持有一个槽位，任意时刻最多挂一个待执行任务：
//! - `schedule` 取消旧任务并装入新任务（替换对正在触发的任务是原子的：至多执行一次）
//! - `cancel` 清空槽位，幂等
//! - `retarget` 以当前时刻为锚点重算触发时刻（剩余时间为负则立即触发）
//!
//! 触发前先清空槽位再执行副作用，副作用里回读槽位看到的一定是空。

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// 槽位里挂的动作：一次性装箱 Future
pub type SlotAction = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// 已装入槽位的任务（对外不可见，生命周期由槽位管理）
struct ArmedTask {
    /// 终态标志之一：取消。与触发互斥，先到先得
    token: CancellationToken,
    /// 重定时通道：发送新的触发时刻，定时任务据此重置 sleep
    retarget_tx: watch::Sender<Instant>,
    /// 最近一次 (re)target 的锚点时刻
    anchor: Instant,
    /// 绝对触发时刻，恒 >= anchor
    fire_at: Instant,
    /// 代次：触发时校验自己仍是槽位的当前任务，保证至多触发一次
    generation: u64,
}

#[derive(Default)]
struct SlotState {
    armed: Option<ArmedTask>,
    next_generation: u64,
}

/// 单槽位调度器
///
/// 锁只保护槽位元数据，绝不跨 await 持有。
#[derive(Clone)]
pub struct DelaySlot {
    inner: Arc<Mutex<SlotState>>,
}

impl Default for DelaySlot {
    fn default() -> Self {
        Self::new()
    }
}

impl DelaySlot {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SlotState::default())),
        }
    }

    /// 装入新任务，替换槽位中已有的任务
    ///
    /// `delay_ms <= 0` 且 `run_immediately_if_due` 时不经过定时器，就地执行。
    pub async fn schedule(&self, action: SlotAction, delay_ms: i64, run_immediately_if_due: bool) {
        if delay_ms <= 0 && run_immediately_if_due {
            self.cancel();
            action.await;
            return;
        }

        let now = Instant::now();
        let fire_at = now + Duration::from_millis(delay_ms.max(0) as u64);
        let token = CancellationToken::new();
        let (retarget_tx, mut retarget_rx) = watch::channel(fire_at);

        let generation = {
            let mut st = self.inner.lock().unwrap();
            if let Some(old) = st.armed.take() {
                old.token.cancel();
            }
            let generation = st.next_generation;
            st.next_generation += 1;
            st.armed = Some(ArmedTask {
                token: token.clone(),
                retarget_tx,
                anchor: now,
                fire_at,
                generation,
            });
            generation
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let sleep = tokio::time::sleep_until(fire_at);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = &mut sleep => break,
                    changed = retarget_rx.changed() => {
                        if changed.is_err() {
                            // 发送端随槽位条目销毁，任务已被替换
                            return;
                        }
                        let new_fire_at = *retarget_rx.borrow();
                        sleep.as_mut().reset(new_fire_at);
                    }
                }
            }

            // 触发：先确认自己仍是当前任务并清空槽位，再执行副作用
            let still_armed = {
                let mut st = inner.lock().unwrap();
                let is_current = st
                    .armed
                    .as_ref()
                    .map(|t| t.generation == generation)
                    .unwrap_or(false);
                if is_current {
                    st.armed = None;
                }
                is_current
            };
            if still_armed {
                action.await;
            }
        });
    }

    /// 取消槽位中的任务；空槽位上是 no-op
    pub fn cancel(&self) {
        let mut st = self.inner.lock().unwrap();
        if let Some(task) = st.armed.take() {
            task.token.cancel();
        }
    }

    /// 以当前时刻为锚点，把触发时刻重算为 `now + max(new_delay_ms, 0)`
    ///
    /// 空槽位上是 no-op。剩余延迟为负时立即触发，而不是排程到过去。
    pub fn retarget(&self, new_delay_ms: i64) {
        let mut st = self.inner.lock().unwrap();
        if let Some(task) = st.armed.as_mut() {
            task.anchor = Instant::now();
            task.fire_at = task.anchor + Duration::from_millis(new_delay_ms.max(0) as u64);
            let _ = task.retarget_tx.send(task.fire_at);
        }
    }

    /// 当前挂着的任务的绝对触发时刻（空槽位返回 None）
    pub fn due_at(&self) -> Option<Instant> {
        self.inner.lock().unwrap().armed.as_ref().map(|t| t.fire_at)
    }

    pub fn is_armed(&self) -> bool {
        self.inner.lock().unwrap().armed.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{advance, Duration};

    fn counting_action(counter: &Arc<AtomicUsize>) -> SlotAction {
        let counter = Arc::clone(counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    /// 推进虚拟时钟并让后台定时任务跑完当前一轮
    async fn advance_and_settle(d: Duration) {
        advance(d).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_delay() {
        let slot = DelaySlot::new();
        let fired = Arc::new(AtomicUsize::new(0));
        slot.schedule(counting_action(&fired), 2000, true).await;

        advance_and_settle(Duration::from_millis(1999)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(slot.is_armed());

        advance_and_settle(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!slot.is_armed());

        // 已触发后不会再触发
        advance_and_settle(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_replaces_pending_task() {
        let slot = DelaySlot::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        slot.schedule(counting_action(&first), 1000, true).await;
        advance_and_settle(Duration::from_millis(500)).await;
        slot.schedule(counting_action(&second), 1000, true).await;

        // 第一个任务的原定触发点已过，但它已被替换
        advance_and_settle(Duration::from_millis(600)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 0);

        advance_and_settle(Duration::from_millis(500)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_suppresses_action() {
        let slot = DelaySlot::new();
        let fired = Arc::new(AtomicUsize::new(0));
        slot.schedule(counting_action(&fired), 1000, true).await;
        slot.cancel();
        assert!(!slot.is_armed());

        advance_and_settle(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // 空槽位与已触发槽位上 cancel 均为 no-op
        slot.cancel();
        slot.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_runs_immediately() {
        let slot = DelaySlot::new();
        let fired = Arc::new(AtomicUsize::new(0));
        slot.schedule(counting_action(&fired), 0, true).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!slot.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_without_immediate_flag_arms_timer() {
        let slot = DelaySlot::new();
        let fired = Arc::new(AtomicUsize::new(0));
        slot.schedule(counting_action(&fired), 0, false).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        advance_and_settle(Duration::from_millis(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retarget_anchors_at_retarget_instant() {
        let slot = DelaySlot::new();
        let fired = Arc::new(AtomicUsize::new(0));
        // T0: 延迟 5s
        slot.schedule(counting_action(&fired), 5000, true).await;

        // T1 = T0 + 2s：重定时为 4s，应在 T1 + 4s 触发（总计 T0 + 6s）
        advance_and_settle(Duration::from_millis(2000)).await;
        slot.retarget(4000);

        // 原定 T0 + 5s 不触发
        advance_and_settle(Duration::from_millis(3001)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        advance_and_settle(Duration::from_millis(1000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retarget_negative_remaining_fires_now() {
        let slot = DelaySlot::new();
        let fired = Arc::new(AtomicUsize::new(0));
        slot.schedule(counting_action(&fired), 10_000, true).await;

        advance_and_settle(Duration::from_millis(3000)).await;
        // 重定时到比已消耗时间还短的延迟：立即触发而非排程到过去
        slot.retarget(-500);
        advance_and_settle(Duration::from_millis(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retarget_empty_slot_is_noop() {
        let slot = DelaySlot::new();
        slot.retarget(1000);
        assert!(!slot.is_armed());
        assert!(slot.due_at().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_at_tracks_retarget() {
        let slot = DelaySlot::new();
        let fired = Arc::new(AtomicUsize::new(0));
        slot.schedule(counting_action(&fired), 5000, true).await;
        let first_due = slot.due_at().unwrap();

        advance_and_settle(Duration::from_millis(1000)).await;
        slot.retarget(1000);
        let new_due = slot.due_at().unwrap();
        assert!(new_due < first_due);
    }
}
