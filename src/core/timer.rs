//! 游戏计时器
//!
//! 基于高精度计数器的计时器，支持暂停/恢复。暂停期间流逝的时间累积到
//! `paused` 中，并从 `total_time()` 中扣除。
//!
//! 计数器来源通过 [`TimeSource`] 注入，默认使用 [`SystemClock`]。

use std::time::Instant;

/// 计数器来源
pub trait TimeSource {
    /// 当前计数值
    fn counts(&self) -> i64;

    /// 每秒计数
    fn counts_per_second(&self) -> i64;
}

/// 基于 `Instant` 的系统时钟，计数单位为纳秒
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemClock {
    fn counts(&self) -> i64 {
        self.origin.elapsed().as_nanos() as i64
    }

    fn counts_per_second(&self) -> i64 {
        1_000_000_000
    }
}

/// 游戏计时器
///
/// # 示例
///
/// ```
/// use depth_complexity::core::timer::GameTimer;
///
/// let mut timer = GameTimer::new();
/// timer.reset();
/// timer.tick();
/// assert!(timer.delta_time() >= 0.0);
/// ```
#[derive(Debug)]
pub struct GameTimer<C: TimeSource = SystemClock> {
    clock: C,
    seconds_per_count: f64,
    delta_time: f64,

    base_time: i64,
    paused_time: i64,
    stop_time: i64,
    prev_time: i64,
    curr_time: i64,

    stopped: bool,
}

impl GameTimer<SystemClock> {
    /// 使用系统时钟创建计时器
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }
}

impl Default for GameTimer<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: TimeSource> GameTimer<C> {
    /// 使用指定的计数器来源创建计时器
    ///
    /// 第一次 `tick()` 之前 `delta_time()` 为 0。
    pub fn with_clock(clock: C) -> Self {
        let seconds_per_count = 1.0 / clock.counts_per_second() as f64;
        let now = clock.counts();
        Self {
            clock,
            seconds_per_count,
            delta_time: 0.0,
            base_time: now,
            paused_time: 0,
            stop_time: 0,
            prev_time: now,
            curr_time: now,
            stopped: false,
        }
    }

    /// 自 `reset()` 起经过的时间（秒），不含暂停时间
    pub fn total_time(&self) -> f32 {
        let end = if self.stopped { self.stop_time } else { self.curr_time };
        ((end - self.paused_time - self.base_time) as f64 * self.seconds_per_count) as f32
    }

    /// 上一次 `tick()` 的帧间隔（秒），暂停时为 0
    pub fn delta_time(&self) -> f32 {
        if self.stopped {
            0.0
        } else {
            self.delta_time as f32
        }
    }

    /// 是否处于暂停状态
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// 以当前时刻为时间零点
    pub fn reset(&mut self) {
        let now = self.clock.counts();
        self.base_time = now;
        self.prev_time = now;
        self.curr_time = now;
        self.delta_time = 0.0;
        self.paused_time = 0;
        self.stop_time = 0;
        self.stopped = false;
    }

    /// 从暂停中恢复；未暂停时无操作
    pub fn start(&mut self) {
        if !self.stopped {
            return;
        }

        let now = self.clock.counts().max(self.stop_time);
        self.paused_time += now - self.stop_time;
        self.prev_time = now;
        self.curr_time = now;
        self.stop_time = 0;
        self.stopped = false;
    }

    /// 暂停；已暂停时无操作
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }

        self.stop_time = self.clock.counts().max(self.curr_time);
        self.stopped = true;
    }

    /// 推进一帧
    ///
    /// 计数器回退（处理器迁移、省电状态）时本帧间隔记为 0，且当前时间不回退。
    pub fn tick(&mut self) {
        if self.stopped {
            self.delta_time = 0.0;
            return;
        }

        let now = self.clock.counts();
        if now >= self.prev_time {
            self.delta_time = (now - self.prev_time) as f64 * self.seconds_per_count;
            self.prev_time = now;
            self.curr_time = now;
        } else {
            self.delta_time = 0.0;
        }
    }
}

/// 帧率统计
///
/// 每经过一秒（按 `total_time` 计）输出一次平均帧率与每帧毫秒数。
#[derive(Debug, Default)]
pub struct FrameStats {
    frame_count: u32,
    time_elapsed: f32,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一帧
    ///
    /// # 返回值
    ///
    /// 满一秒时返回 `Some((fps, mspf))`
    pub fn frame(&mut self, total_time: f32) -> Option<(f32, f32)> {
        self.frame_count += 1;

        if total_time - self.time_elapsed < 1.0 {
            return None;
        }

        let fps = self.frame_count as f32;
        let mspf = 1000.0 / fps;

        self.frame_count = 0;
        self.time_elapsed += 1.0;
        Some((fps, mspf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// 手动拨动的时钟，1 计数 = 1 毫秒
    #[derive(Clone)]
    struct ManualClock(Rc<Cell<i64>>);

    impl ManualClock {
        fn set(&self, ms: i64) {
            self.0.set(ms);
        }
    }

    impl TimeSource for ManualClock {
        fn counts(&self) -> i64 {
            self.0.get()
        }

        fn counts_per_second(&self) -> i64 {
            1000
        }
    }

    fn timer_at(ms: i64) -> (GameTimer<ManualClock>, ManualClock) {
        let clock = ManualClock(Rc::new(Cell::new(ms)));
        let mut timer = GameTimer::with_clock(clock.clone());
        timer.reset();
        (timer, clock)
    }

    #[test]
    fn test_delta_is_zero_before_first_tick() {
        let clock = ManualClock(Rc::new(Cell::new(0)));
        let mut timer = GameTimer::with_clock(clock.clone());
        assert_eq!(timer.delta_time(), 0.0);

        clock.set(300);
        timer.tick();
        assert!((timer.delta_time() - 0.3).abs() < 1e-6);

        // reset 之后重新从 0 开始
        timer.reset();
        assert_eq!(timer.delta_time(), 0.0);
        assert_eq!(timer.total_time(), 0.0);

        let mut system = GameTimer::new();
        system.reset();
        assert!(system.delta_time() >= 0.0);
    }

    #[test]
    fn test_tick_advances_total_time() {
        let (mut timer, clock) = timer_at(100);

        clock.set(350);
        timer.tick();
        assert!((timer.delta_time() - 0.25).abs() < 1e-6);
        assert!((timer.total_time() - 0.25).abs() < 1e-6);

        let mut last = timer.total_time();
        for ms in [400, 400, 1000, 1500] {
            clock.set(ms);
            timer.tick();
            assert!(timer.total_time() >= last);
            last = timer.total_time();
        }
        assert!((last - 1.4).abs() < 1e-6);
    }

    #[test]
    fn test_total_time_frozen_while_stopped() {
        let (mut timer, clock) = timer_at(0);

        clock.set(1000);
        timer.tick();
        timer.stop();
        let frozen = timer.total_time();

        for ms in [2000, 3000, 4000] {
            clock.set(ms);
            timer.tick();
            assert_eq!(timer.total_time(), frozen);
            assert_eq!(timer.delta_time(), 0.0);
        }

        timer.start();
        assert_eq!(timer.total_time(), frozen);

        clock.set(4500);
        timer.tick();
        // 暂停的 3 秒被扣除
        assert!((timer.total_time() - 1.5).abs() < 1e-6);
        assert!((timer.delta_time() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_redundant_stop_start_are_noops() {
        let (mut timer, clock) = timer_at(0);

        clock.set(1000);
        timer.tick();
        timer.start();
        assert!(!timer.is_stopped());

        timer.stop();
        clock.set(2000);
        // 第二次 stop 不能把暂停起点挪到 2000
        timer.stop();
        clock.set(3000);
        timer.start();
        clock.set(3000);
        timer.tick();
        assert!((timer.total_time() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_delta_never_negative_when_clock_goes_backwards() {
        let (mut timer, clock) = timer_at(5000);

        clock.set(6000);
        timer.tick();
        let before = timer.total_time();

        clock.set(5500);
        timer.tick();
        assert_eq!(timer.delta_time(), 0.0);
        assert_eq!(timer.total_time(), before);

        clock.set(6250);
        timer.tick();
        assert!(timer.delta_time() >= 0.0);
        assert!((timer.delta_time() - 0.25).abs() < 1e-6);
        assert!(timer.total_time() >= before);
    }

    #[test]
    fn test_reset_clears_paused_time() {
        let (mut timer, clock) = timer_at(0);
        timer.stop();
        clock.set(10_000);
        timer.start();
        timer.reset();

        clock.set(10_500);
        timer.tick();
        assert!((timer.total_time() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_frame_stats_reports_once_per_second() {
        let mut stats = FrameStats::new();
        assert_eq!(stats.frame(0.2), None);
        assert_eq!(stats.frame(0.6), None);
        assert_eq!(stats.frame(1.0), Some((3.0, 1000.0 / 3.0)));
        assert_eq!(stats.frame(1.5), None);
        assert_eq!(stats.frame(2.1), Some((2.0, 500.0)));
    }

    #[test]
    fn test_system_clock_is_monotonic_enough() {
        let mut timer = GameTimer::new();
        timer.reset();
        timer.tick();
        timer.tick();
        assert!(timer.delta_time() >= 0.0);
        assert!(timer.total_time() >= 0.0);
    }
}
