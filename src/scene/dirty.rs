/// 脏帧计数器
///
/// 数据修改后标记为 N（帧资源数量），之后每帧消耗一次，直到归零。
/// 环中每个帧资源的常量缓冲副本因此恰好被刷新一次。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyFrames {
    remaining: usize,
    ring_size: usize,
}

impl DirtyFrames {
    /// 新建时即为脏，保证所有帧资源拿到初始数据
    pub fn new(ring_size: usize) -> Self {
        Self { remaining: ring_size, ring_size }
    }

    /// 数据已修改
    pub fn mark(&mut self) {
        self.remaining = self.ring_size;
    }

    pub fn is_dirty(&self) -> bool {
        self.remaining > 0
    }

    /// 剩余需要刷新的帧数
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// 当前帧资源是否需要刷新；为真时计数减一
    pub fn consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}
