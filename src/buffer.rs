use std::collections::VecDeque;

/// 入力ストリームから出力ストリームへサンプルを受け渡すFIFO
///
/// 入力と出力のクロックずれで遅延が溜まり続けないよう、
/// 容量を超えた分は古いサンプルから捨てる。
pub struct SampleFifo {
    capacity: usize,
    samples: VecDeque<f32>,
    dropped: u64,
}

impl SampleFifo {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
            dropped: 0,
        }
    }

    /// 最大遅延 (ms) から容量を決めて作成
    pub fn with_latency(sample_rate: u32, max_latency_ms: u32) -> Self {
        let capacity = (sample_rate as u64 * max_latency_ms as u64 / 1000) as usize;
        Self::new(capacity)
    }

    /// サンプルを追加
    pub fn push_slice(&mut self, samples: &[f32]) {
        self.samples.extend(samples.iter().copied());

        // 容量オーバーの場合は古いものから捨てる
        let overflow = self.samples.len().saturating_sub(self.capacity);
        if overflow > 0 {
            self.samples.drain(..overflow);
            self.dropped += overflow as u64;
        }
    }

    /// 1サンプル取り出し（空ならNone）
    pub fn pop(&mut self) -> Option<f32> {
        self.samples.pop_front()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// これまでに捨てたサンプル数
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut fifo = SampleFifo::new(8);
        fifo.push_slice(&[0.1, 0.2, 0.3]);
        assert_eq!(fifo.pop(), Some(0.1));
        assert_eq!(fifo.pop(), Some(0.2));
        assert_eq!(fifo.len(), 1);
    }

    #[test]
    fn test_drop_oldest_on_overflow() {
        let mut fifo = SampleFifo::new(4);
        fifo.push_slice(&[1.0, 2.0, 3.0]);
        fifo.push_slice(&[4.0, 5.0, 6.0]);

        assert_eq!(fifo.len(), 4);
        assert_eq!(fifo.dropped(), 2);
        assert_eq!(fifo.pop(), Some(3.0));
    }

    #[test]
    fn test_with_latency() {
        let fifo = SampleFifo::with_latency(48000, 50);
        assert_eq!(fifo.capacity(), 2400);
        assert!(fifo.is_empty());
    }

    #[test]
    fn test_empty_pop() {
        let mut fifo = SampleFifo::new(0);
        assert_eq!(fifo.capacity(), 1);
        assert_eq!(fifo.pop(), None);
    }
}
