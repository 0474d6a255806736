// 要求の再送タイマー
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//

/// 定期要求の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Params, // 係数と単位
    Power,  // 瞬時電力
    Energy, // 積算電力量
}

/// 一度だけ発火するタイマー
///
/// 発火前に `arm` し直すと置き換わる。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    armed: Option<(u32, u32)>, // (開始時刻, 待ち時間)
}

impl Timer {
    pub fn arm(&mut self, now: u32, delay: u32) {
        self.armed = Some((now, delay));
    }

    pub fn cancel(&mut self) {
        self.armed = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// 時間になっていたら解除して true を返す
    pub fn take_if_due(&mut self, now: u32) -> bool {
        match self.armed {
            Some((started, delay)) if now.wrapping_sub(started) >= delay => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }
}

/// 周期タイマー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    period: u32,
    last: u32,
}

impl Interval {
    pub fn new(now: u32, period: u32) -> Self {
        Self { period, last: now }
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn take_if_due(&mut self, now: u32) -> bool {
        if self.period > 0 && now.wrapping_sub(self.last) >= self.period {
            self.last = now;
            true
        } else {
            false
        }
    }
}

#[test]
fn test1() {
    let mut timer = Timer::default();
    assert!(!timer.take_if_due(0));
    timer.arm(1000, 2000);
    assert!(timer.is_armed());
    assert!(!timer.take_if_due(2999));
    assert!(timer.take_if_due(3000));
    assert!(!timer.is_armed());
    assert!(!timer.take_if_due(4000));

    // 置き換え
    timer.arm(0, 2000);
    timer.arm(1000, 5000);
    assert!(!timer.take_if_due(2000));
    timer.cancel();
    assert!(!timer.take_if_due(10000));

    // 一周しても経過時間は正しい
    timer.arm(u32::MAX - 10, 20);
    assert!(!timer.take_if_due(5));
    assert!(timer.take_if_due(9));
}

#[test]
fn test2() {
    let mut interval = Interval::new(0, 30_000);
    assert!(!interval.take_if_due(29_999));
    assert!(interval.take_if_due(30_000));
    assert!(!interval.take_if_due(30_001));
    assert!(interval.take_if_due(60_500));

    let mut never = Interval::new(0, 0);
    assert!(!never.take_if_due(100_000));
}
