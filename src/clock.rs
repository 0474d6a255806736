// ミリ秒時計
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use std::cell::Cell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

/// 時計
///
/// `millis` は u32 で一周するので経過時間は `wrapping_sub` で求めること。
pub trait Clock {
    fn millis(&self) -> u32;
    fn delay(&self, ms: u32);
}

/// 経過時間(ミリ秒)
#[inline]
pub fn elapsed_since(clock: &impl Clock, since: u32) -> u32 {
    clock.millis().wrapping_sub(since)
}

/// システム時計
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn millis(&self) -> u32 {
        self.origin.elapsed().as_millis() as u32
    }

    fn delay(&self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}

/// 手動で進める時計
///
/// `delay` は待たずに時刻だけ進める。
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u32>>,
}

impl ManualClock {
    pub fn new(start: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for ManualClock {
    fn millis(&self) -> u32 {
        self.now.get()
    }

    fn delay(&self, ms: u32) {
        self.advance(ms);
    }
}

#[test]
fn test1() {
    let clock = ManualClock::new(u32::MAX - 1);
    let other = clock.clone();
    let started = clock.millis();
    other.delay(3);
    assert_eq!(clock.millis(), 1);
    assert_eq!(elapsed_since(&clock, started), 3);
}
