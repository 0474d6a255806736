// センサー値の出力先
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use std::cell::RefCell;
use std::rc::Rc;

/// センサー値を受け取る
pub trait SensorSink {
    /// 値を出力する
    fn publish_state(&mut self, value: f32);
    /// 表示する小数点以下の桁数
    fn set_accuracy_decimals(&mut self, decimals: i8);
}

#[derive(Debug, Default)]
struct Recorded {
    values: Vec<f32>,
    accuracy_decimals: Option<i8>,
}

/// 受け取った値を記録するだけのセンサー
#[derive(Clone, Default)]
pub struct RecordingSink {
    inner: Rc<RefCell<Recorded>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> Vec<f32> {
        self.inner.borrow().values.clone()
    }

    pub fn accuracy_decimals(&self) -> Option<i8> {
        self.inner.borrow().accuracy_decimals
    }
}

impl SensorSink for RecordingSink {
    fn publish_state(&mut self, value: f32) {
        self.inner.borrow_mut().values.push(value);
    }

    fn set_accuracy_decimals(&mut self, decimals: i8) {
        self.inner.borrow_mut().accuracy_decimals = Some(decimals);
    }
}
