// 積算電力量の換算値
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::echonetlite::smart_electric_energy_meter as SM;

/// 積算電力量の係数と単位
///
/// 両方揃うまで積算電力量は要求しない。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyCalibration {
    pub coefficient: i32, // 係数 (-1 = 未取得)
    pub unit: f32,        // 単位 kWh (NaN = 未取得)
    unit_code: Option<i8>,
}

impl Default for EnergyCalibration {
    fn default() -> Self {
        Self {
            coefficient: -1,
            unit: f32::NAN,
            unit_code: None,
        }
    }
}

impl EnergyCalibration {
    pub fn is_known(&self) -> bool {
        self.unit.is_finite() && self.coefficient > 0
    }

    pub fn set_coefficient(&mut self, coefficient: SM::Coefficient) {
        self.coefficient = coefficient.0;
    }

    pub fn set_unit(&mut self, unit: SM::UnitForCumlativeAmountsPower) {
        self.unit = unit.multiplier();
        self.unit_code = Some(unit.0);
    }

    /// 積算電力量計測値を kWh に換算する
    pub fn energy(&self, counter: u32) -> f32 {
        self.unit * counter as f32 * self.coefficient as f32
    }

    /// 表示桁数
    ///
    /// 単位が 1kWh 未満のときだけ決まる
    pub fn accuracy_decimals(&self) -> Option<i8> {
        match self.unit_code {
            Some(code) if code < 10 && self.is_known() => {
                let decimals = (code as f32 - (self.coefficient as f32).log10()).ceil();
                Some(decimals as i8)
            }
            _ => None,
        }
    }
}

#[test]
fn test1() {
    let mut calibration = EnergyCalibration::default();
    assert!(!calibration.is_known());

    // 単位だけでは未取得
    calibration.set_unit(SM::UnitForCumlativeAmountsPower(0x01));
    assert!(!calibration.is_known());
    assert_eq!(calibration.accuracy_decimals(), None);

    calibration.set_coefficient(SM::Coefficient(1));
    assert!(calibration.is_known());
    assert_eq!(calibration.accuracy_decimals(), Some(1));
    assert!((calibration.energy(12345) - 1234.5).abs() < 1e-3);

    calibration.set_coefficient(SM::Coefficient(10));
    assert_eq!(calibration.accuracy_decimals(), Some(0));
    assert!((calibration.energy(12345) - 12345.0).abs() < 1e-2);

    // 係数だけでも未取得
    let calibration = EnergyCalibration {
        coefficient: 1,
        ..Default::default()
    };
    assert!(!calibration.is_known());
}

#[test]
fn test2() {
    let mut calibration = EnergyCalibration::default();
    calibration.set_coefficient(SM::Coefficient(1));
    calibration.set_unit(SM::UnitForCumlativeAmountsPower(0x0a));
    assert_eq!(calibration.unit, 1.0);
    assert_eq!(calibration.accuracy_decimals(), None);

    calibration.set_unit(SM::UnitForCumlativeAmountsPower(0x0d));
    assert_eq!(calibration.unit, 10_000.0);
    assert_eq!(calibration.energy(3), 30_000.0);

    calibration.set_unit(SM::UnitForCumlativeAmountsPower(0x08));
    assert!((calibration.unit - 1e-8).abs() < 1e-12);
    assert_eq!(calibration.accuracy_decimals(), Some(8));

    // 係数 -1 は未取得
    calibration.coefficient = -1;
    assert!(!calibration.is_known());
}
