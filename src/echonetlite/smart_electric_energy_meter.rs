// Echonetlite 低圧スマートメータークラス
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::echonetlite::{EchonetliteEdata, Eoj};
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use thiserror::Error;

/// 低圧スマート電力量メータ
pub const EOJ_LOWV_SMART_METER: Eoj = Eoj([0x02, 0x88, 0x01]);
/// コントローラ
pub const EOJ_CONTROLLER: Eoj = Eoj([0x05, 0xff, 0x01]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
    #[error("EPC:0x{0:02X} is not expected here")]
    UnexpectedEpc(u8),
    #[error("property(EPC:0x{epc:02X}) len mismatch {actual} != {expected}")]
    LengthMismatch { epc: u8, expected: usize, actual: usize },
    #[error("EPC:0x{0:02X} invalid date time")]
    InvalidDateTime(u8),
}

// EPCと長さを確かめてEDTを取り出す
fn expect_edt<const N: usize>(
    edata: &EchonetliteEdata<'_>,
    epc: u8,
) -> Result<[u8; N], PropertyError> {
    if edata.epc != epc {
        return Err(PropertyError::UnexpectedEpc(edata.epc));
    }
    edata
        .edt
        .try_into()
        .map_err(|_| PropertyError::LengthMismatch {
            epc,
            expected: N,
            actual: edata.edt.len(),
        })
}

#[derive(Clone, PartialEq, Debug)]
pub enum Properties {
    Coefficient(Coefficient),
    CumlativeAmountsPower(CumlativeAmountsPower),
    UnitForCumlativeAmountsPower(UnitForCumlativeAmountsPower),
    InstantiousPower(InstantiousPower),
    CumlativeAmountsOfPowerAtFixedTime(CumlativeAmountsOfPowerAtFixedTime),
}

impl TryFrom<&EchonetliteEdata<'_>> for Properties {
    type Error = PropertyError;

    fn try_from(edata: &EchonetliteEdata) -> Result<Self, Self::Error> {
        match edata.epc {
            Coefficient::EPC => Coefficient::try_from(edata).map(Properties::Coefficient),
            CumlativeAmountsPower::EPC => {
                CumlativeAmountsPower::try_from(edata).map(Properties::CumlativeAmountsPower)
            }
            UnitForCumlativeAmountsPower::EPC => UnitForCumlativeAmountsPower::try_from(edata)
                .map(Properties::UnitForCumlativeAmountsPower),
            InstantiousPower::EPC => {
                InstantiousPower::try_from(edata).map(Properties::InstantiousPower)
            }
            CumlativeAmountsOfPowerAtFixedTime::EPC => {
                CumlativeAmountsOfPowerAtFixedTime::try_from(edata)
                    .map(Properties::CumlativeAmountsOfPowerAtFixedTime)
            }
            epc => Err(PropertyError::UnexpectedEpc(epc)),
        }
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Coefficient(a) => write!(f, "{}", a),
            Self::CumlativeAmountsPower(a) => write!(f, "{}", a),
            Self::UnitForCumlativeAmountsPower(a) => write!(f, "{}", a),
            Self::InstantiousPower(a) => write!(f, "{}", a),
            Self::CumlativeAmountsOfPowerAtFixedTime(a) => write!(f, "{}", a),
        }
    }
}

/// 0xd3 係数
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct Coefficient(pub i32);

impl Coefficient {
    pub const EPC: u8 = 0xd3; // 0xd3 係数
}

impl TryFrom<&EchonetliteEdata<'_>> for Coefficient {
    type Error = PropertyError;

    fn try_from(edata: &EchonetliteEdata) -> Result<Self, Self::Error> {
        expect_edt::<4>(edata, Self::EPC).map(|a| Self(i32::from_be_bytes(a)))
    }
}

impl fmt::Display for Coefficient {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "係数={}", self.0)
    }
}

/// 0xe0 積算電力量計測値(正方向計測値)
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct CumlativeAmountsPower(pub u32);

impl CumlativeAmountsPower {
    pub const EPC: u8 = 0xe0; // 0xe0 積算電力量計測値(正方向計測値)
}

impl TryFrom<&EchonetliteEdata<'_>> for CumlativeAmountsPower {
    type Error = PropertyError;

    fn try_from(edata: &EchonetliteEdata) -> Result<Self, Self::Error> {
        expect_edt::<4>(edata, Self::EPC).map(|a| Self(u32::from_be_bytes(a)))
    }
}

impl fmt::Display for CumlativeAmountsPower {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "積算電力量計測値(正方向計測値)={:8}", self.0)
    }
}

/// 0xe1 積算電力量単位(正方向、逆方向計測値)
///
/// 値は10のべき乗を表す符号。
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct UnitForCumlativeAmountsPower(pub i8);

impl UnitForCumlativeAmountsPower {
    pub const EPC: u8 = 0xe1; // 0xe1 積算電力量単位(正方向、逆方向計測値)

    /// kWhへの乗数
    ///
    /// 10 を超える符号は 10^(符号-9), 10 は 1, それ以外は 10^(-符号)
    pub fn multiplier(&self) -> f32 {
        match self.0 {
            v if v > 10 => 10.0f32.powi(v as i32 - 9),
            10 => 1.0,
            v => 10.0f32.powi(-(v as i32)),
        }
    }
}

impl TryFrom<&EchonetliteEdata<'_>> for UnitForCumlativeAmountsPower {
    type Error = PropertyError;

    fn try_from(edata: &EchonetliteEdata) -> Result<Self, Self::Error> {
        expect_edt::<1>(edata, Self::EPC).map(|[a]| Self(a as i8))
    }
}

impl fmt::Display for UnitForCumlativeAmountsPower {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "積算電力量単位(正方向、逆方向計測値)= {} kwh",
            self.multiplier()
        )
    }
}

/// 0xe7 瞬時電力計測値
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct InstantiousPower(pub i32);

impl InstantiousPower {
    pub const EPC: u8 = 0xe7; // 0xe7 瞬時電力計測値
}

impl TryFrom<&EchonetliteEdata<'_>> for InstantiousPower {
    type Error = PropertyError;

    fn try_from(edata: &EchonetliteEdata) -> Result<Self, Self::Error> {
        // マイナスの値もある
        expect_edt::<4>(edata, Self::EPC).map(|a| Self(i32::from_be_bytes(a)))
    }
}

impl fmt::Display for InstantiousPower {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "瞬時電力={:5} W", self.0)
    }
}

/// 0xea 定時積算電力量計測値(正方向計測値)
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CumlativeAmountsOfPowerAtFixedTime {
    pub time_point: NaiveDateTime,
    pub cumlative_amounts_power: u32,
}

impl CumlativeAmountsOfPowerAtFixedTime {
    pub const EPC: u8 = 0xea; // 0xea 定時積算電力量計測値(正方向計測値)
}

impl TryFrom<&EchonetliteEdata<'_>> for CumlativeAmountsOfPowerAtFixedTime {
    type Error = PropertyError;

    fn try_from(edata: &EchonetliteEdata) -> Result<Self, Self::Error> {
        let [
            year0,                // 年 2bytes
            year1,                //
            month,                // 月 1bytes
            day,                  // 日 1bytes
            hour,                 // 時 1bytes
            minute,               // 分 1bytes
            second,               // 秒 1bytes
            cumlative_watt_hour0, // 積算電力量 4bytes
            cumlative_watt_hour1, //
            cumlative_watt_hour2, //
            cumlative_watt_hour3, //
        ] = expect_edt::<11>(edata, Self::EPC)?;
        let year = u16::from_be_bytes([year0, year1]);
        let time_point = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
            .and_then(|a| a.and_hms_opt(hour as u32, minute as u32, second as u32))
            .ok_or(PropertyError::InvalidDateTime(Self::EPC))?;
        let value = u32::from_be_bytes([
            cumlative_watt_hour0,
            cumlative_watt_hour1,
            cumlative_watt_hour2,
            cumlative_watt_hour3,
        ]);
        Ok(Self {
            time_point,
            cumlative_amounts_power: value,
        })
    }
}

impl fmt::Display for CumlativeAmountsOfPowerAtFixedTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "定時積算電力量計測値(正方向計測値)={} ({:8})",
            self.time_point.format("%Y-%m-%d %H:%M:%S"),
            self.cumlative_amounts_power
        )
    }
}

#[cfg(test)]
fn edata(epc: u8, edt: &[u8]) -> EchonetliteEdata<'_> {
    EchonetliteEdata {
        epc,
        pdc: edt.len() as u8,
        edt,
    }
}

#[test]
fn test1() {
    // 積算電力量単位
    let unit = |code: u8| {
        UnitForCumlativeAmountsPower::try_from(&edata(0xe1, &[code]))
            .unwrap()
            .multiplier()
    };
    assert_eq!(unit(0x00), 1.0);
    assert!((unit(0x01) - 0.1).abs() < 1e-7);
    assert!((unit(0x04) - 0.0001).abs() < 1e-10);
    assert_eq!(unit(0x0a), 1.0);
    assert_eq!(unit(0x0b), 100.0);
    assert_eq!(unit(0x0d), 10000.0);
    let v = unit(0x08);
    assert!((v - 1e-8).abs() < 1e-14, "{v}");
}

#[test]
fn test2() {
    assert_eq!(
        Coefficient::try_from(&edata(0xd3, &[0, 0, 0, 10])),
        Ok(Coefficient(10))
    );
    assert_eq!(
        Coefficient::try_from(&edata(0xd3, &[10])),
        Err(PropertyError::LengthMismatch {
            epc: 0xd3,
            expected: 4,
            actual: 1
        })
    );
    assert_eq!(
        Coefficient::try_from(&edata(0xe7, &[0, 0, 0, 10])),
        Err(PropertyError::UnexpectedEpc(0xe7))
    );
    assert_eq!(
        InstantiousPower::try_from(&edata(0xe7, &[0xff, 0xff, 0xff, 0x9c])),
        Ok(InstantiousPower(-100))
    );
    assert_eq!(
        CumlativeAmountsPower::try_from(&edata(0xe0, &[0x00, 0x01, 0xe2, 0x40])),
        Ok(CumlativeAmountsPower(123456))
    );
}

#[test]
fn test3() {
    let fixed = [0x07, 0xe9, 0x05, 0x11, 0x0c, 0x1e, 0x00, 0x00, 0x00, 0x30, 0x39];
    let a = CumlativeAmountsOfPowerAtFixedTime::try_from(&edata(0xea, &fixed)).unwrap();
    assert_eq!(
        a.time_point,
        NaiveDate::from_ymd_opt(2025, 5, 17)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap()
    );
    assert_eq!(a.cumlative_amounts_power, 12345);

    let mut broken = fixed;
    broken[2] = 13;
    assert_eq!(
        CumlativeAmountsOfPowerAtFixedTime::try_from(&edata(0xea, &broken)),
        Err(PropertyError::InvalidDateTime(0xea))
    );

    assert!(matches!(
        Properties::try_from(&edata(0xea, &fixed)),
        Ok(Properties::CumlativeAmountsOfPowerAtFixedTime(_))
    ));
    assert_eq!(
        Properties::try_from(&edata(0x80, &[0x30])),
        Err(PropertyError::UnexpectedEpc(0x80))
    );
}
