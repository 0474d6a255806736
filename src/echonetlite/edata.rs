// Echonetlite EDATA
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::echonetlite::{Property, smart_electric_energy_meter as SM};
use std::fmt;

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct EchonetliteEdata<'a> {
    pub epc: u8,
    pub pdc: u8,
    pub edt: &'a [u8],
}

impl<'a> EchonetliteEdata<'a> {
    /// 解析済みプロパティと元のバッファから作る
    pub fn from_property(prop: &Property, raw: &'a [u8]) -> Self {
        let edt = raw
            .get(prop.offset..prop.offset + prop.pdc as usize)
            .unwrap_or_default();
        Self {
            epc: prop.epc,
            pdc: prop.pdc,
            edt,
        }
    }

    pub fn show(&self) -> String {
        if let Ok(a) = SM::Properties::try_from(self) {
            format!("{}", a)
        } else {
            format!(
                "UNKNOWN EPC:0x{:02X}, EDT:[{}]",
                self.epc,
                self.edt
                    .iter()
                    .map(|x| format!("0x{:02X}", x))
                    .collect::<Vec<String>>()
                    .join(",")
            )
        }
    }
}

impl fmt::Display for EchonetliteEdata<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.show())
    }
}

#[test]
fn test1() {
    let raw = [0xe7, 0x04, 0x00, 0x00, 0x04, 0xd2, 0x01];
    let prop = Property {
        epc: 0xe7,
        pdc: 4,
        offset: 2,
    };
    let edata = EchonetliteEdata::from_property(&prop, &raw);
    assert_eq!(edata.edt, &[0x00, 0x00, 0x04, 0xd2]);
    assert_eq!(edata.to_string(), "瞬時電力= 1234 W");

    // 範囲外は空
    let prop = Property {
        epc: 0xf0,
        pdc: 8,
        offset: 2,
    };
    let edata = EchonetliteEdata::from_property(&prop, &raw);
    assert!(edata.edt.is_empty());
    assert_eq!(edata.to_string(), "UNKNOWN EPC:0xF0, EDT:[]");
}
