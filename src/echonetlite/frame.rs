// Echonetlite FRAME
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::echonetlite::EchonetliteEdata;
use std::fmt;
use thiserror::Error;

/// 1電文のプロパティ数の上限
pub const MAX_PROPERTIES: usize = 3;
/// EHD1 = ECHONET Lite
pub const EHD1: u8 = 0x10;
/// EHD2 = 形式1(規定電文形式)
pub const EHD2_FORMAT1: u8 = 0x81;
/// ECHONET Lite のUDPポート番号
pub const UDP_PORT: u16 = 3610;
/// EHD1からOPCまでの長さ
pub const HEADER_LEN: usize = 12;

const TID: u16 = 0;

/// ECHONET オブジェクト
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Eoj(pub [u8; 3]);

impl Eoj {
    /// クラスグループコードとクラスコード
    pub fn class(&self) -> [u8; 2] {
        [self.0[0], self.0[1]]
    }
}

impl fmt::Display for Eoj {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02X}{:02X}{:02X}", self.0[0], self.0[1], self.0[2])
    }
}

/// ESV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Esv {
    GetSna = 0x52, // プロパティ値読み出し不可応答
    Get = 0x62,    // プロパティ値読み出し要求
    GetRes = 0x72, // プロパティ値読み出し応答
    Inf = 0x73,    // プロパティ値通知
}

impl TryFrom<u8> for Esv {
    type Error = u8;

    fn try_from(esv: u8) -> Result<Self, Self::Error> {
        match esv {
            0x52 => Ok(Esv::GetSna),
            0x62 => Ok(Esv::Get),
            0x72 => Ok(Esv::GetRes),
            0x73 => Ok(Esv::Inf),
            _ => Err(esv),
        }
    }
}

/// プロパティ (EPC, PDC, EDTの位置)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Property {
    pub epc: u8,
    pub pdc: u8,
    pub offset: usize,
}

/// 電文
///
/// プロパティ値はコピーせず、元のバッファ中の位置だけを持つ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub ehd1: u8,
    pub ehd2: u8,
    pub tid: u16,
    pub seoj: Eoj,
    pub deoj: Eoj,
    pub esv: u8,
    pub opc: u8,
    properties: [Property; MAX_PROPERTIES],
}

impl Packet {
    /// 受け取ったプロパティ
    pub fn properties(&self) -> &[Property] {
        &self.properties[..self.opc as usize]
    }

    /// 元のバッファと合わせてプロパティ値を取り出す
    pub fn edata<'a>(&'a self, raw: &'a [u8]) -> impl Iterator<Item = EchonetliteEdata<'a>> + 'a {
        self.properties()
            .iter()
            .map(move |prop| EchonetliteEdata::from_property(prop, raw))
    }

    pub fn show(&self) -> String {
        match Esv::try_from(self.esv) {
            Ok(Esv::GetSna) => format!("Get_SNAプロパティ値読み出し不可応答 N={}", self.opc),
            Ok(Esv::Get) => format!("Getプロパティ値読み出し要求 N={}", self.opc),
            Ok(Esv::GetRes) => format!("Get_resプロパティ値読み出し応答 N={}", self.opc),
            Ok(Esv::Inf) => format!("INFプロパティ値通知 N={}", self.opc),
            Err(esv) => format!("よくわからないESV値 {:02X} N={}", esv, self.opc),
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} SEOJ={} DEOJ={} TID={}",
            self.show(),
            self.seoj,
            self.deoj,
            self.tid
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("too short for header ({0} bytes)")]
    TooShort(usize),
    #[error("unsupported frame EHD={0:02X}{1:02X}")]
    UnsupportedFormat(u8, u8),
    #[error("too many properties OPC={0}")]
    TooManyProperties(u8),
    #[error("property #{index} exceeds frame length {len}")]
    Truncated { index: usize, len: usize },
}

// バッファが足りなくても書き込むはずだったバイト数を数える
struct BoundedWriter<'a> {
    out: &'a mut [u8],
    written: usize,
}

impl BoundedWriter<'_> {
    fn put(&mut self, byte: u8) {
        if let Some(slot) = self.out.get_mut(self.written) {
            *slot = byte;
        }
        self.written += 1;
    }

    fn put_all(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.put(*byte);
        }
    }
}

/// Get要求電文を作る
///
/// 書き込むはずだったバイト数を返す。`out.len()` より大きければ溢れているので
/// `out` の内容を使ってはならない。
pub fn encode_property_get(out: &mut [u8], seoj: &Eoj, deoj: &Eoj, epcs: &[u8]) -> usize {
    let mut w = BoundedWriter { out, written: 0 };
    w.put_all(&[EHD1, EHD2_FORMAT1]);
    w.put_all(&TID.to_be_bytes());
    w.put_all(&seoj.0);
    w.put_all(&deoj.0);
    w.put(Esv::Get as u8);
    let opc_pos = w.written;
    w.put(0);
    for epc in epcs {
        w.put_all(&[*epc, 0]);
    }
    if let (Ok(opc), Some(slot)) = (u8::try_from(epcs.len()), w.out.get_mut(opc_pos)) {
        *slot = opc;
    }
    w.written
}

/// 電文を解析する
///
/// ヘッダと宣言された全プロパティがバッファに収まっているときだけ成功する。
pub fn decode_packet(data: &[u8]) -> Result<Packet, DecodeError> {
    let Some(header) = data.get(..HEADER_LEN) else {
        return Err(DecodeError::TooShort(data.len()));
    };
    let &[ehd1, ehd2, tid0, tid1, s1, s2, s3, d1, d2, d3, esv, opc] = header else {
        return Err(DecodeError::TooShort(data.len()));
    };
    if ehd1 != EHD1 || ehd2 != EHD2_FORMAT1 {
        return Err(DecodeError::UnsupportedFormat(ehd1, ehd2));
    }
    if opc as usize > MAX_PROPERTIES {
        return Err(DecodeError::TooManyProperties(opc));
    }
    let mut properties = [Property::default(); MAX_PROPERTIES];
    let mut pos = HEADER_LEN;
    for (index, prop) in properties.iter_mut().take(opc as usize).enumerate() {
        let truncated = DecodeError::Truncated {
            index,
            len: data.len(),
        };
        let &[epc, pdc] = data.get(pos..pos + 2).ok_or(truncated.clone())? else {
            return Err(truncated);
        };
        let offset = pos + 2;
        if data.len() < offset + pdc as usize {
            return Err(truncated);
        }
        *prop = Property { epc, pdc, offset };
        pos = offset + pdc as usize;
    }
    Ok(Packet {
        ehd1,
        ehd2,
        tid: u16::from_be_bytes([tid0, tid1]),
        seoj: Eoj([s1, s2, s3]),
        deoj: Eoj([d1, d2, d3]),
        esv,
        opc,
        properties,
    })
}

/// 16ビット符号なし整数(ビッグエンディアン)
pub fn get_unsigned_short(buffer: &[u8]) -> Option<u16> {
    match buffer {
        &[a, b, ..] => Some(u16::from_be_bytes([a, b])),
        _ => None,
    }
}

/// 32ビット符号なし整数(ビッグエンディアン)
pub fn get_unsigned_long(buffer: &[u8]) -> Option<u32> {
    match buffer {
        &[a, b, c, d, ..] => Some(u32::from_be_bytes([a, b, c, d])),
        _ => None,
    }
}

/// 32ビット符号付き整数(ビッグエンディアン)
pub fn get_signed_long(buffer: &[u8]) -> Option<i32> {
    get_unsigned_long(buffer).map(|n| n as i32)
}

#[cfg(test)]
const CONTROLLER: Eoj = Eoj([0x05, 0xff, 0x01]);
#[cfg(test)]
const SMART_METER: Eoj = Eoj([0x02, 0x88, 0x01]);

#[test]
fn test1() {
    let mut out = [0u8; 255];
    let len = encode_property_get(&mut out, &CONTROLLER, &SMART_METER, &[0xd3, 0xe1]);
    assert_eq!(len, 16);
    assert_eq!(
        &out[..len],
        &[
            0x10, 0x81, //
            0x00, 0x00, //
            0x05, 0xff, 0x01, //
            0x02, 0x88, 0x01, //
            0x62, //
            0x02, //
            0xd3, 0x00, //
            0xe1, 0x00, //
        ]
    );

    let packet = decode_packet(&out[..len]).unwrap();
    assert_eq!(packet.opc, 2);
    assert_eq!(packet.seoj, CONTROLLER);
    assert_eq!(packet.deoj, SMART_METER);
    assert_eq!(packet.esv, Esv::Get as u8);
    let epcs: Vec<u8> = packet.properties().iter().map(|p| p.epc).collect();
    assert_eq!(epcs, vec![0xd3, 0xe1]);
    assert!(packet.properties().iter().all(|p| p.pdc == 0));
}

#[test]
fn test2() {
    // バッファが足りない
    let mut out = [0u8; 13];
    let len = encode_property_get(&mut out, &CONTROLLER, &SMART_METER, &[0xe7]);
    assert_eq!(len, 14);
    assert!(len > out.len());

    let mut out = [0u8; 14];
    let len = encode_property_get(&mut out, &CONTROLLER, &SMART_METER, &[0xe7]);
    assert_eq!(len, out.len());
    assert_eq!(out[11], 1);
}

#[test]
fn test3() {
    let binary: Vec<u8> = vec![
        0x10, 0x81, //
        0x12, 0x34, //
        0x02, 0x88, 0x01, //
        0x05, 0xff, 0x01, //
        0x72, //
        0x02, //
        0xe7, 0x04, 0x00, 0x00, 0x04, 0xd2, //
        0xd3, 0x04, 0x00, 0x00, 0x00, 0x01, //
    ];
    let packet = decode_packet(&binary).unwrap();
    assert_eq!(packet.tid, 0x1234);
    assert_eq!(
        packet.properties(),
        &[
            Property {
                epc: 0xe7,
                pdc: 4,
                offset: 14
            },
            Property {
                epc: 0xd3,
                pdc: 4,
                offset: 20
            }
        ]
    );
    let power = packet.edata(&binary).next().unwrap();
    assert_eq!(get_signed_long(power.edt), Some(1234));

    // 12バイト未満
    for n in 0..HEADER_LEN {
        assert_eq!(decode_packet(&binary[..n]), Err(DecodeError::TooShort(n)));
    }
    // プロパティがはみ出す
    for n in HEADER_LEN..binary.len() {
        assert!(matches!(
            decode_packet(&binary[..n]),
            Err(DecodeError::Truncated { .. })
        ));
    }
}

#[test]
fn test4() {
    // 形式2は扱わない
    let mut binary = vec![0x10, 0x82, 0, 0, 2, 0x88, 1, 5, 0xff, 1, 0x72, 0];
    assert_eq!(
        decode_packet(&binary),
        Err(DecodeError::UnsupportedFormat(0x10, 0x82))
    );
    binary[1] = EHD2_FORMAT1;
    assert!(decode_packet(&binary).unwrap().properties().is_empty());
    binary[11] = 4;
    assert_eq!(decode_packet(&binary), Err(DecodeError::TooManyProperties(4)));
}

#[test]
fn test5() {
    assert_eq!(get_unsigned_short(&[0x07, 0xe9]), Some(2025));
    assert_eq!(get_unsigned_short(&[0x07]), None);
    assert_eq!(get_unsigned_long(&[0x00, 0x01, 0x00, 0x00]), Some(65536));
    assert_eq!(get_signed_long(&[0xff, 0xff, 0xff, 0xfe]), Some(-2));
    assert_eq!(get_signed_long(&[0xff, 0xff, 0xff]), None);
}
