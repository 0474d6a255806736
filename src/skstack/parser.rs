// SKSTACK/IPの応答パーサー
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::skstack::Rxudp;
use nom::Parser;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while_m_n};
use nom::character::complete::{char, one_of, space0};
use nom::combinator::{all_consuming, map, map_res, opt};
use nom::multi::{many0, separated_list1};
use std::net::Ipv6Addr;
use thiserror::Error;

/// RXUDPの解析に失敗したフィールド
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to parse {0} in RXUDP")]
pub struct RxudpError(pub &'static str);

// 16進数(n桁固定)
fn hex_digits(n: usize) -> impl Fn(&str) -> nom::IResult<&str, &str> {
    move |input| take_while_m_n(n, n, |c: char| c.is_ascii_hexdigit()).parse(input)
}

// 8ビット16進数(2桁固定)
fn u8_hex_digit2(input: &str) -> nom::IResult<&str, u8> {
    map_res(hex_digits(2), |s| u8::from_str_radix(s, 16)).parse(input)
}

// 16ビット16進数(4桁固定)
fn u16_hex_digit4(input: &str) -> nom::IResult<&str, u16> {
    map_res(hex_digits(4), |s| u16::from_str_radix(s, 16)).parse(input)
}

// 64ビット16進数(16桁固定)
fn u64_hex_digit16(input: &str) -> nom::IResult<&str, u64> {
    map_res(hex_digits(16), |s| u64::from_str_radix(s, 16)).parse(input)
}

// Ipv6アドレス(FE80:0000:0000:0000:0000:0000:0000:0000)
fn ipv6addr_colon(input: &str) -> nom::IResult<&str, Ipv6Addr> {
    let parser = separated_list1(char(':'), hex_digits(4));
    map_res(parser, |xs: Vec<&str>| {
        if xs.len() == 8 {
            xs.join(":").parse::<Ipv6Addr>().map_err(|e| e.to_string())
        } else {
            Err(format!("{} groups", xs.len()))
        }
    })
    .parse(input)
}

// Ipv6アドレス(FE800000000000000000000000000000)
fn ipv6addr_compact(input: &str) -> nom::IResult<&str, Ipv6Addr> {
    map_res(hex_digits(32), |s| u128::from_str_radix(s, 16).map(Ipv6Addr::from)).parse(input)
}

// Ipv6アドレス
fn ipv6addr(input: &str) -> nom::IResult<&str, Ipv6Addr> {
    alt((ipv6addr_compact, ipv6addr_colon)).parse(input)
}

// 暗号化フラグ
fn secured_flag(input: &str) -> nom::IResult<&str, bool> {
    map(one_of("01"), |c| c == '1').parse(input)
}

// 1フィールド読んで区切りの空白を読み飛ばす
fn field<'a, O>(
    input: &'a str,
    name: &'static str,
    mut parser: impl FnMut(&'a str) -> nom::IResult<&'a str, O>,
    separator_required: bool,
) -> Result<(&'a str, O), RxudpError> {
    let (s, value) = parser(input).map_err(|_| RxudpError(name))?;
    let (s, sep) = opt(char::<&str, nom::error::Error<&str>>(' '))
        .parse(s)
        .map_err(|_| RxudpError(name))?;
    if separator_required && sep.is_none() {
        return Err(RxudpError(name));
    }
    Ok((s, value))
}

/// ERXUDP 以降を解析する
///
/// 送信元 送信先 送信元ポート 送信先ポート 送信元MAC層アドレス 暗号化 データ長 データ
pub fn parse_rxudp(remain: &str) -> Result<Rxudp, RxudpError> {
    let s = remain;
    let (s, sender) = field(s, "sender address", ipv6addr, true)?;
    let (s, destination) = field(s, "destination address", ipv6addr, true)?;
    let (s, remote_port) = field(s, "remote port", u16_hex_digit4, true)?;
    let (s, local_port) = field(s, "local port", u16_hex_digit4, true)?;
    let (s, sender_lla) = field(s, "sender LLA", u64_hex_digit16, true)?;
    let (s, secured) = field(s, "secured flag", secured_flag, true)?;
    let (s, data_len) = field(s, "data length", u16_hex_digit4, false)?;
    Ok(Rxudp {
        sender,
        destination,
        remote_port,
        local_port,
        sender_lla,
        secured,
        data_len,
        data_pos: remain.len() - s.len(),
    })
}

/// イベント番号を取り出す(不正な値は 0)
pub fn parse_event_number(remain: &str) -> u8 {
    u8_hex_digit2(remain).map(|(_, n)| n).unwrap_or(0)
}

/// FAIL ERxx の xx を取り出す
pub fn parse_fail(line: &str) -> Option<u8> {
    let parser = (tag("FAIL ER"), u8_hex_digit2, space0);
    all_consuming(parser)
        .parse(line)
        .ok()
        .map(|(_, (_tag, code, _))| code)
}

/// 16進テキストをバイト列にする
pub fn parse_hex_payload(input: &str) -> Option<Vec<u8>> {
    all_consuming((many0(u8_hex_digit2), space0))
        .parse(input)
        .ok()
        .map(|(_, (data, _))| data)
}

#[test]
fn test1() {
    assert_eq!(parse_event_number("25 FE80:0000:0000:0000:021C:6400:03A1:B2C3"), 0x25);
    assert_eq!(parse_event_number("2"), 0);
    assert_eq!(parse_event_number("XY"), 0);
    assert_eq!(parse_fail("FAIL ER10"), Some(0x10));
    assert_eq!(parse_fail("FAIL"), None);
    assert_eq!(parse_hex_payload("0001FF"), Some(vec![0, 1, 255]));
    assert_eq!(parse_hex_payload(""), Some(vec![]));
    assert_eq!(parse_hex_payload("0001F"), None);
    assert_eq!(parse_hex_payload("00G1"), None);
}

#[test]
fn test2() {
    let sender: Ipv6Addr = "FE80:0000:0000:0000:021C:6400:03A1:B2C3".parse().unwrap();
    let destination: Ipv6Addr = "FE80:0000:0000:0000:021D:1290:0003:C890".parse().unwrap();
    let remain = "FE80:0000:0000:0000:021C:6400:03A1:B2C3 FE80:0000:0000:0000:021D:1290:0003:C890 0E1A 0E1A 001C640003A1B2C3 1 0012 1081000002880105FF017201E704000004D2";
    let rxudp = parse_rxudp(remain).unwrap();
    assert_eq!(
        rxudp,
        Rxudp {
            sender,
            destination,
            remote_port: 0x0E1A,
            local_port: 3610,
            sender_lla: 0x001C_6400_03A1_B2C3,
            secured: true,
            data_len: 0x12,
            data_pos: 114,
        }
    );
    assert_eq!(rxudp.payload(remain), "1081000002880105FF017201E704000004D2");
}

#[test]
fn test3() {
    // 区切りのないIPv6アドレス
    let remain = "FE80000000000000021C640003A1B2C3 FE80000000000000021D12900003C890 02CC 02CC 001C640003A1B2C3 0 0002 ABCD";
    let rxudp = parse_rxudp(remain).unwrap();
    assert_eq!(
        rxudp.sender,
        "FE80::21C:6400:3A1:B2C3".parse::<Ipv6Addr>().unwrap()
    );
    assert_eq!(rxudp.local_port, 0x02CC);
    assert!(!rxudp.secured);
    assert_eq!(rxudp.payload(remain), "ABCD");
}

#[test]
fn test4() {
    let good = "FE80:0000:0000:0000:021C:6400:03A1:B2C3 FE80:0000:0000:0000:021D:1290:0003:C890 0E1A 0E1A 001C640003A1B2C3 1 0012 00";
    assert!(parse_rxudp(good).is_ok());
    // 長さのあとにデータがなくてもよい
    assert_eq!(parse_rxudp(&good[..good.len() - 3]).unwrap().data_len, 0x12);

    let cases = [
        ("FE80:0000 FE80", "sender address"),
        (
            "FE80:0000:0000:0000:021C:6400:03A1:B2C3 FE80:0000:0000:0000:021D:1290:0003 0E1A",
            "destination address",
        ),
        (
            "FE80:0000:0000:0000:021C:6400:03A1:B2C3 FE80:0000:0000:0000:021D:1290:0003:C890 E1A 0E1A",
            "remote port",
        ),
        (
            "FE80:0000:0000:0000:021C:6400:03A1:B2C3 FE80:0000:0000:0000:021D:1290:0003:C890 0E1A 0E1A 001C6400 1 0012",
            "sender LLA",
        ),
        (
            "FE80:0000:0000:0000:021C:6400:03A1:B2C3 FE80:0000:0000:0000:021D:1290:0003:C890 0E1A 0E1A 001C640003A1B2C3 2 0012",
            "secured flag",
        ),
        (
            "FE80:0000:0000:0000:021C:6400:03A1:B2C3 FE80:0000:0000:0000:021D:1290:0003:C890 0E1A 0E1A 001C640003A1B2C3 1 ",
            "data length",
        ),
    ];
    for (remain, name) in cases {
        assert_eq!(parse_rxudp(remain), Err(RxudpError(name)), "{remain}");
    }
}
