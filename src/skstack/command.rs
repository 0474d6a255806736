// SKSTACK/IPのコマンド引数
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use std::fmt;

/// コマンド引数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg<'a> {
    /// 仮想レジスタ番号 (SFE など)
    Reg(u8),
    /// 動作モードなど10進数1桁の値
    Mode(u8),
    /// 8ビット16進数(2桁)
    Num8(u8),
    /// 16ビット16進数(4桁)
    Num16(u16),
    /// 真偽値
    Flag(bool),
    /// 文字列そのまま
    Str(&'a str),
}

impl fmt::Display for Arg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Arg::Reg(n) => write!(f, "S{:X}", n),
            Arg::Mode(n) => write!(f, "{}", n),
            Arg::Num8(n) => write!(f, "{:02X}", n),
            Arg::Num16(n) => write!(f, "{:04X}", n),
            Arg::Flag(b) => write!(f, "{}", if *b { 1 } else { 0 }),
            Arg::Str(s) => write!(f, "{}", s),
        }
    }
}

/// コマンド行の終端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// SKコマンドは CRLF
    CrLf,
    /// 製品コマンド(ROPT, WOPTなど)は CR
    Cr,
    /// 後ろにバイナリデータが続く
    Data,
}

/// コマンド行を組み立てる
pub fn render(command: &str, args: &[Arg], terminator: Terminator) -> String {
    let mut line = String::from(command);
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string());
    }
    match terminator {
        Terminator::CrLf => line.push_str("\r\n"),
        Terminator::Cr => line.push('\r'),
        Terminator::Data => line.push(' '),
    }
    line
}

#[test]
fn test1() {
    assert_eq!(
        render("SKSREG", &[Arg::Reg(0xfe), Arg::Mode(0)], Terminator::CrLf),
        "SKSREG SFE 0\r\n"
    );
    assert_eq!(
        render("SKSREG", &[Arg::Reg(0x02), Arg::Str("21")], Terminator::CrLf),
        "SKSREG S2 21\r\n"
    );
    assert_eq!(render("WOPT", &[Arg::Num8(1)], Terminator::Cr), "WOPT 01\r");
    assert_eq!(render("SKVER", &[], Terminator::CrLf), "SKVER\r\n");
    assert_eq!(
        render(
            "SKSENDTO",
            &[
                Arg::Mode(1),
                Arg::Str("FE80:0000:0000:0000:021C:6400:03A1:B2C3"),
                Arg::Num16(3610),
                Arg::Mode(2),
                Arg::Flag(false),
                Arg::Num16(14),
            ],
            Terminator::Data
        ),
        "SKSENDTO 1 FE80:0000:0000:0000:021C:6400:03A1:B2C3 0E1A 2 0 000E "
    );
}
