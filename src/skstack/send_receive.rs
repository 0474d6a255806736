// シリアル通信 送受信
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::clock::{Clock, elapsed_since};
use crate::skstack::command::{self, Arg, Terminator};
use crate::skstack::{Event, SkRxD, line_reader, parser};
use crate::transport::Transport;
use std::io;

/// コマンドのエコーバックの接頭辞
pub const ECHO_PREFIX: &str = "SK";

/// BP35系 Wi-SUNモジュール
pub struct Bp35<T: Transport> {
    port: T,
}

impl<T: Transport> Bp35<T> {
    pub fn new(port: T) -> Self {
        Self { port }
    }

    /// 書き込む
    fn send(&mut self, command: &[u8]) -> io::Result<()> {
        let s = command
            .iter()
            .map(|n| *n as char)
            .filter(|n| n.is_ascii())
            .collect::<String>();
        tracing::trace!(target:"Tx->","{}", s.escape_debug());
        self.port.write(command)
    }

    /// SKコマンドを送信する(CRLF終端)
    pub fn send_sk(&mut self, cmd: &str, args: &[Arg]) -> io::Result<()> {
        let line = command::render(cmd, args, Terminator::CrLf);
        self.send(line.as_bytes())
    }

    /// 製品コマンドを送信する(CR終端)
    pub fn send_prod(&mut self, cmd: &str, args: &[Arg]) -> io::Result<()> {
        let line = command::render(cmd, args, Terminator::Cr);
        self.send(line.as_bytes())
    }

    /// 引数に続けてバイナリデータを送信する
    pub fn send_sk_with_data(&mut self, cmd: &str, data: &[u8], args: &[Arg]) -> io::Result<()> {
        let line = command::render(cmd, args, Terminator::Data);
        let command = [line.as_bytes(), data].concat();
        self.send(&command)
    }

    /// 1行読み込む
    pub fn read_line<C: Clock>(&mut self, clock: &C, timeout: u32) -> Option<String> {
        line_reader::read_line(&mut self.port, clock, timeout)
    }

    /// 次の応答を待つ
    ///
    /// コマンドのエコーバックは読み捨てて、`timeout` ミリ秒以内に届いた最初の行を分類する。
    pub fn get_event<C: Clock>(&mut self, clock: &C, timeout: u32) -> Option<SkRxD> {
        let mut remain = timeout;
        let line = loop {
            if remain == 0 {
                return None;
            }
            let started = clock.millis();
            let line = self.read_line(clock, remain)?;
            if line.starts_with(ECHO_PREFIX) {
                let elapsed = elapsed_since(clock, started);
                if remain > elapsed {
                    remain -= elapsed;
                    continue;
                }
                return None;
            }
            break line;
        };
        Some(classify(line))
    }
}

/// 1行を応答の種類に分ける
pub fn classify(line: String) -> SkRxD {
    if line == "OK" {
        return SkRxD::Ok(None);
    }
    if let Some(remain) = line.strip_prefix("OK ") {
        return SkRxD::Ok(Some(remain.to_owned()));
    }
    if let Some(remain) = line.strip_prefix("EVER ") {
        return SkRxD::Ver(remain.to_owned());
    }
    if let Some(remain) = line.strip_prefix("EVENT ") {
        return SkRxD::Event(Event {
            code: parser::parse_event_number(remain),
            remain: remain.to_owned(),
        });
    }
    if let Some(remain) = line.strip_prefix("ERXUDP ") {
        return SkRxD::Rxudp(remain.to_owned());
    }
    if line == "EPANDESC" {
        return SkRxD::Pandesc(String::new());
    }
    if let Some(remain) = line.strip_prefix("EPANDESC ") {
        return SkRxD::Pandesc(remain.to_owned());
    }
    if let Some(code) = parser::parse_fail(&line) {
        return SkRxD::Fail(code);
    }
    SkRxD::Unknown(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::transport::ScriptedTransport;
    use std::collections::VecDeque;

    /// 時刻どおりに少しずつ届く通信路
    struct Trickle {
        clock: ManualClock,
        rx: VecDeque<(u32, u8)>,
    }

    impl Trickle {
        fn new(clock: &ManualClock, chunks: &[(u32, &[u8])]) -> Self {
            let rx = chunks
                .iter()
                .flat_map(|(at, bytes)| bytes.iter().map(move |b| (*at, *b)))
                .collect();
            Self {
                clock: clock.clone(),
                rx,
            }
        }
    }

    impl Transport for Trickle {
        fn write(&mut self, _bytes: &[u8]) -> io::Result<()> {
            Ok(())
        }

        fn read_byte(&mut self) -> Option<u8> {
            match self.rx.front() {
                Some((at, _)) if *at <= self.clock.millis() => self.rx.pop_front().map(|(_, b)| b),
                _ => None,
            }
        }
    }

    #[test]
    fn test1() {
        assert_eq!(classify("OK".into()), SkRxD::Ok(None));
        assert_eq!(classify("OK 01".into()), SkRxD::Ok(Some("01".into())));
        assert_eq!(classify("EVER 1.2.10".into()), SkRxD::Ver("1.2.10".into()));
        assert_eq!(
            classify("EVENT 25 FE80:0000:0000:0000:021C:6400:03A1:B2C3".into()),
            SkRxD::Event(Event {
                code: 0x25,
                remain: "25 FE80:0000:0000:0000:021C:6400:03A1:B2C3".into()
            })
        );
        // 不正なイベント番号は 0
        assert_eq!(
            classify("EVENT ZZ".into()),
            SkRxD::Event(Event {
                code: 0,
                remain: "ZZ".into()
            })
        );
        assert_eq!(classify("ERXUDP abc".into()), SkRxD::Rxudp("abc".into()));
        assert_eq!(classify("EPANDESC".into()), SkRxD::Pandesc("".into()));
        assert_eq!(classify("FAIL ER04".into()), SkRxD::Fail(4));
        assert_eq!(
            classify("  Channel:21".into()),
            SkRxD::Unknown("  Channel:21".into())
        );
        assert_eq!(classify("OKAY".into()), SkRxD::Unknown("OKAY".into()));
    }

    #[test]
    fn test2() {
        // エコーバックは読み捨てる
        let clock = ManualClock::new(0);
        let handle = ScriptedTransport::new();
        let mut bp = Bp35::new(handle.clone());
        handle.push_line("SKVER");
        handle.push_line("EVER 1.2.10");
        handle.push_line("OK");
        assert_eq!(bp.get_event(&clock, 100), Some(SkRxD::Ver("1.2.10".into())));
        assert_eq!(bp.get_event(&clock, 100), Some(SkRxD::Ok(None)));
        assert_eq!(bp.get_event(&clock, 100), None);
    }

    #[test]
    fn test3() {
        // エコーバックしか届かなければ何もなし
        let clock = ManualClock::new(0);
        let handle = ScriptedTransport::new();
        let mut bp = Bp35::new(handle.clone());
        handle.push_line("SKSREG SFE 0");
        assert_eq!(bp.get_event(&clock, 100), None);
        assert_eq!(handle.pending(), 0);
    }

    #[test]
    fn test4() {
        let handle = ScriptedTransport::new();
        let mut bp = Bp35::new(handle.clone());
        bp.send_sk("SKSREG", &[Arg::Reg(0xfe), Arg::Mode(0)]).unwrap();
        bp.send_prod("ROPT", &[]).unwrap();
        bp.send_sk_with_data("SKSENDTO", &[0x10, 0x81], &[Arg::Mode(1)])
            .unwrap();
        assert_eq!(
            handle.take_written(),
            b"SKSREG SFE 0\r\nROPT\rSKSENDTO 1 \x10\x81".to_vec()
        );
    }

    #[test]
    fn test5() {
        // エコーバックに掛かった時間だけ待ち時間が減る
        let clock = ManualClock::new(0);
        let port = Trickle::new(
            &clock,
            &[
                (0, &b"SKSREG SFE 0"[..]),
                (60, &b"\r\nO"[..]),
                (90, &b"K\r\n"[..]),
            ],
        );
        let mut bp = Bp35::new(port);
        assert_eq!(bp.get_event(&clock, 100), Some(SkRxD::Ok(None)));
        assert_eq!(clock.millis(), 90);

        // 残り 40 ミリ秒では間に合わない
        let clock = ManualClock::new(0);
        let port = Trickle::new(
            &clock,
            &[
                (0, &b"SKSREG SFE 0"[..]),
                (60, &b"\r\nO"[..]),
                (110, &b"K\r\n"[..]),
            ],
        );
        let mut bp = Bp35::new(port);
        assert_eq!(bp.get_event(&clock, 100), None);
        assert_eq!(clock.millis(), 100);
        assert_eq!(bp.port.rx.len(), 3);
    }
}
