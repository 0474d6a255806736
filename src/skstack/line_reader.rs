// 1行読み込み
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::clock::{Clock, elapsed_since};
use crate::transport::Transport;

/// 受信待ちの間隔(ミリ秒)
pub const POLL_INTERVAL: u32 = 1;

/// CR終端の1行を読み込む
///
/// LFは読み捨てる。何も届いていない、または空行のときは None を返す。
/// 行の途中で途切れたときは `timeout` ミリ秒まで続きを待つ。
pub fn read_line<T: Transport, C: Clock>(port: &mut T, clock: &C, timeout: u32) -> Option<String> {
    let started = clock.millis();
    let mut line = Vec::<u8>::new();
    let mut read1 = false;
    while elapsed_since(clock, started) < timeout {
        let c = match port.read_byte() {
            Some(b'\n') => continue,
            Some(c) => c,
            None if !read1 => return None,
            None => {
                clock.delay(POLL_INTERVAL);
                continue;
            }
        };
        read1 = true;
        let mut next = Some(c);
        while let Some(c) = next {
            match c {
                b'\r' => {
                    if line.is_empty() {
                        return None;
                    }
                    let line = String::from_utf8_lossy(&line).into_owned();
                    tracing::trace!(target:"<-Rx","{}", line.escape_debug());
                    return Some(line);
                }
                b'\n' => {}
                c => line.push(c),
            }
            next = port.read_byte();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::transport::ScriptedTransport;

    #[test]
    fn test1() {
        let clock = ManualClock::new(0);
        let mut port = ScriptedTransport::new();
        port.push_line("OK");
        port.push_line("EVENT 25 FE80:0000:0000:0000:021C:6400:03A1:B2C3");
        assert_eq!(read_line(&mut port, &clock, 100).as_deref(), Some("OK"));
        assert_eq!(
            read_line(&mut port, &clock, 100).as_deref(),
            Some("EVENT 25 FE80:0000:0000:0000:021C:6400:03A1:B2C3")
        );
        // 何も届いていない
        assert_eq!(read_line(&mut port, &clock, 100), None);
        assert_eq!(clock.millis(), 0);
    }

    #[test]
    fn test2() {
        // 空行は None
        let clock = ManualClock::new(0);
        let mut port = ScriptedTransport::new();
        port.push_bytes(b"\r\nOK\r\n");
        assert_eq!(read_line(&mut port, &clock, 100), None);
        assert_eq!(read_line(&mut port, &clock, 100).as_deref(), Some("OK"));
    }

    #[test]
    fn test3() {
        // 行の途中のLFは取り除く
        let clock = ManualClock::new(0);
        let mut port = ScriptedTransport::new();
        port.push_bytes(b"\nO\nK\r");
        assert_eq!(read_line(&mut port, &clock, 100).as_deref(), Some("OK"));
    }

    #[test]
    fn test4() {
        // CRが届かないまま期限切れ
        let clock = ManualClock::new(0);
        let mut port = ScriptedTransport::new();
        port.push_bytes(b"EVE");
        assert_eq!(read_line(&mut port, &clock, 100), None);
        assert_eq!(clock.millis(), 100);
    }
}
