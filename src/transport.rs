// Wi-SUNモジュールとの通信路
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use serialport::SerialPort;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;

/// 双方向バイトストリーム
pub trait Transport {
    /// 書き込む
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
    /// 1バイト読み込む(ブロックしない, データなしは None)
    fn read_byte(&mut self) -> Option<u8>;
}

/// シリアルポート
pub struct SerialPortTransport {
    port: Box<dyn SerialPort>,
}

impl SerialPortTransport {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Transport for SerialPortTransport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn read_byte(&mut self) -> Option<u8> {
        match self.port.bytes_to_read() {
            Ok(0) => None,
            Ok(_) => {
                let mut buf = [0u8; 1];
                match self.port.read(&mut buf) {
                    Ok(1) => Some(buf[0]),
                    Ok(_) => None,
                    Err(e) if e.kind() == io::ErrorKind::TimedOut => None,
                    Err(e) => {
                        tracing::warn!("serial port read failed: {e}");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::warn!("serial port status failed: {e}");
                None
            }
        }
    }
}

#[derive(Default)]
struct Script {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

/// 台本どおりに応答する通信路
///
/// clone したハンドルから受信データを積んだり送信データを確かめたりできる。
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Rc<RefCell<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 受信データを積む
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.inner.borrow_mut().rx.extend(bytes);
    }

    /// CRLF終端の1行を積む
    pub fn push_line(&self, line: &str) {
        self.push_bytes(line.as_bytes());
        self.push_bytes(b"\r\n");
    }

    /// まだ読まれていない受信データのバイト数
    pub fn pending(&self) -> usize {
        self.inner.borrow().rx.len()
    }

    /// 送信されたデータを取り出す
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.inner.borrow_mut().tx)
    }

    /// 送信されたデータを文字列で取り出す
    pub fn take_written_string(&self) -> String {
        String::from_utf8_lossy(&self.take_written()).into_owned()
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.borrow_mut().tx.extend_from_slice(bytes);
        Ok(())
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.inner.borrow_mut().rx.pop_front()
    }
}

#[test]
fn test1() {
    let handle = ScriptedTransport::new();
    let mut port = handle.clone();
    handle.push_line("OK");
    assert_eq!(handle.pending(), 4);
    assert_eq!(port.read_byte(), Some(b'O'));
    assert_eq!(port.read_byte(), Some(b'K'));
    assert_eq!(port.read_byte(), Some(b'\r'));
    assert_eq!(port.read_byte(), Some(b'\n'));
    assert_eq!(port.read_byte(), None);

    port.write(b"SKVER\r\n").unwrap();
    assert_eq!(handle.take_written_string(), "SKVER\r\n");
    assert!(handle.take_written().is_empty());
}
