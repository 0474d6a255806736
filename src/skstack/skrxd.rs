// SKSTACK/IPの応答
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use std::net::Ipv6Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub code: u8,       // イベント番号
    pub remain: String, // イベント番号以降
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rxudp {
    pub sender: Ipv6Addr,      // 送信元IPv6アドレス
    pub destination: Ipv6Addr, // 送信先IPv6アドレス
    pub remote_port: u16,      // 送信元UDPポート番号
    pub local_port: u16,       // 送信先UDPポート番号
    pub sender_lla: u64,       // 送信元のMAC層アドレス
    pub secured: bool,         // 暗号化あり/なし
    pub data_len: u16,         // 受信データ長
    pub data_pos: usize,       // 受信データ(テキスト)の開始位置
}

impl Rxudp {
    /// 受信データ(16進テキスト)を取り出す
    pub fn payload<'a>(&self, remain: &'a str) -> &'a str {
        remain.get(self.data_pos..).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkRxD {
    Ver(String),         // EVER バージョン
    Ok(Option<String>),  // 成功(OK に続く文字列)
    Fail(u8),            // 失敗
    Event(Event),        // イベント受信
    Rxudp(String),       // ERXUDP受信(ERXUDP 以降)
    Pandesc(String),     // EPANDESC受信
    Unknown(String),     // それ以外の行そのまま
}

/// イベント番号の説明
pub fn event_name(code: u8) -> &'static str {
    match code {
        0x01 => "NS を受信した",
        0x02 => "NA を受信した",
        0x05 => "Echo Request を受信した",
        0x1f => "ED スキャンが完了した",
        0x20 => "Beacon を受信した",
        0x21 => "UDP 送信処理が完了した",
        0x22 => "アクティブスキャンが完了した",
        0x24 => "PANA による接続過程でエラーが発生した",
        0x25 => "PANA による接続が完了した",
        0x26 => "接続相手からセッション終了要求を受信した",
        0x27 => "PANA セッションの終了に成功した",
        0x28 => "PANA セッションの終了要求に対する応答がなくタイムアウトした",
        0x29 => "セッションのライフタイムが経過して期限切れになった",
        0x32 => "ARIB108 の送信総和時間の制限が発動した",
        0x33 => "送信総和時間の制限が解除された",
        _ => "UNKNOWN",
    }
}
