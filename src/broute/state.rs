// ルートB接続の状態
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use std::fmt;
use thiserror::Error;

/// 設定値の書き込み手順
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingStep {
    Echo,    // エコーバック無効化の応答待ち
    Ropt,    // ROPT の応答待ち
    Wopt,    // WOPT の応答待ち
    Pwd,     // SKSETPWD の応答待ち
    Rbid,    // SKSETRBID の応答待ち
    Channel, // SKSREG S2 の応答待ち
    Panid,   // SKSREG S3 の応答待ち
}

/// OK を受け取った後にすること
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingAction {
    ProbeMode,      // ROPT
    ForceAsciiMode, // WOPT 01
    SetPassword,    // SKSETPWD
    SetRouteBId,    // SKSETRBID
    StartScan,      // SKSCAN
    SetPanId,       // SKSREG S3
    StartJoin,      // SKJOIN
}

impl SettingAction {
    /// 次に待つ応答
    ///
    /// 設定状態を抜けるなら None
    pub fn next_step(&self) -> Option<SettingStep> {
        match self {
            SettingAction::ProbeMode => Some(SettingStep::Ropt),
            SettingAction::ForceAsciiMode => Some(SettingStep::Wopt),
            SettingAction::SetPassword => Some(SettingStep::Pwd),
            SettingAction::SetRouteBId => Some(SettingStep::Rbid),
            SettingAction::SetPanId => Some(SettingStep::Panid),
            SettingAction::StartScan | SettingAction::StartJoin => None,
        }
    }
}

/// OK 応答に対する遷移
///
/// `remain` は "OK " に続く文字列
pub fn next_action(step: SettingStep, remain: Option<&str>) -> SettingAction {
    match step {
        SettingStep::Echo => SettingAction::ProbeMode,
        // 01 ならASCIIモード
        SettingStep::Ropt if remain == Some("01") => SettingAction::SetPassword,
        SettingStep::Ropt => SettingAction::ForceAsciiMode,
        SettingStep::Wopt => SettingAction::SetPassword,
        SettingStep::Pwd => SettingAction::SetRouteBId,
        SettingStep::Rbid => SettingAction::StartScan,
        SettingStep::Channel => SettingAction::SetPanId,
        SettingStep::Panid => SettingAction::StartJoin,
    }
}

/// 接続状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    WaitVersion,
    Configuring(SettingStep),
    Scanning,
    AddressResolving,
    Joining,
    Running,
    Restarting,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            State::Init => "init",
            State::WaitVersion => "ver",
            State::Configuring(_) => "settings",
            State::Scanning => "scanning",
            State::AddressResolving => "addr_conv",
            State::Joining => "joining",
            State::Running => "running",
            State::Restarting => "restarting",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("no scan data")]
    NoData,
    #[error("unexpected scan data")]
    Malformed,
}

/// アクティブスキャンで見つけたスマートメーター
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub mac: String,     // "Addr:" 16桁
    pub pan_id: String,  // "Pan ID:" 4桁
    pub channel: String, // "Channel:" 2桁
}

impl ScanResult {
    const KEY_ADDR: &'static str = "Addr:";
    const KEY_PANID: &'static str = "Pan ID:";
    const KEY_CHANNEL: &'static str = "Channel:";

    pub fn clear(&mut self) {
        self.mac.clear();
        self.pan_id.clear();
        self.channel.clear();
    }

    /// EPANDESC に続く行を取り込む
    pub fn capture(&mut self, line: &str) {
        let line = line.trim();
        if let Some(v) = line.strip_prefix(Self::KEY_ADDR) {
            self.mac = v.to_owned();
        } else if let Some(v) = line.strip_prefix(Self::KEY_PANID) {
            self.pan_id = v.to_owned();
        } else if let Some(v) = line.strip_prefix(Self::KEY_CHANNEL) {
            self.channel = v.to_owned();
        }
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        tracing::debug!(
            "scan data: mac={}, panid={}, channel={}",
            self.mac,
            self.pan_id,
            self.channel
        );
        if self.mac.is_empty() && self.pan_id.is_empty() && self.channel.is_empty() {
            return Err(ScanError::NoData);
        }
        let hex = |v: &str, len: usize| v.len() == len && v.bytes().all(|c| c.is_ascii_hexdigit());
        if !hex(&self.mac, 16) || !hex(&self.pan_id, 4) || !hex(&self.channel, 2) {
            tracing::error!(
                "Unexpected scan data: mac={}, panid={}, channel={}",
                self.mac,
                self.pan_id,
                self.channel
            );
            return Err(ScanError::Malformed);
        }
        Ok(())
    }
}

#[test]
fn test1() {
    // ASCIIモードならWOPTを飛ばす
    assert_eq!(
        next_action(SettingStep::Ropt, Some("01")),
        SettingAction::SetPassword
    );
    assert_eq!(
        next_action(SettingStep::Ropt, Some("00")),
        SettingAction::ForceAsciiMode
    );
    assert_eq!(next_action(SettingStep::Ropt, None), SettingAction::ForceAsciiMode);

    // 一連の手順
    let mut step = SettingStep::Echo;
    let mut actions = Vec::new();
    loop {
        let action = next_action(step, Some("00"));
        actions.push(action);
        match action.next_step() {
            Some(next) => step = next,
            None => break,
        }
    }
    assert_eq!(
        actions,
        vec![
            SettingAction::ProbeMode,
            SettingAction::ForceAsciiMode,
            SettingAction::SetPassword,
            SettingAction::SetRouteBId,
            SettingAction::StartScan,
        ]
    );
    assert_eq!(next_action(SettingStep::Channel, None), SettingAction::SetPanId);
    assert_eq!(next_action(SettingStep::Panid, None), SettingAction::StartJoin);
}

#[test]
fn test2() {
    let mut scan = ScanResult::default();
    assert_eq!(scan.validate(), Err(ScanError::NoData));

    scan.capture("  Channel:21");
    scan.capture("  Channel Page:09");
    scan.capture("  Pan ID:8888");
    scan.capture("  Addr:001C640003A1B2C3");
    scan.capture("  LQI:E1");
    assert_eq!(scan.channel, "21");
    assert_eq!(scan.pan_id, "8888");
    assert_eq!(scan.mac, "001C640003A1B2C3");
    assert_eq!(scan.validate(), Ok(()));

    // 桁数が違う, 16進数でない
    for (mac, pan_id, channel) in [
        ("001C640003A1B2C", "8888", "21"),
        ("001C640003A1B2C3", "888", "21"),
        ("001C640003A1B2C3", "8888", ""),
        ("ZZZZZZZZZZZZZZZZ", "8888", "21"),
        ("001C640003A1B2C3", "88G8", "21"),
        ("001C640003A1B2C3", "8888", "2 "),
    ] {
        let scan = ScanResult {
            mac: mac.into(),
            pan_id: pan_id.into(),
            channel: channel.into(),
        };
        assert_eq!(scan.validate(), Err(ScanError::Malformed));
    }

    scan.clear();
    assert_eq!(scan.validate(), Err(ScanError::NoData));
}

#[test]
fn test3() {
    assert_eq!(State::Configuring(SettingStep::Pwd).to_string(), "settings");
    assert_eq!(State::AddressResolving.to_string(), "addr_conv");
    assert_eq!(State::Restarting.to_string(), "restarting");
}
