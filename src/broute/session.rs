// ルートB接続
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::broute::calibration::EnergyCalibration;
use crate::broute::scheduler::RequestTimers;
use crate::broute::state::{self, ScanResult, SettingAction, SettingStep, State};
use crate::broute::timer::{Interval, Task};
use crate::clock::{Clock, elapsed_since};
use crate::connection_settings::ConnectionSettings;
use crate::echonetlite::{self, Esv, smart_electric_energy_meter as SM};
use crate::error::Error;
use crate::sensor::SensorSink;
use crate::skstack::{self, Bp35, SkRxD, authn, command::Arg, parser};
use crate::transport::Transport;
use std::io;

/// 1回の応答待ち(ミリ秒)
pub const EVENT_BUDGET: u32 = 100;
/// 再起動までの猶予(ミリ秒)
pub const RESTART_DELAY: u32 = 5_000;
/// 送信バッファの大きさ
pub const OUT_BUFFER_LEN: usize = 255;

const VERSION_TIMEOUT: u32 = 1_000;
const SETTING_TIMEOUT: u32 = 1_000;
const SCAN_TIMEOUT: u32 = 20_000;
const ADDRESS_TIMEOUT: u32 = 1_000;
const JOIN_TIMEOUT: u32 = 10_000;

/// ルートBのアドレス変換結果(IPv6アドレス表記)の長さ
const IPV6_ADDRESS_LEN: usize = 39;

/// `run_loop` の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// 機器を再起動すること
    Reboot,
    /// 失敗状態なので何もしない
    Halted,
}

/// 計測データ途絶の監視
///
/// 待ち時間 0 は無効
#[derive(Debug, Clone, Copy, Default)]
struct Watchdog {
    rescan_timeout: u32,
    rejoin_timeout: u32,
    reboot_timeout: u32,
    rescan_timer: u32,
    rejoin_timer: u32,
    reboot_timer: u32,
}

impl Watchdog {
    fn new(settings: &ConnectionSettings) -> Self {
        Self {
            rescan_timeout: settings.rescan_timeout_sec.saturating_mul(1000),
            rejoin_timeout: settings.rejoin_timeout_sec.saturating_mul(1000),
            reboot_timeout: settings.restart_timeout_sec.saturating_mul(1000),
            ..Default::default()
        }
    }

    fn reset(&mut self, now: u32) {
        self.rescan_timer = now;
        self.rejoin_timer = now;
        self.reboot_timer = now;
    }

    fn expired(timeout: u32, timer: u32, now: u32) -> Option<u32> {
        let elapsed = now.wrapping_sub(timer);
        (timeout > 0 && elapsed > timeout).then_some(elapsed)
    }

    fn rescan_expired(&self, now: u32) -> Option<u32> {
        Self::expired(self.rescan_timeout, self.rescan_timer, now)
    }

    fn rejoin_expired(&self, now: u32) -> Option<u32> {
        Self::expired(self.rejoin_timeout, self.rejoin_timer, now)
    }

    fn reboot_expired(&self, now: u32) -> Option<u32> {
        Self::expired(self.reboot_timeout, self.reboot_timer, now)
    }
}

/// 送信失敗はログに出すだけ
pub(super) fn sent(command: &str, result: io::Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("{command}: send failed, {e}");
            false
        }
    }
}

/// スマートメーターとのセッション
///
/// ホストから `run_loop` と `run_timers` を周期的に呼び出してもらう。
pub struct Session<T: Transport, C: Clock> {
    pub(super) bp: Bp35<T>,
    pub(super) clock: C,
    pub(super) settings: ConnectionSettings,
    credentials: Option<authn::Credentials>,
    pub(super) state: State,
    state_started: u32,
    state_timeout: u32,
    pub(super) v6_address: String,
    scan: ScanResult,
    pub(super) calibration: EnergyCalibration,
    pub(super) miss_count: u8,
    pub(super) property_requested: Option<u32>,
    watchdog: Watchdog,
    pub(super) timers: RequestTimers,
    pub(super) power_sensor: Option<Box<dyn SensorSink>>,
    pub(super) energy_sensor: Option<Box<dyn SensorSink>>,
    pub(super) out_buffer: [u8; OUT_BUFFER_LEN],
    rx_buffer: Vec<u8>,
    failed: bool,
}

impl<T: Transport, C: Clock> Session<T, C> {
    pub fn new(port: T, clock: C, settings: &ConnectionSettings) -> Self {
        Self {
            bp: Bp35::new(port),
            clock,
            settings: settings.clone(),
            credentials: None,
            state: State::Init,
            state_started: 0,
            state_timeout: 0,
            v6_address: String::new(),
            scan: ScanResult::default(),
            calibration: EnergyCalibration::default(),
            miss_count: 0,
            property_requested: None,
            watchdog: Watchdog::new(settings),
            timers: RequestTimers::default(),
            power_sensor: None,
            energy_sensor: None,
            out_buffer: [0; OUT_BUFFER_LEN],
            rx_buffer: Vec::with_capacity(OUT_BUFFER_LEN),
            failed: false,
        }
    }

    /// 瞬時電力の出力先
    pub fn with_power_sensor(mut self, sink: Box<dyn SensorSink>) -> Self {
        self.power_sensor = Some(sink);
        self
    }

    /// 積算電力量の出力先
    pub fn with_energy_sensor(mut self, sink: Box<dyn SensorSink>) -> Self {
        self.energy_sensor = Some(sink);
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn calibration(&self) -> &EnergyCalibration {
        &self.calibration
    }

    pub fn miss_count(&self) -> u8 {
        self.miss_count
    }

    pub fn is_task_scheduled(&self, task: Task) -> bool {
        self.timers.get(task).is_armed()
    }

    /// 開始準備
    ///
    /// 認証情報がなければ失敗状態にして以後何もしない。
    pub fn setup(&mut self) -> Result<(), Error> {
        match self.settings.credentials() {
            Ok(credentials) => self.credentials = Some(credentials),
            Err(e) => {
                tracing::error!("{e}");
                self.failed = true;
                return Err(e);
            }
        }
        if self.power_sensor.is_some() || self.energy_sensor.is_some() {
            self.request_energy_parameters();
        }
        let now = self.clock.millis();
        let power_interval = self.settings.power_interval_sec.saturating_mul(1000);
        if self.power_sensor.is_some() && power_interval > 0 {
            self.timers.power_interval = Some(Interval::new(now, power_interval));
        }
        let energy_interval = self.settings.energy_interval_sec.saturating_mul(1000);
        if self.energy_sensor.is_some() && energy_interval > 0 {
            self.timers.energy_interval = Some(Interval::new(now, energy_interval));
        }
        self.reset_timers();
        Ok(())
    }

    /// 計測データを定期的に要求しているか
    pub fn is_measurement_requesting(&self) -> bool {
        let requesting = |sensor: &Option<Box<dyn SensorSink>>, interval: &Option<Interval>| {
            sensor.is_some() && interval.is_some_and(|v| v.period() > 0)
        };
        requesting(&self.power_sensor, &self.timers.power_interval)
            || requesting(&self.energy_sensor, &self.timers.energy_interval)
    }

    /// 計測データ途絶の監視を始めからにする
    pub(super) fn reset_timers(&mut self) {
        let now = self.clock.millis();
        self.watchdog.reset(now);
    }

    fn set_state(&mut self, state: State, timeout: u32) {
        // 再起動待ちからは抜けない
        if self.state == State::Restarting {
            return;
        }
        self.state = state;
        self.state_timeout = timeout;
        self.state_started = self.clock.millis();
    }

    pub(super) fn start_join(&mut self) {
        sent(
            "SKJOIN",
            self.bp.send_sk("SKJOIN", &[Arg::Str(&self.v6_address)]),
        );
        self.set_state(State::Joining, JOIN_TIMEOUT);
    }

    fn start_scan(&mut self) {
        self.scan.clear();
        sent(
            "SKSCAN",
            self.bp.send_sk(
                "SKSCAN",
                &[Arg::Mode(2), Arg::Str("FFFFFFFF"), Arg::Mode(6), Arg::Mode(0)],
            ),
        );
        self.set_state(State::Scanning, SCAN_TIMEOUT);
    }

    fn get_event(&mut self) -> Option<SkRxD> {
        let ev = self.bp.get_event(&self.clock, EVENT_BUDGET)?;
        match &ev {
            SkRxD::Event(event) => tracing::trace!(
                "ev = EVENT {:02X}({})",
                event.code,
                skstack::event_name(event.code)
            ),
            SkRxD::Fail(code) => tracing::warn!("{}: FAIL ER{code:02X}", self.state),
            other => tracing::trace!("ev = {other:?}"),
        }
        Some(ev)
    }

    /// 1周分の処理
    pub fn run_loop(&mut self) -> Step {
        if self.failed {
            return Step::Halted;
        }
        let ev = self.get_event();
        match self.state {
            State::Restarting => {
                if elapsed_since(&self.clock, self.state_started) >= RESTART_DELAY {
                    tracing::error!("Restarting");
                    self.failed = true;
                    return Step::Reboot;
                }
                return Step::Continue;
            }
            State::Init => {
                sent("SKTERM", self.bp.send_sk("SKTERM", &[]));
                sent("SKRESET", self.bp.send_sk("SKRESET", &[]));
                sent("SKVER", self.bp.send_sk("SKVER", &[]));
                self.set_state(State::WaitVersion, VERSION_TIMEOUT);
            }
            State::WaitVersion => {
                if let Some(SkRxD::Ver(version)) = ev {
                    tracing::debug!("VER={version}");
                    tracing::debug!("Disable echo back");
                    sent(
                        "SKSREG",
                        self.bp.send_sk("SKSREG", &[Arg::Reg(0xfe), Arg::Mode(0)]),
                    );
                    self.set_state(State::Configuring(SettingStep::Echo), SETTING_TIMEOUT);
                }
            }
            State::Configuring(step) => {
                tracing::trace!("Setting values, current value: {step:?}");
                if let Some(SkRxD::Ok(remain)) = ev {
                    self.on_setting_ok(step, remain.as_deref());
                }
            }
            State::Scanning => self.on_scanning(ev),
            State::AddressResolving => {
                if let Some(SkRxD::Unknown(line)) = ev {
                    if !line.starts_with("SKLL") && line.len() == IPV6_ADDRESS_LEN {
                        self.v6_address = line;
                        sent(
                            "SKSREG",
                            self.bp.send_sk(
                                "SKSREG",
                                &[Arg::Reg(0x02), Arg::Str(&self.scan.channel)],
                            ),
                        );
                        self.set_state(State::Configuring(SettingStep::Channel), SETTING_TIMEOUT);
                    }
                }
            }
            State::Joining => match ev {
                Some(SkRxD::Ok(_)) => tracing::info!("Joining..."),
                Some(SkRxD::Event(event)) => match event.code {
                    0x25 => {
                        tracing::info!("Joined");
                        self.set_state(State::Running, 0);
                        self.reset_timers();
                    }
                    0x24 => {
                        tracing::warn!("Failed to join, try scan and join");
                        self.start_scan();
                    }
                    0x21 => {}
                    code => tracing::debug!("{code:02X}: Ignore event"),
                },
                _ => {}
            },
            State::Running => self.on_running(ev),
        }

        if self.is_measurement_requesting() {
            let now = self.clock.millis();
            if let Some(elapsed) = self.watchdog.reboot_expired(now) {
                tracing::error!(
                    "計測データを {} 秒間受信していません。再起動します",
                    elapsed / 1000
                );
                self.set_state(State::Restarting, 0);
                return Step::Continue;
            }
        }
        if self.state_timeout > 0
            && elapsed_since(&self.clock, self.state_started) > self.state_timeout
        {
            tracing::warn!("{}: State timeout, re-run from init", self.state);
            self.set_state(State::Init, 0);
        }
        Step::Continue
    }

    fn on_setting_ok(&mut self, step: SettingStep, remain: Option<&str>) {
        if step == SettingStep::Ropt {
            tracing::debug!("ropt={}", remain.unwrap_or_default());
        }
        let action = state::next_action(step, remain);
        match action {
            SettingAction::ProbeMode => {
                sent("ROPT", self.bp.send_prod("ROPT", &[]));
            }
            SettingAction::ForceAsciiMode => {
                sent("WOPT", self.bp.send_prod("WOPT", &[Arg::Num8(1)]));
            }
            SettingAction::SetPassword => {
                let Some(credentials) = &self.credentials else {
                    tracing::error!("Route B Password not set");
                    return;
                };
                let len = format!("{:X}", credentials.password.len());
                let password = credentials.password.to_string();
                sent(
                    "SKSETPWD",
                    self.bp
                        .send_sk("SKSETPWD", &[Arg::Str(&len), Arg::Str(&password)]),
                );
            }
            SettingAction::SetRouteBId => {
                let Some(credentials) = &self.credentials else {
                    tracing::error!("Route B ID not set");
                    return;
                };
                let id = credentials.id.to_string();
                sent("SKSETRBID", self.bp.send_sk("SKSETRBID", &[Arg::Str(&id)]));
            }
            SettingAction::StartScan => self.start_scan(),
            SettingAction::SetPanId => {
                sent(
                    "SKSREG",
                    self.bp
                        .send_sk("SKSREG", &[Arg::Reg(0x03), Arg::Str(&self.scan.pan_id)]),
                );
            }
            SettingAction::StartJoin => self.start_join(),
        }
        if let Some(next) = action.next_step() {
            self.set_state(State::Configuring(next), SETTING_TIMEOUT);
        }
    }

    fn on_scanning(&mut self, ev: Option<SkRxD>) {
        match ev {
            Some(SkRxD::Ok(_)) => tracing::info!("Scanning..."),
            Some(SkRxD::Event(event)) if event.code == 0x20 => {
                tracing::info!("Scan done, received {}", event.remain);
                match self.scan.validate() {
                    Ok(()) => {
                        tracing::info!("Scan done");
                        self.watchdog.rescan_timer = self.clock.millis();
                        sent(
                            "SKLL64",
                            self.bp.send_sk("SKLL64", &[Arg::Str(&self.scan.mac)]),
                        );
                        self.set_state(State::AddressResolving, ADDRESS_TIMEOUT);
                    }
                    Err(e) => {
                        tracing::warn!("Scan done but {e}, scan again");
                        self.start_scan();
                    }
                }
            }
            Some(SkRxD::Event(event)) => tracing::info!("Scan event {:02X}", event.code),
            Some(SkRxD::Unknown(line)) if line.starts_with(' ') => self.scan.capture(&line),
            _ => {}
        }
    }

    fn on_running(&mut self, ev: Option<SkRxD>) {
        match ev {
            Some(SkRxD::Event(event)) => match event.code {
                0x32 => tracing::warn!("Transmit time limit activated"),
                0x33 => tracing::warn!("Transmit time limit cleared"),
                0x29 => {
                    tracing::info!("Session expired, waiting re-join");
                    self.set_state(State::Joining, JOIN_TIMEOUT);
                }
                code => tracing::trace!("{code:02X}: Unhandled event"),
            },
            Some(SkRxD::Rxudp(remain)) => self.handle_rxudp(&remain),
            Some(other) => tracing::trace!("{other:?}: Unhandled input"),
            None => {}
        }
        if !self.is_measurement_requesting() {
            return;
        }
        let now = self.clock.millis();
        if let Some(elapsed) = self.watchdog.rescan_expired(now) {
            tracing::error!(
                "計測データを {} 秒間受信していません。再スキャンします",
                elapsed / 1000
            );
            self.start_scan();
        } else if let Some(elapsed) = self.watchdog.rejoin_expired(now) {
            tracing::info!(
                "計測データを {} 秒間受信していません。再接続します",
                elapsed / 1000
            );
            self.start_join();
        }
    }

    /// ERXUDP を受け取った
    fn handle_rxudp(&mut self, remain: &str) {
        tracing::trace!("RXUDP: {remain}");
        let rxudp = match parser::parse_rxudp(remain) {
            Ok(rxudp) => rxudp,
            Err(e) => {
                tracing::warn!("{remain}: Failed to parse rxudp, {e}, skipped");
                return;
            }
        };
        if rxudp.local_port != echonetlite::UDP_PORT {
            tracing::debug!("{}: Destination port is not for EchonetLite", rxudp.local_port);
            return;
        }
        let payload = rxudp.payload(remain);
        match parser::parse_hex_payload(payload) {
            Some(data) if data.len() == rxudp.data_len as usize => {
                self.rx_buffer.clear();
                self.rx_buffer.extend_from_slice(&data);
            }
            _ => {
                tracing::warn!(
                    "{payload}: Failed to decode udp data, at {:x}",
                    rxudp.data_pos
                );
                return;
            }
        }
        let packet = match echonetlite::decode_packet(&self.rx_buffer) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!("{payload}: Failed to decode echonet packet, {e}");
                return;
            }
        };
        // 低圧スマート電力量メーターのみ
        if packet.seoj.class() != SM::EOJ_LOWV_SMART_METER.class() {
            tracing::debug!("{}: not a smart meter", packet.seoj);
            return;
        }
        tracing::trace!("{packet}");
        match Esv::try_from(packet.esv) {
            Ok(Esv::GetRes | Esv::Inf | Esv::GetSna) => {
                let raw = std::mem::take(&mut self.rx_buffer);
                self.handle_property_response(&raw, &packet);
                self.rx_buffer = raw;
            }
            _ => tracing::debug!("{:02X}: Unhandled ESV", packet.esv),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broute::harness::*;

    #[test]
    fn test1() {
        // 起動から接続まで
        let mut h = Harness::new(settings());
        h.session.setup().unwrap();
        assert_eq!(h.session.state(), State::Init);

        h.session.run_loop();
        assert_eq!(h.session.state(), State::WaitVersion);
        assert_eq!(h.port.take_written_string(), "SKTERM\r\nSKRESET\r\nSKVER\r\n");

        h.feed("EVER 1.2.10");
        assert_eq!(h.session.state(), State::Configuring(SettingStep::Echo));
        assert_eq!(h.port.take_written_string(), "SKSREG SFE 0\r\n");

        h.feed("OK");
        assert_eq!(h.port.take_written_string(), "ROPT\r");
        h.feed("OK 00");
        assert_eq!(h.port.take_written_string(), "WOPT 01\r");
        h.feed("OK");
        assert_eq!(h.port.take_written_string(), format!("SKSETPWD C {PASSWORD}\r\n"));
        h.feed("OK");
        assert_eq!(h.port.take_written_string(), format!("SKSETRBID {ID}\r\n"));
        h.feed("OK");
        assert_eq!(h.session.state(), State::Scanning);
        assert_eq!(h.port.take_written_string(), "SKSCAN 2 FFFFFFFF 6 0\r\n");

        h.feed("EPANDESC");
        h.feed("  Channel:21");
        h.feed("  Channel Page:09");
        h.feed("  Pan ID:8888");
        h.feed("  Addr:001C640003A1B2C3");
        h.feed("  LQI:E1");
        h.feed(&format!("EVENT 20 {METER_ADDRESS}"));
        assert_eq!(h.session.state(), State::AddressResolving);
        assert_eq!(h.port.take_written_string(), "SKLL64 001C640003A1B2C3\r\n");

        h.feed(METER_ADDRESS);
        assert_eq!(h.session.state(), State::Configuring(SettingStep::Channel));
        assert_eq!(h.port.take_written_string(), "SKSREG S2 21\r\n");
        h.feed("OK");
        assert_eq!(h.port.take_written_string(), "SKSREG S3 8888\r\n");
        h.feed("OK");
        assert_eq!(h.session.state(), State::Joining);
        assert_eq!(h.port.take_written_string(), format!("SKJOIN {METER_ADDRESS}\r\n"));

        h.feed("EVENT 21 FE80:0000:0000:0000:021C:6400:03A1:B2C3 00");
        assert_eq!(h.session.state(), State::Joining);
        h.feed(&format!("EVENT 25 {METER_ADDRESS}"));
        assert_eq!(h.session.state(), State::Running);
    }

    #[test]
    fn test2() {
        // ASCIIモードなら WOPT は送らない
        let mut h = Harness::new(settings());
        h.session.setup().unwrap();
        h.session.run_loop();
        h.feed("EVER 1.2.10");
        h.feed("OK");
        h.port.take_written();
        h.feed("OK 01");
        assert_eq!(h.session.state(), State::Configuring(SettingStep::Pwd));
        assert_eq!(h.port.take_written_string(), format!("SKSETPWD C {PASSWORD}\r\n"));
    }

    #[test]
    fn test3() {
        // 応答がなければ初期化からやり直す
        let mut h = Harness::new(settings());
        h.session.setup().unwrap();
        h.session.run_loop();
        assert_eq!(h.session.state(), State::WaitVersion);
        h.clock.advance(1000);
        h.session.run_loop();
        assert_eq!(h.session.state(), State::WaitVersion);
        h.clock.advance(1);
        h.session.run_loop();
        assert_eq!(h.session.state(), State::Init);
        h.port.take_written();
        h.session.run_loop();
        assert_eq!(h.port.take_written_string(), "SKTERM\r\nSKRESET\r\nSKVER\r\n");

        // 接続中も同じ
        let mut h = Harness::new(settings());
        h.bring_up();
        h.session.start_join();
        assert_eq!(h.session.state(), State::Joining);
        h.clock.advance(10_001);
        h.session.run_loop();
        assert_eq!(h.session.state(), State::Init);
    }

    #[test]
    fn test4() {
        // スキャン結果が揃わなければスキャンし直す
        let mut h = Harness::new(settings());
        h.session.setup().unwrap();
        h.session.run_loop();
        for line in ["EVER 1.2.10", "OK", "OK 01", "OK", "OK"] {
            h.feed(line);
        }
        assert_eq!(h.session.state(), State::Scanning);
        h.port.take_written();

        h.feed("  Channel:21");
        h.feed(&format!("EVENT 20 {METER_ADDRESS}"));
        assert_eq!(h.session.state(), State::Scanning);
        assert_eq!(h.port.take_written_string(), "SKSCAN 2 FFFFFFFF 6 0\r\n");

        // 何も受け取っていなくてもスキャンし直す
        h.feed(&format!("EVENT 20 {METER_ADDRESS}"));
        assert_eq!(h.port.take_written_string(), "SKSCAN 2 FFFFFFFF 6 0\r\n");

        // 接続失敗もスキャンから
        let mut h = Harness::new(settings());
        h.bring_up();
        h.session.start_join();
        h.port.take_written();
        h.feed(&format!("EVENT 24 {METER_ADDRESS}"));
        assert_eq!(h.session.state(), State::Scanning);
        assert_eq!(h.port.take_written_string(), "SKSCAN 2 FFFFFFFF 6 0\r\n");
    }

    #[test]
    fn test5() {
        // セッション期限切れ
        let mut h = Harness::new(settings());
        h.bring_up();
        h.feed("EVENT 32");
        assert_eq!(h.session.state(), State::Running);
        h.feed(&format!("EVENT 29 {METER_ADDRESS}"));
        assert_eq!(h.session.state(), State::Joining);
        h.feed(&format!("EVENT 25 {METER_ADDRESS}"));
        assert_eq!(h.session.state(), State::Running);
        // FAIL は状態を変えない
        h.feed("FAIL ER04");
        assert_eq!(h.session.state(), State::Running);
    }

    #[test]
    fn test6() {
        // データ途絶で再起動
        let mut h = Harness::new(ConnectionSettings {
            restart_timeout_sec: 60,
            ..settings()
        });
        h.bring_up();
        h.clock.advance(60_000);
        h.session.run_loop();
        assert_eq!(h.session.state(), State::Running);
        h.clock.advance(1);
        h.session.run_loop();
        assert_eq!(h.session.state(), State::Restarting);

        // 再起動待ちは何が来ても変わらない
        h.feed(&format!("EVENT 25 {METER_ADDRESS}"));
        h.feed(&format!("EVENT 29 {METER_ADDRESS}"));
        assert_eq!(h.session.state(), State::Restarting);
        h.session.start_scan();
        assert_eq!(h.session.state(), State::Restarting);

        h.clock.advance(RESTART_DELAY - 1);
        assert_eq!(h.session.run_loop(), Step::Continue);
        assert!(!h.session.is_failed());
        h.clock.advance(1);
        assert_eq!(h.session.run_loop(), Step::Reboot);
        assert!(h.session.is_failed());
        assert_eq!(h.session.run_loop(), Step::Halted);
        assert_eq!(h.session.run_loop(), Step::Halted);
    }

    #[test]
    fn test7() {
        // 再スキャンと再接続の監視
        let mut h = Harness::new(ConnectionSettings {
            rescan_timeout_sec: 120,
            rejoin_timeout_sec: 60,
            ..settings()
        });
        h.bring_up();
        h.port.take_written();
        h.clock.advance(60_001);
        h.session.run_loop();
        assert_eq!(h.session.state(), State::Joining);
        assert_eq!(h.port.take_written_string(), format!("SKJOIN {METER_ADDRESS}\r\n"));

        h.feed(&format!("EVENT 25 {METER_ADDRESS}"));
        h.clock.advance(60_000);
        h.feed(&power_response(1000));
        h.port.take_written();
        // 受信したので再接続しない
        h.clock.advance(60_000);
        h.session.run_loop();
        assert_eq!(h.session.state(), State::Running);

        // 再スキャンが先
        h.clock.advance(60_001);
        h.session.run_loop();
        assert_eq!(h.session.state(), State::Scanning);
        assert_eq!(h.port.take_written_string(), "SKSCAN 2 FFFFFFFF 6 0\r\n");
    }

    #[test]
    fn test8() {
        // 計測要求がなければ監視しない
        let mut h = Harness::without_sensors(ConnectionSettings {
            restart_timeout_sec: 1,
            ..settings()
        });
        h.bring_up();
        h.clock.advance(100_000);
        h.session.run_loop();
        assert_eq!(h.session.state(), State::Running);
        assert!(!h.session.is_measurement_requesting());
    }

    #[test]
    fn test9() {
        // 認証情報がなければ失敗
        let mut h = Harness::new(ConnectionSettings {
            route_b_password: None,
            ..settings()
        });
        assert!(matches!(h.session.setup(), Err(Error::CredentialsNotSet)));
        assert!(h.session.is_failed());
        assert_eq!(h.session.run_loop(), Step::Halted);
        assert!(h.port.take_written().is_empty());
    }

    #[test]
    fn test10() {
        // ERXUDPの不正は読み捨てる
        let mut h = Harness::new(settings());
        h.bring_up();
        // PANA
        h.feed(&format!(
            "ERXUDP {METER_ADDRESS} {LOCAL_ADDRESS} 02CC 02CC 001C640003A1B2C3 0 0002 0000"
        ));
        // データ長が合わない
        h.feed(&format!(
            "ERXUDP {METER_ADDRESS} {LOCAL_ADDRESS} 0E1A 0E1A 001C640003A1B2C3 1 0013 1081000002880105FF017201E704000004D2"
        ));
        // 書式違い
        h.feed("ERXUDP FE80 0E1A");
        // スマートメーター以外
        h.feed(&rxudp("1081000005FF010288017201E704000004D2"));
        // Get要求
        h.feed(&rxudp("1081000002880105FF016201E700"));
        assert!(h.power.values().is_empty());
        assert_eq!(h.session.state(), State::Running);
    }
}
