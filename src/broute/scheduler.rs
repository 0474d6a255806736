// スマートメーターへのプロパティ値要求
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::broute::session::{Session, sent};
use crate::broute::state::State;
use crate::broute::timer::{Interval, Task, Timer};
use crate::clock::{Clock, elapsed_since};
use crate::echonetlite::{self, Esv, Packet, smart_electric_energy_meter as SM};
use crate::skstack::command::Arg;
use crate::transport::Transport;

/// 送信できなかったときの再試行間隔(ミリ秒)
pub const SEND_RETRY_INTERVAL: u32 = 2_000;
/// 送信したが応答を待つ間隔(ミリ秒)
pub const REQUEST_RETRY_INTERVAL: u32 = 5_000;
/// 要求と要求の最小間隔(ミリ秒)
pub const REQUEST_PROPERTY_INTERVAL: u32 = 5_000;

const PROPS_ENERGY_PARAMS: [u8; 2] = [SM::Coefficient::EPC, SM::UnitForCumlativeAmountsPower::EPC];
const PROPS_MOMENTARY_POWER: [u8; 1] = [SM::InstantiousPower::EPC];
const PROPS_INTEGRAL_ENERGY: [u8; 1] = [SM::CumlativeAmountsPower::EPC];

/// 要求ごとのタイマー
#[derive(Debug, Default)]
pub struct RequestTimers {
    params: Timer,
    power: Timer,
    energy: Timer,
    pub power_interval: Option<Interval>,
    pub energy_interval: Option<Interval>,
}

impl RequestTimers {
    pub fn get(&self, task: Task) -> &Timer {
        match task {
            Task::Params => &self.params,
            Task::Power => &self.power,
            Task::Energy => &self.energy,
        }
    }

    pub fn get_mut(&mut self, task: Task) -> &mut Timer {
        match task {
            Task::Params => &mut self.params,
            Task::Power => &mut self.power,
            Task::Energy => &mut self.energy,
        }
    }

    /// 周期タイマーか再試行タイマーのどちらかが時間になった
    fn take_if_due(&mut self, task: Task, now: u32) -> bool {
        let interval = match task {
            Task::Params => None,
            Task::Power => self.power_interval.as_mut(),
            Task::Energy => self.energy_interval.as_mut(),
        };
        let periodic = interval.is_some_and(|v| v.take_if_due(now));
        let retry = self.get_mut(task).take_if_due(now);
        periodic || retry
    }
}

impl<T: Transport, C: Clock> Session<T, C> {
    /// ホストのタイマー処理
    pub fn run_timers(&mut self) {
        let now = self.clock.millis();
        if self.timers.take_if_due(Task::Params, now) {
            self.request_energy_parameters();
        }
        if self.timers.take_if_due(Task::Power, now) {
            self.request_momentary_power();
        }
        if self.timers.take_if_due(Task::Energy, now) {
            self.request_integral_energy();
        }
    }

    fn rearm(&mut self, task: Task, requested: bool) {
        let now = self.clock.millis();
        let delay = if requested {
            REQUEST_RETRY_INTERVAL
        } else {
            SEND_RETRY_INTERVAL
        };
        self.timers.get_mut(task).arm(now, delay);
    }

    /// 係数と単位を要求する
    pub fn request_energy_parameters(&mut self) -> bool {
        let requested = self.request_property(&PROPS_ENERGY_PARAMS);
        if requested {
            tracing::debug!("Energy params requested");
        }
        self.rearm(Task::Params, requested);
        requested
    }

    /// 瞬時電力を要求する
    pub fn request_momentary_power(&mut self) -> bool {
        let requested = self.request_property(&PROPS_MOMENTARY_POWER);
        if requested {
            tracing::debug!("POWER requested");
        }
        self.rearm(Task::Power, requested);
        requested
    }

    /// 積算電力量を要求する
    ///
    /// 係数と単位が揃うまでは要求しない。
    pub fn request_integral_energy(&mut self) -> bool {
        let requested =
            self.calibration.is_known() && self.request_property(&PROPS_INTEGRAL_ENERGY);
        if requested {
            tracing::debug!("ENERGY requested");
        }
        self.rearm(Task::Energy, requested);
        requested
    }

    fn request_property(&mut self, epcs: &[u8]) -> bool {
        if self.state != State::Running {
            return false;
        }
        let threshold = self.settings.rejoin_miss_count;
        if threshold > 0 && self.miss_count >= threshold {
            tracing::warn!(
                "Data not received for {} times, rejoin to meter",
                self.miss_count
            );
            self.miss_count = 0;
            self.start_join();
            return false;
        }
        if let Some(requested_at) = self.property_requested {
            if elapsed_since(&self.clock, requested_at) < REQUEST_PROPERTY_INTERVAL {
                return false;
            }
        }
        let len = echonetlite::encode_property_get(
            &mut self.out_buffer,
            &SM::EOJ_CONTROLLER,
            &SM::EOJ_LOWV_SMART_METER,
            epcs,
        );
        if len > self.out_buffer.len() {
            tracing::error!("Get property encode overflow");
            return false;
        }
        let result = self.bp.send_sk_with_data(
            "SKSENDTO",
            &self.out_buffer[..len],
            &[
                Arg::Mode(1),
                Arg::Str(&self.v6_address),
                Arg::Num16(echonetlite::UDP_PORT),
                Arg::Mode(2),
                Arg::Flag(false),
                Arg::Num16(len as u16),
            ],
        );
        if !sent("SKSENDTO", result) {
            return false;
        }
        self.property_requested = Some(self.clock.millis());
        self.miss_count = self.miss_count.saturating_add(1);
        true
    }

    /// 係数か単位を受け取った
    fn on_calibration_updated(&mut self) {
        if !self.calibration.is_known() {
            return;
        }
        self.timers.get_mut(Task::Params).cancel();
        if let Some(decimals) = self.calibration.accuracy_decimals() {
            if let Some(sensor) = self.energy_sensor.as_mut() {
                sensor.set_accuracy_decimals(decimals);
            }
        }
    }

    /// プロパティ値の応答
    ///
    /// 要求したプロパティが届いたときだけ未応答の回数を戻す。
    pub(super) fn handle_property_response(&mut self, raw: &[u8], packet: &Packet) {
        let not_available = packet.esv == Esv::GetSna as u8;
        for edata in packet.edata(raw) {
            match edata.epc {
                SM::Coefficient::EPC if not_available && edata.pdc == 0 => {
                    // 係数のないメーター
                    self.miss_count = 0;
                    self.calibration.set_coefficient(SM::Coefficient(1));
                    self.on_calibration_updated();
                    continue;
                }
                SM::Coefficient::EPC | SM::UnitForCumlativeAmountsPower::EPC => {
                    self.miss_count = 0;
                }
                epc if not_available => {
                    tracing::debug!("{epc:02X}: not available");
                    continue;
                }
                SM::InstantiousPower::EPC => {
                    self.miss_count = 0;
                    self.timers.get_mut(Task::Power).cancel();
                }
                SM::CumlativeAmountsPower::EPC => {
                    self.miss_count = 0;
                    self.timers.get_mut(Task::Energy).cancel();
                }
                _ => {}
            }
            let prop = match SM::Properties::try_from(&edata) {
                Ok(prop) => prop,
                Err(SM::PropertyError::UnexpectedEpc(_)) => {
                    tracing::debug!("Drop property response {edata}");
                    continue;
                }
                Err(e) => {
                    tracing::warn!("{e}");
                    continue;
                }
            };
            tracing::debug!("{prop}");
            match prop {
                SM::Properties::Coefficient(coefficient) => {
                    self.calibration.set_coefficient(coefficient);
                    self.on_calibration_updated();
                }
                SM::Properties::UnitForCumlativeAmountsPower(unit) => {
                    self.calibration.set_unit(unit);
                    self.on_calibration_updated();
                }
                SM::Properties::InstantiousPower(power) => {
                    self.reset_timers();
                    if let Some(sensor) = self.power_sensor.as_mut() {
                        sensor.publish_state(power.0 as f32);
                    }
                }
                SM::Properties::CumlativeAmountsOfPowerAtFixedTime(scheduled) => {
                    self.reset_timers();
                    tracing::info!(
                        "Integral data of {} received",
                        scheduled.time_point.format("%H:%M")
                    );
                }
                SM::Properties::CumlativeAmountsPower(counter) => {
                    self.reset_timers();
                    if !self.calibration.is_known() {
                        tracing::debug!("energy params not received, {} dropped", counter.0);
                        continue;
                    }
                    if let Some(sensor) = self.energy_sensor.as_mut() {
                        let energy = self.calibration.energy(counter.0);
                        tracing::trace!(
                            "Energy {energy:.3} = {:.4}(kWh) * {} * {}",
                            self.calibration.unit,
                            counter.0,
                            self.calibration.coefficient
                        );
                        sensor.publish_state(energy);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::broute::harness::*;
    use crate::broute::{State, Task};
    use crate::connection_settings::ConnectionSettings;

    const CALIBRATION: &str = "1081000002880105FF017202D30400000001E10101";

    #[test]
    fn test1() {
        // 瞬時電力を受け取る
        let mut h = Harness::new(settings());
        h.bring_up();
        assert!(h.session.request_momentary_power());
        assert!(h.session.is_task_scheduled(Task::Power));
        let mut expected = format!("SKSENDTO 1 {METER_ADDRESS} 0E1A 2 0 000E ").into_bytes();
        expected.extend_from_slice(&[
            0x10, 0x81, 0x00, 0x00, 0x05, 0xff, 0x01, 0x02, 0x88, 0x01, 0x62, 0x01, 0xe7, 0x00,
        ]);
        assert_eq!(h.port.take_written(), expected);
        assert_eq!(h.session.miss_count(), 1);

        h.feed(&format!(
            "ERXUDP {METER_ADDRESS} {LOCAL_ADDRESS} 0E1A 0E1A 001C640003A1B2C3 1 0012 1081000002880105FF017201E704000004D2"
        ));
        assert_eq!(h.power.values(), vec![1234.0]);
        assert!(!h.session.is_task_scheduled(Task::Power));
        assert_eq!(h.session.miss_count(), 0);
        assert!(h.energy.values().is_empty());
    }

    #[test]
    fn test2() {
        // 要求の間隔と接続前の要求
        let mut h = Harness::new(settings());
        assert!(!h.session.request_momentary_power());
        h.bring_up();
        assert!(h.session.request_momentary_power());
        h.port.take_written();
        h.clock.advance(4_999);
        assert!(!h.session.request_momentary_power());
        assert!(h.port.take_written().is_empty());
        h.clock.advance(1);
        assert!(h.session.request_momentary_power());
        assert!(!h.port.take_written().is_empty());

        // 係数と単位がなければ積算電力量は要求しない
        h.clock.advance(5_000);
        assert!(!h.session.request_integral_energy());
        assert!(h.session.is_task_scheduled(Task::Energy));
    }

    #[test]
    fn test3() {
        // 応答がないまま規定回数に達したら再接続
        let mut h = Harness::new(ConnectionSettings {
            rejoin_miss_count: 2,
            ..settings()
        });
        h.bring_up();
        assert!(h.session.request_momentary_power());
        h.clock.advance(5_000);
        assert!(h.session.request_momentary_power());
        assert_eq!(h.session.miss_count(), 2);
        h.port.take_written();
        h.clock.advance(5_000);
        assert!(!h.session.request_momentary_power());
        assert_eq!(h.session.miss_count(), 0);
        assert_eq!(h.session.state(), State::Joining);
        assert_eq!(h.port.take_written_string(), format!("SKJOIN {METER_ADDRESS}\r\n"));
    }

    #[test]
    fn test4() {
        // 係数と単位から積算電力量を求める
        let mut h = Harness::new(settings());
        h.bring_up();
        assert!(h.session.is_task_scheduled(Task::Params));
        h.feed(&rxudp(CALIBRATION));
        assert!(h.session.calibration().is_known());
        assert!(!h.session.is_task_scheduled(Task::Params));
        assert_eq!(h.energy.accuracy_decimals(), Some(1));

        assert!(h.session.request_integral_energy());
        assert!(h.session.is_task_scheduled(Task::Energy));
        h.feed(&rxudp("1081000002880105FF017201E00400003039"));
        assert!(!h.session.is_task_scheduled(Task::Energy));
        let values = h.energy.values();
        assert_eq!(values.len(), 1);
        assert!((values[0] - 1234.5).abs() < 1e-3);
    }

    #[test]
    fn test5() {
        // 長さ違いのプロパティだけ捨てる
        let mut h = Harness::new(settings());
        h.bring_up();
        h.feed(&rxudp(CALIBRATION));
        h.feed(&rxudp("1081000002880105FF017202E003000001E704000004D2"));
        assert!(h.energy.values().is_empty());
        assert_eq!(h.power.values(), vec![1234.0]);

        // 定時積算電力量はログだけ
        h.feed(&rxudp("1081000002880105FF017301EA0B07E9010F0C1E00000004D2"));
        assert_eq!(h.power.values(), vec![1234.0]);
        assert!(h.energy.values().is_empty());
    }

    #[test]
    fn test6() {
        // 係数の読み出し不可は係数 1
        let mut h = Harness::new(settings());
        h.bring_up();
        h.feed(&rxudp("1081000002880105FF015202D300E100"));
        assert_eq!(h.session.calibration().coefficient, 1);
        assert!(!h.session.calibration().is_known());
        assert!(h.session.is_task_scheduled(Task::Params));

        // 読み出し不可の瞬時電力は無視する
        h.feed(&rxudp("1081000002880105FF015201E700"));
        assert!(h.power.values().is_empty());

        h.feed(&rxudp("1081000002880105FF017201E10101"));
        assert!(h.session.calibration().is_known());
        assert!(!h.session.is_task_scheduled(Task::Params));
    }

    #[test]
    fn test7() {
        // タイマーから要求する
        let mut h = Harness::new(ConnectionSettings {
            power_interval_sec: 30,
            ..settings()
        });
        h.bring_up();
        // 接続前の係数と単位の要求は2秒後に再試行
        h.clock.advance(2_000);
        h.session.run_timers();
        assert!(h.port.take_written_string().starts_with("SKSENDTO"));
        assert!(h.session.is_task_scheduled(Task::Params));
        h.feed(&rxudp(CALIBRATION));
        assert!(!h.session.is_task_scheduled(Task::Params));

        // 瞬時電力の周期
        h.clock.advance(27_999);
        h.session.run_timers();
        assert!(h.port.take_written().is_empty());
        h.clock.advance(1);
        h.session.run_timers();
        assert!(h.port.take_written().ends_with(&[0x62, 0x01, 0xe7, 0x00]));
        assert!(h.session.is_task_scheduled(Task::Power));

        h.feed(&power_response(-20));
        assert_eq!(h.power.values(), vec![-20.0]);
        assert!(!h.session.is_task_scheduled(Task::Power));
    }

    #[test]
    fn test8() {
        // 定時積算電力量の通知では未応答の回数は戻らない
        let mut h = Harness::new(ConnectionSettings {
            rejoin_miss_count: 1,
            ..settings()
        });
        h.bring_up();
        assert!(h.session.request_momentary_power());
        assert_eq!(h.session.miss_count(), 1);
        h.feed(&rxudp("1081000002880105FF017301EA0B07E9010F0C1E00000004D2"));
        assert_eq!(h.session.miss_count(), 1);
        h.port.take_written();
        h.clock.advance(5_000);
        assert!(!h.session.request_momentary_power());
        assert_eq!(h.session.state(), State::Joining);
        assert_eq!(h.port.take_written_string(), format!("SKJOIN {METER_ADDRESS}\r\n"));
    }

    #[test]
    fn test9() {
        // 知らないプロパティは捨てて残りを処理する
        let mut h = Harness::new(settings());
        h.bring_up();
        assert!(h.session.request_momentary_power());
        h.feed(&rxudp("1081000002880105FF017202800130E704000004D2"));
        assert_eq!(h.power.values(), vec![1234.0]);
        assert!(!h.session.is_task_scheduled(Task::Power));
        assert_eq!(h.session.miss_count(), 0);
    }
}
